//! Runs scan and opt-out jobs against the automation runtime.

pub mod actions;
pub mod opt_out;
pub mod pool;
pub mod scan;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::RunnerSettings;
use crate::runtime::{AutomationRuntime, CaptchaService, EmailService};

pub use opt_out::run_opt_out;
pub use pool::{RunSummary, run_due_jobs};
pub use scan::run_scan;

/// Collaborators and limits shared by every job of one run.
#[derive(Clone)]
pub struct JobContext {
    pub runtime: Arc<dyn AutomationRuntime>,
    pub captcha: Arc<dyn CaptchaService>,
    pub email: Arc<dyn EmailService>,
    pub settings: RunnerSettings,
    pub cancel: CancellationToken,
}

impl JobContext {
    pub fn new(
        runtime: Arc<dyn AutomationRuntime>,
        captcha: Arc<dyn CaptchaService>,
        email: Arc<dyn EmailService>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            runtime,
            captcha,
            email,
            settings,
            cancel: CancellationToken::new(),
        }
    }
}
