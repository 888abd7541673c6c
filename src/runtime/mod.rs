pub mod http;
pub mod scripted;

use async_trait::async_trait;

use crate::model::protocol::{ActionRequest, CssResult, GetCaptchaInfoResponse};

/// The page automation runtime.
///
/// `execute` returns `Err` only when the round trip itself failed; a runtime
/// that ran the action and reported a failure answers with
/// [`CssResult::Error`].
#[async_trait]
pub trait AutomationRuntime: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, request: &ActionRequest) -> anyhow::Result<CssResult>;
    async fn load_url(&self, url: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait CaptchaService: Send + Sync {
    /// Hand the captcha to the solver; returns a transaction id to poll with.
    async fn submit_captcha_information(
        &self,
        info: &GetCaptchaInfoResponse,
    ) -> anyhow::Result<String>;

    /// `Ok(None)` while the solution is not ready yet.
    async fn poll_captcha_solution(&self, transaction_id: &str) -> anyhow::Result<Option<String>>;
}

#[async_trait]
pub trait EmailService: Send + Sync {
    /// A fresh address the broker can send its confirmation mail to.
    async fn email_for_broker(&self, broker_url: &str) -> anyhow::Result<String>;

    /// `Ok(None)` while no confirmation link has arrived.
    async fn poll_confirmation_link(&self, email: &str) -> anyhow::Result<Option<String>>;
}

/// Stand-in for a collaborator whose URL was not given. Every call fails at
/// once, so jobs that need it record an error instead of waiting.
pub struct Unconfigured(pub &'static str);

#[async_trait]
impl CaptchaService for Unconfigured {
    async fn submit_captcha_information(
        &self,
        _info: &GetCaptchaInfoResponse,
    ) -> anyhow::Result<String> {
        anyhow::bail!("{} is not configured", self.0)
    }

    async fn poll_captcha_solution(&self, _transaction_id: &str) -> anyhow::Result<Option<String>> {
        anyhow::bail!("{} is not configured", self.0)
    }
}

#[async_trait]
impl EmailService for Unconfigured {
    async fn email_for_broker(&self, _broker_url: &str) -> anyhow::Result<String> {
        anyhow::bail!("{} is not configured", self.0)
    }

    async fn poll_confirmation_link(&self, _email: &str) -> anyhow::Result<Option<String>> {
        anyhow::bail!("{} is not configured", self.0)
    }
}
