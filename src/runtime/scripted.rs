use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{AutomationRuntime, CaptchaService, EmailService};
use crate::model::action::Action;
use crate::model::extracted_profile::ExtractedProfile;
use crate::model::protocol::{
    ActionRequest, CssErrorResponse, CssResponse, CssResult, CssSuccessResponse,
    GetCaptchaInfoResponse, NavigateResponse,
};

/// The guarded values are plain recordings, still usable after a panic in
/// another holder.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One canned answer for an action id.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Result(CssResult),
    /// The runtime reports that the action failed on the page.
    Failure(String),
    /// The round trip itself fails.
    Transport(String),
    /// Answer with the default result after a pause.
    Delay(Duration),
}

/// In-process runtime that answers from a script instead of driving a page.
///
/// Actions without a scripted reply succeed: navigate echoes its own URL,
/// extract returns the configured profiles, getCaptchaInfo returns a fixed
/// site key. Used by `run --dry-run` and by the runner tests.
#[derive(Default)]
pub struct ScriptedRuntime {
    replies: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    extract_results: Mutex<Vec<ExtractedProfile>>,
    requests: Mutex<Vec<ActionRequest>>,
    loaded_urls: Mutex<Vec<String>>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extract_results(self, profiles: Vec<ExtractedProfile>) -> Self {
        self.set_extract_results(profiles);
        self
    }

    pub fn set_extract_results(&self, profiles: Vec<ExtractedProfile>) {
        *lock(&self.extract_results) = profiles;
    }

    /// Queue a reply for the next request carrying `action_id`.
    pub fn script(&self, action_id: &str, reply: ScriptedReply) {
        lock(&self.replies)
            .entry(action_id.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<ActionRequest> {
        lock(&self.requests).clone()
    }

    pub fn executed_action_ids(&self) -> Vec<String> {
        lock(&self.requests)
            .iter()
            .map(|r| r.action().id().to_string())
            .collect()
    }

    pub fn loaded_urls(&self) -> Vec<String> {
        lock(&self.loaded_urls).clone()
    }

    fn default_result(&self, action: &Action) -> CssResult {
        let response = match action {
            Action::Navigate(navigate) => Some(CssResponse::Navigate(NavigateResponse {
                url: navigate.url.clone(),
            })),
            Action::Extract(_) => Some(CssResponse::Extract(
                lock(&self.extract_results).clone(),
            )),
            Action::GetCaptchaInfo(_) => {
                Some(CssResponse::GetCaptchaInfo(GetCaptchaInfoResponse {
                    site_key: "scripted-site-key".into(),
                    url: "about:blank".into(),
                    captcha_type: "recaptcha2".into(),
                }))
            }
            Action::FillForm(_)
            | Action::Click(_)
            | Action::Expectation(_)
            | Action::EmailConfirmation(_)
            | Action::SolveCaptcha(_) => None,
        };
        CssResult::Success(CssSuccessResponse {
            action_id: action.id().to_string(),
            action_type: action.action_type(),
            response,
        })
    }
}

#[async_trait]
impl AutomationRuntime for ScriptedRuntime {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, request: &ActionRequest) -> anyhow::Result<CssResult> {
        lock(&self.requests).push(request.clone());

        let action = request.action();
        let reply = lock(&self.replies)
            .get_mut(action.id())
            .and_then(VecDeque::pop_front);

        match reply {
            None => Ok(self.default_result(action)),
            Some(ScriptedReply::Result(result)) => Ok(result),
            Some(ScriptedReply::Failure(message)) => Ok(CssResult::Error(CssErrorResponse {
                action_id: action.id().to_string(),
                message,
            })),
            Some(ScriptedReply::Transport(message)) => anyhow::bail!(message),
            Some(ScriptedReply::Delay(pause)) => {
                tokio::time::sleep(pause).await;
                Ok(self.default_result(action))
            }
        }
    }

    async fn load_url(&self, url: &str) -> anyhow::Result<()> {
        lock(&self.loaded_urls).push(url.to_string());
        Ok(())
    }
}

/// Captcha solver that hands out a fixed token, or never solves when the
/// token is `None`.
pub struct StaticCaptchaService {
    token: Option<String>,
    submitted: Mutex<Vec<GetCaptchaInfoResponse>>,
}

impl StaticCaptchaService {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: token.map(str::to_string),
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn submitted(&self) -> Vec<GetCaptchaInfoResponse> {
        lock(&self.submitted).clone()
    }
}

#[async_trait]
impl CaptchaService for StaticCaptchaService {
    async fn submit_captcha_information(
        &self,
        info: &GetCaptchaInfoResponse,
    ) -> anyhow::Result<String> {
        let mut submitted = lock(&self.submitted);
        submitted.push(info.clone());
        Ok(format!("scripted-tx-{}", submitted.len()))
    }

    async fn poll_captcha_solution(&self, _transaction_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self.token.clone())
    }
}

/// Mailbox with a fixed address whose confirmation link, if any, is always
/// already there.
pub struct StaticEmailService {
    email: String,
    link: Option<String>,
    polls: AtomicUsize,
}

impl StaticEmailService {
    pub fn new(email: &str, link: Option<&str>) -> Self {
        Self {
            email: email.to_string(),
            link: link.map(str::to_string),
            polls: AtomicUsize::new(0),
        }
    }

    /// How often the mailbox was checked.
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EmailService for StaticEmailService {
    async fn email_for_broker(&self, _broker_url: &str) -> anyhow::Result<String> {
        Ok(self.email.clone())
    }

    async fn poll_confirmation_link(&self, _email: &str) -> anyhow::Result<Option<String>> {
        self.polls.fetch_add(1, Ordering::Relaxed);
        Ok(self.link.clone())
    }
}
