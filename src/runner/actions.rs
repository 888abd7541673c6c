use std::future::Future;
use std::time::Duration;

use tracing::{debug, info};

use super::JobContext;
use crate::error::{ExecutionError, ProtocolError};
use crate::model::action::{Action, EmailConfirmationAction};
use crate::model::extracted_profile::ExtractedProfile;
use crate::model::profile::ProfileQuery;
use crate::model::protocol::{ActionRequest, CssResponse, CssResult};

/// What an action sequence produced.
#[derive(Debug, Default)]
pub struct StepOutput {
    /// Profiles returned by the last extract action.
    pub extracted: Vec<ExtractedProfile>,
}

/// Floor for a broker's email `pollingTime`.
const MIN_EMAIL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Poll interval for a broker's `pollingTime` (seconds), kept between
/// [`MIN_EMAIL_POLL_INTERVAL`] and `limit`.
fn email_poll_interval(seconds: f64, limit: Duration) -> Duration {
    let requested = match Duration::try_from_secs_f64(seconds) {
        Ok(interval) => interval,
        Err(_) if seconds > 0.0 => limit,
        Err(_) => Duration::ZERO,
    };
    requested.max(MIN_EMAIL_POLL_INTERVAL).min(limit)
}

fn runtime_error(err: anyhow::Error) -> ExecutionError {
    match err.downcast::<ProtocolError>() {
        Ok(protocol) => ExecutionError::Protocol(protocol),
        Err(other) => ExecutionError::Transport(other.to_string()),
    }
}

/// Run `actions` in order, one round trip at a time.
///
/// Cancellation is checked before each action. A pending captcha or email
/// wait also ends early when the job is cancelled. An email generated for
/// `profile` is written to it as soon as it exists, so it is kept even when
/// a later action fails.
pub async fn run_actions(
    ctx: &JobContext,
    actions: &[Action],
    query: &ProfileQuery,
    mut profile: Option<&mut ExtractedProfile>,
    broker_url: &str,
) -> Result<StepOutput, ExecutionError> {
    let mut output = StepOutput::default();
    let mut captcha_transaction: Option<String> = None;

    for action in actions {
        if ctx.cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }
        debug!(action_id = action.id(), action_type = %action.action_type(), "Running action");

        if action.needs_email()
            && let Some(profile) = profile.as_deref_mut()
            && profile.email.is_none()
        {
            let email = ctx
                .email
                .email_for_broker(broker_url)
                .await
                .map_err(|e| ExecutionError::EmailService(e.to_string()))?;
            profile.email = Some(email);
        }

        let request = match action {
            Action::EmailConfirmation(confirmation) => {
                confirm_email(ctx, confirmation, profile.as_deref()).await?;
                continue;
            }
            Action::SolveCaptcha(_) => {
                let transaction = captcha_transaction
                    .as_deref()
                    .ok_or(ExecutionError::MissingCaptchaTransaction)?;
                let token = wait_for_captcha(ctx, transaction).await?;
                ActionRequest::with_token(action.clone(), token)
            }
            Action::Navigate(_)
            | Action::Extract(_)
            | Action::FillForm(_)
            | Action::Click(_)
            | Action::Expectation(_)
            | Action::GetCaptchaInfo(_) => {
                ActionRequest::with_user_data(action.clone(), query, profile.as_deref())
            }
        };

        let result = tokio::time::timeout(ctx.settings.action_timeout, ctx.runtime.execute(&request))
            .await
            .map_err(|_| ExecutionError::ActionTimeout(action.id().to_string()))?
            .map_err(runtime_error)?;

        let success = match result {
            CssResult::Success(success) => success,
            CssResult::Error(error) => {
                return Err(ExecutionError::ActionFailed {
                    action_id: error.action_id,
                    message: error.message,
                });
            }
        };

        match (action, success.response) {
            (Action::Navigate(_), Some(CssResponse::Navigate(navigate))) => {
                ctx.runtime
                    .load_url(&navigate.url)
                    .await
                    .map_err(runtime_error)?;
            }
            (Action::Extract(_), Some(CssResponse::Extract(profiles))) => {
                debug!(count = profiles.len(), "Extracted profiles");
                output.extracted = profiles;
            }
            (Action::GetCaptchaInfo(_), Some(CssResponse::GetCaptchaInfo(info))) => {
                let transaction = ctx
                    .captcha
                    .submit_captcha_information(&info)
                    .await
                    .map_err(|e| ExecutionError::CaptchaService(e.to_string()))?;
                captcha_transaction = Some(transaction);
            }
            (Action::Navigate(_), _) => return Err(missing("navigate", "url")),
            (Action::Extract(_), _) => return Err(missing("extract", "profiles")),
            (Action::GetCaptchaInfo(_), _) => return Err(missing("getCaptchaInfo", "siteKey")),
            _ => {}
        }
    }

    Ok(output)
}

fn missing(action_type: &'static str, field: &'static str) -> ExecutionError {
    ExecutionError::Protocol(ProtocolError::MissingResponse { action_type, field })
}

/// Poll `attempt` every `interval` until it yields a value, the job is
/// cancelled, or `limit` elapses.
async fn poll_until<F, Fut>(
    ctx: &JobContext,
    limit: Duration,
    interval: Duration,
    timeout_error: ExecutionError,
    mut attempt: F,
) -> Result<String, ExecutionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<String>, ExecutionError>>,
{
    let polling = async {
        loop {
            match attempt().await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(e) => return Err(e),
            }
            tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(ExecutionError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    };

    tokio::time::timeout(limit, polling)
        .await
        .map_err(|_| timeout_error)?
}

async fn wait_for_captcha(ctx: &JobContext, transaction: &str) -> Result<String, ExecutionError> {
    poll_until(
        ctx,
        ctx.settings.captcha_timeout,
        ctx.settings.captcha_poll_interval,
        ExecutionError::CaptchaTimeout,
        {
            let captcha = &ctx.captcha;
            move || async move {
                captcha
                    .poll_captcha_solution(transaction)
                    .await
                    .map_err(|e| ExecutionError::CaptchaService(e.to_string()))
            }
        },
    )
    .await
}

async fn confirm_email(
    ctx: &JobContext,
    action: &EmailConfirmationAction,
    profile: Option<&ExtractedProfile>,
) -> Result<(), ExecutionError> {
    let email = profile
        .and_then(|p| p.email.as_deref())
        .ok_or(ExecutionError::EmailNotFound)?;
    let interval = email_poll_interval(action.polling_time, ctx.settings.email_timeout);

    let link = poll_until(
        ctx,
        ctx.settings.email_timeout,
        interval,
        ExecutionError::EmailConfirmationTimeout,
        {
            let mailbox = &ctx.email;
            move || async move {
                mailbox
                    .poll_confirmation_link(email)
                    .await
                    .map_err(|e| ExecutionError::EmailService(e.to_string()))
            }
        },
    )
    .await?;

    info!(action_id = %action.id, "Following confirmation link");
    ctx.runtime.load_url(&link).await.map_err(runtime_error)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::model::protocol::{CssErrorResponse, CssSuccessResponse};
    use crate::runner::testing::*;
    use crate::runtime::scripted::{
        ScriptedReply, ScriptedRuntime, StaticCaptchaService, StaticEmailService,
    };

    fn query() -> ProfileQuery {
        ProfileQuery::new("Jane", "Doe", "Miami", "FL", 1984).with_id(1)
    }

    #[tokio::test]
    async fn test_scan_sequence_returns_extracted_profiles() {
        let h = harness();
        h.runtime
            .set_extract_results(vec![ExtractedProfile::named("Jane Doe")]);
        let actions = [navigate("n"), extract("x")];

        let output = run_actions(&h.ctx, &actions, &query(), None, "broker.example")
            .await
            .unwrap();

        assert_eq!(output.extracted.len(), 1);
        assert_eq!(h.runtime.executed_action_ids(), ["n", "x"]);
        assert_eq!(h.runtime.loaded_urls(), ["https://broker.example/n"]);
    }

    #[tokio::test]
    async fn test_error_envelope_stops_the_sequence() {
        let h = harness();
        h.runtime
            .script("c1", ScriptedReply::Failure("No results".into()));
        let actions = [click("c1"), click("c2")];

        let err = run_actions(&h.ctx, &actions, &query(), None, "broker.example")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExecutionError::ActionFailed { ref action_id, ref message }
                if action_id == "c1" && message == "No results"
        ));
        assert_eq!(h.runtime.executed_action_ids(), ["c1"]);
    }

    #[tokio::test]
    async fn test_transport_error() {
        let h = harness();
        h.runtime
            .script("c1", ScriptedReply::Transport("connection reset".into()));
        let err = run_actions(&h.ctx, &[click("c1")], &query(), None, "b")
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Transport(ref m) if m.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_action_timeout() {
        let h = harness();
        h.runtime
            .script("slow", ScriptedReply::Delay(Duration::from_secs(5)));
        let err = run_actions(&h.ctx, &[click("slow")], &query(), None, "b")
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::ActionTimeout(ref id) if id == "slow"));
    }

    #[tokio::test]
    async fn test_missing_navigate_payload() {
        let h = harness();
        h.runtime.script(
            "n",
            ScriptedReply::Result(CssResult::Success(CssSuccessResponse {
                action_id: "n".into(),
                action_type: crate::model::action::ActionType::Navigate,
                response: None,
            })),
        );
        let err = run_actions(&h.ctx, &[navigate("n")], &query(), None, "b")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Protocol(ProtocolError::MissingResponse { action_type: "navigate", .. })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_action() {
        let h = harness();
        h.ctx.cancel.cancel();
        let err = run_actions(&h.ctx, &[click("c1")], &query(), None, "b")
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
        assert!(h.runtime.executed_action_ids().is_empty());
    }

    #[tokio::test]
    async fn test_full_opt_out_sequence() {
        let h = harness();
        let mut profile = ExtractedProfile::named("Jane Doe");
        let actions = broker(1).opt_out_step().unwrap().actions.clone();

        run_actions(&h.ctx, &actions, &query(), Some(&mut profile), "broker-1.example")
            .await
            .unwrap();

        assert_eq!(profile.email.as_deref(), Some("jane@relay.example"));
        assert_eq!(h.captcha.submitted().len(), 1);

        let requests = h.runtime.requests();
        let solve = requests
            .iter()
            .find(|r| r.action().id() == "opt-captcha-solve")
            .unwrap();
        let data = serde_json::to_value(&solve.state.data).unwrap();
        assert_eq!(data, serde_json::json!({"token": "solved-token"}));

        // The email confirmation is handled natively, never sent to the runtime.
        assert!(!h.runtime.executed_action_ids().contains(&"opt-email".to_string()));
        assert!(h
            .runtime
            .loaded_urls()
            .contains(&"https://broker.example/confirm?t=1".to_string()));
    }

    #[tokio::test]
    async fn test_captcha_timeout() {
        let h = harness_with(None, Some("https://broker.example/confirm"));
        let actions = [get_captcha("g"), solve_captcha("s")];
        let err = run_actions(&h.ctx, &actions, &query(), None, "b")
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::CaptchaTimeout));
        assert_eq!(h.runtime.executed_action_ids(), ["g"]);
    }

    #[tokio::test]
    async fn test_solve_without_captcha_info() {
        let h = harness();
        let err = run_actions(&h.ctx, &[solve_captcha("s")], &query(), None, "b")
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::MissingCaptchaTransaction));
    }

    #[tokio::test]
    async fn test_email_confirmation_requires_email() {
        let h = harness();
        let err = run_actions(&h.ctx, &[email_confirmation("e")], &query(), None, "b")
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::EmailNotFound));
    }

    #[tokio::test]
    async fn test_email_confirmation_timeout() {
        let h = harness_with(Some("t"), None);
        let mut profile = ExtractedProfile {
            email: Some("jane@relay.example".into()),
            ..ExtractedProfile::named("Jane Doe")
        };
        let err = run_actions(&h.ctx, &[email_confirmation("e")], &query(), Some(&mut profile), "b")
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::EmailConfirmationTimeout));
    }

    #[test]
    fn test_email_poll_interval_bounds() {
        let limit = Duration::from_secs(600);
        assert_eq!(email_poll_interval(30.0, limit), Duration::from_secs(30));
        assert_eq!(email_poll_interval(0.0, limit), MIN_EMAIL_POLL_INTERVAL);
        assert_eq!(email_poll_interval(-4.0, limit), MIN_EMAIL_POLL_INTERVAL);
        assert_eq!(email_poll_interval(f64::NAN, limit), MIN_EMAIL_POLL_INTERVAL);
        assert_eq!(email_poll_interval(1e300, limit), limit);
        assert_eq!(email_poll_interval(f64::INFINITY, limit), limit);
        assert_eq!(email_poll_interval(900.0, limit), limit);
    }

    #[tokio::test]
    async fn test_zero_polling_time_does_not_spin() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let email = Arc::new(StaticEmailService::new("jane@relay.example", None));
        let ctx = JobContext::new(
            runtime,
            Arc::new(StaticCaptchaService::new(None)),
            email.clone(),
            fast_settings(),
        );
        let mut profile = ExtractedProfile {
            email: Some("jane@relay.example".into()),
            ..ExtractedProfile::named("Jane Doe")
        };
        let action = Action::EmailConfirmation(EmailConfirmationAction {
            id: "e".into(),
            polling_time: 0.0,
            data_source: None,
        });

        let err = run_actions(&ctx, &[action], &query(), Some(&mut profile), "b")
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::EmailConfirmationTimeout));
        // 50ms timeout at a 10ms floor.
        assert!(email.polls() <= 10, "polled {} times", email.polls());
    }

    #[tokio::test]
    async fn test_runtime_error_response_round_trip() {
        let h = harness();
        h.runtime.script(
            "x",
            ScriptedReply::Result(CssResult::Error(CssErrorResponse {
                action_id: "x".into(),
                message: "selector not found".into(),
            })),
        );
        let err = run_actions(&h.ctx, &[extract("x")], &query(), None, "b")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("selector not found"));
    }
}
