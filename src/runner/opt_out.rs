use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::JobContext;
use super::actions::run_actions;
use crate::error::JobError;
use crate::model::history::{EventType, HistoryEvent};
use crate::model::query_data::BrokerProfileQueryData;
use crate::model::schedule::{confirm_opt_out_scan_date, opt_out_preferred_run_date};

/// Submit the removal request for one extracted profile of `data`.
///
/// Profiles already removed, and brokers that are opted out through their
/// parent site, are returned untouched. On success the profile keeps the
/// email used for the request and the broker's confirmation scan is pulled
/// forward.
pub async fn run_opt_out(
    ctx: &JobContext,
    mut data: BrokerProfileQueryData,
    profile_id: Uuid,
) -> anyhow::Result<BrokerProfileQueryData> {
    let index = data
        .opt_out_job_data
        .iter()
        .position(|job| job.profile_id() == Some(profile_id))
        .ok_or(JobError::NoOperationDataForExtractedProfile(profile_id))?;

    let broker_name = data.data_broker.name.clone();
    let config = data.data_broker.scheduling_config;

    if data.opt_out_job_data[index].extracted_profile.is_removed() {
        info!(broker = %broker_name, %profile_id, "Profile already removed, skipping opt-out");
        return Ok(data);
    }
    if data.data_broker.performs_opt_out_within_parent() {
        info!(broker = %broker_name, %profile_id, "Opt-out runs on the parent site, skipping");
        return Ok(data);
    }
    let Some(step) = data.data_broker.opt_out_step().cloned() else {
        warn!(broker = %broker_name, "Broker has no opt-out step");
        return Ok(data);
    };

    info!(broker = %broker_name, %profile_id, "Opt-out started");
    let mut job = data.opt_out_job_data[index]
        .clone()
        .appending(HistoryEvent::now(EventType::OptOutStarted { profile_id }));

    let outcome = run_actions(
        ctx,
        &step.actions,
        &data.profile_query,
        Some(&mut job.extracted_profile),
        &data.data_broker.url,
    )
    .await;

    let now = Utc::now();
    match outcome {
        Err(e) if e.is_cancellation() => {
            info!(broker = %broker_name, %profile_id, "Opt-out cancelled");
            data.opt_out_job_data[index] = job;
            return Ok(data);
        }
        Err(e) => {
            warn!(broker = %broker_name, %profile_id, error = %e, "Opt-out failed");
            job = job.appending(HistoryEvent::new(EventType::error(e.to_string()), now));
        }
        Ok(_) => {
            info!(broker = %broker_name, %profile_id, "Opt-out requested");
            job = job.appending(HistoryEvent::new(EventType::OptOutRequested { profile_id }, now));

            data.scan_job_data.preferred_run_date =
                confirm_opt_out_scan_date(data.scan_job_data.preferred_run_date, &config, now);
        }
    }

    job.preferred_run_date =
        opt_out_preferred_run_date(job.preferred_run_date, &job.history_events, &config, now);
    data.opt_out_job_data[index] = job;

    Ok(data)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::model::broker::{OptOutType, Step, StepType};
    use crate::model::extracted_profile::ExtractedProfile;
    use crate::model::job::OptOutJobData;
    use crate::model::protocol::ActionData;
    use crate::runner::testing::*;
    use crate::runtime::scripted::ScriptedReply;

    fn with_match(broker_id: i64) -> (BrokerProfileQueryData, Uuid) {
        let mut data = query_data(broker_id, 1);
        let id = Uuid::new_v4();
        let profile = ExtractedProfile {
            id: Some(id),
            ..ExtractedProfile::named("Jane Doe")
        };
        let job = OptOutJobData::new(broker_id, 1, profile, Utc::now())
            .with_preferred_run_date(Some(Utc::now()))
            .appending(HistoryEvent::now(EventType::MatchFound { profile_id: id }));
        data.opt_out_job_data.push(job);
        data.scan_job_data.preferred_run_date = Some(Utc::now() + Duration::hours(120));
        (data, id)
    }

    #[tokio::test]
    async fn test_successful_opt_out() {
        let h = harness();
        let (data, id) = with_match(1);

        let data = run_opt_out(&h.ctx, data, id).await.unwrap();

        let job = &data.opt_out_job_data[0];
        assert_eq!(
            job.history_events
                .iter()
                .map(|e| e.event_type.label())
                .collect::<Vec<_>>(),
            ["matchFound", "optOutStarted", "optOutRequested"]
        );
        assert_eq!(job.extracted_profile.email.as_deref(), Some("jane@relay.example"));
        assert_eq!(job.preferred_run_date, None);
        assert!(job.submitted_successfully_date().is_some());

        let scan = data.scan_job_data.preferred_run_date.unwrap();
        assert!(scan <= Utc::now() + Duration::hours(72));
        assert!(scan > Utc::now() + Duration::hours(71));
    }

    #[tokio::test]
    async fn test_failed_opt_out_is_retried() {
        let h = harness();
        h.runtime
            .script("opt-submit", ScriptedReply::Failure("submit button missing".into()));
        let (data, id) = with_match(1);
        let before = data.scan_job_data.preferred_run_date;

        let data = run_opt_out(&h.ctx, data, id).await.unwrap();

        let job = &data.opt_out_job_data[0];
        assert!(job.history_events.last().unwrap().event_type.is_error());
        assert_eq!(job.attempt_count(), 1);
        // The relay address from the form step is reused on the retry.
        assert_eq!(job.extracted_profile.email.as_deref(), Some("jane@relay.example"));
        let retry = job.preferred_run_date.unwrap();
        assert!(retry > Utc::now() + Duration::hours(47));
        assert_eq!(data.scan_job_data.preferred_run_date, before);
    }

    #[tokio::test]
    async fn test_captcha_never_solved_is_error() {
        let h = harness_with(None, Some("https://broker.example/confirm"));
        let (data, id) = with_match(1);

        let data = run_opt_out(&h.ctx, data, id).await.unwrap();

        let last = &data.opt_out_job_data[0].history_events.last().unwrap().event_type;
        assert!(matches!(last, EventType::Error { message } if message.contains("captcha")));
        assert!(!h.runtime.executed_action_ids().contains(&"opt-submit".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_profile_is_rejected() {
        let h = harness();
        let (data, _) = with_match(1);
        let unknown = Uuid::new_v4();

        let err = run_opt_out(&h.ctx, data, unknown).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<JobError>(),
            Some(&JobError::NoOperationDataForExtractedProfile(unknown))
        );
    }

    #[tokio::test]
    async fn test_removed_profile_is_skipped() {
        let h = harness();
        let (mut data, id) = with_match(1);
        data.opt_out_job_data[0].extracted_profile.removed_date = Some(Utc::now());

        let data = run_opt_out(&h.ctx, data, id).await.unwrap();
        assert_eq!(data.opt_out_job_data[0].history_events.len(), 1);
        assert!(h.runtime.executed_action_ids().is_empty());
    }

    #[tokio::test]
    async fn test_parent_site_broker_is_skipped() {
        let h = harness();
        let (mut data, id) = with_match(1);
        data.data_broker.parent = Some("parent.example".into());
        let mut opt_out = Step::new(StepType::OptOut, vec![navigate("opt-nav")]);
        opt_out.opt_out_type = Some(OptOutType::ParentSiteOptOut);
        data.data_broker.steps = vec![Step::new(StepType::Scan, vec![navigate("scan-nav")]), opt_out];

        let data = run_opt_out(&h.ctx, data, id).await.unwrap();
        assert_eq!(data.opt_out_job_data[0].history_events.len(), 1);
        assert!(h.runtime.executed_action_ids().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_opt_out_only_records_start() {
        let h = harness();
        h.ctx.cancel.cancel();
        let (data, id) = with_match(1);

        let data = run_opt_out(&h.ctx, data, id).await.unwrap();
        let job = &data.opt_out_job_data[0];
        assert_eq!(job.history_events.last().unwrap().event_type.label(), "optOutStarted");
        assert_eq!(job.extracted_profile.email, None);
    }

    #[tokio::test]
    async fn test_request_carries_extracted_profile() {
        let h = harness();
        let (data, id) = with_match(1);
        run_opt_out(&h.ctx, data, id).await.unwrap();

        let first = h.runtime.requests().into_iter().next().unwrap();
        match &first.state.data {
            ActionData::UserData(user) => {
                let profile = user.extracted_profile.as_ref().unwrap();
                assert_eq!(profile.id, Some(id));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
