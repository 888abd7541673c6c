use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::JobContext;
use super::opt_out::run_opt_out;
use super::scan::run_scan;
use crate::model::job::BrokerJobData;
use crate::model::processor::{OperationType, filtered_and_sorted_job_data};
use crate::model::query_data::BrokerProfileQueryData;

/// Outcome of one pass over the due jobs.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Aggregates that had at least one job, in scheduling order.
    pub updated: Vec<BrokerProfileQueryData>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }

    fn absorb(&mut self, other: RunSummary) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
        self.updated.extend(other.updated);
    }
}

/// The jobs of one (broker, profile query) pair. They share an aggregate,
/// so they run one after the other.
struct JobGroup {
    slot: usize,
    data: BrokerProfileQueryData,
    jobs: Vec<BrokerJobData>,
}

fn group_jobs(query_data: &[BrokerProfileQueryData], jobs: Vec<BrokerJobData>) -> Vec<JobGroup> {
    let mut groups: Vec<JobGroup> = Vec::new();
    for job in jobs {
        let key = (job.broker_id(), job.profile_query_id());
        if let Some(group) = groups
            .iter_mut()
            .find(|g| (g.data.scan_job_data.broker_id, g.data.scan_job_data.profile_query_id) == key)
        {
            group.jobs.push(job);
            continue;
        }
        let Some(data) = query_data.iter().find(|d| {
            (d.scan_job_data.broker_id, d.scan_job_data.profile_query_id) == key
        }) else {
            warn!(broker_id = key.0, profile_query_id = key.1, "Job without aggregate, skipping");
            continue;
        };
        groups.push(JobGroup {
            slot: groups.len(),
            data: data.clone(),
            jobs: vec![job],
        });
    }
    groups
}

async fn run_group(ctx: &JobContext, group: JobGroup) -> RunSummary {
    let mut summary = RunSummary::default();
    let mut data = group.data;

    for job in group.jobs {
        if ctx.cancel.is_cancelled() {
            summary.cancelled += 1;
            continue;
        }
        let result = match &job {
            BrokerJobData::Scan(_) => run_scan(ctx, data.clone()).await,
            BrokerJobData::OptOut(opt_out) => match opt_out.profile_id() {
                Some(profile_id) => run_opt_out(ctx, data.clone(), profile_id).await,
                None => {
                    warn!(broker = %data.data_broker.name, "Opt-out job without a profile id");
                    summary.failed += 1;
                    continue;
                }
            },
        };
        match result {
            Ok(updated) => {
                data = updated;
                if ctx.cancel.is_cancelled() {
                    summary.cancelled += 1;
                } else {
                    summary.completed += 1;
                }
            }
            Err(e) => {
                error!(
                    broker = %data.data_broker.name,
                    kind = ?job.kind(),
                    error = %e,
                    "Job failed"
                );
                summary.failed += 1;
            }
        }
    }

    summary.updated.push(data);
    summary
}

/// Run every job of `operation` due by `priority_date`.
///
/// Jobs of different brokers or profile queries run concurrently, at most
/// `settings.workers` at a time. A failing job is logged and counted but
/// does not stop the others. After cancellation no new job starts.
pub async fn run_due_jobs(
    ctx: &JobContext,
    query_data: &[BrokerProfileQueryData],
    operation: OperationType,
    priority_date: Option<DateTime<Utc>>,
) -> RunSummary {
    let jobs = filtered_and_sorted_job_data(query_data, operation, priority_date);
    let groups = group_jobs(query_data, jobs);
    info!(groups = groups.len(), workers = ctx.settings.workers, "Running due jobs");

    let semaphore = Arc::new(Semaphore::new(ctx.settings.workers.max(1)));
    let mut tasks = JoinSet::new();
    for group in groups {
        let ctx = ctx.clone();
        let semaphore = semaphore.clone();
        tasks.spawn(async move {
            let slot = group.slot;
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (slot, RunSummary::default());
            };
            // A panicking job gives back the aggregate it started from.
            let input = group.data.clone();
            let job_count = group.jobs.len();
            match tokio::spawn(async move { run_group(&ctx, group).await }).await {
                Ok(summary) => (slot, summary),
                Err(e) => {
                    error!(broker = %input.data_broker.name, error = %e, "Job task panicked");
                    let summary = RunSummary {
                        failed: job_count,
                        updated: vec![input],
                        ..Default::default()
                    };
                    (slot, summary)
                }
            }
        });
    }

    let mut finished: Vec<(usize, RunSummary)> = Vec::new();
    let mut panicked = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => finished.push(result),
            Err(e) => {
                error!(error = %e, "Job task panicked");
                panicked += 1;
            }
        }
    }
    finished.sort_by_key(|(slot, _)| *slot);

    let mut summary = RunSummary {
        failed: panicked,
        ..Default::default()
    };
    for (_, group) in finished {
        summary.absorb(group);
    }
    info!(
        completed = summary.completed,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "Run finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::model::extracted_profile::{AddressCityState, ExtractedProfile};
    use crate::model::history::EventType;
    use crate::model::protocol::{ActionRequest, CssResult};
    use crate::runner::testing::*;
    use crate::runtime::AutomationRuntime;
    use crate::runtime::scripted::{ScriptedReply, StaticCaptchaService, StaticEmailService};

    struct PanickingRuntime;

    #[async_trait]
    impl AutomationRuntime for PanickingRuntime {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn execute(&self, _request: &ActionRequest) -> anyhow::Result<CssResult> {
            panic!("runtime bug");
        }

        async fn load_url(&self, _url: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn due(mut data: BrokerProfileQueryData, date: DateTime<Utc>) -> BrokerProfileQueryData {
        data.scan_job_data.preferred_run_date = Some(date);
        data
    }

    #[tokio::test]
    async fn test_runs_only_due_scans() {
        let h = harness();
        let now = Utc::now();
        let input = vec![
            due(query_data(1, 1), now - Duration::hours(1)),
            due(query_data(2, 1), now + Duration::days(3)),
        ];

        let summary = run_due_jobs(&h.ctx, &input, OperationType::Scan, Some(now)).await;

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.updated.len(), 1);
        assert_eq!(summary.updated[0].data_broker.id, Some(1));
        assert_eq!(
            h.runtime.executed_action_ids(),
            ["scan-nav", "scan-extract"]
        );
    }

    #[tokio::test]
    async fn test_scan_then_opt_out_in_one_pass() {
        let h = harness();
        h.runtime.set_extract_results(vec![ExtractedProfile {
            addresses: Some(vec![AddressCityState::new("Miami", "FL")]),
            ..ExtractedProfile::named("Jane Doe")
        }]);
        let now = Utc::now();
        let input = vec![due(query_data(1, 1), now - Duration::hours(1))];

        let scanned = run_due_jobs(&h.ctx, &input, OperationType::Scan, Some(now)).await;
        let summary =
            run_due_jobs(&h.ctx, &scanned.updated, OperationType::OptOut, Some(Utc::now())).await;

        assert_eq!(summary.completed, 1);
        let job = &summary.updated[0].opt_out_job_data[0];
        assert!(matches!(
            job.history_events.last().unwrap().event_type,
            EventType::OptOutRequested { .. }
        ));
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_other_jobs() {
        let h = harness();
        let now = Utc::now();
        let mut broken = query_data(1, 1);
        broken.data_broker.steps.clear();
        let input = vec![
            due(broken, now - Duration::hours(2)),
            due(query_data(2, 1), now - Duration::hours(1)),
        ];

        let summary = run_due_jobs(&h.ctx, &input, OperationType::Scan, Some(now)).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.updated.len(), 2);
        // The failed aggregate comes back unchanged.
        assert!(summary.updated[0].scan_job_data.history_events.is_empty());
        assert_eq!(summary.updated[1].scan_job_data.scan_started_events().len(), 1);
    }

    #[tokio::test]
    async fn test_runtime_error_counts_as_completed_job() {
        let h = harness();
        h.runtime.script("scan-extract", ScriptedReply::Failure("captcha wall".into()));
        let now = Utc::now();
        let input = vec![due(query_data(1, 1), now - Duration::hours(1))];

        let summary = run_due_jobs(&h.ctx, &input, OperationType::Scan, Some(now)).await;

        assert_eq!(summary.completed, 1);
        let last = summary.updated[0].scan_job_data.history_events.last().unwrap();
        assert!(last.event_type.is_error());
    }

    #[tokio::test]
    async fn test_cancelled_run_starts_nothing() {
        let h = harness();
        h.ctx.cancel.cancel();
        let now = Utc::now();
        let input = vec![
            due(query_data(1, 1), now - Duration::hours(1)),
            due(query_data(2, 1), now - Duration::hours(1)),
        ];

        let summary = run_due_jobs(&h.ctx, &input, OperationType::Scan, Some(now)).await;

        assert_eq!(summary.cancelled, 2);
        assert_eq!(summary.completed, 0);
        assert!(h.runtime.executed_action_ids().is_empty());
    }

    #[tokio::test]
    async fn test_results_keep_scheduling_order() {
        let h = harness();
        let now = Utc::now();
        let input: Vec<_> = (1..=5)
            .rev()
            .map(|id| due(query_data(id, 1), now - Duration::minutes(id)))
            .collect();

        let summary = run_due_jobs(&h.ctx, &input, OperationType::Scan, Some(now)).await;

        let ids: Vec<_> = summary.updated.iter().map(|d| d.data_broker.id).collect();
        assert_eq!(ids, [Some(5), Some(4), Some(3), Some(2), Some(1)]);
        assert_eq!(summary.total(), 5);
    }

    #[tokio::test]
    async fn test_panicked_job_keeps_its_aggregate() {
        let ctx = JobContext::new(
            Arc::new(PanickingRuntime),
            Arc::new(StaticCaptchaService::new(None)),
            Arc::new(StaticEmailService::new("jane@relay.example", None)),
            fast_settings(),
        );
        let now = Utc::now();
        let input = vec![
            due(query_data(1, 1), now - Duration::hours(2)),
            due(query_data(2, 1), now - Duration::hours(1)),
        ];

        let summary = run_due_jobs(&ctx, &input, OperationType::Scan, Some(now)).await;

        assert_eq!(summary.failed, 2);
        let ids: Vec<_> = summary.updated.iter().map(|d| d.data_broker.id).collect();
        assert_eq!(ids, [Some(1), Some(2)]);
        assert_eq!(summary.updated[0].scan_job_data, input[0].scan_job_data);
    }
}
