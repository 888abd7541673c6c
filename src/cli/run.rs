use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use comfy_table::{Cell, Table};
use tracing::{error, info, warn};

use super::RunArgs;
use crate::config::RunnerSettings;
use crate::db::Database;
use crate::model::query_data::BrokerProfileQueryData;
use crate::runner::{JobContext, RunSummary, run_due_jobs};
use crate::runtime::http::{HttpCaptchaService, HttpEmailService, HttpRuntime};
use crate::runtime::scripted::{ScriptedRuntime, StaticCaptchaService, StaticEmailService};
use crate::runtime::{AutomationRuntime, CaptchaService, EmailService, Unconfigured};

fn settings(args: &RunArgs) -> RunnerSettings {
    RunnerSettings {
        workers: args.workers.max(1),
        action_timeout: Duration::from_secs(args.action_timeout),
        captcha_timeout: Duration::from_secs(args.captcha_timeout),
        captcha_poll_interval: Duration::from_secs(args.captcha_poll_interval.max(1)),
        email_timeout: Duration::from_secs(args.email_timeout),
    }
}

/// Collaborators for a real run. The automation runtime is required; a
/// missing captcha or email service only fails the jobs that need it.
fn build_context(args: &RunArgs, settings: RunnerSettings) -> anyhow::Result<JobContext> {
    if args.dry_run {
        return Ok(JobContext::new(
            Arc::new(ScriptedRuntime::new()),
            Arc::new(StaticCaptchaService::new(Some("dry-run-token"))),
            Arc::new(StaticEmailService::new("dry-run@localhost", None)),
            settings,
        ));
    }

    let Some(runtime_url) = args.runtime_url.as_deref() else {
        anyhow::bail!(
            "No automation runtime configured. Pass --runtime-url or set {}",
            crate::config::RUNTIME_URL_ENV
        );
    };
    let client_timeout = settings.action_timeout;
    let runtime: Arc<dyn AutomationRuntime> = Arc::new(HttpRuntime::new(runtime_url, client_timeout)?);
    let captcha: Arc<dyn CaptchaService> = match args.captcha_url.as_deref() {
        Some(url) => Arc::new(HttpCaptchaService::new(url, client_timeout)?),
        None => Arc::new(Unconfigured("Captcha service")),
    };
    let email: Arc<dyn EmailService> = match args.email_url.as_deref() {
        Some(url) => Arc::new(HttpEmailService::new(url, client_timeout)?),
        None => Arc::new(Unconfigured("Email service")),
    };
    Ok(JobContext::new(runtime, captcha, email, settings))
}

fn print_summary(summary: &RunSummary) {
    let mut table = Table::new();
    table.set_header(vec!["Broker", "Query", "Last Event", "Next Scan"]);
    for data in &summary.updated {
        let last = data
            .events()
            .last()
            .map(|e| e.event_type.label())
            .unwrap_or("-");
        table.add_row(vec![
            Cell::new(&data.data_broker.name),
            Cell::new(data.profile_query.full_name()),
            Cell::new(last),
            Cell::new(
                data.scan_job_data
                    .preferred_run_date
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_else(|| "-".into()),
            ),
        ]);
    }
    if !summary.updated.is_empty() {
        println!("{table}");
    }
    println!(
        "{} jobs: {} completed, {} failed, {} cancelled",
        summary.total(),
        summary.completed,
        summary.failed,
        summary.cancelled
    );
}

/// Save every updated aggregate; a failed save does not stop the rest.
/// Returns how many could not be saved.
fn save_all(db: &Database, updated: &[BrokerProfileQueryData]) -> usize {
    let mut failed = 0;
    for data in updated {
        if let Err(e) = db.save_query_data(data) {
            error!(
                broker = %data.data_broker.name,
                profile_query_id = ?data.profile_query.id,
                error = %e,
                "Failed to save job results"
            );
            failed += 1;
        }
    }
    failed
}

pub async fn run(db: &Database, args: RunArgs) -> anyhow::Result<()> {
    let ctx = build_context(&args, settings(&args))?;
    info!(runtime = ctx.runtime.name(), workers = ctx.settings.workers, "Starting run");

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, letting running actions finish");
            cancel.cancel();
        }
    });

    let query_data = db.load_all_query_data()?;
    let priority_date = Some(args.due_by.unwrap_or_else(Utc::now));
    let summary = run_due_jobs(&ctx, &query_data, args.operation, priority_date).await;

    let failed_saves = if args.dry_run {
        println!("Dry run, nothing saved.");
        0
    } else {
        save_all(db, &summary.updated)
    };
    print_summary(&summary);

    if failed_saves > 0 {
        anyhow::bail!(
            "{failed_saves} of {} updated jobs could not be saved",
            summary.updated.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::extracted_profile::ExtractedProfile;
    use crate::model::history::{EventType, HistoryEvent};
    use crate::model::job::OptOutJobData;
    use crate::model::processor::OperationType;
    use crate::model::profile::{DataBrokerProtectionProfile, ProfileAddress, ProfileName};
    use crate::runner::testing::broker;

    fn args(dry_run: bool) -> RunArgs {
        RunArgs {
            operation: OperationType::All,
            runtime_url: None,
            captcha_url: None,
            email_url: None,
            workers: 2,
            action_timeout: 5,
            captcha_timeout: 7,
            captcha_poll_interval: 1,
            email_timeout: 9,
            due_by: None,
            dry_run,
        }
    }

    fn seeded_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.upsert_broker(&broker(0)).unwrap();
        db.save_profile(&DataBrokerProtectionProfile {
            names: vec![ProfileName {
                first_name: "Jane".into(),
                last_name: "Doe".into(),
                middle_name: None,
                suffix: None,
            }],
            addresses: vec![ProfileAddress {
                city: "Miami".into(),
                state: "FL".into(),
                street: None,
                zip_code: None,
            }],
            phones: vec![],
            birth_year: 1984,
        })
        .unwrap();
        db
    }

    #[test]
    fn test_real_run_requires_runtime_url() {
        let err = build_context(&args(false), RunnerSettings::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("--runtime-url"));

        let mut with_url = args(false);
        with_url.runtime_url = Some("http://localhost:9000".into());
        let ctx = build_context(&with_url, RunnerSettings::default()).unwrap();
        assert_eq!(ctx.runtime.name(), "http://localhost:9000");
    }

    #[test]
    fn test_settings_from_args() {
        let settings = settings(&args(false));
        assert_eq!(settings.workers, 2);
        assert_eq!(settings.action_timeout, Duration::from_secs(5));
        assert_eq!(settings.captcha_timeout, Duration::from_secs(7));
        assert_eq!(settings.captcha_poll_interval, Duration::from_secs(1));
        assert_eq!(settings.email_timeout, Duration::from_secs(9));
    }

    #[test]
    fn test_failed_save_does_not_stop_the_rest() {
        let db = seeded_db();
        let loaded = db.load_all_query_data().unwrap();
        let good = loaded[0].clone();

        let mut bad = good.clone();
        bad.opt_out_job_data.push(OptOutJobData::new(
            good.scan_job_data.broker_id,
            good.scan_job_data.profile_query_id,
            ExtractedProfile::named("Jane Doe"),
            Utc::now(),
        ));
        let mut good = good;
        good.scan_job_data = good
            .scan_job_data
            .appending(HistoryEvent::now(EventType::NoMatchFound));

        assert_eq!(save_all(&db, &[bad, good]), 1);

        let data = db.load_all_query_data().unwrap();
        assert_eq!(data[0].scan_job_data.history_events.len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_saves_nothing() {
        let db = seeded_db();
        run(&db, args(true)).await.unwrap();

        let data = db.load_all_query_data().unwrap();
        assert!(data[0].scan_job_data.history_events.is_empty());
    }
}
