use chrono::{DateTime, Utc};
use comfy_table::{Cell, Table};

use crate::db::Database;
use crate::model::job::{BrokerJobData, JobKind};
use crate::model::processor::{OperationType, filtered_and_sorted_job_data};

pub fn list_jobs(
    db: &Database,
    operation: OperationType,
    due_by: Option<DateTime<Utc>>,
    all_dates: bool,
) -> anyhow::Result<()> {
    let query_data = db.load_all_query_data()?;
    let priority_date = if all_dates {
        None
    } else {
        Some(due_by.unwrap_or_else(Utc::now))
    };
    let jobs = filtered_and_sorted_job_data(&query_data, operation, priority_date);

    if jobs.is_empty() {
        println!("No jobs due.");
        return Ok(());
    }

    let broker_name = |id: i64| {
        query_data
            .iter()
            .find(|d| d.data_broker.id == Some(id))
            .map(|d| d.data_broker.name.as_str())
            .unwrap_or("?")
    };

    let mut table = Table::new();
    table.set_header(vec!["Broker", "Query", "Kind", "Profile", "Last Run", "Next Run"]);
    for job in &jobs {
        let kind = match job.kind() {
            JobKind::Scan => "scan",
            JobKind::OptOut => "opt-out",
        };
        let profile = match job {
            BrokerJobData::OptOut(o) => o.extracted_profile.name.as_deref().unwrap_or("-"),
            BrokerJobData::Scan(_) => "-",
        };
        table.add_row(vec![
            Cell::new(broker_name(job.broker_id())),
            Cell::new(job.profile_query_id()),
            Cell::new(kind),
            Cell::new(profile),
            Cell::new(job.last_run_date().map(|d| d.to_rfc3339()).unwrap_or_else(|| "-".into())),
            Cell::new(
                job.preferred_run_date()
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_else(|| "-".into()),
            ),
        ]);
    }

    println!("{table}");
    println!("{} jobs", jobs.len());
    Ok(())
}
