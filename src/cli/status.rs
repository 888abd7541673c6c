use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use comfy_table::{Cell, Table};

use crate::db::Database;
use crate::model::query_data::BrokerProfileQueryData;

#[derive(Debug, Default, PartialEq, Eq)]
struct BrokerStatus {
    queries: usize,
    last_scan: Option<DateTime<Utc>>,
    next_scan: Option<DateTime<Utc>>,
    matches: usize,
    requested: usize,
    removed: usize,
    errors: usize,
}

fn broker_stats(query_data: &[BrokerProfileQueryData]) -> BTreeMap<String, BrokerStatus> {
    let mut by_broker: BTreeMap<String, BrokerStatus> = BTreeMap::new();
    for data in query_data.iter().filter(|d| !d.profile_query.deprecated) {
        let status = by_broker.entry(data.data_broker.name.clone()).or_default();
        let scan = &data.scan_job_data;
        status.queries += 1;
        status.last_scan = status.last_scan.max(scan.last_run_date());
        status.next_scan = match (status.next_scan, scan.preferred_run_date) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        for job in data.operations_data() {
            if job.history_events().last().is_some_and(|e| e.event_type.is_error()) {
                status.errors += 1;
            }
        }
        for opt_out in &data.opt_out_job_data {
            status.matches += 1;
            if opt_out.extracted_profile.is_removed() {
                status.removed += 1;
            } else if opt_out.submitted_successfully_date().is_some() {
                status.requested += 1;
            }
        }
    }
    by_broker
}

pub fn status(db: &Database) -> anyhow::Result<()> {
    let query_data = db.load_all_query_data()?;
    let by_broker = broker_stats(&query_data);

    if by_broker.is_empty() {
        println!("Nothing scheduled yet. Import brokers and set a profile first.");
        return Ok(());
    }

    let fmt = |d: Option<DateTime<Utc>>| {
        d.map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into())
    };

    let mut table = Table::new();
    table.set_header(vec![
        "Broker", "Queries", "Last Scan", "Next Scan", "Matches", "Requested", "Removed", "Errors",
    ]);
    for (name, s) in &by_broker {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(s.queries),
            Cell::new(fmt(s.last_scan)),
            Cell::new(fmt(s.next_scan)),
            Cell::new(s.matches),
            Cell::new(s.requested),
            Cell::new(s.removed),
            Cell::new(s.errors),
        ]);
    }

    println!("{table}");
    Ok(())
}
