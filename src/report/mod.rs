pub mod json;
pub mod terminal;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::Database;
use crate::model::history::EventType;
use crate::model::job::BrokerJobData;
use crate::model::query_data::BrokerProfileQueryData;

pub enum ReportFormat {
    Terminal,
    Json,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub generated_at: String,
    pub summary: ReportSummary,
    pub brokers: Vec<BrokerEntry>,
    pub jobs: Vec<JobRow>,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub brokers_scanned: usize,
    pub mirror_sites_active: usize,
    pub matches_found: usize,
    pub opt_outs_requested: usize,
    pub removals_confirmed: usize,
    pub jobs_in_error: usize,
}

#[derive(Debug, Serialize)]
pub struct BrokerEntry {
    pub name: String,
    pub url: String,
    pub last_scan: Option<String>,
    /// Mirror sites still serving the broker's data at report time.
    pub mirror_sites: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct JobRow {
    pub broker: String,
    pub profile_query: String,
    pub kind: &'static str,
    pub profile: Option<String>,
    pub last_event: Option<String>,
    pub last_run: Option<String>,
    pub next_run: Option<String>,
}

fn job_row(data: &BrokerProfileQueryData, job: &BrokerJobData) -> JobRow {
    let query = &data.profile_query;
    let (kind, profile) = match job {
        BrokerJobData::Scan(_) => ("scan", None),
        BrokerJobData::OptOut(opt_out) => ("opt-out", opt_out.extracted_profile.name.clone()),
    };
    JobRow {
        broker: data.data_broker.name.clone(),
        profile_query: format!("{} ({}, {})", query.full_name(), query.city, query.state),
        kind,
        profile,
        last_event: job
            .history_events()
            .last()
            .map(|e| match &e.event_type {
                EventType::Error { message } => format!("error: {message}"),
                other => other.label().to_string(),
            }),
        last_run: job.last_run_date().map(|d| d.to_rfc3339()),
        next_run: job.preferred_run_date().map(|d| d.to_rfc3339()),
    }
}

impl Report {
    /// Summarise `query_data` as of `now`. Deprecated profile queries are
    /// left out unless something was found for them.
    pub fn from_query_data(query_data: &[BrokerProfileQueryData], now: DateTime<Utc>) -> Self {
        let relevant: Vec<&BrokerProfileQueryData> = query_data
            .iter()
            .filter(|d| !d.profile_query.deprecated || d.has_matches())
            .collect();

        let mut brokers: BTreeMap<&str, BrokerEntry> = BTreeMap::new();
        let mut summary = ReportSummary::default();
        let mut jobs = Vec::new();

        for data in &relevant {
            let broker = &data.data_broker;
            let last_scan = data
                .scan_job_data
                .scan_started_events()
                .last()
                .map(|e| e.date);
            if let Some(scanned) = last_scan {
                let entry = brokers.entry(broker.name.as_str()).or_insert_with(|| BrokerEntry {
                    name: broker.name.clone(),
                    url: broker.url.clone(),
                    last_scan: None,
                    mirror_sites: broker
                        .active_mirror_sites(now)
                        .into_iter()
                        .map(|m| m.name.clone())
                        .collect(),
                });
                let scanned = scanned.to_rfc3339();
                if entry.last_scan.as_ref().is_none_or(|prev| *prev < scanned) {
                    entry.last_scan = Some(scanned);
                }
            }

            for job in data.operations_data() {
                if job.history_events().last().is_some_and(|e| e.event_type.is_error()) {
                    summary.jobs_in_error += 1;
                }
                jobs.push(job_row(data, &job));
            }
            for opt_out in &data.opt_out_job_data {
                summary.matches_found += 1;
                if opt_out.submitted_successfully_date().is_some() {
                    summary.opt_outs_requested += 1;
                }
                if opt_out.extracted_profile.is_removed() {
                    summary.removals_confirmed += 1;
                }
            }
        }

        summary.brokers_scanned = brokers.len();
        summary.mirror_sites_active = brokers.values().map(|b| b.mirror_sites.len()).sum();

        Self {
            generated_at: now.to_rfc3339(),
            summary,
            brokers: brokers.into_values().collect(),
            jobs,
        }
    }

    pub fn build(db: &Database) -> anyhow::Result<Self> {
        let query_data = db.load_all_query_data()?;
        Ok(Self::from_query_data(&query_data, Utc::now()))
    }

    pub fn render(&self, format: ReportFormat) -> anyhow::Result<String> {
        match format {
            ReportFormat::Terminal => terminal::render(self),
            ReportFormat::Json => json::render(self),
        }
    }
}
