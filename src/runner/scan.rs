use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use super::JobContext;
use super::actions::run_actions;
use crate::model::extracted_profile::ExtractedProfile;
use crate::model::history::{EventType, HistoryEvent};
use crate::model::job::OptOutJobData;
use crate::model::query_data::BrokerProfileQueryData;
use crate::model::schedule::{opt_out_preferred_run_date, scan_preferred_run_date};

/// Run one scan of `data`'s broker for its profile query and fold the
/// outcome into the aggregate.
///
/// Runtime failures become an `error` event. A broker without a scan step
/// is returned as `Err` before anything is recorded.
pub async fn run_scan(
    ctx: &JobContext,
    mut data: BrokerProfileQueryData,
) -> anyhow::Result<BrokerProfileQueryData> {
    let step = data.data_broker.scan_step()?.clone();
    let broker_name = data.data_broker.name.clone();
    let broker_id = data.scan_job_data.broker_id;
    let profile_query_id = data.scan_job_data.profile_query_id;
    let config = data.data_broker.scheduling_config;

    info!(broker = %broker_name, profile_query_id, "Scan started");
    let mut scan = data
        .scan_job_data
        .clone()
        .appending(HistoryEvent::now(EventType::ScanStarted));

    let outcome = run_actions(
        ctx,
        &step.actions,
        &data.profile_query,
        None,
        &data.data_broker.url,
    )
    .await;

    let now = Utc::now();
    let mut touched: Vec<usize> = Vec::new();

    match outcome {
        Err(e) if e.is_cancellation() => {
            info!(broker = %broker_name, profile_query_id, "Scan cancelled");
            data.scan_job_data = scan;
            return Ok(data);
        }
        Err(e) => {
            warn!(broker = %broker_name, profile_query_id, error = %e, "Scan failed");
            scan = scan.appending(HistoryEvent::new(EventType::error(e.to_string()), now));
        }
        Ok(output) => {
            let found: Vec<ExtractedProfile> = output
                .extracted
                .iter()
                .map(|p| p.merge(&data.profile_query))
                .collect();

            if found.is_empty() {
                scan = scan.appending(HistoryEvent::new(EventType::NoMatchFound, now));
            }

            let mut seen: Vec<usize> = Vec::new();
            for profile in found {
                let existing = data
                    .opt_out_job_data
                    .iter()
                    .position(|job| job.extracted_profile.does_match_extracted_profile(&profile));

                match existing {
                    Some(index) => {
                        let job = data.opt_out_job_data[index].clone();
                        let profile_id = job.profile_id().unwrap_or_else(Uuid::new_v4);
                        let event = EventType::MatchFound { profile_id };
                        let mut job = job.appending(HistoryEvent::new(event.clone(), now));
                        job.extracted_profile.id = Some(profile_id);
                        if job.extracted_profile.is_removed() {
                            info!(broker = %broker_name, %profile_id, "Removed profile is listed again");
                            job = job.with_removed_date(None);
                        }
                        data.opt_out_job_data[index] = job;
                        scan = scan.appending(HistoryEvent::new(event, now));
                        seen.push(index);
                    }
                    None => {
                        let profile_id = Uuid::new_v4();
                        let profile = ExtractedProfile {
                            id: Some(profile_id),
                            ..profile
                        };
                        let event = EventType::MatchFound { profile_id };
                        // Parent-site brokers are opted out through the parent.
                        let preferred = if data.data_broker.performs_opt_out_within_parent() {
                            None
                        } else {
                            Some(now)
                        };
                        let job = OptOutJobData::new(broker_id, profile_query_id, profile, now)
                            .with_preferred_run_date(preferred)
                            .appending(HistoryEvent::new(event.clone(), now));
                        info!(broker = %broker_name, %profile_id, "New match found");
                        data.opt_out_job_data.push(job);
                        scan = scan.appending(HistoryEvent::new(event, now));
                        seen.push(data.opt_out_job_data.len() - 1);
                    }
                }
            }

            for (index, job) in data.opt_out_job_data.iter_mut().enumerate() {
                if seen.contains(&index) || job.extracted_profile.is_removed() {
                    continue;
                }
                let Some(profile_id) = job.profile_id() else {
                    continue;
                };
                info!(broker = %broker_name, %profile_id, "Profile no longer listed, removal confirmed");
                *job = job
                    .clone()
                    .appending(HistoryEvent::new(EventType::OptOutConfirmed { profile_id }, now))
                    .with_removed_date(Some(now));
                touched.push(index);
            }
            touched.extend(seen);
        }
    }

    let preferred = scan_preferred_run_date(scan.preferred_run_date, &scan.history_events, &config, now);
    data.scan_job_data = scan.with_preferred_run_date(preferred);

    for index in touched {
        let job = &mut data.opt_out_job_data[index];
        job.preferred_run_date =
            opt_out_preferred_run_date(job.preferred_run_date, &job.history_events, &config, now);
    }

    Ok(data)
}
