use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::job::BrokerJobData;
use super::query_data::BrokerProfileQueryData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Scan,
    OptOut,
    All,
}

impl FromStr for OperationType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scan" => Ok(OperationType::Scan),
            "opt-out" | "optOut" | "optout" => Ok(OperationType::OptOut),
            "all" => Ok(OperationType::All),
            other => anyhow::bail!("Unknown operation type '{other}' (expected scan, opt-out or all)"),
        }
    }
}

/// Jobs of `operation` that are due by `priority_date`, earliest first.
///
/// Without a priority date every job of the requested type is returned in
/// input order. Deprecated profile queries only drop out of `Scan`.
pub fn filtered_and_sorted_job_data(
    query_data: &[BrokerProfileQueryData],
    operation: OperationType,
    priority_date: Option<DateTime<Utc>>,
) -> Vec<BrokerJobData> {
    let jobs: Vec<BrokerJobData> = match operation {
        OperationType::Scan => query_data
            .iter()
            .filter(|data| !data.profile_query.deprecated)
            .map(|data| BrokerJobData::Scan(data.scan_job_data.clone()))
            .collect(),
        OperationType::OptOut => query_data
            .iter()
            .flat_map(|data| data.opt_out_job_data.iter().cloned())
            .map(BrokerJobData::OptOut)
            .collect(),
        OperationType::All => query_data
            .iter()
            .flat_map(BrokerProfileQueryData::operations_data)
            .collect(),
    };

    let Some(priority_date) = priority_date else {
        return jobs;
    };

    let mut due: Vec<BrokerJobData> = jobs
        .into_iter()
        .filter(|job| job.preferred_run_date().is_some_and(|date| date <= priority_date))
        .collect();
    // Stable: identical keys keep input order.
    due.sort_by_key(|job| (job.preferred_run_date(), job.broker_id(), job.profile_query_id()));
    due
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::model::broker::{DataBroker, DataBrokerScheduleConfig, Step, StepType};
    use crate::model::extracted_profile::ExtractedProfile;
    use crate::model::job::{JobKind, OptOutJobData, ScanJobData};
    use crate::model::profile::ProfileQuery;

    fn day(n: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, n, 0, 0, 0).unwrap()
    }

    fn query_data(
        broker_id: i64,
        query_id: i64,
        preferred: Option<DateTime<Utc>>,
    ) -> BrokerProfileQueryData {
        let broker = DataBroker::new(
            format!("broker-{broker_id}"),
            vec![Step::new(StepType::Scan, vec![])],
            DataBrokerScheduleConfig::new(1, 2, 3),
        )
        .with_id(broker_id);
        let query = ProfileQuery::new("Jane", "Doe", "Miami", "FL", 1984).with_id(query_id);
        let scan = ScanJobData::new(broker_id, query_id).with_preferred_run_date(preferred);
        BrokerProfileQueryData::new(broker, query, scan)
    }

    fn with_opt_out(
        mut data: BrokerProfileQueryData,
        preferred: Option<DateTime<Utc>>,
    ) -> BrokerProfileQueryData {
        let job = OptOutJobData::new(
            data.scan_job_data.broker_id,
            data.scan_job_data.profile_query_id,
            ExtractedProfile::named("Jane Doe"),
            day(1),
        )
        .with_preferred_run_date(preferred);
        data.opt_out_job_data.push(job);
        data
    }

    #[test]
    fn test_priority_date_boundary() {
        let data = vec![query_data(1, 1, Some(day(5)))];
        assert_eq!(
            filtered_and_sorted_job_data(&data, OperationType::Scan, Some(day(5))).len(),
            1
        );
        assert!(filtered_and_sorted_job_data(&data, OperationType::Scan, Some(day(4))).is_empty());
    }

    #[test]
    fn test_sorted_ascending_and_undated_excluded() {
        let data = vec![
            query_data(1, 1, Some(day(3))),
            query_data(2, 1, None),
            query_data(3, 1, Some(day(1))),
            query_data(4, 1, Some(day(2))),
        ];
        let jobs = filtered_and_sorted_job_data(&data, OperationType::Scan, Some(day(10)));
        let brokers: Vec<i64> = jobs.iter().map(BrokerJobData::broker_id).collect();
        assert_eq!(brokers, [3, 4, 1]);
    }

    #[test]
    fn test_ties_broken_by_broker_then_query() {
        let data = vec![
            query_data(2, 1, Some(day(1))),
            query_data(1, 2, Some(day(1))),
            query_data(1, 1, Some(day(1))),
        ];
        let jobs = filtered_and_sorted_job_data(&data, OperationType::Scan, Some(day(1)));
        let keys: Vec<(i64, i64)> = jobs
            .iter()
            .map(|j| (j.broker_id(), j.profile_query_id()))
            .collect();
        assert_eq!(keys, [(1, 1), (1, 2), (2, 1)]);
    }

    #[test]
    fn test_idempotent() {
        let data = vec![
            with_opt_out(query_data(1, 1, Some(day(2))), Some(day(1))),
            query_data(2, 1, Some(day(3))),
        ];
        let first = filtered_and_sorted_job_data(&data, OperationType::All, Some(day(5)));
        let second = filtered_and_sorted_job_data(&data, OperationType::All, Some(day(5)));
        assert_eq!(first, second);
        assert_eq!(first[0].kind(), JobKind::OptOut);
    }

    #[test]
    fn test_deprecated_queries_only_skip_scans() {
        let mut deprecated = with_opt_out(query_data(1, 1, Some(day(1))), Some(day(1)));
        deprecated.profile_query.deprecated = true;
        let data = vec![deprecated, query_data(2, 2, Some(day(1)))];

        let scans = filtered_and_sorted_job_data(&data, OperationType::Scan, None);
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].broker_id(), 2);

        let opt_outs = filtered_and_sorted_job_data(&data, OperationType::OptOut, None);
        assert_eq!(opt_outs.len(), 1);
        assert_eq!(opt_outs[0].kind(), JobKind::OptOut);

        let all = filtered_and_sorted_job_data(&data, OperationType::All, None);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_no_priority_date_keeps_input_order() {
        let data = vec![
            query_data(1, 1, Some(day(9))),
            query_data(2, 1, None),
            query_data(3, 1, Some(day(1))),
        ];
        let jobs = filtered_and_sorted_job_data(&data, OperationType::Scan, None);
        let brokers: Vec<i64> = jobs.iter().map(BrokerJobData::broker_id).collect();
        assert_eq!(brokers, [1, 2, 3]);
    }

    #[test]
    fn test_operation_type_from_str() {
        assert_eq!("scan".parse::<OperationType>().unwrap(), OperationType::Scan);
        assert_eq!("opt-out".parse::<OperationType>().unwrap(), OperationType::OptOut);
        assert_eq!("all".parse::<OperationType>().unwrap(), OperationType::All);
        assert!("everything".parse::<OperationType>().is_err());
    }
}
