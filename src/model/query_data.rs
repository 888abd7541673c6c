use super::broker::DataBroker;
use super::extracted_profile::ExtractedProfile;
use super::history::HistoryEvent;
use super::job::{BrokerJobData, OptOutJobData, ScanJobData};
use super::profile::ProfileQuery;

/// One broker, one profile query, and every job derived from the pair.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerProfileQueryData {
    pub data_broker: DataBroker,
    pub profile_query: ProfileQuery,
    pub scan_job_data: ScanJobData,
    pub opt_out_job_data: Vec<OptOutJobData>,
}

impl BrokerProfileQueryData {
    pub fn new(
        data_broker: DataBroker,
        profile_query: ProfileQuery,
        scan_job_data: ScanJobData,
    ) -> Self {
        Self {
            data_broker,
            profile_query,
            scan_job_data,
            opt_out_job_data: Vec::new(),
        }
    }

    /// The scan job followed by every opt-out job.
    pub fn operations_data(&self) -> Vec<BrokerJobData> {
        std::iter::once(BrokerJobData::Scan(self.scan_job_data.clone()))
            .chain(
                self.opt_out_job_data
                    .iter()
                    .cloned()
                    .map(BrokerJobData::OptOut),
            )
            .collect()
    }

    pub fn extracted_profiles(&self) -> Vec<&ExtractedProfile> {
        self.opt_out_job_data
            .iter()
            .map(|job| &job.extracted_profile)
            .collect()
    }

    /// All history across the scan and opt-out jobs, oldest first. Events
    /// sharing a date keep scan-then-opt-out order.
    pub fn events(&self) -> Vec<&HistoryEvent> {
        let mut events: Vec<&HistoryEvent> = self
            .scan_job_data
            .history_events
            .iter()
            .chain(self.opt_out_job_data.iter().flat_map(|j| j.history_events.iter()))
            .collect();
        events.sort_by_key(|e| e.date);
        events
    }

    pub fn has_matches(&self) -> bool {
        !self.opt_out_job_data.is_empty()
    }

    pub fn opt_out_job_for_profile(&self, profile_id: uuid::Uuid) -> Option<&OptOutJobData> {
        self.opt_out_job_data
            .iter()
            .find(|job| job.profile_id() == Some(profile_id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::model::broker::{DataBrokerScheduleConfig, Step, StepType};
    use crate::model::history::EventType;

    fn aggregate() -> BrokerProfileQueryData {
        let broker = DataBroker::new(
            "broker.example",
            vec![Step::new(StepType::Scan, vec![])],
            DataBrokerScheduleConfig::new(1, 2, 3),
        )
        .with_id(1);
        let query = ProfileQuery::new("Jane", "Doe", "Miami", "FL", 1984).with_id(7);
        BrokerProfileQueryData::new(broker, query, ScanJobData::new(1, 7))
    }

    #[test]
    fn test_empty_aggregate_views() {
        let data = aggregate();
        assert!(!data.has_matches());
        assert!(data.extracted_profiles().is_empty());
        assert_eq!(data.operations_data().len(), 1);
        assert!(data.events().is_empty());
    }

    #[test]
    fn test_views_include_opt_outs() {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let mut data = aggregate();
        data.scan_job_data = data
            .scan_job_data
            .clone()
            .appending(HistoryEvent::new(EventType::ScanStarted, now))
            .appending(HistoryEvent::new(
                EventType::MatchFound { profile_id: id },
                now + Duration::seconds(2),
            ));
        let profile = ExtractedProfile {
            id: Some(id),
            ..ExtractedProfile::named("Jane Doe")
        };
        data.opt_out_job_data.push(
            OptOutJobData::new(1, 7, profile, now).appending(HistoryEvent::new(
                EventType::OptOutStarted { profile_id: id },
                now + Duration::seconds(1),
            )),
        );

        assert!(data.has_matches());
        assert_eq!(data.extracted_profiles()[0].name.as_deref(), Some("Jane Doe"));

        let kinds: Vec<&str> = data.events().iter().map(|e| e.event_type.label()).collect();
        assert_eq!(kinds, ["scanStarted", "optOutStarted", "matchFound"]);

        let operations = data.operations_data();
        assert!(matches!(operations[0], BrokerJobData::Scan(_)));
        assert!(matches!(operations[1], BrokerJobData::OptOut(_)));
        assert!(data.opt_out_job_for_profile(id).is_some());
        assert!(data.opt_out_job_for_profile(Uuid::new_v4()).is_none());
    }
}
