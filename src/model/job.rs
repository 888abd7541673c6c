use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::extracted_profile::ExtractedProfile;
use super::history::{EventType, HistoryEvent};

/// Recurring search of one broker for one profile query.
///
/// History is append-only: every "mutation" returns a new value with one
/// more event, and `last_run_date` is always read off the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanJobData {
    pub broker_id: i64,
    pub profile_query_id: i64,
    pub preferred_run_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history_events: Vec<HistoryEvent>,
}

impl ScanJobData {
    pub fn new(broker_id: i64, profile_query_id: i64) -> Self {
        Self {
            broker_id,
            profile_query_id,
            preferred_run_date: None,
            history_events: Vec::new(),
        }
    }

    pub fn last_run_date(&self) -> Option<DateTime<Utc>> {
        self.history_events.last().map(|e| e.date)
    }

    #[must_use]
    pub fn appending(mut self, event: HistoryEvent) -> Self {
        self.history_events.push(event);
        self
    }

    #[must_use]
    pub fn with_preferred_run_date(mut self, date: Option<DateTime<Utc>>) -> Self {
        self.preferred_run_date = date;
        self
    }

    /// Every scan attempt, oldest first.
    pub fn scan_started_events(&self) -> Vec<&HistoryEvent> {
        self.history_events
            .iter()
            .filter(|e| e.event_type == EventType::ScanStarted)
            .collect()
    }

    /// The most recent `matchFound` event.
    pub fn closest_matches_found_event(&self) -> Option<&HistoryEvent> {
        self.history_events
            .iter()
            .rev()
            .find(|e| matches!(e.event_type, EventType::MatchFound { .. }))
    }
}

/// Recurring attempt to remove one matched record from a broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptOutJobData {
    pub broker_id: i64,
    pub profile_query_id: i64,
    pub created_date: DateTime<Utc>,
    pub preferred_run_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history_events: Vec<HistoryEvent>,
    pub extracted_profile: ExtractedProfile,
}

impl OptOutJobData {
    pub fn new(
        broker_id: i64,
        profile_query_id: i64,
        extracted_profile: ExtractedProfile,
        created_date: DateTime<Utc>,
    ) -> Self {
        Self {
            broker_id,
            profile_query_id,
            created_date,
            preferred_run_date: None,
            history_events: Vec::new(),
            extracted_profile,
        }
    }

    pub fn profile_id(&self) -> Option<Uuid> {
        self.extracted_profile.id
    }

    pub fn last_run_date(&self) -> Option<DateTime<Utc>> {
        self.history_events.last().map(|e| e.date)
    }

    #[must_use]
    pub fn appending(mut self, event: HistoryEvent) -> Self {
        self.history_events.push(event);
        self
    }

    #[must_use]
    pub fn with_preferred_run_date(mut self, date: Option<DateTime<Utc>>) -> Self {
        self.preferred_run_date = date;
        self
    }

    #[must_use]
    pub fn with_removed_date(mut self, date: Option<DateTime<Utc>>) -> Self {
        self.extracted_profile.removed_date = date;
        self
    }

    /// Number of times an opt-out was started for this record.
    pub fn attempt_count(&self) -> usize {
        self.history_events
            .iter()
            .filter(|e| matches!(e.event_type, EventType::OptOutStarted { .. }))
            .count()
    }

    /// When the broker first accepted a removal request.
    pub fn submitted_successfully_date(&self) -> Option<DateTime<Utc>> {
        self.history_events
            .iter()
            .find(|e| matches!(e.event_type, EventType::OptOutRequested { .. }))
            .map(|e| e.date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Scan,
    OptOut,
}

/// Either kind of job, as handed out by the scheduler filter.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerJobData {
    Scan(ScanJobData),
    OptOut(OptOutJobData),
}

impl BrokerJobData {
    pub fn kind(&self) -> JobKind {
        match self {
            BrokerJobData::Scan(_) => JobKind::Scan,
            BrokerJobData::OptOut(_) => JobKind::OptOut,
        }
    }

    pub fn broker_id(&self) -> i64 {
        match self {
            BrokerJobData::Scan(job) => job.broker_id,
            BrokerJobData::OptOut(job) => job.broker_id,
        }
    }

    pub fn profile_query_id(&self) -> i64 {
        match self {
            BrokerJobData::Scan(job) => job.profile_query_id,
            BrokerJobData::OptOut(job) => job.profile_query_id,
        }
    }

    pub fn preferred_run_date(&self) -> Option<DateTime<Utc>> {
        match self {
            BrokerJobData::Scan(job) => job.preferred_run_date,
            BrokerJobData::OptOut(job) => job.preferred_run_date,
        }
    }

    pub fn history_events(&self) -> &[HistoryEvent] {
        match self {
            BrokerJobData::Scan(job) => &job.history_events,
            BrokerJobData::OptOut(job) => &job.history_events,
        }
    }

    pub fn last_run_date(&self) -> Option<DateTime<Utc>> {
        self.history_events().last().map(|e| e.date)
    }
}
