use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventType {
    NoMatchFound,
    #[serde(rename_all = "camelCase")]
    MatchFound {
        profile_id: Uuid,
    },
    Error {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    OptOutStarted {
        profile_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    OptOutRequested {
        profile_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    OptOutConfirmed {
        profile_id: Uuid,
    },
    ScanStarted,
}

impl EventType {
    pub fn error(message: impl Into<String>) -> Self {
        EventType::Error {
            message: message.into(),
        }
    }

    /// Extracted profile the event is about, if any.
    pub fn profile_id(&self) -> Option<Uuid> {
        match self {
            EventType::MatchFound { profile_id }
            | EventType::OptOutStarted { profile_id }
            | EventType::OptOutRequested { profile_id }
            | EventType::OptOutConfirmed { profile_id } => Some(*profile_id),
            EventType::NoMatchFound | EventType::Error { .. } | EventType::ScanStarted => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, EventType::Error { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            EventType::NoMatchFound => "noMatchFound",
            EventType::MatchFound { .. } => "matchFound",
            EventType::Error { .. } => "error",
            EventType::OptOutStarted { .. } => "optOutStarted",
            EventType::OptOutRequested { .. } => "optOutRequested",
            EventType::OptOutConfirmed { .. } => "optOutConfirmed",
            EventType::ScanStarted => "scanStarted",
        }
    }
}

/// One immutable step in a job's life.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    pub id: Uuid,
    #[serde(flatten)]
    pub event_type: EventType,
    pub date: DateTime<Utc>,
}

impl HistoryEvent {
    pub fn new(event_type: EventType, date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            date,
        }
    }

    pub fn now(event_type: EventType) -> Self {
        Self::new(event_type, Utc::now())
    }
}
