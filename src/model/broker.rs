use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::action::Action;
use super::history::EventType;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepType {
    Scan,
    OptOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OptOutType {
    FormOptOut,
    ParentSiteOptOut,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub step_type: StepType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opt_out_type: Option<OptOutType>,
    pub actions: Vec<Action>,
}

impl Step {
    pub fn new(step_type: StepType, actions: Vec<Action>) -> Self {
        Self {
            step_type,
            scan_type: None,
            opt_out_type: None,
            actions,
        }
    }
}

/// Longest accepted cadence: one year.
pub const MAX_INTERVAL_HOURS: i64 = 24 * 365;

/// Broker cadences, in hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataBrokerScheduleConfig {
    pub retry_error: i64,
    pub confirm_opt_out_scan: i64,
    pub maintenance_scan: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<i64>,
}

impl DataBrokerScheduleConfig {
    pub fn new(retry_error: i64, confirm_opt_out_scan: i64, maintenance_scan: i64) -> Self {
        Self {
            retry_error,
            confirm_opt_out_scan,
            maintenance_scan,
            max_attempts: None,
        }
    }

    /// `None` when the hours do not fit a `Duration`.
    pub fn retry_error_interval(&self) -> Option<Duration> {
        Duration::try_hours(self.retry_error)
    }

    pub fn confirm_opt_out_scan_interval(&self) -> Option<Duration> {
        Duration::try_hours(self.confirm_opt_out_scan)
    }

    pub fn maintenance_scan_interval(&self) -> Option<Duration> {
        Duration::try_hours(self.maintenance_scan)
    }

    /// Wait before the next run when `event` is the last thing that happened.
    pub fn interval_after(&self, event: &EventType) -> Option<Duration> {
        match event {
            EventType::Error { .. } => self.retry_error_interval(),
            EventType::OptOutRequested { .. } => self.confirm_opt_out_scan_interval(),
            EventType::NoMatchFound
            | EventType::MatchFound { .. }
            | EventType::OptOutStarted { .. }
            | EventType::OptOutConfirmed { .. }
            | EventType::ScanStarted => self.maintenance_scan_interval(),
        }
    }

    /// Every cadence must lie in `1..=MAX_INTERVAL_HOURS`.
    pub fn validate(&self, broker: &str) -> Result<(), ConfigError> {
        let cadences = [
            ("retryError", self.retry_error),
            ("confirmOptOutScan", self.confirm_opt_out_scan),
            ("maintenanceScan", self.maintenance_scan),
        ];
        for (field, hours) in cadences {
            if !(1..=MAX_INTERVAL_HOURS).contains(&hours) {
                return Err(ConfigError::InvalidSchedule {
                    broker: broker.to_string(),
                    field,
                    hours,
                    max: MAX_INTERVAL_HOURS,
                });
            }
        }
        Ok(())
    }

    /// `None` when attempts are unlimited (absent or non-positive).
    pub fn attempt_limit(&self) -> Option<usize> {
        self.max_attempts
            .filter(|max| *max > 0)
            .and_then(|max| usize::try_from(max).ok())
    }
}

/// Another site that republishes a broker's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorSite {
    pub name: String,
    pub url: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub added_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub removed_at: Option<DateTime<Utc>>,
}

impl MirrorSite {
    pub fn was_removed(&self, since: DateTime<Utc>) -> bool {
        self.removed_at.is_some_and(|removed| removed < since)
    }
}

impl<'de> Deserialize<'de> for MirrorSite {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawMirrorSite {
            name: String,
            #[serde(default)]
            url: Option<String>,
            #[serde(with = "chrono::serde::ts_milliseconds")]
            added_at: DateTime<Utc>,
            #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
            removed_at: Option<DateTime<Utc>>,
        }

        let raw = RawMirrorSite::deserialize(deserializer)?;
        Ok(MirrorSite {
            url: raw.url.unwrap_or_else(|| raw.name.clone()),
            name: raw.name,
            added_at: raw.added_at,
            removed_at: raw.removed_at,
        })
    }
}

/// Static description of a broker: what to run for scans and opt-outs and
/// how often.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataBroker {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub url: String,
    pub steps: Vec<Step>,
    pub version: String,
    pub scheduling_config: DataBrokerScheduleConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub mirror_sites: Vec<MirrorSite>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub added_datetime: Option<DateTime<Utc>>,
}

impl DataBroker {
    pub fn new(
        name: impl Into<String>,
        steps: Vec<Step>,
        scheduling_config: DataBrokerScheduleConfig,
    ) -> Self {
        let name = name.into();
        Self {
            id: None,
            url: name.clone(),
            name,
            steps,
            version: "1.0.0".into(),
            scheduling_config,
            parent: None,
            mirror_sites: Vec::new(),
            added_datetime: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Decode and require a usable scan step.
    pub fn from_json_validated(json: &str) -> Result<Self, ConfigError> {
        let broker = Self::from_json(json)?;
        broker.validate()?;
        Ok(broker)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let count = self
            .steps
            .iter()
            .filter(|s| s.step_type == StepType::Scan)
            .count();
        match count {
            0 => return Err(ConfigError::UnrecoverableError(self.name.clone())),
            1 => {}
            _ => {
                return Err(ConfigError::DuplicateScanStep {
                    broker: self.name.clone(),
                    count,
                });
            }
        }
        self.scheduling_config.validate(&self.name)
    }

    pub fn scan_step(&self) -> Result<&Step, ConfigError> {
        self.steps
            .iter()
            .find(|s| s.step_type == StepType::Scan)
            .ok_or_else(|| ConfigError::UnrecoverableError(self.name.clone()))
    }

    pub fn opt_out_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.step_type == StepType::OptOut)
    }

    pub fn is_child(&self) -> bool {
        self.parent.is_some()
    }

    /// Opt-outs for this broker happen as part of the parent site's flow.
    pub fn performs_opt_out_within_parent(&self) -> bool {
        self.opt_out_step()
            .and_then(|step| step.opt_out_type.as_ref())
            .is_some_and(|t| *t == OptOutType::ParentSiteOptOut)
    }

    pub fn active_mirror_sites(&self, at: DateTime<Utc>) -> Vec<&MirrorSite> {
        self.mirror_sites
            .iter()
            .filter(|m| !m.was_removed(at))
            .collect()
    }
}

impl<'de> Deserialize<'de> for DataBroker {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawStep {
            #[serde(default)]
            step_type: Option<StepType>,
            #[serde(default)]
            scan_type: Option<String>,
            #[serde(default)]
            opt_out_type: Option<OptOutType>,
            #[serde(default)]
            actions: Vec<Action>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawDataBroker {
            #[serde(default)]
            id: Option<i64>,
            name: String,
            #[serde(default)]
            url: Option<String>,
            #[serde(default)]
            steps: Vec<RawStep>,
            #[serde(default)]
            version: String,
            scheduling_config: DataBrokerScheduleConfig,
            #[serde(default)]
            parent: Option<String>,
            #[serde(default)]
            mirror_sites: Vec<MirrorSite>,
            #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
            added_datetime: Option<DateTime<Utc>>,
        }

        let raw = RawDataBroker::deserialize(deserializer)?;
        let steps = raw
            .steps
            .into_iter()
            .enumerate()
            .map(|(position, step)| Step {
                // Older definitions leave the type implied by position.
                step_type: step.step_type.unwrap_or(if position == 0 {
                    StepType::Scan
                } else {
                    StepType::OptOut
                }),
                scan_type: step.scan_type,
                opt_out_type: step.opt_out_type,
                actions: step.actions,
            })
            .collect();

        Ok(DataBroker {
            id: raw.id,
            url: raw.url.unwrap_or_else(|| raw.name.clone()),
            name: raw.name,
            steps,
            version: raw.version,
            scheduling_config: raw.scheduling_config,
            parent: raw.parent,
            mirror_sites: raw.mirror_sites,
            added_datetime: raw.added_datetime,
        })
    }
}
