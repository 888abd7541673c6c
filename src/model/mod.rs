pub mod action;
pub mod broker;
pub mod extracted_profile;
pub mod history;
pub mod job;
pub mod processor;
pub mod profile;
pub mod protocol;
pub mod query_data;
pub mod schedule;

pub use action::{Action, ActionType, DataSource};
pub use broker::{DataBroker, DataBrokerScheduleConfig, MirrorSite, OptOutType, Step, StepType};
pub use extracted_profile::{AddressCityState, ExtractedProfile};
pub use history::{EventType, HistoryEvent};
pub use job::{BrokerJobData, JobKind, OptOutJobData, ScanJobData};
pub use processor::{OperationType, filtered_and_sorted_job_data};
pub use profile::{DataBrokerProtectionProfile, ProfileQuery};
pub use protocol::{ActionRequest, CssResponse, CssResult};
pub use query_data::BrokerProfileQueryData;
