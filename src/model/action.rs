use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Navigate,
    Extract,
    FillForm,
    Click,
    Expectation,
    EmailConfirmation,
    GetCaptchaInfo,
    SolveCaptcha,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Navigate => "navigate",
            ActionType::Extract => "extract",
            ActionType::FillForm => "fillForm",
            ActionType::Click => "click",
            ActionType::Expectation => "expectation",
            ActionType::EmailConfirmation => "emailConfirmation",
            ActionType::GetCaptchaInfo => "getCaptchaInfo",
            ActionType::SolveCaptcha => "solveCaptcha",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which profile the runtime should read field values from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataSource {
    #[default]
    UserProfile,
    ExtractedProfile,
}

/// One instruction for the automation runtime.
///
/// The `actionType` discriminant is the serde tag, so a broker definition's
/// action objects decode straight into the matching variant and encode back
/// with the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "actionType", rename_all = "camelCase")]
pub enum Action {
    Navigate(NavigateAction),
    Extract(ExtractAction),
    FillForm(FillFormAction),
    Click(ClickAction),
    Expectation(ExpectationAction),
    EmailConfirmation(EmailConfirmationAction),
    GetCaptchaInfo(GetCaptchaInfoAction),
    SolveCaptcha(SolveCaptchaAction),
}

impl Action {
    pub fn id(&self) -> &str {
        match self {
            Action::Navigate(a) => &a.id,
            Action::Extract(a) => &a.id,
            Action::FillForm(a) => &a.id,
            Action::Click(a) => &a.id,
            Action::Expectation(a) => &a.id,
            Action::EmailConfirmation(a) => &a.id,
            Action::GetCaptchaInfo(a) => &a.id,
            Action::SolveCaptcha(a) => &a.id,
        }
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            Action::Navigate(_) => ActionType::Navigate,
            Action::Extract(_) => ActionType::Extract,
            Action::FillForm(_) => ActionType::FillForm,
            Action::Click(_) => ActionType::Click,
            Action::Expectation(_) => ActionType::Expectation,
            Action::EmailConfirmation(_) => ActionType::EmailConfirmation,
            Action::GetCaptchaInfo(_) => ActionType::GetCaptchaInfo,
            Action::SolveCaptcha(_) => ActionType::SolveCaptcha,
        }
    }

    /// True when an email address must be generated before this action runs.
    pub fn needs_email(&self) -> bool {
        match self {
            Action::FillForm(a) => a.elements.iter().any(|e| e.element_type == "email"),
            Action::Navigate(_)
            | Action::Extract(_)
            | Action::Click(_)
            | Action::Expectation(_)
            | Action::EmailConfirmation(_)
            | Action::GetCaptchaInfo(_)
            | Action::SolveCaptcha(_) => false,
        }
    }

    pub fn data_source(&self) -> DataSource {
        let source = match self {
            Action::Navigate(a) => a.data_source,
            Action::Extract(a) => a.data_source,
            Action::FillForm(a) => a.data_source,
            Action::Click(a) => a.data_source,
            Action::Expectation(a) => a.data_source,
            Action::EmailConfirmation(a) => a.data_source,
            Action::GetCaptchaInfo(a) => a.data_source,
            Action::SolveCaptcha(a) => a.data_source,
        };
        source.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateAction {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractAction {
    pub id: String,
    pub selector: String,
    pub profile: ExtractProfileSelectors,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillFormAction {
    pub id: String,
    pub selector: String,
    #[serde(default)]
    pub elements: Vec<PageElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickAction {
    pub id: String,
    #[serde(default)]
    pub elements: Vec<PageElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectationAction {
    pub id: String,
    #[serde(default)]
    pub expectations: Vec<Expectation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
    /// Follow-up actions the runtime runs when the expectations hold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<Action>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailConfirmationAction {
    pub id: String,
    /// Seconds between mailbox polls.
    pub polling_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCaptchaInfoAction {
    pub id: String,
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveCaptchaAction {
    pub id: String,
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageElement {
    #[serde(rename = "type")]
    pub element_type: String,
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_silently: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentElement {
    pub profile_match: ProfileMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileMatch {
    pub selector: String,
    pub profile: ExtractProfileSelectors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpectationType {
    Text,
    Url,
    Element,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expectation {
    #[serde(rename = "type")]
    pub expectation_type: ExpectationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_silently: Option<bool>,
}

/// Where on the page each extracted field lives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractProfileSelectors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ProfileSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_names_list: Option<ProfileSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<ProfileSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_full: Option<ProfileSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_city_state: Option<ProfileSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_city_state_list: Option<ProfileSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<ProfileSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_list: Option<ProfileSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relatives_list: Option<ProfileSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<ProfileSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<ProfileSelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub find_elements: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}
