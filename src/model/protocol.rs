//! Messages exchanged with the automation runtime.
//!
//! Outbound: `{"state": {"action": {...}, "data": {...}}}`.
//! Inbound: `{"result": {"success": {...}}}` or `{"result": {"error": {...}}}`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::action::{Action, ActionType};
use super::extracted_profile::ExtractedProfile;
use super::profile::ProfileQuery;
use crate::error::ProtocolError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub state: ActionRequestState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequestState {
    pub action: Action,
    pub data: ActionData,
}

/// Payload sent with an action. A solved captcha carries only its token;
/// everything else carries the profile the runtime fills pages from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionData {
    Token(CaptchaToken),
    UserData(UserData),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaToken {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    #[serde(serialize_with = "serialize_user_profile")]
    pub user_profile: ProfileQuery,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_profile: Option<ExtractedProfile>,
}

fn serialize_user_profile<S>(query: &ProfileQuery, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    query.to_user_profile_json().serialize(serializer)
}

impl ActionRequest {
    pub fn with_user_data(
        action: Action,
        user_profile: &ProfileQuery,
        extracted_profile: Option<&ExtractedProfile>,
    ) -> Self {
        Self {
            state: ActionRequestState {
                action,
                data: ActionData::UserData(UserData {
                    user_profile: user_profile.clone(),
                    extracted_profile: extracted_profile.cloned(),
                }),
            },
        }
    }

    pub fn with_token(action: Action, token: impl Into<String>) -> Self {
        Self {
            state: ActionRequestState {
                action,
                data: ActionData::Token(CaptchaToken {
                    token: token.into(),
                }),
            },
        }
    }

    pub fn action(&self) -> &Action {
        &self.state.action
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigateResponse {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetCaptchaInfoResponse {
    pub site_key: String,
    pub url: String,
    #[serde(rename = "type")]
    pub captcha_type: String,
}

/// Action-specific payload of a successful result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CssResponse {
    Navigate(NavigateResponse),
    Extract(Vec<ExtractedProfile>),
    GetCaptchaInfo(GetCaptchaInfoResponse),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CssSuccessResponse {
    #[serde(rename = "actionID")]
    pub action_id: String,
    pub action_type: ActionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<CssResponse>,
}

impl<'de> Deserialize<'de> for CssSuccessResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct RawSuccess {
            #[serde(rename = "actionID")]
            action_id: String,
            action_type: ActionType,
            #[serde(default)]
            response: Option<serde_json::Value>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawNavigate {
            Object(NavigateResponse),
            Url(String),
        }

        let raw = RawSuccess::deserialize(deserializer)?;
        let payload = match raw.response.filter(|v| !v.is_null()) {
            None => None,
            Some(value) => match raw.action_type {
                ActionType::Navigate => {
                    let navigate = serde_json::from_value::<RawNavigate>(value)
                        .map_err(serde::de::Error::custom)?;
                    let url = match navigate {
                        RawNavigate::Object(navigate) => navigate.url,
                        RawNavigate::Url(url) => url,
                    };
                    Some(CssResponse::Navigate(NavigateResponse { url }))
                }
                ActionType::Extract => Some(CssResponse::Extract(
                    serde_json::from_value(value).map_err(serde::de::Error::custom)?,
                )),
                ActionType::GetCaptchaInfo => Some(CssResponse::GetCaptchaInfo(
                    serde_json::from_value(value).map_err(serde::de::Error::custom)?,
                )),
                // These carry no payload; anything sent along is ignored.
                ActionType::FillForm
                | ActionType::Click
                | ActionType::Expectation
                | ActionType::SolveCaptcha
                | ActionType::EmailConfirmation => None,
            },
        };

        Ok(CssSuccessResponse {
            action_id: raw.action_id,
            action_type: raw.action_type,
            response: payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CssErrorResponse {
    #[serde(rename = "actionID")]
    pub action_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CssResult {
    Success(CssSuccessResponse),
    Error(CssErrorResponse),
}

impl CssResult {
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|_| ProtocolError::ParsingErrorObjectFailed)?;
        Self::from_value(&value)
    }

    /// Decode a `{"result": ...}` envelope. Success is tried before error.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ProtocolError> {
        let result = value
            .get("result")
            .ok_or(ProtocolError::ParsingErrorObjectFailed)?;

        if let Some(success) = result.get("success")
            && let Ok(decoded) = CssSuccessResponse::deserialize(success)
        {
            return Ok(CssResult::Success(decoded));
        }

        if let Some(error) = result.get("error")
            && let Ok(decoded) = CssErrorResponse::deserialize(error)
        {
            return Ok(CssResult::Error(decoded));
        }

        Err(ProtocolError::ParsingErrorObjectFailed)
    }

    pub fn to_value(&self) -> Result<serde_json::Value, ProtocolError> {
        let (key, body) = match self {
            CssResult::Success(success) => ("success", serde_json::to_value(success)?),
            CssResult::Error(error) => ("error", serde_json::to_value(error)?),
        };
        let mut result = serde_json::Map::new();
        result.insert(key.to_string(), body);
        let mut envelope = serde_json::Map::new();
        envelope.insert("result".to_string(), serde_json::Value::Object(result));
        Ok(serde_json::Value::Object(envelope))
    }

    pub fn action_id(&self) -> &str {
        match self {
            CssResult::Success(success) => &success.action_id,
            CssResult::Error(error) => &error.action_id,
        }
    }
}
