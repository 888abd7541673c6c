use std::collections::HashSet;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::profile::ProfileQuery;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressCityState {
    pub city: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_address: Option<String>,
}

impl AddressCityState {
    pub fn new(city: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            state: state.into(),
            full_address: None,
        }
    }
}

/// A possibly partial record a broker returned for a scan.
///
/// `==` compares names only, which is what collection de-duplication wants.
/// Use [`ExtractedProfile::does_match_extracted_profile`] to decide whether
/// two records are the same person.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternative_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_full: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<AddressCityState>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_numbers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relatives: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl PartialEq for ExtractedProfile {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl ExtractedProfile {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Key used when persisting: the profile URL, or the broker's own
    /// identifier when no URL was extracted.
    pub fn persistence_key(&self) -> Option<&str> {
        self.profile_url
            .as_deref()
            .or(self.identifier.as_deref())
    }

    pub fn is_removed(&self) -> bool {
        self.removed_date.is_some()
    }

    /// Same person as `other`?
    ///
    /// Age and name must be equal. Alternative names, addresses and
    /// relatives only need one side to contain the other, because brokers
    /// reveal a different amount of detail on each visit.
    pub fn does_match_extracted_profile(&self, other: &ExtractedProfile) -> bool {
        self.age == other.age
            && self.name == other.name
            && is_subset_or_superset(
                self.alternative_names.as_deref(),
                other.alternative_names.as_deref(),
            )
            && is_subset_or_superset(self.addresses.as_deref(), other.addresses.as_deref())
            && is_subset_or_superset(self.relatives.as_deref(), other.relatives.as_deref())
    }

    /// Fill a missing name and age from the query that produced this record.
    pub fn merge(&self, query: &ProfileQuery) -> ExtractedProfile {
        ExtractedProfile {
            name: self.name.clone().or_else(|| Some(query.full_name())),
            age: self.age.clone().or_else(|| Some(query.age().to_string())),
            ..self.clone()
        }
    }
}

fn is_subset_or_superset<T: Eq + Hash>(a: Option<&[T]>, b: Option<&[T]>) -> bool {
    let a: HashSet<&T> = a.unwrap_or_default().iter().collect();
    let b: HashSet<&T> = b.unwrap_or_default().iter().collect();
    a.is_subset(&b) || b.is_subset(&a)
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    }))
}
