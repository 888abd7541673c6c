use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileName {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileAddress {
    pub city: String,
    pub state: String,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
}

/// What the user entered: every name they go by and every place they lived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataBrokerProtectionProfile {
    pub names: Vec<ProfileName>,
    pub addresses: Vec<ProfileAddress>,
    #[serde(default)]
    pub phones: Vec<String>,
    pub birth_year: i32,
}

impl DataBrokerProtectionProfile {
    /// One query per name × address combination.
    pub fn profile_queries(&self) -> Vec<ProfileQuery> {
        let phone = self.phones.first().cloned();
        self.names
            .iter()
            .flat_map(|name| {
                self.addresses.iter().map(|address| ProfileQuery {
                    id: None,
                    first_name: name.first_name.clone(),
                    last_name: name.last_name.clone(),
                    middle_name: name.middle_name.clone(),
                    suffix: name.suffix.clone(),
                    city: address.city.clone(),
                    state: address.state.clone(),
                    street: address.street.clone(),
                    zip_code: address.zip_code.clone(),
                    phone: phone.clone(),
                    birth_year: self.birth_year,
                    deprecated: false,
                })
            })
            .collect()
    }
}

/// One concrete search input run against a broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    pub city: String,
    pub state: String,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub birth_year: i32,
    #[serde(default)]
    pub deprecated: bool,
}

impl ProfileQuery {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        birth_year: i32,
    ) -> Self {
        Self {
            id: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
            middle_name: None,
            suffix: None,
            city: city.into(),
            state: state.into(),
            street: None,
            zip_code: None,
            phone: None,
            birth_year,
            deprecated: false,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn full_name(&self) -> String {
        [
            Some(self.first_name.as_str()),
            self.middle_name.as_deref(),
            Some(self.last_name.as_str()),
            self.suffix.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }

    pub fn age(&self) -> i32 {
        self.age_at(Utc::now())
    }

    pub fn age_at(&self, date: DateTime<Utc>) -> i32 {
        date.year() - self.birth_year
    }

    /// Same person and place, ignoring storage id and deprecation.
    pub fn same_search_input(&self, other: &ProfileQuery) -> bool {
        self.first_name == other.first_name
            && self.last_name == other.last_name
            && self.middle_name == other.middle_name
            && self.suffix == other.suffix
            && self.city == other.city
            && self.state == other.state
            && self.street == other.street
            && self.zip_code == other.zip_code
            && self.birth_year == other.birth_year
    }

    /// Wire shape the automation runtime expects for the `userProfile` field.
    /// `age` and `fullName` are derived; the rest decodes back into the same
    /// query.
    pub fn to_user_profile_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "firstName": self.first_name,
            "lastName": self.last_name,
            "middleName": self.middle_name,
            "suffix": self.suffix,
            "city": self.city,
            "state": self.state,
            "street": self.street,
            "zipCode": self.zip_code,
            "phone": self.phone,
            "birthYear": self.birth_year,
            "age": self.age(),
            "fullName": self.full_name(),
            "deprecated": self.deprecated,
        })
    }
}
