use comfy_table::{Cell, Table};

use crate::db::Database;
use crate::model::profile::{DataBrokerProtectionProfile, ProfileAddress, ProfileName};

/// "First Last" or "First Middle Last"; anything between the first and last
/// word is the middle name.
fn parse_name(raw: &str) -> anyhow::Result<ProfileName> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    match parts.as_slice() {
        [] | [_] => anyhow::bail!("Name '{raw}' needs at least a first and a last name"),
        [first, last] => Ok(ProfileName {
            first_name: first.to_string(),
            last_name: last.to_string(),
            middle_name: None,
            suffix: None,
        }),
        [first, middle @ .., last] => Ok(ProfileName {
            first_name: first.to_string(),
            last_name: last.to_string(),
            middle_name: Some(middle.join(" ")),
            suffix: None,
        }),
    }
}

/// "City,ST"
fn parse_location(raw: &str) -> anyhow::Result<ProfileAddress> {
    let Some((city, state)) = raw.rsplit_once(',') else {
        anyhow::bail!("Location '{raw}' must look like City,ST");
    };
    let (city, state) = (city.trim(), state.trim());
    if city.is_empty() || state.len() != 2 {
        anyhow::bail!("Location '{raw}' must look like City,ST");
    }
    Ok(ProfileAddress {
        city: city.to_string(),
        state: state.to_uppercase(),
        street: None,
        zip_code: None,
    })
}

pub fn build_profile(
    names: &[String],
    locations: &[String],
    phones: &[String],
    birth_year: i32,
) -> anyhow::Result<DataBrokerProtectionProfile> {
    Ok(DataBrokerProtectionProfile {
        names: names.iter().map(|n| parse_name(n)).collect::<anyhow::Result<_>>()?,
        addresses: locations
            .iter()
            .map(|l| parse_location(l))
            .collect::<anyhow::Result<_>>()?,
        phones: phones.to_vec(),
        birth_year,
    })
}

pub fn set_profile(
    db: &Database,
    names: &[String],
    locations: &[String],
    phones: &[String],
    birth_year: i32,
) -> anyhow::Result<()> {
    let profile = build_profile(names, locations, phones, birth_year)?;
    let summary = db.save_profile(&profile)?;
    println!(
        "Profile saved: {} new searches, {} unchanged, {} retired",
        summary.added, summary.kept, summary.deprecated
    );
    Ok(())
}

pub fn show_profile(db: &Database) -> anyhow::Result<()> {
    let queries = db.list_profile_queries()?;

    if queries.is_empty() {
        println!("No profile set. Run `broker-scrub profile set` first.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Location", "Birth Year", "Active"]);
    for q in &queries {
        table.add_row(vec![
            Cell::new(q.id.map(|id| id.to_string()).unwrap_or_default()),
            Cell::new(q.full_name()),
            Cell::new(format!("{}, {}", q.city, q.state)),
            Cell::new(q.birth_year),
            Cell::new(if q.deprecated { "no" } else { "yes" }),
        ]);
    }

    println!("{table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_name() {
        let name = parse_name("Jane Doe").unwrap();
        assert_eq!((name.first_name.as_str(), name.last_name.as_str()), ("Jane", "Doe"));
        assert_eq!(name.middle_name, None);

        let name = parse_name("  Mary Ann Lee Smith ").unwrap();
        assert_eq!(name.middle_name.as_deref(), Some("Ann Lee"));
        assert_eq!(name.last_name, "Smith");

        assert!(parse_name("Cher").is_err());
        assert!(parse_name("   ").is_err());
    }

    #[test]
    fn test_parse_location() {
        let loc = parse_location("St. Louis, mo").unwrap();
        assert_eq!(loc.city, "St. Louis");
        assert_eq!(loc.state, "MO");

        assert!(parse_location("Miami").is_err());
        assert!(parse_location(",FL").is_err());
        assert!(parse_location("Miami,Florida").is_err());
    }

    #[test]
    fn test_set_profile_stores_queries() {
        let db = Database::open_in_memory().unwrap();
        set_profile(
            &db,
            &["Jane Doe".into(), "Jane Smith".into()],
            &["Miami,FL".into()],
            &[],
            1984,
        )
        .unwrap();
        let queries = db.list_profile_queries().unwrap();
        assert_eq!(queries.len(), 2);
        assert!(queries.iter().all(|q| q.birth_year == 1984 && q.state == "FL"));
    }
}
