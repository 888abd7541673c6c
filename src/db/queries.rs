use std::collections::HashMap;

use anyhow::Context;
use chrono::Utc;
use rusqlite::{Connection, Row, params};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Database, parse_date, parse_optional_date, to_sql_date};
use crate::model::broker::DataBroker;
use crate::model::history::{EventType, HistoryEvent};
use crate::model::job::{OptOutJobData, ScanJobData};
use crate::model::profile::{DataBrokerProtectionProfile, ProfileQuery};
use crate::model::query_data::BrokerProfileQueryData;

/// What [`Database::save_profile`] changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProfileSaveSummary {
    pub added: usize,
    pub kept: usize,
    pub deprecated: usize,
}

const QUERY_COLUMNS: &str = "id, first_name, last_name, middle_name, suffix, city, state, street, zip_code, phone, birth_year, deprecated";

fn query_from_row(row: &Row) -> rusqlite::Result<ProfileQuery> {
    Ok(ProfileQuery {
        id: Some(row.get(0)?),
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        middle_name: row.get(3)?,
        suffix: row.get(4)?,
        city: row.get(5)?,
        state: row.get(6)?,
        street: row.get(7)?,
        zip_code: row.get(8)?,
        phone: row.get(9)?,
        birth_year: row.get(10)?,
        deprecated: row.get(11)?,
    })
}

fn load_profile_queries(conn: &Connection) -> anyhow::Result<Vec<ProfileQuery>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {QUERY_COLUMNS} FROM profile_queries ORDER BY id"))?;
    let rows = stmt.query_map([], query_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn decode_broker(id: i64, definition: &str) -> anyhow::Result<DataBroker> {
    let broker = DataBroker::from_json(definition)
        .with_context(|| format!("Stored definition of broker {id} is unreadable"))?;
    Ok(broker.with_id(id))
}

fn load_brokers(conn: &Connection) -> anyhow::Result<Vec<DataBroker>> {
    let mut stmt = conn.prepare("SELECT id, definition FROM brokers ORDER BY name")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
    rows.map(|row| {
        let (id, definition) = row?;
        decode_broker(id, &definition)
    })
    .collect()
}

fn ensure_scan_jobs_for_query(conn: &Connection, query_id: i64, now: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR IGNORE INTO scan_jobs (broker_id, profile_query_id, preferred_run_date)
         SELECT id, ?1, ?2 FROM brokers",
        params![query_id, now],
    )
}

/// History rows grouped by job: (broker, query, extracted profile).
type JobKey = (i64, i64, Option<String>);

fn load_history(conn: &Connection) -> anyhow::Result<HashMap<JobKey, Vec<HistoryEvent>>> {
    let mut stmt = conn.prepare(
        "SELECT id, broker_id, profile_query_id, extracted_profile_id, event, date
         FROM history_events ORDER BY rowid",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut history: HashMap<JobKey, Vec<HistoryEvent>> = HashMap::new();
    for row in rows {
        let (id, broker_id, query_id, profile_id, event, date) = row?;
        let event_type: EventType = serde_json::from_str(&event)
            .with_context(|| format!("Unreadable history event {id}"))?;
        history
            .entry((broker_id, query_id, profile_id))
            .or_default()
            .push(HistoryEvent {
                id: Uuid::parse_str(&id)?,
                event_type,
                date: parse_date(&date)?,
            });
    }
    Ok(history)
}

fn insert_events(
    conn: &Connection,
    broker_id: i64,
    query_id: i64,
    profile_id: Option<&str>,
    events: &[HistoryEvent],
) -> anyhow::Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO history_events (id, broker_id, profile_query_id, extracted_profile_id, event, date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut inserted = 0;
    for event in events {
        inserted += stmt.execute(params![
            event.id.to_string(),
            broker_id,
            query_id,
            profile_id,
            serde_json::to_string(&event.event_type)?,
            to_sql_date(event.date),
        ])?;
    }
    Ok(inserted)
}

impl Database {
    // --- Brokers ---

    /// Insert or replace a broker definition by name and give it a scan job
    /// for every active profile query. Returns the broker's id.
    pub fn upsert_broker(&self, broker: &DataBroker) -> anyhow::Result<i64> {
        let definition = serde_json::to_string(&DataBroker {
            id: None,
            ..broker.clone()
        })?;
        let now = to_sql_date(Utc::now());
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO brokers (name, definition, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(name) DO UPDATE SET
                definition = excluded.definition,
                updated_at = excluded.updated_at",
            params![broker.name, definition, now],
        )?;
        let id: i64 = conn.query_row(
            "SELECT id FROM brokers WHERE name = ?1",
            params![broker.name],
            |row| row.get(0),
        )?;
        let created = conn.execute(
            "INSERT OR IGNORE INTO scan_jobs (broker_id, profile_query_id, preferred_run_date)
             SELECT ?1, id, ?2 FROM profile_queries WHERE deprecated = 0",
            params![id, now],
        )?;
        debug!(broker = %broker.name, id, scan_jobs = created, "Stored broker");
        Ok(id)
    }

    pub fn list_brokers(&self) -> anyhow::Result<Vec<DataBroker>> {
        let conn = self.conn.lock().unwrap();
        load_brokers(&conn)
    }

    pub fn get_broker(&self, name: &str) -> anyhow::Result<Option<DataBroker>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, definition FROM brokers WHERE name = ?1")?;
        let mut rows = stmt.query_map(params![name], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        match rows.next() {
            Some(row) => {
                let (id, definition) = row?;
                Ok(Some(decode_broker(id, &definition)?))
            }
            None => Ok(None),
        }
    }

    // --- Profile ---

    /// Replace the user's profile.
    ///
    /// Stored queries the new profile no longer produces are deprecated,
    /// not deleted, so their history survives. New queries get a scan job
    /// for every broker, due immediately.
    pub fn save_profile(
        &self,
        profile: &DataBrokerProtectionProfile,
    ) -> anyhow::Result<ProfileSaveSummary> {
        let wanted = profile.profile_queries();
        let now = to_sql_date(Utc::now());
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let mut known = load_profile_queries(&tx)?;
        let mut summary = ProfileSaveSummary::default();

        for stored in &known {
            let still_wanted = wanted.iter().any(|w| w.same_search_input(stored));
            if still_wanted == stored.deprecated {
                tx.execute(
                    "UPDATE profile_queries SET deprecated = ?1 WHERE id = ?2",
                    params![!still_wanted, stored.id],
                )?;
            }
            if !still_wanted && !stored.deprecated {
                summary.deprecated += 1;
            }
        }

        for query in wanted {
            let id = match known.iter().find(|k| k.same_search_input(&query)) {
                Some(existing) => {
                    summary.kept += 1;
                    existing.id
                }
                None => {
                    tx.execute(
                        "INSERT INTO profile_queries (first_name, last_name, middle_name, suffix, city, state, street, zip_code, phone, birth_year)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                        params![
                            query.first_name,
                            query.last_name,
                            query.middle_name,
                            query.suffix,
                            query.city,
                            query.state,
                            query.street,
                            query.zip_code,
                            query.phone,
                            query.birth_year,
                        ],
                    )?;
                    let id = tx.last_insert_rowid();
                    known.push(query.with_id(id));
                    summary.added += 1;
                    Some(id)
                }
            };
            if let Some(id) = id {
                ensure_scan_jobs_for_query(&tx, id, &now)?;
            }
        }

        tx.commit()?;
        Ok(summary)
    }

    pub fn list_profile_queries(&self) -> anyhow::Result<Vec<ProfileQuery>> {
        let conn = self.conn.lock().unwrap();
        load_profile_queries(&conn)
    }

    // --- Jobs ---

    /// Every (broker, profile query) aggregate with its full history.
    pub fn load_all_query_data(&self) -> anyhow::Result<Vec<BrokerProfileQueryData>> {
        let conn = self.conn.lock().unwrap();
        let brokers = load_brokers(&conn)?;
        let queries = load_profile_queries(&conn)?;
        let mut history = load_history(&conn)?;

        let mut stmt = conn.prepare(
            "SELECT broker_id, profile_query_id, preferred_run_date
             FROM scan_jobs ORDER BY broker_id, profile_query_id",
        )?;
        let scan_rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT extracted_profile_id, broker_id, profile_query_id, created_date, preferred_run_date, extracted_profile
             FROM opt_out_jobs ORDER BY rowid",
        )?;
        let opt_out_rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = Vec::with_capacity(scan_rows.len());
        for (broker_id, query_id, preferred) in scan_rows {
            let Some(broker) = brokers.iter().find(|b| b.id == Some(broker_id)) else {
                warn!(broker_id, "Scan job for unknown broker");
                continue;
            };
            let Some(query) = queries.iter().find(|q| q.id == Some(query_id)) else {
                warn!(profile_query_id = query_id, "Scan job for unknown profile query");
                continue;
            };

            let scan = ScanJobData {
                broker_id,
                profile_query_id: query_id,
                preferred_run_date: parse_optional_date(preferred)?,
                history_events: history.remove(&(broker_id, query_id, None)).unwrap_or_default(),
            };
            let mut data = BrokerProfileQueryData::new(broker.clone(), query.clone(), scan);

            for (profile_id, _, _, created, preferred, profile) in opt_out_rows
                .iter()
                .filter(|row| row.1 == broker_id && row.2 == query_id)
            {
                let extracted_profile = serde_json::from_str(profile)
                    .with_context(|| format!("Unreadable extracted profile {profile_id}"))?;
                data.opt_out_job_data.push(OptOutJobData {
                    broker_id,
                    profile_query_id: query_id,
                    created_date: parse_date(created)?,
                    preferred_run_date: parse_optional_date(preferred.clone())?,
                    history_events: history
                        .remove(&(broker_id, query_id, Some(profile_id.clone())))
                        .unwrap_or_default(),
                    extracted_profile,
                });
            }
            result.push(data);
        }
        Ok(result)
    }

    /// Write back one aggregate: preferred dates, extracted profiles, and
    /// any history events not stored yet.
    pub fn save_query_data(&self, data: &BrokerProfileQueryData) -> anyhow::Result<()> {
        let broker_id = data.scan_job_data.broker_id;
        let query_id = data.scan_job_data.profile_query_id;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO scan_jobs (broker_id, profile_query_id, preferred_run_date)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(broker_id, profile_query_id) DO UPDATE SET
                preferred_run_date = excluded.preferred_run_date",
            params![
                broker_id,
                query_id,
                data.scan_job_data.preferred_run_date.map(to_sql_date),
            ],
        )?;
        let mut inserted =
            insert_events(&tx, broker_id, query_id, None, &data.scan_job_data.history_events)?;

        for job in &data.opt_out_job_data {
            let Some(profile_id) = job.profile_id() else {
                anyhow::bail!("Opt-out job for broker {broker_id} has no extracted profile id");
            };
            let profile_id = profile_id.to_string();
            tx.execute(
                "INSERT INTO opt_out_jobs (extracted_profile_id, broker_id, profile_query_id, created_date, preferred_run_date, extracted_profile)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(extracted_profile_id) DO UPDATE SET
                    preferred_run_date = excluded.preferred_run_date,
                    extracted_profile = excluded.extracted_profile",
                params![
                    profile_id,
                    broker_id,
                    query_id,
                    to_sql_date(job.created_date),
                    job.preferred_run_date.map(to_sql_date),
                    serde_json::to_string(&job.extracted_profile)?,
                ],
            )?;
            inserted += insert_events(&tx, broker_id, query_id, Some(&profile_id), &job.history_events)?;
        }

        tx.commit()?;
        debug!(broker_id, profile_query_id = query_id, events = inserted, "Saved job data");
        Ok(())
    }
}
