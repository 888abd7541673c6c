pub mod migrations;
pub mod queries;

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

pub use queries::ProfileSaveSummary;

/// SQLite store for broker definitions, profile queries, jobs and their
/// history.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn to_sql_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339()
}

fn parse_date(value: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn parse_optional_date(value: Option<String>) -> anyhow::Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_date).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run() {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let conn = db.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        migrations::run_migrations(&conn).unwrap();
        let again: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(again, 1);
    }

    #[test]
    fn test_date_round_trip_keeps_precision() {
        let date = Utc::now();
        assert_eq!(parse_date(&to_sql_date(date)).unwrap(), date);
        assert_eq!(parse_optional_date(None).unwrap(), None);
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        Database::open(&path).unwrap();
        // Reopening applies no migration twice.
        assert!(Database::open(&path).is_ok());
    }
}
