use rusqlite::Connection;

const MIGRATIONS: &[&str] = &[
    // Migration 1: brokers, profile queries, jobs and their history
    "CREATE TABLE IF NOT EXISTS brokers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        definition TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
        updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    );

    CREATE TABLE IF NOT EXISTS profile_queries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        middle_name TEXT,
        suffix TEXT,
        city TEXT NOT NULL,
        state TEXT NOT NULL,
        street TEXT,
        zip_code TEXT,
        phone TEXT,
        birth_year INTEGER NOT NULL,
        deprecated INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS scan_jobs (
        broker_id INTEGER NOT NULL REFERENCES brokers(id),
        profile_query_id INTEGER NOT NULL REFERENCES profile_queries(id),
        preferred_run_date TEXT,
        PRIMARY KEY (broker_id, profile_query_id)
    );

    CREATE TABLE IF NOT EXISTS opt_out_jobs (
        extracted_profile_id TEXT PRIMARY KEY,
        broker_id INTEGER NOT NULL,
        profile_query_id INTEGER NOT NULL,
        created_date TEXT NOT NULL,
        preferred_run_date TEXT,
        extracted_profile TEXT NOT NULL,
        FOREIGN KEY (broker_id, profile_query_id) REFERENCES scan_jobs(broker_id, profile_query_id)
    );

    CREATE TABLE IF NOT EXISTS history_events (
        id TEXT PRIMARY KEY,
        broker_id INTEGER NOT NULL,
        profile_query_id INTEGER NOT NULL,
        extracted_profile_id TEXT,
        event TEXT NOT NULL,
        date TEXT NOT NULL,
        FOREIGN KEY (broker_id, profile_query_id) REFERENCES scan_jobs(broker_id, profile_query_id)
    );

    CREATE INDEX IF NOT EXISTS idx_history_events_job
        ON history_events(broker_id, profile_query_id, extracted_profile_id);",
];

pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY)")?;

    let current_version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |row| row.get(0),
    )?;

    for (i, sql) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i64;
        if version > current_version {
            conn.execute_batch(sql)?;
            conn.execute("INSERT INTO _migrations (version) VALUES (?1)", [version])?;
            tracing::info!("Applied migration {version}");
        }
    }

    Ok(())
}
