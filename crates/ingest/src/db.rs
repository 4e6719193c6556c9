use anyhow::{Context, Result};
use chamber_core::{Catalog, Chamber, RunStatus, SourceStatus};
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::pipeline::{RunSummary, SourceReport};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ingest_run (
    id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    fetched_records INTEGER NOT NULL DEFAULT 0,
    retained_events INTEGER NOT NULL DEFAULT 0,
    outcome TEXT,
    catalog_hash TEXT
);

CREATE TABLE IF NOT EXISTS source_fetch (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL REFERENCES ingest_run(id) ON DELETE CASCADE,
    source TEXT NOT NULL,
    chamber TEXT NOT NULL,
    url TEXT NOT NULL,
    candidates INTEGER NOT NULL DEFAULT 0,
    records INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_run_started ON ingest_run(started_at);
CREATE INDEX IF NOT EXISTS idx_fetch_run ON source_fetch(run_id);
"#;

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open run ledger {}", path.display()))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn start_run(conn: &Connection, run_id: &str, started_at: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO ingest_run (id, started_at) VALUES (?1, ?2)",
        rusqlite::params![run_id, started_at],
    )?;
    Ok(())
}

pub fn record_source_fetch(conn: &Connection, run_id: &str, report: &SourceReport) -> Result<i64> {
    conn.execute(
        "INSERT INTO source_fetch (run_id, source, chamber, url, candidates, records, error)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            run_id,
            report.source,
            report.chamber.as_str(),
            report.url,
            report.candidates as i64,
            report.records as i64,
            report.error,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn finish_run(conn: &Connection, summary: &RunSummary, finished_at: &str) -> Result<()> {
    conn.execute(
        "UPDATE ingest_run
         SET finished_at = ?2, fetched_records = ?3, retained_events = ?4, outcome = ?5, catalog_hash = ?6
         WHERE id = ?1",
        rusqlite::params![
            summary.run_id,
            finished_at,
            summary.fetched_records as i64,
            summary.retained_events as i64,
            summary.outcome.as_str(),
            summary.catalog_hash,
        ],
    )?;
    Ok(())
}

/// Close a run whose catalog write failed; nothing was retained.
pub fn fail_run(conn: &Connection, run_id: &str, fetched_records: usize, finished_at: &str) -> Result<()> {
    conn.execute(
        "UPDATE ingest_run
         SET finished_at = ?2, fetched_records = ?3, retained_events = 0, outcome = 'failed'
         WHERE id = ?1",
        rusqlite::params![run_id, finished_at, fetched_records as i64],
    )?;
    Ok(())
}

pub fn last_run(conn: &Connection) -> Result<Option<RunStatus>> {
    let run = conn
        .query_row(
            "SELECT id, started_at, finished_at, fetched_records, retained_events, outcome, catalog_hash
             FROM ingest_run
             ORDER BY started_at DESC, rowid DESC
             LIMIT 1",
            [],
            |row| {
                Ok(RunStatus {
                    run_id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    fetched_records: row.get(3)?,
                    retained_events: row.get(4)?,
                    outcome: row.get(5)?,
                    catalog_hash: row.get(6)?,
                    sources: Vec::new(),
                })
            },
        )
        .optional()?;

    let Some(mut run) = run else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT source, chamber, url, candidates, records, error
         FROM source_fetch
         WHERE run_id = ?1
         ORDER BY id ASC",
    )?;
    run.sources = stmt
        .query_map([&run.run_id], |row| {
            let chamber: String = row.get(1)?;
            Ok(SourceStatus {
                source: row.get(0)?,
                chamber: chamber.parse::<Chamber>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
                })?,
                url: row.get(2)?,
                candidates: row.get(3)?,
                records: row.get(4)?,
                error: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(run))
}

/// SHA-256 of the catalog exactly as the JSON store writes it.
pub fn catalog_hash(catalog: &Catalog) -> Result<String> {
    let json = serde_json::to_string_pretty(catalog).context("failed to serialize catalog")?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
