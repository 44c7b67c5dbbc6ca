//! libSQL backend.
//!
//! One connection is opened at startup and shared by every store call;
//! `libsql::Connection` is cheap to clone and safe for concurrent async use.
//! Store implementations live in `recovery.rs`.

mod recovery;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use libsql::Connection;

use crate::db::Database;
use crate::db::libsql_migrations;
use crate::error::DatabaseError;

pub struct LibSqlBackend {
    // Keeps the database handle alive for as long as the connection is used.
    _db: libsql::Database,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file. Migrations are not run here.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("failed to open libSQL database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("failed to create connection: {e}")))?;

        tracing::info!(path = %path.display(), "libSQL database opened");
        Ok(Self { _db: db, conn })
    }

    /// In-memory database with the schema applied.
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("failed to create in-memory database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("failed to create connection: {e}")))?;
        let backend = Self { _db: db, conn };
        backend.run_migrations().await?;
        Ok(backend)
    }

    pub(crate) async fn connect(&self) -> Result<Connection, DatabaseError> {
        Ok(self.conn.clone())
    }
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute_batch(libsql_migrations::SCHEMA)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(())
    }
}

// ==================== Row helpers ====================

pub(crate) fn get_text(row: &libsql::Row, idx: i32) -> String {
    row.get::<String>(idx).unwrap_or_default()
}

/// NULL (or a non-text value) decodes as `None`.
pub(crate) fn get_opt_text(row: &libsql::Row, idx: i32) -> Option<String> {
    row.get::<String>(idx).ok()
}

pub(crate) fn get_i64(row: &libsql::Row, idx: i32) -> i64 {
    row.get::<i64>(idx).unwrap_or_default()
}

pub(crate) fn opt_text(value: Option<&str>) -> libsql::Value {
    match value {
        Some(text) => libsql::Value::Text(text.to_string()),
        None => libsql::Value::Null,
    }
}

pub(crate) fn opt_ts(value: Option<DateTime<Utc>>) -> libsql::Value {
    match value {
        Some(ts) => libsql::Value::Text(fmt_ts(&ts)),
        None => libsql::Value::Null,
    }
}

/// Fixed-width RFC 3339 so stored timestamps order lexically.
pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn fmt_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Accepts RFC 3339 as written by this backend and SQLite's `datetime('now')` form.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp '{raw}': {e}"))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| format!("invalid date '{raw}': {e}"))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::{fmt_date, fmt_ts, parse_date, parse_timestamp};

    #[test]
    fn timestamps_are_fixed_width_and_parse_back() {
        let early = Utc.with_ymd_and_hms(2026, 3, 9, 8, 0, 0).single().expect("ts");
        let later = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).single().expect("ts");
        assert!(fmt_ts(&early) < fmt_ts(&later));
        assert_eq!(fmt_ts(&early).len(), fmt_ts(&later).len());
        assert_eq!(parse_timestamp(&fmt_ts(&early)).expect("parse"), early);
    }

    #[test]
    fn sqlite_datetime_output_is_accepted() {
        let parsed = parse_timestamp("2026-03-09 08:00:00").expect("parse");
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 3, 9, 8, 0, 0).single().expect("ts"));
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn dates_use_iso_calendar_form() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).expect("date");
        assert_eq!(fmt_date(&date), "2026-01-05");
        assert_eq!(parse_date("2026-01-05").expect("parse"), date);
        assert!(parse_date("01/05/2026").is_err());
    }
}
