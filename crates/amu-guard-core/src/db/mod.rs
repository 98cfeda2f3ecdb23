//! Database layer for amu-guard.
//!
//! `Database` implements every repository trait in [`crate::store`]. Methods
//! take `&self`; multi-statement writes run inside a transaction so a failure
//! leaves no partial rows behind.

mod biomass;
mod farms;
mod feed;
mod risk_records;
mod samples;
mod schema;
mod treatments;

pub use schema::*;

use chrono::NaiveDate;
use rusqlite::{ffi, Connection, ErrorCode};
use std::path::Path;
use thiserror::Error;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// A unique row already exists (e.g., a second request for a treatment)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Attempt to change a locked or write-once row
    #[error("Immutable record: {0}")]
    Immutable(String),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Translate constraint failures into domain errors.
///
/// Unique/primary-key violations become `Conflict`; trigger aborts and other
/// constraint failures become `Constraint` with SQLite's message.
pub(crate) fn map_write_error(err: rusqlite::Error, what: &str) -> DbError {
    if let rusqlite::Error::SqliteFailure(failure, message) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            let detail = message.clone().unwrap_or_else(|| what.to_string());
            return match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    DbError::Conflict(format!("{}: {}", what, detail))
                }
                _ => DbError::Constraint(detail),
            };
        }
    }
    DbError::Sqlite(err)
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_date(value: &str) -> DbResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| DbError::InvalidData(format!("Bad date '{}': {}", value, e)))
}

pub(crate) fn parse_optional_date(value: Option<String>) -> DbResult<Option<NaiveDate>> {
    value.as_deref().map(parse_date).transpose()
}
