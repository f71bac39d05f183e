//! Store gateway seam.
//!
//! The pipeline only talks to the relational store through
//! [`StoreGateway`]: transactional bulk insert and plain queries. Schema
//! creation lives with the concrete store, never in the pipeline.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use tracing::warn;

/// A single SQL value crossing the gateway
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Real(value) => Some(*value),
            SqlValue::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

pub type Row = Vec<SqlValue>;

/// What a bulk insert does when a row violates a uniqueness constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// Surface the violation as an error
    Fail,
    /// Skip the conflicting row and count it as not inserted
    Ignore,
}

/// Transactional access to the relational store
pub trait StoreGateway {
    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    /// Insert every row into `table`; returns the number of rows actually written
    fn bulk_insert(
        &mut self,
        table: &str,
        columns: &[&str],
        rows: &[Row],
        on_conflict: OnConflict,
    ) -> Result<usize>;

    fn query(&mut self, sql: &str) -> Result<Vec<Row>>;
}

/// Run `f` inside one transaction: commit on success, roll back on error.
///
/// A failed commit is rolled back too, so the store never stays inside an
/// open transaction.
pub fn with_transaction<S, T, F>(store: &mut S, f: F) -> Result<T>
where
    S: StoreGateway + ?Sized,
    F: FnOnce(&mut S) -> Result<T>,
{
    store.begin()?;
    let outcome = f(store).and_then(|value| store.commit().map(|()| value));
    if let Err(error) = &outcome {
        if let Err(rollback_error) = store.rollback() {
            warn!("Rollback failed after '{}': {}", error, rollback_error);
        }
    }
    outcome
}
