//! SQLite implementation of the store gateway.

use super::{OnConflict, Row, SqlValue, StoreGateway};
use crate::config::DatabaseConfig;
use crate::error::{LoaderError, Result};
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql, params_from_iter};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// DDL for the star schema, applied only on explicit request
pub const SCHEMA_SQL: &str = include_str!("../../sql/create_emissions_tables.sql");

/// Store gateway over a single rusqlite connection
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file named by the configuration
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let conn = Connection::open(&config.path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        debug!("Opened SQLite store at {}", config.path.display());
        Self::from_connection(conn)
    }

    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(&DatabaseConfig {
            path: path.to_path_buf(),
            ..Default::default()
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Create the star-schema tables if they do not exist yet
    pub fn apply_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        debug!("Applied star schema");
        Ok(())
    }

    /// Number of rows currently in `table`
    pub fn count_rows(&self, table: &str) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
        Ok(count as usize)
    }

    fn insert_sql(table: &str, columns: &[&str], on_conflict: OnConflict) -> String {
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let conflict_clause = match on_conflict {
            OnConflict::Fail => "",
            OnConflict::Ignore => " ON CONFLICT DO NOTHING",
        };
        format!(
            "INSERT INTO {} ({}) VALUES ({}){}",
            table,
            columns.join(", "),
            placeholders,
            conflict_clause
        )
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            SqlValue::Integer(value) => ToSqlOutput::Borrowed(ValueRef::Integer(*value)),
            SqlValue::Real(value) => ToSqlOutput::Borrowed(ValueRef::Real(*value)),
            SqlValue::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(value) => SqlValue::Integer(value),
        ValueRef::Real(value) => SqlValue::Real(value),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl StoreGateway for SqliteStore {
    fn begin(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            return Err(LoaderError::store("begin", "a transaction is already open"));
        }
        // IMMEDIATE takes the write lock up front so a concurrent run cannot
        // slip rows in between our insert and requery
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn bulk_insert(
        &mut self,
        table: &str,
        columns: &[&str],
        rows: &[Row],
        on_conflict: OnConflict,
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = Self::insert_sql(table, columns, on_conflict);
        let mut statement = self.conn.prepare(&sql)?;
        let mut inserted = 0;

        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(LoaderError::store(
                    format!("insert into {}", table),
                    format!(
                        "row {} has {} values for {} columns",
                        index,
                        row.len(),
                        columns.len()
                    ),
                ));
            }
            inserted += statement.execute(params_from_iter(row.iter()))?;
        }

        debug!(
            "Inserted {} of {} rows into {}",
            inserted,
            rows.len(),
            table
        );
        Ok(inserted)
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        let mut statement = self.conn.prepare(sql)?;
        let column_count = statement.column_count();
        let mut rows = statement.query([])?;
        let mut result = Vec::new();

        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for index in 0..column_count {
                values.push(from_value_ref(row.get_ref(index)?));
            }
            result.push(values);
        }

        Ok(result)
    }
}
