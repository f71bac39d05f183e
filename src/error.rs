//! Error handling for emission-factor loading operations.
//!
//! File-level and structural errors abort a run. Coercion errors are
//! row-scoped and collected into the run report instead of being raised.

use crate::models::DimensionKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Unsupported file format '{extension}' for source file: {path}")]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("Failed to read source file: {path} - {reason}")]
    Read { path: PathBuf, reason: String },

    #[error(
        "Structural mismatch in source {source_id} ({path}), column '{column}' row {row}: {reason}"
    )]
    StructuralMismatch {
        source_id: String,
        path: PathBuf,
        column: String,
        row: usize,
        reason: String,
    },

    #[error("Cannot coerce field '{field}' in source {source_id} row {row}: {value:?} is not {expected}")]
    TypeCoercion {
        source_id: String,
        row: usize,
        field: String,
        value: String,
        expected: String,
    },

    #[error("Unresolved {dimension} reference '{key}' in source {source_id} row {row}")]
    UnresolvedReference {
        dimension: DimensionKind,
        key: String,
        source_id: String,
        row: usize,
    },

    #[error("Store operation '{operation}' failed: {reason}")]
    Store { operation: String, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl LoaderError {
    pub fn store(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether the error only invalidates a single row rather than the run
    pub fn is_row_scoped(&self) -> bool {
        matches!(self, Self::TypeCoercion { .. })
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_coercion_is_row_scoped() {
        let coercion = LoaderError::TypeCoercion {
            source_id: "S2".to_string(),
            row: 4,
            field: "kgch4".to_string(),
            value: "abc".to_string(),
            expected: "a number".to_string(),
        };
        assert!(coercion.is_row_scoped());

        let unresolved = LoaderError::UnresolvedReference {
            dimension: DimensionKind::Region,
            key: "uk".to_string(),
            source_id: "S1".to_string(),
            row: 1,
        };
        assert!(!unresolved.is_row_scoped());
        assert!(!LoaderError::configuration("bad").is_row_scoped());
    }

    #[test]
    fn test_messages_identify_file_and_row() {
        let error = LoaderError::StructuralMismatch {
            source_id: "S1".to_string(),
            path: PathBuf::from("data-raw/S1/File 1-1.xlsx"),
            column: "Sector-Category".to_string(),
            row: 7,
            reason: "expected exactly one '/'".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("S1"));
        assert!(message.contains("File 1-1.xlsx"));
        assert!(message.contains("row 7"));

        let error = LoaderError::TypeCoercion {
            source_id: "S2".to_string(),
            row: 3,
            field: "kgch4".to_string(),
            value: "n/a".to_string(),
            expected: "a number".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Cannot coerce field 'kgch4' in source S2 row 3: \"n/a\" is not a number"
        );
    }
}
