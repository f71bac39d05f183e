//! Core data structures for emission-factor loading.
//!
//! Defines source file formats, the three-way optional value used for
//! canonical fields, canonical records, dimension keys and run reports.

use crate::constants::{NOT_APPLICABLE_MEMBER, UNKNOWN_MEMBER};
use crate::error::LoaderError;
use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Tabular file formats accepted by the source reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Xlsx,
}

impl FileFormat {
    /// Detect format from the file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_string_lossy().to_lowercase();
        match extension.as_str() {
            "csv" => Some(FileFormat::Csv),
            "xlsx" => Some(FileFormat::Xlsx),
            _ => None,
        }
    }

    /// Tag stored in the `file_type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical field value that keeps "unknown" and "not supplied" apart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue<T> {
    Present(T),
    /// Value truly absent or explicitly unknown
    Null,
    /// Value withheld by the source ("not supplied")
    NotApplicable,
}

impl<T> FieldValue<T> {
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> FieldValue<U> {
        match self {
            FieldValue::Present(value) => FieldValue::Present(f(value)),
            FieldValue::Null => FieldValue::Null,
            FieldValue::NotApplicable => FieldValue::NotApplicable,
        }
    }

    /// Apply a fallible conversion to a present value, keeping absences as-is
    pub fn try_map<U, E, F: FnOnce(T) -> Result<U, E>>(self, f: F) -> Result<FieldValue<U>, E> {
        Ok(match self {
            FieldValue::Present(value) => FieldValue::Present(f(value)?),
            FieldValue::Null => FieldValue::Null,
            FieldValue::NotApplicable => FieldValue::NotApplicable,
        })
    }
}

impl FieldValue<String> {
    /// Text used when this value is part of a dimension natural key.
    ///
    /// Absences become reserved member names so every fact can reference a
    /// real dimension row.
    pub fn natural_key(&self) -> String {
        match self {
            FieldValue::Present(value) => value.clone(),
            FieldValue::Null => UNKNOWN_MEMBER.to_string(),
            FieldValue::NotApplicable => NOT_APPLICABLE_MEMBER.to_string(),
        }
    }
}

/// Where a canonical record came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOrigin {
    pub source_id: String,
    pub path: PathBuf,
    /// 1-based data row within the source file (header excluded)
    pub row: usize,
}

/// One row conforming to the canonical column set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub activity_name: FieldValue<String>,
    pub sector: FieldValue<String>,
    pub category: FieldValue<String>,
    pub unit: FieldValue<String>,
    pub kgco2e: FieldValue<f64>,
    pub kgco2: FieldValue<f64>,
    pub kgch4: FieldValue<f64>,
    pub kgn2o: FieldValue<f64>,
    pub assessment_report: FieldValue<String>,
    pub scope: FieldValue<String>,
    pub lca: FieldValue<String>,
    pub validity_year: FieldValue<i32>,
    pub region: FieldValue<String>,
    pub source: String,
    pub file_type: FileFormat,
    pub origin: RecordOrigin,
}

impl CanonicalRecord {
    pub fn activity_key(&self) -> ActivityKey {
        ActivityKey {
            name: self.activity_name.natural_key(),
            sector: self.sector.natural_key(),
            category: self.category.natural_key(),
        }
    }
}

/// Natural key of the activity dimension
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityKey {
    pub name: String,
    pub sector: String,
    pub category: String,
}

impl fmt::Display for ActivityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{})", self.name, self.sector, self.category)
    }
}

/// Dimension tables of the star schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DimensionKind {
    Activity,
    Region,
    Source,
    Unit,
    Status,
}

impl DimensionKind {
    pub const ALL: [DimensionKind; 5] = [
        DimensionKind::Activity,
        DimensionKind::Region,
        DimensionKind::Source,
        DimensionKind::Unit,
        DimensionKind::Status,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionKind::Activity => "activity",
            DimensionKind::Region => "region",
            DimensionKind::Source => "source",
            DimensionKind::Unit => "unit",
            DimensionKind::Status => "status",
        }
    }
}

impl fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status seeded into the status dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactStatus {
    PendingReview,
    Approved,
    Rejected,
}

impl FactStatus {
    pub const ALL: [FactStatus; 3] = [
        FactStatus::PendingReview,
        FactStatus::Approved,
        FactStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactStatus::PendingReview => "pending_review",
            FactStatus::Approved => "approved",
            FactStatus::Rejected => "rejected",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FactStatus::PendingReview => "Pending review by user",
            FactStatus::Approved => "Approved by user",
            FactStatus::Rejected => "Rejected by user",
        }
    }
}

/// Raw table read from one source file, all values as text
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub source_id: String,
    pub path: PathBuf,
    pub format: FileFormat,
    pub frame: DataFrame,
}

/// Source table reshaped to the canonical column set
#[derive(Debug, Clone)]
pub struct NormalizedTable {
    pub source_id: String,
    pub path: PathBuf,
    pub format: FileFormat,
    pub frame: DataFrame,
    /// Source columns with no canonical counterpart
    pub dropped_columns: Vec<String>,
}

/// A row excluded from the batch because a field could not be coerced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRejection {
    pub source_id: String,
    pub path: PathBuf,
    pub row: usize,
    pub field: String,
    pub value: String,
    pub expected: String,
}

impl RowRejection {
    pub fn to_error(&self) -> LoaderError {
        LoaderError::TypeCoercion {
            source_id: self.source_id.clone(),
            row: self.row,
            field: self.field.clone(),
            value: self.value.clone(),
            expected: self.expected.clone(),
        }
    }
}

impl fmt::Display for RowRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.to_error(), self.path.display())
    }
}

/// Column dropped during normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedColumn {
    pub source_id: String,
    pub column: String,
}

/// Dimension rows inserted by this run versus rows available afterwards
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionCount {
    pub inserted: usize,
    pub total: usize,
}

/// Per-dimension counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionCounts {
    pub activities: DimensionCount,
    pub regions: DimensionCount,
    pub sources: DimensionCount,
    pub units: DimensionCount,
    pub statuses: DimensionCount,
}

impl DimensionCounts {
    pub fn get(&self, kind: DimensionKind) -> DimensionCount {
        match kind {
            DimensionKind::Activity => self.activities,
            DimensionKind::Region => self.regions,
            DimensionKind::Source => self.sources,
            DimensionKind::Unit => self.units,
            DimensionKind::Status => self.statuses,
        }
    }

    pub fn total_inserted(&self) -> usize {
        DimensionKind::ALL
            .iter()
            .map(|kind| self.get(*kind).inserted)
            .sum()
    }
}

/// Summary of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadReport {
    pub started_at: DateTime<Utc>,
    pub files_read: usize,
    pub rows_read: usize,
    pub rows_loaded: usize,
    pub facts_inserted: usize,
    pub rejections: Vec<RowRejection>,
    pub dropped_columns: Vec<DroppedColumn>,
    pub dimensions: DimensionCounts,
    pub dry_run: bool,
    pub processing_time_ms: u128,
}

impl LoadReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            files_read: 0,
            rows_read: 0,
            rows_loaded: 0,
            facts_inserted: 0,
            rejections: Vec::new(),
            dropped_columns: Vec::new(),
            dimensions: DimensionCounts::default(),
            dry_run: false,
            processing_time_ms: 0,
        }
    }

    pub fn rows_rejected(&self) -> usize {
        self.rejections.len()
    }
}
