//! Value canonicalization for normalized tables
//!
//! Turns canonical-column text into typed [`CanonicalRecord`]s: sentinel
//! tokens become explicit absences, categorical text is case-folded,
//! measures are rounded half-to-even. Rows with uncoercible values are
//! rejected individually and the rest of the table continues.

use crate::config::PipelineConfig;
use crate::constants::{NOT_SUPPLIED_TOKENS, UNKNOWN_TOKEN};
use crate::error::Result;
use crate::models::{CanonicalRecord, FieldValue, NormalizedTable, RecordOrigin, RowRejection};
use crate::schema::{CANONICAL_COLUMNS, CATEGORICAL_FIELDS};
use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};
use polars::prelude::*;
use tracing::{debug, warn};

/// Canonicalized output of one table
#[derive(Debug, Default)]
pub struct CanonicalBatch {
    pub records: Vec<CanonicalRecord>,
    pub rejections: Vec<RowRejection>,
}

/// Field-level coercion failure before it is attached to a row
#[derive(Debug, PartialEq)]
struct FieldError {
    field: &'static str,
    value: String,
    expected: &'static str,
}

/// Row accessor over the canonical text columns of one table
struct TextColumns {
    columns: Vec<(&'static str, StringChunked)>,
}

impl TextColumns {
    fn new(frame: &DataFrame, names: &[&'static str]) -> Result<Self> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let series = frame
                .column(name)?
                .as_materialized_series()
                .cast(&DataType::String)?;
            columns.push((*name, series.str()?.clone()));
        }
        Ok(Self { columns })
    }

    fn get(&self, name: &str, row: usize) -> Option<&str> {
        self.columns
            .iter()
            .find(|(column, _)| *column == name)
            .and_then(|(_, values)| values.get(row))
    }
}

/// Canonicalizes values of normalized tables
#[derive(Debug, Clone)]
pub struct ValueCanonicalizer {
    precision: u32,
    fold_activity_case: bool,
}

impl ValueCanonicalizer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            precision: config.precision,
            fold_activity_case: config.fold_activity_case,
        }
    }

    /// Canonicalize every row of a normalized table
    pub fn canonicalize(&self, table: &NormalizedTable) -> Result<CanonicalBatch> {
        let columns = TextColumns::new(&table.frame, &CANONICAL_COLUMNS)?;
        let mut batch = CanonicalBatch::default();

        for index in 0..table.frame.height() {
            let origin = RecordOrigin {
                source_id: table.source_id.clone(),
                path: table.path.clone(),
                row: index + 1,
            };

            match self.canonicalize_row(&columns, index, table, &origin) {
                Ok(record) => batch.records.push(record),
                Err(error) => {
                    warn!(
                        "Rejecting row {} of source {}: field '{}' value {:?} is not {}",
                        origin.row, origin.source_id, error.field, error.value, error.expected
                    );
                    batch.rejections.push(RowRejection {
                        source_id: origin.source_id,
                        path: origin.path,
                        row: origin.row,
                        field: error.field.to_string(),
                        value: error.value,
                        expected: error.expected.to_string(),
                    });
                }
            }
        }

        debug!(
            "Canonicalized source {}: {} records, {} rejected",
            table.source_id,
            batch.records.len(),
            batch.rejections.len()
        );

        Ok(batch)
    }

    fn canonicalize_row(
        &self,
        columns: &TextColumns,
        index: usize,
        table: &NormalizedTable,
        origin: &RecordOrigin,
    ) -> std::result::Result<CanonicalRecord, FieldError> {
        let text = |name: &str| classify(columns.get(name, index));
        let categorical = |name: &str| text(name).map(|v| fold_categorical(&v));
        let field = |name: &str| {
            if CATEGORICAL_FIELDS.contains(&name) {
                categorical(name)
            } else {
                text(name)
            }
        };
        let measure =
            |name: &'static str| text(name).try_map(|v| parse_measure(name, &v, self.precision));

        let activity_name = if self.fold_activity_case {
            categorical("activity_name")
        } else {
            text("activity_name")
        };

        Ok(CanonicalRecord {
            activity_name,
            sector: field("sector"),
            category: field("category"),
            unit: field("unit"),
            kgco2e: measure("kgco2e")?,
            kgco2: measure("kgco2")?,
            kgch4: measure("kgch4")?,
            kgn2o: measure("kgn2o")?,
            assessment_report: field("assessment_report"),
            scope: field("scope"),
            lca: field("lca"),
            validity_year: text("validity_year").try_map(|v| parse_year(&v))?,
            region: field("region"),
            source: table.source_id.clone(),
            file_type: table.format,
            origin: origin.clone(),
        })
    }
}

/// Map a raw cell to a three-way value; sentinels become absences
pub fn classify(raw: Option<&str>) -> FieldValue<String> {
    let Some(raw) = raw else {
        return FieldValue::Null;
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNKNOWN_TOKEN) {
        return FieldValue::Null;
    }
    if NOT_SUPPLIED_TOKENS
        .iter()
        .any(|token| trimmed.eq_ignore_ascii_case(token))
    {
        return FieldValue::NotApplicable;
    }

    FieldValue::Present(raw.to_string())
}

/// Case-fold and right-trim a categorical value
pub fn fold_categorical(value: &str) -> String {
    value.to_lowercase().trim_end().to_string()
}

fn parse_measure(
    field: &'static str,
    value: &str,
    precision: u32,
) -> std::result::Result<f64, FieldError> {
    value
        .trim()
        .parse::<BigDecimal>()
        .ok()
        .and_then(|decimal| round_decimal(&decimal, precision))
        .ok_or_else(|| FieldError {
            field,
            value: value.to_string(),
            expected: "a number",
        })
}

fn parse_year(value: &str) -> std::result::Result<i32, FieldError> {
    let error = || FieldError {
        field: "validity_year",
        value: value.to_string(),
        expected: "a whole year",
    };

    let trimmed = value.trim();
    if let Ok(year) = trimmed.parse::<i32>() {
        return Ok(year);
    }

    // Spreadsheets hand back years as floats ("2021.0")
    let parsed = trimmed.parse::<f64>().map_err(|_| error())?;
    if parsed.is_finite() && parsed.fract() == 0.0 && parsed.abs() <= i32::MAX as f64 {
        Ok(parsed as i32)
    } else {
        Err(error())
    }
}

/// Round a decimal to `places` digits, ties to even
fn round_decimal(decimal: &BigDecimal, places: u32) -> Option<f64> {
    decimal
        .with_scale_round(places.into(), RoundingMode::HalfEven)
        .to_f64()
        .filter(|rounded| rounded.is_finite())
}

/// Round to `places` decimals, ties to even.
///
/// Works on the shortest decimal representation of `value`, so
/// `12.1234567` rounds exactly as written rather than by its binary
/// approximation.
pub fn round_half_even(value: f64, places: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }

    value
        .to_string()
        .parse::<BigDecimal>()
        .ok()
        .and_then(|decimal| round_decimal(&decimal, places))
        .unwrap_or(value)
}
