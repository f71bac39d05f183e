//! Fact loading for the emission_factors table
//!
//! Canonical records become fact rows by substituting dimension ids. The
//! whole batch is written in one transaction, so a failed load leaves the
//! fact table untouched. Null and not-applicable both persist as SQL NULL;
//! the `not_applicable_fields` column records which was which.

use super::dimensions::DimensionMappings;
use crate::constants::{FACT_COLUMNS, NOT_APPLICABLE_SEPARATOR, tables};
use crate::error::{LoaderError, Result};
use crate::models::{CanonicalRecord, DimensionKind, FactStatus, FieldValue};
use crate::store::{OnConflict, Row, SqlValue, StoreGateway, with_transaction};
use tracing::{debug, info};

/// One fact row ready for insertion
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionFactorRow {
    pub activity_id: i64,
    pub unit_id: i64,
    pub region_id: i64,
    pub source_id: i64,
    pub scope: Option<String>,
    pub assessment_report: Option<String>,
    pub validity_year: Option<i32>,
    pub lca: Option<String>,
    pub kgco2e: Option<f64>,
    pub kgco2: Option<f64>,
    pub kgch4: Option<f64>,
    pub kgn2o: Option<f64>,
    pub status_id: i64,
    /// Context and measure fields the source withheld
    pub not_applicable_fields: Vec<&'static str>,
}

impl EmissionFactorRow {
    /// Values in [`FACT_COLUMNS`] order
    pub fn to_sql_row(&self) -> Row {
        let text = |value: &Option<String>| {
            value.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null)
        };
        let real = |value: Option<f64>| value.map(SqlValue::Real).unwrap_or(SqlValue::Null);

        vec![
            SqlValue::Integer(self.activity_id),
            SqlValue::Integer(self.unit_id),
            SqlValue::Integer(self.region_id),
            SqlValue::Integer(self.source_id),
            text(&self.scope),
            text(&self.assessment_report),
            self.validity_year
                .map(|year| SqlValue::Integer(year.into()))
                .unwrap_or(SqlValue::Null),
            text(&self.lca),
            real(self.kgco2e),
            real(self.kgco2),
            real(self.kgch4),
            real(self.kgn2o),
            SqlValue::Integer(self.status_id),
            if self.not_applicable_fields.is_empty() {
                SqlValue::Null
            } else {
                SqlValue::Text(
                    self.not_applicable_fields
                        .join(&NOT_APPLICABLE_SEPARATOR.to_string()),
                )
            },
        ]
    }
}

/// A persisted fact with its absences reconstructed
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEmissionFactor {
    pub emission_factor_id: i64,
    pub activity_id: i64,
    pub unit_id: i64,
    pub region_id: i64,
    pub source_id: i64,
    pub scope: FieldValue<String>,
    pub assessment_report: FieldValue<String>,
    pub validity_year: FieldValue<i32>,
    pub lca: FieldValue<String>,
    pub kgco2e: FieldValue<f64>,
    pub kgco2: FieldValue<f64>,
    pub kgch4: FieldValue<f64>,
    pub kgn2o: FieldValue<f64>,
    pub status_id: i64,
}

/// Split a field into its stored value and whether it was withheld
fn absence<T>(
    field: &'static str,
    value: &FieldValue<T>,
    withheld: &mut Vec<&'static str>,
) -> Option<T>
where
    T: Clone,
{
    match value {
        FieldValue::Present(value) => Some(value.clone()),
        FieldValue::Null => None,
        FieldValue::NotApplicable => {
            withheld.push(field);
            None
        }
    }
}

fn unresolved(kind: DimensionKind, key: impl ToString, record: &CanonicalRecord) -> LoaderError {
    LoaderError::UnresolvedReference {
        dimension: kind,
        key: key.to_string(),
        source_id: record.origin.source_id.clone(),
        row: record.origin.row,
    }
}

/// Build one fact row per record; fails on the first unmapped key
pub fn build_rows(
    records: &[CanonicalRecord],
    mappings: &DimensionMappings,
) -> Result<Vec<EmissionFactorRow>> {
    let status_id = mappings
        .status_id(FactStatus::PendingReview)
        .ok_or_else(|| LoaderError::UnresolvedReference {
            dimension: DimensionKind::Status,
            key: FactStatus::PendingReview.as_str().to_string(),
            source_id: String::new(),
            row: 0,
        })?;

    records
        .iter()
        .map(|record| {
            let activity_key = record.activity_key();
            let activity_id = mappings
                .activity_id(&activity_key)
                .ok_or_else(|| unresolved(DimensionKind::Activity, &activity_key, record))?;

            let unit_key = record.unit.natural_key();
            let unit_id = mappings
                .unit_id(&unit_key)
                .ok_or_else(|| unresolved(DimensionKind::Unit, &unit_key, record))?;

            let region_key = record.region.natural_key();
            let region_id = mappings
                .region_id(&region_key)
                .ok_or_else(|| unresolved(DimensionKind::Region, &region_key, record))?;

            let source_id = mappings
                .source_id(&record.source)
                .ok_or_else(|| unresolved(DimensionKind::Source, &record.source, record))?;

            let mut withheld = Vec::new();
            Ok(EmissionFactorRow {
                activity_id,
                unit_id,
                region_id,
                source_id,
                scope: absence("scope", &record.scope, &mut withheld),
                assessment_report: absence(
                    "assessment_report",
                    &record.assessment_report,
                    &mut withheld,
                ),
                validity_year: absence("validity_year", &record.validity_year, &mut withheld),
                lca: absence("lca", &record.lca, &mut withheld),
                kgco2e: absence("kgco2e", &record.kgco2e, &mut withheld),
                kgco2: absence("kgco2", &record.kgco2, &mut withheld),
                kgch4: absence("kgch4", &record.kgch4, &mut withheld),
                kgn2o: absence("kgn2o", &record.kgn2o, &mut withheld),
                status_id,
                not_applicable_fields: withheld,
            })
        })
        .collect()
}

/// Insert every fact in one transaction; returns the number of rows written
pub fn load<S>(
    store: &mut S,
    records: &[CanonicalRecord],
    mappings: &DimensionMappings,
) -> Result<usize>
where
    S: StoreGateway + ?Sized,
{
    let rows: Vec<Row> = build_rows(records, mappings)?
        .iter()
        .map(EmissionFactorRow::to_sql_row)
        .collect();

    debug!("Loading {} fact rows", rows.len());

    let inserted = with_transaction(store, |store| {
        store.bulk_insert(tables::EMISSION_FACTORS, FACT_COLUMNS, &rows, OnConflict::Fail)
    })?;

    info!("Loaded {} emission factors", inserted);
    Ok(inserted)
}

/// Read persisted facts back, restoring the null / not-applicable split
pub fn read_back<S>(store: &mut S) -> Result<Vec<StoredEmissionFactor>>
where
    S: StoreGateway + ?Sized,
{
    let sql = format!(
        "SELECT emission_factor_id, {} FROM {} ORDER BY emission_factor_id",
        FACT_COLUMNS.join(", "),
        tables::EMISSION_FACTORS
    );

    store.query(&sql)?.iter().map(decode_row).collect()
}

fn decode_row(row: &Row) -> Result<StoredEmissionFactor> {
    let malformed = |column: &str| LoaderError::store("read back facts", format!("malformed {}", column));
    let value = |index: usize| row.get(index).cloned().unwrap_or(SqlValue::Null);
    let id = |index: usize, column: &str| value(index).as_i64().ok_or_else(|| malformed(column));

    let withheld: Vec<String> = value(14)
        .as_text()
        .map(|text| {
            text.split(NOT_APPLICABLE_SEPARATOR)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let field = |name: &str, stored: Option<SqlValue>| -> FieldValue<SqlValue> {
        match stored {
            Some(value) => FieldValue::Present(value),
            None if withheld.iter().any(|w| w == name) => FieldValue::NotApplicable,
            None => FieldValue::Null,
        }
    };
    let stored = |index: usize| Some(value(index)).filter(|v| !v.is_null());

    let text = |name: &str, index: usize| -> Result<FieldValue<String>> {
        field(name, stored(index)).try_map(|v| {
            v.as_text().map(str::to_string).ok_or_else(|| malformed(name))
        })
    };
    let real = |name: &str, index: usize| -> Result<FieldValue<f64>> {
        field(name, stored(index)).try_map(|v| v.as_f64().ok_or_else(|| malformed(name)))
    };

    Ok(StoredEmissionFactor {
        emission_factor_id: id(0, "emission_factor_id")?,
        activity_id: id(1, "activity_id")?,
        unit_id: id(2, "unit_id")?,
        region_id: id(3, "region_id")?,
        source_id: id(4, "source_id")?,
        scope: text("scope", 5)?,
        assessment_report: text("assessment_report", 6)?,
        validity_year: field("validity_year", stored(7)).try_map(|v| {
            v.as_i64()
                .and_then(|year| i32::try_from(year).ok())
                .ok_or_else(|| malformed("validity_year"))
        })?,
        lca: text("lca", 8)?,
        kgco2e: real("kgco2e", 9)?,
        kgco2: real("kgco2", 10)?,
        kgch4: real("kgch4", 11)?,
        kgn2o: real("kgn2o", 12)?,
        status_id: id(13, "status_id")?,
    })
}
