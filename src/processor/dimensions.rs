//! Dimension resolution for the star schema
//!
//! Every natural key referenced by a batch is upserted into its dimension
//! table and mapped back to the surrogate id the store assigned. Each
//! dimension is one transaction: conflict-ignoring insert, then requery.

use crate::constants::{DESCRIPTION_PREFIX, tables};
use crate::error::{LoaderError, Result};
use crate::models::{
    ActivityKey, CanonicalRecord, DimensionCount, DimensionCounts, DimensionKind, FactStatus,
};
use crate::store::{OnConflict, Row, SqlValue, StoreGateway, with_transaction};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Natural key to surrogate id, per dimension
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DimensionMappings {
    pub activities: HashMap<ActivityKey, i64>,
    pub regions: HashMap<String, i64>,
    pub sources: HashMap<String, i64>,
    pub units: HashMap<String, i64>,
    pub statuses: HashMap<String, i64>,
}

impl DimensionMappings {
    pub fn activity_id(&self, key: &ActivityKey) -> Option<i64> {
        self.activities.get(key).copied()
    }

    pub fn region_id(&self, name: &str) -> Option<i64> {
        self.regions.get(name).copied()
    }

    pub fn source_id(&self, name: &str) -> Option<i64> {
        self.sources.get(name).copied()
    }

    pub fn unit_id(&self, name: &str) -> Option<i64> {
        self.units.get(name).copied()
    }

    pub fn status_id(&self, status: FactStatus) -> Option<i64> {
        self.statuses.get(status.as_str()).copied()
    }
}

/// Outcome of resolving all dimensions for a batch
#[derive(Debug, Clone, Default)]
pub struct ResolvedDimensions {
    pub mappings: DimensionMappings,
    pub counts: DimensionCounts,
}

/// Upserts dimension members and builds the id mappings
#[derive(Debug, Default, Clone)]
pub struct DimensionResolver;

impl DimensionResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the five dimensions one after the other on `store`
    pub fn resolve<S>(&self, store: &mut S, records: &[CanonicalRecord]) -> Result<ResolvedDimensions>
    where
        S: StoreGateway + ?Sized,
    {
        let mut resolved = ResolvedDimensions::default();

        let (count, activities) = resolve_activities(store, records)?;
        resolved.counts.activities = count;
        resolved.mappings.activities = activities;

        let regions: BTreeSet<String> = records.iter().map(|r| r.region.natural_key()).collect();
        let (count, map) = upsert_named(
            store,
            DimensionKind::Region,
            tables::REGIONS,
            "region_id",
            &["name"],
            regions.into_iter().map(|name| vec![SqlValue::from(name)]).collect(),
        )?;
        resolved.counts.regions = count;
        resolved.mappings.regions = map;

        // First file type seen wins for a source spanning formats
        let mut sources: BTreeMap<String, &'static str> = BTreeMap::new();
        for record in records {
            sources
                .entry(record.source.clone())
                .or_insert_with(|| record.file_type.as_str());
        }
        let (count, map) = upsert_named(
            store,
            DimensionKind::Source,
            tables::SOURCES,
            "source_id",
            &["source_name", "source_description", "file_type"],
            sources
                .into_iter()
                .map(|(name, file_type)| {
                    let description = format!("{}{}", DESCRIPTION_PREFIX, name);
                    vec![
                        SqlValue::from(name),
                        SqlValue::from(description),
                        SqlValue::from(file_type),
                    ]
                })
                .collect(),
        )?;
        resolved.counts.sources = count;
        resolved.mappings.sources = map;

        let units: BTreeSet<String> = records.iter().map(|r| r.unit.natural_key()).collect();
        let (count, map) = upsert_named(
            store,
            DimensionKind::Unit,
            tables::UNITS,
            "unit_id",
            &["name", "description"],
            units
                .into_iter()
                .map(|name| {
                    let description = format!("{}{}", DESCRIPTION_PREFIX, name);
                    vec![SqlValue::from(name), SqlValue::from(description)]
                })
                .collect(),
        )?;
        resolved.counts.units = count;
        resolved.mappings.units = map;

        let (count, map) = upsert_named(
            store,
            DimensionKind::Status,
            tables::STATUS,
            "status_id",
            &["name", "description"],
            FactStatus::ALL
                .iter()
                .map(|status| {
                    vec![
                        SqlValue::from(status.as_str()),
                        SqlValue::from(status.description()),
                    ]
                })
                .collect(),
        )?;
        resolved.counts.statuses = count;
        resolved.mappings.statuses = map;

        info!(
            "Resolved dimensions: {} new rows ({} activities, {} regions, {} sources, {} units)",
            resolved.counts.total_inserted(),
            resolved.counts.activities.total,
            resolved.counts.regions.total,
            resolved.counts.sources.total,
            resolved.counts.units.total
        );

        Ok(resolved)
    }
}

fn resolve_activities<S>(
    store: &mut S,
    records: &[CanonicalRecord],
) -> Result<(DimensionCount, HashMap<ActivityKey, i64>)>
where
    S: StoreGateway + ?Sized,
{
    let keys: BTreeSet<ActivityKey> = records.iter().map(CanonicalRecord::activity_key).collect();
    warn_case_collisions(&keys);

    let rows: Vec<Row> = keys
        .iter()
        .map(|key| {
            vec![
                SqlValue::from(key.name.as_str()),
                SqlValue::from(key.sector.as_str()),
                SqlValue::from(key.category.as_str()),
            ]
        })
        .collect();

    let (inserted, stored) = with_transaction(store, |store| {
        let inserted = store.bulk_insert(
            tables::ACTIVITIES,
            &["activity_name", "sector", "category"],
            &rows,
            OnConflict::Ignore,
        )?;
        let stored = store.query(&format!(
            "SELECT activity_id, activity_name, sector, category FROM {}",
            tables::ACTIVITIES
        ))?;
        Ok((inserted, stored))
    })?;

    let mut map = HashMap::with_capacity(stored.len());
    for row in &stored {
        let id = row_id(DimensionKind::Activity, row)?;
        let key = ActivityKey {
            name: row_text(DimensionKind::Activity, row, 1)?,
            sector: row_text(DimensionKind::Activity, row, 2)?,
            category: row_text(DimensionKind::Activity, row, 3)?,
        };
        map.insert(key, id);
    }

    debug!(
        "Activity dimension: {} inserted, {} total",
        inserted,
        map.len()
    );

    Ok((
        DimensionCount {
            inserted,
            total: map.len(),
        },
        map,
    ))
}

/// Upsert a dimension keyed by its first column and map names to ids
fn upsert_named<S>(
    store: &mut S,
    kind: DimensionKind,
    table: &str,
    id_column: &str,
    columns: &[&str],
    rows: Vec<Row>,
) -> Result<(DimensionCount, HashMap<String, i64>)>
where
    S: StoreGateway + ?Sized,
{
    let key_column = columns[0];
    let (inserted, stored) = with_transaction(store, |store| {
        let inserted = store.bulk_insert(table, columns, &rows, OnConflict::Ignore)?;
        let stored = store.query(&format!(
            "SELECT {}, {} FROM {}",
            id_column, key_column, table
        ))?;
        Ok((inserted, stored))
    })?;

    let mut map = HashMap::with_capacity(stored.len());
    for row in &stored {
        map.insert(row_text(kind, row, 1)?, row_id(kind, row)?);
    }

    debug!("{} dimension: {} inserted, {} total", kind, inserted, map.len());

    Ok((
        DimensionCount {
            inserted,
            total: map.len(),
        },
        map,
    ))
}

fn row_id(kind: DimensionKind, row: &Row) -> Result<i64> {
    row.first().and_then(SqlValue::as_i64).ok_or_else(|| {
        LoaderError::store(
            format!("requery {}", kind),
            "row without an integer id",
        )
    })
}

fn row_text(kind: DimensionKind, row: &Row, index: usize) -> Result<String> {
    row.get(index)
        .and_then(SqlValue::as_text)
        .map(str::to_string)
        .ok_or_else(|| {
            LoaderError::store(
                format!("requery {}", kind),
                format!("column {} is not text", index),
            )
        })
}

/// Activity keys that only differ by letter case become separate rows
fn warn_case_collisions(keys: &BTreeSet<ActivityKey>) {
    let mut folded: HashMap<(String, &str, &str), &ActivityKey> = HashMap::new();
    for key in keys {
        let fold = (key.name.to_lowercase(), key.sector.as_str(), key.category.as_str());
        if let Some(previous) = folded.insert(fold, key) {
            warn!(
                "Activities '{}' and '{}' differ only by case and are stored separately",
                previous.name, key.name
            );
        }
    }
}
