//! Schema normalization onto the canonical column set
//!
//! Applies, in order: the source-specific split rule, header
//! canonicalization, alias resolution and reindexing to canonical order.

use crate::config::{PipelineConfig, SplitRule};
use crate::error::{LoaderError, Result};
use crate::models::{NormalizedTable, SourceTable};
use crate::schema::{CANONICAL_COLUMNS, FILE_TYPE_COLUMN, SOURCE_COLUMN, canonicalize_column_name};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Maps source-specific layouts onto the canonical schema
#[derive(Debug, Clone)]
pub struct SchemaNormalizer {
    config: PipelineConfig,
}

impl SchemaNormalizer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Reshape one source table to the canonical columns
    pub fn normalize(&self, table: SourceTable) -> Result<NormalizedTable> {
        let SourceTable {
            source_id,
            path,
            format,
            frame,
        } = table;

        let frame = match self.config.split_rule_for(&source_id) {
            Some(rule) => apply_split(frame, rule, &path)?,
            None => frame,
        };

        let (frame, dropped_columns) = self.reindex(frame)?;

        if !dropped_columns.is_empty() {
            warn!(
                "Dropping {} unrecognized column(s) from source {} ({}): {}",
                dropped_columns.len(),
                source_id,
                path.display(),
                dropped_columns.join(", ")
            );
        }

        debug!(
            "Normalized {} rows from source {} ({})",
            frame.height(),
            source_id,
            path.display()
        );

        Ok(NormalizedTable {
            source_id,
            path,
            format,
            frame,
            dropped_columns,
        })
    }

    /// Rename, alias and reorder columns; returns the raw names left behind
    fn reindex(&self, frame: DataFrame) -> Result<(DataFrame, Vec<String>)> {
        let height = frame.height();
        let mut selected: HashMap<&'static str, Column> = HashMap::new();
        let mut dropped = Vec::new();

        // Reader-injected columns claim their slots before any raw header
        let (injected, raw_columns): (Vec<&Column>, Vec<&Column>) = frame
            .get_columns()
            .iter()
            .partition(|column| is_injected(column.name().as_str()));

        for column in injected.into_iter().chain(raw_columns) {
            let raw = column.name().as_str();
            let header = canonicalize_column_name(raw);
            let target = self.config.resolve_alias(&header);

            match CANONICAL_COLUMNS.iter().copied().find(|name| *name == target) {
                Some(name) if selected.contains_key(name) => {
                    warn!(
                        "Column '{}' duplicates canonical column '{}'; keeping the first",
                        raw, name
                    );
                    dropped.push(raw.to_string());
                }
                Some(name) => {
                    selected.insert(name, column.clone().with_name(name.into()));
                }
                None => dropped.push(raw.to_string()),
            }
        }

        let columns: Vec<Column> = CANONICAL_COLUMNS
            .iter()
            .map(|name| {
                selected.remove(name).unwrap_or_else(|| {
                    Column::full_null((*name).into(), height, &DataType::String)
                })
            })
            .collect();

        Ok((DataFrame::new(columns)?, dropped))
    }
}

fn is_injected(name: &str) -> bool {
    name == SOURCE_COLUMN || name == FILE_TYPE_COLUMN
}

/// Split the combined column into its two target columns and drop it
fn apply_split(frame: DataFrame, rule: &SplitRule, path: &std::path::Path) -> Result<DataFrame> {
    let mismatch = |row: usize, reason: String| LoaderError::StructuralMismatch {
        source_id: rule.source_id.clone(),
        path: path.to_path_buf(),
        column: rule.column.clone(),
        row,
        reason,
    };

    let wanted = canonicalize_column_name(&rule.column);
    let combined_name = frame
        .get_column_names()
        .into_iter()
        .find(|name| canonicalize_column_name(name.as_str()) == wanted)
        .map(|name| name.to_string())
        .ok_or_else(|| mismatch(0, "combined column is missing".to_string()))?;

    let series = frame
        .column(&combined_name)?
        .as_materialized_series()
        .clone();
    let values = series.str()?;

    let mut first = Vec::with_capacity(values.len());
    let mut second = Vec::with_capacity(values.len());

    for (index, value) in values.into_iter().enumerate() {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            None => {
                first.push(None);
                second.push(None);
            }
            Some(text) => {
                let parts: Vec<&str> = text.split(rule.delimiter.as_str()).collect();
                if parts.len() != 2 {
                    return Err(mismatch(
                        index + 1,
                        format!(
                            "expected exactly one '{}' in {:?}",
                            rule.delimiter, text
                        ),
                    ));
                }
                first.push(Some(parts[0].trim().to_string()));
                second.push(Some(parts[1].trim().to_string()));
            }
        }
    }

    let mut frame = frame.drop(&combined_name)?;
    frame.with_column(Column::new(rule.targets[0].as_str().into(), first))?;
    frame.with_column(Column::new(rule.targets[1].as_str().into(), second))?;
    Ok(frame)
}
