//! Configuration management and validation.
//!
//! Every input the pipeline needs (source files, store location, alias
//! table, structural rules, precision) lives in one [`PipelineConfig`]
//! passed to the pipeline entry point.

use crate::constants::{
    DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_DATA_DIR, DEFAULT_DATABASE_PATH,
    DEFAULT_MAX_CONCURRENT_READS, DEFAULT_PRECISION, MAX_PRECISION,
};
use crate::error::{LoaderError, Result};
use crate::schema::{canonicalize_column_name, default_aliases, is_canonical};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One input file and the source it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub source_id: String,
    pub path: PathBuf,
}

impl SourceSpec {
    pub fn new(source_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.into(),
            path: path.into(),
        }
    }
}

/// Split rule for sources that pack two canonical fields into one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRule {
    /// Source the rule applies to
    pub source_id: String,
    /// Raw header of the combined column
    pub column: String,
    pub delimiter: String,
    /// Raw headers of the two resulting columns
    pub targets: [String; 2],
}

impl SplitRule {
    pub fn new(
        source_id: impl Into<String>,
        column: impl Into<String>,
        delimiter: impl Into<String>,
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            column: column.into(),
            delimiter: delimiter.into(),
            targets: [first.into(), second.into()],
        }
    }
}

/// SQLite store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATABASE_PATH),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Global configuration for an emission-factor load
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Explicit input files; takes precedence over discovery
    pub sources: Vec<SourceSpec>,

    /// Directory scanned for `<source_id>/<file>` when `sources` is empty
    pub data_dir: Option<PathBuf>,

    /// Store settings
    pub database: DatabaseConfig,

    /// Decimal places kept for numeric measures
    pub precision: u32,

    /// Lowercase activity names as well as the categorical fields
    pub fold_activity_case: bool,

    /// Canonicalized raw header -> canonical column
    pub column_aliases: BTreeMap<String, String>,

    /// Per-source structural transforms
    pub split_rules: Vec<SplitRule>,

    /// Maximum source files read concurrently
    pub max_concurrent_reads: usize,

    /// Normalize and canonicalize only; leave the store untouched
    pub dry_run: bool,

    /// Draw a progress bar while reading sources
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            data_dir: Some(PathBuf::from(DEFAULT_DATA_DIR)),
            database: DatabaseConfig::default(),
            precision: DEFAULT_PRECISION,
            fold_activity_case: false,
            column_aliases: default_aliases(),
            split_rules: vec![SplitRule::new(
                "S1",
                "Sector-Category",
                "/",
                "Sector",
                "Category",
            )],
            max_concurrent_reads: DEFAULT_MAX_CONCURRENT_READS,
            dry_run: false,
            show_progress: true,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file; missing keys take defaults
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| LoaderError::configuration(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the pipeline relies on
    pub fn validate(&self) -> Result<()> {
        if self.precision > MAX_PRECISION {
            return Err(LoaderError::configuration(format!(
                "precision {} exceeds the maximum of {}",
                self.precision, MAX_PRECISION
            )));
        }

        if self.max_concurrent_reads == 0 {
            return Err(LoaderError::configuration(
                "max_concurrent_reads must be at least 1",
            ));
        }

        if let Some(spec) = self.sources.iter().find(|s| s.source_id.trim().is_empty()) {
            return Err(LoaderError::configuration(format!(
                "source {} has an empty source_id",
                spec.path.display()
            )));
        }

        for rule in &self.split_rules {
            if rule.delimiter.is_empty() {
                return Err(LoaderError::configuration(format!(
                    "split rule for source {} has an empty delimiter",
                    rule.source_id
                )));
            }
        }

        for (raw, canonical) in &self.column_aliases {
            if !is_canonical(canonical) {
                return Err(LoaderError::configuration(format!(
                    "alias '{}' targets unknown column '{}'",
                    raw, canonical
                )));
            }
        }

        Ok(())
    }

    /// Split rule configured for a source, if any
    pub fn split_rule_for(&self, source_id: &str) -> Option<&SplitRule> {
        self.split_rules.iter().find(|r| r.source_id == source_id)
    }

    /// Canonical column a canonicalized header resolves to
    pub fn resolve_alias<'a>(&'a self, canonical_header: &'a str) -> &'a str {
        self.column_aliases
            .get(canonical_header)
            .map(String::as_str)
            .unwrap_or(canonical_header)
    }

    /// Add an explicit source file
    pub fn with_source(mut self, source_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.sources.push(SourceSpec::new(source_id, path));
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database.path = path.into();
        self
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_fold_activity_case(mut self) -> Self {
        self.fold_activity_case = true;
        self
    }

    /// Register an extra header alias; the raw header is canonicalized first
    pub fn with_alias(mut self, raw: &str, canonical: impl Into<String>) -> Self {
        self.column_aliases
            .insert(canonicalize_column_name(raw), canonical.into());
        self
    }

    pub fn with_split_rule(mut self, rule: SplitRule) -> Self {
        self.split_rules.retain(|r| r.source_id != rule.source_id);
        self.split_rules.push(rule);
        self
    }

    pub fn without_split_rules(mut self) -> Self {
        self.split_rules.clear();
        self
    }

    pub fn with_max_concurrent_reads(mut self, max_reads: usize) -> Self {
        self.max_concurrent_reads = max_reads;
        self
    }

    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }
}
