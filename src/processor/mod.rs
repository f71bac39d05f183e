//! Normalization-and-load pipeline.
//!
//! Orchestrates the complete emission-factor workflow using specialized
//! modules for source discovery, reading, schema normalization, value
//! canonicalization, dimension resolution and fact loading.

pub mod canonicalizer;
pub mod dimensions;
pub mod discovery;
pub mod facts;
pub mod normalizer;
pub mod reader;

#[cfg(test)]
pub mod tests;

use self::{
    canonicalizer::ValueCanonicalizer,
    dimensions::DimensionResolver,
    discovery::SourceDiscovery,
    normalizer::SchemaNormalizer,
    reader::{FileSourceReader, SourceReader},
};

use crate::config::{PipelineConfig, SourceSpec};
use crate::error::{LoaderError, Result};
use crate::models::{
    CanonicalRecord, DroppedColumn, LoadReport, RowRejection, SourceTable,
};
use crate::store::StoreGateway;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tracing::{debug, info, warn};

/// Unified, canonicalized record set ready for loading
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    pub records: Vec<CanonicalRecord>,
    pub rejections: Vec<RowRejection>,
    pub dropped_columns: Vec<DroppedColumn>,
    pub files_read: usize,
    pub rows_read: usize,
}

/// Main pipeline from source files to the star schema
pub struct EmissionsPipeline {
    config: PipelineConfig,
    reader: Arc<dyn SourceReader>,
    normalizer: SchemaNormalizer,
    canonicalizer: ValueCanonicalizer,
    resolver: DimensionResolver,
}

impl std::fmt::Debug for EmissionsPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmissionsPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EmissionsPipeline {
    /// Create a pipeline reading files with [`FileSourceReader`]
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            normalizer: SchemaNormalizer::new(&config),
            canonicalizer: ValueCanonicalizer::new(&config),
            resolver: DimensionResolver::new(),
            reader: Arc::new(FileSourceReader::new()),
            config,
        })
    }

    /// Replace the source reader
    pub fn with_reader(mut self, reader: Arc<dyn SourceReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Explicit sources win; otherwise the data directory is discovered
    pub async fn resolve_sources(&self) -> Result<Vec<SourceSpec>> {
        if !self.config.sources.is_empty() {
            return Ok(self.config.sources.clone());
        }

        match &self.config.data_dir {
            Some(data_dir) => {
                let mut discovery = SourceDiscovery::new(data_dir.clone());
                let specs = discovery.discover_sources().await?;
                info!(
                    "Discovered {} files from {} sources in {}",
                    specs.len(),
                    discovery.source_count(),
                    data_dir.display()
                );
                Ok(specs)
            }
            None => Err(LoaderError::configuration(
                "no sources configured and no data directory to discover",
            )),
        }
    }

    /// Read, normalize and canonicalize every source into one batch
    pub async fn prepare(&self) -> Result<PreparedBatch> {
        let specs = self.resolve_sources().await?;
        let tables = self.read_sources(&specs).await?;

        let mut batch = PreparedBatch::default();
        for table in tables {
            batch.files_read += 1;
            batch.rows_read += table.frame.height();

            let normalized = self.normalizer.normalize(table)?;
            batch
                .dropped_columns
                .extend(normalized.dropped_columns.iter().map(|column| DroppedColumn {
                    source_id: normalized.source_id.clone(),
                    column: column.clone(),
                }));

            let canonical = self.canonicalizer.canonicalize(&normalized)?;
            batch.records.extend(canonical.records);
            batch.rejections.extend(canonical.rejections);
        }

        info!(
            "Prepared {} records from {} files ({} rejected)",
            batch.records.len(),
            batch.files_read,
            batch.rejections.len()
        );

        Ok(batch)
    }

    /// Read files on the blocking pool; results keep source order
    async fn read_sources(&self, specs: &[SourceSpec]) -> Result<Vec<SourceTable>> {
        let pb = if self.config.show_progress {
            ProgressBar::new(specs.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message("Reading sources");

        let results = stream::iter(specs.iter().cloned())
            .map(|spec| {
                let reader = Arc::clone(&self.reader);
                let pb = pb.clone();
                async move {
                    let path = spec.path.clone();
                    let result = task::spawn_blocking(move || reader.read(&spec))
                        .await
                        .map_err(|e| LoaderError::Read {
                            path,
                            reason: format!("reader task failed: {}", e),
                        })
                        .and_then(|result| result);
                    pb.inc(1);
                    result
                }
            })
            .buffered(self.config.max_concurrent_reads)
            .collect::<Vec<_>>()
            .await;

        pb.finish_and_clear();

        let tables = results.into_iter().collect::<Result<Vec<_>>>()?;
        debug!("Read {} source tables", tables.len());
        Ok(tables)
    }

    /// Prepare the batch, then resolve dimensions and load facts
    pub async fn run<S>(&self, store: &mut S) -> Result<LoadReport>
    where
        S: StoreGateway + ?Sized,
    {
        let start_time = Instant::now();
        let mut report = LoadReport::new(Utc::now());
        report.dry_run = self.config.dry_run;

        let batch = self.prepare().await?;
        report.files_read = batch.files_read;
        report.rows_read = batch.rows_read;
        report.rows_loaded = batch.records.len();

        if self.config.dry_run {
            info!("Dry run: skipping dimension and fact load");
        } else if batch.records.is_empty() {
            warn!("No records to load");
        } else {
            let resolved = self.resolver.resolve(store, &batch.records)?;
            report.facts_inserted = facts::load(store, &batch.records, &resolved.mappings)?;
            report.dimensions = resolved.counts;
        }

        report.rejections = batch.rejections;
        report.dropped_columns = batch.dropped_columns;
        report.processing_time_ms = start_time.elapsed().as_millis();

        Ok(report)
    }
}
