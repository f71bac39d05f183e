//! Source discovery for emission-factor data directories
//!
//! Finds readable tabular files in a data directory and derives the source
//! identifier of each file from its directory.

use crate::config::SourceSpec;
use crate::error::{LoaderError, Result};
use crate::models::FileFormat;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Source discovery component for a data directory
#[derive(Debug)]
pub struct SourceDiscovery {
    data_dir: PathBuf,
    source_count: usize,
}

impl SourceDiscovery {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            source_count: 0,
        }
    }

    /// Number of distinct sources seen by the last discovery
    pub fn source_count(&self) -> usize {
        self.source_count
    }

    /// Discover every CSV/XLSX file and the source it belongs to
    ///
    /// Data directories follow this structure:
    /// ```text
    /// data-raw/
    ///   S1/
    ///     File 1-1.xlsx
    ///   S2/
    ///     File 2-1.csv
    ///   loose.csv        <- source id "loose"
    /// ```
    pub async fn discover_sources(&mut self) -> Result<Vec<SourceSpec>> {
        if !self.data_dir.is_dir() {
            return Err(LoaderError::SourceNotFound {
                path: self.data_dir.clone(),
            });
        }

        debug!("Searching for source files in: {}", self.data_dir.display());

        let mut specs = Vec::new();
        let mut dir = fs::read_dir(&self.data_dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                let source_id = file_name(&path);
                for file in discover_source_files(&path).await? {
                    specs.push(SourceSpec::new(source_id.clone(), file));
                }
            } else if is_tabular_file(&path) {
                let source_id = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| file_name(&path));
                specs.push(SourceSpec::new(source_id, path));
            }
        }

        specs.sort_by(|a, b| a.path.cmp(&b.path));

        self.source_count = specs
            .iter()
            .map(|s| s.source_id.as_str())
            .collect::<HashSet<_>>()
            .len();
        debug!(
            "Found {} source files from {} sources",
            specs.len(),
            self.source_count
        );

        Ok(specs)
    }
}

/// Tabular files directly inside a source directory
async fn discover_source_files(source_path: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut source_dir = fs::read_dir(source_path).await?;

    while let Some(file_entry) = source_dir.next_entry().await? {
        let file_path = file_entry.path();
        if file_entry.file_type().await?.is_file() && is_tabular_file(&file_path) {
            files.push(file_path);
        } else {
            debug!("Skipping non-source entry: {}", file_path.display());
        }
    }

    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Check if a path has an extension the source reader understands
fn is_tabular_file(path: &Path) -> bool {
    FileFormat::from_path(path).is_some()
}
