//! Scenario tests for the processor module
//!
//! Runs the complete pipeline against temporary data directories and an
//! in-memory SQLite store.

pub mod basic_processing;
pub mod multi_source;

use crate::config::PipelineConfig;
use crate::store::SqliteStore;
use rust_xlsxwriter::Workbook;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub(crate) const HEADER: &str = "Activity Name,Sector,Category,Unit,kgco2e,kgco2,kgch4,kgn2o,Scope,LCA,Year Valid From,Validity Region,Assessment Report";

/// Write `<data-raw>/<source_id>/<file_name>` and return its path
pub(crate) fn write_source(data_dir: &Path, source_id: &str, file_name: &str, content: &str) -> PathBuf {
    let dir = data_dir.join(source_id);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(file_name);
    fs::write(&path, content).unwrap();
    path
}

/// One cell of a fixture workbook
pub(crate) enum Cell<'a> {
    Text(&'a str),
    Number(f64),
    Empty,
}

/// Write a single-sheet workbook whose first row holds `header`
pub(crate) fn write_workbook(path: &Path, header: &[&str], rows: &[Vec<Cell<'_>>]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    for (col, name) in header.iter().enumerate() {
        worksheet.write_string(0, col as u16, *name).unwrap();
    }
    for (index, row) in rows.iter().enumerate() {
        let row_num = index as u32 + 1;
        for (col, cell) in row.iter().enumerate() {
            match cell {
                Cell::Text(text) => {
                    worksheet.write_string(row_num, col as u16, *text).unwrap();
                }
                Cell::Number(value) => {
                    worksheet.write_number(row_num, col as u16, *value).unwrap();
                }
                Cell::Empty => {}
            }
        }
    }
    workbook.save(path).unwrap();
}

pub(crate) fn data_dir(temp_dir: &TempDir) -> PathBuf {
    let path = temp_dir.path().join("data-raw");
    fs::create_dir_all(&path).unwrap();
    path
}

pub(crate) fn config(data_dir: &Path) -> PipelineConfig {
    PipelineConfig::default()
        .with_data_dir(data_dir)
        .without_progress()
}

pub(crate) fn store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store.apply_schema().unwrap();
    store
}
