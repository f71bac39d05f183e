//! Source reading for CSV and XLSX emission-factor files
//!
//! Produces one all-text [`SourceTable`] per file, tagged with the declared
//! source identifier and the file-format tag. No column semantics are
//! interpreted here.

use crate::config::SourceSpec;
use crate::error::{LoaderError, Result};
use crate::models::{FileFormat, SourceTable};
use crate::schema::{FILE_TYPE_COLUMN, SOURCE_COLUMN};
use calamine::{Data, Reader, open_workbook_auto};
use polars::prelude::*;
use std::path::Path;
use tracing::debug;

/// Reads one raw tabular file into a [`SourceTable`]
pub trait SourceReader: Send + Sync {
    fn read(&self, spec: &SourceSpec) -> Result<SourceTable>;
}

/// Default reader backed by polars (CSV) and calamine (XLSX)
#[derive(Debug, Default, Clone)]
pub struct FileSourceReader;

impl FileSourceReader {
    pub fn new() -> Self {
        Self
    }
}

impl SourceReader for FileSourceReader {
    fn read(&self, spec: &SourceSpec) -> Result<SourceTable> {
        let path = spec.path.as_path();
        let format = FileFormat::from_path(path).ok_or_else(|| LoaderError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension: path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default(),
        })?;

        if !path.is_file() {
            return Err(LoaderError::SourceNotFound {
                path: path.to_path_buf(),
            });
        }

        let frame = match format {
            FileFormat::Csv => read_csv(path)?,
            FileFormat::Xlsx => read_xlsx(path)?,
        };
        let frame = tag_frame(frame, &spec.source_id, format)?;

        debug!(
            "Read {} rows x {} columns from {} (source {})",
            frame.height(),
            frame.width(),
            path.display(),
            spec.source_id
        );

        Ok(SourceTable {
            source_id: spec.source_id.clone(),
            path: path.to_path_buf(),
            format,
            frame,
        })
    }
}

fn read_error(path: &Path, reason: impl ToString) -> LoaderError {
    LoaderError::Read {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Read a delimited file with every column kept as text
fn read_csv(path: &Path) -> Result<DataFrame> {
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| read_error(path, e))?
        .finish()
        .map_err(|e| read_error(path, e))?;

    stringify_columns(frame).map_err(|e| read_error(path, e))
}

/// Read the first worksheet; its first row holds the headers
fn read_xlsx(path: &Path) -> Result<DataFrame> {
    let mut workbook = open_workbook_auto(path).map_err(|e| read_error(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| read_error(path, "workbook has no worksheets"))?
        .map_err(|e| read_error(path, e))?;

    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| read_error(path, "worksheet is empty"))?;

    let names: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(index, cell)| cell_text(cell).unwrap_or_else(|| format!("column_{}", index + 1)))
        .collect();

    let mut values: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
    for row in rows {
        for (index, column) in values.iter_mut().enumerate() {
            column.push(row.get(index).and_then(cell_text));
        }
    }

    let columns: Vec<Column> = names
        .iter()
        .zip(values)
        .map(|(name, column)| Column::new(name.as_str().into(), column))
        .collect();

    DataFrame::new(columns).map_err(|e| read_error(path, e))
}

/// Render a spreadsheet cell as text; empty cells are `None`
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(text) if text.is_empty() => None,
        Data::String(text) => Some(text.clone()),
        // Display gives the shortest round-trip form, "2021" for 2021.0
        Data::Float(value) => Some(value.to_string()),
        Data::Int(value) => Some(value.to_string()),
        other => Some(other.to_string()),
    }
}

/// Cast every column to text so later stages see one value type
fn stringify_columns(frame: DataFrame) -> PolarsResult<DataFrame> {
    let columns = frame
        .get_columns()
        .iter()
        .map(|column| column.cast(&DataType::String))
        .collect::<PolarsResult<Vec<_>>>()?;
    DataFrame::new(columns)
}

/// Inject the source identifier and file-format columns
fn tag_frame(mut frame: DataFrame, source_id: &str, format: FileFormat) -> Result<DataFrame> {
    let height = frame.height();
    frame.with_column(Column::new(
        SOURCE_COLUMN.into(),
        vec![source_id.to_string(); height],
    ))?;
    frame.with_column(Column::new(
        FILE_TYPE_COLUMN.into(),
        vec![format.as_str().to_string(); height],
    ))?;
    Ok(frame)
}
