//! Emissions Loader Library
//!
//! Normalizes heterogeneous emission-factor datasets (spreadsheets and CSV
//! files from independent sources) into one canonical schema and loads them
//! into a star-schema relational store.
//!
//! This library provides tools for:
//! - Discovering and reading CSV/XLSX source files as all-text tables
//! - Reconciling source-specific headers onto the canonical columns
//! - Canonicalizing values while keeping "unknown" and "not supplied" apart
//! - Deduplicating dimension members with stable surrogate ids
//! - Loading facts in a single all-or-nothing transaction

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod processor;
pub mod schema;
pub mod store;

pub use config::{PipelineConfig, SourceSpec, SplitRule};
pub use error::{LoaderError, Result};
pub use models::{CanonicalRecord, FieldValue, LoadReport};
pub use processor::EmissionsPipeline;
pub use store::{SqliteStore, StoreGateway};
