//! Application constants for the emission-factor loader
//!
//! Default values, sentinel tokens, reserved dimension members and the
//! physical table/column names of the star schema.

// =============================================================================
// Defaults
// =============================================================================

/// Directory scanned for `<source_id>/<file>` inputs when no sources are listed
pub const DEFAULT_DATA_DIR: &str = "data-raw";

/// Default SQLite database file
pub const DEFAULT_DATABASE_PATH: &str = "emissions.db";

/// Decimal places kept for numeric measures
pub const DEFAULT_PRECISION: u32 = 5;

/// Largest precision accepted by configuration validation
pub const MAX_PRECISION: u32 = 12;

/// Default SQLite busy timeout (ms)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Source files read concurrently
pub const DEFAULT_MAX_CONCURRENT_READS: usize = 4;

// =============================================================================
// Sentinels and reserved members
// =============================================================================

/// Token (case-insensitive) meaning the value is unknown
pub const UNKNOWN_TOKEN: &str = "unknown";

/// Tokens (case-insensitive) meaning the source withheld the value
pub const NOT_SUPPLIED_TOKENS: &[&str] = &["not_supplied", "not-supplied"];

/// Dimension member standing for an unknown natural-key component.
///
/// Reserved member names are bracketed so no folded source value collides
/// with them.
pub const UNKNOWN_MEMBER: &str = "<unknown>";

/// Dimension member standing for a withheld natural-key component
pub const NOT_APPLICABLE_MEMBER: &str = "<not_applicable>";

/// Prefix of generated source and unit descriptions
pub const DESCRIPTION_PREFIX: &str = "Description for ";

// =============================================================================
// Star schema layout
// =============================================================================

pub mod tables {
    pub const ACTIVITIES: &str = "activities";
    pub const REGIONS: &str = "regions";
    pub const SOURCES: &str = "sources";
    pub const UNITS: &str = "units";
    pub const STATUS: &str = "status";
    pub const EMISSION_FACTORS: &str = "emission_factors";
}

/// Columns of the fact table, in insertion order
pub const FACT_COLUMNS: &[&str] = &[
    "activity_id",
    "unit_id",
    "region_id",
    "source_id",
    "scope",
    "assessment_report",
    "validity_year",
    "lca",
    "kgco2e",
    "kgco2",
    "kgch4",
    "kgn2o",
    "status_id",
    "not_applicable_fields",
];

/// Separator used in the `not_applicable_fields` fact column
pub const NOT_APPLICABLE_SEPARATOR: char = ',';
