//! Canonical schema shared by every pipeline stage.
//!
//! Holds the fixed canonical column order, the header canonicalization rule
//! and the default alias table mapping known synonymous headers onto
//! canonical names.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Canonical column names in canonical order
pub const CANONICAL_COLUMNS: [&str; 15] = [
    "activity_name",
    "sector",
    "category",
    "unit",
    "kgco2e",
    "kgco2",
    "kgch4",
    "kgn2o",
    "assessment_report",
    "scope",
    "lca",
    "validity_year",
    "region",
    "source",
    "file_type",
];

/// Column injected by the reader holding the declared source identifier
pub const SOURCE_COLUMN: &str = "source";

/// Column injected by the reader holding the file-format tag
pub const FILE_TYPE_COLUMN: &str = "file_type";

/// Text fields that are case-folded and right-trimmed
pub const CATEGORICAL_FIELDS: [&str; 5] = ["sector", "category", "unit", "scope", "lca"];

static SEPARATOR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \-]").expect("separator pattern is valid"));

/// Canonicalize a raw header: lowercase, strip trailing whitespace and
/// replace every space and hyphen with an underscore.
pub fn canonicalize_column_name(raw: &str) -> String {
    let folded = raw.to_lowercase();
    SEPARATOR_PATTERN
        .replace_all(folded.trim_end(), "_")
        .into_owned()
}

/// Whether a name belongs to the canonical column set
pub fn is_canonical(name: &str) -> bool {
    CANONICAL_COLUMNS.contains(&name)
}

/// Default alias table, keyed by canonicalized raw header
pub fn default_aliases() -> BTreeMap<String, String> {
    [
        ("emission_(kgco2e)", "kgco2e"),
        ("emmision_(kgco2e)", "kgco2e"),
        ("life_cycle_assessment", "lca"),
        ("life_cylce_assesment", "lca"),
        ("year_valid_from", "validity_year"),
        ("validity_region", "region"),
        ("assesment_report", "assessment_report"),
    ]
    .into_iter()
    .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
    .collect()
}
