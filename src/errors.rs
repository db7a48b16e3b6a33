//src/errors.rs

use std::path::PathBuf;

use crate::types::HashValue;

/// Everything that can abort a pangenome run.
#[derive(Debug, thiserror::Error)]
pub enum PangenomeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("signature JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid lineage pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("no lineage found for identifier '{ident}'; closest identifiers: [{}]", .suggestions.join(", "))]
    UnresolvedLineage { ident: String, suggestions: Vec<String> },

    #[error("lineage for '{ident}' has no name at rank '{rank}'")]
    MissingRank { ident: String, rank: String },

    #[error("unknown taxonomic rank '{0}'")]
    UnknownRank(String),

    #[error("unknown molecule type '{0}'")]
    UnknownMolecule(String),

    #[error("invalid threshold table: {0}")]
    InvalidThresholds(String),

    #[error("cannot parse thresholds '{input}': {reason}")]
    ThresholdParse { input: String, reason: String },

    #[error("hash {hash} is classified more than once in '{table}'")]
    DuplicateHash { table: String, hash: HashValue },

    #[error("lineage group '{lineage}' has no hashes")]
    EmptyGroup { lineage: String },

    #[error("hash {hash} with frequency {freq} fell through every compartment")]
    Unclassifiable { hash: HashValue, freq: f64 },

    #[error("{path}:{line}: {reason}")]
    MalformedTable { path: String, line: usize, reason: String },

    #[error("{path}:{line}: {reason}")]
    MalformedTaxonomy { path: String, line: usize, reason: String },

    #[error("identifier '{ident}' has conflicting lineages in the taxonomy")]
    ConflictingLineage { ident: String },

    #[error("sketch '{name}' is incompatible with the group it was merged into")]
    IncompatibleSketch { name: String },

    #[error("sketch '{name}' has {hashes} hashes but {abundances} abundances")]
    AbundanceMismatch { name: String, hashes: usize, abundances: usize },

    #[error("expected exactly one sketch in '{path}', found {found}")]
    SketchCount { path: String, found: usize },

    #[error("pattern '{pattern}' matched {} sketches: {}", .matches.len(), .matches.join("; "))]
    AmbiguousLineage { pattern: String, matches: Vec<String> },

    #[error("no sketches matched the selection")]
    NoSketches,

    #[error("refusing to overwrite existing audit log {0:?}")]
    AuditLogExists(PathBuf),
}

pub type Result<T> = std::result::Result<T, PangenomeError>;
