use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("data source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error(
        "header does not match the registry schema (missing: [{}], repeated: [{}])",
        missing.join(", "),
        repeated.join(", ")
    )]
    SchemaMismatch {
        missing: Vec<String>,
        repeated: Vec<String>,
    },

    #[error("malformed record at line {line}, column {column}: {reason} (value {value:?})")]
    MalformedRecord {
        line: u64,
        column: String,
        value: String,
        reason: String,
    },

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("no groups to summarize")]
    EmptyTable,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
