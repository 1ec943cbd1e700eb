use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DisclosureError {
    #[error("Cannot enumerate input directory {path}: {source}")]
    InputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Filename does not follow the <year>_<report>_... convention: {0}")]
    InvalidFilename(String),

    #[error("Could not decode {source_name} with any candidate encoding ({tried})")]
    UnreadableFile { source_name: String, tried: String },

    #[error("Missing required columns in {source_name}: {}", columns.join(", "))]
    MissingColumns {
        source_name: String,
        columns: Vec<String>,
    },

    #[error("Invalid year range: start {start} is after end {end}")]
    InvalidYearRange { start: i32, end: i32 },

    #[error("Invalid fiscal year end month {0}: must be between 1 and 12")]
    InvalidFiscalYearEndMonth(u32),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DisclosureError>;
