//! Error types for carnet.

use thiserror::Error;

/// Result type alias using carnet's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for carnet operations.
///
/// Pure operations (normalize, serialize, derive, diff, apply) never produce
/// these; they only arise at collaborator boundaries and when a dataset
/// identity cannot be established.
#[derive(Error, Debug)]
pub enum Error {
    /// Record or location not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing precondition or invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Target record already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Dataset file name does not follow `<key>_<YYYYMMDD>_PG.csv`
    #[error("Invalid dataset name: {0}")]
    InvalidDatasetName(String),

    /// Dataset source unreadable or structurally broken
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Record storage collaborator failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors that abort a whole batch before any row is processed.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Error::InvalidDatasetName(_) | Error::Dataset(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
