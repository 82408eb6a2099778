//! Custom error types for docboot

use thiserror::Error;

/// Errors raised by the storage boundary.
///
/// The variants are the signals the bootstrap components branch on: a role
/// lookup that comes back `NotFound` triggers a create, a `Conflict` on create
/// is a lost race, an `IndexBuild` failure while listing indexes forces a
/// rebuild. Everything else is fatal for the phase that hit it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Uniqueness violation: {0}")]
    Conflict(String),

    #[error("Index build error: {0}")]
    IndexBuild(String),

    #[error("Server selection timed out: {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl StoreError {
    /// Whether this error means the cluster could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Connection(_))
    }
}

/// Result type alias for storage calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Main error type for docboot operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Database unreachable at {0}")]
    Unreachable(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Not initialized: run 'docboot init' first")]
    NotInitialized,

    #[error("Already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for docboot
pub type Result<T> = std::result::Result<T, Error>;
