//! Error types for migration generation.

use std::fmt;

/// The artifacts a generated migration consists of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// The lock file holding the schema snapshot.
    Lock,
    /// The forward migration script.
    UpScript,
    /// The reverse migration script.
    DownScript,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lock => "lock file",
            Self::UpScript => "up script",
            Self::DownScript => "down script",
        })
    }
}

fn list_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

/// Errors that can occur while generating migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The lock file exists but does not hold a valid snapshot.
    #[error("Lock file '{name}' is corrupt: {message}")]
    CorruptLock {
        /// Name of the lock artifact.
        name: String,
        /// What was wrong with it.
        message: String,
    },

    /// A difference the engine can neither script nor describe.
    #[error("Unsupported schema change: {0}")]
    UnsupportedChange(String),

    /// Writing one of the migration artifacts failed.
    #[error(
        "Failed to write {artifact} '{name}': {source} (written before the failure: {}; left behind after cleanup: {})",
        list_or_none(.written),
        list_or_none(.left_behind)
    )]
    ArtifactWrite {
        /// Which artifact failed.
        artifact: ArtifactKind,
        /// Name of the failing artifact.
        name: String,
        /// Artifacts of the same run written before the failure.
        written: Vec<String>,
        /// Artifacts that could not be removed again.
        left_behind: Vec<String>,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading an artifact failed for a reason other than it being absent.
    #[error("Failed to read '{name}': {source}")]
    ArtifactRead {
        /// Name of the artifact.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The desired schema handed over by the extractor is invalid.
    #[error("Invalid schema from '{origin}': {message}")]
    InvalidSchema {
        /// Where the schema came from.
        origin: String,
        /// What was wrong with it.
        message: String,
    },

    /// A change could not be applied to a snapshot.
    #[error("Invalid schema state: {0}")]
    InvalidState(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for migration generation.
pub type Result<T> = std::result::Result<T, MigrateError>;
