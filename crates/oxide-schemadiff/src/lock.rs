//! Lock file handling.
//!
//! The lock file records the schema snapshot the most recently generated
//! migration leaves behind. The next run diffs against it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::schema::{by_name, SchemaSnapshot, Table};
use crate::store::ArtifactStore;

/// Default name of the lock artifact.
pub const DEFAULT_LOCK_FILE: &str = "lock.json";

/// Version of the lock document layout.
pub const LOCK_FORMAT_VERSION: u32 = 1;

/// On-disk shape of the lock file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LockDocument {
    version: u32,
    #[serde(with = "by_name")]
    tables: BTreeMap<String, Table>,
}

#[derive(Serialize)]
struct EncodedLock<'a> {
    version: u32,
    tables: Vec<&'a Table>,
}

/// Reads and writes the schema snapshot of a migrations directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockFile {
    name: String,
}

impl Default for LockFile {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_FILE)
    }
}

impl LockFile {
    /// Creates a lock file with the given artifact name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the artifact name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Loads the recorded snapshot.
    ///
    /// A missing lock file is the first run and yields an empty snapshot.
    pub fn load<S: ArtifactStore + ?Sized>(&self, store: &S) -> Result<SchemaSnapshot> {
        let bytes = store
            .read(&self.name)
            .map_err(|source| MigrateError::ArtifactRead {
                name: self.name.clone(),
                source,
            })?;

        let Some(bytes) = bytes else {
            debug!("No lock file '{}', starting from an empty schema", self.name);
            return Ok(SchemaSnapshot::new());
        };

        let text = String::from_utf8(bytes).map_err(|e| self.corrupt(e))?;
        self.decode(&text)
    }

    /// Encodes the snapshot and atomically replaces the lock artifact.
    pub fn save<S: ArtifactStore + ?Sized>(
        &self,
        store: &S,
        snapshot: &SchemaSnapshot,
    ) -> Result<()> {
        let text = Self::encode(snapshot)?;
        store.replace(&self.name, text.as_bytes())?;
        debug!("Saved lock file '{}'", self.name);
        Ok(())
    }

    /// Encodes a snapshot as a lock document.
    ///
    /// The output is deterministic: tables and indexes are sorted by name
    /// and fields appear in a fixed order.
    pub fn encode(snapshot: &SchemaSnapshot) -> Result<String> {
        let mut text = serde_json::to_string_pretty(&EncodedLock {
            version: LOCK_FORMAT_VERSION,
            tables: snapshot.tables.values().collect(),
        })?;
        text.push('\n');
        Ok(text)
    }

    /// Decodes a lock document.
    pub fn decode(&self, text: &str) -> Result<SchemaSnapshot> {
        let document: LockDocument = serde_json::from_str(text).map_err(|e| self.corrupt(e))?;

        if document.version != LOCK_FORMAT_VERSION {
            return Err(self.corrupt(format!(
                "unsupported format version {} (expected {})",
                document.version, LOCK_FORMAT_VERSION
            )));
        }

        let snapshot = SchemaSnapshot {
            tables: document.tables,
        };
        snapshot
            .validate()
            .map_err(|message| self.corrupt(message))?;
        Ok(snapshot)
    }

    fn corrupt(&self, message: impl ToString) -> MigrateError {
        MigrateError::CorruptLock {
            name: self.name.clone(),
            message: message.to_string(),
        }
    }
}
