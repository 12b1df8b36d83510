//! Schema sources.
//!
//! The desired schema comes from outside the engine: a model extractor, a
//! hand-written schema file, or a snapshot built in code. Anything that can
//! produce a [`SchemaSnapshot`] implements [`SchemaSource`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::lock::LOCK_FORMAT_VERSION;
use crate::schema::{by_name, SchemaSnapshot, Table};

/// Produces the desired schema snapshot.
pub trait SchemaSource {
    /// Returns a description of where the schema comes from, used in
    /// error messages.
    fn origin(&self) -> String;

    /// Loads the schema.
    fn load_schema(&self) -> Result<SchemaSnapshot>;
}

impl SchemaSource for SchemaSnapshot {
    fn origin(&self) -> String {
        "in-memory snapshot".to_string()
    }

    fn load_schema(&self) -> Result<SchemaSnapshot> {
        Ok(self.clone())
    }
}

/// Schema file layout: a lock document whose version is optional.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaDocument {
    #[serde(default)]
    version: Option<u32>,
    #[serde(with = "by_name")]
    tables: BTreeMap<String, Table>,
}

/// Reads the desired schema from a JSON file.
///
/// The file uses the lock file layout. The `version` field may be left
/// out.
#[derive(Debug, Clone)]
pub struct JsonSchemaFile {
    path: PathBuf,
}

impl JsonSchemaFile {
    /// Creates a source for the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses schema file contents.
    pub fn parse(origin: &str, text: &str) -> Result<SchemaSnapshot> {
        let invalid = |message: String| MigrateError::InvalidSchema {
            origin: origin.to_string(),
            message,
        };

        let document: SchemaDocument =
            serde_json::from_str(text).map_err(|e| invalid(e.to_string()))?;

        if let Some(version) = document.version {
            if version != LOCK_FORMAT_VERSION {
                return Err(invalid(format!(
                    "unsupported format version {} (expected {})",
                    version, LOCK_FORMAT_VERSION
                )));
            }
        }

        let snapshot = SchemaSnapshot {
            tables: document.tables,
        };
        snapshot.validate().map_err(invalid)?;
        Ok(snapshot)
    }
}

impl SchemaSource for JsonSchemaFile {
    fn origin(&self) -> String {
        self.path.display().to_string()
    }

    fn load_schema(&self) -> Result<SchemaSnapshot> {
        let origin = self.origin();
        let text = fs::read_to_string(&self.path).map_err(|source| MigrateError::ArtifactRead {
            name: origin.clone(),
            source,
        })?;
        let snapshot = Self::parse(&origin, &text)?;
        debug!(
            "Loaded {} table(s) from '{}'",
            snapshot.tables.len(),
            origin
        );
        Ok(snapshot)
    }
}
