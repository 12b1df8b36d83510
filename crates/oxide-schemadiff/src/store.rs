//! Artifact storage.
//!
//! The writer and the lock file only need to read, write and remove named
//! artifacts. [`DirStore`] keeps them as files in the migrations directory;
//! [`MemoryStore`] keeps them in memory.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Default permission bits for written artifacts.
pub const DEFAULT_FILE_MODE: u32 = 0o755;

/// Named artifact storage.
pub trait ArtifactStore {
    /// Reads an artifact. Returns `None` if it does not exist.
    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>>;

    /// Creates a new artifact. Fails with `AlreadyExists` if one with the
    /// same name is present.
    fn create(&self, name: &str, contents: &[u8]) -> io::Result<()>;

    /// Creates or atomically replaces an artifact.
    fn replace(&self, name: &str, contents: &[u8]) -> io::Result<()>;

    /// Removes an artifact. Removing a missing artifact is not an error.
    fn remove(&self, name: &str) -> io::Result<()>;

    /// Lists artifact names in sorted order.
    fn list(&self) -> io::Result<Vec<String>>;
}

/// Stores artifacts as files in a directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
    mode: u32,
}

impl DirStore {
    /// Creates a store rooted at `dir`. The directory is created on the
    /// first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            mode: DEFAULT_FILE_MODE,
        }
    }

    /// Sets the permission bits used for new files (unix only).
    #[must_use]
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Returns the directory this store writes to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of a named artifact.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    #[cfg(unix)]
    fn set_mode(&self, file: &fs::File) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(self.mode))
    }

    #[cfg(not(unix))]
    fn set_mode(&self, _file: &fs::File) -> io::Result<()> {
        Ok(())
    }
}

impl ArtifactStore for DirStore {
    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create(&self, name: &str, contents: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(name);

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(self.mode);
        }
        let mut file = options.open(&path)?;

        let written = file
            .write_all(contents)
            .and_then(|()| file.sync_all())
            .and_then(|()| self.set_mode(&file));
        if let Err(e) = written {
            drop(file);
            if let Err(remove_err) = fs::remove_file(&path) {
                warn!(
                    "Could not remove partially written '{}': {}",
                    path.display(),
                    remove_err
                );
            }
            return Err(e);
        }

        debug!("Created {}", path.display());
        Ok(())
    }

    fn replace(&self, name: &str, contents: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(name);

        // The temporary file is deleted on drop unless persisted.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        self.set_mode(tmp.as_file())?;
        tmp.persist(&path).map_err(|e| e.error)?;

        debug!("Replaced {}", path.display());
        Ok(())
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        match fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn list(&self) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Keeps artifacts in memory.
///
/// Writes can be made to fail for names with a given suffix, which lets
/// callers exercise partial-failure handling.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RefCell<BTreeMap<String, Vec<u8>>>,
    failing_writes: RefCell<Vec<String>>,
    failing_removes: RefCell<Vec<String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an artifact directly.
    pub fn insert(&self, name: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.borrow_mut().insert(name.into(), contents.into());
    }

    /// Returns an artifact as text.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.files
            .borrow()
            .get(name)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Returns all artifact names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.files.borrow().keys().cloned().collect()
    }

    /// Makes writes to artifacts whose name ends with `suffix` fail.
    pub fn fail_writes_ending_with(&self, suffix: impl Into<String>) {
        self.failing_writes.borrow_mut().push(suffix.into());
    }

    /// Makes removal of artifacts whose name ends with `suffix` fail.
    pub fn fail_removes_ending_with(&self, suffix: impl Into<String>) {
        self.failing_removes.borrow_mut().push(suffix.into());
    }

    fn check(rules: &RefCell<Vec<String>>, name: &str) -> io::Result<()> {
        if rules.borrow().iter().any(|suffix| name.ends_with(suffix.as_str())) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("injected failure for '{name}'"),
            ));
        }
        Ok(())
    }
}

impl ArtifactStore for MemoryStore {
    fn read(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.files.borrow().get(name).cloned())
    }

    fn create(&self, name: &str, contents: &[u8]) -> io::Result<()> {
        Self::check(&self.failing_writes, name)?;
        let mut files = self.files.borrow_mut();
        if files.contains_key(name) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("'{name}' already exists"),
            ));
        }
        files.insert(name.to_string(), contents.to_vec());
        Ok(())
    }

    fn replace(&self, name: &str, contents: &[u8]) -> io::Result<()> {
        Self::check(&self.failing_writes, name)?;
        self.files
            .borrow_mut()
            .insert(name.to_string(), contents.to_vec());
        Ok(())
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        Self::check(&self.failing_removes, name)?;
        self.files.borrow_mut().remove(name);
        Ok(())
    }

    fn list(&self) -> io::Result<Vec<String>> {
        Ok(self.names())
    }
}
