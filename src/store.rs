use std::io;
use std::path::{Path, PathBuf};

/// Plain-text file store for the last seen event id.
///
/// The file's entire contents is the id string: read once at client
/// construction, written back at teardown. A missing or empty file means
/// "no id". This is a convenience for cross-restart resumption, not part of
/// the streaming protocol itself.
#[derive(Debug, Clone)]
pub struct LastEventIdFile {
    path: PathBuf,
}

impl LastEventIdFile {
    /// Create a store backed by the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path this store reads and writes.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted id; a missing or empty file yields `None`.
    pub fn load(&self) -> io::Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(id) if id.is_empty() => Ok(None),
            Ok(id) => Ok(Some(id)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Persist the given id, replacing any previous contents.
    pub fn store(&self, id: &str) -> io::Result<()> {
        std::fs::write(&self.path, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_no_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastEventIdFile::new(dir.path().join("absent"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn empty_file_is_no_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, "").unwrap();
        assert_eq!(LastEventIdFile::new(path).load().unwrap(), None);
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastEventIdFile::new(dir.path().join("last-id"));
        store.store("42").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("42"));
    }
}
