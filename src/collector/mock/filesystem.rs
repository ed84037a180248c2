//! In-memory mock filesystem for testing collectors without touching `/etc`.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

/// In-memory filesystem for testing.
///
/// Files can be marked unreadable to simulate a collector running without
/// the privileges it needs.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: HashMap<PathBuf, Vec<u8>>,
    denied: HashSet<PathBuf>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a file with the given content.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.files
            .insert(path.as_ref().to_path_buf(), content.into());
    }

    /// Appends a line to a file, creating it if needed.
    pub fn append_line(&mut self, path: impl AsRef<Path>, line: &str) {
        let entry = self.files.entry(path.as_ref().to_path_buf()).or_default();
        if !entry.is_empty() && !entry.ends_with(b"\n") {
            entry.push(b'\n');
        }
        entry.extend_from_slice(line.as_bytes());
        entry.push(b'\n');
    }

    /// Makes every read of `path` fail with `PermissionDenied`.
    pub fn deny(&mut self, path: impl AsRef<Path>) {
        self.denied.insert(path.as_ref().to_path_buf());
    }

    fn lookup(&self, path: &Path) -> io::Result<&Vec<u8>> {
        if self.denied.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("permission denied: {:?}", path),
            ));
        }
        self.files.get(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = self.lookup(path)?;
        String::from_utf8(bytes.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.lookup(path).cloned()
    }
}
