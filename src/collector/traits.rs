//! Abstractions for filesystem access to enable testing and mocking.
//!
//! Collectors read host configuration files through `FileSystem`, so the
//! same collection code runs against the real `/etc` or an in-memory
//! fixture.

use std::io;
use std::path::Path;

/// Read-only access to host files.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Reads the raw bytes of a file.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}
