//! Manager configuration and export/import method selection.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::warn;

use crate::error::AuditError;
use crate::storage::{DEFAULT_WINDOW, DbTarget};

/// Environment variable overriding `ManagerConfig::data_dir`.
pub const DATA_DIR_ENV: &str = "HOSTDELTA_DATA_DIR";
/// Environment variable overriding the streaming window, in KiB.
pub const BUFFER_KIB_ENV: &str = "HOSTDELTA_BUFFER_KIB";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Directory holding `.snap` and `.rpt` files. Default: `./reports`.
    pub data_dir: PathBuf,
    /// Streaming window used when parsing files. Default: 64 KiB.
    pub buffer_size: usize,
    /// Relational backend; `None` disables the relational method.
    pub database: Option<DbTarget>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./reports"),
            buffer_size: DEFAULT_WINDOW,
            database: None,
        }
    }
}

impl ManagerConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    pub fn with_database(mut self, database: DbTarget) -> Self {
        self.database = Some(database);
        self
    }

    /// Defaults overridden by `HOSTDELTA_DATA_DIR`, `HOSTDELTA_BUFFER_KIB`
    /// and the libpq `PG*` variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(kib) = std::env::var(BUFFER_KIB_ENV) {
            match kib.parse::<usize>() {
                Ok(kib) if kib > 0 => config.buffer_size = kib * 1024,
                _ => warn!(value = %kib, "ignoring invalid {}", BUFFER_KIB_ENV),
            }
        }
        config.database = DbTarget::from_env();
        config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Where runs and reports are exported to or imported from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Binary,
    Relational,
}

impl Method {
    /// Numeric selector: 0 is binary, 1 is relational.
    pub fn from_code(code: i64) -> Result<Self, AuditError> {
        match code {
            0 => Ok(Method::Binary),
            1 => Ok(Method::Relational),
            other => Err(AuditError::UnsupportedMethod(other.to_string())),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Method::Binary => 0,
            Method::Relational => 1,
        }
    }
}

impl FromStr for Method {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binary" | "bin" | "0" => Ok(Method::Binary),
            "relational" | "database" | "db" | "1" => Ok(Method::Relational),
            _ => Err(AuditError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Binary => write!(f, "binary"),
            Method::Relational => write!(f, "relational"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./reports"));
        assert_eq!(config.buffer_size, 65536);
        assert!(config.database.is_none());
    }

    #[test]
    fn test_builder() {
        let config = ManagerConfig::new("/tmp/audit")
            .with_buffer_size(0)
            .with_database(DbTarget::new("host=localhost"));
        assert_eq!(config.data_dir(), Path::new("/tmp/audit"));
        assert_eq!(config.buffer_size, 1);
        assert!(config.database.is_some());
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("binary".parse::<Method>().unwrap(), Method::Binary);
        assert_eq!(" Relational ".parse::<Method>().unwrap(), Method::Relational);
        assert_eq!("1".parse::<Method>().unwrap(), Method::Relational);
        assert!(matches!(
            "xml".parse::<Method>(),
            Err(AuditError::UnsupportedMethod(m)) if m == "xml"
        ));
    }

    #[test]
    fn test_method_codes() {
        assert_eq!(Method::from_code(0).unwrap(), Method::Binary);
        assert_eq!(Method::from_code(1).unwrap(), Method::Relational);
        assert!(matches!(
            Method::from_code(2),
            Err(AuditError::UnsupportedMethod(m)) if m == "2"
        ));
        assert_eq!(Method::Relational.code(), 1);
        assert_eq!(Method::Binary.to_string(), "binary");
    }
}
