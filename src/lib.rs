//! hostdelta: host configuration audit library.
//!
//! Provides:
//! - `codec`: VarInt and byte-level helpers shared by every binary layout
//! - `collector`: collector contracts, registry, and the users collector
//! - `diff`: diff reports, the diff engine, and the report file codec
//! - `storage`: snapshot files, streaming reader, relational catalog
//! - `manager`: the analysis manager driving runs, diffs, and persistence
//! - `config`: manager configuration and method selection
//! - `logging`: tracing subscriber setup
//! - `error`: error types

pub mod codec;
pub mod collector;
pub mod config;
pub mod diff;
pub mod error;
pub mod logging;
pub mod manager;
pub mod storage;

pub use config::{ManagerConfig, Method};
pub use error::{AuditError, Result};
pub use manager::AnalysisManager;
