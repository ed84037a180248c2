//! Error types shared by the codecs, collectors and the analysis manager.
//!
//! Codec-level failures (`EncodingError`, `FormatError`) mean the input is
//! corrupted or violates the wire format; they are never recovered from.
//! The remaining `AuditError` variants describe caller mistakes or backend
//! failures and are surfaced as-is.

use thiserror::Error;

/// Failure to encode an integer as a VarInt.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("negative values cannot be encoded (got {0})")]
    Negative(i64),
    #[error("value {0} does not fit in 61 bits")]
    OutOfRange(u64),
}

/// The bytes being decoded do not follow the binary layout.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("unexpected end of data: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("varint {value} is not in its minimal {len}-byte form")]
    NonCanonicalVarInt { value: u64, len: usize },
    #[error("content and header do not match at offset {offset}: expected collector 0x{expected:02x}, read 0x{found:02x}")]
    TypeMismatch { offset: u64, expected: u8, found: u8 },
    #[error("unknown collector type 0x{0:02x}")]
    UnknownCollectorType(u8),
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
    #[error("cursor at {cursor} already passed declared offset {offset}")]
    CursorOvershoot { cursor: u64, offset: u64 },
    #[error("header offsets are out of order ({previous} then {next})")]
    OffsetsOutOfOrder { previous: u64, next: u64 },
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("side byte {0} does not reference one of the two report runs")]
    UnknownSide(u8),
    #[error("unknown change kind {0}")]
    UnknownChangeKind(u64),
}

/// Why a collector cannot export yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReadyReason {
    Running,
    NotRun,
    NotFormatted,
}

impl std::fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotReadyReason::Running => write!(f, "still running"),
            NotReadyReason::NotRun => write!(f, "has not run yet"),
            NotReadyReason::NotFormatted => write!(f, "data has not been formatted"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
    #[error("format error: {0}")]
    Format(#[from] FormatError),
    #[error("collector `{collector}` cannot export: {reason}")]
    NotReady {
        collector: &'static str,
        reason: NotReadyReason,
    },
    #[error("report `{0}` already exists")]
    DuplicateReport(String),
    #[error("run `{0}` already exists")]
    DuplicateRun(String),
    #[error("collector `{0}` is already present")]
    DuplicateCollector(String),
    #[error("element type `{kind}` already present for collector `{collector}`")]
    DuplicateElementKind { collector: String, kind: &'static str },
    #[error("run `{0}` is not loaded")]
    UnknownRun(String),
    #[error("report `{0}` is not loaded")]
    UnknownReport(String),
    #[error("collector `{0}` is not registered")]
    UnknownCollector(String),
    #[error("element belongs to run `{run_id}`, expected `{first}` or `{second}`")]
    ForeignRun {
        run_id: String,
        first: String,
        second: String,
    },
    #[error("relational method selected but no database target configured")]
    MissingBackendTarget,
    #[error("unsupported export/import method `{0}`")]
    UnsupportedMethod(String),
    #[error("collector mismatch: expected `{expected}`, got `{found}`")]
    CollectorMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("snapshot `{0}` is already running")]
    SnapshotInProgress(String),
    #[error("worker for `{0}` panicked")]
    TaskPanicked(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("database: {}", format_postgres_error(.0))]
    Database(#[from] postgres::Error),
}

pub type Result<T, E = AuditError> = std::result::Result<T, E>;

/// Renders a postgres error the way it is shown in logs.
pub fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = e.to_string();
        if msg.contains("Connection refused") {
            "connection refused".to_string()
        } else if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else {
            msg
        }
    }
}
