//! Collectors gather one category of host facts and know how to persist
//! and compare them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    CollectorRegistry                     │
//! │   name / type tag ──► CollectorKind ──► AnyCollector     │
//! └────────────────────────────┬─────────────────────────────┘
//!                              │ instantiate
//!                    ┌─────────▼─────────┐
//!                    │  UsersCollector   │  (Collector trait)
//!                    │  User/Group/Sudoer│  (Collectible trait)
//!                    └─────────┬─────────┘
//!                              │
//!                    ┌─────────▼─────────┐
//!                    │    HostSource     │ (trait)
//!                    └─────────┬─────────┘
//!                  ┌───────────┴───────────┐
//!           ┌──────▼──────┐         ┌──────▼──────┐
//!           │ SystemSource│         │   MockFs    │
//!           │ (RealFs)    │         │ (Testing)   │
//!           └─────────────┘         └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use hostdelta::collector::{Collector, MockFs, SystemSource, UsersCollector};
//!
//! let source = Arc::new(SystemSource::new(MockFs::typical_host()));
//! let mut collector = UsersCollector::new(source);
//! collector.run();
//! collector.format().unwrap();
//! assert_eq!(collector.export_binary().unwrap()[0], UsersCollector::TYPE_TAG);
//! ```

pub mod item;
pub mod kind;
pub mod mock;
pub mod registry;
pub mod source;
pub mod traits;
pub mod users;

use postgres::GenericClient;

use crate::diff::{CollectorDiff, DiffReport, codec as report_codec, engine};
use crate::error::{AuditError, EncodingError, FormatError, NotReadyReason, Result};

pub use item::{CollectibleItem, CollectibleKind};
pub use kind::{AnyCollector, CollectorKind};
pub use mock::MockFs;
pub use registry::{CollectorRegistry, CollectorSet, NameSet, intersection, symmetric_difference};
pub use source::{HostSource, SystemSource};
pub use traits::{FileSystem, RealFs};
pub use users::UsersCollector;

/// A single collected fact that can serialize itself.
pub trait Collectible: Sized + Clone + PartialEq {
    /// Stable name of this kind of fact.
    const ELEMENT_NAME: &'static str;
    const KIND: CollectibleKind;

    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError>;

    fn to_bytes(&self) -> Result<Vec<u8>, EncodingError> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Decodes one value from the front of `data` and returns the unread
    /// remainder (empty when nothing follows).
    fn from_bytes(data: &[u8]) -> Result<(Self, &[u8]), FormatError>;

    fn into_item(self) -> CollectibleItem;
}

/// A collection module.
///
/// Lifecycle: constructed empty, `run` populates the raw result, `format`
/// serializes it, then it can be exported. `import_*` rebuild the raw
/// result of an earlier run.
pub trait Collector: Sized + Send {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;
    /// Distinguishing byte written in every binary layout.
    const TYPE_TAG: u8;
    /// Collectible kinds in the order they appear in report segments.
    const REPORT_TREE: &'static [CollectibleKind];

    /// Gathers the facts. Blocks until done; failures of individual
    /// sub-facts degrade the result instead of aborting.
    fn run(&mut self);

    fn is_running(&self) -> bool;

    /// Whether a raw result exists (after `run` or an import).
    fn has_result(&self) -> bool;

    /// Serializes the raw result into the formatted result.
    fn format(&mut self) -> Result<(), EncodingError>;

    /// `TYPE_TAG VarInt(len) content` once formatted.
    fn formatted(&self) -> Option<&[u8]>;

    /// Formatted result, ready to be embedded in a snapshot.
    fn export_binary(&self) -> Result<Vec<u8>> {
        let reason = if self.is_running() {
            Some(NotReadyReason::Running)
        } else if !self.has_result() {
            Some(NotReadyReason::NotRun)
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(AuditError::NotReady {
                collector: Self::NAME,
                reason,
            });
        }
        self.formatted()
            .map(<[u8]>::to_vec)
            .ok_or(AuditError::NotReady {
                collector: Self::NAME,
                reason: NotReadyReason::NotFormatted,
            })
    }

    /// Rebuilds the raw result from this collector's content bytes (the
    /// part after its type tag and length). Returns what was not consumed.
    fn import_binary<'a>(&mut self, data: &'a [u8]) -> Result<&'a [u8]>;

    fn export_relational<C: GenericClient>(&self, client: &mut C, run_id: &str) -> Result<()>;

    fn import_relational<C: GenericClient>(&mut self, client: &mut C, run_id: &str) -> Result<()>;

    /// Facts of one kind held by the raw result (empty when missing).
    fn collectibles(&self, kind: CollectibleKind) -> Vec<CollectibleItem>;

    /// True when both hold exactly the same encoded content.
    fn same_state(&self, other: &Self) -> bool;

    /// Compares two possibly absent instances and records the outcome.
    fn diff(
        run_a: &str,
        run_b: &str,
        a: Option<&Self>,
        b: Option<&Self>,
        report: &mut DiffReport,
    ) -> Result<()> {
        engine::diff_collectors(run_a, run_b, a, b, report)
    }

    /// Empty diff tree for this collector.
    fn report_tree_structure() -> CollectorDiff {
        Self::REPORT_TREE.iter().map(|k| (*k, Vec::new())).collect()
    }

    /// `TYPE_TAG` followed by one counted list per kind of `REPORT_TREE`.
    fn encode_report_segment(diff: &CollectorDiff, run_ids: [&str; 2]) -> Result<Vec<u8>> {
        report_codec::encode_segment(Self::TYPE_TAG, Self::REPORT_TREE, diff, run_ids)
    }

    /// Inverse of `encode_report_segment`, given the bytes after the tag.
    fn decode_report_segment(data: &[u8], run_ids: [&str; 2]) -> Result<CollectorDiff> {
        report_codec::decode_segment(Self::REPORT_TREE, data, run_ids)
    }

    fn export_diff_relational<C: GenericClient>(
        client: &mut C,
        report_id: &str,
        diff: &CollectorDiff,
        run_ids: [&str; 2],
    ) -> Result<()>;

    fn import_diff_relational<C: GenericClient>(
        client: &mut C,
        report_id: &str,
        run_ids: [&str; 2],
        report: &mut DiffReport,
    ) -> Result<()>;
}
