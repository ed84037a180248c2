//! Closed set of collector variants.
//!
//! `CollectorKind` carries the variant-level operations (diff, report
//! segment codecs, relational report persistence) that do not need an
//! instance. `AnyCollector` wraps one instance of any variant so a run can
//! hold heterogeneous collectors. Adding a collector means adding one arm
//! to each match here; the codecs never change.

use std::fmt;
use std::sync::Arc;

use postgres::GenericClient;

use crate::collector::source::HostSource;
use crate::collector::users::UsersCollector;
use crate::collector::{CollectibleKind, Collector};
use crate::diff::{CollectorDiff, DiffReport};
use crate::error::{AuditError, EncodingError, FormatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectorKind {
    Users,
}

impl CollectorKind {
    pub const ALL: &'static [CollectorKind] = &[CollectorKind::Users];

    pub fn name(self) -> &'static str {
        match self {
            CollectorKind::Users => UsersCollector::NAME,
        }
    }

    pub fn type_tag(self) -> u8 {
        match self {
            CollectorKind::Users => UsersCollector::TYPE_TAG,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            CollectorKind::Users => UsersCollector::DESCRIPTION,
        }
    }

    pub fn report_tree(self) -> &'static [CollectibleKind] {
        match self {
            CollectorKind::Users => UsersCollector::REPORT_TREE,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.type_tag() == tag)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// A fresh, empty instance of this variant.
    pub fn instantiate(self, source: Arc<dyn HostSource>) -> AnyCollector {
        match self {
            CollectorKind::Users => AnyCollector::Users(UsersCollector::new(source)),
        }
    }

    pub fn report_tree_structure(self) -> CollectorDiff {
        match self {
            CollectorKind::Users => UsersCollector::report_tree_structure(),
        }
    }

    /// Compares two possibly absent instances of this variant.
    pub fn diff(
        self,
        run_a: &str,
        run_b: &str,
        a: Option<&AnyCollector>,
        b: Option<&AnyCollector>,
        report: &mut DiffReport,
    ) -> Result<()> {
        match self {
            CollectorKind::Users => {
                let a = a.map(downcast_users).transpose()?;
                let b = b.map(downcast_users).transpose()?;
                UsersCollector::diff(run_a, run_b, a, b, report)
            }
        }
    }

    pub fn encode_report_segment(self, diff: &CollectorDiff, run_ids: [&str; 2]) -> Result<Vec<u8>> {
        match self {
            CollectorKind::Users => UsersCollector::encode_report_segment(diff, run_ids),
        }
    }

    /// Decodes a report segment given the bytes after its type tag.
    pub fn decode_report_segment(self, data: &[u8], run_ids: [&str; 2]) -> Result<CollectorDiff> {
        match self {
            CollectorKind::Users => UsersCollector::decode_report_segment(data, run_ids),
        }
    }

    pub fn export_diff_relational<C: GenericClient>(
        self,
        client: &mut C,
        report_id: &str,
        diff: &CollectorDiff,
        run_ids: [&str; 2],
    ) -> Result<()> {
        match self {
            CollectorKind::Users => {
                UsersCollector::export_diff_relational(client, report_id, diff, run_ids)
            }
        }
    }

    pub fn import_diff_relational<C: GenericClient>(
        self,
        client: &mut C,
        report_id: &str,
        run_ids: [&str; 2],
        report: &mut DiffReport,
    ) -> Result<()> {
        match self {
            CollectorKind::Users => {
                UsersCollector::import_diff_relational(client, report_id, run_ids, report)
            }
        }
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for CollectorKind {
    type Error = FormatError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Self::from_tag(tag).ok_or(FormatError::UnknownCollectorType(tag))
    }
}

/// One collector instance of any variant.
#[derive(Debug)]
pub enum AnyCollector {
    Users(UsersCollector),
}

impl AnyCollector {
    pub fn kind(&self) -> CollectorKind {
        match self {
            AnyCollector::Users(_) => CollectorKind::Users,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn type_tag(&self) -> u8 {
        self.kind().type_tag()
    }

    pub fn run(&mut self) {
        match self {
            AnyCollector::Users(c) => c.run(),
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            AnyCollector::Users(c) => c.is_running(),
        }
    }

    pub fn has_result(&self) -> bool {
        match self {
            AnyCollector::Users(c) => c.has_result(),
        }
    }

    pub fn format(&mut self) -> Result<(), EncodingError> {
        match self {
            AnyCollector::Users(c) => c.format(),
        }
    }

    pub fn export_binary(&self) -> Result<Vec<u8>> {
        match self {
            AnyCollector::Users(c) => c.export_binary(),
        }
    }

    pub fn import_binary<'a>(&mut self, data: &'a [u8]) -> Result<&'a [u8]> {
        match self {
            AnyCollector::Users(c) => c.import_binary(data),
        }
    }

    pub fn export_relational<C: GenericClient>(&self, client: &mut C, run_id: &str) -> Result<()> {
        match self {
            AnyCollector::Users(c) => c.export_relational(client, run_id),
        }
    }

    pub fn import_relational<C: GenericClient>(&mut self, client: &mut C, run_id: &str) -> Result<()> {
        match self {
            AnyCollector::Users(c) => c.import_relational(client, run_id),
        }
    }

    /// Same variant and identical encoded content.
    pub fn same_state(&self, other: &AnyCollector) -> bool {
        match (self, other) {
            (AnyCollector::Users(a), AnyCollector::Users(b)) => a.same_state(b),
        }
    }

    pub fn as_users_collector(&self) -> Option<&UsersCollector> {
        match self {
            AnyCollector::Users(c) => Some(c),
        }
    }
}

impl From<UsersCollector> for AnyCollector {
    fn from(c: UsersCollector) -> Self {
        AnyCollector::Users(c)
    }
}

/// Fails with `CollectorMismatch` when `found` is not of kind `expected`.
pub fn ensure_kind(expected: CollectorKind, found: &AnyCollector) -> Result<()> {
    if found.kind() == expected {
        Ok(())
    } else {
        Err(AuditError::CollectorMismatch {
            expected: expected.name(),
            found: found.name(),
        })
    }
}

fn downcast_users(c: &AnyCollector) -> Result<&UsersCollector> {
    ensure_kind(CollectorKind::Users, c)?;
    match c {
        AnyCollector::Users(c) => Ok(c),
    }
}
