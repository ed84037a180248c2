//! Differences between two runs.
//!
//! A `DiffReport` is a two-level tree: collector name, then collectible
//! kind, then the ordered list of `DiffElement`s. An empty list means the
//! kind was compared and nothing changed; a missing collector key means the
//! collector was not compared at all.

pub mod codec;
pub mod engine;

use std::collections::BTreeMap;
use std::fmt;

use crate::codec::{put_varint, take_u8, take_varint};
use crate::collector::{CollectibleItem, CollectibleKind};
use crate::error::{AuditError, FormatError, Result};

/// Per-kind element lists of one collector.
pub type CollectorDiff = BTreeMap<CollectibleKind, Vec<DiffElement>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChangeKind {
    Created = 0,
    Deleted = 1,
    Modified = 2,
}

impl ChangeKind {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u64) -> Result<Self, FormatError> {
        match code {
            0 => Ok(ChangeKind::Created),
            1 => Ok(ChangeKind::Deleted),
            2 => Ok(ChangeKind::Modified),
            other => Err(FormatError::UnknownChangeKind(other)),
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::Modified => write!(f, "modified"),
        }
    }
}

/// One fact that differs, attributed to the run it was seen in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffElement {
    pub run_id: String,
    pub item: CollectibleItem,
    pub change: ChangeKind,
}

impl DiffElement {
    pub fn new(run_id: impl Into<String>, item: impl Into<CollectibleItem>, change: ChangeKind) -> Self {
        Self {
            run_id: run_id.into(),
            item: item.into(),
            change,
        }
    }

    pub fn kind(&self) -> CollectibleKind {
        self.item.kind()
    }

    /// `side_byte collectible_bytes VarInt(change)`, where the side byte is
    /// the index of `run_id` in `run_ids`.
    pub fn encode_into(&self, buf: &mut Vec<u8>, run_ids: [&str; 2]) -> Result<()> {
        let side = side_index(run_ids, &self.run_id).ok_or_else(|| AuditError::ForeignRun {
            run_id: self.run_id.clone(),
            first: run_ids[0].to_string(),
            second: run_ids[1].to_string(),
        })?;
        buf.push(side);
        self.item.encode_into(buf)?;
        put_varint(buf, u64::from(self.change.code()))?;
        Ok(())
    }

    pub fn to_bytes(&self, run_ids: [&str; 2]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf, run_ids)?;
        Ok(buf)
    }

    /// Decodes one element of `kind` from the front of `data`.
    pub fn decode<'a>(
        data: &'a [u8],
        kind: CollectibleKind,
        run_ids: [&str; 2],
    ) -> Result<(Self, &'a [u8]), FormatError> {
        let (side, rest) = take_u8(data)?;
        let run_id = run_ids
            .get(usize::from(side))
            .ok_or(FormatError::UnknownSide(side))?;
        let (item, rest) = kind.decode(rest)?;
        let (code, rest) = take_varint(rest)?;
        let change = ChangeKind::from_code(code)?;
        Ok((
            Self {
                run_id: (*run_id).to_string(),
                item,
                change,
            },
            rest,
        ))
    }
}

impl fmt::Display for DiffElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.run_id, self.change, self.item)
    }
}

fn side_index(run_ids: [&str; 2], run_id: &str) -> Option<u8> {
    run_ids.iter().position(|r| *r == run_id).map(|i| i as u8)
}

/// Tree of differences between two runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffReport {
    first_run_id: String,
    second_run_id: String,
    tree: BTreeMap<String, CollectorDiff>,
}

impl DiffReport {
    pub fn new(first_run_id: impl Into<String>, second_run_id: impl Into<String>) -> Self {
        Self {
            first_run_id: first_run_id.into(),
            second_run_id: second_run_id.into(),
            tree: BTreeMap::new(),
        }
    }

    pub fn first_run_id(&self) -> &str {
        &self.first_run_id
    }

    pub fn second_run_id(&self) -> &str {
        &self.second_run_id
    }

    /// The two run ids in header order; side bytes index into this.
    pub fn run_ids(&self) -> [&str; 2] {
        [&self.first_run_id, &self.second_run_id]
    }

    pub fn side_of(&self, run_id: &str) -> Option<u8> {
        side_index(self.run_ids(), run_id)
    }

    pub fn tree(&self) -> &BTreeMap<String, CollectorDiff> {
        &self.tree
    }

    pub fn collector_names(&self) -> impl Iterator<Item = &str> {
        self.tree.keys().map(String::as_str)
    }

    pub fn collector(&self, name: &str) -> Option<&CollectorDiff> {
        self.tree.get(name)
    }

    pub fn elements(&self, collector: &str, kind: CollectibleKind) -> Option<&[DiffElement]> {
        self.tree
            .get(collector)
            .and_then(|c| c.get(&kind))
            .map(Vec::as_slice)
    }

    /// Total number of differing facts across all collectors.
    pub fn element_count(&self) -> usize {
        self.tree
            .values()
            .flat_map(|c| c.values())
            .map(Vec::len)
            .sum()
    }

    /// Appends an element under `collector`, creating missing levels.
    pub fn add_diff_element(&mut self, collector: &str, element: DiffElement) -> Result<()> {
        if self.side_of(&element.run_id).is_none() {
            return Err(AuditError::ForeignRun {
                run_id: element.run_id,
                first: self.first_run_id.clone(),
                second: self.second_run_id.clone(),
            });
        }
        self.tree
            .entry(collector.to_string())
            .or_default()
            .entry(element.kind())
            .or_default()
            .push(element);
        Ok(())
    }

    /// Records that `kind` was compared for `collector` without differences.
    pub fn add_no_diff_element(&mut self, collector: &str, kind: CollectibleKind) -> Result<()> {
        let entry = self.tree.entry(collector.to_string()).or_default();
        if entry.contains_key(&kind) {
            return Err(AuditError::DuplicateElementKind {
                collector: collector.to_string(),
                kind: kind.name(),
            });
        }
        entry.insert(kind, Vec::new());
        Ok(())
    }

    /// Records a collector whose two sides were identical: every kind of its
    /// tree is present with an empty list.
    pub fn add_no_diff_collector(&mut self, collector: &str, kinds: &[CollectibleKind]) -> Result<()> {
        self.insert_collector(collector, kinds.iter().map(|k| (*k, Vec::new())).collect())
    }

    /// Inserts a fully built collector subtree.
    pub fn insert_collector(&mut self, collector: &str, diff: CollectorDiff) -> Result<()> {
        if self.tree.contains_key(collector) {
            return Err(AuditError::DuplicateCollector(collector.to_string()));
        }
        self.tree.insert(collector.to_string(), diff);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::users::{Group, User};

    #[test]
    fn test_diff_element_layout() {
        let element = DiffElement::new(
            "test",
            User::new(1001, "test", vec![1001]),
            ChangeKind::Created,
        );
        let bytes = element.to_bytes(["test", "other"]).unwrap();
        assert_eq!(bytes, b"\x00\x23\xe9\x04test\x01\x23\xe9\x00");

        let (decoded, rest) = DiffElement::decode(&bytes, CollectibleKind::User, ["test", "other"]).unwrap();
        assert_eq!(decoded, element);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_diff_element_side_maps_to_second_run() {
        let element = DiffElement::new("b", Group::new(27, "sudo"), ChangeKind::Deleted);
        let bytes = element.to_bytes(["a", "b"]).unwrap();
        assert_eq!(bytes[0], 1);
        assert_eq!(*bytes.last().unwrap(), 1);
    }

    #[test]
    fn test_diff_element_rejects_unknown_side_and_change() {
        let bytes = b"\x02\x1b\x04sudo\x00";
        assert_eq!(
            DiffElement::decode(bytes, CollectibleKind::Group, ["a", "b"]),
            Err(FormatError::UnknownSide(2))
        );

        let bytes = b"\x00\x1b\x04sudo\x03";
        assert_eq!(
            DiffElement::decode(bytes, CollectibleKind::Group, ["a", "b"]),
            Err(FormatError::UnknownChangeKind(3))
        );
    }

    #[test]
    fn test_encode_foreign_run_fails() {
        let element = DiffElement::new("c", Group::new(27, "sudo"), ChangeKind::Created);
        assert!(matches!(
            element.to_bytes(["a", "b"]),
            Err(AuditError::ForeignRun { .. })
        ));
    }

    #[test]
    fn test_add_diff_element_checks_run() {
        let mut report = DiffReport::new("a", "b");
        report
            .add_diff_element(
                "Users Collector",
                DiffElement::new("b", Group::new(1, "g"), ChangeKind::Created),
            )
            .unwrap();
        assert_eq!(report.element_count(), 1);
        assert_eq!(
            report
                .elements("Users Collector", CollectibleKind::Group)
                .map(<[DiffElement]>::len),
            Some(1)
        );

        let err = report
            .add_diff_element(
                "Users Collector",
                DiffElement::new("z", Group::new(1, "g"), ChangeKind::Created),
            )
            .unwrap_err();
        assert!(matches!(err, AuditError::ForeignRun { .. }));
    }

    #[test]
    fn test_add_no_diff_element_duplicate() {
        let mut report = DiffReport::new("a", "b");
        report
            .add_no_diff_element("Users Collector", CollectibleKind::Sudoer)
            .unwrap();
        assert!(matches!(
            report.add_no_diff_element("Users Collector", CollectibleKind::Sudoer),
            Err(AuditError::DuplicateElementKind { kind: "Sudoer", .. })
        ));
        assert_eq!(
            report.elements("Users Collector", CollectibleKind::Sudoer),
            Some(&[][..])
        );
    }

    #[test]
    fn test_add_no_diff_collector() {
        let kinds = [CollectibleKind::User, CollectibleKind::Group];
        let mut report = DiffReport::new("a", "b");
        report.add_no_diff_collector("Users Collector", &kinds).unwrap();

        let collector = report.collector("Users Collector").unwrap();
        assert_eq!(collector.len(), 2);
        assert!(collector.values().all(Vec::is_empty));
        assert!(matches!(
            report.add_no_diff_collector("Users Collector", &kinds),
            Err(AuditError::DuplicateCollector(_))
        ));
    }
}
