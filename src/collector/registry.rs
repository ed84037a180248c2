//! Registry of available collector variants and name-set alignment.
//!
//! The registry is built once at startup and handed to the manager. Runs
//! hold a `CollectorSet`; both expose their collector names through
//! `NameSet`, which is what `symmetric_difference` and `intersection` work
//! on when two runs are aligned before diffing.

use std::sync::Arc;

use crate::collector::kind::{AnyCollector, CollectorKind};
use crate::collector::source::{HostSource, SystemSource};
use crate::collector::traits::RealFs;
use crate::error::{AuditError, FormatError, Result};

/// Anything that has an ordered list of collector names.
pub trait NameSet {
    fn names(&self) -> Vec<&'static str>;

    fn contains_name(&self, name: &str) -> bool {
        self.names().contains(&name)
    }
}

/// Names only in `a` and names only in `b`, each in its own order.
pub fn symmetric_difference<A: NameSet + ?Sized, B: NameSet + ?Sized>(
    a: &A,
    b: &B,
) -> (Vec<&'static str>, Vec<&'static str>) {
    let names_a = a.names();
    let names_b = b.names();
    let only_a = names_a
        .iter()
        .copied()
        .filter(|n| !names_b.contains(n))
        .collect();
    let only_b = names_b
        .iter()
        .copied()
        .filter(|n| !names_a.contains(n))
        .collect();
    (only_a, only_b)
}

/// Names present in both, in the order of `a`, without repeats.
pub fn intersection<A: NameSet + ?Sized, B: NameSet + ?Sized>(a: &A, b: &B) -> Vec<&'static str> {
    let names_b = b.names();
    let mut same: Vec<&'static str> = Vec::new();
    for name in a.names() {
        if names_b.contains(&name) && !same.contains(&name) {
            same.push(name);
        }
    }
    same
}

/// Collector variants available to the system, plus the host source that
/// new instances gather from.
#[derive(Clone)]
pub struct CollectorRegistry {
    kinds: Vec<CollectorKind>,
    source: Arc<dyn HostSource>,
}

impl std::fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorRegistry")
            .field("kinds", &self.kinds)
            .finish_non_exhaustive()
    }
}

impl CollectorRegistry {
    /// Every known variant, gathering from `source`.
    pub fn new(source: Arc<dyn HostSource>) -> Self {
        Self {
            kinds: CollectorKind::ALL.to_vec(),
            source,
        }
    }

    /// Every known variant, gathering from the local `/etc`.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemSource::new(RealFs::new())))
    }

    pub fn builder(source: Arc<dyn HostSource>) -> CollectorRegistryBuilder {
        CollectorRegistryBuilder {
            kinds: Vec::new(),
            source,
        }
    }

    pub fn kinds(&self) -> &[CollectorKind] {
        &self.kinds
    }

    pub fn source(&self) -> Arc<dyn HostSource> {
        Arc::clone(&self.source)
    }

    pub fn get_by_name(&self, name: &str) -> Result<CollectorKind> {
        self.kinds
            .iter()
            .copied()
            .find(|k| k.name() == name)
            .ok_or_else(|| AuditError::UnknownCollector(name.to_string()))
    }

    pub fn get_by_type(&self, tag: u8) -> Result<CollectorKind, FormatError> {
        self.kinds
            .iter()
            .copied()
            .find(|k| k.type_tag() == tag)
            .ok_or(FormatError::UnknownCollectorType(tag))
    }

    pub fn instantiate(&self, kind: CollectorKind) -> AnyCollector {
        kind.instantiate(self.source())
    }
}

impl NameSet for CollectorRegistry {
    fn names(&self) -> Vec<&'static str> {
        self.kinds.iter().map(|k| k.name()).collect()
    }
}

pub struct CollectorRegistryBuilder {
    kinds: Vec<CollectorKind>,
    source: Arc<dyn HostSource>,
}

impl CollectorRegistryBuilder {
    /// Registers a variant; registering twice keeps the first position.
    pub fn add_collector(mut self, kind: CollectorKind) -> Self {
        if !self.kinds.contains(&kind) {
            self.kinds.push(kind);
        }
        self
    }

    pub fn build(self) -> CollectorRegistry {
        CollectorRegistry {
            kinds: self.kinds,
            source: self.source,
        }
    }
}

/// Ordered, name-unique collectors of one run.
#[derive(Debug, Default)]
pub struct CollectorSet {
    collectors: Vec<AnyCollector>,
}

impl CollectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collector: AnyCollector) -> Result<()> {
        if self.contains_name(collector.name()) {
            return Err(AuditError::DuplicateCollector(collector.name().to_string()));
        }
        self.collectors.push(collector);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&AnyCollector> {
        self.collectors.iter().find(|c| c.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut AnyCollector> {
        self.collectors.iter_mut().find(|c| c.name() == name)
    }

    pub fn get_by_type(&self, tag: u8) -> Option<&AnyCollector> {
        self.collectors.iter().find(|c| c.type_tag() == tag)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AnyCollector> {
        self.collectors.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, AnyCollector> {
        self.collectors.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    pub fn type_tags(&self) -> Vec<u8> {
        self.collectors.iter().map(AnyCollector::type_tag).collect()
    }
}

impl NameSet for CollectorSet {
    fn names(&self) -> Vec<&'static str> {
        self.collectors.iter().map(AnyCollector::name).collect()
    }
}

impl<'a> IntoIterator for &'a CollectorSet {
    type Item = &'a AnyCollector;
    type IntoIter = std::slice::Iter<'a, AnyCollector>;

    fn into_iter(self) -> Self::IntoIter {
        self.collectors.iter()
    }
}

impl IntoIterator for CollectorSet {
    type Item = AnyCollector;
    type IntoIter = std::vec::IntoIter<AnyCollector>;

    fn into_iter(self) -> Self::IntoIter {
        self.collectors.into_iter()
    }
}

impl NameSet for [&'static str] {
    fn names(&self) -> Vec<&'static str> {
        self.to_vec()
    }
}
