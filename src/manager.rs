//! Analysis manager: owns resident runs and reports and sequences snapshot
//! runs, diffs, and persistence.
//!
//! # Lifecycle
//!
//! ```text
//! run_snapshot ─┐                      ┌─► save(Binary | Relational)
//! load ─────────┴─► runs[run_id] ──────┤
//!                                      └─► make_diff ─► reports[report_id]
//!                                                            │
//! import_report ────────────────────────────────────────────►┤
//!                                                            └─► export_report
//! ```
//!
//! All entry points take `&self`; the run and report maps sit behind
//! `RwLock`s so a manager can be shared between threads. At most one
//! snapshot runs at a time, and its id counts as resident from the moment
//! it is claimed. When both locks are needed, `running` is taken before
//! `runs`.

use std::collections::HashMap;
use std::fs::File;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread;

use chrono::Utc;
use postgres::Client;
use tracing::{debug, error, info, warn};

use crate::collector::{AnyCollector, CollectorKind, CollectorRegistry, CollectorSet, NameSet};
use crate::config::{ManagerConfig, Method};
use crate::diff::{DiffReport, codec as report_codec, engine};
use crate::error::{AuditError, Result};
use crate::storage::{
    read_snapshot, relational, report_path, snapshot_path, write_atomic, write_snapshot,
};

/// Report id used when `make_diff` is not given one.
pub fn default_report_id(run_a: &str, run_b: &str) -> String {
    format!("{} vs {}", run_a, run_b)
}

/// Timestamped run id for callers that do not pick their own.
pub fn new_run_id() -> String {
    Utc::now().format("%Y-%m-%dT%H-%M-%S%.3fZ").to_string()
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds the single-flight slot for the duration of one snapshot run.
struct SnapshotGuard<'a> {
    slot: &'a Mutex<Option<String>>,
}

impl Drop for SnapshotGuard<'_> {
    fn drop(&mut self) {
        *lock(self.slot) = None;
    }
}

pub struct AnalysisManager {
    config: ManagerConfig,
    registry: CollectorRegistry,
    runs: RwLock<HashMap<String, CollectorSet>>,
    reports: RwLock<HashMap<String, DiffReport>>,
    running: Mutex<Option<String>>,
}

impl std::fmt::Debug for AnalysisManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisManager")
            .field("config", &self.config)
            .field("runs", &self.run_ids())
            .field("reports", &self.report_ids())
            .field("running", &self.running_snapshot())
            .finish()
    }
}

impl AnalysisManager {
    pub fn new(config: ManagerConfig, registry: CollectorRegistry) -> Self {
        Self {
            config,
            registry,
            runs: RwLock::new(HashMap::new()),
            reports: RwLock::new(HashMap::new()),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn registry(&self) -> &CollectorRegistry {
        &self.registry
    }

    /// Id of the snapshot currently being gathered, if any.
    pub fn running_snapshot(&self) -> Option<String> {
        lock(&self.running).clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.running).is_some()
    }

    fn in_flight(&self, run_id: &str) -> bool {
        lock(&self.running).as_deref() == Some(run_id)
    }

    /// Resident run ids, sorted. Includes a snapshot still being gathered.
    pub fn run_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.running_snapshot().into_iter().collect();
        ids.extend(read(&self.runs).keys().cloned());
        ids.sort();
        ids.dedup();
        ids
    }

    /// Whether `run_id` is resident or currently being gathered.
    pub fn has_run(&self, run_id: &str) -> bool {
        self.in_flight(run_id) || read(&self.runs).contains_key(run_id)
    }

    /// Fails unless the collectors of `run_id` can be read right now.
    fn ensure_complete(&self, run_id: &str) -> Result<()> {
        if read(&self.runs).contains_key(run_id) {
            return Ok(());
        }
        if self.in_flight(run_id) {
            return Err(AuditError::SnapshotInProgress(run_id.to_string()));
        }
        Err(AuditError::UnknownRun(run_id.to_string()))
    }

    /// Resident report ids, sorted.
    pub fn report_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = read(&self.reports).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn has_report(&self, report_id: &str) -> bool {
        read(&self.reports).contains_key(report_id)
    }

    /// A copy of a resident report.
    pub fn report(&self, report_id: &str) -> Option<DiffReport> {
        read(&self.reports).get(report_id).cloned()
    }

    /// Calls `f` with the collectors of a resident run. Fails with
    /// `SnapshotInProgress` while `run_id` is still being gathered.
    pub fn with_run<T>(&self, run_id: &str, f: impl FnOnce(&CollectorSet) -> T) -> Result<T> {
        self.ensure_complete(run_id)?;
        let runs = read(&self.runs);
        let set = runs
            .get(run_id)
            .ok_or_else(|| AuditError::UnknownRun(run_id.to_string()))?;
        Ok(f(set))
    }

    /// Makes an already gathered collector set resident under `run_id`.
    pub fn insert_run(&self, run_id: &str, collectors: CollectorSet) -> Result<()> {
        let slot = lock(&self.running);
        if slot.as_deref() == Some(run_id) {
            return Err(AuditError::DuplicateRun(run_id.to_string()));
        }
        self.store_run(run_id, collectors)
    }

    fn store_run(&self, run_id: &str, collectors: CollectorSet) -> Result<()> {
        let mut runs = write(&self.runs);
        if runs.contains_key(run_id) {
            return Err(AuditError::DuplicateRun(run_id.to_string()));
        }
        runs.insert(run_id.to_string(), collectors);
        Ok(())
    }

    fn claim_snapshot(&self, run_id: &str) -> Result<SnapshotGuard<'_>> {
        let mut slot = lock(&self.running);
        if let Some(current) = slot.as_ref() {
            return Err(AuditError::SnapshotInProgress(current.clone()));
        }
        if read(&self.runs).contains_key(run_id) {
            return Err(AuditError::DuplicateRun(run_id.to_string()));
        }
        *slot = Some(run_id.to_string());
        Ok(SnapshotGuard {
            slot: &self.running,
        })
    }

    /// Runs one collector per requested variant, each on its own thread,
    /// and stores the formatted results under `run_id`.
    ///
    /// `run_id` is reported by `has_run` as soon as the snapshot is claimed.
    /// A collector that panics or cannot be formatted is logged and left out
    /// of the run; the others are kept.
    ///
    /// Fails with `SnapshotInProgress` while another snapshot runs and with
    /// `DuplicateRun` if `run_id` is already resident.
    pub fn run_snapshot(&self, run_id: &str, kinds: &[CollectorKind]) -> Result<()> {
        let _guard = self.claim_snapshot(run_id)?;

        let mut pending = CollectorSet::new();
        for kind in kinds {
            if !self.registry.kinds().contains(kind) {
                return Err(AuditError::UnknownCollector(kind.name().to_string()));
            }
            pending.insert(self.registry.instantiate(*kind))?;
        }
        info!(run_id, collectors = pending.len(), "snapshot started");

        let outcomes: Vec<Result<()>> = thread::scope(|s| {
            let handles: Vec<_> = pending
                .iter_mut()
                .map(|collector| {
                    let name = collector.name();
                    let handle = s.spawn(move || {
                        debug!(collector = collector.name(), "collector started");
                        collector.run();
                        collector.format()
                    });
                    (name, handle)
                })
                .collect();
            handles
                .into_iter()
                .map(|(name, handle)| match handle.join() {
                    Ok(result) => result.map_err(AuditError::from),
                    Err(_) => {
                        error!(collector = name, "collector worker panicked");
                        Err(AuditError::TaskPanicked(name.to_string()))
                    }
                })
                .collect()
        });

        let mut collectors = CollectorSet::new();
        for (collector, outcome) in pending.into_iter().zip(outcomes) {
            match outcome {
                Ok(()) => collectors.insert(collector)?,
                Err(e) => error!(
                    run_id,
                    collector = collector.name(),
                    error = %e,
                    "collector dropped from run"
                ),
            }
        }

        self.store_run(run_id, collectors)?;
        info!(run_id, "snapshot finished");
        Ok(())
    }

    /// Runs every registered variant.
    pub fn run_full_snapshot(&self, run_id: &str) -> Result<()> {
        let kinds = self.registry.kinds().to_vec();
        self.run_snapshot(run_id, &kinds)
    }

    fn connect(&self) -> Result<Client> {
        self.config
            .database
            .as_ref()
            .ok_or(AuditError::MissingBackendTarget)?
            .connect()
    }

    /// Persists a resident run.
    pub fn save(&self, run_id: &str, method: Method) -> Result<()> {
        self.ensure_complete(run_id)?;
        let runs = read(&self.runs);
        let collectors = runs
            .get(run_id)
            .ok_or_else(|| AuditError::UnknownRun(run_id.to_string()))?;

        match method {
            Method::Binary => {
                let bytes = write_snapshot(collectors)?;
                let path = snapshot_path(self.config.data_dir(), run_id);
                write_atomic(&path, &bytes)?;
                info!(run_id, path = %path.display(), bytes = bytes.len(), "snapshot saved");
            }
            Method::Relational => {
                let mut client = self.connect()?;
                let mut tx = client.transaction()?;
                for collector in collectors {
                    collector.export_relational(&mut tx, run_id)?;
                }
                relational::record_snapshot(&mut tx, run_id, &collectors.type_tags())?;
                tx.commit()?;
                info!(run_id, collectors = collectors.len(), "snapshot saved to database");
            }
        }
        Ok(())
    }

    /// Loads a saved run. Returns `Ok(false)` without touching anything if
    /// `run_id` is already resident or is being gathered.
    pub fn load(&self, run_id: &str, method: Method) -> Result<bool> {
        if self.has_run(run_id) {
            warn!(run_id, "run already loaded");
            return Ok(false);
        }

        let collectors = match method {
            Method::Binary => {
                let path = snapshot_path(self.config.data_dir(), run_id);
                let file = File::open(&path)?;
                debug!(run_id, path = %path.display(), "reading snapshot");
                read_snapshot(file, self.config.buffer_size, &self.registry)?
            }
            Method::Relational => {
                let mut client = self.connect()?;
                let tags = relational::snapshot_collectors(&mut client, run_id)?;
                if tags.is_empty() {
                    return Err(AuditError::UnknownRun(run_id.to_string()));
                }
                let mut collectors = CollectorSet::new();
                for tag in tags {
                    let kind = self.registry.get_by_type(tag)?;
                    let mut collector: AnyCollector = self.registry.instantiate(kind);
                    collector.import_relational(&mut client, run_id)?;
                    collector.format()?;
                    collectors.insert(collector)?;
                }
                collectors
            }
        };

        let slot = lock(&self.running);
        let mut runs = write(&self.runs);
        if slot.as_deref() == Some(run_id) || runs.contains_key(run_id) {
            warn!(run_id, "run loaded concurrently, discarding this copy");
            return Ok(false);
        }
        info!(run_id, collectors = ?collectors.names(), "run loaded");
        runs.insert(run_id.to_string(), collectors);
        Ok(true)
    }

    /// Evicts a run from memory. Absent ids are ignored.
    pub fn dump(&self, run_id: &str) {
        if write(&self.runs).remove(run_id).is_some() {
            debug!(run_id, "run dumped");
        }
    }

    /// Evicts a report from memory. Absent ids are ignored.
    pub fn dump_report(&self, report_id: &str) {
        if write(&self.reports).remove(report_id).is_some() {
            debug!(report_id, "report dumped");
        }
    }

    /// Diffs two resident runs and stores the report. Returns the report id,
    /// which defaults to `"<run_a> vs <run_b>"`.
    pub fn make_diff(&self, run_a: &str, run_b: &str, report_id: Option<&str>) -> Result<String> {
        let report_id = report_id
            .map(str::to_string)
            .unwrap_or_else(|| default_report_id(run_a, run_b));

        self.ensure_complete(run_a)?;
        self.ensure_complete(run_b)?;
        let report = {
            let runs = read(&self.runs);
            let set_a = runs
                .get(run_a)
                .ok_or_else(|| AuditError::UnknownRun(run_a.to_string()))?;
            let set_b = runs
                .get(run_b)
                .ok_or_else(|| AuditError::UnknownRun(run_b.to_string()))?;
            if self.has_report(&report_id) {
                return Err(AuditError::DuplicateReport(report_id));
            }

            let mut report = DiffReport::new(run_a, run_b);
            engine::diff_runs(run_a, set_a, run_b, set_b, &mut report)?;
            report
        };

        let mut reports = write(&self.reports);
        if reports.contains_key(&report_id) {
            return Err(AuditError::DuplicateReport(report_id));
        }
        info!(
            report_id = %report_id,
            run_a,
            run_b,
            elements = report.element_count(),
            "diff computed"
        );
        reports.insert(report_id.clone(), report);
        Ok(report_id)
    }

    /// Persists a resident report.
    pub fn export_report(&self, report_id: &str, method: Method) -> Result<()> {
        let reports = read(&self.reports);
        let report = reports
            .get(report_id)
            .ok_or_else(|| AuditError::UnknownReport(report_id.to_string()))?;

        match method {
            Method::Binary => {
                let bytes = report_codec::encode_report(report, &self.registry)?;
                let path = report_path(self.config.data_dir(), report_id);
                write_atomic(&path, &bytes)?;
                info!(report_id, path = %path.display(), bytes = bytes.len(), "report exported");
            }
            Method::Relational => {
                let run_ids = report.run_ids();
                let mut client = self.connect()?;
                let mut tx = client.transaction()?;
                let mut tags = Vec::new();
                for (name, diff) in report.tree() {
                    let kind = self.registry.get_by_name(name)?;
                    kind.export_diff_relational(&mut tx, report_id, diff, run_ids)?;
                    tags.push(kind.type_tag());
                }
                relational::record_report(&mut tx, report_id, run_ids, &tags)?;
                tx.commit()?;
                info!(report_id, collectors = tags.len(), "report exported to database");
            }
        }
        Ok(())
    }

    /// Loads a saved report. Returns `Ok(false)` if `report_id` is already
    /// resident.
    pub fn import_report(&self, report_id: &str, method: Method) -> Result<bool> {
        if self.has_report(report_id) {
            warn!(report_id, "report already loaded");
            return Ok(false);
        }

        let report = match method {
            Method::Binary => {
                let path = report_path(self.config.data_dir(), report_id);
                let file = File::open(&path)?;
                debug!(report_id, path = %path.display(), "reading report");
                report_codec::read_report(file, self.config.buffer_size, &self.registry)?
            }
            Method::Relational => {
                let mut client = self.connect()?;
                let (run_a, run_b, tags) = relational::report_catalog(&mut client, report_id)?
                    .ok_or_else(|| AuditError::UnknownReport(report_id.to_string()))?;
                let mut report = DiffReport::new(run_a.as_str(), run_b.as_str());
                for tag in tags {
                    let kind = self.registry.get_by_type(tag)?;
                    kind.import_diff_relational(
                        &mut client,
                        report_id,
                        [run_a.as_str(), run_b.as_str()],
                        &mut report,
                    )?;
                }
                report
            }
        };

        let mut reports = write(&self.reports);
        if reports.contains_key(report_id) {
            warn!(report_id, "report loaded concurrently, discarding this copy");
            return Ok(false);
        }
        info!(report_id, elements = report.element_count(), "report imported");
        reports.insert(report_id.to_string(), report);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::collector::{MockFs, SystemSource};

    fn manager(dir: &std::path::Path) -> AnalysisManager {
        AnalysisManager::new(
            ManagerConfig::new(dir),
            CollectorRegistry::new(Arc::new(SystemSource::new(MockFs::typical_host()))),
        )
    }

    #[test]
    fn test_default_report_id() {
        assert_eq!(default_report_id("mon", "tue"), "mon vs tue");
    }

    #[test]
    fn test_new_run_id_is_timestamp() {
        let id = new_run_id();
        assert!(id.ends_with('Z'));
        assert!(id.starts_with("20"));
    }

    #[test]
    fn test_run_snapshot_registers_run() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.run_snapshot("a", &[CollectorKind::Users]).unwrap();

        assert_eq!(manager.run_ids(), vec!["a".to_string()]);
        assert!(!manager.is_running());
        let names = manager.with_run("a", |set| set.names()).unwrap();
        assert_eq!(names, vec!["Users Collector"]);
        assert!(matches!(
            manager.run_snapshot("a", &[CollectorKind::Users]),
            Err(AuditError::DuplicateRun(_))
        ));
    }

    #[test]
    fn test_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        assert!(matches!(
            manager.save("nope", Method::Binary),
            Err(AuditError::UnknownRun(_))
        ));
        assert!(matches!(
            manager.make_diff("x", "y", None),
            Err(AuditError::UnknownRun(_))
        ));
        assert!(matches!(
            manager.export_report("nope", Method::Binary),
            Err(AuditError::UnknownReport(_))
        ));
        assert!(manager.with_run("nope", |_| ()).is_err());
    }

    #[test]
    fn test_relational_without_target() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.run_snapshot("a", &[CollectorKind::Users]).unwrap();
        assert!(matches!(
            manager.save("a", Method::Relational),
            Err(AuditError::MissingBackendTarget)
        ));
        assert!(matches!(
            manager.load("b", Method::Relational),
            Err(AuditError::MissingBackendTarget)
        ));
    }

    #[test]
    fn test_dump_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.run_snapshot("a", &[CollectorKind::Users]).unwrap();
        manager.dump("a");
        manager.dump("a");
        manager.dump_report("missing");
        assert!(manager.run_ids().is_empty());
    }

    #[test]
    fn test_duplicate_report_id() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.run_snapshot("a", &[CollectorKind::Users]).unwrap();
        manager.run_snapshot("b", &[CollectorKind::Users]).unwrap();

        assert_eq!(manager.make_diff("a", "b", None).unwrap(), "a vs b");
        assert!(matches!(
            manager.make_diff("a", "b", None),
            Err(AuditError::DuplicateReport(id)) if id == "a vs b"
        ));
        assert_eq!(manager.make_diff("a", "b", Some("again")).unwrap(), "again");
    }

    #[test]
    fn test_load_resident_run_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.run_snapshot("a", &[CollectorKind::Users]).unwrap();
        assert!(!manager.load("a", Method::Binary).unwrap());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        assert!(matches!(
            manager.load("ghost", Method::Binary),
            Err(AuditError::Io(_))
        ));
        assert!(matches!(
            manager.import_report("ghost", Method::Binary),
            Err(AuditError::Io(_))
        ));
    }
}
