//! End-to-end scenarios driving `AnalysisManager` against mock hosts.

use std::io;
use std::path::Path;
use std::sync::Arc;

use hostdelta::collector::source::GROUP_PATH;
use hostdelta::collector::{
    CollectibleItem, CollectibleKind, CollectorKind, CollectorRegistry, CollectorSet, HostSource,
    MockFs, SystemSource,
};
use hostdelta::diff::ChangeKind;
use hostdelta::{AnalysisManager, AuditError, ManagerConfig, Method};

const USERS: &str = "Users Collector";

fn manager_for(fs: MockFs, dir: &std::path::Path) -> AnalysisManager {
    hostdelta::logging::try_init_logging(1, false);
    AnalysisManager::new(
        ManagerConfig::new(dir).with_buffer_size(16),
        CollectorRegistry::new(Arc::new(SystemSource::new(fs))),
    )
}

#[test]
fn identical_snapshots_report_no_difference() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_for(MockFs::typical_host(), dir.path());
    manager.run_snapshot("monday", &[CollectorKind::Users]).unwrap();
    manager.run_snapshot("tuesday", &[CollectorKind::Users]).unwrap();

    let report_id = manager.make_diff("monday", "tuesday", None).unwrap();
    assert_eq!(report_id, "monday vs tuesday");

    let report = manager.report(&report_id).unwrap();
    let users = report.collector(USERS).unwrap();
    assert_eq!(
        users.keys().copied().collect::<Vec<_>>(),
        vec![CollectibleKind::User, CollectibleKind::Group, CollectibleKind::Sudoer]
    );
    assert!(users.values().all(Vec::is_empty));
    assert_eq!(report.element_count(), 0);
}

#[test]
fn new_admin_yields_three_created_elements() {
    let dir = tempfile::tempdir().unwrap();

    let before = manager_for(MockFs::typical_host(), dir.path());
    before.run_snapshot("monday", &[CollectorKind::Users]).unwrap();
    before.save("monday", Method::Binary).unwrap();

    let after = manager_for(MockFs::typical_host_with_new_admin(), dir.path());
    after.run_snapshot("tuesday", &[CollectorKind::Users]).unwrap();
    assert!(after.load("monday", Method::Binary).unwrap());

    let report_id = after.make_diff("monday", "tuesday", None).unwrap();
    let report = after.report(&report_id).unwrap();
    assert_eq!(report.element_count(), 3);

    let collector = report.collector(USERS).unwrap();
    for elements in collector.values() {
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].change, ChangeKind::Created);
        assert_eq!(elements[0].run_id, "tuesday");
    }

    match &collector[&CollectibleKind::User][0].item {
        CollectibleItem::User(user) => {
            assert_eq!(user.uid, 1002);
            assert_eq!(user.name, "carol");
            assert_eq!(user.groups, vec![1002, 27]);
        }
        other => panic!("unexpected item {other}"),
    }
    match &collector[&CollectibleKind::Sudoer][0].item {
        CollectibleItem::Sudoer(sudoer) => assert_eq!(sudoer.uid, 1002),
        other => panic!("unexpected item {other}"),
    }
}

#[test]
fn reversed_diff_reports_deletions_from_first_run() {
    let dir = tempfile::tempdir().unwrap();
    let before = manager_for(MockFs::typical_host_with_new_admin(), dir.path());
    before.run_snapshot("after", &[CollectorKind::Users]).unwrap();
    before.save("after", Method::Binary).unwrap();

    let manager = manager_for(MockFs::typical_host(), dir.path());
    manager.run_snapshot("before", &[CollectorKind::Users]).unwrap();
    manager.load("after", Method::Binary).unwrap();

    let report = manager
        .report(&manager.make_diff("after", "before", Some("rev")).unwrap())
        .unwrap();
    assert_eq!(report.element_count(), 3);
    assert!(report
        .collector(USERS)
        .unwrap()
        .values()
        .flatten()
        .all(|e| e.change == ChangeKind::Deleted && e.run_id == "after"));
}

#[test]
fn collector_only_in_one_run_is_fully_attributed() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_for(MockFs::typical_host(), dir.path());
    manager.run_snapshot("full", &[CollectorKind::Users]).unwrap();
    manager.insert_run("bare", CollectorSet::new()).unwrap();

    let report = manager
        .report(&manager.make_diff("full", "bare", None).unwrap())
        .unwrap();
    // 5 users, 7 groups, 1 sudoer on the typical host
    assert_eq!(report.element_count(), 13);
    assert!(report
        .collector(USERS)
        .unwrap()
        .values()
        .flatten()
        .all(|e| e.change == ChangeKind::Deleted && e.run_id == "full"));

    let report = manager
        .report(&manager.make_diff("bare", "full", None).unwrap())
        .unwrap();
    assert_eq!(report.element_count(), 13);
    assert!(report
        .collector(USERS)
        .unwrap()
        .values()
        .flatten()
        .all(|e| e.change == ChangeKind::Created && e.run_id == "full"));
}

#[test]
fn snapshot_survives_save_dump_load() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_for(MockFs::typical_host(), dir.path());
    manager.run_snapshot("monday", &[CollectorKind::Users]).unwrap();
    let original = manager
        .with_run("monday", |set| {
            set.get(USERS)
                .and_then(|c| c.as_users_collector())
                .and_then(|c| c.snapshot())
                .cloned()
        })
        .unwrap()
        .unwrap();

    manager.save("monday", Method::Binary).unwrap();
    assert!(dir.path().join("monday.snap").exists());
    manager.dump("monday");
    assert!(manager.load("monday", Method::Binary).unwrap());
    assert!(!manager.load("monday", Method::Binary).unwrap());

    let loaded = manager
        .with_run("monday", |set| {
            set.get(USERS)
                .and_then(|c| c.as_users_collector())
                .and_then(|c| c.snapshot())
                .cloned()
        })
        .unwrap()
        .unwrap();
    assert_eq!(loaded, original);

    // a loaded run can be saved again under the same id
    manager.save("monday", Method::Binary).unwrap();
}

#[test]
fn report_survives_export_dump_import() {
    let dir = tempfile::tempdir().unwrap();
    let before = manager_for(MockFs::typical_host(), dir.path());
    before.run_snapshot("monday", &[CollectorKind::Users]).unwrap();
    before.save("monday", Method::Binary).unwrap();

    let manager = manager_for(MockFs::typical_host_with_new_admin(), dir.path());
    manager.run_snapshot("tuesday", &[CollectorKind::Users]).unwrap();
    manager.load("monday", Method::Binary).unwrap();
    let report_id = manager.make_diff("monday", "tuesday", None).unwrap();
    let original = manager.report(&report_id).unwrap();

    manager.export_report(&report_id, Method::Binary).unwrap();
    assert!(dir.path().join("monday vs tuesday.rpt").exists());
    manager.dump_report(&report_id);
    assert!(manager.report_ids().is_empty());

    assert!(manager.import_report(&report_id, Method::Binary).unwrap());
    assert!(!manager.import_report(&report_id, Method::Binary).unwrap());
    assert_eq!(manager.report(&report_id).unwrap(), original);
}

#[test]
fn corrupted_snapshot_fails_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_for(MockFs::typical_host(), dir.path());
    manager.run_snapshot("monday", &[CollectorKind::Users]).unwrap();
    manager.save("monday", Method::Binary).unwrap();
    manager.dump("monday");

    let path = dir.path().join("monday.snap");
    let mut bytes = std::fs::read(&path).unwrap();
    // header is [len, count, tag, offset]; point the offset past the tag
    bytes[3] = 0x01;
    std::fs::write(&path, &bytes).unwrap();

    let err = manager.load("monday", Method::Binary).unwrap_err();
    assert!(matches!(err, AuditError::Format(_)));
    assert!(manager.run_ids().is_empty());
}

#[test]
fn unreadable_group_file_degrades_collection() {
    let dir = tempfile::tempdir().unwrap();
    let mut fs = MockFs::typical_host();
    fs.deny(GROUP_PATH);
    let manager = manager_for(fs, dir.path());
    manager.run_snapshot("locked", &[CollectorKind::Users]).unwrap();

    let snapshot = manager
        .with_run("locked", |set| {
            set.get(USERS)
                .and_then(|c| c.as_users_collector())
                .and_then(|c| c.snapshot())
                .cloned()
        })
        .unwrap()
        .unwrap();
    assert!(snapshot.groups.is_none());
    assert!(snapshot.group_digest.is_none());
    assert!(snapshot.passwd_digest.is_some());

    // degraded runs are still persistable
    manager.save("locked", Method::Binary).unwrap();
}

#[test]
fn relational_method_requires_target() {
    let dir = tempfile::tempdir().unwrap();
    let manager = manager_for(MockFs::typical_host(), dir.path());
    manager.run_snapshot("a", &[CollectorKind::Users]).unwrap();
    manager.run_snapshot("b", &[CollectorKind::Users]).unwrap();
    let report_id = manager.make_diff("a", "b", None).unwrap();

    assert!(matches!(
        manager.export_report(&report_id, Method::Relational),
        Err(AuditError::MissingBackendTarget)
    ));
    assert!(matches!(
        manager.import_report("other", Method::Relational),
        Err(AuditError::MissingBackendTarget)
    ));
    assert!(matches!(
        "csv".parse::<Method>(),
        Err(AuditError::UnsupportedMethod(_))
    ));
}

/// Typical host plus an account whose uid does not fit the wire format.
struct OversizedUidSource(SystemSource<MockFs>);

impl HostSource for OversizedUidSource {
    fn user_lines(&self) -> io::Result<Vec<String>> {
        let mut lines = self.0.user_lines()?;
        lines.push("2305843009213693952(ghost):0".to_string());
        Ok(lines)
    }

    fn group_lines(&self) -> io::Result<Vec<String>> {
        self.0.group_lines()
    }

    fn sudoer_lines(&self) -> io::Result<Vec<String>> {
        self.0.sudoer_lines()
    }

    fn digest(&self, path: &Path) -> io::Result<[u8; 16]> {
        self.0.digest(path)
    }
}

#[test]
fn oversized_uid_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let source = OversizedUidSource(SystemSource::new(MockFs::typical_host()));
    let manager = AnalysisManager::new(
        ManagerConfig::new(dir.path()),
        CollectorRegistry::new(Arc::new(source)),
    );
    manager.run_snapshot("odd", &[CollectorKind::Users]).unwrap();
    assert_eq!(manager.run_ids(), vec!["odd".to_string()]);

    let snapshot = manager
        .with_run("odd", |set| {
            set.get(USERS)
                .and_then(|c| c.as_users_collector())
                .and_then(|c| c.snapshot())
                .cloned()
        })
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.users().len(), 5);
    assert!(snapshot.users().iter().all(|u| u.name != "ghost"));

    manager.save("odd", Method::Binary).unwrap();
}
