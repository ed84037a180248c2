//! Property checks for collectible and report encodings.

use std::sync::Arc;

use proptest::prelude::*;

use hostdelta::collector::users::{Group, Sudoer, User};
use hostdelta::collector::{Collectible, CollectibleKind, CollectorRegistry, MockFs, SystemSource};
use hostdelta::diff::codec::{encode_report, read_report};
use hostdelta::diff::{ChangeKind, DiffElement, DiffReport};

const MAX_ID: u64 = (1 << 61) - 1;

fn user() -> impl Strategy<Value = User> {
    (0..=MAX_ID, "[a-z_][a-z0-9_-]{0,31}", prop::collection::vec(0..=MAX_ID, 0..8))
        .prop_map(|(uid, name, groups)| User::new(uid, name, groups))
}

fn group() -> impl Strategy<Value = Group> {
    (0..=MAX_ID, "\\PC{0,40}").prop_map(|(gid, name)| Group::new(gid, name))
}

fn change() -> impl Strategy<Value = ChangeKind> {
    prop_oneof![
        Just(ChangeKind::Created),
        Just(ChangeKind::Deleted),
        Just(ChangeKind::Modified),
    ]
}

fn registry() -> CollectorRegistry {
    CollectorRegistry::new(Arc::new(SystemSource::new(MockFs::new())))
}

proptest! {
    #[test]
    fn user_roundtrip(u in user()) {
        let bytes = u.to_bytes().unwrap();
        let (decoded, rest) = User::from_bytes(&bytes).unwrap();
        prop_assert_eq!(decoded, u);
        prop_assert!(rest.is_empty());
    }

    #[test]
    fn group_roundtrip(g in group()) {
        let bytes = g.to_bytes().unwrap();
        let (decoded, rest) = Group::from_bytes(&bytes).unwrap();
        prop_assert_eq!(decoded, g);
        prop_assert!(rest.is_empty());
    }

    #[test]
    fn sudoer_roundtrip(uid in 0..=MAX_ID) {
        let s = Sudoer::new(uid);
        let bytes = s.to_bytes().unwrap();
        let (decoded, rest) = Sudoer::from_bytes(&bytes).unwrap();
        prop_assert_eq!(decoded, s);
        prop_assert!(rest.is_empty());
    }

    #[test]
    fn report_roundtrip(
        users in prop::collection::vec((user(), any::<bool>(), change()), 0..6),
        groups in prop::collection::vec((group(), any::<bool>(), change()), 0..6),
        sudoers in prop::collection::vec((0..=MAX_ID, any::<bool>(), change()), 0..6),
        window in 1usize..64,
    ) {
        let mut report = DiffReport::new("left", "right");
        let side = |second: bool| if second { "right" } else { "left" };
        let collector = "Users Collector";

        for (u, second, c) in users {
            report.add_diff_element(collector, DiffElement::new(side(second), u, c)).unwrap();
        }
        for (g, second, c) in groups {
            report.add_diff_element(collector, DiffElement::new(side(second), g, c)).unwrap();
        }
        for (uid, second, c) in sudoers {
            report
                .add_diff_element(collector, DiffElement::new(side(second), Sudoer::new(uid), c))
                .unwrap();
        }
        for kind in [CollectibleKind::User, CollectibleKind::Group, CollectibleKind::Sudoer] {
            if report.elements(collector, kind).is_none() {
                report.add_no_diff_element(collector, kind).unwrap();
            }
        }

        let bytes = encode_report(&report, &registry()).unwrap();
        let decoded = read_report(bytes.as_slice(), window, &registry()).unwrap();
        prop_assert_eq!(decoded, report);
    }
}
