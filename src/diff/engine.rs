//! Comparison of two runs.
//!
//! `diff_runs` aligns the collector sets of both runs by name, then hands
//! each collector (or pair of same-named collectors) to its variant-level
//! `diff`, which ends up in `diff_collectors`.

use tracing::debug;

use crate::collector::{
    AnyCollector, CollectibleItem, Collector, CollectorSet, intersection, symmetric_difference,
};
use crate::diff::{ChangeKind, DiffElement, DiffReport};
use crate::error::Result;

/// Elements of `a` not found in `b` and elements of `b` not found in `a`.
/// Membership is structural; repeated elements are kept as many times as
/// they occur.
pub fn xor_items<T: PartialEq + Clone>(a: &[T], b: &[T]) -> (Vec<T>, Vec<T>) {
    let only_a = a.iter().filter(|x| !b.contains(x)).cloned().collect();
    let only_b = b.iter().filter(|x| !a.contains(x)).cloned().collect();
    (only_a, only_b)
}

/// Records every held fact of one side as `change`, or an empty list per
/// kind when that side holds nothing of it.
fn one_sided<C: Collector>(
    run_id: &str,
    collector: &C,
    change: ChangeKind,
    report: &mut DiffReport,
) -> Result<()> {
    for kind in C::REPORT_TREE {
        let items = collector.collectibles(*kind);
        if items.is_empty() {
            report.add_no_diff_element(C::NAME, *kind)?;
            continue;
        }
        for item in items {
            report.add_diff_element(C::NAME, DiffElement::new(run_id, item, change))?;
        }
    }
    Ok(())
}

/// Compares two possibly absent instances of the same variant.
///
/// - only `a`: all of its facts are `Deleted`, attributed to `run_a`
/// - only `b`: all of its facts are `Created`, attributed to `run_b`
/// - both with identical content: every kind is recorded as unchanged
/// - both otherwise: per-kind symmetric difference
pub fn diff_collectors<C: Collector>(
    run_a: &str,
    run_b: &str,
    a: Option<&C>,
    b: Option<&C>,
    report: &mut DiffReport,
) -> Result<()> {
    match (a, b) {
        (None, None) => Ok(()),
        (Some(a), None) => one_sided(run_a, a, ChangeKind::Deleted, report),
        (None, Some(b)) => one_sided(run_b, b, ChangeKind::Created, report),
        (Some(a), Some(b)) => {
            if a.same_state(b) {
                debug!(collector = C::NAME, "identical content, skipping element comparison");
                return report.add_no_diff_collector(C::NAME, C::REPORT_TREE);
            }
            for kind in C::REPORT_TREE {
                let items_a: Vec<CollectibleItem> = a.collectibles(*kind);
                let items_b: Vec<CollectibleItem> = b.collectibles(*kind);
                let (deleted, created) = xor_items(&items_a, &items_b);
                if deleted.is_empty() && created.is_empty() {
                    report.add_no_diff_element(C::NAME, *kind)?;
                    continue;
                }
                for item in deleted {
                    report.add_diff_element(
                        C::NAME,
                        DiffElement::new(run_a, item, ChangeKind::Deleted),
                    )?;
                }
                for item in created {
                    report.add_diff_element(
                        C::NAME,
                        DiffElement::new(run_b, item, ChangeKind::Created),
                    )?;
                }
            }
            Ok(())
        }
    }
}

/// Aligns two runs by collector name and diffs every collector into
/// `report`. Collectors present on one side only take the one-sided path.
pub fn diff_runs(
    run_a: &str,
    set_a: &CollectorSet,
    run_b: &str,
    set_b: &CollectorSet,
    report: &mut DiffReport,
) -> Result<()> {
    let (only_a, only_b) = symmetric_difference(set_a, set_b);
    let both = intersection(set_a, set_b);
    debug!(
        run_a,
        run_b,
        only_a = only_a.len(),
        only_b = only_b.len(),
        both = both.len(),
        "aligned collector sets"
    );

    for name in only_a {
        if let Some(c) = set_a.get(name) {
            diff_one(run_a, run_b, Some(c), None, report)?;
        }
    }
    for name in only_b {
        if let Some(c) = set_b.get(name) {
            diff_one(run_a, run_b, None, Some(c), report)?;
        }
    }
    for name in both {
        diff_one(run_a, run_b, set_a.get(name), set_b.get(name), report)?;
    }
    Ok(())
}

fn diff_one(
    run_a: &str,
    run_b: &str,
    a: Option<&AnyCollector>,
    b: Option<&AnyCollector>,
    report: &mut DiffReport,
) -> Result<()> {
    let Some(kind) = a.or(b).map(AnyCollector::kind) else {
        return Ok(());
    };
    kind.diff(run_a, run_b, a, b, report)
}
