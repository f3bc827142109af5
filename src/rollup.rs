//! Time rollup and date-span aggregation.
//!
//! Rollups sum directly-logged minutes per task and propagate subtree
//! totals upward in one deepest-first pass. Spans place tasks on a
//! timeline: a task occupies (creation date, due date), and a parent's
//! span is widened to cover every in-window child so its bar visually
//! contains them. Both are request-scoped computations; nothing is cached.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate};
use serde::Serialize;

use crate::error::EngineResult;
use crate::hierarchy::{self, MAX_DEPTH};
use crate::store::TaskStore;
use crate::task::Task;

/// Aggregated logged minutes for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRollup {
    /// Minutes logged directly against the task.
    pub direct: u64,
    /// Sum of `total` over all descendants.
    pub children_total: u64,
    /// `direct + children_total`.
    pub total: u64,
}

/// The date range a task occupies on a timeline view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimelineSpan {
    pub task: u64,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Whole days between start and end; same-day spans are 0.
    pub duration_days: i64,
}

/// Compute direct, subtree and combined minute totals for each requested
/// task and every task beneath it. Requested subtrees may overlap; each
/// task appears once in the result.
pub fn rollup(
    store: &dyn TaskStore,
    task_ids: &[u64],
) -> EngineResult<BTreeMap<u64, TimeRollup>> {
    // Gather every task in the requested subtrees, once.
    let mut involved: BTreeMap<u64, Task> = BTreeMap::new();
    for &root in task_ids {
        if involved.contains_key(&root) {
            continue;
        }
        let nodes = hierarchy::descendants(store, root)?;
        if let Some(task) = store.get(root)? {
            involved.insert(root, task);
        }
        for n in nodes {
            involved.entry(n.task.id).or_insert(n.task);
        }
    }

    // Child edges restricted to the gathered set.
    let mut child_map: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for t in involved.values() {
        if let Some(p) = t.parent {
            if involved.contains_key(&p) {
                child_map.entry(p).or_default().push(t.id);
            }
        }
    }

    let ids: Vec<u64> = involved.keys().copied().collect();
    let directs = store.time_entry_totals(&ids)?;

    // One bottom-up pass: absolute depths give a consistent deepest-first
    // order even when requested subtrees overlap.
    let mut order: Vec<(usize, u64)> = Vec::with_capacity(ids.len());
    for &id in &ids {
        order.push((hierarchy::depth_of(store, id)?, id));
    }
    order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let mut out: BTreeMap<u64, TimeRollup> = BTreeMap::new();
    for (_, id) in order {
        let direct = directs.get(&id).copied().unwrap_or(0);
        let children_total = child_map
            .get(&id)
            .map(|kids| {
                kids.iter()
                    .map(|k| out.get(k).map(|r| r.total).unwrap_or(0))
                    .sum()
            })
            .unwrap_or(0);
        out.insert(
            id,
            TimeRollup {
                direct,
                children_total,
                total: direct + children_total,
            },
        );
    }
    Ok(out)
}

fn creation_date(ts: i64) -> NaiveDate {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.date_naive())
        .unwrap_or(NaiveDate::MIN)
}

fn base_span(t: &Task) -> (NaiveDate, NaiveDate) {
    let start = creation_date(t.created_at_utc);
    // A due date earlier than creation collapses to a same-day span.
    let end = t.due.filter(|d| *d >= start).unwrap_or(start);
    (start, end)
}

/// Place the given tasks on a timeline clipped to the `[from, to]` window.
///
/// A parent with in-window children is widened to `min`/`max` over those
/// children so its bar covers them even when its own span sits entirely
/// outside the window. Widening runs first; only then are tasks whose
/// widened span misses the window dropped. Results are ordered by start
/// date, then id.
pub fn timeline_spans(tasks: &[Task], from: NaiveDate, to: NaiveDate) -> Vec<TimelineSpan> {
    let live: Vec<&Task> = tasks.iter().filter(|t| t.is_live()).collect();
    let in_set: BTreeSet<u64> = live.iter().map(|t| t.id).collect();

    let mut spans: BTreeMap<u64, (NaiveDate, NaiveDate)> =
        live.iter().map(|t| (t.id, base_span(t))).collect();

    // Depth within the given set, walking parent pointers with the usual
    // corruption cap; nodes above the cap are treated as roots.
    let parent_of: BTreeMap<u64, Option<u64>> = live
        .iter()
        .map(|t| (t.id, t.parent.filter(|p| in_set.contains(p))))
        .collect();
    let depth_in_set = |mut id: u64| -> usize {
        let mut depth = 0;
        while let Some(&Some(p)) = parent_of.get(&id) {
            depth += 1;
            id = p;
            if depth > MAX_DEPTH {
                break;
            }
        }
        depth
    };

    let mut order: Vec<(usize, u64)> = spans.keys().map(|&id| (depth_in_set(id), id)).collect();
    order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    // Deepest first, so every child span is final before its parent widens.
    // Only children whose final span lands in the window pull their parent;
    // this chains upward, so a grandchild can bring a whole lineage in.
    for (_, id) in order {
        let Some(&Some(parent)) = parent_of.get(&id) else {
            continue;
        };
        let Some(&(child_start, child_end)) = spans.get(&id) else {
            continue;
        };
        if child_end < from || child_start > to {
            continue;
        }
        if let Some(parent_span) = spans.get_mut(&parent) {
            parent_span.0 = parent_span.0.min(child_start);
            parent_span.1 = parent_span.1.max(child_end);
        }
    }

    spans.retain(|_, &mut (start, end)| end >= from && start <= to);

    let mut out: Vec<TimelineSpan> = spans
        .into_iter()
        .map(|(task, (start, end))| TimelineSpan {
            task,
            start,
            end,
            duration_days: (end - start).num_days(),
        })
        .collect();
    out.sort_by(|a, b| a.start.cmp(&b.start).then(a.task.cmp(&b.task)));
    out
}
