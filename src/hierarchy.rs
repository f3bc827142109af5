//! Hierarchy guard and traversal.
//!
//! The guard validates and applies parent-pointer changes against the
//! acyclicity and depth-limit invariants; traversal computes ancestor
//! chains, descendant subtrees and depth from the store's parent-pointer
//! data. The parent graph over live tasks is a forest: no task is its own
//! ancestor, and no ancestor chain is longer than [`MAX_DEPTH`].
//!
//! Every walk is capped at `MAX_DEPTH + 1` steps. Hitting the cap means
//! the stored data violates an invariant the guard should have prevented,
//! so it fails with `InternalConsistency` (and logs) instead of looping.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error};

use crate::error::{EngineError, EngineResult};
use crate::store::TaskStore;
use crate::task::Task;

/// Maximum ancestor-chain length for any task (root = depth 0).
pub const MAX_DEPTH: usize = 15;

/// One ancestor in a root-first chain.
#[derive(Debug, Clone, Serialize)]
pub struct AncestorNode {
    pub task: Task,
    /// Names from this ancestor down to the immediate parent of the task
    /// the chain was requested for, joined with " > ".
    pub path: String,
    /// Always true: an ancestor has at least the queried branch below it.
    pub has_children: bool,
}

/// One descendant produced by subtree expansion.
#[derive(Debug, Clone, Serialize)]
pub struct DescendantNode {
    pub task: Task,
    /// Distance from the expansion root; immediate children are depth 1.
    pub depth: usize,
    /// True when another returned descendant has this node as parent.
    pub has_children: bool,
}

fn live_task(store: &dyn TaskStore, id: u64) -> EngineResult<Task> {
    store
        .get(id)?
        .filter(Task::is_live)
        .ok_or(EngineError::NotFound(id))
}

fn corrupt(task_id: u64, what: &str) -> EngineError {
    error!(task = task_id, "{what} exceeded the depth cap; stored hierarchy is corrupt");
    EngineError::InternalConsistency(format!(
        "{what} from task {task_id} exceeded {} steps",
        MAX_DEPTH + 1
    ))
}

/// Re-parent `task_id` under `new_parent_id` after running the full check
/// sequence: existence, ownership, self-parent, cycle, depth. On success
/// the parent pointer and modification timestamp are the only fields
/// touched; cascading recomputation is the caller's concern.
pub fn set_parent(
    store: &dyn TaskStore,
    task_id: u64,
    new_parent_id: u64,
    acting_owner: u64,
) -> EngineResult<Task> {
    let mut task = live_task(store, task_id)?;
    let parent = live_task(store, new_parent_id)?;

    if task.owner != acting_owner {
        return Err(EngineError::Unauthorized(task_id));
    }
    if parent.owner != acting_owner {
        return Err(EngineError::Unauthorized(new_parent_id));
    }
    if task_id == new_parent_id {
        return Err(EngineError::Validation(
            "self-parent: a task cannot be its own parent".into(),
        ));
    }

    // Cycle check: walk upward from the new parent toward the root. If the
    // task being moved appears on that chain, the new parent is one of its
    // descendants and the link would close a loop.
    let mut cursor = parent.parent;
    let mut hops = 0usize;
    while let Some(ancestor_id) = cursor {
        if ancestor_id == task_id {
            return Err(EngineError::Validation(format!(
                "circular reference: task {new_parent_id} is a descendant of task {task_id}"
            )));
        }
        cursor = store.get(ancestor_id)?.and_then(|t| t.parent);
        hops += 1;
        if hops > MAX_DEPTH {
            return Err(corrupt(new_parent_id, "cycle check walk"));
        }
    }

    let parent_depth = depth_of(store, new_parent_id)?;
    if parent_depth + 1 > MAX_DEPTH {
        return Err(EngineError::Validation(format!(
            "max depth exceeded: parent {new_parent_id} is at depth {parent_depth}, limit is {MAX_DEPTH}"
        )));
    }

    task.parent = Some(new_parent_id);
    task.updated_at_utc = Utc::now().timestamp();
    if !store.update(&task)? {
        return Err(EngineError::NotFound(task_id));
    }
    debug!(task = task_id, parent = new_parent_id, "re-parented task");
    Ok(task)
}

/// Clear the parent pointer, promoting the task to a root.
pub fn clear_parent(
    store: &dyn TaskStore,
    task_id: u64,
    acting_owner: u64,
) -> EngineResult<Task> {
    let mut task = live_task(store, task_id)?;
    if task.owner != acting_owner {
        return Err(EngineError::Unauthorized(task_id));
    }
    task.parent = None;
    task.updated_at_utc = Utc::now().timestamp();
    if !store.update(&task)? {
        return Err(EngineError::NotFound(task_id));
    }
    debug!(task = task_id, "promoted task to root");
    Ok(task)
}

/// Ancestor-chain length of a task (root = 0). A missing or soft-deleted
/// ancestor ends the chain: orphaned subtrees count depth from their own
/// topmost live node.
pub fn depth_of(store: &dyn TaskStore, task_id: u64) -> EngineResult<usize> {
    let task = live_task(store, task_id)?;
    let mut depth = 0usize;
    let mut cursor = task.parent;
    while let Some(pid) = cursor {
        let Some(parent) = store.get(pid)? else { break };
        if !parent.is_live() {
            break;
        }
        depth += 1;
        cursor = parent.parent;
        if depth > MAX_DEPTH {
            return Err(corrupt(task_id, "depth walk"));
        }
    }
    Ok(depth)
}

/// Live tasks whose parent pointer references `task_id`, sorted by id.
/// The caller applies any further ordering.
pub fn children(store: &dyn TaskStore, task_id: u64) -> EngineResult<Vec<Task>> {
    let task = live_task(store, task_id)?;
    let mut kids: Vec<Task> = store
        .get_by_owner(task.owner, None)?
        .into_iter()
        .filter(|t| t.parent == Some(task_id))
        .collect();
    kids.sort_by_key(|t| t.id);
    Ok(kids)
}

/// Walk the parent pointers upward and return the chain ordered
/// root-first, nearest-ancestor-last. Each element carries the " > "
/// joined name path from that ancestor down to the immediate parent.
pub fn ancestors(store: &dyn TaskStore, task_id: u64) -> EngineResult<Vec<AncestorNode>> {
    let task = live_task(store, task_id)?;
    let mut chain: Vec<Task> = Vec::new();
    let mut cursor = task.parent;
    while let Some(pid) = cursor {
        let Some(parent) = store.get(pid)? else { break };
        if !parent.is_live() {
            break;
        }
        cursor = parent.parent;
        chain.push(parent);
        if chain.len() > MAX_DEPTH {
            return Err(corrupt(task_id, "ancestor walk"));
        }
    }
    chain.reverse();
    let nodes = (0..chain.len())
        .map(|i| AncestorNode {
            path: chain[i..]
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(" > "),
            has_children: true,
            task: chain[i].clone(),
        })
        .collect();
    Ok(nodes)
}

/// Breadth-first expansion of the live subtree under `task_id`, annotating
/// each node with its depth relative to the start (children = 1).
pub fn descendants(store: &dyn TaskStore, task_id: u64) -> EngineResult<Vec<DescendantNode>> {
    let task = live_task(store, task_id)?;
    let all = store.get_by_owner(task.owner, None)?;
    let index: HashMap<u64, &Task> = all.iter().map(|t| (t.id, t)).collect();
    let mut child_map: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for t in &all {
        if let Some(p) = t.parent {
            child_map.entry(p).or_default().push(t.id);
        }
    }
    for v in child_map.values_mut() {
        v.sort_unstable();
    }

    let mut out = Vec::new();
    let mut visited: BTreeSet<u64> = BTreeSet::new();
    visited.insert(task_id);
    let mut queue: VecDeque<(u64, usize)> = VecDeque::new();
    queue.push_back((task_id, 0));
    while let Some((id, depth)) = queue.pop_front() {
        if depth > MAX_DEPTH {
            return Err(corrupt(task_id, "descendant expansion"));
        }
        if let Some(kids) = child_map.get(&id) {
            for &kid in kids {
                if !visited.insert(kid) {
                    return Err(corrupt(task_id, "descendant expansion"));
                }
                if let Some(&t) = index.get(&kid) {
                    out.push(DescendantNode {
                        task: t.clone(),
                        depth: depth + 1,
                        has_children: child_map.get(&kid).map_or(false, |v| !v.is_empty()),
                    });
                    queue.push_back((kid, depth + 1));
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{Kind, Priority, Status};
    use crate::store::MemoryStore;
    use crate::task::NewTask;

    fn new_task(name: &str, owner: u64, parent: Option<u64>) -> NewTask {
        NewTask {
            name: name.into(),
            description: None,
            status: Status::ToDo,
            priority: Priority::Medium,
            kind: Kind::Task,
            progress: 0,
            due: None,
            parent,
            owner,
        }
    }

    fn seed(store: &MemoryStore, name: &str, parent: Option<u64>) -> u64 {
        store.create(new_task(name, 1, parent)).unwrap().id
    }

    #[test]
    fn self_parent_is_rejected() {
        let store = MemoryStore::new();
        let a = seed(&store, "a", None);
        let err = set_parent(&store, a, a, 1).unwrap_err();
        assert!(matches!(err, EngineError::Validation(ref m) if m.contains("self-parent")));
    }

    #[test]
    fn reparenting_under_a_descendant_is_rejected() {
        let store = MemoryStore::new();
        let a = seed(&store, "A", None);
        let b = seed(&store, "B", Some(a));
        let c = seed(&store, "C", Some(b));
        let err = set_parent(&store, a, c, 1).unwrap_err();
        assert!(matches!(err, EngineError::Validation(ref m) if m.contains("circular reference")));
        // The tree is unchanged.
        assert_eq!(store.get(a).unwrap().unwrap().parent, None);
        let chain = ancestors(&store, c).unwrap();
        let ids: Vec<u64> = chain.iter().map(|n| n.task.id).collect();
        assert_eq!(ids, vec![a, b]);
        let subtree = descendants(&store, a).unwrap();
        let got: Vec<(u64, usize)> = subtree.iter().map(|n| (n.task.id, n.depth)).collect();
        assert_eq!(got, vec![(b, 1), (c, 2)]);
    }

    #[test]
    fn reparenting_across_owners_is_unauthorized() {
        let store = MemoryStore::new();
        let mine = seed(&store, "mine", None);
        let theirs = store.create(new_task("theirs", 2, None)).unwrap().id;
        assert!(matches!(
            set_parent(&store, mine, theirs, 1),
            Err(EngineError::Unauthorized(_))
        ));
        assert!(matches!(
            set_parent(&store, theirs, mine, 1),
            Err(EngineError::Unauthorized(_))
        ));
    }

    #[test]
    fn missing_or_deleted_endpoints_are_not_found() {
        let store = MemoryStore::new();
        let a = seed(&store, "a", None);
        assert!(matches!(
            set_parent(&store, a, 999, 1),
            Err(EngineError::NotFound(999))
        ));
        let b = seed(&store, "b", None);
        store.soft_delete(b).unwrap();
        assert!(matches!(
            set_parent(&store, a, b, 1),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn depth_limit_is_enforced_and_reports_parent_depth() {
        let store = MemoryStore::new();
        let mut prev = seed(&store, "d0", None);
        // Build a chain whose deepest node sits at depth MAX_DEPTH.
        for d in 1..=MAX_DEPTH {
            prev = seed(&store, &format!("d{d}"), Some(prev));
        }
        assert_eq!(depth_of(&store, prev).unwrap(), MAX_DEPTH);
        let extra = seed(&store, "extra", None);
        let err = set_parent(&store, extra, prev, 1).unwrap_err();
        match err {
            EngineError::Validation(m) => {
                assert!(m.contains("max depth exceeded"));
                assert!(m.contains(&format!("depth {MAX_DEPTH}")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        // The failed attempt left the task unchanged.
        assert_eq!(store.get(extra).unwrap().unwrap().parent, None);
    }

    #[test]
    fn attaching_at_the_limit_minus_one_succeeds() {
        let store = MemoryStore::new();
        let mut prev = seed(&store, "d0", None);
        for d in 1..MAX_DEPTH {
            prev = seed(&store, &format!("d{d}"), Some(prev));
        }
        let leaf = seed(&store, "leaf", None);
        set_parent(&store, leaf, prev, 1).unwrap();
        assert_eq!(depth_of(&store, leaf).unwrap(), MAX_DEPTH);
    }

    #[test]
    fn ancestors_are_root_first_with_paths() {
        let store = MemoryStore::new();
        let root = seed(&store, "root", None);
        let a = seed(&store, "A", Some(root));
        let b = seed(&store, "B", Some(a));
        let c = seed(&store, "C", Some(b));
        let chain = ancestors(&store, c).unwrap();
        let names: Vec<&str> = chain.iter().map(|n| n.task.name.as_str()).collect();
        assert_eq!(names, vec!["root", "A", "B"]);
        let paths: Vec<&str> = chain.iter().map(|n| n.path.as_str()).collect();
        assert_eq!(paths, vec!["root > A > B", "A > B", "B"]);
        assert!(chain.iter().all(|n| n.has_children));
    }

    #[test]
    fn root_task_has_no_ancestors() {
        let store = MemoryStore::new();
        let root = seed(&store, "root", None);
        assert!(ancestors(&store, root).unwrap().is_empty());
        assert_eq!(depth_of(&store, root).unwrap(), 0);
    }

    #[test]
    fn descendants_report_depth_and_has_children() {
        let store = MemoryStore::new();
        let root = seed(&store, "root", None);
        let a = seed(&store, "A", Some(root));
        let b = seed(&store, "B", Some(a));
        let nodes = descendants(&store, root).unwrap();
        let got: Vec<(u64, usize, bool)> = nodes
            .iter()
            .map(|n| (n.task.id, n.depth, n.has_children))
            .collect();
        assert_eq!(got, vec![(a, 1, true), (b, 2, false)]);
    }

    #[test]
    fn soft_deleted_tasks_are_excluded_from_traversal() {
        let store = MemoryStore::new();
        let root = seed(&store, "root", None);
        let a = seed(&store, "A", Some(root));
        let _b = seed(&store, "B", Some(a));
        store.soft_delete(a).unwrap();
        // A is gone; B's pointer still names A but A is no longer live,
        // so the subtree under root appears empty.
        assert!(descendants(&store, root).unwrap().is_empty());
        assert!(children(&store, root).unwrap().is_empty());
    }

    #[test]
    fn clear_parent_promotes_to_root() {
        let store = MemoryStore::new();
        let root = seed(&store, "root", None);
        let a = seed(&store, "A", Some(root));
        let promoted = clear_parent(&store, a, 1).unwrap();
        assert_eq!(promoted.parent, None);
        assert_eq!(depth_of(&store, a).unwrap(), 0);
    }

    #[test]
    fn corrupted_cycle_fails_with_internal_consistency() {
        let store = MemoryStore::new();
        let a = seed(&store, "a", None);
        let b = seed(&store, "b", Some(a));
        // Close a loop behind the guard's back via a raw update.
        let mut raw = store.get(a).unwrap().unwrap();
        raw.parent = Some(b);
        store.update(&raw).unwrap();
        assert!(matches!(
            depth_of(&store, a),
            Err(EngineError::InternalConsistency(_))
        ));
        assert!(matches!(
            ancestors(&store, a),
            Err(EngineError::InternalConsistency(_))
        ));
        assert!(matches!(
            descendants(&store, a),
            Err(EngineError::InternalConsistency(_))
        ));
    }
}

#[cfg(test)]
mod properties {
    //! Property-based checks over random trees and random re-parent
    //! attempts: no accepted sequence of guard calls may ever introduce a
    //! cycle or exceed the depth bound.

    use super::*;
    use crate::fields::{Kind, Priority, Status};
    use crate::store::MemoryStore;
    use crate::task::NewTask;
    use proptest::prelude::*;

    fn seed_forest(store: &MemoryStore, n: u64) -> Vec<u64> {
        let mut ids = Vec::new();
        for i in 0..n {
            let t = store
                .create(NewTask {
                    name: format!("node {i}"),
                    description: None,
                    status: Status::ToDo,
                    priority: Priority::Medium,
                    kind: Kind::Task,
                    progress: 0,
                    due: None,
                    parent: None,
                    owner: 1,
                })
                .unwrap();
            ids.push(t.id);
        }
        ids
    }

    fn assert_forest_invariants(store: &MemoryStore, ids: &[u64]) {
        for &id in ids {
            // depth_of both terminates and enforces the bound; an
            // InternalConsistency here means a cycle slipped past the guard.
            let depth = depth_of(store, id).expect("no cycle reachable");
            assert!(depth <= MAX_DEPTH);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn random_reparenting_never_creates_a_cycle(
            moves in prop::collection::vec((0usize..20, 0usize..20), 1..60)
        ) {
            let store = MemoryStore::new();
            let ids = seed_forest(&store, 20);
            for (child, parent) in moves {
                let result = set_parent(&store, ids[child], ids[parent], 1);
                match result {
                    Ok(_) => {}
                    Err(EngineError::Validation(_)) => {}
                    Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
                }
                assert_forest_invariants(&store, &ids);
            }
        }

        #[test]
        fn self_parent_always_fails(idx in 0usize..10) {
            let store = MemoryStore::new();
            let ids = seed_forest(&store, 10);
            let err = set_parent(&store, ids[idx], ids[idx], 1).unwrap_err();
            prop_assert!(matches!(err, EngineError::Validation(_)));
        }

        #[test]
        fn failed_depth_moves_leave_the_tree_unchanged(
            extra_moves in prop::collection::vec(0usize..16, 1..8)
        ) {
            let store = MemoryStore::new();
            let ids = seed_forest(&store, 17);
            // Chain the first 16 nodes: node 16 ends at depth MAX_DEPTH.
            for i in 1..16 {
                set_parent(&store, ids[i], ids[i - 1], 1).unwrap();
            }
            let before: Vec<Option<u64>> = ids
                .iter()
                .map(|&id| store.get(id).unwrap().unwrap().parent)
                .collect();
            for m in extra_moves {
                // Hanging the spare node under the chain tail must fail,
                // and must not move anything.
                if depth_of(&store, ids[m]).unwrap() == MAX_DEPTH {
                    let err = set_parent(&store, ids[16], ids[m], 1).unwrap_err();
                    prop_assert!(matches!(err, EngineError::Validation(_)));
                    let after: Vec<Option<u64>> = ids
                        .iter()
                        .map(|&id| store.get(id).unwrap().unwrap().parent)
                        .collect();
                    prop_assert_eq!(&before, &after);
                }
            }
        }
    }
}
