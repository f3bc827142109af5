//! Query, filter, sort and pagination engine.
//!
//! Translates a [`QuerySpec`] into a deterministic, stable-ordered result
//! set with total-count metadata. Filters are AND-combined; within a single
//! filter, multiple selected values are OR-combined. Ownership is a hard
//! constraint applied before any caller-supplied filter. The pure
//! evaluation functions ([`matches_fields`], [`sort_tasks`], [`page_items`])
//! define the semantics a store must honour when pushing the query down.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{EngineError, EngineResult};
use crate::fields::{priority_rank, status_rank, Kind, Priority, Status};
use crate::store::TaskStore;
use crate::task::Task;

/// The filter/sort/page parameters of a single query request. Not
/// persisted; built fresh per request by the caller.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// Empty set = no status constraint.
    pub statuses: Vec<Status>,
    /// Empty set = no priority constraint.
    pub priorities: Vec<Priority>,
    /// Empty set = no kind constraint.
    pub kinds: Vec<Kind>,
    /// Empty set = no assignee constraint. A task matches when it has at
    /// least one active assignment to one of these users.
    pub assignees: Vec<u64>,
    /// Inclusive due-date window. Tasks without a due date are excluded
    /// while either bound is set.
    pub due_from: Option<NaiveDate>,
    pub due_to: Option<NaiveDate>,
    /// Case-insensitive substring match against name and description.
    /// Whitespace-only terms are ignored.
    pub search: Option<String>,
    /// Whitelisted sort key; unknown keys are rejected, never ignored.
    pub sort_key: String,
    pub descending: bool,
    /// 1-based page number.
    pub page: u32,
    /// Items per page, at least 1.
    pub page_size: u32,
}

impl Default for QuerySpec {
    fn default() -> Self {
        QuerySpec {
            statuses: Vec::new(),
            priorities: Vec::new(),
            kinds: Vec::new(),
            assignees: Vec::new(),
            due_from: None,
            due_to: None,
            search: None,
            sort_key: "created".into(),
            descending: false,
            page: 1,
            page_size: 25,
        }
    }
}

/// One page of matching tasks plus pagination metadata.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub items: Vec<Task>,
    pub total_count: usize,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub has_previous: bool,
    pub has_next: bool,
}

/// Whitelisted sorting options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Priority,
    Status,
    Due,
    Created,
}

impl SortKey {
    /// Parse a caller-supplied sort key. Unknown keys fail with a
    /// validation error so that pagination stays stable.
    pub fn from_key(s: &str) -> EngineResult<SortKey> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "priority" => Ok(SortKey::Priority),
            "status" => Ok(SortKey::Status),
            "due" => Ok(SortKey::Due),
            "created" => Ok(SortKey::Created),
            other => Err(EngineError::Validation(format!(
                "unknown sort key '{other}' (expected name, priority, status, due or created)"
            ))),
        }
    }
}

/// Validate a spec up front: sort key, page bounds and date range. Returns
/// the parsed sort key so callers do not parse twice.
pub fn validate_spec(spec: &QuerySpec) -> EngineResult<SortKey> {
    if spec.page < 1 {
        return Err(EngineError::Validation("page must be at least 1".into()));
    }
    if spec.page_size < 1 {
        return Err(EngineError::Validation("page size must be at least 1".into()));
    }
    if let (Some(from), Some(to)) = (spec.due_from, spec.due_to) {
        if from > to {
            return Err(EngineError::Validation(format!(
                "invalid date range: {from} is after {to}"
            )));
        }
    }
    SortKey::from_key(&spec.sort_key)
}

/// Evaluate every filter except the assignee filter against one task.
/// Assignments live outside the task record, so stores resolve that filter
/// themselves (see [`TaskStore::query_with_filters`]).
pub fn matches_fields(t: &Task, spec: &QuerySpec) -> bool {
    if !spec.statuses.is_empty() && !spec.statuses.contains(&t.status) {
        return false;
    }
    if !spec.priorities.is_empty() && !spec.priorities.contains(&t.priority) {
        return false;
    }
    if !spec.kinds.is_empty() && !spec.kinds.contains(&t.kind) {
        return false;
    }
    if spec.due_from.is_some() || spec.due_to.is_some() {
        let Some(due) = t.due else {
            return false;
        };
        if let Some(from) = spec.due_from {
            if due < from {
                return false;
            }
        }
        if let Some(to) = spec.due_to {
            if due > to {
                return false;
            }
        }
    }
    if let Some(ref term) = spec.search {
        let term = term.trim().to_lowercase();
        if !term.is_empty() {
            let in_name = t.name.to_lowercase().contains(&term);
            let in_desc = t
                .description
                .as_deref()
                .map(|d| d.to_lowercase().contains(&term))
                .unwrap_or(false);
            if !in_name && !in_desc {
                return false;
            }
        }
    }
    true
}

/// Compare two tasks under a sort key. Ties always fall back to the task
/// identifier (ascending) so that page boundaries are deterministic across
/// repeated calls with unchanged data.
pub fn compare(a: &Task, b: &Task, key: SortKey, descending: bool) -> Ordering {
    let ord = match key {
        SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortKey::Priority => priority_rank(a.priority).cmp(&priority_rank(b.priority)),
        SortKey::Status => status_rank(a.status).cmp(&status_rank(b.status)),
        // Tasks without a due date sort after all dated ones.
        SortKey::Due => a
            .due
            .unwrap_or(NaiveDate::MAX)
            .cmp(&b.due.unwrap_or(NaiveDate::MAX)),
        SortKey::Created => a.created_at_utc.cmp(&b.created_at_utc),
    };
    let ord = if descending { ord.reverse() } else { ord };
    ord.then(a.id.cmp(&b.id))
}

/// Stable-sort tasks in place under the given key and direction.
pub fn sort_tasks(tasks: &mut [Task], key: SortKey, descending: bool) {
    tasks.sort_by(|a, b| compare(a, b, key, descending));
}

/// Cut one 1-based page out of the full sorted match list.
pub fn page_items(tasks: Vec<Task>, page: u32, page_size: u32) -> Vec<Task> {
    let start = (page as usize - 1) * page_size as usize;
    tasks
        .into_iter()
        .skip(start)
        .take(page_size as usize)
        .collect()
}

/// Number of pages needed for `total` items at `page_size` per page.
pub fn total_pages(total: usize, page_size: u32) -> u32 {
    ((total as u64).div_ceil(page_size as u64)) as u32
}

/// Run a validated query against the store and assemble the result with
/// pagination metadata. Only tasks owned by `owner` are eligible.
pub fn run_query(
    store: &dyn TaskStore,
    owner: u64,
    spec: &QuerySpec,
) -> EngineResult<QueryResult> {
    validate_spec(spec)?;
    let (items, total_count) = store.query_with_filters(owner, spec)?;
    let total_pages = total_pages(total_count, spec.page_size);
    Ok(QueryResult {
        items,
        total_count,
        page: spec.page,
        page_size: spec.page_size,
        total_pages,
        has_previous: spec.page > 1,
        has_next: spec.page < total_pages,
    })
}
