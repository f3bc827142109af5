//! Command implementations for the CLI interface.
//!
//! Each handler maps its arguments onto one engine operation, prints the
//! outcome, and returns any engine failure to `main` for reporting. No
//! hierarchy or query logic lives here.

use std::collections::HashMap;

use chrono::{Local, NaiveDate, TimeZone, Utc};
use clap::{CommandFactory, Subcommand};
use clap_complete::{generate, Shell};

use crate::cli::Cli;
use crate::dates::{format_due_relative, parse_due_input};
use crate::error::{EngineError, EngineResult};
use crate::fields::*;
use crate::hierarchy;
use crate::query::{run_query, QuerySpec};
use crate::rollup::{rollup, timeline_spans};
use crate::store::TaskStore;
use crate::task::{NewTask, NewTimeEntry, Task};

#[derive(Subcommand)]
pub enum Commands {
    /// Add a new task.
    Add {
        /// Task name (max 200 characters).
        name: String,
        /// Optional longer description.
        #[arg(long)]
        desc: Option<String>,
        /// Due date: YYYY-MM-DD, "today", "tomorrow", or "in Nd".
        #[arg(long)]
        due: Option<String>,
        /// Parent task ID or name.
        #[arg(long)]
        parent: Option<String>,
        /// Item kind: project | milestone | task.
        #[arg(long, value_enum, default_value_t = Kind::Task)]
        kind: Kind,
        /// Priority: low | medium | high | critical.
        #[arg(long, value_enum, default_value_t = Priority::Medium)]
        priority: Priority,
        /// Status: to-do | in-progress | blocked | waiting | done.
        #[arg(long, value_enum, default_value_t = Status::ToDo)]
        status: Status,
        /// Completion percentage (0-100).
        #[arg(long, default_value_t = 0)]
        progress: u8,
    },

    /// List tasks with filters, sorting and pagination.
    List {
        /// Filter by status. May be repeated.
        #[arg(long = "status", value_enum)]
        statuses: Vec<Status>,
        /// Filter by priority. May be repeated.
        #[arg(long = "priority", value_enum)]
        priorities: Vec<Priority>,
        /// Filter by kind. May be repeated.
        #[arg(long = "kind", value_enum)]
        kinds: Vec<Kind>,
        /// Filter by assignee user ID. May be repeated.
        #[arg(long = "assignee")]
        assignees: Vec<u64>,
        /// Due on or after this date.
        #[arg(long)]
        due_from: Option<String>,
        /// Due on or before this date.
        #[arg(long)]
        due_to: Option<String>,
        /// Case-insensitive search over name and description.
        #[arg(long)]
        search: Option<String>,
        /// Sort key: name | priority | status | due | created.
        #[arg(long, default_value = "created")]
        sort: String,
        /// Sort descending instead of ascending.
        #[arg(long)]
        desc: bool,
        /// Page number (1-based).
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Items per page.
        #[arg(long, default_value_t = 25)]
        page_size: u32,
    },

    /// View a single task by ID or name.
    View {
        /// Task ID or name to view.
        id: String,
        /// Show child subtree with depths.
        #[arg(long)]
        children: bool,
        /// Show ancestor chain with paths.
        #[arg(long)]
        parents: bool,
    },

    /// Update fields on a task.
    Update {
        /// Task ID or name to update.
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long, value_enum)]
        status: Option<Status>,
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        #[arg(long, value_enum)]
        kind: Option<Kind>,
        #[arg(long)]
        progress: Option<u8>,
        #[arg(long)]
        due: Option<String>,
        /// Clear due date.
        #[arg(long)]
        clear_due: bool,
    },

    /// Re-parent a task under another task.
    Move {
        /// Task ID or name to move.
        id: String,
        /// New parent task ID or name.
        parent: String,
    },

    /// Clear a task's parent, promoting it to a root.
    Promote {
        /// Task ID or name to promote.
        id: String,
    },

    /// Mark a task done.
    Complete {
        /// Task ID or name to complete.
        id: String,
    },

    /// Soft-delete a task. Children are kept and keep their parent link.
    Delete {
        /// Task ID or name to delete.
        id: String,
    },

    /// Log time against a task.
    Log {
        /// Task ID or name.
        id: String,
        /// Minutes to log (1-1440).
        minutes: u32,
        /// Entry date (defaults to today).
        #[arg(long)]
        date: Option<String>,
        /// Record as a timer entry instead of manual.
        #[arg(long)]
        timer: bool,
    },

    /// Assign a user to a task.
    Assign {
        /// Task ID or name.
        id: String,
        /// User ID to assign.
        user: u64,
    },

    /// Show logged-minute rollups for tasks and their subtrees.
    Rollup {
        /// Task IDs or names. May be repeated.
        ids: Vec<String>,
    },

    /// Show task spans inside a date window.
    Timeline {
        /// Window start (date or natural language).
        #[arg(long)]
        from: String,
        /// Window end (date or natural language).
        #[arg(long)]
        to: String,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Resolve a task identifier (either ID or name) to a task ID within the
/// acting owner's tasks. Ambiguous names ask for the ID instead.
pub fn resolve_task_identifier(
    store: &dyn TaskStore,
    owner: u64,
    identifier: &str,
) -> EngineResult<u64> {
    if let Ok(id) = identifier.parse::<u64>() {
        return match store.get(id)? {
            Some(t) if t.is_live() => Ok(id),
            _ => Err(EngineError::NotFound(id)),
        };
    }
    let matches: Vec<Task> = store
        .get_by_owner(owner, None)?
        .into_iter()
        .filter(|t| t.name.eq_ignore_ascii_case(identifier))
        .collect();
    match matches.len() {
        0 => Err(EngineError::Validation(format!(
            "no task found with name '{identifier}'"
        ))),
        1 => Ok(matches[0].id),
        _ => {
            let ids: Vec<String> = matches.iter().map(|t| t.id.to_string()).collect();
            Err(EngineError::Validation(format!(
                "multiple tasks named '{identifier}' (ids {}); use the ID instead",
                ids.join(", ")
            )))
        }
    }
}

fn parse_due(input: &str) -> EngineResult<NaiveDate> {
    parse_due_input(input).ok_or_else(|| {
        EngineError::Validation(format!(
            "unrecognised date '{input}'; use YYYY-MM-DD, 'today', 'tomorrow' or 'in Nd'"
        ))
    })
}

/// Print tasks in a formatted table.
fn print_table(tasks: &[Task]) {
    println!(
        "{:<5} {:<10} {:<11} {:<9} {:<10} {:<5} Name",
        "ID", "Kind", "Status", "Pri", "Due", "Prog"
    );
    let today = Local::now().date_naive();
    for t in tasks {
        println!(
            "{:<5} {:<10} {:<11} {:<9} {:<10} {:<5} {}",
            t.id,
            format_kind(t.kind),
            format_status(t.status),
            format_priority(t.priority),
            format_due_relative(t.due, today),
            format!("{}%", t.progress),
            t.name
        );
    }
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_add(
    store: &dyn TaskStore,
    owner: u64,
    name: String,
    desc: Option<String>,
    due: Option<String>,
    parent: Option<String>,
    kind: Kind,
    priority: Priority,
    status: Status,
    progress: u8,
) -> EngineResult<()> {
    let due = due.as_deref().map(parse_due).transpose()?;
    let task = store.create(NewTask {
        name,
        description: desc,
        status,
        priority,
        kind,
        progress,
        due,
        parent: None,
        owner,
    })?;
    // Linking after creation routes the parent through the guard's checks.
    if let Some(parent_str) = parent {
        let pid = resolve_task_identifier(store, owner, &parent_str)?;
        if let Err(e) = hierarchy::set_parent(store, task.id, pid, owner) {
            store.soft_delete(task.id)?;
            return Err(e);
        }
    }
    println!("Added task {}", task.id);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_list(
    store: &dyn TaskStore,
    owner: u64,
    statuses: Vec<Status>,
    priorities: Vec<Priority>,
    kinds: Vec<Kind>,
    assignees: Vec<u64>,
    due_from: Option<String>,
    due_to: Option<String>,
    search: Option<String>,
    sort: String,
    desc: bool,
    page: u32,
    page_size: u32,
) -> EngineResult<()> {
    let spec = QuerySpec {
        statuses,
        priorities,
        kinds,
        assignees,
        due_from: due_from.as_deref().map(parse_due).transpose()?,
        due_to: due_to.as_deref().map(parse_due).transpose()?,
        search,
        sort_key: sort,
        descending: desc,
        page,
        page_size,
    };
    let result = run_query(store, owner, &spec)?;
    print_table(&result.items);
    println!(
        "page {}/{} ({} total){}{}",
        result.page,
        result.total_pages,
        result.total_count,
        if result.has_previous { " <prev" } else { "" },
        if result.has_next { " next>" } else { "" },
    );
    Ok(())
}

pub fn cmd_view(
    store: &dyn TaskStore,
    owner: u64,
    id: String,
    children: bool,
    parents: bool,
) -> EngineResult<()> {
    let task_id = resolve_task_identifier(store, owner, &id)?;
    let task = store
        .get(task_id)?
        .filter(Task::is_live)
        .ok_or(EngineError::NotFound(task_id))?;
    let today = Local::now().date_naive();
    println!("ID:           {}", task.id);
    println!("Name:         {}", task.name);
    println!("Kind:         {}", format_kind(task.kind));
    println!("Status:       {}", format_status(task.status));
    println!("Priority:     {}", format_priority(task.priority));
    println!("Progress:     {}%", task.progress);
    println!(
        "Due:          {}",
        match task.due {
            Some(d) => format!("{d} ({})", format_due_relative(Some(d), today)),
            None => "-".into(),
        }
    );
    println!(
        "Parent:       {}",
        task.parent.map(|p| p.to_string()).unwrap_or_else(|| "-".into())
    );
    println!("Owner:        {}", task.owner);
    println!(
        "Created UTC:  {}",
        Utc.timestamp_opt(task.created_at_utc, 0)
            .single()
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "-".into())
    );
    println!(
        "Updated UTC:  {}",
        Utc.timestamp_opt(task.updated_at_utc, 0)
            .single()
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "-".into())
    );
    println!(
        "Description:\n{}\n",
        task.description.unwrap_or_else(|| "-".into())
    );

    if parents {
        let chain = hierarchy::ancestors(store, task_id)?;
        if chain.is_empty() {
            println!("Ancestors: -");
        } else {
            println!("Ancestors (root first):");
            for node in chain {
                println!("  #{} {}", node.task.id, node.path);
            }
        }
    }

    if children {
        let subtree = hierarchy::descendants(store, task_id)?;
        println!("Children:");
        if subtree.is_empty() {
            println!("  -");
        }
        for node in subtree {
            println!(
                "{}- {} [{}] (#{})",
                "  ".repeat(node.depth),
                node.task.name,
                format_status(node.task.status),
                node.task.id
            );
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_update(
    store: &dyn TaskStore,
    owner: u64,
    id: String,
    name: Option<String>,
    desc: Option<String>,
    status: Option<Status>,
    priority: Option<Priority>,
    kind: Option<Kind>,
    progress: Option<u8>,
    due: Option<String>,
    clear_due: bool,
) -> EngineResult<()> {
    let task_id = resolve_task_identifier(store, owner, &id)?;
    let mut task = store
        .get(task_id)?
        .filter(Task::is_live)
        .ok_or(EngineError::NotFound(task_id))?;
    if task.owner != owner {
        return Err(EngineError::Unauthorized(task_id));
    }
    if let Some(n) = name {
        task.name = n;
    }
    if let Some(d) = desc {
        task.description = if d.is_empty() { None } else { Some(d) };
    }
    if let Some(s) = status {
        task.status = s;
    }
    if let Some(p) = priority {
        task.priority = p;
    }
    if let Some(k) = kind {
        task.kind = k;
    }
    if let Some(p) = progress {
        task.progress = p;
    }
    if clear_due {
        task.due = None;
    }
    if let Some(ds) = due {
        task.due = Some(parse_due(&ds)?);
    }
    task.updated_at_utc = Utc::now().timestamp();
    if !store.update(&task)? {
        return Err(EngineError::NotFound(task_id));
    }
    println!("Updated task {task_id}");
    Ok(())
}

pub fn cmd_move(store: &dyn TaskStore, owner: u64, id: String, parent: String) -> EngineResult<()> {
    let task_id = resolve_task_identifier(store, owner, &id)?;
    let parent_id = resolve_task_identifier(store, owner, &parent)?;
    hierarchy::set_parent(store, task_id, parent_id, owner)?;
    println!("Moved task {task_id} under {parent_id}");
    Ok(())
}

pub fn cmd_promote(store: &dyn TaskStore, owner: u64, id: String) -> EngineResult<()> {
    let task_id = resolve_task_identifier(store, owner, &id)?;
    hierarchy::clear_parent(store, task_id, owner)?;
    println!("Promoted task {task_id} to root");
    Ok(())
}

pub fn cmd_complete(store: &dyn TaskStore, owner: u64, id: String) -> EngineResult<()> {
    let task_id = resolve_task_identifier(store, owner, &id)?;
    let mut task = store
        .get(task_id)?
        .filter(Task::is_live)
        .ok_or(EngineError::NotFound(task_id))?;
    if task.owner != owner {
        return Err(EngineError::Unauthorized(task_id));
    }
    task.status = Status::Done;
    task.progress = 100;
    task.updated_at_utc = Utc::now().timestamp();
    store.update(&task)?;
    println!("Marked task {task_id} done");
    Ok(())
}

pub fn cmd_delete(store: &dyn TaskStore, owner: u64, id: String) -> EngineResult<()> {
    let task_id = resolve_task_identifier(store, owner, &id)?;
    let task = store
        .get(task_id)?
        .filter(Task::is_live)
        .ok_or(EngineError::NotFound(task_id))?;
    if task.owner != owner {
        return Err(EngineError::Unauthorized(task_id));
    }
    store.soft_delete(task_id)?;
    println!("Deleted task {task_id} (children keep their parent link)");
    Ok(())
}

pub fn cmd_log(
    store: &dyn TaskStore,
    owner: u64,
    id: String,
    minutes: u32,
    date: Option<String>,
    timer: bool,
) -> EngineResult<()> {
    let task_id = resolve_task_identifier(store, owner, &id)?;
    let task = store
        .get(task_id)?
        .filter(Task::is_live)
        .ok_or(EngineError::NotFound(task_id))?;
    if task.owner != owner {
        return Err(EngineError::Unauthorized(task_id));
    }
    let entry_date = match date {
        Some(d) => parse_due(&d)?,
        None => Local::now().date_naive(),
    };
    let entry = store.log_time(NewTimeEntry {
        task: task_id,
        owner,
        minutes,
        entry_date,
        entry_type: if timer { EntryType::Timer } else { EntryType::Manual },
    })?;
    println!(
        "Logged {}m against task {} ({})",
        entry.minutes,
        task_id,
        format_entry_type(entry.entry_type)
    );
    Ok(())
}

pub fn cmd_assign(store: &dyn TaskStore, owner: u64, id: String, user: u64) -> EngineResult<()> {
    let task_id = resolve_task_identifier(store, owner, &id)?;
    let task = store
        .get(task_id)?
        .filter(Task::is_live)
        .ok_or(EngineError::NotFound(task_id))?;
    if task.owner != owner {
        return Err(EngineError::Unauthorized(task_id));
    }
    store.assign(task_id, user)?;
    println!("Assigned user {user} to task {task_id}");
    Ok(())
}

pub fn cmd_rollup(store: &dyn TaskStore, owner: u64, ids: Vec<String>) -> EngineResult<()> {
    if ids.is_empty() {
        return Err(EngineError::Validation("at least one task is required".into()));
    }
    let mut task_ids = Vec::with_capacity(ids.len());
    for id in &ids {
        task_ids.push(resolve_task_identifier(store, owner, id)?);
    }
    let totals = rollup(store, &task_ids)?;
    println!("{:<5} {:>8} {:>10} {:>8}", "ID", "Direct", "Children", "Total");
    for (id, r) in &totals {
        println!(
            "{:<5} {:>7}m {:>9}m {:>7}m",
            id, r.direct, r.children_total, r.total
        );
    }
    Ok(())
}

pub fn cmd_timeline(store: &dyn TaskStore, owner: u64, from: String, to: String) -> EngineResult<()> {
    let from = parse_due(&from)?;
    let to = parse_due(&to)?;
    if from > to {
        return Err(EngineError::Validation(format!(
            "invalid date range: {from} is after {to}"
        )));
    }
    let tasks = store.get_by_owner(owner, None)?;
    let index: HashMap<u64, &Task> = tasks.iter().map(|t| (t.id, t)).collect();
    let spans = timeline_spans(&tasks, from, to);
    println!("{:<5} {:<12} {:<12} {:>6} Name", "ID", "Start", "End", "Days");
    for s in spans {
        let name = index.get(&s.task).map(|t| t.name.as_str()).unwrap_or("-");
        println!(
            "{:<5} {:<12} {:<12} {:>6} {}",
            s.task, s.start, s.end, s.duration_days, name
        );
    }
    Ok(())
}

pub fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn seed_for(store: &MemoryStore, owner: u64, name: &str) -> u64 {
        store
            .create(NewTask {
                name: name.into(),
                description: None,
                status: Status::ToDo,
                priority: Priority::Medium,
                kind: Kind::Task,
                progress: 0,
                due: None,
                parent: None,
                owner,
            })
            .unwrap()
            .id
    }

    #[test]
    fn logging_time_on_another_owners_task_is_unauthorized() {
        let store = MemoryStore::new();
        let theirs = seed_for(&store, 2, "theirs");
        let err = cmd_log(&store, 1, theirs.to_string(), 30, None, false).unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(id) if id == theirs));
        assert_eq!(
            store.time_entry_totals(&[theirs]).unwrap().get(&theirs),
            None
        );
    }

    #[test]
    fn assigning_on_another_owners_task_is_unauthorized() {
        let store = MemoryStore::new();
        let theirs = seed_for(&store, 2, "theirs");
        let err = cmd_assign(&store, 1, theirs.to_string(), 7).unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(id) if id == theirs));
        assert!(store.assignees_of(theirs).unwrap().is_empty());
    }

    #[test]
    fn logging_time_on_own_task_succeeds() {
        let store = MemoryStore::new();
        let mine = seed_for(&store, 1, "mine");
        cmd_log(&store, 1, mine.to_string(), 45, None, false).unwrap();
        assert_eq!(
            store.time_entry_totals(&[mine]).unwrap().get(&mine),
            Some(&45)
        );
    }
}
