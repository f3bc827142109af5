//! Task, time entry and assignment data structures.
//!
//! This module defines the core `Task` struct that represents a single work
//! item with its hierarchy pointer and metadata, the `TimeEntry` records that
//! feed the rollup aggregator, and the `TaskAssignment` links used by the
//! assignee filter.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::fields::*;

/// Maximum length of a task name.
pub const MAX_NAME_LEN: usize = 200;

/// A work item in the hierarchy. May represent a project, milestone, or
/// leaf task; `parent` is the only structural relationship the engine
/// manages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub status: Status,
    pub priority: Priority,
    pub kind: Kind,
    /// Completion percentage, 0-100.
    pub progress: u8,
    pub due: Option<NaiveDate>,
    pub parent: Option<u64>,
    pub owner: u64,
    #[serde(default)]
    pub deleted: bool,
    pub created_at_utc: i64,
    pub updated_at_utc: i64,
}

impl Task {
    /// True when the task is visible to traversal and queries.
    pub fn is_live(&self) -> bool {
        !self.deleted
    }
}

/// Fields supplied by the caller when creating a task. The store assigns
/// the identifier and timestamps.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub description: Option<String>,
    pub status: Status,
    pub priority: Priority,
    pub kind: Kind,
    pub progress: u8,
    pub due: Option<NaiveDate>,
    pub parent: Option<u64>,
    pub owner: u64,
}

/// A logged duration attached to exactly one task. Read-only input to the
/// rollup aggregator; the engine never mutates entries after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: u64,
    pub task: u64,
    pub owner: u64,
    /// Logged duration in minutes, 1-1440.
    pub minutes: u32,
    pub entry_date: NaiveDate,
    pub entry_type: EntryType,
}

/// Caller-supplied fields for a new time entry.
#[derive(Debug, Clone)]
pub struct NewTimeEntry {
    pub task: u64,
    pub owner: u64,
    pub minutes: u32,
    pub entry_date: NaiveDate,
    pub entry_type: EntryType,
}

/// A many-to-many link between a task and a user. Read-only input to the
/// assignee filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub task: u64,
    pub user: u64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Validate a task name: non-empty after trimming and at most
/// [`MAX_NAME_LEN`] characters.
pub fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::Validation("task name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(EngineError::Validation(format!(
            "task name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// Validate a progress percentage (0-100).
pub fn validate_progress(progress: u8) -> Result<(), EngineError> {
    if progress > 100 {
        return Err(EngineError::Validation(format!(
            "progress must be 0-100, got {progress}"
        )));
    }
    Ok(())
}

/// Validate logged minutes (1-1440).
pub fn validate_minutes(minutes: u32) -> Result<(), EngineError> {
    if minutes == 0 || minutes > 1440 {
        return Err(EngineError::Validation(format!(
            "minutes must be 1-1440, got {minutes}"
        )));
    }
    Ok(())
}
