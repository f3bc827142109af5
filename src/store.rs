//! Task store contract and its file-backed / in-memory implementations.
//!
//! The engine only depends on the [`TaskStore`] trait; the hierarchy guard,
//! traversal, query engine and aggregator all read and write through it.
//! `JsonStore` persists to a single JSON file using an atomic
//! temp-file-then-rename save, and `MemoryStore` backs the test suite.
//! Both serialise writers behind an `RwLock`, which is what makes the
//! guard's check-then-set sequence safe within one process; a SQL-backed
//! implementation must provide the same isolation with a transaction.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::fields::Status;
use crate::query::{self, QuerySpec};
use crate::task::{
    validate_minutes, validate_name, validate_progress, NewTask, NewTimeEntry, Task,
    TaskAssignment, TimeEntry,
};

/// Abstract storage collaborator for the engine.
///
/// `get` returns soft-deleted records (the guard inspects the flag itself);
/// `get_by_owner` and `query_with_filters` exclude them.
pub trait TaskStore: Send + Sync {
    /// Point lookup by identifier, including soft-deleted records.
    fn get(&self, id: u64) -> EngineResult<Option<Task>>;

    /// All live tasks owned by `owner`, optionally narrowed to one status.
    fn get_by_owner(&self, owner: u64, status: Option<Status>) -> EngineResult<Vec<Task>>;

    /// Insert a task; the store assigns the identifier and timestamps.
    fn create(&self, new: NewTask) -> EngineResult<Task>;

    /// Replace a task record by id. Returns false when the id is unknown.
    fn update(&self, task: &Task) -> EngineResult<bool>;

    /// Mark a task deleted without removing it. Children keep their parent
    /// pointer; reconciling them is the caller's responsibility.
    fn soft_delete(&self, id: u64) -> EngineResult<bool>;

    /// Users with an active assignment on the task.
    fn assignees_of(&self, task_id: u64) -> EngineResult<Vec<u64>>;

    /// Directly-logged minutes per task. Subtree rollups are computed by
    /// the aggregator, not the store.
    fn time_entry_totals(&self, task_ids: &[u64]) -> EngineResult<BTreeMap<u64, u64>>;

    /// Record a time entry against a live task.
    fn log_time(&self, new: NewTimeEntry) -> EngineResult<TimeEntry>;

    /// Link a user to a live task, reactivating a dormant link if present.
    fn assign(&self, task_id: u64, user: u64) -> EngineResult<()>;

    /// Evaluate a query under the engine's filter/sort/page semantics.
    ///
    /// Returns the requested page plus the total match count. The default
    /// implementation scans by owner and applies the pure evaluation
    /// functions from [`crate::query`]; a store may override it with a
    /// native query as long as the semantics are identical.
    fn query_with_filters(
        &self,
        owner: u64,
        spec: &QuerySpec,
    ) -> EngineResult<(Vec<Task>, usize)> {
        let key = query::validate_spec(spec)?;
        let mut tasks = self.get_by_owner(owner, None)?;
        if !spec.assignees.is_empty() {
            let mut kept = Vec::with_capacity(tasks.len());
            for t in tasks {
                let assigned = self.assignees_of(t.id)?;
                if assigned.iter().any(|u| spec.assignees.contains(u)) {
                    kept.push(t);
                }
            }
            tasks = kept;
        }
        tasks.retain(|t| query::matches_fields(t, spec));
        query::sort_tasks(&mut tasks, key, spec.descending);
        let total = tasks.len();
        let items = query::page_items(tasks, spec.page, spec.page_size);
        Ok((items, total))
    }
}

/// Everything a store holds, in one serialisable unit.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    tasks: Vec<Task>,
    #[serde(default)]
    time_entries: Vec<TimeEntry>,
    #[serde(default)]
    assignments: Vec<TaskAssignment>,
}

impl StoreData {
    fn next_task_id(&self) -> u64 {
        self.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1
    }

    fn next_entry_id(&self) -> u64 {
        self.time_entries.iter().map(|e| e.id).max().unwrap_or(0) + 1
    }

    fn get(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn get_mut(&mut self, id: u64) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    fn by_owner(&self, owner: u64, status: Option<Status>) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|t| t.owner == owner && t.is_live())
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect()
    }

    fn create(&mut self, new: NewTask) -> EngineResult<Task> {
        validate_name(&new.name)?;
        validate_progress(new.progress)?;
        let now = Utc::now().timestamp();
        let task = Task {
            id: self.next_task_id(),
            name: new.name,
            description: new.description,
            status: new.status,
            priority: new.priority,
            kind: new.kind,
            progress: new.progress,
            due: new.due,
            parent: new.parent,
            owner: new.owner,
            deleted: false,
            created_at_utc: now,
            updated_at_utc: now,
        };
        self.tasks.push(task.clone());
        Ok(task)
    }

    fn update(&mut self, task: &Task) -> EngineResult<bool> {
        validate_name(&task.name)?;
        validate_progress(task.progress)?;
        match self.get_mut(task.id) {
            Some(slot) => {
                *slot = task.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn soft_delete(&mut self, id: u64) -> bool {
        match self.get_mut(id) {
            Some(t) if t.is_live() => {
                t.deleted = true;
                t.updated_at_utc = Utc::now().timestamp();
                true
            }
            _ => false,
        }
    }

    fn assignees_of(&self, task_id: u64) -> Vec<u64> {
        self.assignments
            .iter()
            .filter(|a| a.task == task_id && a.active)
            .map(|a| a.user)
            .collect()
    }

    fn time_entry_totals(&self, task_ids: &[u64]) -> BTreeMap<u64, u64> {
        let mut totals = BTreeMap::new();
        for e in &self.time_entries {
            if task_ids.contains(&e.task) {
                *totals.entry(e.task).or_insert(0) += e.minutes as u64;
            }
        }
        totals
    }

    fn log_time(&mut self, new: NewTimeEntry) -> EngineResult<TimeEntry> {
        validate_minutes(new.minutes)?;
        if !self.get(new.task).map(Task::is_live).unwrap_or(false) {
            return Err(EngineError::NotFound(new.task));
        }
        let entry = TimeEntry {
            id: self.next_entry_id(),
            task: new.task,
            owner: new.owner,
            minutes: new.minutes,
            entry_date: new.entry_date,
            entry_type: new.entry_type,
        };
        self.time_entries.push(entry.clone());
        Ok(entry)
    }

    fn assign(&mut self, task_id: u64, user: u64) -> EngineResult<()> {
        if !self.get(task_id).map(Task::is_live).unwrap_or(false) {
            return Err(EngineError::NotFound(task_id));
        }
        if let Some(link) = self
            .assignments
            .iter_mut()
            .find(|a| a.task == task_id && a.user == user)
        {
            link.active = true;
        } else {
            self.assignments.push(TaskAssignment {
                task: task_id,
                user,
                active: true,
            });
        }
        Ok(())
    }
}

fn poisoned() -> EngineError {
    EngineError::InternalConsistency("store lock poisoned".into())
}

/// In-memory store. Backs the test suite and any embedding caller that
/// does not need persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn read(&self) -> EngineResult<RwLockReadGuard<'_, StoreData>> {
        self.data.read().map_err(|_| poisoned())
    }

    fn write(&self) -> EngineResult<RwLockWriteGuard<'_, StoreData>> {
        self.data.write().map_err(|_| poisoned())
    }
}

impl TaskStore for MemoryStore {
    fn get(&self, id: u64) -> EngineResult<Option<Task>> {
        Ok(self.read()?.get(id).cloned())
    }

    fn get_by_owner(&self, owner: u64, status: Option<Status>) -> EngineResult<Vec<Task>> {
        Ok(self.read()?.by_owner(owner, status))
    }

    fn create(&self, new: NewTask) -> EngineResult<Task> {
        self.write()?.create(new)
    }

    fn update(&self, task: &Task) -> EngineResult<bool> {
        self.write()?.update(task)
    }

    fn soft_delete(&self, id: u64) -> EngineResult<bool> {
        Ok(self.write()?.soft_delete(id))
    }

    fn assignees_of(&self, task_id: u64) -> EngineResult<Vec<u64>> {
        Ok(self.read()?.assignees_of(task_id))
    }

    fn time_entry_totals(&self, task_ids: &[u64]) -> EngineResult<BTreeMap<u64, u64>> {
        Ok(self.read()?.time_entry_totals(task_ids))
    }

    fn log_time(&self, new: NewTimeEntry) -> EngineResult<TimeEntry> {
        self.write()?.log_time(new)
    }

    fn assign(&self, task_id: u64, user: u64) -> EngineResult<()> {
        self.write()?.assign(task_id, user)
    }
}

/// File-backed store: one JSON document holding tasks, time entries and
/// assignments, saved after every mutation.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    data: RwLock<StoreData>,
}

impl JsonStore {
    /// Open the store at `path`, starting empty if the file is missing.
    pub fn open(path: &Path) -> EngineResult<Self> {
        let data = if path.exists() {
            let mut buf = String::new();
            File::open(path)?.read_to_string(&mut buf)?;
            serde_json::from_str(&buf)
                .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?
        } else {
            StoreData::default()
        };
        Ok(JsonStore {
            path: path.to_path_buf(),
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> EngineResult<RwLockReadGuard<'_, StoreData>> {
        self.data.read().map_err(|_| poisoned())
    }

    fn write(&self) -> EngineResult<RwLockWriteGuard<'_, StoreData>> {
        self.data.write().map_err(|_| poisoned())
    }

    /// Atomic-ish write via temp + rename.
    fn save(&self, data: &StoreData) -> EngineResult<()> {
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(data)
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
        let mut f = File::create(&tmp)?;
        f.write_all(body.as_bytes())?;
        f.flush()?;
        fs::rename(tmp, &self.path)?;
        Ok(())
    }
}

impl TaskStore for JsonStore {
    fn get(&self, id: u64) -> EngineResult<Option<Task>> {
        Ok(self.read()?.get(id).cloned())
    }

    fn get_by_owner(&self, owner: u64, status: Option<Status>) -> EngineResult<Vec<Task>> {
        Ok(self.read()?.by_owner(owner, status))
    }

    fn create(&self, new: NewTask) -> EngineResult<Task> {
        let mut data = self.write()?;
        let task = data.create(new)?;
        self.save(&data)?;
        Ok(task)
    }

    fn update(&self, task: &Task) -> EngineResult<bool> {
        let mut data = self.write()?;
        let updated = data.update(task)?;
        if updated {
            self.save(&data)?;
        }
        Ok(updated)
    }

    fn soft_delete(&self, id: u64) -> EngineResult<bool> {
        let mut data = self.write()?;
        let deleted = data.soft_delete(id);
        if deleted {
            self.save(&data)?;
        }
        Ok(deleted)
    }

    fn assignees_of(&self, task_id: u64) -> EngineResult<Vec<u64>> {
        Ok(self.read()?.assignees_of(task_id))
    }

    fn time_entry_totals(&self, task_ids: &[u64]) -> EngineResult<BTreeMap<u64, u64>> {
        Ok(self.read()?.time_entry_totals(task_ids))
    }

    fn log_time(&self, new: NewTimeEntry) -> EngineResult<TimeEntry> {
        let mut data = self.write()?;
        let entry = data.log_time(new)?;
        self.save(&data)?;
        Ok(entry)
    }

    fn assign(&self, task_id: u64, user: u64) -> EngineResult<()> {
        let mut data = self.write()?;
        data.assign(task_id, user)?;
        self.save(&data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{EntryType, Kind, Priority};
    use chrono::NaiveDate;

    fn new_task(name: &str, owner: u64) -> NewTask {
        NewTask {
            name: name.into(),
            description: None,
            status: Status::ToDo,
            priority: Priority::Medium,
            kind: Kind::Task,
            progress: 0,
            due: None,
            parent: None,
            owner,
        }
    }

    #[test]
    fn ids_are_assigned_sequentially() {
        let store = MemoryStore::new();
        let a = store.create(new_task("a", 1)).unwrap();
        let b = store.create(new_task("b", 1)).unwrap();
        assert_eq!(b.id, a.id + 1);
    }

    #[test]
    fn soft_delete_hides_from_owner_scans_but_not_point_lookups() {
        let store = MemoryStore::new();
        let t = store.create(new_task("doomed", 1)).unwrap();
        assert!(store.soft_delete(t.id).unwrap());
        assert!(store.get_by_owner(1, None).unwrap().is_empty());
        let fetched = store.get(t.id).unwrap().expect("record kept");
        assert!(fetched.deleted);
        // Second delete is a no-op.
        assert!(!store.soft_delete(t.id).unwrap());
    }

    #[test]
    fn children_of_deleted_parent_keep_their_pointer() {
        let store = MemoryStore::new();
        let parent = store.create(new_task("parent", 1)).unwrap();
        let mut child = new_task("child", 1);
        child.parent = Some(parent.id);
        let child = store.create(child).unwrap();
        store.soft_delete(parent.id).unwrap();
        let kept = store.get(child.id).unwrap().expect("child kept");
        assert_eq!(kept.parent, Some(parent.id));
    }

    #[test]
    fn logging_time_against_missing_task_fails() {
        let store = MemoryStore::new();
        let err = store
            .log_time(NewTimeEntry {
                task: 99,
                owner: 1,
                minutes: 30,
                entry_date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
                entry_type: EntryType::Manual,
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(99)));
    }

    #[test]
    fn time_entry_totals_sum_per_task() {
        let store = MemoryStore::new();
        let t = store.create(new_task("tracked", 1)).unwrap();
        for minutes in [30, 45] {
            store
                .log_time(NewTimeEntry {
                    task: t.id,
                    owner: 1,
                    minutes,
                    entry_date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
                    entry_type: EntryType::Manual,
                })
                .unwrap();
        }
        let totals = store.time_entry_totals(&[t.id]).unwrap();
        assert_eq!(totals.get(&t.id), Some(&75));
    }

    #[test]
    fn assign_reactivates_dormant_links() {
        let store = MemoryStore::new();
        let t = store.create(new_task("shared", 1)).unwrap();
        store.assign(t.id, 7).unwrap();
        store.assign(t.id, 7).unwrap();
        assert_eq!(store.assignees_of(t.id).unwrap(), vec![7]);
    }

    #[test]
    fn json_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        {
            let store = JsonStore::open(&path).unwrap();
            let t = store.create(new_task("persisted", 1)).unwrap();
            store.assign(t.id, 3).unwrap();
            store
                .log_time(NewTimeEntry {
                    task: t.id,
                    owner: 1,
                    minutes: 60,
                    entry_date: NaiveDate::from_ymd_opt(2026, 8, 2).unwrap(),
                    entry_type: EntryType::Timer,
                })
                .unwrap();
        }
        let reopened = JsonStore::open(&path).unwrap();
        let tasks = reopened.get_by_owner(1, None).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "persisted");
        assert_eq!(reopened.assignees_of(tasks[0].id).unwrap(), vec![3]);
        let totals = reopened.time_entry_totals(&[tasks[0].id]).unwrap();
        assert_eq!(totals.get(&tasks[0].id), Some(&60));
    }

    #[test]
    fn create_rejects_invalid_fields() {
        let store = MemoryStore::new();
        assert!(store.create(new_task("  ", 1)).is_err());
        let mut t = new_task("over", 1);
        t.progress = 101;
        assert!(store.create(t).is_err());
    }
}
