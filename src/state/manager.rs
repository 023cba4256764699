//! State Manager
//!
//! One JSON tree of application state addressed by dot-separated paths
//! such as `workflows.gfs.status` or `ui.selected_workflow`. Every read and
//! write takes a single reentrant lock over the whole tree. Change
//! callbacks, workflow callbacks and event bus publication all run after
//! that lock is released, so a callback may call back into the manager.
//!
//! # Tree layout
//!
//! ```text
//! workflows.<id>      { data, last_updated, status, stats, visualization, log_entries }
//! ui                  { current_view, selected_workflow, selected_task, theme, ... }
//! user_preferences    {}
//! session_data        { start_time, active_tasks, recent_files, workflow_stats, last_file_event }
//! visualization       { dependency_layout, color_scheme, node_size, show_labels, animation_enabled }
//! ```

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use log::{debug, error, info};
use parking_lot::{Mutex, ReentrantMutex};
use serde_json::{json, Map, Value};

use super::stats::{SessionStats, WorkflowStats};
use crate::config::Config;
use crate::error::{run_handler, HandlerResult, StateError};
use crate::events::{Event, EventBus, WORKFLOW_ADDED, WORKFLOW_REMOVED, WORKFLOW_UPDATED};
use crate::logs::LogRecord;
use crate::workflow::{Task, Workflow};

/// Most recent log entries kept per workflow.
pub const MAX_LOG_ENTRIES: usize = 1000;

/// Most recent file paths kept in `session_data.recent_files`.
pub const MAX_RECENT_FILES: usize = 10;

const STATE_DIR: &str = ".rocotoviewer";
const STATE_FILE: &str = "state.json";

/// Kind of change reported to workflow callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowChange {
    Updated,
    Removed,
}

impl WorkflowChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowChange::Updated => "updated",
            WorkflowChange::Removed => "removed",
        }
    }
}

/// Callback receiving `(path, new value)` after each change.
pub type ChangeCallback = Arc<dyn Fn(&str, &Value) -> HandlerResult + Send + Sync>;

/// Callback receiving `(workflow id, stored entry, change)`.
pub type WorkflowCallback = Arc<dyn Fn(&str, &Value, WorkflowChange) -> HandlerResult + Send + Sync>;

/// Thread-safe application state tree.
///
/// # Example
///
/// ```rust
/// use rocotoviewer::state::StateManager;
/// use serde_json::json;
///
/// let state = StateManager::default();
/// state.set("ui.selected_workflow", json!("gfs"));
/// assert_eq!(state.get("ui.selected_workflow"), Some(json!("gfs")));
/// assert_eq!(state.get_or("ui.missing", json!(0)), json!(0));
/// ```
pub struct StateManager {
    tree: ReentrantMutex<RefCell<Value>>,
    theme: String,
    refresh_interval: u64,
    change_callbacks: Mutex<Vec<ChangeCallback>>,
    workflow_callbacks: Mutex<Vec<WorkflowCallback>>,
    bus: Option<Arc<EventBus>>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl StateManager {
    /// Creates a manager with the default tree. UI defaults come from
    /// `config.display`. Saved state is not loaded; call
    /// [`load_state`](Self::load_state) for that.
    pub fn new(config: &Config) -> Self {
        let theme = config.display.theme.clone();
        let refresh_interval = config.display.refresh_interval;
        Self {
            tree: ReentrantMutex::new(RefCell::new(default_tree(&theme, refresh_interval))),
            theme,
            refresh_interval,
            change_callbacks: Mutex::new(Vec::new()),
            workflow_callbacks: Mutex::new(Vec::new()),
            bus: None,
        }
    }

    /// Publishes workflow events on `bus`.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn register_change_callback<F>(&self, callback: F)
    where
        F: Fn(&str, &Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.change_callbacks.lock().push(Arc::new(callback));
    }

    pub fn register_workflow_callback<F>(&self, callback: F)
    where
        F: Fn(&str, &Value, WorkflowChange) -> HandlerResult + Send + Sync + 'static,
    {
        self.workflow_callbacks.lock().push(Arc::new(callback));
    }

    fn with_tree<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        let guard = self.tree.lock();
        let mut tree = guard.borrow_mut();
        f(&mut tree)
    }

    /// Returns a copy of the value at `path`, or `None` if any segment is
    /// missing or passes through a non-mapping.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.with_tree(|tree| lookup(tree, path).cloned())
    }

    /// Like [`get`](Self::get) with a fallback.
    pub fn get_or(&self, path: &str, default: Value) -> Value {
        self.get(path).unwrap_or(default)
    }

    /// Writes `value` at `path`, creating intermediate mappings, then
    /// notifies change callbacks.
    pub fn set(&self, path: &str, value: Value) {
        self.with_tree(|tree| assign(tree, path, value.clone()));
        if path.starts_with("workflows.") {
            info!("Workflow state updated: {}", path);
        } else {
            debug!("State updated: {}", path);
        }
        self.notify_change(path, &value);
    }

    /// Stores a parsed workflow with freshly computed statistics.
    ///
    /// Log entries already recorded for the id are kept. Workflow callbacks
    /// fire once with [`WorkflowChange::Updated`].
    pub fn update_workflow(&self, workflow_id: &str, workflow: Workflow) {
        let stats = WorkflowStats::from_workflow(&workflow);
        let status = workflow.status().to_string();
        let visualization = entry_visualization(&workflow);

        let (data, stats_value) = match (serde_json::to_value(&workflow), serde_json::to_value(&stats)) {
            (Ok(data), Ok(stats)) => (data, stats),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to store workflow '{}': {}", workflow_id, e);
                return;
            }
        };

        let mut entry = json!({
            "data": data,
            "last_updated": Local::now().to_rfc3339(),
            "status": status,
            "stats": stats_value,
            "visualization": visualization,
        });

        let existed = self.with_tree(|tree| {
            let workflows = workflows_mut(tree);
            let previous = workflows.remove(workflow_id);
            let existed = previous.is_some();
            if let Some(logs) = previous.and_then(|mut p| p.get_mut("log_entries").map(Value::take)) {
                entry["log_entries"] = logs;
            }
            workflows.insert(workflow_id.to_string(), entry.clone());
            refresh_session_stats(tree);
            existed
        });

        info!(
            "Workflow '{}' {}: {} tasks, {:.1}% complete",
            workflow_id,
            if existed { "updated" } else { "added" },
            stats.total_tasks,
            stats.completion_percentage
        );

        self.notify_change(&format!("workflows.{}", workflow_id), &entry);
        self.notify_workflow(workflow_id, &entry, WorkflowChange::Updated);

        let topic = if existed { WORKFLOW_UPDATED } else { WORKFLOW_ADDED };
        self.publish(Event::workflow(
            topic,
            json!({ "workflow_id": workflow_id, "status": entry["status"], "stats": entry["stats"] }),
        ));
    }

    /// Removes a stored workflow. Returns false, without notifying, if the
    /// id was not stored.
    pub fn remove_workflow(&self, workflow_id: &str) -> bool {
        let removed = self.with_tree(|tree| {
            let removed = workflows_mut(tree).remove(workflow_id);
            if removed.is_some() {
                refresh_session_stats(tree);
            }
            removed
        });

        let Some(entry) = removed else {
            return false;
        };

        info!("Workflow '{}' removed", workflow_id);
        self.notify_change(&format!("workflows.{}", workflow_id), &Value::Null);
        self.notify_workflow(workflow_id, &entry, WorkflowChange::Removed);
        self.publish(Event::workflow(
            WORKFLOW_REMOVED,
            json!({ "workflow_id": workflow_id }),
        ));
        true
    }

    /// Returns the stored entry for a workflow.
    pub fn get_workflow(&self, workflow_id: &str) -> Option<Value> {
        self.with_tree(|tree| {
            tree.get("workflows")
                .and_then(|w| w.get(workflow_id))
                .cloned()
        })
    }

    /// Reads one key of a stored workflow entry. The id is a single tree
    /// key, so ids containing `.` resolve the same way they were stored.
    fn workflow_field(&self, workflow_id: &str, key: &str) -> Option<Value> {
        self.with_tree(|tree| {
            tree.get("workflows")
                .and_then(|w| w.get(workflow_id))
                .and_then(|entry| entry.get(key))
                .cloned()
        })
    }

    /// Returns the stored workflow as a typed record.
    pub fn get_workflow_data(&self, workflow_id: &str) -> Option<Workflow> {
        let data = self.get_workflow(workflow_id)?.get_mut("data").map(Value::take)?;
        serde_json::from_value(data)
            .map_err(|e| error!("Stored data for '{}' is not a workflow: {}", workflow_id, e))
            .ok()
    }

    /// Returns every stored workflow entry keyed by id.
    pub fn get_all_workflows(&self) -> Map<String, Value> {
        self.with_tree(|tree| {
            tree.get("workflows")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        })
    }

    /// Workflows whose status equals `status` and whose name contains
    /// `search` (ignoring case). With neither given, the filters stored at
    /// `ui.workflow_filters` apply.
    pub fn get_filtered_workflows(&self, status: Option<&str>, search: Option<&str>) -> Map<String, Value> {
        let (status, search) = if status.is_none() && search.is_none() {
            let filters = self.get_or("ui.workflow_filters", Value::Null);
            (
                filters.get("status").and_then(Value::as_str).map(str::to_string),
                filters.get("search").and_then(Value::as_str).map(str::to_string),
            )
        } else {
            (status.map(str::to_string), search.map(str::to_string))
        };
        let status = status.filter(|s| !s.is_empty());
        let search = search.filter(|s| !s.is_empty()).map(|s| s.to_lowercase());

        self.get_all_workflows()
            .into_iter()
            .filter(|(_, entry)| {
                status
                    .as_deref()
                    .map_or(true, |wanted| entry.get("status").and_then(Value::as_str) == Some(wanted))
            })
            .filter(|(_, entry)| {
                search.as_deref().map_or(true, |term| {
                    entry
                        .pointer("/data/name")
                        .and_then(Value::as_str)
                        .is_some_and(|name| name.to_lowercase().contains(term))
                })
            })
            .collect()
    }

    /// Tasks of a stored workflow whose status equals `status`, ignoring case.
    pub fn get_workflow_tasks_by_status(&self, workflow_id: &str, status: &str) -> Vec<Task> {
        self.get_workflow_data(workflow_id)
            .map(|workflow| workflow.tasks_with_status(status).into_iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_workflow_stats(&self, workflow_id: &str) -> Option<WorkflowStats> {
        let stats = self.workflow_field(workflow_id, "stats")?;
        serde_json::from_value(stats).ok()
    }

    pub fn get_session_stats(&self) -> SessionStats {
        self.get("session_data.workflow_stats")
            .and_then(|stats| serde_json::from_value(stats).ok())
            .unwrap_or_default()
    }

    /// Appends a log record to the workflow's capped log ring.
    ///
    /// An ERROR, FATAL or CRITICAL record marks the workflow `FAILED`; a
    /// WARNING record marks it `WARNING`.
    pub fn add_log_entry(&self, workflow_id: &str, record: &LogRecord, file_path: Option<&Path>) {
        let mut entry = match serde_json::to_value(record) {
            Ok(entry) => entry,
            Err(e) => {
                error!("Failed to store log entry for '{}': {}", workflow_id, e);
                return;
            }
        };
        if let Value::Object(map) = &mut entry {
            map.insert("received_at".to_string(), Value::from(Local::now().to_rfc3339()));
            if let Some(path) = file_path {
                map.insert("file_path".to_string(), Value::from(path.display().to_string()));
            }
        }

        let status = status_for_level(record.level.as_str());
        self.with_tree(|tree| {
            let workflow = ensure_object(
                workflows_mut(tree)
                    .entry(workflow_id.to_string())
                    .or_insert_with(|| Value::Object(Map::new())),
            );

            let logs = workflow
                .entry("log_entries".to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if !logs.is_array() {
                *logs = Value::Array(Vec::new());
            }
            if let Value::Array(list) = logs {
                list.push(entry.clone());
                if list.len() > MAX_LOG_ENTRIES {
                    let excess = list.len() - MAX_LOG_ENTRIES;
                    list.drain(..excess);
                }
            }

            if let Some(status) = status {
                workflow.insert("status".to_string(), Value::from(status));
            }
        });

        self.notify_change(&format!("workflows.{}.log_entries", workflow_id), &entry);
        if let Some(status) = status {
            self.notify_change(&format!("workflows.{}.status", workflow_id), &Value::from(status));
        }
    }

    /// Log entries recorded for a workflow, oldest first.
    pub fn get_log_entries(&self, workflow_id: &str) -> Vec<Value> {
        match self.workflow_field(workflow_id, "log_entries") {
            Some(Value::Array(entries)) => entries,
            _ => Vec::new(),
        }
    }

    /// Moves `file_path` to the front of `session_data.recent_files`.
    pub fn add_recent_file(&self, file_path: &str) {
        let recent = self.with_tree(|tree| {
            let mut recent: Vec<Value> = match lookup(tree, "session_data.recent_files") {
                Some(Value::Array(list)) => list.clone(),
                _ => Vec::new(),
            };
            recent.retain(|existing| existing.as_str() != Some(file_path));
            recent.insert(0, Value::from(file_path));
            recent.truncate(MAX_RECENT_FILES);

            let recent = Value::Array(recent);
            assign(tree, "session_data.recent_files", recent.clone());
            recent
        });
        self.notify_change("session_data.recent_files", &recent);
    }

    /// Records a filesystem change reported by the file monitor.
    pub fn update_from_file_change(&self, event_type: &str, path: &Path) {
        let path = path.display().to_string();
        debug!("Processing file change: {} {}", event_type, path);

        self.add_recent_file(&path);
        self.set(
            "session_data.last_file_event",
            json!({
                "event_type": event_type,
                "path": path,
                "timestamp": Local::now().to_rfc3339(),
            }),
        );
    }

    pub fn get_ui_state(&self) -> Value {
        self.get_or("ui", Value::Object(Map::new()))
    }

    /// Sets each key of `ui_state` under `ui`.
    pub fn set_ui_state(&self, ui_state: Map<String, Value>) {
        for (key, value) in ui_state {
            self.set(&format!("ui.{}", key), value);
        }
    }

    pub fn get_visualization_settings(&self) -> Value {
        self.get_or("visualization", Value::Object(Map::new()))
    }

    /// Sets each key of `settings` under `visualization`.
    pub fn set_visualization_settings(&self, settings: Map<String, Value>) {
        for (key, value) in settings {
            self.set(&format!("visualization.{}", key), value);
        }
    }

    /// Restores the default tree and notifies `("state_reset", true)`.
    pub fn reset(&self) {
        let fresh = default_tree(&self.theme, self.refresh_interval);
        self.with_tree(|tree| *tree = fresh);
        info!("State reset to defaults");
        self.notify_change("state_reset", &Value::Bool(true));
    }

    /// `~/.rocotoviewer/state.json`
    pub fn default_state_path() -> Result<PathBuf, StateError> {
        dirs::home_dir()
            .map(|home| home.join(STATE_DIR).join(STATE_FILE))
            .ok_or(StateError::NoHomeDir)
    }

    /// Writes the tree as JSON. Failures are logged; returns true on success.
    pub fn save_state(&self, path: Option<&Path>) -> bool {
        match self.try_save_state(path) {
            Ok(saved) => {
                info!("State saved to {}", saved.display());
                true
            }
            Err(e) => {
                error!("Error saving state: {}", e);
                false
            }
        }
    }

    pub fn try_save_state(&self, path: Option<&Path>) -> Result<PathBuf, StateError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_state_path()?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StateError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let snapshot = self.with_tree(|tree| tree.clone());
        let json = serde_json::to_string_pretty(&snapshot)?;
        fs::write(&path, json).map_err(|source| StateError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Merges saved state into the tree, overwriting top-level keys present
    /// in the file. A missing file is not an error. Returns true if state
    /// was loaded.
    pub fn load_state(&self, path: Option<&Path>) -> bool {
        match self.try_load_state(path) {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("Error loading state: {}", e);
                false
            }
        }
    }

    pub fn try_load_state(&self, path: Option<&Path>) -> Result<bool, StateError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_state_path()?,
        };

        if !path.exists() {
            debug!("State file does not exist: {}", path.display());
            return Ok(false);
        }

        let content = fs::read_to_string(&path).map_err(|source| StateError::Io {
            path: path.clone(),
            source,
        })?;
        let saved: Value = serde_json::from_str(&content)?;
        let Value::Object(saved) = saved else {
            return Err(StateError::NotAnObject(path));
        };

        self.with_tree(|tree| {
            let tree = ensure_object(tree);
            for (key, value) in saved {
                tree.insert(key, value);
            }
        });
        info!("State loaded from {}", path.display());
        Ok(true)
    }

    fn notify_change(&self, path: &str, value: &Value) {
        let callbacks: Vec<ChangeCallback> = self.change_callbacks.lock().clone();
        for callback in callbacks {
            run_handler("State change", || callback(path, value));
        }
    }

    fn notify_workflow(&self, workflow_id: &str, entry: &Value, change: WorkflowChange) {
        let callbacks: Vec<WorkflowCallback> = self.workflow_callbacks.lock().clone();
        for callback in callbacks {
            run_handler("Workflow change", || callback(workflow_id, entry, change));
        }
    }

    fn publish(&self, event: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(event.with_source("state_manager"));
        }
    }
}

fn default_tree(theme: &str, refresh_interval: u64) -> Value {
    json!({
        "workflows": {},
        "ui": {
            "current_view": "main",
            "selected_workflow": null,
            "selected_task": null,
            "theme": theme,
            "refresh_interval": refresh_interval,
            "workflow_filters": {
                "status": null,
                "search": "",
                "show_dependencies": true,
                "show_progress": true,
            },
        },
        "user_preferences": {},
        "session_data": {
            "start_time": Local::now().to_rfc3339(),
            "active_tasks": [],
            "recent_files": [],
            "workflow_stats": {
                "total_workflows": 0,
                "total_tasks": 0,
                "status_counts": {},
            },
        },
        "visualization": {
            "dependency_layout": "hierarchical",
            "color_scheme": "default",
            "node_size": "medium",
            "show_labels": true,
            "animation_enabled": true,
        },
    })
}

fn entry_visualization(workflow: &Workflow) -> Value {
    let hint = |key: &str, default: Value| workflow.visualization.get(key).cloned().unwrap_or(default);
    json!({
        "position": hint("position", json!({ "x": 0, "y": 0 })),
        "expanded": hint("expanded", Value::Bool(true)),
        "highlighted": hint("highlighted", Value::Bool(false)),
    })
}

fn status_for_level(level: &str) -> Option<&'static str> {
    match level.to_ascii_uppercase().as_str() {
        "ERROR" | "FATAL" | "CRITICAL" => Some("FAILED"),
        "WARNING" => Some("WARNING"),
        _ => None,
    }
}

fn lookup<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(tree, |node, key| node.as_object()?.get(key))
}

fn assign(tree: &mut Value, path: &str, value: Value) {
    let mut keys: Vec<&str> = path.split('.').collect();
    let last = keys.pop().unwrap_or_default();

    let mut node = tree;
    for key in keys {
        node = ensure_object(node)
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(node).insert(last.to_string(), value);
}

/// Replaces a non-mapping node with an empty mapping.
fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with a mapping"),
    }
}

fn workflows_mut(tree: &mut Value) -> &mut Map<String, Value> {
    ensure_object(
        ensure_object(tree)
            .entry("workflows".to_string())
            .or_insert_with(|| Value::Object(Map::new())),
    )
}

fn refresh_session_stats(tree: &mut Value) {
    let (count, stats): (usize, Vec<WorkflowStats>) = match tree.get("workflows").and_then(Value::as_object) {
        Some(workflows) => (
            workflows.len(),
            workflows
                .values()
                .filter_map(|entry| entry.get("stats"))
                .filter_map(|stats| serde_json::from_value(stats.clone()).ok())
                .collect(),
        ),
        None => (0, Vec::new()),
    };

    let session = SessionStats::aggregate(count, &stats);
    match serde_json::to_value(&session) {
        Ok(value) => assign(tree, "session_data.workflow_stats", value),
        Err(e) => error!("Failed to record session statistics: {}", e),
    }
}
