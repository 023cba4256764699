//! Workflow Data Model
//!
//! Plain records describing a parsed Rocoto workflow, plus the derived
//! views (dependency edges, status groups, timeline, statistics) the
//! parser computes once per parse.
//!
//! # Example XML Format
//!
//! ```xml
//! <workflow workflowid="gfs" realtime="F" scheduler="slurm">
//!   <description>Global forecast</description>
//!   <cycledef group="gfs">202301010000 202301020000 06:00:00</cycledef>
//!   <task name="prep" cycledefs="gfs">
//!     <command>/home/user/jobs/prep.sh</command>
//!     <envar><name>PDY</name><value>20230101</value></envar>
//!   </task>
//!   <task name="fcst">
//!     <command>/home/user/jobs/fcst.sh</command>
//!     <dependency><taskdep task="prep"/></dependency>
//!   </task>
//! </workflow>
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Target recorded for a dependency whose task reference cannot be found.
pub const UNKNOWN_TARGET: &str = "unknown";

/// Status bucket for tasks without a `status` attribute.
pub const UNKNOWN_STATUS: &str = "unknown";

/// A precondition on a task, kept as the nested XML condition tree.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Dependency {
    /// Element tag name (`dependency`, `and`, `or`, `taskdep`, ...)
    #[serde(rename = "type")]
    pub kind: String,

    /// XML attributes of the element
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Trimmed text content
    #[serde(default)]
    pub text: String,

    /// Nested condition elements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Dependency>,
}

impl Dependency {
    /// Creates a dependency node with the given tag name.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Adds a nested condition.
    pub fn with_child(mut self, child: Dependency) -> Self {
        self.children.push(child);
        self
    }

    /// Resolves the task this dependency points at.
    ///
    /// Looks at the element's own `task` attribute first, then one level of
    /// `taskdep`/`datadep` children.
    pub fn target_task(&self) -> Option<&str> {
        if let Some(task) = self.attributes.get("task") {
            return Some(task.as_str());
        }
        self.children
            .iter()
            .filter(|child| matches!(child.kind.as_str(), "taskdep" | "datadep"))
            .find_map(|child| child.attributes.get("task").map(String::as_str))
    }
}

/// An environment variable exported to a task.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Envar {
    pub name: String,
    pub value: String,
}

/// A cycle definition (`<cycledef>`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub group: Option<String>,
    /// Cycle specification, e.g. `202301010000 202301020000 06:00:00`
    pub text: String,
}

/// One `<entry>` of a resource pool.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub key: Option<String>,
    pub value: Option<String>,
}

/// Grid position used by viewers to place a task node.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

/// Display hints attached to a task.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TaskVisualization {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

/// One unit of work in a workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Task {
    /// Task name, unique within a well-formed workflow
    pub id: String,

    /// Shell command text
    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub dependencies: Vec<Dependency>,

    #[serde(default)]
    pub envars: Vec<Envar>,

    /// XML attributes plus flattened simple child elements
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    #[serde(default)]
    pub visualization: TaskVisualization,
}

impl Task {
    /// Creates a task with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into().trim().to_string(),
            ..Self::default()
        }
    }

    /// Sets the command text.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into().trim().to_string();
        self
    }

    /// Sets an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Adds a dependency.
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Task status from its attributes, or `"unknown"`.
    pub fn status(&self) -> &str {
        self.attributes
            .get("status")
            .map(String::as_str)
            .unwrap_or(UNKNOWN_STATUS)
    }
}

/// A directed edge from a task to the task it depends on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
}

/// Task ids sharing one status value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TaskGroup {
    /// Status value
    pub name: String,
    pub tasks: Vec<String>,
}

/// Time span covered by the tasks' recorded start and end times.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Timeline {
    pub earliest_start: Option<DateTime<FixedOffset>>,
    pub latest_end: Option<DateTime<FixedOffset>>,
    /// Seconds between `earliest_start` and `latest_end`, 0 if either is missing
    pub total_duration: f64,
}

/// Counts derived from a parsed workflow.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkflowStatistics {
    pub total_tasks: usize,
    pub dependency_count: usize,
    pub task_groups_count: usize,
}

/// A parsed Rocoto workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub source_file: String,
    #[serde(default)]
    pub cycles: Vec<Cycle>,
    #[serde(default)]
    pub resources: Vec<Resource>,

    /// Derived dependency edges
    #[serde(default)]
    pub dependencies: Vec<DependencyEdge>,
    /// Derived time span
    #[serde(default)]
    pub timeline: Timeline,
    /// Derived status groups, in first-seen order
    #[serde(default)]
    pub task_groups: Vec<TaskGroup>,
    /// Derived counts
    #[serde(default)]
    pub statistics: WorkflowStatistics,

    #[serde(default)]
    pub visualization: BTreeMap<String, Value>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Workflow {
    /// Creates an empty workflow with the given id; `name` defaults to the id.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Self::default()
        }
    }

    /// Parses a workflow file with the default size ceiling.
    ///
    /// Returns `None` (after logging) if the file is missing, a directory,
    /// too large, or not well-formed XML.
    pub fn parse(path: impl AsRef<Path>) -> Option<Self> {
        super::parser::WorkflowParser::default().parse(path)
    }

    /// Gets a task by id. Returns the first match if ids are duplicated.
    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Returns the tasks whose status equals `status`, ignoring case.
    pub fn tasks_with_status(&self, status: &str) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.status().eq_ignore_ascii_case(status))
            .collect()
    }

    /// Returns the number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if the workflow has no tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Status recorded in metadata, or `"unknown"`.
    pub fn status(&self) -> &str {
        self.metadata
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_STATUS)
    }
}
