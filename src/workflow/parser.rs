//! Workflow Parser
//!
//! Loads Rocoto workflow XML files into [`Workflow`] records and derives
//! the dependency edges, status groups, timeline and statistics from the
//! built task list.
//!
//! The whole document is parsed into a `roxmltree` tree before extraction.
//! Files are bounded by a size ceiling, so the tree never grows beyond a
//! few times that ceiling.
//!
//! Both task layouts seen in the wild are accepted: `<task>` elements as
//! direct children of `<workflow>`, and tasks wrapped in `<tasks>`. Tasks
//! nested in `<metatask>` blocks are extracted as well. A `<taskdef>`
//! anywhere in the document marks it as the legacy dialect, where
//! `<taskdef>`, `<job>` and `<jobdef>` are read as tasks.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use log::{debug, error, info, warn};
use roxmltree::{Document, Node, ParsingOptions};
use serde_json::Value;

use super::model::{
    Cycle, Dependency, DependencyEdge, Envar, Position, Resource, Task, TaskGroup, Timeline,
    Workflow, WorkflowStatistics, UNKNOWN_TARGET,
};
use crate::config::{Config, DEFAULT_MAX_FILE_SIZE};
use crate::error::ParseError;

/// Number of columns in the task grid layout.
const GRID_COLUMNS: usize = 5;
const GRID_X_SPACING: i64 = 10;
const GRID_Y_SPACING: i64 = 50;

const LEGACY_TASK_TAGS: &[&str] = &["taskdef", "job", "jobdef"];

/// Parser for Rocoto workflow files.
///
/// # Example
///
/// ```rust,no_run
/// use rocotoviewer::workflow::WorkflowParser;
///
/// let parser = WorkflowParser::new(5 * 1024 * 1024);
/// if let Some(workflow) = parser.parse("workflow.xml") {
///     println!("{}: {} tasks", workflow.id, workflow.tasks.len());
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct WorkflowParser {
    max_file_size: u64,
}

impl Default for WorkflowParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_SIZE)
    }
}

impl WorkflowParser {
    /// Creates a parser that rejects files larger than `max_file_size` bytes.
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    /// Creates a parser using `monitor.max_file_size` from the configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.monitor.max_file_size)
    }

    /// Returns the configured size ceiling in bytes.
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Parses a workflow file.
    ///
    /// Never fails loudly: a missing file, directory, oversized file or
    /// malformed XML is logged and yields `None`.
    pub fn parse(&self, path: impl AsRef<Path>) -> Option<Workflow> {
        let path = path.as_ref();
        match self.try_parse(path) {
            Ok(workflow) => Some(workflow),
            Err(
                e @ (ParseError::NotFound(_)
                | ParseError::IsDirectory(_)
                | ParseError::TooLarge { .. }),
            ) => {
                warn!("Invalid workflow source: {}", e);
                None
            }
            Err(e) => {
                error!("Failed to parse workflow {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Parses a workflow file, returning the reason on failure.
    pub fn try_parse(&self, path: &Path) -> Result<Workflow, ParseError> {
        self.validate_source(path)?;

        let content = fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Workflow content loaded ({} bytes)", content.len());

        let workflow = parse_document(&content, path)?;
        info!(
            "Parsed workflow '{}' from {}: {} tasks, {} dependencies",
            workflow.id,
            path.display(),
            workflow.tasks.len(),
            workflow.dependencies.len()
        );
        Ok(workflow)
    }

    fn validate_source(&self, path: &Path) -> Result<(), ParseError> {
        let metadata = fs::metadata(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ParseError::NotFound(path.to_path_buf())
            } else {
                ParseError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        if metadata.is_dir() {
            return Err(ParseError::IsDirectory(path.to_path_buf()));
        }

        if metadata.len() > self.max_file_size {
            return Err(ParseError::TooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                limit: self.max_file_size,
            });
        }

        Ok(())
    }
}

/// Parses workflow XML text. `source` names the file the text came from;
/// its stem is the fallback workflow id.
pub fn parse_document(content: &str, source: &Path) -> Result<Workflow, ParseError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let document = Document::parse_with_options(content, options).map_err(|source_err| ParseError::Xml {
        path: source.to_path_buf(),
        source: source_err,
    })?;

    let root = document.root_element();
    let legacy = is_legacy(&document);
    if legacy {
        info!("Legacy workflow format detected in {}", source.display());
    }

    let fallback_id = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("workflow");
    let id = root.attribute("workflowid").unwrap_or(fallback_id).to_string();

    let mut workflow = Workflow::new(id);
    if let Some(name) = root.attribute("name") {
        workflow.name = name.to_string();
    }
    workflow.description = child_element(root, "description")
        .map(|node| deep_text(node).trim().to_string())
        .unwrap_or_default();
    workflow.source_file = source.to_string_lossy().into_owned();

    collect_tasks(root, legacy, None, &mut workflow.tasks);

    workflow.cycles = child_elements(root, "cycledef")
        .map(|node| Cycle {
            group: node.attribute("group").map(str::to_string),
            text: deep_text(node).trim().to_string(),
        })
        .collect();

    workflow.resources = child_elements(root, "resources")
        .flat_map(|resources| child_elements(resources, "pool"))
        .flat_map(|pool| child_elements(pool, "entry"))
        .map(|entry| Resource {
            key: entry.attribute("key").map(str::to_string),
            value: entry.attribute("value").map(str::to_string),
        })
        .collect();

    workflow.metadata.insert(
        "format".to_string(),
        Value::from(if legacy { "legacy" } else { "rocoto" }),
    );
    for attr in ["realtime", "scheduler", "cyclethrottle", "taskthrottle"] {
        if let Some(value) = root.attribute(attr) {
            workflow.metadata.insert(attr.to_string(), Value::from(value));
        }
    }

    derive_views(&mut workflow);
    Ok(workflow)
}

/// Recomputes every derived view of `workflow` from its task list:
/// dependency edges, status groups, timeline, statistics and task grid
/// positions.
pub fn derive_views(workflow: &mut Workflow) {
    let mut start_times = Vec::new();
    let mut end_times = Vec::new();
    let mut groups: Vec<TaskGroup> = Vec::new();
    let mut edges = Vec::new();

    for (index, task) in workflow.tasks.iter_mut().enumerate() {
        task.visualization.position = Some(grid_position(index));

        if let Some(start) = task_time(task, "start_time") {
            start_times.push(start);
        }
        if let Some(end) = task_time(task, "end_time") {
            end_times.push(end);
        }

        let status = task.status();
        match groups.iter_mut().find(|g| g.name == status) {
            Some(group) => group.tasks.push(task.id.clone()),
            None => groups.push(TaskGroup {
                name: status.to_string(),
                tasks: vec![task.id.clone()],
            }),
        }

        edges.extend(task.dependencies.iter().map(|dep| DependencyEdge {
            source: task.id.clone(),
            target: dep.target_task().unwrap_or(UNKNOWN_TARGET).to_string(),
        }));
    }

    workflow.timeline = build_timeline(&start_times, &end_times);
    workflow.dependencies = edges;
    workflow.task_groups = groups;
    workflow.statistics = WorkflowStatistics {
        total_tasks: workflow.tasks.len(),
        dependency_count: workflow.dependencies.len(),
        task_groups_count: workflow.task_groups.len(),
    };
    workflow
        .metadata
        .insert("task_count".to_string(), Value::from(workflow.tasks.len()));
}

/// Position of the `index`-th task in the fixed five-column grid.
pub fn grid_position(index: usize) -> Position {
    Position {
        x: (index % GRID_COLUMNS) as i64 * GRID_X_SPACING,
        y: (index / GRID_COLUMNS) as i64 * GRID_Y_SPACING,
    }
}

fn build_timeline(starts: &[DateTime<FixedOffset>], ends: &[DateTime<FixedOffset>]) -> Timeline {
    let earliest_start = starts.iter().min().copied();
    let latest_end = ends.iter().max().copied();
    let total_duration = match (earliest_start, latest_end) {
        (Some(start), Some(end)) => (end - start).num_milliseconds() as f64 / 1000.0,
        _ => 0.0,
    };

    Timeline {
        earliest_start,
        latest_end,
        total_duration,
    }
}

fn task_time(task: &Task, attribute: &str) -> Option<DateTime<FixedOffset>> {
    let raw = task.attributes.get(attribute)?;
    let parsed = parse_iso_timestamp(raw);
    if parsed.is_none() {
        warn!(
            "Task '{}': could not parse {} '{}'",
            task.id, attribute, raw
        );
    }
    parsed
}

/// Parses an ISO-8601 timestamp. A trailing `Z` means UTC; timestamps
/// without an offset are taken as UTC.
pub fn parse_iso_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }

    let with_offset = match raw.strip_suffix('Z') {
        Some(stripped) => format!("{}+00:00", stripped),
        None => raw.to_string(),
    };
    for format in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(&with_offset, format) {
            return Some(dt);
        }
    }

    let utc = FixedOffset::east_opt(0)?;
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc().with_timezone(&utc));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().with_timezone(&utc))
}

fn is_legacy(document: &Document) -> bool {
    document
        .descendants()
        .any(|node| node.is_element() && node.tag_name().name() == "taskdef")
}

fn is_task_tag(tag: &str, legacy: bool) -> bool {
    tag == "task" || (legacy && LEGACY_TASK_TAGS.contains(&tag))
}

/// Walks task containers in document order.
fn collect_tasks(parent: Node, legacy: bool, metatask: Option<&str>, tasks: &mut Vec<Task>) {
    for child in parent.children().filter(Node::is_element) {
        let tag = child.tag_name().name();
        if is_task_tag(tag, legacy) {
            let mut task = build_task(child);
            if let Some(name) = metatask {
                task.attributes
                    .entry("metatask".to_string())
                    .or_insert_with(|| name.to_string());
            }
            tasks.push(task);
        } else if tag == "tasks" {
            collect_tasks(child, legacy, metatask, tasks);
        } else if tag == "metatask" {
            let name = child.attribute("name").or(metatask);
            collect_tasks(child, legacy, name, tasks);
        }
    }
}

fn build_task(element: Node) -> Task {
    let id = element
        .attribute("name")
        .or_else(|| element.attribute("id"))
        .unwrap_or_default();

    let mut task = Task::new(id);
    task.attributes = element
        .attributes()
        .map(|attr| (attr.name().to_string(), attr.value().to_string()))
        .collect();

    for child in element.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "command" => task.command = deep_text(child).trim().to_string(),
            "dependency" => task.dependencies.push(build_dependency(child)),
            "envar" => task.envars.push(build_envar(child)),
            tag => {
                let text = deep_text(child);
                let text = text.trim();
                if !text.is_empty() {
                    task.attributes.insert(tag.to_string(), text.to_string());
                }
            }
        }
    }

    debug!(
        "Task '{}': {} dependencies, {} envars",
        task.id,
        task.dependencies.len(),
        task.envars.len()
    );
    task
}

fn build_dependency(element: Node) -> Dependency {
    Dependency {
        kind: element.tag_name().name().to_string(),
        attributes: attributes_of(element),
        text: direct_text(element).trim().to_string(),
        children: element
            .children()
            .filter(Node::is_element)
            .map(build_dependency)
            .collect(),
    }
}

/// Rocoto writes envars either as attributes or as `<name>`/`<value>` children.
fn build_envar(element: Node) -> Envar {
    let name = element
        .attribute("name")
        .map(str::to_string)
        .or_else(|| child_element(element, "name").map(|n| deep_text(n).trim().to_string()))
        .unwrap_or_default();

    let value = element
        .attribute("value")
        .map(str::to_string)
        .or_else(|| child_element(element, "value").map(|n| deep_text(n).trim().to_string()))
        .unwrap_or_else(|| direct_text(element).trim().to_string());

    Envar { name, value }
}

fn attributes_of(element: Node) -> BTreeMap<String, String> {
    element
        .attributes()
        .map(|attr| (attr.name().to_string(), attr.value().to_string()))
        .collect()
}

fn child_element<'a, 'input>(parent: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    parent
        .children()
        .find(|node| node.is_element() && node.tag_name().name() == tag)
}

fn child_elements<'a, 'input: 'a>(
    parent: Node<'a, 'input>,
    tag: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    parent
        .children()
        .filter(move |node| node.is_element() && node.tag_name().name() == tag)
}

/// Text of the element's own text children, ignoring nested elements.
fn direct_text(element: Node) -> String {
    element
        .children()
        .filter(Node::is_text)
        .filter_map(|node| node.text())
        .collect()
}

/// All text inside the element, including nested elements such as `<cyclestr>`.
fn deep_text(element: Node) -> String {
    element
        .descendants()
        .filter(Node::is_text)
        .filter_map(|node| node.text())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn parse_str(xml: &str) -> Workflow {
        parse_document(xml, &PathBuf::from("/tmp/sample_flow.xml")).unwrap()
    }

    const BASIC: &str = r#"<?xml version="1.0"?>
<workflow workflowid="wf1" realtime="F">
  <description>
    Test workflow
  </description>
  <cycledef group="six">202301010000 202301020000 06:00:00</cycledef>
  <resources>
    <pool>
      <entry key="cores" value="4"/>
      <entry key="memory"/>
    </pool>
  </resources>
  <task name="t1" status="SUCCEEDED" start_time="2023-01-01T00:00:00Z" end_time="2023-01-01T01:00:00Z">
    <command> run1.sh </command>
    <envar name="A" value="1"/>
  </task>
  <task name="t2">
    <command>run2.sh</command>
    <status>RUNNING</status>
    <walltime>00:10:00</walltime>
    <dependency><taskdep task="t1"/></dependency>
    <envar><name>PDY</name><value>20230101</value></envar>
  </task>
  <task name="t3" status="SUCCEEDED" end_time="2023-01-01T03:30:00+00:00">
    <command>run3.sh</command>
  </task>
</workflow>"#;

    #[test]
    fn test_parse_identity_and_description() {
        let workflow = parse_str(BASIC);
        assert_eq!(workflow.id, "wf1");
        assert_eq!(workflow.name, "wf1");
        assert_eq!(workflow.description, "Test workflow");
        assert_eq!(workflow.source_file, "/tmp/sample_flow.xml");
        assert_eq!(workflow.metadata["format"], "rocoto");
        assert_eq!(workflow.metadata["realtime"], "F");
    }

    #[test]
    fn test_id_falls_back_to_file_stem() {
        let workflow = parse_str("<workflow><task name='a'/></workflow>");
        assert_eq!(workflow.id, "sample_flow");
        assert_eq!(workflow.description, "");
    }

    #[test]
    fn test_parse_tasks_and_children() {
        let workflow = parse_str(BASIC);
        assert_eq!(workflow.tasks.len(), 3);

        let t1 = &workflow.tasks[0];
        assert_eq!(t1.command, "run1.sh");
        assert_eq!(t1.envars, vec![Envar { name: "A".into(), value: "1".into() }]);
        assert_eq!(t1.attributes["status"], "SUCCEEDED");

        let t2 = &workflow.tasks[1];
        assert_eq!(t2.attributes["status"], "RUNNING");
        assert_eq!(t2.attributes["walltime"], "00:10:00");
        assert!(!t2.attributes.contains_key("command"));
        assert_eq!(t2.envars[0].name, "PDY");
        assert_eq!(t2.envars[0].value, "20230101");
        assert_eq!(t2.dependencies.len(), 1);
        assert_eq!(t2.dependencies[0].kind, "dependency");
        assert_eq!(t2.dependencies[0].children[0].kind, "taskdep");
    }

    #[test]
    fn test_dependency_edges() {
        let workflow = parse_str(BASIC);
        assert_eq!(
            workflow.dependencies,
            vec![DependencyEdge { source: "t2".into(), target: "t1".into() }]
        );
    }

    #[test]
    fn test_unresolvable_dependency_is_unknown() {
        let workflow = parse_str(
            "<workflow><task name='a'><dependency><timedep>x</timedep></dependency></task></workflow>",
        );
        assert_eq!(workflow.dependencies[0].target, "unknown");
    }

    #[test]
    fn test_task_groups_first_seen_order() {
        let workflow = parse_str(BASIC);
        let names: Vec<_> = workflow.task_groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["SUCCEEDED", "RUNNING"]);
        assert_eq!(workflow.task_groups[0].tasks, vec!["t1", "t3"]);
    }

    #[test]
    fn test_timeline() {
        let workflow = parse_str(BASIC);
        let timeline = &workflow.timeline;
        assert_eq!(
            timeline.earliest_start.unwrap().to_rfc3339(),
            "2023-01-01T00:00:00+00:00"
        );
        assert_eq!(
            timeline.latest_end.unwrap().to_rfc3339(),
            "2023-01-01T03:30:00+00:00"
        );
        assert_eq!(timeline.total_duration, 12_600.0);
    }

    #[test]
    fn test_timeline_skips_bad_timestamps() {
        let workflow = parse_str(
            "<workflow><task name='a' start_time='yesterday'/><task name='b' end_time='2023-01-01T00:00:00'/></workflow>",
        );
        assert!(workflow.timeline.earliest_start.is_none());
        assert!(workflow.timeline.latest_end.is_some());
        assert_eq!(workflow.timeline.total_duration, 0.0);
    }

    #[test]
    fn test_statistics() {
        let workflow = parse_str(BASIC);
        assert_eq!(
            workflow.statistics,
            WorkflowStatistics { total_tasks: 3, dependency_count: 1, task_groups_count: 2 }
        );
    }

    #[test]
    fn test_grid_positions() {
        let xml = format!(
            "<workflow>{}</workflow>",
            (0..7).map(|i| format!("<task name='t{}'/>", i)).collect::<String>()
        );
        let workflow = parse_str(&xml);
        assert_eq!(workflow.tasks[0].visualization.position, Some(Position { x: 0, y: 0 }));
        assert_eq!(workflow.tasks[4].visualization.position, Some(Position { x: 40, y: 0 }));
        assert_eq!(workflow.tasks[6].visualization.position, Some(Position { x: 10, y: 50 }));
    }

    #[test]
    fn test_tasks_wrapper_and_direct_children() {
        let workflow = parse_str(
            "<workflow><task name='a'/><tasks><task name='b'/><task name='c'/></tasks></workflow>",
        );
        let ids: Vec<_> = workflow.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_metatask_tasks_are_extracted() {
        let workflow = parse_str(
            "<workflow><metatask name='ens'><var name='m'>01 02</var><task name='fcst_#m#'/></metatask></workflow>",
        );
        assert_eq!(workflow.tasks.len(), 1);
        assert_eq!(workflow.tasks[0].attributes["metatask"], "ens");
    }

    #[test]
    fn test_legacy_taskdef() {
        let workflow = parse_str(
            "<workflow><taskdef name='old'><command>x</command></taskdef><job name='j'/><task name='new'/></workflow>",
        );
        let ids: Vec<_> = workflow.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["old", "j", "new"]);
        assert_eq!(workflow.metadata["format"], "legacy");
    }

    #[test]
    fn test_job_without_taskdef_is_not_a_task() {
        let workflow = parse_str("<workflow><job name='j'/><task name='t'/></workflow>");
        assert_eq!(workflow.tasks.len(), 1);
    }

    #[test]
    fn test_entities_and_cyclestr() {
        let xml = r#"<?xml version="1.0"?>
<!DOCTYPE workflow [
  <!ENTITY HOMEDIR "/home/user">
]>
<workflow workflowid="ent">
  <task name="a">
    <command>&HOMEDIR;/jobs/<cyclestr>@Y@m@d</cyclestr>.sh</command>
  </task>
</workflow>"#;
        let workflow = parse_str(xml);
        assert_eq!(workflow.tasks[0].command, "/home/user/jobs/@Y@m@d.sh");
    }

    #[test]
    fn test_cycles_and_resources() {
        let workflow = parse_str(BASIC);
        assert_eq!(
            workflow.cycles,
            vec![Cycle { group: Some("six".into()), text: "202301010000 202301020000 06:00:00".into() }]
        );
        assert_eq!(workflow.resources.len(), 2);
        assert_eq!(workflow.resources[0].key.as_deref(), Some("cores"));
        assert_eq!(workflow.resources[1].value, None);
    }

    #[test]
    fn test_malformed_xml_is_error() {
        let result = parse_document("<workflow><task>", &PathBuf::from("bad.xml"));
        assert!(matches!(result, Err(ParseError::Xml { .. })));
    }

    #[test]
    fn test_parse_missing_file_returns_none() {
        assert!(WorkflowParser::default().parse("/nonexistent/workflow.xml").is_none());
    }

    #[test]
    fn test_parse_directory_returns_none() {
        let temp_dir = tempdir().unwrap();
        assert!(WorkflowParser::default().parse(temp_dir.path()).is_none());
        assert!(matches!(
            WorkflowParser::default().try_parse(temp_dir.path()),
            Err(ParseError::IsDirectory(_))
        ));
    }

    #[test]
    fn test_parse_respects_size_ceiling() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("big.xml");
        fs::write(&path, BASIC).unwrap();

        let parser = WorkflowParser::new(16);
        assert!(parser.parse(&path).is_none());
        assert!(matches!(parser.try_parse(&path), Err(ParseError::TooLarge { .. })));
        assert!(WorkflowParser::default().parse(&path).is_some());
    }

    #[test]
    fn test_parse_malformed_file_returns_none() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("bad.xml");
        fs::write(&path, "<workflow><task name='a'></workflow>").unwrap();
        assert!(WorkflowParser::default().parse(&path).is_none());
    }

    #[test]
    fn test_parse_iso_timestamp_variants() {
        assert!(parse_iso_timestamp("2023-01-01T00:00:00Z").is_some());
        assert!(parse_iso_timestamp("2023-01-01T00:00:00.250Z").is_some());
        assert!(parse_iso_timestamp("2023-01-01 06:00:00").is_some());
        assert!(parse_iso_timestamp("2023-01-01").is_some());
        assert!(parse_iso_timestamp("2023-01-01T05:00:00+05:00").is_some());
        assert!(parse_iso_timestamp("").is_none());
        assert!(parse_iso_timestamp("not a date").is_none());

        let z = parse_iso_timestamp("2023-01-01T00:00:00Z").unwrap();
        let naive = parse_iso_timestamp("2023-01-01T00:00:00").unwrap();
        assert_eq!(z, naive);
    }

    #[test]
    fn test_derive_views_recomputes_after_change() {
        let mut workflow = parse_str(BASIC);
        workflow.tasks.remove(1);
        derive_views(&mut workflow);

        assert_eq!(workflow.statistics.total_tasks, 2);
        assert!(workflow.dependencies.is_empty());
        assert_eq!(workflow.task_groups.len(), 1);
        assert_eq!(workflow.tasks[1].visualization.position, Some(Position { x: 10, y: 0 }));
    }
}
