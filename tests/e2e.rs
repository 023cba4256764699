//! End-to-end tests wiring the parser, monitor, state manager and bus
//! together through the public API.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde_json::json;
use tempfile::tempdir;

use rocotoviewer::config::Config;
use rocotoviewer::events::{EventBus, LOG_LINE_ADDED};
use rocotoviewer::logs::{parse_log_line, LogLevel};
use rocotoviewer::monitoring::FileMonitor;
use rocotoviewer::state::{StateManager, WorkflowChange};
use rocotoviewer::workflow::{DependencyEdge, Workflow, WorkflowParser};

const THREE_TASKS: &str = r#"<?xml version="1.0"?>
<!DOCTYPE workflow [
  <!ENTITY ROOT "/scratch/expt">
]>
<workflow realtime="F" scheduler="slurm" name="demo">
  <cycledef group="gfs">202301010000 202301020000 06:00:00</cycledef>
  <task name="t1">
    <command>&ROOT;/jobs/t1.sh</command>
  </task>
  <task name="t2">
    <command>&ROOT;/jobs/t2.sh</command>
    <dependency><taskdep task="t1"/></dependency>
  </task>
  <task name="t3">
    <command>&ROOT;/jobs/t3.sh</command>
  </task>
</workflow>
"#;

fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(text.as_bytes()).unwrap();
}

#[test]
fn test_three_task_workflow_with_one_edge() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("demo.xml");
    fs::write(&path, THREE_TASKS).unwrap();

    let workflow = Workflow::parse(&path).unwrap();
    assert_eq!(workflow.tasks.len(), 3);
    assert_eq!(
        workflow.dependencies,
        vec![DependencyEdge {
            source: "t2".to_string(),
            target: "t1".to_string(),
        }]
    );
    assert_eq!(workflow.tasks[0].command, "/scratch/expt/jobs/t1.sh");
    assert_eq!(workflow.name, "demo");
}

#[test]
fn test_reference_log_line() {
    let record = parse_log_line(
        "2023-10-27 10:00:00 [INFO] task=task1 cycle=20231027T0000Z status is succeeded. Task completed.",
    );

    assert_eq!(record.level, LogLevel::Info);
    assert_eq!(record.task_id.as_deref(), Some("task1"));
    assert_eq!(record.cycle.as_deref(), Some("20231027T0000Z"));
    assert!(record.status.as_deref().unwrap_or_default().contains("succeeded"));
    assert_eq!(
        record.timestamp,
        NaiveDate::from_ymd_opt(2023, 10, 27).and_then(|d| d.and_hms_opt(10, 0, 0))
    );
}

#[test]
fn test_appended_lines_reach_bus_and_state() {
    let temp_dir = tempdir().unwrap();
    let log = temp_dir.path().join("demo.log");
    fs::write(&log, "before registration\n").unwrap();

    let bus = Arc::new(EventBus::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.subscribe(LOG_LINE_ADDED, move |event| {
        let line = event.data["line"].as_str().unwrap_or_default().to_string();
        sink.lock().unwrap().push(line);
        Ok(())
    });

    let state = Arc::new(StateManager::default());
    let monitor = FileMonitor::new(&Config::default(), Arc::clone(&state), Some(bus));
    assert!(monitor.add_log_file_for_tailing(&log));

    assert_eq!(monitor.poll_once(), 0);
    let before = state.get_log_entries("demo").len();

    append(&log, "INFO task=t1 submitted\nWARNING task=t2 slow\nERROR task=t3 failed\n");
    assert_eq!(monitor.poll_once(), 3);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "INFO task=t1 submitted",
            "WARNING task=t2 slow",
            "ERROR task=t3 failed",
        ]
    );
    assert_eq!(state.get_log_entries("demo").len(), before + 3);
}

#[test]
fn test_missing_file_and_directory_yield_none() {
    let temp_dir = tempdir().unwrap();
    let parser = WorkflowParser::default();

    assert!(parser.parse(temp_dir.path().join("absent.xml")).is_none());
    assert!(parser.parse(temp_dir.path()).is_none());
}

#[test]
fn test_reparse_is_idempotent() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("demo.xml");
    fs::write(&path, THREE_TASKS).unwrap();

    let first = Workflow::parse(&path).unwrap();
    let second = Workflow::parse(&path).unwrap();
    assert_eq!(first.tasks, second.tasks);
    assert_eq!(first.cycles, second.cycles);
    assert_eq!(first.resources, second.resources);
    assert_eq!(first.dependencies, second.dependencies);
    assert_eq!(first.statistics, second.statistics);
}

#[test]
fn test_derived_data_consistency() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("demo.xml");
    fs::write(&path, THREE_TASKS).unwrap();

    let workflow = Workflow::parse(&path).unwrap();
    assert_eq!(workflow.statistics.total_tasks, workflow.tasks.len());
    assert_eq!(workflow.statistics.dependency_count, workflow.dependencies.len());
    for edge in &workflow.dependencies {
        assert!(workflow.get_task(&edge.source).is_some());
    }
}

#[test]
fn test_log_parser_is_total() {
    for input in ["", "   ", "no structure here", "INFO then ERROR then DEBUG", "\u{1f600} task="] {
        let record = parse_log_line(input);
        assert_eq!(record.raw, input);
    }
    assert_eq!(parse_log_line("INFO: retrying after ERROR").level, LogLevel::Error);
}

#[test]
fn test_tailing_across_separate_writes() {
    let temp_dir = tempdir().unwrap();
    let log = temp_dir.path().join("demo.log");
    fs::write(&log, "").unwrap();

    let state = Arc::new(StateManager::default());
    let monitor = FileMonitor::new(&Config::default(), Arc::clone(&state), None);
    monitor.add_log_file_for_tailing(&log);

    append(&log, "one\n");
    append(&log, "two\nthr");
    let mut delivered = monitor.poll_once();
    append(&log, "ee\nfour\n");
    delivered += monitor.poll_once();
    assert_eq!(delivered, 4);
    assert_eq!(monitor.poll_once(), 0);

    let lines: Vec<String> = state
        .get_log_entries("demo")
        .iter()
        .map(|entry| entry["raw"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(lines, vec!["one", "two", "three", "four"]);
}

#[test]
fn test_state_path_semantics() {
    let state = StateManager::default();
    state.set("a.b.c", json!(5));

    assert_eq!(state.get("a.b.c"), Some(json!(5)));
    assert_eq!(state.get_or("a.b.nonexistent", json!("fallback")), json!("fallback"));
    assert!(state.get("a.b").unwrap().get("c").is_some());
}

#[test]
fn test_single_notification_per_update() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("demo.xml");
    fs::write(&path, THREE_TASKS).unwrap();
    let workflow = Workflow::parse(&path).unwrap();

    let state = StateManager::default();
    let updates = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&updates);
    state.register_workflow_callback(move |_, _, change| {
        if matches!(change, WorkflowChange::Updated) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    });

    state.update_workflow("demo", workflow);
    assert_eq!(updates.load(Ordering::SeqCst), 1);
}

#[test]
fn test_polling_thread_delivers_lines() {
    let temp_dir = tempdir().unwrap();
    let log = temp_dir.path().join("live.log");
    fs::write(&log, "").unwrap();

    let mut config = Config::default();
    config.monitor.poll_interval = 1;
    let state = Arc::new(StateManager::default());
    let monitor = FileMonitor::new(&config, Arc::clone(&state), None);
    monitor.add_log_file_for_tailing(&log);
    monitor.start().unwrap();

    append(&log, "INFO task=t1 running\n");
    let deadline = Instant::now() + Duration::from_secs(10);
    while state.get_log_entries("live").is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    monitor.stop();

    assert_eq!(state.get_log_entries("live").len(), 1);
}

#[test]
fn test_duplicate_task_ids_are_kept() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("dup.xml");
    fs::write(
        &path,
        r#"<workflow>
  <task name="a"><command>first.sh</command></task>
  <task name="a"><command>second.sh</command></task>
  <task name="b"><command>b.sh</command><dependency><taskdep task="a"/></dependency></task>
</workflow>"#,
    )
    .unwrap();

    let workflow = Workflow::parse(&path).unwrap();
    assert_eq!(workflow.tasks.len(), 3);
    assert_eq!(workflow.statistics.total_tasks, 3);
    assert_eq!(workflow.get_task("a").unwrap().command, "first.sh");
    assert_eq!(workflow.task_groups.len(), 1);
    assert_eq!(workflow.task_groups[0].tasks, vec!["a", "a", "b"]);
    assert_ne!(workflow.tasks[0].visualization.position, workflow.tasks[1].visualization.position);

    let state = StateManager::default();
    state.update_workflow("dup", workflow);
    assert_eq!(state.get_workflow_stats("dup").unwrap().total_tasks, 3);
    assert_eq!(state.get_workflow_data("dup").unwrap().tasks.len(), 3);
    assert_eq!(state.get_session_stats().total_tasks, 3);
}
