//! Workflow and session statistics kept alongside stored workflows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::workflow::Workflow;

/// Normalized task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBucket {
    Success,
    Failed,
    Running,
    Queued,
    Other,
}

impl StatusBucket {
    /// Buckets a raw status value, ignoring case.
    pub fn of(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "success" | "succeeded" | "completed" => StatusBucket::Success,
            "failed" | "error" | "dead" => StatusBucket::Failed,
            "running" | "active" | "r" => StatusBucket::Running,
            "queued" | "pending" | "q" | "submitted" => StatusBucket::Queued,
            _ => StatusBucket::Other,
        }
    }
}

/// Per-workflow task counts, recomputed on every update.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct WorkflowStats {
    pub total_tasks: usize,
    /// Task counts keyed by lower-cased status
    pub status_counts: BTreeMap<String, usize>,
    pub successful_tasks: usize,
    pub failed_tasks: usize,
    pub running_tasks: usize,
    pub queued_tasks: usize,
    /// Successful tasks as a percentage of all tasks, 0 when there are none
    pub completion_percentage: f64,
}

impl WorkflowStats {
    pub fn from_workflow(workflow: &Workflow) -> Self {
        let mut stats = WorkflowStats {
            total_tasks: workflow.tasks.len(),
            ..Self::default()
        };

        for task in &workflow.tasks {
            let status = task.status().to_ascii_lowercase();
            match StatusBucket::of(&status) {
                StatusBucket::Success => stats.successful_tasks += 1,
                StatusBucket::Failed => stats.failed_tasks += 1,
                StatusBucket::Running => stats.running_tasks += 1,
                StatusBucket::Queued => stats.queued_tasks += 1,
                StatusBucket::Other => {}
            }
            *stats.status_counts.entry(status).or_insert(0) += 1;
        }

        if stats.total_tasks > 0 {
            stats.completion_percentage =
                stats.successful_tasks as f64 / stats.total_tasks as f64 * 100.0;
        }
        stats
    }
}

/// Totals across every stored workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SessionStats {
    pub total_workflows: usize,
    pub total_tasks: usize,
    pub status_counts: BTreeMap<String, usize>,
}

impl SessionStats {
    /// Sums per-workflow stats. `workflows` counts every stored entry,
    /// including ones without stats.
    pub fn aggregate<'a>(workflows: usize, stats: impl IntoIterator<Item = &'a WorkflowStats>) -> Self {
        let mut session = SessionStats {
            total_workflows: workflows,
            ..Self::default()
        };
        for workflow in stats {
            session.total_tasks += workflow.total_tasks;
            for (status, count) in &workflow.status_counts {
                *session.status_counts.entry(status.clone()).or_insert(0) += count;
            }
        }
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Task;

    fn workflow(statuses: &[&str]) -> Workflow {
        let mut workflow = Workflow::new("wf");
        for (i, status) in statuses.iter().enumerate() {
            workflow
                .tasks
                .push(Task::new(format!("t{}", i)).with_attribute("status", *status));
        }
        workflow
    }

    #[test]
    fn test_status_buckets() {
        assert_eq!(StatusBucket::of("SUCCEEDED"), StatusBucket::Success);
        assert_eq!(StatusBucket::of("Dead"), StatusBucket::Failed);
        assert_eq!(StatusBucket::of("R"), StatusBucket::Running);
        assert_eq!(StatusBucket::of("SUBMITTED"), StatusBucket::Queued);
        assert_eq!(StatusBucket::of("unknown"), StatusBucket::Other);
    }

    #[test]
    fn test_workflow_stats() {
        let stats = WorkflowStats::from_workflow(&workflow(&["SUCCEEDED", "succeeded", "FAILED", "RUNNING"]));
        assert_eq!(stats.total_tasks, 4);
        assert_eq!(stats.successful_tasks, 2);
        assert_eq!(stats.failed_tasks, 1);
        assert_eq!(stats.running_tasks, 1);
        assert_eq!(stats.status_counts["succeeded"], 2);
        assert_eq!(stats.completion_percentage, 50.0);
    }

    #[test]
    fn test_empty_workflow_has_zero_completion() {
        let stats = WorkflowStats::from_workflow(&Workflow::new("empty"));
        assert_eq!(stats.total_tasks, 0);
        assert_eq!(stats.completion_percentage, 0.0);
    }

    #[test]
    fn test_tasks_without_status_count_as_unknown() {
        let mut wf = Workflow::new("wf");
        wf.tasks.push(Task::new("a"));
        let stats = WorkflowStats::from_workflow(&wf);
        assert_eq!(stats.status_counts["unknown"], 1);
    }

    #[test]
    fn test_session_aggregate() {
        let a = WorkflowStats::from_workflow(&workflow(&["queued", "running"]));
        let b = WorkflowStats::from_workflow(&workflow(&["running"]));
        let session = SessionStats::aggregate(3, [&a, &b]);

        assert_eq!(session.total_workflows, 3);
        assert_eq!(session.total_tasks, 3);
        assert_eq!(session.status_counts["running"], 2);
        assert_eq!(session.status_counts["queued"], 1);
    }
}
