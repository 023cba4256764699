//! Application State Module
//!
//! Shared, thread-safe state tree for workflows, UI selections and session
//! data.
//!
//! # Components
//!
//! - [`StateManager`]: Dot-path state tree with change notification
//! - [`WorkflowStats`]: Per-workflow task counts
//! - [`SessionStats`]: Totals across stored workflows

pub mod manager;
pub mod stats;

pub use manager::{
    ChangeCallback, StateManager, WorkflowCallback, WorkflowChange, MAX_LOG_ENTRIES,
    MAX_RECENT_FILES,
};
pub use stats::{SessionStats, StatusBucket, WorkflowStats};
