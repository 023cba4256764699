//! Event Distribution Module
//!
//! Decouples producers (file monitor, state manager) from consumers such
//! as a terminal UI.
//!
//! Prefer constructing one [`EventBus`] at the top level and passing it
//! down; [`global`] exists for call sites that cannot receive one.

pub mod bus;

pub use bus::{
    global, publish_event, subscribe_to_event, Event, EventBus, EventCategory, EventHandler,
    HandlerId,
};

/// Topic for each line read from a tailed log file.
pub const LOG_LINE_ADDED: &str = "log_line_added";
/// Topic for raw filesystem changes under a watched path.
pub const FILE_CHANGED: &str = "file_changed";
pub const WORKFLOW_ADDED: &str = "workflow_added";
pub const WORKFLOW_UPDATED: &str = "workflow_updated";
pub const WORKFLOW_REMOVED: &str = "workflow_removed";
