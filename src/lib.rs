//! RocotoViewer - Rocoto Workflow Monitoring Core
//!
//! Parses Rocoto workflow definitions, follows their log files as they
//! grow, and keeps a shared state tree that a terminal UI renders from.
//!
//! # Architecture
//!
//! The library is organized into these modules:
//!
//! - [`workflow`]: Data model and XML parser for workflow definitions
//! - [`logs`]: Log line parsing, filtering and streaming buffers
//! - [`monitoring`]: Filesystem watching and log tailing
//! - [`state`]: Thread-safe application state with change notification
//! - [`events`]: Publish/subscribe event bus
//! - [`config`]: YAML configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rocotoviewer::config::Config;
//! use rocotoviewer::monitoring::FileMonitor;
//! use rocotoviewer::state::StateManager;
//! use rocotoviewer::Workflow;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let state = Arc::new(StateManager::new(&config));
//!
//!     // Parse a workflow and hand it to the state manager
//!     if let Some(workflow) = Workflow::parse("gfs.xml") {
//!         let id = workflow.id.clone();
//!         state.update_workflow(&id, workflow);
//!     }
//!
//!     // Follow its log
//!     let monitor = FileMonitor::new(&config, Arc::clone(&state), None);
//!     monitor.add_log_file_for_tailing("log/gfs.log");
//!     monitor.start()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod logs;
pub mod monitoring;
pub mod state;
pub mod workflow;

// Re-export commonly used types
pub use config::Config;
pub use events::{Event, EventBus};
pub use logs::{parse_log_line, LogRecord};
pub use monitoring::FileMonitor;
pub use state::StateManager;
pub use workflow::model::{Task, Workflow};
pub use workflow::parser::WorkflowParser;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "RocotoViewer";
