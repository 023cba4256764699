//! Workflow Definition Module
//!
//! Data structures for Rocoto workflows and the XML parser that builds them.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Task, Dependency, Workflow)
//! - [`parser`]: XML loading and derived views

pub mod model;
pub mod parser;

pub use model::{
    Cycle, Dependency, DependencyEdge, Envar, Position, Resource, Task, TaskGroup, Timeline,
    Workflow, WorkflowStatistics,
};
pub use parser::{parse_iso_timestamp, WorkflowParser};
