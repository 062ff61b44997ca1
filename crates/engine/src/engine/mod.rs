//! Workflow engine: graph definition, checkpointing and the orchestration loop.

pub mod checkpoint;
pub mod graph;
pub mod orchestrator;

pub use checkpoint::{Checkpoint, StepRecord};
pub use graph::{EdgeDefinition, NodeDefinition, WorkflowDefinition};
pub use orchestrator::WorkflowEngine;
