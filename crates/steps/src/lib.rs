//! Weft step library.
//!
//! This crate provides the step-level building blocks of the Weft engine:
//! - Execution context and result types
//! - The step executor trait and registry
//! - The lifecycle wrapper that isolates step faults
//! - The condition expression language
//! - Flow-control steps (conditional, switch, loops, merge, split, filter)
//! - Built-in step kinds and the collaborator traits they use

pub mod context;
pub mod error;
pub mod executors;
pub mod expression;
pub mod flow;
pub mod lifecycle;
pub mod observer;
pub mod registry;
pub mod result;

pub use context::{EdgeRef, ExecutionContext, GraphMetadata, JsonMap};
pub use error::StepError;
pub use executors::{create_default_registry, Builtins};
pub use flow::FlowControlExecutor;
pub use lifecycle::StepRunner;
pub use observer::{
    ExecutionObserver, LifecycleEvent, LifecycleKind, RecordingObserver, StepEvent,
    TracingObserver,
};
pub use registry::{StepExecutor, StepRegistry};
pub use result::{
    ExecutionResult, ExecutionStatus, InteractionSpec, InteractionType, PauseRequest, Route,
    TimeoutAction, MAX_TIMEOUT_HOURS, RESULT_KEY,
};
