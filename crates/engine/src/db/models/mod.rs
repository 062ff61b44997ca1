//! Database models for executions, pauses and interactions.

pub mod execution;
pub mod interaction;
pub mod pause;

pub use execution::{WorkflowExecution, WorkflowStatus};
pub use interaction::{Interaction, InteractionStatus};
pub use pause::{PauseRecord, PauseStatus, PauseTransition};
