//! Built-in step executors.
//!
//! - `trigger` - workflow entry points
//! - `action` - in-process data actions
//! - `human_in_loop` - suspend for a human response
//! - `memory` - workflow key/value memory
//! - `ai`, `tool`, `external_action` - third-party integrations

mod action;
mod human_in_loop;
mod integration;
mod memory;
mod trigger;

pub use self::action::ActionExecutor;
pub use self::human_in_loop::{HumanInLoopConfig, HumanInLoopExecutor};
pub use self::integration::{
    CredentialProvider, Integration, IntegrationExecutor, IntegrationRequest, IntegrationSet,
};
pub use self::memory::{InMemoryBackend, MemoryBackend, MemoryExecutor, DEFAULT_WINDOW_SIZE};
pub use self::trigger::TriggerExecutor;

use std::sync::Arc;

use crate::flow::FlowControlExecutor;
use crate::registry::StepRegistry;

/// Collaborators the built-in executors are constructed with.
#[derive(Clone)]
pub struct Builtins {
    pub memory: Arc<dyn MemoryBackend>,
    pub integrations: IntegrationSet,
}

impl Default for Builtins {
    fn default() -> Self {
        Self {
            memory: Arc::new(InMemoryBackend::new()),
            integrations: IntegrationSet::new(),
        }
    }
}

/// Create a step registry with every built-in kind registered.
pub fn create_default_registry(builtins: Builtins) -> StepRegistry {
    let mut registry = StepRegistry::new();

    registry.register_executor(TriggerExecutor::new());
    registry.register_executor(ActionExecutor::new());
    registry.register_executor(FlowControlExecutor::new());
    registry.register_executor(HumanInLoopExecutor::new());
    registry.register_executor(MemoryExecutor::new(builtins.memory));
    registry.register_executor(IntegrationExecutor::ai(builtins.integrations.clone()));
    registry.register_executor(IntegrationExecutor::tool(builtins.integrations.clone()));
    registry.register_executor(IntegrationExecutor::external_action(builtins.integrations));

    registry
}
