//! Application state for the Weft engine server.
//!
//! Shared by all handlers through Axum's state management.

use crate::config::EngineConfig;
use crate::db::DbPool;
use crate::engine::WorkflowEngine;
use crate::hil::{notify::Notifier, SuspensionService};
use crate::monitor::TimeoutMonitor;
use crate::status::WorkflowStatusManager;
use crate::store::PauseStore;
use std::sync::Arc;
use weft_steps::{create_default_registry, Builtins, ExecutionObserver};

/// The engine and its timeout monitor, wired over one store.
pub struct Services {
    pub engine: Arc<WorkflowEngine>,
    pub monitor: Arc<TimeoutMonitor>,
}

/// Wire the status manager, suspension protocol, engine and timeout monitor.
pub fn build_services(
    store: Arc<dyn PauseStore>,
    notifier: Arc<dyn Notifier>,
    observer: Arc<dyn ExecutionObserver>,
    builtins: Builtins,
    config: &EngineConfig,
) -> Services {
    let status = Arc::new(
        WorkflowStatusManager::new(store)
            .with_observer(observer)
            .with_default_timeout_hours(config.default_timeout_hours),
    );
    let suspension = Arc::new(SuspensionService::new(status.clone()).with_notifier(notifier));
    let registry = Arc::new(create_default_registry(builtins));
    let engine = Arc::new(WorkflowEngine::new(registry, suspension.clone()));
    let monitor = Arc::new(
        TimeoutMonitor::new(status, suspension)
            .with_resumer(engine.clone())
            .with_interval(config.sweep_interval())
            .with_warning_window(config.warning_window()),
    );

    Services { engine, monitor }
}

#[derive(Clone)]
pub struct AppState {
    /// Workflow engine (start, resume, cancel, respond)
    pub engine: Arc<WorkflowEngine>,

    /// Database pool, absent when running on the in-memory store
    pub db: Option<DbPool>,

    /// Engine configuration
    pub config: Arc<EngineConfig>,

    /// Whether interaction notifications go to NATS
    pub nats_connected: bool,

    /// Server start time for uptime calculation
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(engine: Arc<WorkflowEngine>, db: Option<DbPool>, config: EngineConfig) -> Self {
        Self {
            engine,
            db,
            config: Arc::new(config),
            nats_connected: false,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_nats(mut self, connected: bool) -> Self {
        self.nats_connected = connected;
        self
    }

    pub fn status(&self) -> &Arc<WorkflowStatusManager> {
        self.engine.status()
    }

    /// Get the server uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
