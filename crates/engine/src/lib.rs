//! Weft engine library.
//!
//! This crate runs workflow graphs built from `weft-steps` executors and owns
//! everything that outlives a single step:
//!
//! - **Engine**: topological execution, route following, checkpointing
//! - **Status manager**: pause, resume, cancel and timeout transitions
//! - **Suspension protocol**: pause records, interactions and notifications
//! - **Timeout monitor**: periodic sweep applying timeout policies
//! - **Persistence**: the `PauseStore` trait over PostgreSQL or memory
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from environment variables
//! - [`db`]: Database connectivity, models and queries
//! - [`error`]: Custom error types with Axum integration
//! - [`handlers`]: HTTP route handlers
//! - [`state`]: Shared application state and service wiring
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use weft_engine::{config::EngineConfig, hil::LogNotifier, state::build_services, store::InMemoryStore};
//! use weft_steps::{Builtins, TracingObserver};
//!
//! let config = EngineConfig::default();
//! let services = build_services(
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(LogNotifier),
//!     Arc::new(TracingObserver),
//!     Builtins::default(),
//!     &config,
//! );
//! let execution = services.engine.start(&definition, input).await?;
//! ```

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod hil;
pub mod monitor;
pub mod result_ext;
pub mod state;
pub mod status;
pub mod store;

pub use error::{AppError, AppResult};
pub use result_ext::ResultExt;
