//! Configuration loading from environment variables.
//!
//! Uses the `envy` crate for type-safe environment variable parsing.

mod app;
mod database;

pub use app::EngineConfig;
pub use database::DatabaseConfig;
