//! Database queries, organized by table.

pub mod execution;
pub mod interaction;
pub mod pause;
