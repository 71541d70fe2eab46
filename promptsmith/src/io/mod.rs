//! Side-effecting helpers: configuration, generation backends, persistence.

pub mod artifacts;
pub mod backend;
pub mod config;
pub mod process;
pub mod prompt;
pub mod transcript;
