//! tf-core: shared error type and engine configuration.
//!
//! This crate is the foundational dependency for all other tf-* crates. It
//! carries the unified [`Error`] every action returns and the
//! [`EngineConfig`](config::EngineConfig) loaded by the binary.

pub mod config;
pub mod error;

// Re-export the most commonly used items at the crate root.
pub use config::EngineConfig;
pub use error::{Error, Result};
