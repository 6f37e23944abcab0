//! Common types and utilities shared across both layers.

// Submodule declarations
pub mod binary;
pub mod error;

// Re-exports for convenience
pub use error::{Error, Result};
