//! Unified error types for olecore.
//!
//! This module provides a unified error type that encompasses errors from both
//! the compound container and the BIFF record layers.

// Submodule declarations
pub mod conversions;
pub mod types;

// Re-exports
pub use types::{Error, Result};
