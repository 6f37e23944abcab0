//! Unified error types for olecore.
//!
//! This module provides a unified error type that encompasses errors from both
//! the compound container layer and the BIFF record layer, presenting a
//! consistent API to callers that use both.
use thiserror::Error;

/// Main error type for olecore operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Compound container error
    #[error("Container error: {0}")]
    Container(crate::ole::OleError),

    /// BIFF record stream error
    #[error("Record error: {0}")]
    Record(crate::ole::xls::XlsError),

    /// Corrupted or malformed input
    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    /// Stream, storage or record not found
    #[error("Component not found: {0}")]
    ComponentNotFound(String),
}

/// Result type for olecore operations.
pub type Result<T> = std::result::Result<T, Error>;
