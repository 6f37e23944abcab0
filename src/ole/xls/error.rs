//! Error types for the BIFF record layer

use crate::common::binary::BinaryError;
use crate::ole::OleError;
use thiserror::Error;

/// Result type alias for record operations
pub type XlsResult<T> = Result<T, XlsError>;

/// Errors that can occur while reading, decoding or writing BIFF records
#[derive(Error, Debug)]
pub enum XlsError {
    /// I/O error of the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error of the compound container holding the record stream
    #[error("Container error: {0}")]
    Ole(#[from] OleError),

    /// The stream ended inside a record header or payload
    #[error(
        "Truncated record 0x{sid:04X} at offset {offset}: expected {expected} bytes, {available} available"
    )]
    TruncatedRecord {
        sid: u16,
        offset: u64,
        expected: usize,
        available: usize,
    },

    /// A record payload does not match the layout of its type
    #[error("Invalid record 0x{record_type:04X}: {message}")]
    InvalidRecord { record_type: u16, message: String },

    /// A fixed-size payload or field has the wrong length
    #[error("Invalid length: expected {expected}, found {found}")]
    InvalidLength { expected: usize, found: usize },

    /// A string field could not be decoded
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl From<BinaryError> for XlsError {
    fn from(err: BinaryError) -> Self {
        match err {
            BinaryError::InsufficientData {
                expected,
                available,
            } => XlsError::InvalidLength {
                expected,
                found: available,
            },
            BinaryError::ParseError(message) => XlsError::Encoding(message),
        }
    }
}
