//! Error types for the compound container layer

use thiserror::Error;

/// Result type alias for container operations
pub type OleResult<T> = Result<T, OleError>;

/// Errors raised by the compound container engine.
///
/// Structural corruption (`InvalidHeader`, `CorruptChain`, `CorruptDirectory`)
/// is always propagated; the only path that tolerates it is the explicitly
/// invoked recovery read.
#[derive(Error, Debug)]
pub enum OleError {
    /// I/O error of the backing byte source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The fixed header is not a valid compound file header
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// A sector chain is structurally damaged
    #[error("Corrupt sector chain at sector {sector}: {reason}")]
    CorruptChain { sector: u32, reason: String },

    /// The directory tree is structurally damaged
    #[error("Corrupt directory at entry {sid}: {reason}")]
    CorruptDirectory { sid: u32, reason: String },

    /// The container would exceed the format's sector index range
    #[error("Container too large: {0}")]
    ContainerTooLarge(String),

    /// An entry name exceeds the fixed name-field width
    #[error("Name '{name}' is {len} UTF-16 units long, the maximum is {max}")]
    NameTooLong { name: String, len: usize, max: usize },

    /// An entry name is empty or contains a reserved character
    #[error("Invalid entry name '{0}'")]
    InvalidName(String),

    /// A path segment could not be resolved
    #[error("Entry not found: '{segment}'")]
    EntryNotFound { segment: String },

    /// A sibling with the same (case-insensitive) name already exists
    #[error("Duplicate entry name '{name}' in storage '{parent}'")]
    DuplicateName { parent: String, name: String },

    /// The entry exists but is not a stream
    #[error("'{0}' is not a stream")]
    NotAStream(String),

    /// The entry exists but is not a storage
    #[error("'{0}' is not a storage")]
    NotAStorage(String),

    /// A storage that still has children cannot be removed
    #[error("Storage '{0}' is not empty")]
    StorageNotEmpty(String),

    /// In-place save was requested on a source that cannot be written back
    #[error("In-place write is not supported: {0}")]
    UnsupportedInPlaceWrite(String),
}

impl From<crate::common::binary::BinaryError> for OleError {
    fn from(err: crate::common::binary::BinaryError) -> Self {
        OleError::InvalidHeader(err.to_string())
    }
}

impl OleError {
    pub(crate) fn chain(sector: u32, reason: impl Into<String>) -> Self {
        OleError::CorruptChain {
            sector,
            reason: reason.into(),
        }
    }

    pub(crate) fn directory(sid: u32, reason: impl Into<String>) -> Self {
        OleError::CorruptDirectory {
            sid,
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(segment: &str) -> Self {
        OleError::EntryNotFound {
            segment: segment.to_string(),
        }
    }

    /// Whether this error signals structural damage of the container
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            OleError::InvalidHeader(_)
                | OleError::CorruptChain { .. }
                | OleError::CorruptDirectory { .. }
        )
    }
}
