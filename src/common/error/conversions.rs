//! Error conversion implementations.
//!
//! This module contains From trait implementations to convert from the
//! per-layer error types to the unified Error type.

use super::types::Error;
use crate::ole::OleError;
use crate::ole::xls::XlsError;

impl From<OleError> for Error {
    fn from(err: OleError) -> Self {
        match err {
            OleError::Io(e) => Error::Io(e),
            OleError::EntryNotFound { .. } => Error::ComponentNotFound(err.to_string()),
            OleError::CorruptChain { .. } | OleError::CorruptDirectory { .. } => {
                Error::CorruptedFile(err.to_string())
            },
            other => Error::Container(other),
        }
    }
}

impl From<XlsError> for Error {
    fn from(err: XlsError) -> Self {
        match err {
            XlsError::Io(e) => Error::Io(e),
            XlsError::Ole(e) => Error::from(e),
            XlsError::TruncatedRecord { .. } => Error::CorruptedFile(err.to_string()),
            other => Error::Record(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_component() {
        let err = Error::from(OleError::EntryNotFound {
            segment: "Workbook".to_string(),
        });
        assert!(matches!(err, Error::ComponentNotFound(ref s) if s.contains("Workbook")));
    }

    #[test]
    fn test_nested_ole_error_unwraps() {
        let err = Error::from(XlsError::Ole(OleError::CorruptChain {
            sector: 7,
            reason: "loop".to_string(),
        }));
        assert!(matches!(err, Error::CorruptedFile(_)));
    }
}
