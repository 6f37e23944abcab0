//! BIFF record streams
//!
//! The legacy spreadsheet format stores each sheet as a stream of tagged
//! records inside a compound file. This module reads and writes such streams
//! ([`RecordReader`], [`RecordWriter`]), decodes the records needed to model
//! cell values ([`RecordTypeTable`], [`BiffRecord`]) and groups cell records
//! by row ([`ValueRecordsAggregate`]).

/// Error types for record processing
mod error;

/// Record stream reading
mod records;

/// Record stream writing
mod writer;

/// Cell value records
mod cell;

/// Typed records and the record type table
mod biff;

/// Row-grouped cell records
mod aggregate;

pub use aggregate::ValueRecordsAggregate;
pub use biff::{
    BOF_SID, BiffRecord, BofRecord, Decoder, EOF_SID, MULBLANK_SID, MulBlankRecord,
    RecordTypeTable,
};
pub use cell::{
    BLANK_SID, BOOLERR_SID, CellRecord, FORMULA_SID, FormulaValue, LABEL_SID, LABELSST_SID,
    NUMBER_SID, RK_SID, rk_value,
};
pub use error::{XlsError, XlsResult};
pub use records::{
    CONTINUE_SID, LogicalRecord, MAX_RECORD_DATA_SIZE, RECORD_HEADER_SIZE, RecordHeader,
    RecordReader,
};
pub use writer::RecordWriter;
