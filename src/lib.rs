//! olecore - the binary container engine underneath legacy Office documents
//!
//! This library implements the two layers every legacy Office reader and
//! writer sits on:
//!
//! - **Compound File Binary (OLE2) containers**: a sector-allocated structured
//!   storage with a FAT, a mini stream for small streams, and a directory tree
//!   of storages and streams. Containers can be read, mutated (streams grown,
//!   shrunk, added, removed) and saved either in place or by a full,
//!   defragmenting rewrite.
//! - **BIFF record streams**: the tagged, length-prefixed record format of the
//!   legacy spreadsheet binary format, including CONTINUE records, and an
//!   aggregate that stores cell value records sparsely and collapses blank runs
//!   into MULBLANK records on output.
//!
//! # Example - Reading a stream
//!
//! ```no_run
//! use std::fs::File;
//! use olecore::ole::OleFile;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = File::open("book.xls")?;
//! let mut ole = OleFile::open(file)?;
//!
//! for path in ole.list_streams() {
//!     println!("Stream: {}", path.join("/"));
//! }
//!
//! let workbook = ole.read(&["Workbook"])?;
//! println!("Workbook stream: {} bytes", workbook.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Creating a container
//!
//! ```no_run
//! use olecore::ole::OleFile;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut ole = OleFile::new();
//! ole.write(&["Workbook"], &[0x09, 0x08, 0x10, 0x00])?;
//! ole.create_storage(&["ObjectPool"])?;
//! ole.write(&["ObjectPool", "_1234", "\u{1}Ole"], b"embedded")?;
//! ole.save_as("book.xls")?;
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Walking BIFF records
//!
//! ```no_run
//! use std::io::Cursor;
//! use olecore::ole::OleFile;
//! use olecore::ole::xls::{RecordReader, RecordTypeTable};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut ole = OleFile::open(std::fs::File::open("book.xls")?)?;
//! let table = RecordTypeTable::biff8();
//! let mut records = RecordReader::new(Cursor::new(ole.read(&["Workbook"])?));
//! while let Some(record) = records.next_record()? {
//!     println!("{} ({} bytes)", table.name(record.sid), record.data.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Threading
//!
//! A container instance is single-threaded: it owns its byte source and all
//! in-memory allocation state, and callers must serialize access to it.
//! Independent containers can be processed on independent threads.

/// Shared error types
pub mod common;

/// OLE2 (Compound File Binary) container engine and BIFF record layer
///
/// The `ole` module also contains the `xls` submodule with the BIFF record
/// codec, since BIFF workbook streams live inside OLE2 containers.
pub mod ole;

pub use common::{Error, Result};
pub use ole::{OleError, OleFile, OleOptions};
