//! OLE2 (Compound File Binary) containers
//!
//! A compound file is a small filesystem inside one file: fixed-size sectors
//! linked into chains by a FAT, a mini stream with its own MiniFAT for small
//! streams, and a directory of storages and streams. The children of each
//! storage form a sibling tree, which the writer builds as two all-black
//! chains around the middle child.
//! [`OleFile`] reads such containers from any [`ByteSource`], edits them
//! transactionally and writes them back either in place or as a compact
//! rewrite.

/// Constants for the compound file format
pub mod consts;

/// Container creation options
pub mod config;

/// Error types for container operations
pub mod error;

/// Byte sources backing a container
pub mod source;

/// File header
pub mod header;

/// Sector allocation tables (FAT and MiniFAT)
pub mod sat;

/// Directory entries and the directory tree
pub mod directory;

/// Container engine
mod file;

/// Stream reading and writing
mod stream;

/// Saving containers
pub mod writer;

/// BIFF record streams stored inside containers
pub mod xls;

pub use config::OleOptions;
pub use directory::{Directory, DirectoryEntry, EntryKind};
pub use error::{OleError, OleResult};
pub use file::{OleFile, is_ole_file};
pub use header::Header;
pub use sat::AllocationTable;
pub use source::{ByteSource, FileSource, MemorySource, ReaderSource};
pub use stream::{Recovered, StreamReader, WriteMode};
pub use writer::SaveOutcome;
