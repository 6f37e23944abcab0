//! Persisting a container
//!
//! Two strategies are available. A full rewrite ([`OleFile::write_to`],
//! [`OleFile::save_as`]) produces a compact image with contiguous chains and
//! works with any source. Saving in place ([`OleFile::save_in_place`]) writes
//! only what changed and requires a writable file source.
//!
//! [`OleFile::write_to`]: super::OleFile::write_to
//! [`OleFile::save_as`]: super::OleFile::save_as
//! [`OleFile::save_in_place`]: super::OleFile::save_in_place

/// DIFAT (Double Indirect FAT) blocks
pub(crate) mod difat;

/// Compact rewrite
mod rewrite;

/// In-place save
mod in_place;


/// How [`save_in_place`](super::OleFile::save_in_place) persisted the changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Changed sectors were written into the existing file
    InPlace,
    /// The file was replaced by a compact rewrite and reloaded
    Rewritten,
}
