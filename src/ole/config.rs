//! Configuration for creating and mutating compound files.
//!
//! Options only influence containers created from scratch and the limits
//! applied while mutating; an opened file keeps the geometry stored in its
//! header.
//!
//! # Examples
//!
//! ```rust
//! use olecore::ole::OleOptions;
//!
//! // Version 3 layout: 512-byte sectors, 4096-byte mini stream cutoff
//! let options = OleOptions::default();
//!
//! // Version 4 layout
//! let options = OleOptions::new().with_sector_size(4096);
//! assert_eq!(options.sector_shift(), 12);
//! ```
use super::consts::*;
use super::error::{OleError, OleResult};
use serde::{Deserialize, Serialize};

/// Container geometry and limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OleOptions {
    /// Regular sector size (512 or 4096)
    pub sector_size: usize,
    /// Streams smaller than this many bytes live in the mini stream
    pub mini_stream_cutoff: u32,
    /// Upper bound on the number of regular sectors
    pub max_sectors: u32,
}

impl Default for OleOptions {
    fn default() -> Self {
        Self {
            sector_size: SECTOR_SIZE_V3,
            mini_stream_cutoff: DEFAULT_MINI_STREAM_CUTOFF,
            max_sectors: MAXREGSECT + 1,
        }
    }
}

impl OleOptions {
    /// Create options with the default version 3 layout.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the regular sector size.
    #[inline]
    pub fn with_sector_size(mut self, sector_size: usize) -> Self {
        self.sector_size = sector_size;
        self
    }

    /// Set the mini stream cutoff.
    #[inline]
    pub fn with_mini_stream_cutoff(mut self, cutoff: u32) -> Self {
        self.mini_stream_cutoff = cutoff;
        self
    }

    /// Limit the number of regular sectors a container may use.
    ///
    /// Mainly useful to exercise the size-limit paths without producing
    /// multi-gigabyte files.
    #[inline]
    pub fn with_max_sectors(mut self, max_sectors: u32) -> Self {
        self.max_sectors = max_sectors;
        self
    }

    /// Sector shift stored in the header (9 or 12)
    pub fn sector_shift(&self) -> u16 {
        self.sector_size.trailing_zeros() as u16
    }

    /// Major version implied by the sector size (3 or 4)
    pub fn major_version(&self) -> u16 {
        if self.sector_size == SECTOR_SIZE_V3 { 3 } else { 4 }
    }

    /// Check that the options describe a layout this crate can write
    pub fn validate(&self) -> OleResult<()> {
        if self.sector_size != SECTOR_SIZE_V3 && self.sector_size != SECTOR_SIZE_V4 {
            return Err(OleError::InvalidHeader(format!(
                "sector size must be 512 or 4096, got {}",
                self.sector_size
            )));
        }
        if self.mini_stream_cutoff == 0 || self.mini_stream_cutoff as usize % MINI_SECTOR_SIZE != 0
        {
            return Err(OleError::InvalidHeader(format!(
                "mini stream cutoff must be a positive multiple of {}, got {}",
                MINI_SECTOR_SIZE, self.mini_stream_cutoff
            )));
        }
        if self.max_sectors == 0 {
            return Err(OleError::ContainerTooLarge(
                "sector limit must allow at least one sector".to_string(),
            ));
        }
        Ok(())
    }
}
