//! Saving changes back into the container's own file
//!
//! Only the sectors touched since the last save are written, together with
//! the MiniFAT, the directory, the FAT and the header. Containers that use
//! DIFAT sectors, or whose FAT would outgrow the 109 header slots, are
//! rewritten instead.

use super::super::consts::*;
use super::super::error::{OleError, OleResult};
use super::super::file::OleFile;
use super::super::source::ByteSource;
use super::SaveOutcome;
use std::path::Path;

impl<S: ByteSource> OleFile<S> {
    /// Persist all changes to the backing source
    ///
    /// Fails with [`OleError::UnsupportedInPlaceWrite`] if the source is not
    /// writable. When the FAT cannot be updated in place the container is
    /// rewritten to its path and reloaded, reported as
    /// [`SaveOutcome::Rewritten`].
    pub fn save_in_place(&mut self) -> OleResult<SaveOutcome> {
        if !self.source.is_writable() {
            return Err(OleError::UnsupportedInPlaceWrite(
                "the container was not opened for writing".to_string(),
            ));
        }
        if !self.difat_sectors.is_empty() {
            return self.rewrite_source();
        }

        let fat = self.fat.clone();
        let directory = self.directory.clone();
        let header = self.header.clone();
        let fat_sectors = self.fat_sectors.clone();

        match self.prepare_in_place() {
            Ok(true) => {
                self.commit_in_place()?;
                Ok(SaveOutcome::InPlace)
            },
            Ok(false) => {
                self.fat = fat;
                self.directory = directory;
                self.header = header;
                self.fat_sectors = fat_sectors;
                log::warn!(
                    "FAT needs more than {} sectors, rewriting the whole container",
                    HEADER_DIFAT_SLOTS
                );
                self.rewrite_source()
            },
            Err(err) => {
                self.fat = fat;
                self.directory = directory;
                self.header = header;
                self.fat_sectors = fat_sectors;
                Err(err)
            },
        }
    }

    /// Lay out the mini stream, MiniFAT, directory and FAT in the current
    /// sector space
    ///
    /// Returns `false` if the FAT would need DIFAT sectors.
    fn prepare_in_place(&mut self) -> OleResult<bool> {
        let sector_size = self.sector_size();

        // A loaded mini stream may have changed; store it in the root chain
        if let Some(mini_stream) = self.mini_stream.clone() {
            let root = self.directory.root();
            let old_start = if root.size == 0 {
                ENDOFCHAIN
            } else {
                root.start_sector
            };
            let start = self
                .fat
                .resize(old_start, mini_stream.len().div_ceil(sector_size))?;
            let chain = self.fat.chain_of(start)?;
            self.store(&chain, false, &mini_stream, 0);
            self.directory
                .set_stream(0, start, mini_stream.len() as u64);
        }

        let minifat_blocks = self.minifat.to_sectors(sector_size);
        let old_start = if self.header.num_minifat_sectors == 0 {
            ENDOFCHAIN
        } else {
            self.header.first_minifat_sector
        };
        let minifat_start = self.fat.resize(old_start, minifat_blocks.len())?;
        self.store_blocks(minifat_start, &minifat_blocks)?;
        self.header.first_minifat_sector = minifat_start;
        self.header.num_minifat_sectors = minifat_blocks.len() as u32;

        let dir_bytes = self.directory.to_bytes();
        let dir_blocks: Vec<Vec<u8>> = dir_bytes.chunks(sector_size).map(<[u8]>::to_vec).collect();
        let dir_start = self.fat.resize(self.header.first_dir_sector, dir_blocks.len())?;
        self.store_blocks(dir_start, &dir_blocks)?;
        self.header.first_dir_sector = dir_start;
        self.header.num_dir_sectors = dir_blocks.len() as u32;

        // Reserving a FAT sector can itself require another FAT sector
        while self.fat.block_count(sector_size) > self.fat_sectors.len() {
            if self.fat_sectors.len() >= HEADER_DIFAT_SLOTS {
                return Ok(false);
            }
            let sector = self.fat.reserve(FATSECT)?;
            self.fat_sectors.push(sector);
        }

        self.header.num_fat_sectors = self.fat_sectors.len() as u32;
        self.header.fat_sectors = self.fat_sectors.clone();
        self.header.first_difat_sector = ENDOFCHAIN;
        self.header.num_difat_sectors = 0;
        Ok(true)
    }

    fn store_blocks(&mut self, start: u32, blocks: &[Vec<u8>]) -> OleResult<()> {
        let chain = self.fat.chain_of(start)?;
        for (&sector, block) in chain.iter().zip(blocks) {
            self.dirty.insert(sector, block.clone());
        }
        Ok(())
    }

    fn commit_in_place(&mut self) -> OleResult<()> {
        let sector_size = self.sector_size();
        let offset = |sector: u32| (sector as u64 + 1) * sector_size as u64;

        let mut sectors: Vec<u32> = self
            .dirty
            .keys()
            .copied()
            .filter(|&sector| {
                // Freed sectors and sectors now holding the FAT are skipped
                !matches!(self.fat.next(sector), Ok(FREESECT) | Ok(FATSECT) | Err(_))
            })
            .collect();
        sectors.sort_unstable();
        for sector in sectors {
            if let Some(block) = self.dirty.get(&sector) {
                self.source.write_at(offset(sector), block)?;
            }
        }

        let mut fat_blocks = self.fat.to_sectors(sector_size);
        fat_blocks.resize(self.fat_sectors.len(), vec![0xFF; sector_size]);
        for (&sector, block) in self.fat_sectors.iter().zip(&fat_blocks) {
            self.source.write_at(offset(sector), block)?;
        }

        // Header last, after everything it references
        self.source.write_at(0, &self.header.to_bytes())?;

        let end = self
            .fat
            .highest_used()
            .map_or(sector_size as u64, |sector| offset(sector) + sector_size as u64);
        self.source.set_size(end)?;
        self.source.flush()?;

        let written = self.dirty.len();
        self.dirty.clear();
        log::debug!(
            "saved in place: {} data sectors, {} FAT sectors, {} bytes",
            written,
            self.fat_sectors.len(),
            end
        );
        Ok(())
    }

    /// Rewrite the container to its own path and reload it
    fn rewrite_source(&mut self) -> OleResult<SaveOutcome> {
        let path = self
            .source
            .location()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                OleError::UnsupportedInPlaceWrite(
                    "the byte source has no path to rewrite".to_string(),
                )
            })?;
        self.save_as(&path)?;
        self.source.reload()?;
        self.load()?;
        Ok(SaveOutcome::Rewritten)
    }
}
