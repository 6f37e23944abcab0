//! Full rewrite of a container into a compact new image
//!
//! Sectors are laid out in the same order as Apache POI's
//! `POIFSFileSystem.writeFilesystem()`: large streams first, then the mini
//! stream, the directory, the MiniFAT, the DIFAT and finally the FAT. Because
//! the new allocation table starts empty every chain is contiguous and the
//! image can be written front to back without seeking.

use super::super::consts::*;
use super::super::directory::Directory;
use super::super::error::{OleError, OleResult};
use super::super::file::OleFile;
use super::super::header::Header;
use super::super::sat::AllocationTable;
use super::super::source::ByteSource;
use super::difat::DifatBuilder;
use fixedbitset::FixedBitSet;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Sector layout of a rewritten container
struct Layout {
    header: Header,
    /// Current chains and sizes of the streams kept in regular sectors, in
    /// the order they are written
    large: Vec<(Vec<u32>, u64)>,
    mini_stream: Vec<u8>,
    directory: Directory,
    minifat: AllocationTable,
    fat: AllocationTable,
    difat_blocks: Vec<Vec<u8>>,
}

impl<S: ByteSource> OleFile<S> {
    /// Write a compact copy of the container to `writer`
    ///
    /// Only streams reachable from the root are kept; the container itself is
    /// left unchanged and stays bound to its source.
    pub fn write_to<W: Write>(&mut self, writer: &mut W) -> OleResult<()> {
        let layout = self.plan_rewrite()?;
        let sector_size = self.sector_size();

        writer.write_all(&layout.header.to_bytes())?;

        for (chain, size) in &layout.large {
            let mut remaining = *size as usize;
            for &sector in chain {
                let mut block = self.read_sector(sector)?;
                // Bytes past the end of the stream are not carried over
                if remaining < sector_size {
                    block[remaining..].fill(0);
                }
                remaining = remaining.saturating_sub(sector_size);
                writer.write_all(&block)?;
            }
        }

        write_padded(writer, &layout.mini_stream, sector_size)?;
        write_padded(writer, &layout.directory.to_bytes(), sector_size)?;
        for block in layout.minifat.to_sectors(sector_size) {
            writer.write_all(&block)?;
        }
        for block in &layout.difat_blocks {
            writer.write_all(block)?;
        }

        let mut fat_blocks = layout.fat.to_sectors(sector_size);
        fat_blocks.resize(layout.header.num_fat_sectors as usize, vec![0xFF; sector_size]);
        for block in &fat_blocks {
            writer.write_all(block)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Atomically write a compact copy of the container to `path`
    ///
    /// The image goes to a temporary file in the target directory which then
    /// replaces `path`, so a failure never leaves a half-written file behind.
    pub fn save_as<P: AsRef<Path>>(&mut self, path: P) -> OleResult<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let temp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            self.write_to(&mut writer)?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| OleError::Io(e.error))?;

        log::debug!("saved container to {}", path.display());
        Ok(())
    }

    fn plan_rewrite(&mut self) -> OleResult<Layout> {
        let sector_size = self.sector_size();
        let mut fat = AllocationTable::with_limit(sector_size, self.options.max_sectors);
        let mut minifat = AllocationTable::new(MINI_SECTOR_SIZE);
        let mut directory = self.directory.clone();
        let mut mini_stream = Vec::new();
        let mut large = Vec::new();

        let streams = self.directory.stream_sids();
        let mut reachable = FixedBitSet::with_capacity(self.directory.len());
        for &sid in &streams {
            reachable.insert(sid as usize);
        }

        // Entries outside the tree keep their slot but no data
        for entry in self.directory.entries().iter().skip(1) {
            if !entry.is_storage() && !reachable.contains(entry.sid as usize) {
                directory.set_stream(entry.sid, ENDOFCHAIN, 0);
            }
        }

        for &sid in &streams {
            let size = self.entry_by_sid(sid)?.size;
            if size == 0 {
                directory.set_stream(sid, ENDOFCHAIN, 0);
            } else if self.is_mini(size) {
                let data = self.read_sid(sid)?;
                let start = minifat.allocate_bytes(data.len())?;
                mini_stream.resize(start as usize * MINI_SECTOR_SIZE, 0);
                mini_stream.extend_from_slice(&data);
                mini_stream.resize(mini_stream.len().next_multiple_of(MINI_SECTOR_SIZE), 0);
                directory.set_stream(sid, start, size);
            } else {
                let layout = self.stream_layout(sid)?;
                let start = fat.allocate(layout.chain.len())?;
                directory.set_stream(sid, start, size);
                large.push((layout.chain, size));
            }
        }

        let mini_start = fat.allocate_bytes(mini_stream.len())?;
        directory.set_stream(0, mini_start, mini_stream.len() as u64);

        let dir_sectors = directory.len().div_ceil(sector_size / DIRENTRY_SIZE);
        let dir_start = fat.allocate(dir_sectors)?;

        let minifat_sectors = minifat.block_count(sector_size);
        let minifat_start = fat.allocate(minifat_sectors)?;

        // The FAT and DIFAT describe their own sectors; iterate until the
        // counts are stable
        let entries_per_sector = sector_size / 4;
        let used = fat.len();
        let (mut n_fat, mut n_difat) = (0usize, 0usize);
        loop {
            let new_fat = (used + n_fat + n_difat).div_ceil(entries_per_sector);
            let new_difat = DifatBuilder::sectors_for(sector_size, new_fat);
            if new_fat == n_fat && new_difat == n_difat {
                break;
            }
            n_fat = new_fat;
            n_difat = new_difat;
        }

        let difat_sectors = (0..n_difat)
            .map(|_| fat.reserve(DIFSECT))
            .collect::<OleResult<Vec<_>>>()?;
        let fat_sectors = (0..n_fat)
            .map(|_| fat.reserve(FATSECT))
            .collect::<OleResult<Vec<_>>>()?;

        let mut difat = DifatBuilder::new(sector_size);
        difat.set_fat_sectors(&fat_sectors);
        let difat_blocks = difat.generate(&difat_sectors);

        let mut header = Header::new(&self.options);
        header.clsid = self.header.clsid;
        header.transaction_signature = self.header.transaction_signature;
        header.num_dir_sectors = dir_sectors as u32;
        header.num_fat_sectors = n_fat as u32;
        header.first_dir_sector = dir_start;
        header.first_minifat_sector = minifat_start;
        header.num_minifat_sectors = minifat_sectors as u32;
        header.first_difat_sector = difat_sectors.first().copied().unwrap_or(ENDOFCHAIN);
        header.num_difat_sectors = n_difat as u32;
        header.fat_sectors = fat_sectors.iter().take(HEADER_DIFAT_SLOTS).copied().collect();

        log::debug!(
            "rewrite layout: {} sectors, {} FAT, {} DIFAT, {} bytes of mini stream",
            fat.len(),
            n_fat,
            n_difat,
            mini_stream.len()
        );

        Ok(Layout {
            header,
            large,
            mini_stream,
            directory,
            minifat,
            fat,
            difat_blocks,
        })
    }
}

/// Write `data` followed by zeros up to the next sector boundary
fn write_padded<W: Write>(writer: &mut W, data: &[u8], sector_size: usize) -> OleResult<()> {
    writer.write_all(data)?;
    let padding = data.len().next_multiple_of(sector_size) - data.len();
    if padding > 0 {
        writer.write_all(&vec![0u8; padding])?;
    }
    Ok(())
}
