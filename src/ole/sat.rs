//! Sector allocation tables (FAT and MiniFAT)
//!
//! An allocation table maps each sector index to the next sector of the chain
//! it belongs to. The same structure serves the regular FAT (sectors of 512 or
//! 4096 bytes) and the MiniFAT (64-byte mini sectors inside the mini stream).
//!
//! # Implementation Notes
//!
//! Based on Apache POI's BATBlock and POIFSFileSystem implementations.
//! - Regular sectors use positive chain values
//! - FAT sectors are marked with FATSECT (0xFFFFFFFD)
//! - DIFAT sectors are marked with DIFSECT (0xFFFFFFFC)
//! - End of chain is marked with ENDOFCHAIN (0xFFFFFFFE)
//! - Free sectors are marked with FREESECT (0xFFFFFFFF)
//!
//! Free sectors are reused (lowest index first) before the table is extended.
//! All mutating operations check their preconditions before touching the
//! table, so a failed call leaves it unchanged.

use super::consts::*;
use super::error::{OleError, OleResult};
use fixedbitset::FixedBitSet;

/// Allocation table over fixed-size sectors
#[derive(Debug, Clone)]
pub struct AllocationTable {
    /// Next-sector links, indexed by sector number
    entries: Vec<u32>,
    /// Size of the sectors this table describes
    sector_size: usize,
    /// Upper bound on the number of sectors the table may describe
    max_sectors: u32,
    /// All indices below this one are known to be in use
    free_hint: usize,
}

impl AllocationTable {
    /// Create an empty table for sectors of the given size
    pub fn new(sector_size: usize) -> Self {
        Self::with_limit(sector_size, MAXREGSECT + 1)
    }

    /// Create an empty table that refuses to grow beyond `max_sectors`
    pub fn with_limit(sector_size: usize, max_sectors: u32) -> Self {
        Self::from_entries(Vec::new(), sector_size, max_sectors)
    }

    /// Wrap existing table entries
    pub fn from_entries(entries: Vec<u32>, sector_size: usize, max_sectors: u32) -> Self {
        Self {
            entries,
            sector_size,
            max_sectors: max_sectors.min(MAXREGSECT + 1),
            free_hint: 0,
        }
    }

    /// Parse a table from its on-disk form (little-endian u32 entries)
    pub fn from_bytes(data: &[u8], sector_size: usize, max_sectors: u32) -> Self {
        let entries = data
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Self::from_entries(entries, sector_size, max_sectors)
    }

    /// Size in bytes of the sectors described by this table
    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    /// Number of sectors the table describes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table describes no sectors at all
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw table entries
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    /// Number of sectors currently marked free
    pub fn free_count(&self) -> usize {
        self.entries.iter().filter(|&&e| e == FREESECT).count()
    }

    /// Highest sector index that is not free
    pub fn highest_used(&self) -> Option<u32> {
        self.entries
            .iter()
            .rposition(|&e| e != FREESECT)
            .map(|idx| idx as u32)
    }

    /// Get the entry (next link or marker) stored for a sector
    pub fn next(&self, sector: u32) -> OleResult<u32> {
        self.entries.get(sector as usize).copied().ok_or_else(|| {
            OleError::chain(
                sector,
                format!("sector index out of range ({} sectors)", self.entries.len()),
            )
        })
    }

    /// Set the entry for a sector, growing the table with free entries if needed
    pub(crate) fn set_next(&mut self, sector: u32, value: u32) {
        let idx = sector as usize;
        if idx >= self.entries.len() {
            self.entries.resize(idx + 1, FREESECT);
        }
        self.entries[idx] = value;
        if value == FREESECT {
            self.free_hint = self.free_hint.min(idx);
        }
    }

    /// Follow a chain from `start` until ENDOFCHAIN
    ///
    /// Starting at ENDOFCHAIN yields an empty chain. Fails with
    /// [`OleError::CorruptChain`] if a link leaves the table, runs into a free
    /// or reserved sector, or visits a sector twice.
    pub fn chain_of(&self, start: u32) -> OleResult<Vec<u32>> {
        match self.walk(start) {
            (chain, None) => Ok(chain),
            (_, Some(err)) => Err(err),
        }
    }

    /// Best-effort walk that stops at the first bad link
    ///
    /// Returns every sector visited before the damage together with the
    /// problem found, if any.
    pub fn salvage_chain(&self, start: u32) -> (Vec<u32>, Option<OleError>) {
        self.walk(start)
    }

    fn walk(&self, start: u32) -> (Vec<u32>, Option<OleError>) {
        let mut chain = Vec::new();
        let mut visited = FixedBitSet::with_capacity(self.entries.len());
        let mut current = start;

        // The visited set bounds the walk by the table length
        while current != ENDOFCHAIN {
            let idx = current as usize;
            if idx >= self.entries.len() {
                let reason = format!(
                    "link points outside the table ({} sectors)",
                    self.entries.len()
                );
                return (chain, Some(OleError::chain(current, reason)));
            }
            if visited.put(idx) {
                return (
                    chain,
                    Some(OleError::chain(current, "sector visited twice, chain loops")),
                );
            }
            chain.push(current);

            current = match self.entries[idx] {
                FREESECT => {
                    return (
                        chain,
                        Some(OleError::chain(current, "chain runs into a free sector")),
                    );
                },
                FATSECT | DIFSECT => {
                    return (
                        chain,
                        Some(OleError::chain(current, "chain runs into a reserved sector")),
                    );
                },
                next => next,
            };
        }

        (chain, None)
    }

    /// Check that `count` more sectors can be handed out
    pub fn ensure_capacity(&self, count: usize) -> OleResult<()> {
        let growable = (self.max_sectors as usize).saturating_sub(self.entries.len());
        let available = self.free_count().saturating_add(growable);
        if count > available {
            return Err(OleError::ContainerTooLarge(format!(
                "{} sectors requested, only {} available within the limit of {} sectors",
                count, available, self.max_sectors
            )));
        }
        Ok(())
    }

    /// Allocate a chain of `count` sectors and return its first sector
    ///
    /// Returns ENDOFCHAIN for an empty allocation.
    pub fn allocate(&mut self, count: usize) -> OleResult<u32> {
        if count == 0 {
            return Ok(ENDOFCHAIN);
        }
        let sectors = self.take_free(count)?;
        self.link(&sectors);
        Ok(sectors[0])
    }

    /// Allocate a chain large enough for `size` bytes
    pub fn allocate_bytes(&mut self, size: usize) -> OleResult<u32> {
        self.allocate(size.div_ceil(self.sector_size))
    }

    /// Reserve a single sector tagged with a special marker (FATSECT or DIFSECT)
    pub fn reserve(&mut self, marker: u32) -> OleResult<u32> {
        let sector = self.take_free(1)?[0];
        self.entries[sector as usize] = marker;
        Ok(sector)
    }

    /// Free every sector of a chain
    pub fn free(&mut self, start: u32) -> OleResult<()> {
        let chain = self.chain_of(start)?;
        self.release(&chain);
        Ok(())
    }

    /// Grow a chain by `additional` sectors, keeping its existing sectors
    ///
    /// Returns the (possibly new) start sector: extending an empty chain
    /// allocates a fresh one.
    pub fn extend(&mut self, start: u32, additional: usize) -> OleResult<u32> {
        if additional == 0 {
            return Ok(start);
        }
        if start == ENDOFCHAIN {
            return self.allocate(additional);
        }

        let chain = self.chain_of(start)?;
        let tail = self.take_free(additional)?;
        if let Some(&last) = chain.last() {
            self.entries[last as usize] = tail[0];
        }
        self.link(&tail);
        Ok(start)
    }

    /// Shrink a chain to its first `count` sectors, freeing the rest
    ///
    /// Returns ENDOFCHAIN when `count` is zero. A chain already shorter than
    /// `count` is left as is.
    pub fn truncate(&mut self, start: u32, count: usize) -> OleResult<u32> {
        let chain = self.chain_of(start)?;
        if count >= chain.len() {
            return Ok(start);
        }
        if count == 0 {
            self.release(&chain);
            return Ok(ENDOFCHAIN);
        }

        self.entries[chain[count - 1] as usize] = ENDOFCHAIN;
        self.release(&chain[count..]);
        Ok(start)
    }

    /// Grow or shrink a chain to exactly `count` sectors
    pub fn resize(&mut self, start: u32, count: usize) -> OleResult<u32> {
        let current = self.chain_of(start)?.len();
        if count > current {
            self.extend(start, count - current)
        } else {
            self.truncate(start, count)
        }
    }

    /// Check the whole table: every link stays inside the table and no sector
    /// is the successor of two different sectors
    pub fn validate(&self) -> OleResult<()> {
        let mut claimed = FixedBitSet::with_capacity(self.entries.len());
        for (sector, &next) in self.entries.iter().enumerate() {
            match next {
                FREESECT | ENDOFCHAIN | FATSECT | DIFSECT => {},
                _ if next as usize >= self.entries.len() => {
                    return Err(OleError::chain(
                        sector as u32,
                        format!("next sector {} is outside the table", next),
                    ));
                },
                _ if next as usize == sector => {
                    return Err(OleError::chain(sector as u32, "sector links to itself"));
                },
                _ => {
                    if claimed.put(next as usize) {
                        return Err(OleError::chain(
                            next,
                            "sector is the successor of more than one sector",
                        ));
                    }
                },
            }
        }
        Ok(())
    }

    /// Serialize the table into blocks of `block_size` bytes
    ///
    /// Unused trailing slots are padded with FREESECT. The MiniFAT is stored
    /// in regular sectors, so callers pass the regular sector size here.
    pub fn to_sectors(&self, block_size: usize) -> Vec<Vec<u8>> {
        let entries_per_block = block_size / 4;
        let num_blocks = self.entries.len().div_ceil(entries_per_block);
        let mut blocks = Vec::with_capacity(num_blocks);

        for block_idx in 0..num_blocks {
            // Initialize with FREESECT (0xFFFFFFFF)
            let mut block = vec![0xFFu8; block_size];
            let start = block_idx * entries_per_block;
            let end = (start + entries_per_block).min(self.entries.len());

            for (i, &value) in self.entries[start..end].iter().enumerate() {
                block[i * 4..i * 4 + 4].copy_from_slice(&value.to_le_bytes());
            }
            blocks.push(block);
        }

        blocks
    }

    /// Number of `block_size` blocks needed to store this table
    pub fn block_count(&self, block_size: usize) -> usize {
        self.entries.len().div_ceil(block_size / 4)
    }

    /// Collect `count` free sectors, extending the table when needed
    fn take_free(&mut self, count: usize) -> OleResult<Vec<u32>> {
        self.ensure_capacity(count)?;

        let mut found = Vec::with_capacity(count);
        let mut idx = self.free_hint;
        while found.len() < count && idx < self.entries.len() {
            if self.entries[idx] == FREESECT {
                found.push(idx as u32);
            }
            idx += 1;
        }
        self.free_hint = idx;

        while found.len() < count {
            found.push(self.entries.len() as u32);
            self.entries.push(FREESECT);
            self.free_hint = self.entries.len();
        }

        Ok(found)
    }

    fn link(&mut self, sectors: &[u32]) {
        for pair in sectors.windows(2) {
            self.entries[pair[0] as usize] = pair[1];
        }
        if let Some(&last) = sectors.last() {
            self.entries[last as usize] = ENDOFCHAIN;
        }
    }

    fn release(&mut self, sectors: &[u32]) {
        for &sector in sectors {
            self.entries[sector as usize] = FREESECT;
            self.free_hint = self.free_hint.min(sector as usize);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_chain() {
        let mut fat = AllocationTable::new(512);

        let start = fat.allocate_bytes(1024).unwrap();
        assert_eq!(start, 0);
        assert_eq!(fat.len(), 2);
        assert_eq!(fat.entries()[0], 1);
        assert_eq!(fat.entries()[1], ENDOFCHAIN);
        assert_eq!(fat.chain_of(start).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_empty_chain() {
        let mut fat = AllocationTable::new(512);
        assert_eq!(fat.allocate(0).unwrap(), ENDOFCHAIN);
        assert!(fat.chain_of(ENDOFCHAIN).unwrap().is_empty());
        assert!(fat.is_empty());
    }

    #[test]
    fn test_freed_sectors_are_reused_first() {
        let mut fat = AllocationTable::new(512);
        let a = fat.allocate(3).unwrap();
        let b = fat.allocate(2).unwrap();
        fat.free(a).unwrap();
        assert_eq!(fat.free_count(), 3);

        let c = fat.allocate(4).unwrap();
        // Three reused sectors, then one appended after `b`
        assert_eq!(fat.chain_of(c).unwrap(), vec![0, 1, 2, 5]);
        assert_eq!(fat.chain_of(b).unwrap(), vec![3, 4]);
        assert_eq!(fat.len(), 6);
    }

    #[test]
    fn test_extend_preserves_prefix() {
        let mut fat = AllocationTable::new(512);
        let a = fat.allocate(2).unwrap();
        let _b = fat.allocate(1).unwrap();

        let a = fat.extend(a, 2).unwrap();
        assert_eq!(fat.chain_of(a).unwrap(), vec![0, 1, 3, 4]);

        let empty = fat.extend(ENDOFCHAIN, 1).unwrap();
        assert_eq!(fat.chain_of(empty).unwrap(), vec![5]);
    }

    #[test]
    fn test_truncate() {
        let mut fat = AllocationTable::new(512);
        let a = fat.allocate(4).unwrap();

        assert_eq!(fat.truncate(a, 2).unwrap(), a);
        assert_eq!(fat.chain_of(a).unwrap(), vec![0, 1]);
        assert_eq!(fat.free_count(), 2);

        // Truncating to a longer length is a no-op
        assert_eq!(fat.truncate(a, 10).unwrap(), a);
        assert_eq!(fat.chain_of(a).unwrap().len(), 2);

        assert_eq!(fat.truncate(a, 0).unwrap(), ENDOFCHAIN);
        assert_eq!(fat.free_count(), 4);
    }

    #[test]
    fn test_resize() {
        let mut fat = AllocationTable::new(64);
        let a = fat.allocate(1).unwrap();
        let a = fat.resize(a, 3).unwrap();
        assert_eq!(fat.chain_of(a).unwrap().len(), 3);
        let a = fat.resize(a, 1).unwrap();
        assert_eq!(fat.chain_of(a).unwrap(), vec![0]);
    }

    #[test]
    fn test_self_loop_is_detected() {
        let fat = AllocationTable::from_entries(vec![1, 1, ENDOFCHAIN], 512, MAXREGSECT);
        let err = fat.chain_of(0).unwrap_err();
        assert!(matches!(err, OleError::CorruptChain { sector: 1, .. }));
    }

    #[test]
    fn test_longer_cycle_is_detected() {
        let fat = AllocationTable::from_entries(vec![1, 2, 0], 512, MAXREGSECT);
        assert!(matches!(
            fat.chain_of(0),
            Err(OleError::CorruptChain { sector: 0, .. })
        ));
    }

    #[test]
    fn test_out_of_range_link() {
        let fat = AllocationTable::from_entries(vec![1, 40], 512, MAXREGSECT);
        assert!(matches!(
            fat.chain_of(0),
            Err(OleError::CorruptChain { sector: 40, .. })
        ));
    }

    #[test]
    fn test_chain_into_free_sector() {
        let fat = AllocationTable::from_entries(vec![1, FREESECT], 512, MAXREGSECT);
        assert!(fat.chain_of(0).is_err());
    }

    #[test]
    fn test_salvage_returns_prefix() {
        let fat = AllocationTable::from_entries(vec![1, 2, 2], 512, MAXREGSECT);
        let (chain, problem) = fat.salvage_chain(0);
        assert_eq!(chain, vec![0, 1, 2]);
        assert!(matches!(problem, Some(OleError::CorruptChain { sector: 2, .. })));
    }

    #[test]
    fn test_capacity_limit_leaves_table_untouched() {
        let mut fat = AllocationTable::with_limit(512, 4);
        let a = fat.allocate(3).unwrap();
        let before = fat.entries().to_vec();

        let err = fat.allocate(2).unwrap_err();
        assert!(matches!(err, OleError::ContainerTooLarge(_)));
        assert_eq!(fat.entries(), before.as_slice());

        assert!(fat.extend(a, 2).is_err());
        assert_eq!(fat.entries(), before.as_slice());
        assert_eq!(fat.allocate(1).unwrap(), 3);
    }

    #[test]
    fn test_reserve_marker() {
        let mut fat = AllocationTable::new(512);
        fat.allocate(1).unwrap();
        let s = fat.reserve(FATSECT).unwrap();
        assert_eq!(s, 1);
        assert_eq!(fat.next(1).unwrap(), FATSECT);
        assert!(fat.validate().is_ok());
    }

    #[test]
    fn test_validate_shared_successor() {
        let fat = AllocationTable::from_entries(vec![2, 2, ENDOFCHAIN], 512, MAXREGSECT);
        assert!(fat.validate().is_err());
    }

    #[test]
    fn test_to_sectors_padding() {
        let mut fat = AllocationTable::new(512);
        fat.allocate(3).unwrap();
        let blocks = fat.to_sectors(512);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].len(), 512);
        assert_eq!(&blocks[0][0..4], &1u32.to_le_bytes());
        assert_eq!(&blocks[0][8..12], &ENDOFCHAIN.to_le_bytes());
        assert_eq!(&blocks[0][12..16], &FREESECT.to_le_bytes());

        let parsed = AllocationTable::from_bytes(&blocks[0], 512, MAXREGSECT);
        assert_eq!(parsed.len(), 128);
        assert_eq!(parsed.chain_of(0).unwrap(), vec![0, 1, 2]);
    }
}
