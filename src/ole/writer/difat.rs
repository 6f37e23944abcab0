//! DIFAT (Double Indirect FAT) blocks
//!
//! The header stores the first 109 FAT sector IDs; any further FAT sectors
//! are listed in DIFAT sectors chained through their last slot.
//!
//! - For 512-byte sectors: 127 FAT sector IDs + 1 next pointer (128 * 4 = 512)
//! - For 4096-byte sectors: 1023 FAT sector IDs + 1 next pointer (1024 * 4 = 4096)

use super::super::consts::*;

/// Packs the FAT sector IDs that do not fit in the header into DIFAT blocks
#[derive(Debug)]
pub struct DifatBuilder {
    /// FAT sector IDs beyond the first 109
    fat_sector_ids: Vec<u32>,
    sector_size: usize,
}

impl DifatBuilder {
    pub fn new(sector_size: usize) -> Self {
        Self {
            fat_sector_ids: Vec::new(),
            sector_size,
        }
    }

    /// Set the complete list of FAT sector IDs; the first 109 are skipped
    pub fn set_fat_sectors(&mut self, fat_sectors: &[u32]) {
        self.fat_sector_ids = fat_sectors
            .get(HEADER_DIFAT_SLOTS..)
            .map(<[u32]>::to_vec)
            .unwrap_or_default();
    }

    fn ids_per_sector(&self) -> usize {
        // The last u32 holds the next DIFAT sector pointer
        self.sector_size / 4 - 1
    }

    /// Number of DIFAT sectors needed
    pub fn sector_count(&self) -> usize {
        self.fat_sector_ids.len().div_ceil(self.ids_per_sector())
    }

    /// Number of DIFAT sectors needed for `fat_count` FAT sectors
    pub fn sectors_for(sector_size: usize, fat_count: usize) -> usize {
        fat_count
            .saturating_sub(HEADER_DIFAT_SLOTS)
            .div_ceil(sector_size / 4 - 1)
    }

    /// Generate the DIFAT blocks, to be stored in `difat_sectors` in order
    ///
    /// Unused slots hold FREESECT and the last block ends with ENDOFCHAIN.
    pub fn generate(&self, difat_sectors: &[u32]) -> Vec<Vec<u8>> {
        let per_sector = self.ids_per_sector();
        let count = self.sector_count();

        (0..count)
            .map(|idx| {
                let mut block = vec![0xFFu8; self.sector_size];
                let start = idx * per_sector;
                let end = (start + per_sector).min(self.fat_sector_ids.len());
                for (i, id) in self.fat_sector_ids[start..end].iter().enumerate() {
                    block[i * 4..i * 4 + 4].copy_from_slice(&id.to_le_bytes());
                }

                let next = difat_sectors.get(idx + 1).copied().unwrap_or(ENDOFCHAIN);
                let next = if idx + 1 < count { next } else { ENDOFCHAIN };
                let offset = self.sector_size - 4;
                block[offset..].copy_from_slice(&next.to_le_bytes());
                block
            })
            .collect()
    }
}

/// Split a DIFAT block into its FAT sector IDs and the next DIFAT sector
pub(crate) fn parse_block(block: &[u8]) -> (Vec<u32>, u32) {
    let mut ids: Vec<u32> = block
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let next = ids.pop().unwrap_or(ENDOFCHAIN);
    ids.retain(|&id| id != FREESECT);
    (ids, next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::binary::read_u32_le;

    #[test]
    fn test_no_difat_needed() {
        let mut difat = DifatBuilder::new(512);
        difat.set_fat_sectors(&(0..109).collect::<Vec<_>>());
        assert_eq!(difat.sector_count(), 0);
        assert!(difat.generate(&[]).is_empty());
        assert_eq!(DifatBuilder::sectors_for(512, 109), 0);
    }

    #[test]
    fn test_difat_calculation() {
        // 150 FAT sectors: 109 in the header, 41 in one DIFAT sector
        let mut difat = DifatBuilder::new(512);
        difat.set_fat_sectors(&(0..150).collect::<Vec<_>>());
        assert_eq!(difat.sector_count(), 1);
        assert_eq!(DifatBuilder::sectors_for(512, 150), 1);
        // 141 beyond the header need 127 + 14
        assert_eq!(DifatBuilder::sectors_for(512, 250), 2);
        assert_eq!(DifatBuilder::sectors_for(4096, 1200), 2);
    }

    #[test]
    fn test_difat_chain_pointers() {
        let mut difat = DifatBuilder::new(512);
        difat.set_fat_sectors(&(0..250).collect::<Vec<_>>());

        let blocks = difat.generate(&[300, 420]);
        assert_eq!(blocks.len(), 2);
        assert_eq!(read_u32_le(&blocks[0], 508).unwrap(), 420);
        assert_eq!(read_u32_le(&blocks[1], 508).unwrap(), ENDOFCHAIN);
        assert_eq!(read_u32_le(&blocks[0], 0).unwrap(), 109);
        // Unused slots of the last block are free
        assert_eq!(read_u32_le(&blocks[1], 14 * 4).unwrap(), FREESECT);
    }

    #[test]
    fn test_parse_block() {
        let mut difat = DifatBuilder::new(512);
        difat.set_fat_sectors(&(0..120).collect::<Vec<_>>());
        let blocks = difat.generate(&[7]);

        let (ids, next) = parse_block(&blocks[0]);
        assert_eq!(ids, (109..120).collect::<Vec<u32>>());
        assert_eq!(next, ENDOFCHAIN);
    }
}
