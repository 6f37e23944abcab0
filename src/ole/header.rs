//! Compound file header
//!
//! The header occupies the first 512 bytes of the file. For version 4 files
//! the first sector-sized block (4096 bytes) is reserved for it, the remainder
//! being zero.

use super::config::OleOptions;
use super::consts::*;
use super::error::{OleError, OleResult};
use zerocopy::{FromBytes, LE, U16, U32};
use zerocopy_derive::FromBytes as DeriveFromBytes;

/// Raw on-disk header (512 bytes)
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawHeader {
    signature: [u8; 8],
    clsid: [u8; 16],
    minor_version: U16<LE>,
    major_version: U16<LE>,
    byte_order: U16<LE>,
    sector_shift: U16<LE>,
    mini_sector_shift: U16<LE>,
    reserved: [u8; 6],
    /// Number of directory sectors (always 0 for 512-byte sectors)
    num_dir_sectors: U32<LE>,
    num_fat_sectors: U32<LE>,
    first_dir_sector: U32<LE>,
    transaction_signature: U32<LE>,
    mini_stream_cutoff: U32<LE>,
    first_minifat_sector: U32<LE>,
    num_minifat_sectors: U32<LE>,
    first_difat_sector: U32<LE>,
    num_difat_sectors: U32<LE>,
    /// First 109 FAT sector IDs
    difat: [U32<LE>; HEADER_DIFAT_SLOTS],
}

/// Parsed compound file header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub clsid: [u8; 16],
    pub minor_version: u16,
    pub major_version: u16,
    /// Regular sector size (512 or 4096)
    pub sector_size: usize,
    pub mini_sector_size: usize,
    pub num_dir_sectors: u32,
    pub num_fat_sectors: u32,
    pub first_dir_sector: u32,
    pub transaction_signature: u32,
    pub mini_stream_cutoff: u32,
    pub first_minifat_sector: u32,
    pub num_minifat_sectors: u32,
    pub first_difat_sector: u32,
    pub num_difat_sectors: u32,
    /// FAT sector IDs stored inline (at most 109)
    pub fat_sectors: Vec<u32>,
}

impl Header {
    /// Header of an empty container with the given geometry
    pub fn new(options: &OleOptions) -> Self {
        Self {
            clsid: [0; 16],
            minor_version: MINOR_VERSION,
            major_version: options.major_version(),
            sector_size: options.sector_size,
            mini_sector_size: MINI_SECTOR_SIZE,
            num_dir_sectors: 0,
            num_fat_sectors: 0,
            first_dir_sector: ENDOFCHAIN,
            transaction_signature: 0,
            mini_stream_cutoff: options.mini_stream_cutoff,
            first_minifat_sector: ENDOFCHAIN,
            num_minifat_sectors: 0,
            first_difat_sector: ENDOFCHAIN,
            num_difat_sectors: 0,
            fat_sectors: Vec::new(),
        }
    }

    /// Parse and validate a header
    ///
    /// Fails with [`OleError::InvalidHeader`] on a wrong signature, byte
    /// order, sector shift or mini sector shift.
    pub fn parse(data: &[u8]) -> OleResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(OleError::InvalidHeader(format!(
                "expected {} header bytes, found {}",
                HEADER_SIZE,
                data.len()
            )));
        }
        let raw = RawHeader::read_from_bytes(&data[..HEADER_SIZE])
            .map_err(|_| OleError::InvalidHeader("failed to parse header".to_string()))?;

        if &raw.signature != MAGIC {
            return Err(OleError::InvalidHeader(
                "missing compound file signature".to_string(),
            ));
        }

        let byte_order = raw.byte_order.get();
        if byte_order != BYTE_ORDER_LE {
            return Err(OleError::InvalidHeader(format!(
                "byte order mark is {:#06X}, expected 0xFFFE",
                byte_order
            )));
        }

        let major_version = raw.major_version.get();
        let sector_shift = raw.sector_shift.get();
        let valid_shift = match major_version {
            3 => sector_shift == 9,
            4 => sector_shift == 12,
            _ => sector_shift == 9 || sector_shift == 12,
        };
        if !valid_shift {
            return Err(OleError::InvalidHeader(format!(
                "sector shift {} does not match version {}",
                sector_shift, major_version
            )));
        }

        let mini_sector_shift = raw.mini_sector_shift.get();
        if mini_sector_shift != 6 {
            return Err(OleError::InvalidHeader(format!(
                "mini sector shift is {}, expected 6",
                mini_sector_shift
            )));
        }

        let num_fat_sectors = raw.num_fat_sectors.get();
        let inline = (num_fat_sectors as usize).min(HEADER_DIFAT_SLOTS);
        let fat_sectors = raw.difat[..inline]
            .iter()
            .map(|v| v.get())
            .take_while(|&s| s != FREESECT && s != ENDOFCHAIN)
            .collect();

        Ok(Self {
            clsid: raw.clsid,
            minor_version: raw.minor_version.get(),
            major_version,
            sector_size: 1usize << sector_shift,
            mini_sector_size: 1usize << mini_sector_shift,
            num_dir_sectors: raw.num_dir_sectors.get(),
            num_fat_sectors,
            first_dir_sector: raw.first_dir_sector.get(),
            transaction_signature: raw.transaction_signature.get(),
            mini_stream_cutoff: raw.mini_stream_cutoff.get(),
            first_minifat_sector: raw.first_minifat_sector.get(),
            num_minifat_sectors: raw.num_minifat_sectors.get(),
            first_difat_sector: raw.first_difat_sector.get(),
            num_difat_sectors: raw.num_difat_sectors.get(),
            fat_sectors,
        })
    }

    /// Serialize the header into a sector-sized block
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut header = vec![0u8; self.sector_size.max(HEADER_SIZE)];

        header[0..8].copy_from_slice(MAGIC);
        header[8..24].copy_from_slice(&self.clsid);
        header[24..26].copy_from_slice(&self.minor_version.to_le_bytes());
        header[26..28].copy_from_slice(&self.major_version.to_le_bytes());
        header[28..30].copy_from_slice(&BYTE_ORDER_LE.to_le_bytes());
        let sector_shift = self.sector_size.trailing_zeros() as u16;
        header[30..32].copy_from_slice(&sector_shift.to_le_bytes());
        header[32..34].copy_from_slice(&6u16.to_le_bytes());
        // header[34..40] reserved

        // csectDir must be 0 for 512-byte sectors
        let num_dir_sectors = if self.sector_size == SECTOR_SIZE_V3 {
            0
        } else {
            self.num_dir_sectors
        };
        header[40..44].copy_from_slice(&num_dir_sectors.to_le_bytes());
        header[44..48].copy_from_slice(&self.num_fat_sectors.to_le_bytes());
        header[48..52].copy_from_slice(&self.first_dir_sector.to_le_bytes());
        header[52..56].copy_from_slice(&self.transaction_signature.to_le_bytes());
        header[56..60].copy_from_slice(&self.mini_stream_cutoff.to_le_bytes());
        header[60..64].copy_from_slice(&self.first_minifat_sector.to_le_bytes());
        header[64..68].copy_from_slice(&self.num_minifat_sectors.to_le_bytes());
        header[68..72].copy_from_slice(&self.first_difat_sector.to_le_bytes());
        header[72..76].copy_from_slice(&self.num_difat_sectors.to_le_bytes());

        for i in 0..HEADER_DIFAT_SLOTS {
            let id = self.fat_sectors.get(i).copied().unwrap_or(FREESECT);
            let offset = 76 + i * 4;
            header[offset..offset + 4].copy_from_slice(&id.to_le_bytes());
        }

        header
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::binary::{read_u16_le, read_u32_le};

    fn sample() -> Vec<u8> {
        let mut header = Header::new(&OleOptions::default());
        header.first_dir_sector = 10;
        header.num_fat_sectors = 3;
        header.fat_sectors = vec![1, 2, 3];
        header.to_bytes()
    }

    #[test]
    fn test_header_generation() {
        let bytes = sample();
        assert_eq!(bytes.len(), 512);
        assert_eq!(&bytes[0..8], MAGIC);
        assert_eq!(read_u16_le(&bytes, 28).unwrap(), 0xFFFE);
        assert_eq!(read_u16_le(&bytes, 26).unwrap(), 3);
        assert_eq!(read_u16_le(&bytes, 30).unwrap(), 9);
        assert_eq!(read_u32_le(&bytes, 76 + 3 * 4).unwrap(), FREESECT);

        let parsed = Header::parse(&bytes).unwrap();
        assert_eq!(parsed.first_dir_sector, 10);
        assert_eq!(parsed.fat_sectors, vec![1, 2, 3]);
        assert_eq!(parsed.sector_size, 512);
        assert_eq!(parsed.mini_stream_cutoff, 4096);
    }

    #[test]
    fn test_sector_size_4096() {
        let header = Header::new(&OleOptions::new().with_sector_size(4096));
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), 4096);
        assert_eq!(read_u16_le(&bytes, 26).unwrap(), 4);
        assert_eq!(read_u16_le(&bytes, 30).unwrap(), 12);
        assert_eq!(Header::parse(&bytes).unwrap().sector_size, 4096);
    }

    #[test]
    fn test_bad_signature() {
        let mut bytes = sample();
        bytes[0] = 0;
        assert!(matches!(Header::parse(&bytes), Err(OleError::InvalidHeader(_))));
    }

    #[test]
    fn test_bad_byte_order() {
        let mut bytes = sample();
        bytes[28..30].copy_from_slice(&0xFEFFu16.to_le_bytes());
        assert!(matches!(Header::parse(&bytes), Err(OleError::InvalidHeader(_))));
    }

    #[test]
    fn test_shift_version_mismatch() {
        let mut bytes = sample();
        bytes[30..32].copy_from_slice(&12u16.to_le_bytes());
        assert!(matches!(Header::parse(&bytes), Err(OleError::InvalidHeader(_))));
    }

    #[test]
    fn test_bad_mini_shift() {
        let mut bytes = sample();
        bytes[32..34].copy_from_slice(&7u16.to_le_bytes());
        assert!(matches!(Header::parse(&bytes), Err(OleError::InvalidHeader(_))));
    }

    #[test]
    fn test_too_short() {
        assert!(matches!(
            Header::parse(&sample()[..100]),
            Err(OleError::InvalidHeader(_))
        ));
    }
}
