/// Magic bytes that should be at the beginning of every OLE file
pub const MAGIC: &[u8; 8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";

/// Size of the fixed header structure in bytes
pub const HEADER_SIZE: usize = 512;

/// Minimal size of an empty OLE file with 512-byte sectors (1536 bytes)
pub const MINIMAL_OLEFILE_SIZE: usize = 1536;

/// Size of a directory entry in bytes
pub const DIRENTRY_SIZE: usize = 128;

/// Default sector size for version 3 (512 bytes)
pub const SECTOR_SIZE_V3: usize = 512;

/// Default sector size for version 4 (4096 bytes)
pub const SECTOR_SIZE_V4: usize = 4096;

/// Mini sector size (always 64 bytes)
pub const MINI_SECTOR_SIZE: usize = 64;

/// Default mini stream cutoff: streams smaller than this live in the mini stream
pub const DEFAULT_MINI_STREAM_CUTOFF: u32 = 4096;

/// Number of FAT sector slots stored inline in the header
pub const HEADER_DIFAT_SLOTS: usize = 109;

/// Byte order mark stored in the header (little-endian)
pub const BYTE_ORDER_LE: u16 = 0xFFFE;

/// Minor version written into new headers
pub const MINOR_VERSION: u16 = 0x003E;

/// Maximum number of UTF-16 code units in an entry name (excluding the NUL)
pub const MAX_NAME_LEN: usize = 31;

// Sector IDs (from AAF specifications)
/// Maximum regular sector ID
pub const MAXREGSECT: u32 = 0xFFFFFFFA; // -6
/// Denotes a DIFAT sector in a FAT
pub const DIFSECT: u32 = 0xFFFFFFFC; // -4
/// Denotes a FAT sector in a FAT
pub const FATSECT: u32 = 0xFFFFFFFD; // -3
/// End of a virtual stream chain
pub const ENDOFCHAIN: u32 = 0xFFFFFFFE; // -2
/// Unallocated sector
pub const FREESECT: u32 = 0xFFFFFFFF; // -1

// Directory Entry IDs (from AAF specifications)
/// Maximum directory entry ID
pub const MAXREGSID: u32 = 0xFFFFFFFA; // -6
/// Unallocated directory entry
pub const NOSTREAM: u32 = 0xFFFFFFFF; // -1

// Object types in storage (from AAF specifications)
/// Empty directory entry
pub const STGTY_EMPTY: u8 = 0;
/// Element is a storage object
pub const STGTY_STORAGE: u8 = 1;
/// Element is a stream object
pub const STGTY_STREAM: u8 = 2;
/// Element is an ILockBytes object
pub const STGTY_LOCKBYTES: u8 = 3;
/// Element is an IPropertyStorage object
pub const STGTY_PROPERTY: u8 = 4;
/// Element is a root storage
pub const STGTY_ROOT: u8 = 5;

/// Node colors of the directory red-black tree
pub const COLOR_RED: u8 = 0;
pub const COLOR_BLACK: u8 = 1;

/// Name of the root directory entry
pub const ROOT_ENTRY_NAME: &str = "Root Entry";

/// Difference between the FILETIME epoch (1601-01-01) and the Unix epoch,
/// in 100-nanosecond intervals
pub const FILETIME_UNIX_EPOCH: u64 = 116_444_736_000_000_000;
