use super::config::OleOptions;
use super::consts::*;
use super::directory::{Directory, DirectoryEntry, EntryKind};
use super::error::{OleError, OleResult};
use super::header::Header;
use super::sat::AllocationTable;
use super::source::{ByteSource, FileSource, MemorySource, ReaderSource};
use super::writer::difat;
use fixedbitset::FixedBitSet;
use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;

/// OLE2 structured storage file
///
/// Holds the allocation tables and the directory in memory and reads stream
/// data from its [`ByteSource`] on demand. Mutations update the in-memory
/// state and keep new sector contents in an overlay until the container is
/// saved, either in place ([`save_in_place`](Self::save_in_place)) or by a
/// full rewrite ([`write_to`](Self::write_to), [`save_as`](Self::save_as)).
///
/// Every public mutation either succeeds or leaves the container as it was.
#[derive(Debug)]
pub struct OleFile<S: ByteSource = MemorySource> {
    /// Backing bytes
    pub(super) source: S,
    pub(super) options: OleOptions,
    /// Header as last read from or written to the source
    pub(super) header: Header,
    /// File Allocation Table - maps sector to next sector in chain
    pub(super) fat: AllocationTable,
    /// Mini FAT - for streams smaller than cutoff size
    pub(super) minifat: AllocationTable,
    pub(super) directory: Directory,
    /// Mini stream data (loaded on demand, authoritative once loaded)
    pub(super) mini_stream: Option<Vec<u8>>,
    /// Sector contents written since the last save
    pub(super) dirty: HashMap<u32, Vec<u8>>,
    /// Sectors holding the FAT in the source
    pub(super) fat_sectors: Vec<u32>,
    /// Sectors holding the DIFAT in the source
    pub(super) difat_sectors: Vec<u32>,
}

impl OleFile<MemorySource> {
    /// Create an empty container with the default version 3 layout
    pub fn new() -> Self {
        Self::empty(MemorySource::default(), OleOptions::default())
    }

    /// Create an empty container with custom geometry
    pub fn with_options(options: OleOptions) -> OleResult<Self> {
        options.validate()?;
        Ok(Self::empty(MemorySource::default(), options))
    }

    /// Open a container from a non-seekable stream by reading it into memory
    pub fn from_stream<R: Read>(reader: R) -> OleResult<Self> {
        Self::from_source(MemorySource::from_reader(reader)?)
    }

    /// Open a container held in a byte buffer
    pub fn from_bytes(data: Vec<u8>) -> OleResult<Self> {
        Self::from_source(MemorySource::new(data))
    }
}

impl Default for OleFile<MemorySource> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Read + Seek> OleFile<ReaderSource<R>> {
    /// Open and parse an OLE file from a reader
    ///
    /// The reader is kept and stream data is read lazily. The container can be
    /// mutated and saved with [`save_as`](OleFile::save_as) or
    /// [`write_to`](OleFile::write_to), but not in place.
    pub fn open(reader: R) -> OleResult<Self> {
        Self::from_source(ReaderSource::new(reader)?)
    }
}

impl OleFile<FileSource> {
    /// Open a file read-only
    pub fn open_path<P: AsRef<Path>>(path: P) -> OleResult<Self> {
        Self::from_source(FileSource::open(path)?)
    }

    /// Open a file for reading and in-place saving
    pub fn open_path_rw<P: AsRef<Path>>(path: P) -> OleResult<Self> {
        Self::from_source(FileSource::open_rw(path)?)
    }

    /// Create a new, empty container file
    ///
    /// Nothing is written until [`save_in_place`](OleFile::save_in_place).
    pub fn create_path<P: AsRef<Path>>(path: P, options: OleOptions) -> OleResult<Self> {
        options.validate()?;
        Ok(Self::empty(FileSource::create(path)?, options))
    }
}

impl<S: ByteSource> OleFile<S> {
    /// Parse a container from any byte source
    pub fn from_source(source: S) -> OleResult<Self> {
        let options = OleOptions::default();
        let mut ole = Self::empty(source, options);
        ole.load()?;
        Ok(ole)
    }

    /// Empty container on top of `source`, ignoring its current contents
    fn empty(source: S, options: OleOptions) -> Self {
        let sector_size = options.sector_size;
        Self {
            source,
            options,
            header: Header::new(&options),
            fat: AllocationTable::with_limit(sector_size, options.max_sectors),
            minifat: AllocationTable::new(MINI_SECTOR_SIZE),
            directory: Directory::new(sector_size),
            mini_stream: Some(Vec::new()),
            dirty: HashMap::new(),
            fat_sectors: Vec::new(),
            difat_sectors: Vec::new(),
        }
    }

    /// (Re)load header, FAT, directory and MiniFAT from the source
    pub(super) fn load(&mut self) -> OleResult<()> {
        let mut block = [0u8; HEADER_SIZE];
        let n = self.source.read_at(0, &mut block)?;
        let header = Header::parse(&block[..n])?;

        let sector_size = header.sector_size;
        let file_size = self.source.size();
        if file_size < (sector_size * 2) as u64 {
            return Err(OleError::InvalidHeader(format!(
                "file is {} bytes, too small for {}-byte sectors",
                file_size, sector_size
            )));
        }

        self.options.sector_size = sector_size;
        if header.mini_stream_cutoff != 0 {
            self.options.mini_stream_cutoff = header.mini_stream_cutoff;
        }
        self.header = header;
        self.dirty.clear();
        self.mini_stream = None;

        self.load_fat()?;
        self.load_directory()?;
        self.load_minifat()?;
        log::debug!(
            "loaded container: {}-byte sectors, {} FAT sectors, {} DIFAT sectors, {} directory entries",
            sector_size,
            self.fat_sectors.len(),
            self.difat_sectors.len(),
            self.directory.len()
        );
        Ok(())
    }

    /// Load the File Allocation Table (FAT)
    ///
    /// First 109 FAT sector indexes are stored in the header, additional
    /// indexes are stored in DIFAT sectors. Every FAT and DIFAT sector must be
    /// listed once.
    fn load_fat(&mut self) -> OleResult<()> {
        let sector_size = self.header.sector_size;
        let sectors_in_file = (self.source.size().div_ceil(sector_size as u64) - 1) as usize;
        let mut claimed = FixedBitSet::with_capacity(sectors_in_file);

        let wanted = self.header.num_fat_sectors as usize;
        let mut fat_sectors = self.header.fat_sectors.clone();
        let mut difat_sectors = Vec::new();

        let mut next = self.header.first_difat_sector;
        while next != ENDOFCHAIN && next != FREESECT && fat_sectors.len() < wanted {
            claim(&mut claimed, next)?;
            difat_sectors.push(next);
            let block = self.read_sector(next)?;
            let (ids, following) = difat::parse_block(&block);
            fat_sectors.extend(ids.into_iter().take(wanted - fat_sectors.len()));
            next = following;
        }

        let entries_per_sector = sector_size / 4;
        let mut entries = Vec::with_capacity(fat_sectors.len() * entries_per_sector);
        for &sector in &fat_sectors {
            claim(&mut claimed, sector)?;
            let block = self.read_sector(sector)?;
            entries.extend(
                block
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])),
            );
        }

        self.fat = AllocationTable::from_entries(entries, sector_size, self.options.max_sectors);
        self.fat_sectors = fat_sectors;
        self.difat_sectors = difat_sectors;
        Ok(())
    }

    fn load_directory(&mut self) -> OleResult<()> {
        let chain = self.fat.chain_of(self.header.first_dir_sector)?;
        let data = self.read_chain(&chain)?;
        self.directory = Directory::parse(&data, self.header.sector_size)?;
        Ok(())
    }

    /// Load the Mini FAT (for small streams)
    fn load_minifat(&mut self) -> OleResult<()> {
        self.minifat = if self.header.num_minifat_sectors == 0 {
            AllocationTable::new(MINI_SECTOR_SIZE)
        } else {
            let chain = self.fat.chain_of(self.header.first_minifat_sector)?;
            let data = self.read_chain(&chain)?;
            AllocationTable::from_bytes(&data, MINI_SECTOR_SIZE, MAXREGSECT + 1)
        };
        Ok(())
    }

    /// Load the mini stream (root entry's chain) if not loaded yet
    pub(super) fn ensure_mini_stream(&mut self) -> OleResult<()> {
        if self.mini_stream.is_some() {
            return Ok(());
        }
        let root = self.directory.root();
        let (start, size) = (root.start_sector, root.size);
        let data = if size == 0 {
            Vec::new()
        } else {
            let chain = self.fat.chain_of(start)?;
            check_chain_covers(start, chain.len(), self.sector_size(), size)?;
            let mut data = self.read_chain(&chain)?;
            data.truncate(size as usize);
            data
        };
        self.mini_stream = Some(data);
        Ok(())
    }

    /// Read a single regular sector
    ///
    /// A partial last sector is zero-padded; a sector entirely beyond the end
    /// of the source is a corrupt chain.
    pub(super) fn read_sector(&mut self, sector: u32) -> OleResult<Vec<u8>> {
        if let Some(data) = self.dirty.get(&sector) {
            return Ok(data.clone());
        }

        // Sector position in file: (sector_id + 1) * sector_size
        let sector_size = self.sector_size();
        let position = (sector as u64 + 1) * sector_size as u64;
        if position >= self.source.size() {
            return Err(OleError::chain(
                sector,
                format!("sector lies beyond the end of the file ({} bytes)", self.source.size()),
            ));
        }

        let mut buffer = vec![0u8; sector_size];
        self.source.read_at(position, &mut buffer)?;
        Ok(buffer)
    }

    /// Concatenate the contents of a chain of regular sectors
    pub(super) fn read_chain(&mut self, chain: &[u32]) -> OleResult<Vec<u8>> {
        let mut data = Vec::with_capacity(chain.len() * self.sector_size());
        for &sector in chain {
            data.extend_from_slice(&self.read_sector(sector)?);
        }
        Ok(data)
    }

    /// Run a mutation, restoring the allocation and directory state on error
    pub(super) fn transaction<T>(
        &mut self,
        op: impl FnOnce(&mut Self) -> OleResult<T>,
    ) -> OleResult<T> {
        let fat = self.fat.clone();
        let minifat = self.minifat.clone();
        let directory = self.directory.clone();
        let mini_len = self.mini_stream.as_ref().map(Vec::len);

        let result = op(self);
        if result.is_err() {
            self.fat = fat;
            self.minifat = minifat;
            self.directory = directory;
            match (mini_len, self.mini_stream.as_mut()) {
                (Some(len), Some(mini)) => mini.truncate(len),
                (None, _) => self.mini_stream = None,
                _ => {},
            }
        }
        result
    }

    /// Whether a stream of `size` bytes lives in the mini stream
    pub(super) fn is_mini(&self, size: u64) -> bool {
        size < self.options.mini_stream_cutoff as u64
    }

    /// Reject stream sizes the container version cannot describe
    pub(super) fn check_stream_size(&self, size: u64) -> OleResult<()> {
        if self.sector_size() == SECTOR_SIZE_V3 && size > u32::MAX as u64 {
            return Err(OleError::ContainerTooLarge(format!(
                "stream of {} bytes exceeds the 4 GiB limit of 512-byte sector files",
                size
            )));
        }
        Ok(())
    }

    /// Regular sector size (512 or 4096)
    pub fn sector_size(&self) -> usize {
        self.options.sector_size
    }

    pub fn mini_stream_cutoff(&self) -> u32 {
        self.options.mini_stream_cutoff
    }

    pub fn options(&self) -> &OleOptions {
        &self.options
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Size of the backing source in bytes
    pub fn file_size(&self) -> u64 {
        self.source.size()
    }

    /// Get the root entry name
    pub fn root_name(&self) -> &str {
        &self.directory.root().name
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Set the CLSID of the root entry
    ///
    /// Office uses it to recognize the document type, e.g.
    /// `{00020820-0000-0000-C000-000000000046}` for Excel 97-2003 workbooks.
    pub fn set_root_clsid(&mut self, clsid: [u8; 16]) {
        self.directory.root_mut().clsid = clsid;
    }

    /// List all streams in the OLE file
    ///
    /// Returns a list of stream paths (as vectors of storage/stream names)
    pub fn list_streams(&self) -> Vec<Vec<String>> {
        self.directory.stream_paths()
    }

    /// List all entries (streams and storages) in a storage
    ///
    /// An empty path lists the root storage.
    pub fn list_directory_entries(&self, path: &[&str]) -> OleResult<Vec<DirectoryEntry>> {
        let sid = self.directory.resolve(path)?;
        let entry = self.entry_by_sid(sid)?;
        if !entry.is_storage() {
            return Err(OleError::NotAStorage(entry.name.clone()));
        }
        Ok(self
            .directory
            .list_children(sid)
            .into_iter()
            .filter_map(|child| self.directory.get(child).cloned())
            .collect())
    }

    /// Check if a stream or storage exists
    pub fn exists(&self, path: &[&str]) -> bool {
        self.directory.resolve(path).is_ok()
    }

    /// Directory entry at `path`
    pub fn entry(&self, path: &[&str]) -> OleResult<&DirectoryEntry> {
        let sid = self.directory.resolve(path)?;
        self.entry_by_sid(sid)
    }

    pub(super) fn entry_by_sid(&self, sid: u32) -> OleResult<&DirectoryEntry> {
        self.directory
            .get(sid)
            .ok_or_else(|| OleError::directory(sid, "no such entry"))
    }

    /// Create a storage, creating missing parent storages
    ///
    /// Fails with [`OleError::DuplicateName`] if an entry with the same name
    /// already exists.
    pub fn create_storage(&mut self, path: &[&str]) -> OleResult<()> {
        let (name, parents) = path
            .split_last()
            .ok_or_else(|| OleError::InvalidName(String::new()))?;
        self.transaction(|ole| {
            let parent = ole.ensure_storage_path(parents)?;
            ole.directory.create_entry(parent, name, EntryKind::Storage)?;
            Ok(())
        })
    }

    /// Resolve a storage path, creating missing storages along the way
    pub(super) fn ensure_storage_path(&mut self, path: &[&str]) -> OleResult<u32> {
        let mut current = 0u32;
        for segment in path {
            current = match self.directory.find_child(current, segment) {
                Some(sid) if self.directory.get(sid).is_some_and(|e| e.is_storage()) => sid,
                Some(_) => return Err(OleError::NotAStorage(segment.to_string())),
                None => self
                    .directory
                    .create_entry(current, segment, EntryKind::Storage)?,
            };
        }
        Ok(current)
    }

    /// Remove a stream or an empty storage
    ///
    /// The stream's sectors are returned to the free pool.
    pub fn remove(&mut self, path: &[&str]) -> OleResult<()> {
        let sid = self.directory.resolve(path)?;
        self.transaction(|ole| {
            let entry = ole.entry_by_sid(sid)?.clone();
            if entry.is_storage() && entry.child != NOSTREAM {
                return Err(OleError::StorageNotEmpty(entry.name));
            }
            if entry.is_stream() && entry.size > 0 {
                if ole.is_mini(entry.size) {
                    ole.minifat.free(entry.start_sector)?;
                } else {
                    ole.fat.free(entry.start_sector)?;
                }
            }
            ole.directory.remove_entry(sid)
        })
    }
}

/// Mark a FAT or DIFAT sector as listed, rejecting repeats and sectors
/// outside the file
fn claim(claimed: &mut FixedBitSet, sector: u32) -> OleResult<()> {
    if sector as usize >= claimed.len() {
        return Err(OleError::chain(
            sector,
            "FAT sector lies beyond the end of the file",
        ));
    }
    if claimed.put(sector as usize) {
        return Err(OleError::chain(
            sector,
            "sector is listed more than once as a FAT or DIFAT sector",
        ));
    }
    Ok(())
}

/// Fail if a chain of `len` sectors cannot hold `size` bytes
pub(super) fn check_chain_covers(
    start: u32,
    len: usize,
    unit: usize,
    size: u64,
) -> OleResult<()> {
    if (len as u64) * (unit as u64) < size {
        return Err(OleError::chain(
            start,
            format!(
                "chain of {} sectors is shorter than the declared size of {} bytes",
                len, size
            ),
        ));
    }
    Ok(())
}

/// Check if a file/data is an OLE file by checking magic bytes
pub fn is_ole_file(data: &[u8]) -> bool {
    data.len() >= MINIMAL_OLEFILE_SIZE && &data[0..8] == MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved(ole: &mut OleFile) -> Vec<u8> {
        let mut out = Vec::new();
        ole.write_to(&mut out).unwrap();
        out
    }

    #[test]
    fn test_new_container() {
        let ole = OleFile::new();
        assert_eq!(ole.sector_size(), 512);
        assert_eq!(ole.mini_stream_cutoff(), 4096);
        assert_eq!(ole.root_name(), "Root Entry");
        assert!(ole.list_streams().is_empty());
    }

    #[test]
    fn test_is_ole_file() {
        let mut ole = OleFile::new();
        let data = saved(&mut ole);
        assert!(is_ole_file(&data));
        assert!(!is_ole_file(&data[..512]));
        assert!(!is_ole_file(&[0u8; 2048]));
    }

    #[test]
    fn test_rejects_garbage() {
        let err = OleFile::from_bytes(vec![0u8; 4096]).unwrap_err();
        assert!(matches!(err, OleError::InvalidHeader(_)));
    }

    #[test]
    fn test_rejects_tiny_file() {
        let mut ole = OleFile::new();
        let data = saved(&mut ole);
        let err = OleFile::from_bytes(data[..700].to_vec()).unwrap_err();
        assert!(matches!(err, OleError::InvalidHeader(_)));
    }

    #[test]
    fn test_sector_beyond_end_is_corrupt_chain() {
        let mut ole = OleFile::new();
        ole.write(&["Big"], &vec![7u8; 5000]).unwrap();
        let data = saved(&mut ole);
        // Keep the header, the data sectors are gone
        match OleFile::from_bytes(data[..1024].to_vec()) {
            Ok(mut ole) => assert!(ole.read(&["Big"]).is_err()),
            Err(err) => assert!(err.is_corruption()),
        }
    }

    #[test]
    fn test_stream_size_limit_v3() {
        let ole = OleFile::new();
        assert!(ole.check_stream_size(u32::MAX as u64).is_ok());
        assert!(matches!(
            ole.check_stream_size(u32::MAX as u64 + 1),
            Err(OleError::ContainerTooLarge(_))
        ));

        let v4 = OleFile::with_options(OleOptions::new().with_sector_size(4096)).unwrap();
        assert!(v4.check_stream_size(u32::MAX as u64 + 1).is_ok());
    }

    #[test]
    fn test_create_storage_and_list() {
        let mut ole = OleFile::new();
        ole.create_storage(&["Outer", "Inner"]).unwrap();
        ole.write(&["Outer", "Inner", "Data"], b"abc").unwrap();

        let entries = ole.list_directory_entries(&["Outer"]).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Inner");
        assert!(entries[0].is_storage());

        assert!(matches!(
            ole.create_storage(&["outer"]),
            Err(OleError::DuplicateName { .. })
        ));
        assert!(matches!(
            ole.list_directory_entries(&["Outer", "Inner", "Data"]),
            Err(OleError::NotAStorage(_))
        ));
    }

    #[test]
    fn test_remove() {
        let mut ole = OleFile::new();
        ole.write(&["Box", "Small"], b"tiny").unwrap();
        ole.write(&["Large"], &vec![1u8; 8000]).unwrap();

        assert!(matches!(
            ole.remove(&["Box"]),
            Err(OleError::StorageNotEmpty(_))
        ));
        ole.remove(&["Box", "Small"]).unwrap();
        ole.remove(&["Box"]).unwrap();
        ole.remove(&["Large"]).unwrap();

        assert!(!ole.exists(&["Box"]));
        assert!(ole.list_streams().is_empty());
        assert_eq!(ole.fat.free_count(), ole.fat.len());
        assert_eq!(ole.minifat.free_count(), ole.minifat.len());
    }

    #[test]
    fn test_remove_missing() {
        let mut ole = OleFile::new();
        match ole.remove(&["Nope"]) {
            Err(OleError::EntryNotFound { segment }) => assert_eq!(segment, "Nope"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
