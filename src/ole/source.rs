//! Byte sources backing a compound file
//!
//! A container reads its sectors through a [`ByteSource`]. Read-only sources
//! support every in-memory mutation and full rewrites; only a writable file
//! source supports saving in place.

use super::error::{OleError, OleResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Random-access byte storage
pub trait ByteSource {
    /// Current size in bytes
    fn size(&self) -> u64;

    /// Read up to `buf.len()` bytes at `offset`, returning how many were read.
    ///
    /// Fewer bytes than requested are returned only at the end of the source.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> OleResult<usize>;

    /// Write `data` at `offset`, growing the source if needed
    fn write_at(&mut self, offset: u64, data: &[u8]) -> OleResult<()> {
        let _ = (offset, data);
        Err(OleError::UnsupportedInPlaceWrite(
            "the byte source is read-only".to_string(),
        ))
    }

    /// Truncate or extend the source to `size` bytes
    fn set_size(&mut self, size: u64) -> OleResult<()> {
        let _ = size;
        Err(OleError::UnsupportedInPlaceWrite(
            "the byte source is read-only".to_string(),
        ))
    }

    /// Whether [`write_at`](Self::write_at) is supported
    fn is_writable(&self) -> bool {
        false
    }

    /// Flush pending writes to durable storage
    fn flush(&mut self) -> OleResult<()> {
        Ok(())
    }

    /// Filesystem path of the source, if it has one
    fn location(&self) -> Option<&Path> {
        None
    }

    /// Reopen the source after its backing file was replaced
    fn reload(&mut self) -> OleResult<()> {
        Ok(())
    }
}

/// Source holding the whole container in memory
///
/// Used for streamed input that cannot be seeked and for freshly created
/// containers.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Drain a non-seekable reader into memory
    pub fn from_reader<R: Read>(mut reader: R) -> OleResult<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self { data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl ByteSource for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> OleResult<usize> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        if start >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }
}

/// Read-only source over any seekable reader
#[derive(Debug)]
pub struct ReaderSource<R: Read + Seek> {
    reader: R,
    size: u64,
}

impl<R: Read + Seek> ReaderSource<R> {
    pub fn new(mut reader: R) -> OleResult<Self> {
        let size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self { reader, size })
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read + Seek> ByteSource for ReaderSource<R> {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> OleResult<usize> {
        self.reader.seek(SeekFrom::Start(offset))?;
        read_fully(&mut self.reader, buf)
    }
}

/// Source backed by a file on disk
///
/// Opened read-only by [`FileSource::open`], or read-write by
/// [`FileSource::open_rw`] and [`FileSource::create`].
#[derive(Debug)]
pub struct FileSource {
    file: File,
    path: PathBuf,
    writable: bool,
    size: u64,
}

impl FileSource {
    /// Open an existing file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> OleResult<Self> {
        Self::with_mode(path.as_ref(), false, false)
    }

    /// Open an existing file for reading and in-place writing
    pub fn open_rw<P: AsRef<Path>>(path: P) -> OleResult<Self> {
        Self::with_mode(path.as_ref(), true, false)
    }

    /// Create (or truncate) a file for reading and writing
    pub fn create<P: AsRef<Path>>(path: P) -> OleResult<Self> {
        Self::with_mode(path.as_ref(), true, true)
    }

    fn with_mode(path: &Path, writable: bool, create: bool) -> OleResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .create(create)
            .truncate(create)
            .open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            writable,
            size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> OleResult<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        read_fully(&mut self.file, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> OleResult<()> {
        if !self.writable {
            return Err(OleError::UnsupportedInPlaceWrite(format!(
                "{} was opened read-only",
                self.path.display()
            )));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.size = self.size.max(offset + data.len() as u64);
        Ok(())
    }

    fn set_size(&mut self, size: u64) -> OleResult<()> {
        if !self.writable {
            return Err(OleError::UnsupportedInPlaceWrite(format!(
                "{} was opened read-only",
                self.path.display()
            )));
        }
        self.file.set_len(size)?;
        self.size = size;
        Ok(())
    }

    fn is_writable(&self) -> bool {
        self.writable
    }

    fn flush(&mut self) -> OleResult<()> {
        self.file.flush()?;
        if self.writable {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn reload(&mut self) -> OleResult<()> {
        let reopened = Self::with_mode(&self.path, self.writable, false)?;
        *self = reopened;
        Ok(())
    }
}

/// Read until `buf` is full or the reader is exhausted
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> OleResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_memory_source_short_read() {
        let mut source = MemorySource::new(vec![1, 2, 3, 4]);
        let mut buf = [0u8; 8];
        assert_eq!(source.read_at(2, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[3, 4]);
        assert_eq!(source.read_at(10, &mut buf).unwrap(), 0);
        assert!(!source.is_writable());
        assert!(source.write_at(0, b"x").is_err());
    }

    #[test]
    fn test_reader_source() {
        let mut source = ReaderSource::new(Cursor::new(vec![9u8; 100])).unwrap();
        assert_eq!(source.size(), 100);
        let mut buf = [0u8; 10];
        assert_eq!(source.read_at(95, &mut buf).unwrap(), 5);
        assert!(matches!(
            source.set_size(0),
            Err(OleError::UnsupportedInPlaceWrite(_))
        ));
    }

    #[test]
    fn test_file_source_modes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");

        let mut rw = FileSource::create(&path).unwrap();
        rw.write_at(4, b"abcd").unwrap();
        assert_eq!(rw.size(), 8);
        rw.flush().unwrap();

        let mut ro = FileSource::open(&path).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(ro.read_at(0, &mut buf).unwrap(), 8);
        assert_eq!(&buf[4..], b"abcd");
        assert!(ro.write_at(0, b"z").is_err());
        assert_eq!(ro.location(), Some(path.as_path()));
    }
}
