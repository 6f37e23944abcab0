//! Stream reading and writing
//!
//! A stream lives either in regular sectors chained through the FAT or, when
//! smaller than the mini stream cutoff, in 64-byte mini sectors chained
//! through the MiniFAT. The size alone selects the scheme, so a write that
//! crosses the cutoff moves the data to the other scheme.

use super::consts::*;
use super::directory::EntryKind;
use super::error::{OleError, OleResult};
use super::file::{OleFile, check_chain_covers};
use super::source::ByteSource;
use std::io::{self, Read};

/// How [`OleFile::write_stream`] treats the existing content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Replace the content; the new data goes to a fresh chain and the old
    /// chain is freed afterwards
    #[default]
    Truncate,
    /// Append to the existing content
    Append,
    /// Replace the content reusing the existing chain, growing or shrinking it
    InPlace,
}

/// Result of a best-effort read of a damaged stream
#[derive(Debug)]
pub struct Recovered {
    /// Bytes that could be read, at most the declared size
    pub data: Vec<u8>,
    /// Whether the whole declared size was read without problems
    pub complete: bool,
    /// First problem encountered, if any
    pub problem: Option<OleError>,
}

/// Resolved location of a stream's data
#[derive(Debug, Clone)]
pub(super) struct StreamLayout {
    pub(super) chain: Vec<u32>,
    pub(super) mini: bool,
    pub(super) size: u64,
}

/// Lazy reader over one stream
///
/// The sector chain is resolved when the reader is opened; sector contents
/// are read as they are consumed.
#[derive(Debug)]
pub struct StreamReader<'a, S: ByteSource> {
    ole: &'a mut OleFile<S>,
    layout: StreamLayout,
    pos: u64,
    /// Last unit read (chain index, data)
    current: Option<(usize, Vec<u8>)>,
}

impl<S: ByteSource> StreamReader<'_, S> {
    /// Declared size of the stream
    pub fn len(&self) -> u64 {
        self.layout.size
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size == 0
    }

    /// Bytes left to read
    pub fn remaining(&self) -> u64 {
        self.layout.size - self.pos
    }
}

impl<S: ByteSource> Read for StreamReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.layout.size {
            return Ok(0);
        }

        let unit = self.ole.unit_size(self.layout.mini);
        let index = (self.pos / unit as u64) as usize;
        let offset = (self.pos % unit as u64) as usize;

        let cached = matches!(self.current, Some((i, _)) if i == index);
        if !cached {
            let sector = self.layout.chain[index];
            let data = self
                .ole
                .read_unit(sector, self.layout.mini)
                .map_err(io::Error::other)?;
            self.current = Some((index, data));
        }
        let Some((_, data)) = &self.current else {
            return Ok(0);
        };

        let available = (unit - offset).min((self.layout.size - self.pos) as usize);
        let n = buf.len().min(available);
        buf[..n].copy_from_slice(&data[offset..offset + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl<S: ByteSource> OleFile<S> {
    /// Open a stream by path and return its full contents
    pub fn read(&mut self, path: &[&str]) -> OleResult<Vec<u8>> {
        let sid = self.directory.resolve(path)?;
        self.read_sid(sid)
    }

    /// Open a lazy reader over the stream at `path`
    ///
    /// Fails with [`OleError::CorruptChain`] if the stream's chain is damaged
    /// or shorter than its declared size.
    pub fn open_stream(&mut self, path: &[&str]) -> OleResult<StreamReader<'_, S>> {
        let sid = self.directory.resolve(path)?;
        let layout = self.stream_layout(sid)?;
        Ok(StreamReader {
            ole: self,
            layout,
            pos: 0,
            current: None,
        })
    }

    /// Read the stream with the given SID
    pub(super) fn read_sid(&mut self, sid: u32) -> OleResult<Vec<u8>> {
        let layout = self.stream_layout(sid)?;
        let unit = self.unit_size(layout.mini);
        let mut data = Vec::with_capacity(layout.chain.len() * unit);
        for &sector in &layout.chain {
            data.extend_from_slice(&self.read_unit(sector, layout.mini)?);
        }
        data.truncate(layout.size as usize);
        Ok(data)
    }

    /// Resolve the chain of a stream entry
    pub(super) fn stream_layout(&mut self, sid: u32) -> OleResult<StreamLayout> {
        let entry = self.entry_by_sid(sid)?;
        if !entry.is_stream() {
            return Err(OleError::NotAStream(entry.name.clone()));
        }
        let (start, size) = (entry.start_sector, entry.size);
        let mini = self.is_mini(size);

        if size == 0 {
            return Ok(StreamLayout {
                chain: Vec::new(),
                mini,
                size,
            });
        }

        let chain = if mini {
            self.ensure_mini_stream()?;
            self.minifat.chain_of(start)?
        } else {
            self.fat.chain_of(start)?
        };
        check_chain_covers(start, chain.len(), self.unit_size(mini), size)?;

        // Only the sectors covering the declared size are part of the data
        let needed = size.div_ceil(self.unit_size(mini) as u64) as usize;
        let mut chain = chain;
        chain.truncate(needed);
        Ok(StreamLayout { chain, mini, size })
    }

    pub(super) fn unit_size(&self, mini: bool) -> usize {
        if mini {
            MINI_SECTOR_SIZE
        } else {
            self.sector_size()
        }
    }

    /// Read one regular sector or one mini sector
    pub(super) fn read_unit(&mut self, sector: u32, mini: bool) -> OleResult<Vec<u8>> {
        if !mini {
            return self.read_sector(sector);
        }
        self.ensure_mini_stream()?;
        let mini_stream = self.mini_stream.as_deref().unwrap_or_default();
        let start = sector as usize * MINI_SECTOR_SIZE;
        if start >= mini_stream.len() {
            return Err(OleError::chain(
                sector,
                format!(
                    "mini sector lies beyond the end of the mini stream ({} bytes)",
                    mini_stream.len()
                ),
            ));
        }
        // The mini stream may end inside its last mini sector
        let end = (start + MINI_SECTOR_SIZE).min(mini_stream.len());
        let mut data = vec![0u8; MINI_SECTOR_SIZE];
        data[..end - start].copy_from_slice(&mini_stream[start..end]);
        Ok(data)
    }

    /// Best-effort read of a possibly damaged stream
    ///
    /// Follows the chain until the first bad link or unreadable sector and
    /// returns what was read. Path resolution errors are still returned as
    /// errors.
    pub fn read_stream_recovered(&mut self, path: &[&str]) -> OleResult<Recovered> {
        let sid = self.directory.resolve(path)?;
        let entry = self.entry_by_sid(sid)?;
        if !entry.is_stream() {
            return Err(OleError::NotAStream(entry.name.clone()));
        }
        let (name, start, size) = (entry.name.clone(), entry.start_sector, entry.size);
        if size == 0 {
            return Ok(Recovered {
                data: Vec::new(),
                complete: true,
                problem: None,
            });
        }

        let mini = self.is_mini(size);
        let (chain, mut problem) = if mini {
            match self.ensure_mini_stream() {
                Ok(()) => self.minifat.salvage_chain(start),
                Err(err) => (Vec::new(), Some(err)),
            }
        } else {
            self.fat.salvage_chain(start)
        };

        let mut data = Vec::new();
        for &sector in &chain {
            if data.len() as u64 >= size {
                break;
            }
            match self.read_unit(sector, mini) {
                Ok(unit) => data.extend_from_slice(&unit),
                Err(err) => {
                    problem.get_or_insert(err);
                    break;
                },
            }
        }
        data.truncate(size as usize);

        if problem.is_none() && (data.len() as u64) < size {
            problem = Some(OleError::chain(
                start,
                format!("chain ends after {} of {} bytes", data.len(), size),
            ));
        }
        let complete = problem.is_none();
        if let Some(ref err) = problem {
            log::warn!(
                "recovered {} of {} bytes from stream '{}': {}",
                data.len(),
                size,
                name,
                err
            );
        }

        Ok(Recovered {
            data,
            complete,
            problem,
        })
    }

    /// Write a stream, creating it and any missing parent storages
    ///
    /// Existing content is replaced.
    pub fn write(&mut self, path: &[&str], data: &[u8]) -> OleResult<()> {
        let (name, parents) = path
            .split_last()
            .ok_or_else(|| OleError::InvalidName(String::new()))?;
        self.transaction(|ole| {
            let parent = ole.ensure_storage_path(parents)?;
            let sid = match ole.directory.find_child(parent, name) {
                Some(sid) => sid,
                None => ole
                    .directory
                    .create_entry(parent, name, EntryKind::Stream)?,
            };
            ole.rewrite_stream(sid, data, WriteMode::Truncate)
        })
    }

    /// Write to an existing stream
    pub fn write_stream(&mut self, path: &[&str], data: &[u8], mode: WriteMode) -> OleResult<()> {
        let sid = self.directory.resolve(path)?;
        self.transaction(|ole| ole.rewrite_stream(sid, data, mode))
    }

    fn rewrite_stream(&mut self, sid: u32, data: &[u8], mode: WriteMode) -> OleResult<()> {
        let entry = self.entry_by_sid(sid)?;
        if !entry.is_stream() {
            return Err(OleError::NotAStream(entry.name.clone()));
        }
        let old_size = entry.size;
        let old_start = if old_size == 0 {
            ENDOFCHAIN
        } else {
            entry.start_sector
        };

        let appended;
        let content: &[u8] = if mode == WriteMode::Append {
            let mut current = self.read_sid(sid)?;
            current.extend_from_slice(data);
            appended = current;
            &appended
        } else {
            data
        };
        let new_size = content.len() as u64;
        self.check_stream_size(new_size)?;

        let old_mini = self.is_mini(old_size);
        let new_mini = self.is_mini(new_size);
        if (old_mini && old_size > 0) || (new_mini && new_size > 0) {
            self.ensure_mini_stream()?;
        }

        if old_mini == new_mini && mode != WriteMode::Truncate {
            let (start, chain) = self.resize_chain(old_start, new_mini, content.len())?;
            if new_mini {
                self.ensure_mini_capacity()?;
            }
            let from = if mode == WriteMode::Append {
                old_size as usize
            } else {
                0
            };
            self.store(&chain, new_mini, content, from);
            self.directory.set_stream(sid, start, new_size);
        } else {
            // Validate the old chain before touching anything
            let old_table = if old_mini { &self.minifat } else { &self.fat };
            old_table.chain_of(old_start)?;

            let (start, chain) = self.allocate_chain(new_mini, content.len())?;
            if new_mini {
                self.ensure_mini_capacity()?;
            }
            self.store(&chain, new_mini, content, 0);
            self.directory.set_stream(sid, start, new_size);

            if old_mini {
                self.minifat.free(old_start)?;
            } else {
                self.fat.free(old_start)?;
            }
            if old_mini != new_mini && old_size > 0 {
                log::debug!(
                    "stream {} moved to the {} ({} -> {} bytes)",
                    sid,
                    if new_mini { "mini stream" } else { "regular sectors" },
                    old_size,
                    new_size
                );
            }
        }
        Ok(())
    }

    fn allocate_chain(&mut self, mini: bool, len: usize) -> OleResult<(u32, Vec<u32>)> {
        let table = if mini {
            &mut self.minifat
        } else {
            &mut self.fat
        };
        let start = table.allocate_bytes(len)?;
        let chain = table.chain_of(start)?;
        Ok((start, chain))
    }

    fn resize_chain(&mut self, start: u32, mini: bool, len: usize) -> OleResult<(u32, Vec<u32>)> {
        let table = if mini {
            &mut self.minifat
        } else {
            &mut self.fat
        };
        let count = len.div_ceil(table.sector_size());
        let start = table.resize(start, count)?;
        let chain = table.chain_of(start)?;
        Ok((start, chain))
    }

    /// Check that the regular sectors needed to hold the grown mini stream
    /// can still be allocated
    fn ensure_mini_capacity(&self) -> OleResult<()> {
        let sector_size = self.sector_size();
        let needed = (self.minifat.len() * MINI_SECTOR_SIZE).div_ceil(sector_size);
        let current = (self.directory.root().size as usize).div_ceil(sector_size);
        if needed > current {
            self.fat.ensure_capacity(needed - current)?;
        }
        Ok(())
    }

    /// Write `content` into the units of `chain`, starting with the unit that
    /// holds byte `from`
    pub(super) fn store(&mut self, chain: &[u32], mini: bool, content: &[u8], from: usize) {
        let unit = self.unit_size(mini);
        for (i, &sector) in chain.iter().enumerate().skip(from / unit) {
            let begin = i * unit;
            let end = (begin + unit).min(content.len());
            let mut block = vec![0u8; unit];
            if begin < end {
                block[..end - begin].copy_from_slice(&content[begin..end]);
            }

            if mini {
                let mini_stream = self.mini_stream.get_or_insert_with(Vec::new);
                let offset = sector as usize * MINI_SECTOR_SIZE;
                if mini_stream.len() < offset + MINI_SECTOR_SIZE {
                    mini_stream.resize(offset + MINI_SECTOR_SIZE, 0);
                }
                mini_stream[offset..offset + MINI_SECTOR_SIZE].copy_from_slice(&block);
            } else {
                self.dirty.insert(sector, block);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::OleOptions;

    #[test]
    fn test_small_stream_round_trip() {
        let mut ole = OleFile::new();
        ole.write(&["Small"], b"Hello, World!").unwrap();
        assert_eq!(ole.read(&["Small"]).unwrap(), b"Hello, World!");
        assert_eq!(ole.entry(&["Small"]).unwrap().size, 13);
        assert_eq!(ole.minifat.len(), 1);
        assert!(ole.fat.is_empty());
    }

    #[test]
    fn test_lazy_reader() {
        let mut ole = OleFile::new();
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        ole.write(&["Data"], &payload).unwrap();

        let mut reader = ole.open_stream(&["Data"]).unwrap();
        assert_eq!(reader.len(), 10_000);
        let mut first = [0u8; 700];
        reader.read_exact(&mut first).unwrap();
        assert_eq!(&first[..], &payload[..700]);
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, &payload[700..]);

        // Re-openable
        let mut again = Vec::new();
        ole.open_stream(&["data"]).unwrap().read_to_end(&mut again).unwrap();
        assert_eq!(again, payload);
    }

    #[test]
    fn test_append_migrates_to_regular_sectors() {
        let mut ole = OleFile::new();
        ole.write(&["Grow"], &vec![1u8; 4000]).unwrap();
        assert!(ole.minifat.len() > 0);

        ole.write_stream(&["Grow"], &vec![2u8; 200], WriteMode::Append)
            .unwrap();
        let data = ole.read(&["Grow"]).unwrap();
        assert_eq!(data.len(), 4200);
        assert!(data[..4000].iter().all(|&b| b == 1));
        assert!(data[4000..].iter().all(|&b| b == 2));

        // The mini sectors went back to the free pool
        assert_eq!(ole.minifat.free_count(), ole.minifat.len());
        assert_eq!(ole.fat.chain_of(ole.entry(&["Grow"]).unwrap().start_sector).unwrap().len(), 9);
    }

    #[test]
    fn test_shrink_migrates_to_mini_stream() {
        let mut ole = OleFile::new();
        ole.write(&["S"], &vec![3u8; 9000]).unwrap();
        ole.write_stream(&["S"], b"short", WriteMode::InPlace).unwrap();
        assert_eq!(ole.read(&["S"]).unwrap(), b"short");
        assert_eq!(ole.fat.free_count(), ole.fat.len());
    }

    #[test]
    fn test_in_place_reuses_chain() {
        let mut ole = OleFile::new();
        ole.write(&["S"], &vec![1u8; 6000]).unwrap();
        let start = ole.entry(&["S"]).unwrap().start_sector;

        ole.write_stream(&["S"], &vec![2u8; 5000], WriteMode::InPlace)
            .unwrap();
        assert_eq!(ole.entry(&["S"]).unwrap().start_sector, start);
        assert_eq!(ole.read(&["S"]).unwrap(), vec![2u8; 5000]);
        assert_eq!(ole.fat.chain_of(start).unwrap().len(), 10);
    }

    #[test]
    fn test_truncate_uses_fresh_chain() {
        let mut ole = OleFile::new();
        ole.write(&["S"], &vec![1u8; 6000]).unwrap();
        let start = ole.entry(&["S"]).unwrap().start_sector;

        ole.write_stream(&["S"], &vec![2u8; 6000], WriteMode::Truncate)
            .unwrap();
        assert_ne!(ole.entry(&["S"]).unwrap().start_sector, start);
        assert_eq!(ole.read(&["S"]).unwrap(), vec![2u8; 6000]);
        assert_eq!(ole.fat.len() - ole.fat.free_count(), 12);
    }

    #[test]
    fn test_empty_stream() {
        let mut ole = OleFile::new();
        ole.write(&["Empty"], b"").unwrap();
        assert!(ole.read(&["Empty"]).unwrap().is_empty());
        assert!(ole.open_stream(&["Empty"]).unwrap().is_empty());
    }

    #[test]
    fn test_read_storage_is_not_a_stream() {
        let mut ole = OleFile::new();
        ole.create_storage(&["Box"]).unwrap();
        assert!(matches!(ole.read(&["Box"]), Err(OleError::NotAStream(_))));
        assert!(matches!(
            ole.write(&["Box"], b"x"),
            Err(OleError::NotAStream(_))
        ));
    }

    #[test]
    fn test_size_limit_rolls_back() {
        let options = OleOptions::new().with_max_sectors(8);
        let mut ole = OleFile::with_options(options).unwrap();
        ole.write(&["Fits"], &vec![1u8; 4096]).unwrap();
        let fat_before = ole.fat.entries().to_vec();

        let err = ole.write(&["New", "TooBig"], &vec![2u8; 8192]).unwrap_err();
        assert!(matches!(err, OleError::ContainerTooLarge(_)));
        assert!(!ole.exists(&["New"]));
        assert_eq!(ole.fat.entries(), fat_before.as_slice());
        assert_eq!(ole.read(&["Fits"]).unwrap(), vec![1u8; 4096]);
    }

    #[test]
    fn test_recovered_read_of_looping_chain() {
        let mut ole = OleFile::new();
        ole.write(&["S"], &vec![5u8; 2048]).unwrap();
        ole.write(&["T"], &vec![6u8; 5000]).unwrap();
        let start = ole.entry(&["T"]).unwrap().start_sector;
        let chain = ole.fat.chain_of(start).unwrap();
        // Point the third sector back at the second
        ole.fat.set_next(chain[2], chain[1]);

        assert!(matches!(
            ole.read(&["T"]),
            Err(OleError::CorruptChain { .. })
        ));
        let recovered = ole.read_stream_recovered(&["T"]).unwrap();
        assert!(!recovered.complete);
        assert_eq!(recovered.data.len(), 3 * 512);
        assert!(recovered.data.iter().all(|&b| b == 6));

        let fine = ole.read_stream_recovered(&["S"]).unwrap();
        assert!(fine.complete);
        assert_eq!(fine.data.len(), 2048);
    }
}
