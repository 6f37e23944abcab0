//! Directory tree of a compound file
//!
//! The directory is an array of 128-byte entries. Each storage points at the
//! root of a binary tree holding its children (linked through the left and
//! right sibling fields); entries refer to each other by index (SID).
//!
//! # Implementation Notes
//!
//! Based on Apache POI's DirectoryProperty implementation.
//!
//! ## Directory Entry Ordering
//!
//! Children are ordered with POI's `PropertyComparator` rules, which Microsoft
//! Office relies on:
//!
//! 1. **Sort by name length first** (in UTF-16 code units)
//! 2. **Then by the uppercase name** for same-length names
//! 3. **Special case**: `_VBA_PROJECT` always comes last
//! 4. **Special case**: Names starting with `__` are pushed later
//!
//! ## Sibling Tree Structure
//!
//! After sorting, the middle element becomes the parent's child, entries
//! before it form a chain of left links and entries after it a chain of right
//! links. Every node is colored black. This is a valid binary search tree for
//! any conforming reader.
//!
//! ```text
//! Sorted order: ["Data", "1Table", "WordDocument"]
//!        Root Entry
//!             |
//!          1Table (midpoint)
//!          /      \
//!       Data    WordDocument
//! ```
//!
//! Deleted entries are marked empty and their slot is reused by later
//! creations; the array is never compacted while the container is open.

use super::consts::*;
use super::error::{OleError, OleResult};
use crate::common::binary::{decode_utf16le, encode_utf16le};
use chrono::{DateTime, Utc};
use fixedbitset::FixedBitSet;
use std::cmp::Ordering;
use zerocopy::{FromBytes, LE, U16, U32, U64};
use zerocopy_derive::FromBytes as DeriveFromBytes;

/// Raw OLE directory entry structure (128 bytes)
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawDirectoryEntry {
    /// Entry name in UTF-16LE (64 bytes, null-padded)
    name: [u8; 64],
    /// Length of name in bytes (including null terminator)
    name_len: U16<LE>,
    entry_type: u8,
    /// Node color (0 = red, 1 = black)
    node_color: u8,
    sid_left: U32<LE>,
    sid_right: U32<LE>,
    sid_child: U32<LE>,
    clsid: [u8; 16],
    state_bits: U32<LE>,
    /// Creation time (FILETIME)
    creation_time: U64<LE>,
    /// Modified time (FILETIME)
    modified_time: U64<LE>,
    start_sector: U32<LE>,
    stream_size: U64<LE>,
}

/// Type of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Unused slot
    Empty,
    Storage,
    Stream,
    /// The root storage (always SID 0)
    Root,
    /// Any other type byte, preserved as read
    Other(u8),
}

impl EntryKind {
    pub fn from_byte(value: u8) -> Self {
        match value {
            STGTY_EMPTY => EntryKind::Empty,
            STGTY_STORAGE => EntryKind::Storage,
            STGTY_STREAM => EntryKind::Stream,
            STGTY_ROOT => EntryKind::Root,
            other => EntryKind::Other(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            EntryKind::Empty => STGTY_EMPTY,
            EntryKind::Storage => STGTY_STORAGE,
            EntryKind::Stream => STGTY_STREAM,
            EntryKind::Root => STGTY_ROOT,
            EntryKind::Other(value) => value,
        }
    }

    /// Whether entries of this kind can have children
    pub fn is_storage(self) -> bool {
        matches!(self, EntryKind::Storage | EntryKind::Root)
    }
}

/// Represents an OLE directory entry (stream or storage)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Storage ID (index in directory)
    pub sid: u32,
    pub name: String,
    pub kind: EntryKind,
    pub color: u8,
    /// Index of left sibling
    pub left: u32,
    /// Index of right sibling
    pub right: u32,
    /// Index of the root of the children tree
    pub child: u32,
    pub clsid: [u8; 16],
    pub state_bits: u32,
    /// Creation time (FILETIME, 0 if unset)
    pub created: u64,
    /// Modification time (FILETIME, 0 if unset)
    pub modified: u64,
    /// First sector of the stream (mini sector for small streams)
    pub start_sector: u32,
    /// Size of the stream in bytes
    pub size: u64,
}

impl DirectoryEntry {
    /// An unused slot
    pub fn empty(sid: u32) -> Self {
        Self::new(sid, String::new(), EntryKind::Empty)
    }

    pub fn new(sid: u32, name: String, kind: EntryKind) -> Self {
        Self {
            sid,
            name,
            kind,
            color: COLOR_BLACK,
            left: NOSTREAM,
            right: NOSTREAM,
            child: NOSTREAM,
            clsid: [0; 16],
            state_bits: 0,
            created: 0,
            modified: 0,
            start_sector: ENDOFCHAIN,
            size: 0,
        }
    }

    pub fn is_stream(&self) -> bool {
        self.kind == EntryKind::Stream
    }

    pub fn is_storage(&self) -> bool {
        self.kind.is_storage()
    }

    pub fn is_empty(&self) -> bool {
        self.kind == EntryKind::Empty
    }

    /// Creation time, if set
    pub fn created_time(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.created)
    }

    /// Modification time, if set
    pub fn modified_time(&self) -> Option<DateTime<Utc>> {
        filetime_to_datetime(self.modified)
    }

    /// CLSID formatted as `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`, empty when unset
    pub fn clsid_string(&self) -> String {
        format_clsid(&self.clsid)
    }

    /// Parse a single directory entry from 128 bytes
    ///
    /// For 512-byte sector files only the low 32 bits of the size are used.
    pub fn parse(data: &[u8], sid: u32, sector_size: usize) -> OleResult<Self> {
        let raw = RawDirectoryEntry::read_from_bytes(data)
            .map_err(|_| OleError::directory(sid, "entry is not 128 bytes long"))?;

        let name_len = raw.name_len.get() as usize;
        let name_bytes = &raw.name[0..name_len.saturating_sub(2).min(64)];
        let name = decode_utf16le(name_bytes);

        let size = if sector_size == SECTOR_SIZE_V3 {
            raw.stream_size.get() & 0xFFFF_FFFF
        } else {
            raw.stream_size.get()
        };

        Ok(Self {
            sid,
            name,
            kind: EntryKind::from_byte(raw.entry_type),
            color: raw.node_color,
            left: raw.sid_left.get(),
            right: raw.sid_right.get(),
            child: raw.sid_child.get(),
            clsid: raw.clsid,
            state_bits: raw.state_bits.get(),
            created: raw.creation_time.get(),
            modified: raw.modified_time.get(),
            start_sector: raw.start_sector.get(),
            size,
        })
    }

    /// Write this entry to bytes (128 bytes per OLE2 layout)
    pub fn to_bytes(&self) -> [u8; DIRENTRY_SIZE] {
        let mut data = [0u8; DIRENTRY_SIZE];

        if !self.is_empty() {
            let encoded = encode_utf16le(&self.name);
            let len = encoded.len().min(MAX_NAME_LEN * 2);
            data[..len].copy_from_slice(&encoded[..len]);
            // Name length in bytes, including the null terminator
            data[64..66].copy_from_slice(&((len + 2) as u16).to_le_bytes());
        }

        data[66] = self.kind.to_byte();
        data[67] = self.color;
        data[68..72].copy_from_slice(&self.left.to_le_bytes());
        data[72..76].copy_from_slice(&self.right.to_le_bytes());
        data[76..80].copy_from_slice(&self.child.to_le_bytes());
        data[80..96].copy_from_slice(&self.clsid);
        data[96..100].copy_from_slice(&self.state_bits.to_le_bytes());
        data[100..108].copy_from_slice(&self.created.to_le_bytes());
        data[108..116].copy_from_slice(&self.modified.to_le_bytes());
        data[116..120].copy_from_slice(&self.start_sector.to_le_bytes());
        data[120..128].copy_from_slice(&self.size.to_le_bytes());

        data
    }
}

/// Convert a FILETIME (100 ns intervals since 1601-01-01) to UTC
pub fn filetime_to_datetime(filetime: u64) -> Option<DateTime<Utc>> {
    if filetime == 0 {
        return None;
    }
    let since_unix = filetime as i128 - FILETIME_UNIX_EPOCH as i128;
    let secs = i64::try_from(since_unix.div_euclid(10_000_000)).ok()?;
    let nanos = (since_unix.rem_euclid(10_000_000) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// Convert a UTC timestamp to a FILETIME, saturating at the representable range
pub fn datetime_to_filetime(time: DateTime<Utc>) -> u64 {
    let intervals = time.timestamp() as i128 * 10_000_000
        + (time.timestamp_subsec_nanos() / 100) as i128
        + FILETIME_UNIX_EPOCH as i128;
    intervals.clamp(0, u64::MAX as i128) as u64
}

/// Format CLSID as a human-readable string
fn format_clsid(bytes: &[u8; 16]) -> String {
    if bytes.iter().all(|&b| b == 0) {
        return String::new();
    }

    let data1 = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let data2 = u16::from_le_bytes([bytes[4], bytes[5]]);
    let data3 = u16::from_le_bytes([bytes[6], bytes[7]]);
    format!(
        "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
        data1,
        data2,
        data3,
        bytes[8],
        bytes[9],
        bytes[10],
        bytes[11],
        bytes[12],
        bytes[13],
        bytes[14],
        bytes[15],
    )
}

/// Case-insensitive name comparison (Unicode uppercase)
pub(crate) fn names_equal(a: &str, b: &str) -> bool {
    a == b || a.to_uppercase() == b.to_uppercase()
}

/// POI `PropertyComparator`: UTF-16 length first, then uppercase value
fn compare_names(name1: &str, name2: &str) -> Ordering {
    let len1 = name1.encode_utf16().count();
    let len2 = name2.encode_utf16().count();
    match len1.cmp(&len2) {
        Ordering::Equal => {
            if name1 == "_VBA_PROJECT" {
                return Ordering::Greater;
            }
            if name2 == "_VBA_PROJECT" {
                return Ordering::Less;
            }
            match (name1.starts_with("__"), name2.starts_with("__")) {
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                _ => name1.to_uppercase().cmp(&name2.to_uppercase()),
            }
        },
        other => other,
    }
}

/// Check a new entry name against the format's constraints
pub(crate) fn validate_name(name: &str) -> OleResult<()> {
    if name.is_empty() || name.contains(['/', '\\', ':', '!']) {
        return Err(OleError::InvalidName(name.to_string()));
    }
    let len = name.encode_utf16().count();
    if len > MAX_NAME_LEN {
        return Err(OleError::NameTooLong {
            name: name.to_string(),
            len,
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}

/// Directory arena, indexed by SID
#[derive(Debug, Clone)]
pub struct Directory {
    entries: Vec<DirectoryEntry>,
    sector_size: usize,
}

impl Directory {
    /// A directory holding only the root entry
    pub fn new(sector_size: usize) -> Self {
        let root = DirectoryEntry::new(0, ROOT_ENTRY_NAME.to_string(), EntryKind::Root);
        Self {
            entries: vec![root],
            sector_size,
        }
    }

    /// Parse the directory stream and validate the tree reachable from the root
    pub fn parse(data: &[u8], sector_size: usize) -> OleResult<Self> {
        let entries = data
            .chunks_exact(DIRENTRY_SIZE)
            .enumerate()
            .map(|(sid, chunk)| DirectoryEntry::parse(chunk, sid as u32, sector_size))
            .collect::<OleResult<Vec<_>>>()?;

        match entries.first() {
            Some(root) if root.kind == EntryKind::Root => {},
            Some(_) => return Err(OleError::directory(0, "first entry is not the root")),
            None => return Err(OleError::directory(0, "directory stream is empty")),
        }

        let directory = Self {
            entries,
            sector_size,
        };
        directory.validate_tree()?;
        Ok(directory)
    }

    /// Check that every link reachable from the root stays in range and that
    /// no entry is reached twice
    fn validate_tree(&self) -> OleResult<()> {
        let mut visited = FixedBitSet::with_capacity(self.entries.len());
        visited.insert(0);
        let mut pending = vec![(0u32, self.entries[0].child)];

        while let Some((from, sid)) = pending.pop() {
            if sid == NOSTREAM {
                continue;
            }
            let idx = sid as usize;
            if idx >= self.entries.len() {
                return Err(OleError::directory(
                    from,
                    format!("link to entry {} is out of range", sid),
                ));
            }
            if visited.put(idx) {
                return Err(OleError::directory(
                    sid,
                    "entry is linked more than once, tree loops",
                ));
            }

            let entry = &self.entries[idx];
            match entry.kind {
                EntryKind::Empty => {
                    return Err(OleError::directory(sid, "unused entry linked into the tree"));
                },
                EntryKind::Root => {
                    return Err(OleError::directory(sid, "root entry linked as a child"));
                },
                _ => {},
            }

            pending.push((sid, entry.left));
            pending.push((sid, entry.right));
            if entry.kind.is_storage() {
                pending.push((sid, entry.child));
            }
        }

        Ok(())
    }

    /// Serialize all entries, padded with unused entries to a whole sector
    pub fn to_bytes(&self) -> Vec<u8> {
        let per_sector = self.sector_size / DIRENTRY_SIZE;
        let slots = self.entries.len().div_ceil(per_sector) * per_sector;
        let mut data = Vec::with_capacity(slots * DIRENTRY_SIZE);
        for entry in &self.entries {
            data.extend_from_slice(&entry.to_bytes());
        }
        for sid in self.entries.len()..slots {
            data.extend_from_slice(&DirectoryEntry::empty(sid as u32).to_bytes());
        }
        data
    }

    /// Number of entry slots, including unused ones
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn root(&self) -> &DirectoryEntry {
        &self.entries[0]
    }

    pub(crate) fn root_mut(&mut self) -> &mut DirectoryEntry {
        &mut self.entries[0]
    }

    pub fn get(&self, sid: u32) -> Option<&DirectoryEntry> {
        self.entries.get(sid as usize)
    }

    pub(crate) fn get_mut(&mut self, sid: u32) -> Option<&mut DirectoryEntry> {
        self.entries.get_mut(sid as usize)
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    /// Update the stream location of an entry in one step
    pub(crate) fn set_stream(&mut self, sid: u32, start_sector: u32, size: u64) {
        if let Some(entry) = self.entries.get_mut(sid as usize) {
            entry.start_sector = start_sector;
            entry.size = size;
        }
    }

    /// Resolve a path of names to an entry, starting at the root
    ///
    /// An empty path resolves to the root. Names match case-insensitively.
    pub fn resolve(&self, path: &[&str]) -> OleResult<u32> {
        let mut current = 0u32;
        for segment in path {
            let entry = &self.entries[current as usize];
            if !entry.is_storage() {
                return Err(OleError::NotAStorage(entry.name.clone()));
            }
            current = self
                .find_child(current, segment)
                .ok_or_else(|| OleError::not_found(segment))?;
        }
        Ok(current)
    }

    /// Find a direct child of `parent` by name
    pub fn find_child(&self, parent: u32, name: &str) -> Option<u32> {
        self.list_children(parent)
            .into_iter()
            .find(|&sid| names_equal(&self.entries[sid as usize].name, name))
    }

    /// Children of a storage in sibling-tree order
    pub fn list_children(&self, parent: u32) -> Vec<u32> {
        let Some(entry) = self.entries.get(parent as usize) else {
            return Vec::new();
        };
        if !entry.is_storage() {
            return Vec::new();
        }

        let mut children = Vec::new();
        let mut stack = Vec::new();
        let mut current = entry.child;
        loop {
            while current != NOSTREAM && (current as usize) < self.entries.len() {
                if stack.len() + children.len() > self.entries.len() {
                    return children;
                }
                stack.push(current);
                current = self.entries[current as usize].left;
            }
            match stack.pop() {
                Some(sid) => {
                    children.push(sid);
                    current = self.entries[sid as usize].right;
                },
                None => break,
            }
        }
        children
    }

    /// Storage that holds `sid`, if any
    pub fn find_parent(&self, sid: u32) -> Option<u32> {
        (0..self.entries.len() as u32)
            .filter(|&p| self.entries[p as usize].is_storage())
            .find(|&p| self.list_children(p).contains(&sid))
    }

    /// Create a new entry under `parent` and re-thread the parent's children
    pub fn create_entry(&mut self, parent: u32, name: &str, kind: EntryKind) -> OleResult<u32> {
        validate_name(name)?;
        if matches!(kind, EntryKind::Empty | EntryKind::Root) {
            return Err(OleError::InvalidName(name.to_string()));
        }

        let parent_entry = self
            .entries
            .get(parent as usize)
            .ok_or_else(|| OleError::directory(parent, "no such entry"))?;
        if !parent_entry.is_storage() {
            return Err(OleError::NotAStorage(parent_entry.name.clone()));
        }
        if self.find_child(parent, name).is_some() {
            return Err(OleError::DuplicateName {
                parent: parent_entry.name.clone(),
                name: name.to_string(),
            });
        }

        let sid = match self.entries.iter().skip(1).position(|e| e.is_empty()) {
            Some(pos) => (pos + 1) as u32,
            None => {
                if self.entries.len() as u64 > MAXREGSID as u64 {
                    return Err(OleError::ContainerTooLarge(
                        "directory has no free entry slots".to_string(),
                    ));
                }
                self.entries.push(DirectoryEntry::empty(self.entries.len() as u32));
                (self.entries.len() - 1) as u32
            },
        };
        self.entries[sid as usize] = DirectoryEntry::new(sid, name.to_string(), kind);

        let mut children = self.list_children(parent);
        children.push(sid);
        self.link_children(parent, &children);

        log::debug!("created directory entry '{}' (sid {}) under {}", name, sid, parent);
        Ok(sid)
    }

    /// Remove an entry and re-thread its parent's children
    ///
    /// The entry's stream chain must already have been freed by the caller.
    pub fn remove_entry(&mut self, sid: u32) -> OleResult<()> {
        if sid == 0 {
            return Err(OleError::InvalidName(ROOT_ENTRY_NAME.to_string()));
        }
        let entry = self
            .entries
            .get(sid as usize)
            .ok_or_else(|| OleError::directory(sid, "no such entry"))?;
        if entry.is_storage() && entry.child != NOSTREAM {
            return Err(OleError::StorageNotEmpty(entry.name.clone()));
        }

        let parent = self
            .find_parent(sid)
            .ok_or_else(|| OleError::directory(sid, "entry is not linked into the tree"))?;
        let children: Vec<u32> = self
            .list_children(parent)
            .into_iter()
            .filter(|&c| c != sid)
            .collect();

        self.entries[sid as usize] = DirectoryEntry::empty(sid);
        self.link_children(parent, &children);
        Ok(())
    }

    /// Rebuild the sibling tree of `parent` from its current children
    pub fn rethread(&mut self, parent: u32) {
        let children = self.list_children(parent);
        self.link_children(parent, &children);
    }

    /// Link a parent's children as two black chains around the middle child
    fn link_children(&mut self, parent: u32, child_sids: &[u32]) {
        if child_sids.is_empty() {
            self.entries[parent as usize].child = NOSTREAM;
            return;
        }

        let mut sorted = child_sids.to_vec();
        sorted.sort_by(|&a, &b| {
            compare_names(&self.entries[a as usize].name, &self.entries[b as usize].name)
        });

        let midpoint = sorted.len() / 2;
        self.entries[parent as usize].child = sorted[midpoint];

        for (i, &sid) in sorted.iter().enumerate() {
            let (left, right) = match i.cmp(&midpoint) {
                // Left chain below the midpoint
                Ordering::Less => (if i > 0 { sorted[i - 1] } else { NOSTREAM }, NOSTREAM),
                Ordering::Equal => (
                    if i > 0 { sorted[i - 1] } else { NOSTREAM },
                    sorted.get(i + 1).copied().unwrap_or(NOSTREAM),
                ),
                // Right chain above the midpoint
                Ordering::Greater => (NOSTREAM, sorted.get(i + 1).copied().unwrap_or(NOSTREAM)),
            };
            let entry = &mut self.entries[sid as usize];
            entry.left = left;
            entry.right = right;
            entry.color = COLOR_BLACK;
        }
    }

    /// Paths of every stream, depth first in sibling-tree order
    pub fn stream_paths(&self) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        self.collect_streams(0, &mut Vec::new(), &mut paths);
        paths
    }

    /// SIDs of every stream reachable from the root, in the same order as
    /// [`stream_paths`](Self::stream_paths)
    pub fn stream_sids(&self) -> Vec<u32> {
        let mut sids = Vec::new();
        self.collect_stream_sids(0, &mut sids);
        sids
    }

    fn collect_stream_sids(&self, storage: u32, out: &mut Vec<u32>) {
        for sid in self.list_children(storage) {
            let entry = &self.entries[sid as usize];
            if entry.is_stream() {
                out.push(sid);
            } else if entry.is_storage() {
                self.collect_stream_sids(sid, out);
            }
        }
    }

    fn collect_streams(&self, storage: u32, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
        for sid in self.list_children(storage) {
            let entry = &self.entries[sid as usize];
            prefix.push(entry.name.clone());
            if entry.is_stream() {
                out.push(prefix.clone());
            } else if entry.is_storage() {
                self.collect_streams(sid, prefix, out);
            }
            prefix.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(dir: &Directory, sids: &[u32]) -> Vec<String> {
        sids.iter()
            .map(|&s| dir.get(s).unwrap().name.clone())
            .collect()
    }

    #[test]
    fn test_root_entry() {
        let dir = Directory::new(512);
        assert_eq!(dir.root().name, "Root Entry");
        assert_eq!(dir.root().kind, EntryKind::Root);
        assert_eq!(dir.to_bytes().len(), 512);
    }

    #[test]
    fn test_entry_bytes_round_trip() {
        let mut entry = DirectoryEntry::new(3, "WordDocument".to_string(), EntryKind::Stream);
        entry.start_sector = 10;
        entry.size = 512;
        entry.clsid[0] = 0x06;
        entry.created = FILETIME_UNIX_EPOCH + 10_000_000;

        let bytes = entry.to_bytes();
        assert_eq!(&bytes[64..66], &26u16.to_le_bytes());
        let parsed = DirectoryEntry::parse(&bytes, 3, 512).unwrap();
        assert_eq!(parsed, entry);
        assert_eq!(parsed.created_time().unwrap().timestamp(), 1);
        assert!(parsed.modified_time().is_none());
    }

    #[test]
    fn test_unknown_type_preserved() {
        let entry = DirectoryEntry::new(1, "Lock".to_string(), EntryKind::Other(STGTY_LOCKBYTES));
        let parsed = DirectoryEntry::parse(&entry.to_bytes(), 1, 512).unwrap();
        assert_eq!(parsed.kind, EntryKind::Other(3));
        assert_eq!(parsed.to_bytes(), entry.to_bytes());
    }

    #[test]
    fn test_v3_size_uses_low_bits() {
        let mut entry = DirectoryEntry::new(1, "S".to_string(), EntryKind::Stream);
        entry.size = 0x1_0000_0010;
        let bytes = entry.to_bytes();
        assert_eq!(DirectoryEntry::parse(&bytes, 1, 512).unwrap().size, 0x10);
        assert_eq!(DirectoryEntry::parse(&bytes, 1, 4096).unwrap().size, 0x1_0000_0010);
    }

    #[test]
    fn test_clsid_format() {
        let mut entry = DirectoryEntry::new(0, "Root Entry".to_string(), EntryKind::Root);
        assert_eq!(entry.clsid_string(), "");
        entry.clsid = [
            0x06, 0x09, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x46,
        ];
        assert_eq!(entry.clsid_string(), "00020906-0000-0000-C000-000000000046");
    }

    #[test]
    fn test_filetime_conversion() {
        let time = DateTime::from_timestamp(1_600_000_000, 500).unwrap();
        let filetime = datetime_to_filetime(time);
        let back = filetime_to_datetime(filetime).unwrap();
        assert_eq!(back.timestamp(), 1_600_000_000);
        assert!(filetime_to_datetime(0).is_none());
    }

    #[test]
    fn test_comparator_ordering() {
        assert_eq!(compare_names("Data", "1Table"), Ordering::Less);
        assert_eq!(compare_names("ABC", "xyz"), Ordering::Less);
        assert_eq!(compare_names("_VBA_PROJECT", "ZZZZZZZZZZZZ"), Ordering::Greater);
        assert_eq!(compare_names("__ab", "zzzz"), Ordering::Greater);
    }

    #[test]
    fn test_create_and_list_children() {
        let mut dir = Directory::new(512);
        for name in ["WordDocument", "1Table", "Data", "ObjectPool", "CompObj"] {
            let kind = if name == "ObjectPool" {
                EntryKind::Storage
            } else {
                EntryKind::Stream
            };
            dir.create_entry(0, name, kind).unwrap();
        }

        let children = dir.list_children(0);
        assert_eq!(
            names(&dir, &children),
            vec!["Data", "1Table", "CompObj", "ObjectPool", "WordDocument"]
        );

        // Midpoint is the child, halves form chains
        let root_child = dir.get(dir.root().child).unwrap();
        assert_eq!(root_child.name, "CompObj");
        let left = dir.get(root_child.left).unwrap();
        assert_eq!(left.name, "1Table");
        assert_eq!(dir.get(left.left).unwrap().name, "Data");
        let right = dir.get(root_child.right).unwrap();
        assert_eq!(right.name, "ObjectPool");
        assert_eq!(right.left, NOSTREAM);
        assert!(dir.entries().iter().all(|e| e.color == COLOR_BLACK));
    }

    #[test]
    fn test_duplicate_name_case_insensitive() {
        let mut dir = Directory::new(512);
        dir.create_entry(0, "Workbook", EntryKind::Stream).unwrap();
        let err = dir.create_entry(0, "WORKBOOK", EntryKind::Stream).unwrap_err();
        assert!(matches!(err, OleError::DuplicateName { .. }));
        assert_eq!(dir.list_children(0).len(), 1);
    }

    #[test]
    fn test_name_validation() {
        let mut dir = Directory::new(512);
        let long = "x".repeat(32);
        assert!(matches!(
            dir.create_entry(0, &long, EntryKind::Stream),
            Err(OleError::NameTooLong { len: 32, .. })
        ));
        assert!(dir.create_entry(0, &"x".repeat(31), EntryKind::Stream).is_ok());
        assert!(matches!(
            dir.create_entry(0, "a/b", EntryKind::Stream),
            Err(OleError::InvalidName(_))
        ));
        assert!(matches!(
            dir.create_entry(0, "", EntryKind::Stream),
            Err(OleError::InvalidName(_))
        ));
    }

    #[test]
    fn test_create_under_stream_fails() {
        let mut dir = Directory::new(512);
        let s = dir.create_entry(0, "S", EntryKind::Stream).unwrap();
        assert!(matches!(
            dir.create_entry(s, "T", EntryKind::Stream),
            Err(OleError::NotAStorage(_))
        ));
    }

    #[test]
    fn test_resolve_nested() {
        let mut dir = Directory::new(512);
        let storage = dir.create_entry(0, "Macros", EntryKind::Storage).unwrap();
        let stream = dir.create_entry(storage, "PROJECT", EntryKind::Stream).unwrap();

        assert_eq!(dir.resolve(&[]).unwrap(), 0);
        assert_eq!(dir.resolve(&["macros", "project"]).unwrap(), stream);
        match dir.resolve(&["Macros", "Missing"]) {
            Err(OleError::EntryNotFound { segment }) => assert_eq!(segment, "Missing"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            dir.stream_paths(),
            vec![vec!["Macros".to_string(), "PROJECT".to_string()]]
        );
    }

    #[test]
    fn test_remove_reuses_slot() {
        let mut dir = Directory::new(512);
        let a = dir.create_entry(0, "A", EntryKind::Stream).unwrap();
        let _b = dir.create_entry(0, "B", EntryKind::Stream).unwrap();
        dir.remove_entry(a).unwrap();
        assert!(dir.get(a).unwrap().is_empty());
        assert_eq!(names(&dir, &dir.list_children(0)), vec!["B"]);

        let c = dir.create_entry(0, "C", EntryKind::Stream).unwrap();
        assert_eq!(c, a);
        assert_eq!(dir.len(), 3);
    }

    #[test]
    fn test_remove_non_empty_storage() {
        let mut dir = Directory::new(512);
        let storage = dir.create_entry(0, "Box", EntryKind::Storage).unwrap();
        dir.create_entry(storage, "Item", EntryKind::Stream).unwrap();
        assert!(matches!(
            dir.remove_entry(storage),
            Err(OleError::StorageNotEmpty(_))
        ));
    }

    #[test]
    fn test_parse_round_trip() {
        let mut dir = Directory::new(512);
        dir.create_entry(0, "One", EntryKind::Stream).unwrap();
        dir.create_entry(0, "Two", EntryKind::Storage).unwrap();

        let parsed = Directory::parse(&dir.to_bytes(), 512).unwrap();
        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed.entries()[..3], dir.entries()[..3]);
        assert!(parsed.get(3).unwrap().is_empty());
    }

    #[test]
    fn test_parse_detects_cycle() {
        let mut dir = Directory::new(512);
        let a = dir.create_entry(0, "A", EntryKind::Stream).unwrap();
        dir.get_mut(a).unwrap().left = a;
        assert!(matches!(
            Directory::parse(&dir.to_bytes(), 512),
            Err(OleError::CorruptDirectory { .. })
        ));
    }

    #[test]
    fn test_parse_detects_out_of_range() {
        let mut dir = Directory::new(512);
        let a = dir.create_entry(0, "A", EntryKind::Stream).unwrap();
        dir.get_mut(a).unwrap().right = 77;
        assert!(matches!(
            Directory::parse(&dir.to_bytes(), 512),
            Err(OleError::CorruptDirectory { sid: 1, .. })
        ));
    }
}
