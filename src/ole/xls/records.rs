//! BIFF record stream reading
//!
//! A BIFF stream is a sequence of records, each a 4-byte header (type and
//! payload length, both `u16`) followed by the payload. Payloads are limited to
//! [`MAX_RECORD_DATA_SIZE`] bytes; longer logical records continue in
//! `CONTINUE` (0x003C) records that immediately follow them.
//!
//! [`RecordReader`] joins a record and its continuations into one
//! [`LogicalRecord`]. Unknown record types pass through untouched.

use crate::ole::xls::error::{XlsError, XlsResult};
use smallvec::SmallVec;
use std::io::{ErrorKind, Read};

/// Record type of a continuation record
pub const CONTINUE_SID: u16 = 0x003C;

/// Maximum payload of a single physical record
pub const MAX_RECORD_DATA_SIZE: usize = 8224;

/// Size of a record header
pub const RECORD_HEADER_SIZE: usize = 4;

/// BIFF record header (4 bytes: type + length)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub record_type: u16,
    pub data_len: u16,
    /// Stream offset of the header
    pub offset: u64,
}

/// A record with all of its continuations joined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalRecord {
    pub sid: u16,
    /// Stream offset of the first header
    pub offset: u64,
    pub data: Vec<u8>,
    /// Payload sizes of the physical records, primary record first
    pub fragments: SmallVec<[u16; 4]>,
}

impl LogicalRecord {
    /// Number of physical records this record was read from
    pub fn physical_count(&self) -> usize {
        self.fragments.len()
    }

    /// Whether CONTINUE records were joined into this record
    pub fn is_continued(&self) -> bool {
        self.fragments.len() > 1
    }
}

/// Reader position within the record grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    AwaitingRecordHeader,
    ReadingPayload,
    CheckingForContinuation,
    ReadingContinuationPayload,
    RecordComplete,
    Finished,
}

/// Reads logical records from a BIFF stream
///
/// Any error ends the stream: later calls return `Ok(None)`.
#[derive(Debug)]
pub struct RecordReader<R> {
    reader: R,
    state: ReaderState,
    /// Bytes consumed so far
    position: u64,
    /// Header read while looking for continuations
    lookahead: Option<RecordHeader>,
    /// Header whose payload is read next
    header: Option<RecordHeader>,
    current: Option<LogicalRecord>,
    /// Error found after the current record was complete, raised on the
    /// next call
    deferred: Option<XlsError>,
}

impl<R: Read> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: ReaderState::AwaitingRecordHeader,
            position: 0,
            lookahead: None,
            header: None,
            current: None,
            deferred: None,
        }
    }

    /// Stream offset of the next unread byte
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next logical record, or `None` at the end of the stream
    ///
    /// Fails with [`XlsError::TruncatedRecord`] when the stream ends inside a
    /// header or a payload, and with [`XlsError::InvalidRecord`] when a header
    /// declares more than [`MAX_RECORD_DATA_SIZE`] bytes. A record that is
    /// complete before such a header is still returned first.
    pub fn next_record(&mut self) -> XlsResult<Option<LogicalRecord>> {
        match self.advance() {
            Ok(record) => Ok(record),
            Err(err) => {
                self.state = ReaderState::Finished;
                self.current = None;
                self.lookahead = None;
                self.deferred = None;
                Err(err)
            },
        }
    }

    fn advance(&mut self) -> XlsResult<Option<LogicalRecord>> {
        loop {
            match self.state {
                ReaderState::AwaitingRecordHeader => {
                    if let Some(err) = self.deferred.take() {
                        return Err(err);
                    }
                    let header = match self.lookahead.take() {
                        Some(header) => header,
                        None => match self.read_header()? {
                            Some(header) => header,
                            None => {
                                self.state = ReaderState::Finished;
                                return Ok(None);
                            },
                        },
                    };
                    if header.record_type == CONTINUE_SID {
                        log::debug!(
                            "CONTINUE record at offset {} has no preceding record",
                            header.offset
                        );
                    }
                    self.current = Some(LogicalRecord {
                        sid: header.record_type,
                        offset: header.offset,
                        data: Vec::with_capacity(header.data_len as usize),
                        fragments: SmallVec::new(),
                    });
                    self.header = Some(header);
                    self.state = ReaderState::ReadingPayload;
                },
                ReaderState::ReadingPayload | ReaderState::ReadingContinuationPayload => {
                    if let Some(header) = self.header.take() {
                        self.read_payload(header)?;
                    }
                    self.state = ReaderState::CheckingForContinuation;
                },
                ReaderState::CheckingForContinuation => match self.read_header() {
                    Ok(Some(header)) if header.record_type == CONTINUE_SID => {
                        self.header = Some(header);
                        self.state = ReaderState::ReadingContinuationPayload;
                    },
                    Ok(other) => {
                        self.lookahead = other;
                        self.state = ReaderState::RecordComplete;
                    },
                    Err(err) => {
                        self.deferred = Some(err);
                        self.state = ReaderState::RecordComplete;
                    },
                },
                ReaderState::RecordComplete => {
                    self.state = ReaderState::AwaitingRecordHeader;
                    return Ok(self.current.take());
                },
                ReaderState::Finished => return Ok(None),
            }
        }
    }

    /// Read a record header; `None` at a clean end of stream
    fn read_header(&mut self) -> XlsResult<Option<RecordHeader>> {
        let offset = self.position;
        let mut buf = [0u8; RECORD_HEADER_SIZE];
        let n = self.fill(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        if n < RECORD_HEADER_SIZE {
            let sid = if n >= 2 {
                u16::from_le_bytes([buf[0], buf[1]])
            } else {
                0
            };
            return Err(XlsError::TruncatedRecord {
                sid,
                offset,
                expected: RECORD_HEADER_SIZE,
                available: n,
            });
        }
        let header = RecordHeader {
            record_type: u16::from_le_bytes([buf[0], buf[1]]),
            data_len: u16::from_le_bytes([buf[2], buf[3]]),
            offset,
        };
        if header.data_len as usize > MAX_RECORD_DATA_SIZE {
            return Err(XlsError::InvalidRecord {
                record_type: header.record_type,
                message: format!(
                    "declared length {} at offset {} exceeds {} bytes",
                    header.data_len, offset, MAX_RECORD_DATA_SIZE
                ),
            });
        }
        Ok(Some(header))
    }

    fn read_payload(&mut self, header: RecordHeader) -> XlsResult<()> {
        let len = header.data_len as usize;
        let mut buf = vec![0u8; len];
        let n = self.fill(&mut buf)?;
        if n < len {
            return Err(XlsError::TruncatedRecord {
                sid: header.record_type,
                offset: header.offset,
                expected: len,
                available: n,
            });
        }
        if let Some(record) = self.current.as_mut() {
            record.data.extend_from_slice(&buf);
            record.fragments.push(header.data_len);
        }
        Ok(())
    }

    /// Read until `buf` is full or the stream ends
    fn fill(&mut self, buf: &mut [u8]) -> XlsResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.position += filled as u64;
        Ok(filled)
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = XlsResult<LogicalRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
