//! BIFF record stream writing
//!
//! Payloads longer than [`MAX_RECORD_DATA_SIZE`] are split into a primary
//! record followed by `CONTINUE` records.

use super::error::{XlsError, XlsResult};
use super::records::{CONTINUE_SID, LogicalRecord, MAX_RECORD_DATA_SIZE};
use std::io::Write;

/// Write a BIFF record header
#[inline]
pub(crate) fn write_record_header<W: Write>(
    writer: &mut W,
    record_type: u16,
    data_len: u16,
) -> XlsResult<()> {
    writer.write_all(&record_type.to_le_bytes())?;
    writer.write_all(&data_len.to_le_bytes())?;
    Ok(())
}

/// Writes records to a BIFF stream
#[derive(Debug)]
pub struct RecordWriter<W> {
    writer: W,
    bytes_written: u64,
    records_written: usize,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            bytes_written: 0,
            records_written: 0,
        }
    }

    /// Write one logical record
    ///
    /// An empty payload produces a single record with no data.
    pub fn write_record(&mut self, sid: u16, payload: &[u8]) -> XlsResult<()> {
        if payload.len() <= MAX_RECORD_DATA_SIZE {
            return self.write_physical(sid, payload);
        }
        for (i, chunk) in payload.chunks(MAX_RECORD_DATA_SIZE).enumerate() {
            let record_type = if i == 0 { sid } else { CONTINUE_SID };
            self.write_physical(record_type, chunk)?;
        }
        Ok(())
    }

    /// Write a record as read, keeping its original fragment boundaries
    ///
    /// Falls back to the standard split when the recorded fragment sizes do
    /// not add up to the payload.
    pub fn write_logical(&mut self, record: &LogicalRecord) -> XlsResult<()> {
        let total: usize = record.fragments.iter().map(|&len| len as usize).sum();
        if total != record.data.len() || record.fragments.is_empty() {
            return self.write_record(record.sid, &record.data);
        }
        let mut pos = 0;
        for (i, &len) in record.fragments.iter().enumerate() {
            let record_type = if i == 0 { record.sid } else { CONTINUE_SID };
            let end = pos + len as usize;
            self.write_physical(record_type, &record.data[pos..end])?;
            pos = end;
        }
        Ok(())
    }

    fn write_physical(&mut self, record_type: u16, data: &[u8]) -> XlsResult<()> {
        let len = u16::try_from(data.len()).map_err(|_| XlsError::InvalidLength {
            expected: MAX_RECORD_DATA_SIZE,
            found: data.len(),
        })?;
        write_record_header(&mut self.writer, record_type, len)?;
        self.writer.write_all(data)?;
        self.bytes_written += 4 + data.len() as u64;
        self.records_written += 1;
        Ok(())
    }

    /// Bytes written so far, headers included
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Physical records written so far
    pub fn records_written(&self) -> usize {
        self.records_written
    }

    pub fn flush(&mut self) -> XlsResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
