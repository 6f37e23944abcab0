//! Typed BIFF records and the record type table
//!
//! [`RecordTypeTable`] maps record types to their names and decoders. It is
//! an ordinary value: build one with [`RecordTypeTable::biff8`] and pass it
//! where records are decoded. Types without a decoder, and records whose
//! payload does not match the layout of their type, decode to
//! [`BiffRecord::Unknown`] so they can be written back unchanged.

use super::cell::{
    BLANK_SID, BOOLERR_SID, CellRecord, FORMULA_SID, LABEL_SID, LABELSST_SID, NUMBER_SID, RK_SID,
};
use super::error::{XlsError, XlsResult};
use super::records::{LogicalRecord, MAX_RECORD_DATA_SIZE};
use super::writer::RecordWriter;
use crate::common::binary::read_u16_le;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::io::Write;

pub const BOF_SID: u16 = 0x0809;
pub const EOF_SID: u16 = 0x000A;
pub const MULBLANK_SID: u16 = 0x00BE;

/// BOF record (beginning of a substream)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BofRecord {
    /// BIFF version (0x0600 for BIFF8)
    pub version: u16,
    /// Substream type (0x0005 workbook globals, 0x0010 worksheet, ...)
    pub substream_type: u16,
    /// Build, year and history fields
    pub rest: Vec<u8>,
}

impl BofRecord {
    pub fn parse(data: &[u8]) -> XlsResult<Self> {
        if data.len() < 4 {
            return Err(XlsError::InvalidLength {
                expected: 4,
                found: data.len(),
            });
        }
        Ok(Self {
            version: read_u16_le(data, 0)?,
            substream_type: read_u16_le(data, 2)?,
            rest: data[4..].to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.rest.len());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.substream_type.to_le_bytes());
        out.extend_from_slice(&self.rest);
        out
    }
}

/// MULBLANK record: a run of blank cells in one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulBlankRecord {
    pub row: u16,
    pub first_col: u16,
    /// One XF index per cell, starting at `first_col`
    pub xf_indexes: SmallVec<[u16; 8]>,
}

impl MulBlankRecord {
    /// Most cells one MULBLANK can hold without a CONTINUE record
    pub const MAX_CELLS: usize = (MAX_RECORD_DATA_SIZE - 6) / 2;

    pub fn last_col(&self) -> u16 {
        (self.first_col as usize + self.xf_indexes.len()).saturating_sub(1) as u16
    }

    pub fn parse(data: &[u8]) -> XlsResult<Self> {
        if data.len() < 8 || data.len() % 2 != 0 {
            return Err(XlsError::InvalidRecord {
                record_type: MULBLANK_SID,
                message: format!("payload of {} bytes", data.len()),
            });
        }
        let row = read_u16_le(data, 0)?;
        let first_col = read_u16_le(data, 2)?;
        let count = (data.len() - 6) / 2;
        let mut xf_indexes = SmallVec::with_capacity(count);
        for i in 0..count {
            xf_indexes.push(read_u16_le(data, 4 + i * 2)?);
        }
        let last_col = read_u16_le(data, data.len() - 2)?;
        if first_col as usize + count - 1 != last_col as usize {
            return Err(XlsError::InvalidRecord {
                record_type: MULBLANK_SID,
                message: format!(
                    "columns {}..={} do not match {} cells",
                    first_col, last_col, count
                ),
            });
        }
        Ok(Self {
            row,
            first_col,
            xf_indexes,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(6 + self.xf_indexes.len() * 2);
        out.extend_from_slice(&self.row.to_le_bytes());
        out.extend_from_slice(&self.first_col.to_le_bytes());
        for xf in &self.xf_indexes {
            out.extend_from_slice(&xf.to_le_bytes());
        }
        out.extend_from_slice(&self.last_col().to_le_bytes());
        out
    }

    /// The individual blank cells of the run
    pub fn blanks(&self) -> impl Iterator<Item = CellRecord> + '_ {
        self.xf_indexes
            .iter()
            .enumerate()
            .map(|(i, &xf)| CellRecord::blank(self.row, self.first_col + i as u16, xf))
    }
}

/// A decoded BIFF record
#[derive(Debug, Clone, PartialEq)]
pub enum BiffRecord {
    Bof(BofRecord),
    Eof,
    Cell(CellRecord),
    MulBlank(MulBlankRecord),
    /// Any other record, kept as raw bytes
    Unknown { sid: u16, data: Vec<u8> },
}

impl BiffRecord {
    pub fn sid(&self) -> u16 {
        match self {
            BiffRecord::Bof(_) => BOF_SID,
            BiffRecord::Eof => EOF_SID,
            BiffRecord::Cell(cell) => cell.sid(),
            BiffRecord::MulBlank(_) => MULBLANK_SID,
            BiffRecord::Unknown { sid, .. } => *sid,
        }
    }

    /// Encode the record payload
    pub fn encode(&self) -> Vec<u8> {
        match self {
            BiffRecord::Bof(bof) => bof.encode(),
            BiffRecord::Eof => Vec::new(),
            BiffRecord::Cell(cell) => cell.encode(),
            BiffRecord::MulBlank(mul) => mul.encode(),
            BiffRecord::Unknown { data, .. } => data.clone(),
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut RecordWriter<W>) -> XlsResult<()> {
        writer.write_record(self.sid(), &self.encode())
    }
}

/// Decodes the payload of one record type
pub type Decoder = fn(u16, &[u8]) -> XlsResult<BiffRecord>;

#[derive(Debug, Clone, Copy)]
struct RecordType {
    name: &'static str,
    decoder: Option<Decoder>,
}

fn decode_bof(_sid: u16, data: &[u8]) -> XlsResult<BiffRecord> {
    BofRecord::parse(data).map(BiffRecord::Bof)
}

fn decode_eof(_sid: u16, data: &[u8]) -> XlsResult<BiffRecord> {
    if !data.is_empty() {
        return Err(XlsError::InvalidLength {
            expected: 0,
            found: data.len(),
        });
    }
    Ok(BiffRecord::Eof)
}

fn decode_cell(sid: u16, data: &[u8]) -> XlsResult<BiffRecord> {
    CellRecord::parse(sid, data).map(BiffRecord::Cell)
}

fn decode_mulblank(_sid: u16, data: &[u8]) -> XlsResult<BiffRecord> {
    MulBlankRecord::parse(data).map(BiffRecord::MulBlank)
}

/// BIFF8 record names
const BIFF8_NAMES: &[(u16, &str)] = &[
    (0x0006, "FORMULA"),
    (0x000A, "EOF"),
    (0x000C, "CALCCOUNT"),
    (0x000D, "CALCMODE"),
    (0x000E, "PRECISION"),
    (0x000F, "REFMODE"),
    (0x0010, "DELTA"),
    (0x0011, "ITERATION"),
    (0x0012, "PROTECT"),
    (0x0013, "PASSWORD"),
    (0x0014, "HEADER"),
    (0x0015, "FOOTER"),
    (0x0017, "EXTERNSHEET"),
    (0x0018, "NAME"),
    (0x0019, "WINDOWPROTECT"),
    (0x001A, "VERTICALPAGEBREAKS"),
    (0x001B, "HORIZONTALPAGEBREAKS"),
    (0x001C, "NOTE"),
    (0x001D, "SELECTION"),
    (0x0022, "DATEMODE"),
    (0x0026, "LEFTMARGIN"),
    (0x0027, "RIGHTMARGIN"),
    (0x0028, "TOPMARGIN"),
    (0x0029, "BOTTOMMARGIN"),
    (0x002A, "PRINTHEADERS"),
    (0x002B, "PRINTGRIDLINES"),
    (0x002F, "FILEPASS"),
    (0x0031, "FONT"),
    (0x003C, "CONTINUE"),
    (0x003D, "WINDOW1"),
    (0x0040, "BACKUP"),
    (0x0041, "PANE"),
    (0x0042, "CODEPAGE"),
    (0x004D, "PLS"),
    (0x0055, "DEFCOLWIDTH"),
    (0x005C, "WRITEACCESS"),
    (0x005D, "OBJ"),
    (0x005F, "SAVERECALC"),
    (0x0063, "OBJPROTECT"),
    (0x007D, "COLINFO"),
    (0x0080, "GUTS"),
    (0x0081, "WSBOOL"),
    (0x0083, "HCENTER"),
    (0x0084, "VCENTER"),
    (0x0085, "BOUNDSHEET"),
    (0x008C, "COUNTRY"),
    (0x008D, "HIDEOBJ"),
    (0x0092, "PALETTE"),
    (0x009C, "FNGROUPCOUNT"),
    (0x00A1, "SETUP"),
    (0x00BD, "MULRK"),
    (0x00BE, "MULBLANK"),
    (0x00C1, "MMS"),
    (0x00D7, "DBCELL"),
    (0x00DA, "BOOKBOOL"),
    (0x00E0, "XF"),
    (0x00E1, "INTERFACEHDR"),
    (0x00E2, "INTERFACEEND"),
    (0x00E5, "MERGEDCELLS"),
    (0x00EB, "MSODRAWINGGROUP"),
    (0x00EC, "MSODRAWING"),
    (0x00ED, "MSODRAWINGSELECTION"),
    (0x00FC, "SST"),
    (0x00FD, "LABELSST"),
    (0x00FF, "EXTSST"),
    (0x013D, "TABID"),
    (0x0160, "USESELFS"),
    (0x0161, "DSF"),
    (0x01AE, "SUPBOOK"),
    (0x01AF, "PROT4REV"),
    (0x01B0, "CONDFMT"),
    (0x01B1, "CF"),
    (0x01B2, "DVAL"),
    (0x01B6, "TXO"),
    (0x01B7, "REFRESHALL"),
    (0x01B8, "HLINK"),
    (0x01BC, "PROT4REVPASS"),
    (0x01BE, "DV"),
    (0x01C1, "RECALCID"),
    (0x0200, "DIMENSIONS"),
    (0x0201, "BLANK"),
    (0x0203, "NUMBER"),
    (0x0204, "LABEL"),
    (0x0205, "BOOLERR"),
    (0x0207, "STRING"),
    (0x0208, "ROW"),
    (0x020B, "INDEX"),
    (0x0221, "ARRAY"),
    (0x0225, "DEFAULTROWHEIGHT"),
    (0x023E, "WINDOW2"),
    (0x027E, "RK"),
    (0x0293, "STYLE"),
    (0x041E, "FORMAT"),
    (0x04BC, "SHRFMLA"),
    (0x0809, "BOF"),
    (0x0862, "SHEETLAYOUT"),
    (0x0867, "SHEETPROTECTION"),
];

/// Record type to name and decoder mapping
#[derive(Debug, Clone, Default)]
pub struct RecordTypeTable {
    types: HashMap<u16, RecordType>,
}

impl RecordTypeTable {
    /// An empty table: every record decodes to [`BiffRecord::Unknown`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table of BIFF8 record types with decoders for BOF, EOF, the cell
    /// records and MULBLANK
    pub fn biff8() -> Self {
        let mut table = Self::new();
        for &(sid, name) in BIFF8_NAMES {
            table.types.insert(
                sid,
                RecordType {
                    name,
                    decoder: None,
                },
            );
        }
        table.set_decoder(BOF_SID, decode_bof);
        table.set_decoder(EOF_SID, decode_eof);
        table.set_decoder(MULBLANK_SID, decode_mulblank);
        for sid in [
            BLANK_SID,
            NUMBER_SID,
            RK_SID,
            BOOLERR_SID,
            LABELSST_SID,
            LABEL_SID,
            FORMULA_SID,
        ] {
            table.set_decoder(sid, decode_cell);
        }
        table
    }

    /// Register a record type, replacing any previous registration
    pub fn register(&mut self, sid: u16, name: &'static str, decoder: Option<Decoder>) {
        self.types.insert(sid, RecordType { name, decoder });
    }

    fn set_decoder(&mut self, sid: u16, decoder: Decoder) {
        if let Some(entry) = self.types.get_mut(&sid) {
            entry.decoder = Some(decoder);
        }
    }

    /// Name of a record type, `"UNKNOWN"` if it is not registered
    pub fn name(&self, sid: u16) -> &'static str {
        self.types.get(&sid).map_or("UNKNOWN", |entry| entry.name)
    }

    pub fn contains(&self, sid: u16) -> bool {
        self.types.contains_key(&sid)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Decode a record payload
    ///
    /// Never fails: undecodable payloads are kept as [`BiffRecord::Unknown`].
    pub fn decode(&self, sid: u16, data: &[u8]) -> BiffRecord {
        let Some(decoder) = self.types.get(&sid).and_then(|entry| entry.decoder) else {
            return BiffRecord::Unknown {
                sid,
                data: data.to_vec(),
            };
        };
        match decoder(sid, data) {
            Ok(record) => record,
            Err(err) => {
                log::debug!(
                    "keeping {} record (0x{:04X}) opaque: {}",
                    self.name(sid),
                    sid,
                    err
                );
                BiffRecord::Unknown {
                    sid,
                    data: data.to_vec(),
                }
            },
        }
    }

    pub fn decode_record(&self, record: &LogicalRecord) -> BiffRecord {
        self.decode(record.sid, &record.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ole::xls::records::RecordReader;
    use std::io::Cursor;

    #[test]
    fn test_names() {
        let table = RecordTypeTable::biff8();
        assert_eq!(table.name(0x0809), "BOF");
        assert_eq!(table.name(0x00BE), "MULBLANK");
        assert_eq!(table.name(0x7777), "UNKNOWN");
        assert!(table.contains(0x00FC));
        assert!(!RecordTypeTable::new().contains(0x0809));
    }

    #[test]
    fn test_decode_known_records() {
        let table = RecordTypeTable::biff8();
        let bof = [0x00, 0x06, 0x10, 0x00, 0xBB, 0x0D, 0xCC, 0x07];
        match table.decode(BOF_SID, &bof) {
            BiffRecord::Bof(record) => {
                assert_eq!(record.version, 0x0600);
                assert_eq!(record.substream_type, 0x0010);
                assert_eq!(record.encode(), bof.to_vec());
            },
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(table.decode(EOF_SID, &[]), BiffRecord::Eof);
    }

    #[test]
    fn test_malformed_known_record_stays_opaque() {
        let table = RecordTypeTable::biff8();
        let short_number = [0u8; 10];
        let record = table.decode(NUMBER_SID, &short_number);
        assert_eq!(
            record,
            BiffRecord::Unknown {
                sid: NUMBER_SID,
                data: short_number.to_vec()
            }
        );
        assert_eq!(record.encode(), short_number.to_vec());
    }

    #[test]
    fn test_unknown_record_passes_through() {
        let table = RecordTypeTable::biff8();
        let record = table.decode(0x00FC, &[1, 2, 3]);
        assert_eq!(record.sid(), 0x00FC);
        assert_eq!(record.encode(), vec![1, 2, 3]);
    }

    #[test]
    fn test_mulblank() {
        let data = [1, 0, 2, 0, 15, 0, 16, 0, 17, 0, 4, 0];
        let record = MulBlankRecord::parse(&data).unwrap();
        assert_eq!(record.row, 1);
        assert_eq!(record.first_col, 2);
        assert_eq!(record.last_col(), 4);
        assert_eq!(record.encode(), data.to_vec());
        let cols: Vec<u16> = record.blanks().map(|cell| cell.col()).collect();
        assert_eq!(cols, vec![2, 3, 4]);

        let mismatched = [1, 0, 2, 0, 15, 0, 16, 0, 9, 0];
        assert!(MulBlankRecord::parse(&mismatched).is_err());
    }

    #[test]
    fn test_mulblank_ending_at_last_column() {
        let record = MulBlankRecord {
            row: 0,
            first_col: 65534,
            xf_indexes: SmallVec::from_slice(&[15, 15]),
        };
        assert_eq!(record.last_col(), u16::MAX);
        let data = record.encode();
        assert_eq!(&data[data.len() - 2..], &[0xFF, 0xFF]);
        assert_eq!(MulBlankRecord::parse(&data).unwrap(), record);
    }

    #[test]
    fn test_stream_re_encodes_byte_for_byte() {
        let table = RecordTypeTable::biff8();
        let mut writer = RecordWriter::new(Vec::new());
        writer
            .write_record(BOF_SID, &[0x00, 0x06, 0x10, 0x00])
            .unwrap();
        writer
            .write_record(NUMBER_SID, &CellRecord::number(0, 0, 15, 1.5).encode())
            .unwrap();
        writer.write_record(0x00FC, &vec![0xAB; 9000]).unwrap();
        writer.write_record(EOF_SID, &[]).unwrap();
        let original = writer.into_inner();

        let mut rewritten = RecordWriter::new(Vec::new());
        for record in RecordReader::new(Cursor::new(original.clone())) {
            table
                .decode_record(&record.unwrap())
                .write_to(&mut rewritten)
                .unwrap();
        }
        assert_eq!(rewritten.into_inner(), original);
    }
}
