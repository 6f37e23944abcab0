//! Cell value records
//!
//! Each variant maps onto one BIFF8 cell record. Parsing requires the exact
//! payload layout of the record type and keeps every field needed to encode
//! the record again byte for byte.

use super::error::{XlsError, XlsResult};
use crate::common::binary::{
    decode_compressed, decode_utf16le_strict, encode_utf16le, read_f64_le, read_u16_le,
    read_u32_le,
};

pub const BLANK_SID: u16 = 0x0201;
pub const NUMBER_SID: u16 = 0x0203;
pub const LABEL_SID: u16 = 0x0204;
pub const BOOLERR_SID: u16 = 0x0205;
pub const RK_SID: u16 = 0x027E;
pub const LABELSST_SID: u16 = 0x00FD;
pub const FORMULA_SID: u16 = 0x0006;

/// Cell record types
#[derive(Debug, Clone, PartialEq)]
pub enum CellRecord {
    /// BLANK record (formatted empty cell)
    Blank { row: u16, col: u16, xf_index: u16 },
    /// NUMBER record (IEEE 754 double)
    Number {
        row: u16,
        col: u16,
        xf_index: u16,
        value: f64,
    },
    /// RK record (compressed number, kept in its raw form)
    Rk {
        row: u16,
        col: u16,
        xf_index: u16,
        rk: u32,
    },
    /// BOOLERR record (boolean or error code)
    BoolErr {
        row: u16,
        col: u16,
        xf_index: u16,
        value: u8,
        is_error: bool,
    },
    /// LABELSST record (index into the shared string table)
    LabelSst {
        row: u16,
        col: u16,
        xf_index: u16,
        sst_index: u32,
    },
    /// LABEL record (inline string)
    Label {
        row: u16,
        col: u16,
        xf_index: u16,
        text: String,
        /// Stored as UTF-16 rather than compressed single bytes
        unicode: bool,
    },
    /// FORMULA record with its cached result
    Formula {
        row: u16,
        col: u16,
        xf_index: u16,
        result: [u8; 8],
        options: u16,
        cache: u32,
        expression: Vec<u8>,
        /// Additional token data following the expression
        extra: Vec<u8>,
    },
}

/// Cached result of a formula
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FormulaValue {
    Number(f64),
    /// The string follows in a STRING record
    String,
    Bool(bool),
    Error(u8),
    Empty,
}

/// Decode an RK value
pub fn rk_value(rk: u32) -> f64 {
    let value = if rk & 0x02 != 0 {
        ((rk as i32) >> 2) as f64
    } else {
        f64::from_bits(((rk & 0xFFFF_FFFC) as u64) << 32)
    };
    if rk & 0x01 != 0 { value / 100.0 } else { value }
}

fn expect_len(data: &[u8], expected: usize) -> XlsResult<()> {
    if data.len() != expected {
        return Err(XlsError::InvalidLength {
            expected,
            found: data.len(),
        });
    }
    Ok(())
}

fn push_position(out: &mut Vec<u8>, row: u16, col: u16, xf_index: u16) {
    out.extend_from_slice(&row.to_le_bytes());
    out.extend_from_slice(&col.to_le_bytes());
    out.extend_from_slice(&xf_index.to_le_bytes());
}

impl CellRecord {
    /// Create a LABEL, compressed when every character fits in one byte
    pub fn label(row: u16, col: u16, xf_index: u16, text: impl Into<String>) -> Self {
        let text = text.into();
        let unicode = text.chars().any(|c| c as u32 > 0xFF);
        CellRecord::Label {
            row,
            col,
            xf_index,
            text,
            unicode,
        }
    }

    pub fn blank(row: u16, col: u16, xf_index: u16) -> Self {
        CellRecord::Blank { row, col, xf_index }
    }

    pub fn number(row: u16, col: u16, xf_index: u16, value: f64) -> Self {
        CellRecord::Number {
            row,
            col,
            xf_index,
            value,
        }
    }

    pub fn row(&self) -> u16 {
        match self {
            CellRecord::Blank { row, .. }
            | CellRecord::Number { row, .. }
            | CellRecord::Rk { row, .. }
            | CellRecord::BoolErr { row, .. }
            | CellRecord::LabelSst { row, .. }
            | CellRecord::Label { row, .. }
            | CellRecord::Formula { row, .. } => *row,
        }
    }

    pub fn col(&self) -> u16 {
        match self {
            CellRecord::Blank { col, .. }
            | CellRecord::Number { col, .. }
            | CellRecord::Rk { col, .. }
            | CellRecord::BoolErr { col, .. }
            | CellRecord::LabelSst { col, .. }
            | CellRecord::Label { col, .. }
            | CellRecord::Formula { col, .. } => *col,
        }
    }

    pub fn xf_index(&self) -> u16 {
        match self {
            CellRecord::Blank { xf_index, .. }
            | CellRecord::Number { xf_index, .. }
            | CellRecord::Rk { xf_index, .. }
            | CellRecord::BoolErr { xf_index, .. }
            | CellRecord::LabelSst { xf_index, .. }
            | CellRecord::Label { xf_index, .. }
            | CellRecord::Formula { xf_index, .. } => *xf_index,
        }
    }

    pub fn set_position(&mut self, new_row: u16, new_col: u16) {
        match self {
            CellRecord::Blank { row, col, .. }
            | CellRecord::Number { row, col, .. }
            | CellRecord::Rk { row, col, .. }
            | CellRecord::BoolErr { row, col, .. }
            | CellRecord::LabelSst { row, col, .. }
            | CellRecord::Label { row, col, .. }
            | CellRecord::Formula { row, col, .. } => {
                *row = new_row;
                *col = new_col;
            },
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, CellRecord::Blank { .. })
    }

    pub fn sid(&self) -> u16 {
        match self {
            CellRecord::Blank { .. } => BLANK_SID,
            CellRecord::Number { .. } => NUMBER_SID,
            CellRecord::Rk { .. } => RK_SID,
            CellRecord::BoolErr { .. } => BOOLERR_SID,
            CellRecord::LabelSst { .. } => LABELSST_SID,
            CellRecord::Label { .. } => LABEL_SID,
            CellRecord::Formula { .. } => FORMULA_SID,
        }
    }

    /// Numeric value of NUMBER and RK records
    pub fn number_value(&self) -> Option<f64> {
        match self {
            CellRecord::Number { value, .. } => Some(*value),
            CellRecord::Rk { rk, .. } => Some(rk_value(*rk)),
            _ => None,
        }
    }

    /// Cached result of a FORMULA record
    pub fn formula_value(&self) -> Option<FormulaValue> {
        let CellRecord::Formula { result, .. } = self else {
            return None;
        };
        if result[6] != 0xFF || result[7] != 0xFF {
            return Some(FormulaValue::Number(f64::from_le_bytes(*result)));
        }
        Some(match result[0] {
            0 => FormulaValue::String,
            1 => FormulaValue::Bool(result[2] != 0),
            2 => FormulaValue::Error(result[2]),
            _ => FormulaValue::Empty,
        })
    }

    /// Parse a cell record payload
    pub fn parse(sid: u16, data: &[u8]) -> XlsResult<Self> {
        if data.len() < 6 {
            return Err(XlsError::InvalidLength {
                expected: 6,
                found: data.len(),
            });
        }
        let row = read_u16_le(data, 0)?;
        let col = read_u16_le(data, 2)?;
        let xf_index = read_u16_le(data, 4)?;

        match sid {
            BLANK_SID => {
                expect_len(data, 6)?;
                Ok(CellRecord::Blank { row, col, xf_index })
            },
            NUMBER_SID => {
                expect_len(data, 14)?;
                Ok(CellRecord::Number {
                    row,
                    col,
                    xf_index,
                    value: read_f64_le(data, 6)?,
                })
            },
            RK_SID => {
                expect_len(data, 10)?;
                Ok(CellRecord::Rk {
                    row,
                    col,
                    xf_index,
                    rk: read_u32_le(data, 6)?,
                })
            },
            BOOLERR_SID => {
                expect_len(data, 8)?;
                let is_error = match data[7] {
                    0 => false,
                    1 => true,
                    other => {
                        return Err(XlsError::InvalidRecord {
                            record_type: sid,
                            message: format!("bool/error flag {}", other),
                        });
                    },
                };
                Ok(CellRecord::BoolErr {
                    row,
                    col,
                    xf_index,
                    value: data[6],
                    is_error,
                })
            },
            LABELSST_SID => {
                expect_len(data, 10)?;
                Ok(CellRecord::LabelSst {
                    row,
                    col,
                    xf_index,
                    sst_index: read_u32_le(data, 6)?,
                })
            },
            LABEL_SID => Self::parse_label(row, col, xf_index, data),
            FORMULA_SID => {
                if data.len() < 22 {
                    return Err(XlsError::InvalidLength {
                        expected: 22,
                        found: data.len(),
                    });
                }
                let mut result = [0u8; 8];
                result.copy_from_slice(&data[6..14]);
                let expression_len = read_u16_le(data, 20)? as usize;
                let end = 22 + expression_len;
                if end > data.len() {
                    return Err(XlsError::InvalidLength {
                        expected: end,
                        found: data.len(),
                    });
                }
                Ok(CellRecord::Formula {
                    row,
                    col,
                    xf_index,
                    result,
                    options: read_u16_le(data, 14)?,
                    cache: read_u32_le(data, 16)?,
                    expression: data[22..end].to_vec(),
                    extra: data[end..].to_vec(),
                })
            },
            _ => Err(XlsError::InvalidRecord {
                record_type: sid,
                message: "not a cell record".to_string(),
            }),
        }
    }

    fn parse_label(row: u16, col: u16, xf_index: u16, data: &[u8]) -> XlsResult<Self> {
        if data.len() < 9 {
            return Err(XlsError::InvalidLength {
                expected: 9,
                found: data.len(),
            });
        }
        let char_count = read_u16_le(data, 6)? as usize;
        let flags = data[8];
        if flags & !0x01 != 0 {
            // Rich text runs and phonetic data are not modelled
            return Err(XlsError::InvalidRecord {
                record_type: LABEL_SID,
                message: format!("unsupported string flags 0x{:02X}", flags),
            });
        }
        let unicode = flags & 0x01 != 0;
        let byte_len = if unicode { char_count * 2 } else { char_count };
        expect_len(data, 9 + byte_len)?;

        let chars = &data[9..];
        let text = if unicode {
            decode_utf16le_strict(chars).ok_or_else(|| {
                XlsError::Encoding(format!("malformed UTF-16 label at row {} col {}", row, col))
            })?
        } else {
            decode_compressed(chars)
        };
        Ok(CellRecord::Label {
            row,
            col,
            xf_index,
            text,
            unicode,
        })
    }

    /// Encode the record payload
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(14);
        push_position(&mut out, self.row(), self.col(), self.xf_index());
        match self {
            CellRecord::Blank { .. } => {},
            CellRecord::Number { value, .. } => out.extend_from_slice(&value.to_le_bytes()),
            CellRecord::Rk { rk, .. } => out.extend_from_slice(&rk.to_le_bytes()),
            CellRecord::BoolErr {
                value, is_error, ..
            } => {
                out.push(*value);
                out.push(u8::from(*is_error));
            },
            CellRecord::LabelSst { sst_index, .. } => {
                out.extend_from_slice(&sst_index.to_le_bytes())
            },
            CellRecord::Label { text, unicode, .. } => {
                // A compressed label cannot hold characters above U+00FF
                let unicode = *unicode || text.chars().any(|c| c as u32 > 0xFF);
                if unicode {
                    let units = encode_utf16le(text);
                    out.extend_from_slice(&((units.len() / 2) as u16).to_le_bytes());
                    out.push(0x01);
                    out.extend_from_slice(&units);
                } else {
                    out.extend_from_slice(&(text.chars().count() as u16).to_le_bytes());
                    out.push(0x00);
                    out.extend(text.chars().map(|c| c as u32 as u8));
                }
            },
            CellRecord::Formula {
                result,
                options,
                cache,
                expression,
                extra,
                ..
            } => {
                out.extend_from_slice(result);
                out.extend_from_slice(&options.to_le_bytes());
                out.extend_from_slice(&cache.to_le_bytes());
                out.extend_from_slice(&(expression.len() as u16).to_le_bytes());
                out.extend_from_slice(expression);
                out.extend_from_slice(extra);
            },
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(row: u16, col: u16, xf: u16, rest: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        push_position(&mut data, row, col, xf);
        data.extend_from_slice(rest);
        data
    }

    #[test]
    fn test_rk_values() {
        // Integer 0x1234
        assert_eq!(rk_value((0x1234 << 2) | 0x02), 4660.0);
        // Negative integer
        assert_eq!(rk_value(((-5i32 as u32) << 2) | 0x02), -5.0);
        // Integer divided by 100
        assert_eq!(rk_value((1234 << 2) | 0x03), 12.34);
        // Float 1.0 has upper bits 0x3FF00000
        assert_eq!(rk_value(0x3FF0_0000), 1.0);
    }

    #[test]
    fn test_number_round_trip_is_bit_exact() {
        let nan = f64::from_bits(0x7FF8_0000_0000_1234);
        let data = payload(3, 4, 15, &nan.to_le_bytes());
        let record = CellRecord::parse(NUMBER_SID, &data).unwrap();
        assert_eq!(record.row(), 3);
        assert_eq!(record.col(), 4);
        assert_eq!(record.encode(), data);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let data = payload(0, 0, 15, &[0; 4]);
        assert!(matches!(
            CellRecord::parse(NUMBER_SID, &data),
            Err(XlsError::InvalidLength {
                expected: 14,
                found: 10
            })
        ));
    }

    #[test]
    fn test_boolerr() {
        let data = payload(1, 2, 15, &[0x07, 0x01]);
        let record = CellRecord::parse(BOOLERR_SID, &data).unwrap();
        assert!(matches!(
            record,
            CellRecord::BoolErr {
                value: 0x07,
                is_error: true,
                ..
            }
        ));
        assert_eq!(record.encode(), data);

        let bad = payload(1, 2, 15, &[0x01, 0x02]);
        assert!(CellRecord::parse(BOOLERR_SID, &bad).is_err());
    }

    #[test]
    fn test_labels() {
        let compressed = payload(0, 0, 15, &[3, 0, 0x00, b'a', 0xE9, b'c']);
        let record = CellRecord::parse(LABEL_SID, &compressed).unwrap();
        match &record {
            CellRecord::Label { text, unicode, .. } => {
                assert_eq!(text, "aéc");
                assert!(!unicode);
            },
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(record.encode(), compressed);

        let mut wide = payload(0, 1, 15, &[2, 0, 0x01]);
        wide.extend_from_slice(&encode_utf16le("文字"));
        let record = CellRecord::parse(LABEL_SID, &wide).unwrap();
        assert_eq!(record.encode(), wide);

        let rich = payload(0, 0, 15, &[1, 0, 0x08, b'a']);
        assert!(CellRecord::parse(LABEL_SID, &rich).is_err());
    }

    #[test]
    fn test_label_constructor_picks_encoding() {
        let CellRecord::Label { unicode, .. } = CellRecord::label(0, 0, 15, "plain") else {
            panic!("not a label");
        };
        assert!(!unicode);
        let CellRecord::Label { unicode, .. } = CellRecord::label(0, 0, 15, "Ωmega") else {
            panic!("not a label");
        };
        assert!(unicode);
    }

    #[test]
    fn test_formula() {
        let mut rest = Vec::new();
        rest.extend_from_slice(&2.5f64.to_le_bytes());
        rest.extend_from_slice(&0x0002u16.to_le_bytes());
        rest.extend_from_slice(&0u32.to_le_bytes());
        rest.extend_from_slice(&3u16.to_le_bytes());
        rest.extend_from_slice(&[0x1E, 0x01, 0x00]);
        let data = payload(5, 1, 15, &rest);

        let record = CellRecord::parse(FORMULA_SID, &data).unwrap();
        assert_eq!(record.formula_value(), Some(FormulaValue::Number(2.5)));
        assert_eq!(record.encode(), data);

        let mut bool_result = data.clone();
        bool_result[6..14].copy_from_slice(&[1, 0, 1, 0, 0, 0, 0xFF, 0xFF]);
        let record = CellRecord::parse(FORMULA_SID, &bool_result).unwrap();
        assert_eq!(record.formula_value(), Some(FormulaValue::Bool(true)));
    }

    #[test]
    fn test_set_position() {
        let mut record = CellRecord::blank(0, 0, 15);
        record.set_position(7, 9);
        assert_eq!((record.row(), record.col()), (7, 9));
        assert_eq!(record.encode(), payload(7, 9, 15, &[]));
    }
}
