//! Value records of a sheet, grouped by row
//!
//! Cells live in a sparse row-major table. Serializing a row collapses runs
//! of adjacent blank cells into MULBLANK records; loading expands MULBLANK
//! records back into single blanks.

use super::biff::{BiffRecord, MulBlankRecord};
use super::cell::CellRecord;
use super::error::XlsResult;
use super::writer::RecordWriter;
use smallvec::SmallVec;
use std::io::Write;

/// Number of addressable rows and columns
const MAX_INDEX: usize = u16::MAX as usize + 1;

type Row = Vec<Option<CellRecord>>;

/// Capacity after growing `len` to hold `index`
fn grown_capacity(len: usize, index: usize) -> usize {
    (len * 2).max(index + 1).min(MAX_INDEX)
}

/// Cell records of one sheet
#[derive(Debug, Clone, Default)]
pub struct ValueRecordsAggregate {
    rows: Vec<Option<Row>>,
    physical_count: usize,
}

impl ValueRecordsAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an aggregate from decoded records, ignoring non-cell records
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a BiffRecord>) -> Self {
        let mut aggregate = Self::new();
        for record in records {
            aggregate.add_record(record);
        }
        aggregate
    }

    /// Store `cell` at `(row, col)`, replacing any previous cell there
    ///
    /// The cell's own coordinates are updated to match.
    pub fn insert(&mut self, row: u16, col: u16, mut cell: CellRecord) {
        cell.set_position(row, col);
        let (r, c) = (row as usize, col as usize);

        if r >= self.rows.len() {
            let capacity = grown_capacity(self.rows.len(), r);
            self.rows.resize_with(capacity, || None);
        }
        let cells = self.rows[r].get_or_insert_with(Vec::new);
        if c >= cells.len() {
            let capacity = grown_capacity(cells.len(), c);
            cells.resize_with(capacity, || None);
        }
        if cells[c].replace(cell).is_none() {
            self.physical_count += 1;
        }
    }

    /// Clear the cell at `(row, col)`, keeping the capacity
    pub fn remove(&mut self, row: u16, col: u16) -> Option<CellRecord> {
        let removed = self
            .rows
            .get_mut(row as usize)?
            .as_mut()?
            .get_mut(col as usize)?
            .take();
        if removed.is_some() {
            self.physical_count -= 1;
        }
        removed
    }

    pub fn get(&self, row: u16, col: u16) -> Option<&CellRecord> {
        self.row_cells(row)?.get(col as usize)?.as_ref()
    }

    fn row_cells(&self, row: u16) -> Option<&Row> {
        self.rows.get(row as usize)?.as_ref()
    }

    /// Number of occupied cells
    pub fn physical_count(&self) -> usize {
        self.physical_count
    }

    /// Recompute the occupied cell count from the table
    pub fn recount(&mut self) -> usize {
        self.physical_count = self
            .rows
            .iter()
            .flatten()
            .map(|cells| cells.iter().filter(|cell| cell.is_some()).count())
            .sum();
        self.physical_count
    }

    /// Add a decoded record
    ///
    /// MULBLANK records are expanded into single blanks. Returns `false` for
    /// records that are not cell values.
    pub fn add_record(&mut self, record: &BiffRecord) -> bool {
        match record {
            BiffRecord::Cell(cell) => {
                self.insert(cell.row(), cell.col(), cell.clone());
                true
            },
            BiffRecord::MulBlank(mul) => {
                for blank in mul.blanks() {
                    self.insert(blank.row(), blank.col(), blank);
                }
                true
            },
            _ => false,
        }
    }

    /// Indexes of rows holding at least one cell, ascending
    pub fn rows(&self) -> impl Iterator<Item = u16> + '_ {
        self.rows.iter().enumerate().filter_map(|(index, cells)| {
            cells
                .as_ref()
                .filter(|cells| cells.iter().any(Option::is_some))
                .map(|_| index as u16)
        })
    }

    pub fn first_cell_in_row(&self, row: u16) -> Option<u16> {
        self.row_cells(row)?
            .iter()
            .position(Option::is_some)
            .map(|col| col as u16)
    }

    pub fn last_cell_in_row(&self, row: u16) -> Option<u16> {
        self.row_cells(row)?
            .iter()
            .rposition(Option::is_some)
            .map(|col| col as u16)
    }

    /// Records for one row, left to right
    ///
    /// Two or more adjacent blanks become a single MULBLANK; a lone blank
    /// stays a BLANK record. Runs longer than [`MulBlankRecord::MAX_CELLS`]
    /// are split over several MULBLANK records.
    pub fn serialize_row(&self, row: u16) -> Vec<BiffRecord> {
        let mut records = Vec::new();
        let Some(cells) = self.row_cells(row) else {
            return records;
        };

        let mut col = 0;
        while col < cells.len() {
            let Some(cell) = &cells[col] else {
                col += 1;
                continue;
            };
            if !cell.is_blank() {
                records.push(BiffRecord::Cell(cell.clone()));
                col += 1;
                continue;
            }

            let mut xf_indexes: SmallVec<[u16; 8]> = SmallVec::new();
            let mut end = col;
            while let Some(Some(blank)) = cells.get(end) {
                if !blank.is_blank() || xf_indexes.len() == MulBlankRecord::MAX_CELLS {
                    break;
                }
                xf_indexes.push(blank.xf_index());
                end += 1;
            }
            if xf_indexes.len() == 1 {
                records.push(BiffRecord::Cell(cell.clone()));
            } else {
                records.push(BiffRecord::MulBlank(MulBlankRecord {
                    row,
                    first_col: col as u16,
                    xf_indexes,
                }));
            }
            col = end;
        }
        records
    }

    /// Write every row in ascending order
    pub fn write_to<W: Write>(&self, writer: &mut RecordWriter<W>) -> XlsResult<()> {
        for row in self.rows() {
            for record in self.serialize_row(row) {
                record.write_to(writer)?;
            }
        }
        Ok(())
    }
}
