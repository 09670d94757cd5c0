//! Binary annotation matrices stored column by column.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use simple_sds_sbwt::bit_vector::BitVector;
use simple_sds_sbwt::ops::{BitVec, Select};
use simple_sds_sbwt::raw_vector::{AccessRaw, RawVector};
use simple_sds_sbwt::serialize::Serialize;

use crate::graph::Row;
use crate::util::{read_bit_vector, MAX_PREALLOC};

/// Index of a column (a label) in an annotation matrix.
pub type Column = usize;

/// Sorted column indices of the set bits of one row.
pub type SetBitPositions = Vec<Column>;

/// Read access to a binary matrix whose rows are graph nodes and columns are labels.
pub trait BinaryMatrix {
    fn num_columns(&self) -> usize;

    fn num_rows(&self) -> usize;

    /// Returns the bit at (row, column).
    fn get(&self, row: Row, column: Column) -> bool;

    /// Returns the set bits of the row in increasing column order.
    fn get_row(&self, row: Row) -> SetBitPositions {
        (0..self.num_columns()).filter(|&j| self.get(row, j)).collect()
    }

    /// Returns the rows in the order of `rows`. Implementations may override this to
    /// share work between rows.
    fn get_rows(&self, rows: &[Row]) -> Vec<SetBitPositions> {
        rows.iter().map(|&row| self.get_row(row)).collect()
    }

    /// Returns the rows with a set bit in the column, in increasing order.
    fn get_column(&self, column: Column) -> Vec<Row> {
        (0..self.num_rows()).filter(|&i| self.get(i, column)).collect()
    }

    /// Number of set bits in the matrix.
    fn num_relations(&self) -> usize {
        (0..self.num_columns()).map(|j| self.get_column(j).len()).sum()
    }
}

/// A binary matrix with one bit vector per column. All columns have the same length,
/// which is the number of rows also when there are no columns.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ColumnMajor {
    num_rows: usize,
    columns: Vec<BitVector>,
}

impl ColumnMajor {

    /// Wraps existing columns. Panics if a column does not have length `num_rows`.
    pub fn new(num_rows: usize, columns: Vec<BitVector>) -> Self {
        assert!(columns.iter().all(|c| c.len() == num_rows), "all columns must have length {}", num_rows);
        Self { num_rows, columns }
    }

    /// Builds the matrix from the set bits of each row. Every column index must be
    /// smaller than `num_columns`.
    pub fn from_rows(rows: &[SetBitPositions], num_columns: usize) -> Self {
        let mut raw_columns: Vec<RawVector> = (0..num_columns).map(|_| RawVector::with_len(rows.len(), false)).collect();
        for (i, row) in rows.iter().enumerate() {
            for &j in row.iter() {
                raw_columns[j].set_bit(i, true);
            }
        }
        Self::new(rows.len(), raw_columns.into_iter().map(BitVector::from).collect())
    }

    pub fn columns(&self) -> &[BitVector] {
        &self.columns
    }

    /// Writes the matrix to the given writer and returns the number of bytes written.
    /// The format is the number of rows and the number of columns as `u64`s, followed
    /// by the columns. The matrix can later be loaded with [ColumnMajor::load].
    pub fn serialize<W: Write>(&self, out: &mut W) -> std::io::Result<usize> {
        let mut n_written = 16_usize;
        out.write_u64::<LittleEndian>(self.num_rows as u64)?;
        out.write_u64::<LittleEndian>(self.columns.len() as u64)?;
        for column in self.columns.iter() {
            column.serialize(out)?;
            n_written += column.size_in_bytes();
        }
        Ok(n_written)
    }

    /// Loads a matrix that was previously written with [ColumnMajor::serialize].
    pub fn load<R: Read>(input: &mut R) -> std::io::Result<Self> {
        let num_rows = input.read_u64::<LittleEndian>()? as usize;
        let n_columns = input.read_u64::<LittleEndian>()? as usize;
        let mut columns = Vec::with_capacity(n_columns.min(MAX_PREALLOC));
        for j in 0..n_columns {
            let column = read_bit_vector(input)?;
            if column.len() != num_rows {
                return Err(std::io::Error::new(std::io::ErrorKind::InvalidData,
                    format!("ColumnMajor: column {} has length {} but the matrix has {} rows", j, column.len(), num_rows)));
            }
            columns.push(column);
        }
        Ok(Self { num_rows, columns })
    }
}

impl BinaryMatrix for ColumnMajor {
    fn num_columns(&self) -> usize {
        self.columns.len()
    }

    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn get(&self, row: Row, column: Column) -> bool {
        assert!(column < self.columns.len());
        assert!(row < self.num_rows);
        self.columns[column].get(row)
    }

    // Column by column, so that each column is touched once per batch
    fn get_rows(&self, rows: &[Row]) -> Vec<SetBitPositions> {
        let mut result = vec![SetBitPositions::new(); rows.len()];
        for (j, column) in self.columns.iter().enumerate() {
            for (i, &row) in rows.iter().enumerate() {
                assert!(row < self.num_rows);
                if column.get(row) {
                    result[i].push(j);
                }
            }
        }
        result
    }

    fn get_column(&self, column: Column) -> Vec<Row> {
        assert!(column < self.columns.len());
        self.columns[column].one_iter().map(|(_, row)| row).collect()
    }

    fn num_relations(&self) -> usize {
        self.columns.iter().map(|c| c.count_ones()).sum()
    }
}
