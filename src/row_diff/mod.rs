//! The row-diff annotation matrix.
//!
//! Each row stores the symmetric difference between its annotation and the annotation
//! of its row-diff successor in the graph. Anchor rows store their annotation in full.
//! Construct with [RowDiffBuilder] from a full [ColumnMajor] matrix, or load the
//! parts from disk.

mod builder;
mod paths;

pub use builder::*;
pub use paths::*;

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use rayon::prelude::*;
use simple_sds_sbwt::bit_vector::BitVector;
use simple_sds_sbwt::ops::BitVec;
use simple_sds_sbwt::serialize::Serialize;

use crate::column_major::{BinaryMatrix, Column, ColumnMajor, SetBitPositions};
use crate::error::{Error, Result};
use crate::graph::{DeBruijnGraph, Row, RowDiffSuccessor};
use crate::util::read_bit_vector;

/// Number of rows resolved together by [RowDiff::par_get_rows] unless specified otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Loads a bit vector serialized with `simple-sds`. `what` names the file in errors.
///
/// A file that does not hold a valid bit vector gives [Error::Io]. Rank and select
/// structures stored in the file are not loaded.
pub fn load_bit_vector(path: &Path, what: &'static str) -> Result<BitVector> {
    if !path.exists() {
        return Err(Error::MissingFile { what, path: path.to_path_buf() });
    }
    let mut input = BufReader::new(File::open(path)?);
    let bv = read_bit_vector(&mut input)?;
    log::trace!("Loaded {} file {} with {} bits", what, path.display(), bv.len());
    Ok(bv)
}

/// Symmetric difference of two sorted sets of columns.
pub(crate) fn add_diff(diff: &[Column], row: &[Column]) -> SetBitPositions {
    let mut result = SetBitPositions::with_capacity(diff.len() + row.len());
    let (mut i, mut j) = (0, 0);
    while i < diff.len() && j < row.len() {
        if diff[i] < row[j] {
            result.push(diff[i]);
            i += 1;
        } else if row[j] < diff[i] {
            result.push(row[j]);
            j += 1;
        } else {
            i += 1;
            j += 1;
        }
    }
    result.extend_from_slice(&diff[i..]);
    result.extend_from_slice(&row[j..]);
    result
}

/// A row-diff compressed binary matrix over the nodes of a graph.
pub struct RowDiff<'g, G: ?Sized> {
    graph: &'g G,
    diffs: ColumnMajor,
    anchor: BitVector,
    fork_succ: BitVector,
}

impl<'g, G: DeBruijnGraph + RowDiffSuccessor + ?Sized> RowDiff<'g, G> {

    /// Assembles the matrix from its parts. `diffs` must have one row per node of the
    /// graph, the anchor vector must have one bit per row, and the fork successor vector
    /// must be empty or have one bit per node index including 0.
    pub fn new(graph: &'g G, diffs: ColumnMajor, anchor: BitVector, fork_succ: BitVector) -> Result<Self> {
        if diffs.num_rows() != graph.max_index() {
            return Err(Error::InvalidInput(format!(
                "matrix has {} rows but the graph has {} nodes", diffs.num_rows(), graph.max_index())));
        }
        let rd = Self { graph, diffs, anchor, fork_succ };
        rd.check_anchor(&rd.anchor)?;
        rd.check_fork_succ(&rd.fork_succ)?;
        Ok(rd)
    }

    pub fn from_parts(graph: &'g G, parts: RowDiffParts) -> Result<Self> {
        Self::new(graph, parts.diffs, parts.anchor, parts.fork_succ)
    }

    /// Opens a matrix stored as separate files: the diff matrix written with
    /// [ColumnMajor::serialize], the anchors, and optionally the fork successors.
    pub fn open(graph: &'g G, diffs_path: &Path, anchor_path: &Path, fork_succ_path: Option<&Path>) -> Result<Self> {
        if !diffs_path.exists() {
            return Err(Error::MissingFile { what: "row-diff matrix", path: diffs_path.to_path_buf() });
        }
        let diffs = ColumnMajor::load(&mut BufReader::new(File::open(diffs_path)?))?;
        let anchor = load_bit_vector(anchor_path, "anchor")?;
        let fork_succ = match fork_succ_path {
            Some(path) => load_bit_vector(path, "fork successor")?,
            None => BitVector::from(simple_sds_sbwt::raw_vector::RawVector::new()),
        };
        log::info!("Opened row-diff matrix with {} rows, {} columns and {} anchors",
            diffs.num_rows(), diffs.num_columns(), anchor.count_ones());
        Self::new(graph, diffs, anchor, fork_succ)
    }

    fn check_anchor(&self, anchor: &BitVector) -> Result<()> {
        if anchor.len() != self.diffs.num_rows() {
            return Err(Error::InvalidInput(format!(
                "anchor vector has {} bits but the matrix has {} rows", anchor.len(), self.diffs.num_rows())));
        }
        Ok(())
    }

    fn check_fork_succ(&self, fork_succ: &BitVector) -> Result<()> {
        if !fork_succ.is_empty() && fork_succ.len() != self.graph.max_index() + 1 {
            return Err(Error::InvalidInput(format!(
                "fork successor vector has {} bits but the graph has max index {}", fork_succ.len(), self.graph.max_index())));
        }
        Ok(())
    }

    /// Replaces the anchors with those stored in the file.
    pub fn load_anchor(&mut self, path: &Path) -> Result<()> {
        let anchor = load_bit_vector(path, "anchor")?;
        self.check_anchor(&anchor)?;
        self.anchor = anchor;
        Ok(())
    }

    /// Replaces the fork successors with those stored in the file.
    pub fn load_fork_succ(&mut self, path: &Path) -> Result<()> {
        let fork_succ = load_bit_vector(path, "fork successor")?;
        self.check_fork_succ(&fork_succ)?;
        self.fork_succ = fork_succ;
        Ok(())
    }

    pub fn graph(&self) -> &'g G {
        self.graph
    }

    pub fn diffs(&self) -> &ColumnMajor {
        &self.diffs
    }

    pub fn anchor(&self) -> &BitVector {
        &self.anchor
    }

    pub fn fork_succ(&self) -> &BitVector {
        &self.fork_succ
    }

    /// Resolves the row-diff chains of the rows. See [resolve_batch].
    pub fn get_rd_ids(&self, rows: &[Row]) -> RdBatch {
        resolve_batch(rows, self.graph, &self.anchor, &self.fork_succ)
    }

    /// Reconstructs the rows in parallel, resolving `batch_size` rows at a time.
    pub fn par_get_rows(&self, rows: &[Row], batch_size: usize) -> Vec<SetBitPositions>
    where G: Sync {
        assert!(batch_size > 0);
        rows.par_chunks(batch_size)
            .map(|chunk| self.get_rows(chunk))
            .collect::<Vec<Vec<SetBitPositions>>>()
            .into_iter()
            .flatten()
            .collect()
    }

    /// Writes the diffs, the anchors and the fork successors to the writer and
    /// returns the number of bytes written. Load with [RowDiff::load].
    pub fn serialize<W: Write>(&self, out: &mut W) -> std::io::Result<usize> {
        let mut n_written = self.diffs.serialize(out)?;
        self.anchor.serialize(out)?;
        n_written += self.anchor.size_in_bytes();
        self.fork_succ.serialize(out)?;
        n_written += self.fork_succ.size_in_bytes();
        Ok(n_written)
    }

    /// Loads a matrix written with [RowDiff::serialize] on top of the given graph.
    pub fn load<R: Read>(graph: &'g G, input: &mut R) -> Result<Self> {
        let diffs = ColumnMajor::load(input)?;
        let anchor = read_bit_vector(input)?;
        let fork_succ = read_bit_vector(input)?;
        Self::new(graph, diffs, anchor, fork_succ)
    }
}

impl<'g, G: DeBruijnGraph + RowDiffSuccessor + ?Sized> BinaryMatrix for RowDiff<'g, G> {
    fn num_columns(&self) -> usize {
        self.diffs.num_columns()
    }

    fn num_rows(&self) -> usize {
        self.diffs.num_rows()
    }

    fn get(&self, row: Row, column: Column) -> bool {
        self.get_row(row).binary_search(&column).is_ok()
    }

    fn get_row(&self, row: Row) -> SetBitPositions {
        self.get_rows(&[row]).pop().unwrap() // One query gives one row
    }

    /// Reconstructs the rows. The queries are decoded in batch order: the chain of
    /// each query ends at an anchor or at a row that an earlier query already
    /// reconstructed, so every chain can be applied from its end to its start.
    fn get_rows(&self, rows: &[Row]) -> Vec<SetBitPositions> {
        let RdBatch { rd_ids, rd_paths, mut visit_counts } = self.get_rd_ids(rows);

        // Holds diffs until a row is reconstructed, and full rows afterwards
        let mut rd_rows: Vec<Option<SetBitPositions>> = self.diffs.get_rows(&rd_ids).into_iter().map(Some).collect();

        let mut result = Vec::with_capacity(rows.len());
        for path in rd_paths.iter() {
            let mut it = path.iter().rev();
            let &last = it.next().expect("row-diff paths are never empty");

            visit_counts[last] -= 1;
            let mut row = if visit_counts[last] == 0 {
                rd_rows[last].take()
            } else {
                rd_rows[last].clone()
            }.expect("the end of a row-diff path is an anchor or a reconstructed row");

            for &j in it {
                let diff = rd_rows[j].take().expect("inner rows of a row-diff path are decoded once");
                row = add_diff(&diff, &row);
                visit_counts[j] -= 1;
                if visit_counts[j] > 0 {
                    rd_rows[j] = Some(row.clone());
                }
            }
            result.push(row);
        }

        debug_assert!(visit_counts.iter().all(|&c| c == 0));
        result
    }

    fn num_relations(&self) -> usize {
        let rows: Vec<Row> = (0..self.num_rows()).collect();
        self.get_rows(&rows).iter().map(|r| r.len()).sum()
    }
}
