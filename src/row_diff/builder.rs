//! Conversion of a full annotation matrix into the row-diff representation.

use bitvec::bitvec;
use rayon::prelude::*;
use simple_sds_sbwt::bit_vector::BitVector;
use simple_sds_sbwt::ops::BitVec;
use simple_sds_sbwt::raw_vector::{AccessRaw, RawVector};

use crate::column_major::{BinaryMatrix, ColumnMajor};
use crate::error::{Error, Result};
use crate::graph::{anno_to_graph_index, graph_to_anno_index, DeBruijnGraph, NodeIndex, Row, RowDiffSuccessor};

/// Longest allowed number of successor steps from a row to an anchor, unless specified otherwise.
pub const DEFAULT_MAX_PATH_LENGTH: usize = 50;

/// The three components of a row-diff matrix. See [crate::row_diff::RowDiff::from_parts].
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RowDiffParts {
    pub diffs: ColumnMajor,
    pub anchor: BitVector,
    pub fork_succ: BitVector,
}

/// A builder for converting an annotation matrix to row-diff form.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct RowDiffBuilder {
    max_path_length: usize,
    build_fork_succ: bool,
    n_threads: usize,
}

impl Default for RowDiffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RowDiffBuilder {

    /// Sets up the builder with default values:
    /// - max_path_length = [DEFAULT_MAX_PATH_LENGTH].
    /// - build the fork successor vector.
    /// - n_threads = 4.
    pub fn new() -> Self {
        Self { max_path_length: DEFAULT_MAX_PATH_LENGTH, build_fork_succ: true, n_threads: 4 }
    }

    /// Rows further than this many successor steps from an anchor become anchors.
    pub fn max_path_length(mut self, max_path_length: usize) -> Self {
        self.max_path_length = max_path_length;
        self
    }

    /// Whether to store the chosen successors of forks explicitly. If false, the fork
    /// successor vector is left empty and decoding uses the rule of the graph.
    pub fn build_fork_succ(mut self, enable: bool) -> Self {
        self.build_fork_succ = enable;
        self
    }

    /// Number of threads used to compute the diffs.
    pub fn n_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = n_threads;
        self
    }

    /// Converts `matrix`, which has one row per node of `graph`, to row-diff form.
    pub fn run<G>(&self, graph: &G, matrix: &ColumnMajor) -> Result<RowDiffParts>
    where G: DeBruijnGraph + RowDiffSuccessor + Sync + ?Sized {
        if matrix.num_rows() != graph.max_index() {
            return Err(Error::InvalidInput(format!(
                "matrix has {} rows but the graph has {} nodes", matrix.num_rows(), graph.max_index())));
        }
        if self.n_threads == 0 {
            return Err(Error::InvalidInput("n_threads must be positive".to_string()));
        }

        let thread_pool = rayon::ThreadPoolBuilder::new().num_threads(self.n_threads).build()
            .map_err(|e| Error::InvalidInput(format!("could not start thread pool: {}", e)))?;

        let start_time = std::time::Instant::now();

        let fork_succ = if self.build_fork_succ {
            let fork_succ = thread_pool.install(|| compute_fork_successors(graph));
            log::info!("Marked {} fork successors", fork_succ.count_ones());
            fork_succ
        } else {
            BitVector::from(RawVector::new())
        };

        let anchor = assign_anchors(graph, &fork_succ, self.max_path_length);
        log::info!("Assigned {} anchors among {} rows", anchor.count_ones(), anchor.len());

        let diffs = thread_pool.install(|| compute_diffs(graph, matrix, &anchor, &fork_succ));
        log::info!("Row-diff transform done in {} seconds", start_time.elapsed().as_secs_f64());

        Ok(RowDiffParts { diffs, anchor, fork_succ })
    }
}

/// Marks, for every node with more than one outgoing edge, the successor chosen by
/// the rule of the graph. The vector has one bit per node index including 0.
pub fn compute_fork_successors<G>(graph: &G) -> BitVector
where G: DeBruijnGraph + RowDiffSuccessor + Sync + ?Sized {
    let no_forks = BitVector::from(RawVector::new());
    let chosen: Vec<NodeIndex> = (1..=graph.max_index()).into_par_iter()
        .filter(|&node| graph.outdegree(node) > 1)
        .map(|node| graph.row_diff_successor(node, &no_forks))
        .collect();

    let mut raw = RawVector::with_len(graph.max_index() + 1, false);
    for node in chosen {
        raw.set_bit(node, true);
    }
    BitVector::from(raw)
}

/// Chooses the anchor rows: every sink, one row on every cycle of successors, and
/// enough other rows that no row is more than `max_path_length` successor steps from
/// an anchor.
pub fn assign_anchors<G>(graph: &G, fork_succ: &BitVector, max_path_length: usize) -> BitVector
where G: DeBruijnGraph + RowDiffSuccessor + ?Sized {
    let n_rows = graph.max_index();
    let mut anchor = bitvec![0; n_rows];
    let mut on_path = bitvec![0; n_rows];
    let mut done = bitvec![0; n_rows];
    let mut dist = vec![0_u32; n_rows]; // Successor steps to the nearest anchor

    let mut path = Vec::<Row>::new();
    for start in 0..n_rows {
        if done[start] {
            continue;
        }

        path.clear();
        let mut row = start;
        loop {
            if done[row] {
                break;
            }
            if on_path[row] {
                // Back on the current walk: break the cycle here
                anchor.set(row, true);
                break;
            }
            on_path.set(row, true);
            path.push(row);

            let node = anno_to_graph_index(row);
            if graph.outdegree(node) == 0 {
                anchor.set(row, true);
                break;
            }
            row = graph_to_anno_index(graph.row_diff_successor(node, fork_succ));
        }

        // Distances from the end of the walk backwards. `row` is where the walk stopped.
        for i in (0..path.len()).rev() {
            let r = path[i];
            if !anchor[r] {
                let succ = if i + 1 < path.len() { path[i + 1] } else { row };
                let d = if anchor[succ] { 1 } else { dist[succ] + 1 };
                if d as usize > max_path_length {
                    anchor.set(r, true);
                } else {
                    dist[r] = d;
                }
            }
            on_path.set(r, false);
            done.set(r, true);
        }
    }

    let mut raw = RawVector::with_len(n_rows, false);
    for r in anchor.iter_ones() {
        raw.set_bit(r, true);
    }
    BitVector::from(raw)
}

// Anchors keep their row, other rows store the XOR with the row of their successor
fn compute_diffs<G>(graph: &G, matrix: &ColumnMajor, anchor: &BitVector, fork_succ: &BitVector) -> ColumnMajor
where G: DeBruijnGraph + RowDiffSuccessor + Sync + ?Sized {
    let successors: Vec<Option<Row>> = (0..matrix.num_rows()).into_par_iter().map(|row| {
        if anchor.get(row) {
            None
        } else {
            Some(graph_to_anno_index(graph.row_diff_successor(anno_to_graph_index(row), fork_succ)))
        }
    }).collect();

    let columns: Vec<BitVector> = matrix.columns().par_iter().map(|column| {
        let mut raw = RawVector::with_len(column.len(), false);
        for (row, succ) in successors.iter().enumerate() {
            let bit = match succ {
                None => column.get(row),
                Some(s) => column.get(row) != column.get(*s),
            };
            if bit {
                raw.set_bit(row, true);
            }
        }
        BitVector::from(raw)
    }).collect();

    ColumnMajor::new(matrix.num_rows(), columns)
}
