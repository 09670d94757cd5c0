//! Resolving the row-diff chains of a batch of rows.
//!
//! A row-diff row stores the symmetric difference between its own annotation and the
//! annotation of its row-diff successor. To reconstruct a row we walk the chain of
//! successors until an anchor, which stores its annotation in full. Queries in one
//! batch often share chain suffixes, so each chain is cut at the first row that an
//! earlier query of the batch already visited.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use simple_sds_sbwt::bit_vector::BitVector;
use simple_sds_sbwt::ops::BitVec;

use crate::graph::{anno_to_graph_index, graph_to_anno_index, DeBruijnGraph, Row, RowDiffSuccessor};

/// Expected number of distinct rows visited per query row. Only affects the initial
/// capacity of the batch structures.
pub const RD_PATH_RESERVE_SIZE: usize = 2;

/// The rows needed to reconstruct a batch of queries.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct RdBatch {
    /// Distinct rows visited by the batch, sorted by row index.
    pub rd_ids: Vec<Row>,
    /// For each query, the truncated chain as positions in `rd_ids`. The first entry
    /// is the query row itself. The last entry is an anchor, or a row that the chain
    /// of an earlier query in the batch passes through.
    pub rd_paths: Vec<Vec<usize>>,
    /// For each position in `rd_ids`, the number of entries in `rd_paths` pointing to it.
    pub visit_counts: Vec<usize>,
}

impl RdBatch {

    /// Number of queries in the batch.
    pub fn len(&self) -> usize {
        self.rd_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rd_paths.is_empty()
    }

    /// Returns the truncated chain of query `i` as row indices.
    pub fn path_rows(&self, i: usize) -> Vec<Row> {
        self.rd_paths[i].iter().map(|&j| self.rd_ids[j]).collect()
    }
}

/// Traces the row-diff chains of all rows in `rows` and returns the deduplicated,
/// sorted set of rows to decode together with the truncated chain of every query.
///
/// `anchor` has one bit per row. `fork_succ` is passed on to
/// [RowDiffSuccessor::row_diff_successor] and may be empty.
///
/// Panics if a chain runs into itself before reaching an anchor, which means the
/// anchors do not break every cycle of the graph.
pub fn resolve_batch<G>(rows: &[Row], graph: &G, anchor: &BitVector, fork_succ: &BitVector) -> RdBatch
where G: DeBruijnGraph + RowDiffSuccessor + ?Sized {

    // Rows in discovery order, and the discovery index of each row
    let mut discovered = Vec::<Row>::with_capacity(rows.len() * RD_PATH_RESERVE_SIZE);
    let mut node_to_rd = HashMap::<Row, usize>::with_capacity(rows.len() * RD_PATH_RESERVE_SIZE);

    let mut rd_paths = vec![Vec::<usize>::new(); rows.len()];

    for (i, &query) in rows.iter().enumerate() {
        let path_start = discovered.len();
        let mut node = anno_to_graph_index(query);

        loop {
            debug_assert!(graph.in_graph(node));
            let row = graph_to_anno_index(node);

            let (idx, is_new) = match node_to_rd.entry(row) {
                Entry::Occupied(e) => (*e.get(), false),
                Entry::Vacant(e) => {
                    discovered.push(row);
                    (*e.insert(discovered.len() - 1), true)
                }
            };
            rd_paths[i].push(idx);

            // A row reached before is reconstructed before this chain is,
            // so the rest of the chain is not needed.
            if !is_new {
                assert!(idx < path_start, "the row-diff chain of row {} has a cycle without an anchor", query);
                break;
            }

            assert!(row < anchor.len(), "row {} is out of range of the anchor vector", row);
            if anchor.get(row) {
                break;
            }

            node = graph.row_diff_successor(node, fork_succ);
        }
    }

    // Freeze: sort the distinct rows and rewrite the paths through the permutation
    let mut order: Vec<usize> = (0..discovered.len()).collect();
    order.sort_by_key(|&d| discovered[d]);

    let rd_ids: Vec<Row> = order.iter().map(|&d| discovered[d]).collect();

    let mut sorted_pos = vec![0_usize; discovered.len()];
    for (pos, &d) in order.iter().enumerate() {
        sorted_pos[d] = pos;
    }

    let mut visit_counts = vec![0_usize; rd_ids.len()];
    for path in rd_paths.iter_mut() {
        for j in path.iter_mut() {
            *j = sorted_pos[*j];
            visit_counts[*j] += 1;
        }
    }

    RdBatch { rd_ids, rd_paths, visit_counts }
}

#[cfg(test)]
mod tests {
    use rand_chacha::rand_core::{RngCore, SeedableRng};
    use rand_chacha::ChaCha20Rng;
    use simple_sds_sbwt::raw_vector::{AccessRaw, RawVector};

    use super::*;
    use crate::graph::testing::AdjacencyGraph;

    fn bit_vector(len: usize, ones: &[usize]) -> BitVector {
        let mut raw = RawVector::with_len(len, false);
        for &i in ones {
            raw.set_bit(i, true);
        }
        BitVector::from(raw)
    }

    fn empty() -> BitVector {
        BitVector::from(RawVector::new())
    }

    // Follows the truncated path of query i through the paths of earlier queries
    // until it reaches the row where the chain was cut for good.
    fn full_chain(batch: &RdBatch, anchor: &BitVector, i: usize) -> Vec<Row> {
        let mut chain = batch.path_rows(i);
        while !anchor.get(*chain.last().unwrap()) {
            let last = *chain.last().unwrap();
            let continuation = (0..i).find_map(|j| {
                let rows = batch.path_rows(j);
                let pos = rows.iter().position(|&r| r == last)?;
                if pos + 1 < rows.len() { Some(rows[pos + 1..].to_vec()) } else { None }
            }).expect("a truncated chain continues in an earlier path");
            chain.extend(continuation);
        }
        chain
    }

    #[test]
    fn chain_through_shared_row() {
        // row5 -> row9 -> row2 (anchor)
        let graph = AdjacencyGraph::from_row_edges(10, &[(5, 9), (9, 2)]);
        let anchor = bit_vector(10, &[2]);

        let batch = resolve_batch(&[5, 9], &graph, &anchor, &empty());
        assert_eq!(batch.rd_ids, vec![2, 5, 9]);
        assert_eq!(batch.path_rows(0), vec![5, 9, 2]);
        assert_eq!(batch.path_rows(1), vec![9]);
        assert_eq!(batch.rd_paths, vec![vec![1, 2, 0], vec![2]]);
        assert_eq!(batch.visit_counts, vec![1, 1, 2]);

        let batch = resolve_batch(&[9, 5], &graph, &anchor, &empty());
        assert_eq!(batch.rd_ids, vec![2, 5, 9]);
        assert_eq!(batch.path_rows(0), vec![9, 2]);
        assert_eq!(batch.path_rows(1), vec![5, 9]);
        assert_eq!(batch.visit_counts, vec![1, 1, 2]);
    }

    #[test]
    fn anchor_and_repeated_queries() {
        let graph = AdjacencyGraph::from_row_edges(4, &[(0, 1), (1, 3), (2, 3)]);
        let anchor = bit_vector(4, &[3]);

        let batch = resolve_batch(&[3, 0, 0, 2], &graph, &anchor, &empty());
        assert_eq!(batch.len(), 4);
        assert_eq!(batch.rd_ids, vec![0, 1, 2, 3]);
        assert_eq!(batch.path_rows(0), vec![3]);
        assert_eq!(batch.path_rows(1), vec![0, 1, 3]);
        assert_eq!(batch.path_rows(2), vec![0]);
        assert_eq!(batch.path_rows(3), vec![2, 3]);
        assert_eq!(batch.visit_counts, vec![2, 1, 1, 3]);

        let batch = resolve_batch(&[], &graph, &anchor, &empty());
        assert!(batch.is_empty());
        assert!(batch.rd_ids.is_empty());
    }

    #[test]
    fn fork_successors_pick_the_marked_branch() {
        // row0 forks to row1 and row2, both of which are anchors
        let graph = AdjacencyGraph::from_row_edges(3, &[(0, 1), (0, 2)]);
        let anchor = bit_vector(3, &[1, 2]);

        // Without fork successors the graph takes its last edge
        let batch = resolve_batch(&[0], &graph, &anchor, &empty());
        assert_eq!(batch.path_rows(0), vec![0, 2]);

        let fork_succ = bit_vector(graph.max_index() + 1, &[anno_to_graph_index(1)]);
        let batch = resolve_batch(&[0], &graph, &anchor, &fork_succ);
        assert_eq!(batch.path_rows(0), vec![0, 1]);
        assert_eq!(batch.rd_ids, vec![0, 1]);
    }

    #[test]
    #[should_panic]
    fn cycle_without_anchor_panics() {
        let graph = AdjacencyGraph::from_row_edges(3, &[(0, 1), (1, 2), (2, 0)]);
        let anchor = bit_vector(3, &[]);
        resolve_batch(&[0], &graph, &anchor, &empty());
    }

    #[test_log::test]
    fn randomized_batches() {
        let mut rng = ChaCha20Rng::from_seed([7; 32]);
        let n = 300_usize;

        // Each non-anchor row points to a random later row, and the last row is an anchor.
        let mut edges = Vec::new();
        let mut anchors = vec![n - 1];
        for row in 0..n - 1 {
            if rng.next_u32() % 10 == 0 {
                anchors.push(row);
            }
            let succ = row + 1 + (rng.next_u32() as usize % (n - 1 - row));
            edges.push((row, succ));
        }
        let graph = AdjacencyGraph::from_row_edges(n, &edges);
        let anchor = bit_vector(n, &anchors);
        let successor_row = |row: Row| edges[row].1;

        let queries: Vec<Row> = (0..200).map(|_| rng.next_u32() as usize % n).collect();
        let batch = resolve_batch(&queries, &graph, &anchor, &empty());

        assert_eq!(batch.len(), queries.len());
        assert!(batch.rd_ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(batch.visit_counts.len(), batch.rd_ids.len());
        assert!(batch.visit_counts.iter().all(|&c| c > 0));

        let total_len: usize = batch.rd_paths.iter().map(|p| p.len()).sum();
        assert_eq!(batch.visit_counts.iter().sum::<usize>(), total_len);

        let mut seen = std::collections::HashSet::<Row>::new();
        for (i, &query) in queries.iter().enumerate() {
            let rows = batch.path_rows(i);
            assert!(!rows.is_empty());
            assert_eq!(rows[0], query);
            for w in rows.windows(2) {
                assert_eq!(w[1], successor_row(w[0]));
            }
            let last = *rows.last().unwrap();
            assert!(anchor.get(last) || seen.contains(&last));
            for &r in rows[..rows.len() - 1].iter() {
                assert!(!anchor.get(r));
            }
            seen.extend(rows);
        }

        // Reversing the batch gives the same rows, and each query still reaches the same anchor
        let reversed: Vec<Row> = queries.iter().rev().copied().collect();
        let batch_rev = resolve_batch(&reversed, &graph, &anchor, &empty());
        assert_eq!(batch_rev.rd_ids, batch.rd_ids);
        for i in 0..queries.len() {
            let j = queries.len() - 1 - i;
            assert_eq!(full_chain(&batch, &anchor, i), full_chain(&batch_rev, &anchor, j));
        }
    }
}
