//! The de Bruijn graph boundary used by the annotation matrices, and [HashDbg], a
//! hash-backed node-centric de Bruijn graph implementing it.

use std::collections::HashMap;

use simple_sds_sbwt::bit_vector::BitVector;
use simple_sds_sbwt::ops::BitVec;

use crate::util::{is_dna, DNA_ALPHABET};

/// Index of a node in a graph. Valid nodes are in `[1, max_index]`.
pub type NodeIndex = usize;

/// Index of a row in an annotation matrix.
pub type Row = usize;

/// The index that never refers to a node.
pub const NPOS: NodeIndex = 0;

/// Maps a graph node to its annotation row.
pub fn graph_to_anno_index(node: NodeIndex) -> Row {
    assert!(node != NPOS);
    node - 1
}

/// Maps an annotation row to its graph node.
pub fn anno_to_graph_index(row: Row) -> NodeIndex {
    row + 1
}

/// Read-only traversal interface of a de Bruijn graph. Implementations must be safe
/// to query concurrently from many threads through `&self`.
pub trait DeBruijnGraph {
    /// Length of the k-mers.
    fn k(&self) -> usize;

    /// Largest node index in use.
    fn max_index(&self) -> NodeIndex;

    /// Number of nodes in the graph.
    fn num_nodes(&self) -> usize;

    fn in_graph(&self, node: NodeIndex) -> bool {
        node != NPOS && node <= self.max_index()
    }

    /// Calls `callback` for every target of an outgoing edge of `node`.
    fn adjacent_outgoing_nodes(&self, node: NodeIndex, callback: &mut dyn FnMut(NodeIndex));

    fn outdegree(&self, node: NodeIndex) -> usize {
        let mut n = 0_usize;
        self.adjacent_outgoing_nodes(node, &mut |_| n += 1);
        n
    }

    /// Calls `callback` once for each k-mer of `sequence`, in order, with the node of
    /// that k-mer or [NPOS] if the k-mer is not in the graph.
    fn map_to_nodes(&self, sequence: &[u8], callback: &mut dyn FnMut(NodeIndex));
}

/// Chooses the node that continues a row-diff chain.
pub trait RowDiffSuccessor {
    /// Returns the row-diff successor of `node`. `fork_succ` is either empty, in which
    /// case the graph applies its own canonical rule, or has one bit per node index
    /// marking the chosen successors of forks.
    ///
    /// Panics if `node` has no outgoing edge: the row-diff structure does not
    /// match the graph.
    fn row_diff_successor(&self, node: NodeIndex, fork_succ: &BitVector) -> NodeIndex;
}

/// Successor selection using a non-empty fork successor vector: the single outgoing
/// node if there is only one, otherwise the outgoing node whose bit is set.
pub fn fork_successor<G: DeBruijnGraph + ?Sized>(graph: &G, node: NodeIndex, fork_succ: &BitVector) -> NodeIndex {
    assert!(!fork_succ.is_empty(), "fork successor vector is not loaded");
    let mut n_out = 0_usize;
    let mut last = NPOS;
    let mut succ = NPOS;
    graph.adjacent_outgoing_nodes(node, &mut |next| {
        n_out += 1;
        last = next;
        if fork_succ.get(next) {
            succ = next;
        }
    });
    if n_out == 1 {
        return last;
    }
    assert!(graph.in_graph(succ), "a row diff successor must exist for node {}", node);
    succ
}

/// A node-centric de Bruijn graph over the DNA alphabet stored in a hash table.
/// The nodes are the distinct k-mers, and there is an edge from x to y iff
/// x[1..k) = y[0..k-1). Edge (x,y) is labeled with the last character of y.
/// Nodes get consecutive indices starting from 1 in order of insertion.
/// Reverse complements are not modeled.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct HashDbg {
    k: usize,
    kmers: Vec<Vec<u8>>, // kmers[i] is the k-mer of node i+1
    index: HashMap<Vec<u8>, NodeIndex>,
}

impl HashDbg {

    pub fn new(k: usize) -> Self {
        assert!(k > 0);
        Self { k, kmers: Vec::new(), index: HashMap::new() }
    }

    /// Builds a graph of order k from the k-mers of the given sequences.
    pub fn from_sequences(k: usize, seqs: &[&[u8]]) -> Self {
        let mut graph = Self::new(k);
        for seq in seqs {
            graph.add_sequence(seq);
        }
        graph
    }

    /// Inserts all k-mers of the sequence that consist only of A, C, G and T (either case).
    /// Returns the number of new nodes.
    pub fn add_sequence(&mut self, seq: &[u8]) -> usize {
        let mut n_new = 0_usize;
        if seq.len() < self.k {
            return 0;
        }
        for window in seq.windows(self.k) {
            if !window.iter().all(|&c| is_dna(c)) {
                continue;
            }
            let kmer = window.to_ascii_uppercase();
            if !self.index.contains_key(&kmer) {
                self.kmers.push(kmer.clone());
                self.index.insert(kmer, self.kmers.len());
                n_new += 1;
            }
        }
        n_new
    }

    /// Get a handle to the node corresponding to the given k-mer, if exists in the graph.
    pub fn get_node(&self, kmer: &[u8]) -> Option<NodeIndex> {
        assert!(kmer.len() == self.k);
        self.index.get(&kmer.to_ascii_uppercase()).copied()
    }

    /// Get the k-mer string label of a node.
    pub fn get_kmer(&self, node: NodeIndex) -> &[u8] {
        assert!(self.in_graph(node));
        &self.kmers[node - 1]
    }

    /// Returns an iterator over all nodes of the graph.
    pub fn node_iterator(&self) -> std::ops::RangeInclusive<NodeIndex> {
        1..=self.kmers.len()
    }

    /// Gets the last character of the k-mer string of the given node.
    pub fn get_last_character(&self, node: NodeIndex) -> u8 {
        *self.get_kmer(node).last().unwrap() // k > 0
    }

    /// Follows the outgoing edge labeled with edge_label from the given node.
    /// Returns None if the edge does not exist.
    pub fn follow_outedge(&self, node: NodeIndex, edge_label: u8) -> Option<NodeIndex> {
        let mut next = self.get_kmer(node)[1..].to_vec();
        next.push(edge_label.to_ascii_uppercase());
        self.index.get(&next).copied()
    }

    /// Returns whether the given node has an outgoing edge labeled with `edge_label`.
    pub fn has_outlabel(&self, node: NodeIndex, edge_label: u8) -> bool {
        self.follow_outedge(node, edge_label).is_some()
    }

    /// For each outgoing edge from the given node, pushes to the output vector a pair
    /// (v, c), where v is the target node and c is the edge label. Edges come in ACGT order.
    pub fn push_out_neighbors(&self, node: NodeIndex, output: &mut Vec<(NodeIndex, u8)>) {
        for &c in DNA_ALPHABET.iter() {
            if let Some(v) = self.follow_outedge(node, c) {
                output.push((v, c));
            }
        }
    }

    /// For each incoming edge to the given node, pushes to the output vector a pair
    /// (v, c), where v is the source node and c is the edge label. Sources come in
    /// ACGT order of their first character.
    pub fn push_in_neighbors(&self, node: NodeIndex, output: &mut Vec<(NodeIndex, u8)>) {
        let kmer = self.get_kmer(node);
        let inlabel = *kmer.last().unwrap();
        let mut prev = Vec::with_capacity(self.k);
        for &c in DNA_ALPHABET.iter() {
            prev.clear();
            prev.push(c);
            prev.extend_from_slice(&kmer[..self.k - 1]);
            if let Some(&v) = self.index.get(&prev) {
                output.push((v, inlabel));
            }
        }
    }

    /// Returns the number of incoming edges to the given node.
    pub fn indegree(&self, node: NodeIndex) -> usize {
        let mut in_neighbors = Vec::new();
        self.push_in_neighbors(node, &mut in_neighbors);
        in_neighbors.len()
    }

    /// The target of the outgoing edge with the largest label, if any.
    pub fn last_outgoing(&self, node: NodeIndex) -> Option<NodeIndex> {
        DNA_ALPHABET.iter().rev().find_map(|&c| self.follow_outedge(node, c))
    }
}

impl DeBruijnGraph for HashDbg {
    fn k(&self) -> usize {
        self.k
    }

    fn max_index(&self) -> NodeIndex {
        self.kmers.len()
    }

    fn num_nodes(&self) -> usize {
        self.kmers.len()
    }

    fn adjacent_outgoing_nodes(&self, node: NodeIndex, callback: &mut dyn FnMut(NodeIndex)) {
        for &c in DNA_ALPHABET.iter() {
            if let Some(v) = self.follow_outedge(node, c) {
                callback(v);
            }
        }
    }

    fn map_to_nodes(&self, sequence: &[u8], callback: &mut dyn FnMut(NodeIndex)) {
        if sequence.len() < self.k {
            return;
        }
        for window in sequence.windows(self.k) {
            let node = if window.iter().all(|&c| is_dna(c)) {
                self.get_node(window).unwrap_or(NPOS)
            } else {
                NPOS
            };
            callback(node);
        }
    }
}

impl RowDiffSuccessor for HashDbg {
    /// Without fork successors, the chain continues along the last outgoing edge.
    fn row_diff_successor(&self, node: NodeIndex, fork_succ: &BitVector) -> NodeIndex {
        if fork_succ.is_empty() {
            self.last_outgoing(node)
                .unwrap_or_else(|| panic!("a row diff successor must exist for node {}", node))
        } else {
            fork_successor(self, node, fork_succ)
        }
    }
}




#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand_chacha::rand_core::RngCore;
    use simple_sds_sbwt::raw_vector::{AccessRaw, RawVector};

    use super::*;

    fn finimizer_paper_example() -> HashDbg {
        let seqs: Vec<&[u8]> = vec![b"GTAAGTCT", b"AGGAAA", b"ACAGG", b"GTAGG", b"AGGTA"];
        HashDbg::from_sequences(4, &seqs)
    }

    #[test]
    fn index_conversion() {
        assert_eq!(anno_to_graph_index(0), 1);
        assert_eq!(graph_to_anno_index(1), 0);
        for row in [0, 5, 1000] {
            assert_eq!(graph_to_anno_index(anno_to_graph_index(row)), row);
        }
    }

    #[test]
    fn finimizer_paper_example_dbg_operations() {
        let dbg = finimizer_paper_example();

        assert!(dbg.get_node(b"TTAT").is_none());
        let v = dbg.get_node(b"ACAG").unwrap();
        assert_eq!(dbg.get_kmer(v), b"ACAG");
        assert_eq!(dbg.outdegree(v), 1);
        assert_eq!(dbg.indegree(v), 0);

        assert!(!dbg.has_outlabel(v, b'A'));
        assert!(dbg.has_outlabel(v, b'G'));
        assert!(dbg.follow_outedge(v, b'T').is_none());

        let v = dbg.follow_outedge(v, b'G').unwrap();
        assert_eq!(dbg.get_kmer(v), b"CAGG");
        assert_eq!(dbg.outdegree(v), 2);

        let mut out_neighbors = Vec::new();
        dbg.push_out_neighbors(v, &mut out_neighbors);
        assert_eq!(out_neighbors, vec![(dbg.get_node(b"AGGA").unwrap(), b'A'), (dbg.get_node(b"AGGT").unwrap(), b'T')]);
        assert_eq!(dbg.last_outgoing(v), dbg.get_node(b"AGGT"));

        let v = dbg.get_node(b"AGGA").unwrap();
        assert_eq!(dbg.indegree(v), 2);
        let mut in_neighbors = Vec::new();
        dbg.push_in_neighbors(v, &mut in_neighbors);
        assert_eq!(in_neighbors, vec![(dbg.get_node(b"CAGG").unwrap(), b'A'), (dbg.get_node(b"TAGG").unwrap(), b'A')]);

        let sink = dbg.get_node(b"GTCT").unwrap();
        assert_eq!(dbg.outdegree(sink), 0);
        assert_eq!(dbg.last_outgoing(sink), None);
        assert_eq!(dbg.get_last_character(sink), b'T');
    }

    #[test]
    fn map_to_nodes_reports_missing_kmers() {
        let dbg = finimizer_paper_example();
        let mut nodes = Vec::new();
        dbg.map_to_nodes(b"ACAGGNTTTT", &mut |v| nodes.push(v));
        assert_eq!(nodes.len(), 7);
        assert_eq!(nodes[0], dbg.get_node(b"ACAG").unwrap());
        assert_eq!(nodes[1], dbg.get_node(b"CAGG").unwrap());
        assert!(nodes[2..].iter().all(|&v| v == NPOS));

        let mut lower = Vec::new();
        dbg.map_to_nodes(b"acagg", &mut |v| lower.push(v));
        assert_eq!(lower, nodes[..2].to_vec());
    }

    #[test]
    fn add_sequence_skips_invalid_windows() {
        let mut dbg = HashDbg::new(3);
        assert_eq!(dbg.add_sequence(b"ACGNACG"), 1);
        assert_eq!(dbg.add_sequence(b"AC"), 0);
        assert_eq!(dbg.add_sequence(b"acgt"), 1);
        assert_eq!(dbg.num_nodes(), 2);
        assert_eq!(dbg.node_iterator().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(dbg.get_kmer(2), b"CGT");
        assert!(!dbg.in_graph(NPOS));
        assert!(!dbg.in_graph(3));
    }

    #[test]
    fn row_diff_successor_rules() {
        let dbg = finimizer_paper_example();
        let cagg = dbg.get_node(b"CAGG").unwrap();
        let agga = dbg.get_node(b"AGGA").unwrap();
        let aggt = dbg.get_node(b"AGGT").unwrap();
        let acag = dbg.get_node(b"ACAG").unwrap();

        let empty = BitVector::from(RawVector::new());
        assert_eq!(dbg.row_diff_successor(cagg, &empty), aggt);
        assert_eq!(dbg.row_diff_successor(acag, &empty), cagg);

        let mut raw = RawVector::with_len(dbg.max_index() + 1, false);
        raw.set_bit(agga, true);
        let fork_succ = BitVector::from(raw);
        assert_eq!(dbg.row_diff_successor(cagg, &fork_succ), agga);
        // A single outgoing edge needs no mark
        assert_eq!(dbg.row_diff_successor(acag, &fork_succ), cagg);
    }

    #[test]
    #[should_panic]
    fn row_diff_successor_of_sink_panics() {
        let dbg = finimizer_paper_example();
        let sink = dbg.get_node(b"GTCT").unwrap();
        dbg.row_diff_successor(sink, &BitVector::from(RawVector::new()));
    }

    #[test]
    fn randomized_test() {
        use rand_chacha::ChaCha20Rng;
        use rand_chacha::rand_core::SeedableRng;

        let k = 5_usize;
        let mut rng = ChaCha20Rng::from_seed([123; 32]);

        let mut seqs = Vec::<Vec<u8>>::new();
        let mut seqs_hashset = HashSet::<Vec<u8>>::new();
        for _ in 0..1000 {
            let kmer: Vec<u8> = (0..k).map(|_| DNA_ALPHABET[(rng.next_u32() % 4) as usize]).collect();
            seqs.push(kmer.clone());
            seqs_hashset.insert(kmer);
        }
        let slices: Vec<&[u8]> = seqs.iter().map(|s| s.as_slice()).collect();
        let dbg = HashDbg::from_sequences(k, &slices);
        assert_eq!(dbg.num_nodes(), seqs_hashset.len());

        for v in dbg.node_iterator() {
            let kmer = dbg.get_kmer(v).to_vec();
            let mut true_out = Vec::new();
            let mut true_in = Vec::new();
            for &c in DNA_ALPHABET.iter() {
                let mut next = kmer[1..].to_vec();
                next.push(c);
                if seqs_hashset.contains(&next) {
                    true_out.push((dbg.get_node(&next).unwrap(), c));
                }
                let mut prev = vec![c];
                prev.extend(&kmer[..k - 1]);
                if seqs_hashset.contains(&prev) {
                    true_in.push((dbg.get_node(&prev).unwrap(), *kmer.last().unwrap()));
                }
            }
            let mut out = Vec::new();
            dbg.push_out_neighbors(v, &mut out);
            assert_eq!(out, true_out);
            assert_eq!(dbg.outdegree(v), true_out.len());

            let mut adjacent = Vec::new();
            dbg.adjacent_outgoing_nodes(v, &mut |u| adjacent.push(u));
            assert_eq!(adjacent, true_out.iter().map(|x| x.0).collect::<Vec<_>>());

            let mut inn = Vec::new();
            dbg.push_in_neighbors(v, &mut inn);
            assert_eq!(inn, true_in);
            assert_eq!(dbg.indegree(v), true_in.len());
        }
    }
}
