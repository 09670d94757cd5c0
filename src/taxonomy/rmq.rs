//! Constant-time lowest common ancestor queries with a sparse table over an Euler tour.
//!
//! The Euler tour lists a node when it is entered and again after each of its children
//! returns. Between the first occurrences of two nodes the tour stays inside the subtree
//! of their LCA and passes through the LCA itself. Every node is ranked by the height of
//! its subtree, so the LCA is the unique highest-ranked node of that window.

use super::NormalizedTaxId;

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct LcaIndex {
    /// Height of the subtree of each node. Leaves have depth 1.
    node_depth: Vec<u64>,
    /// First position of each node in the Euler tour.
    node_to_linearization_idx: Vec<usize>,
    /// Row r holds, for every window of length 2^r, the node of maximum depth in it.
    /// Row 0 is the Euler tour.
    rmq_data: Vec<Vec<NormalizedTaxId>>,
    precalc_log2: Vec<usize>,
    precalc_pow2: Vec<usize>,
}

impl LcaIndex {

    /// Builds the index of the tree with the given children lists rooted at `root`.
    /// Every node must be reachable from the root.
    pub fn new(children: &[Vec<NormalizedTaxId>], root: NormalizedTaxId) -> Self {
        let n_nodes = children.len();
        assert!(root < n_nodes);

        let start_time = std::time::Instant::now();
        let (linearization, node_to_linearization_idx, node_depth) = Self::euler_tour(children, root);
        assert_eq!(linearization.len(), 2 * n_nodes - 1, "the tree is not connected");
        log::trace!("Euler tour of {} nodes computed in {} seconds", n_nodes, start_time.elapsed().as_secs_f64());

        let start_time = std::time::Instant::now();
        let (rmq_data, precalc_log2, precalc_pow2) = Self::rmq_preprocessing(linearization, &node_depth);
        log::trace!("Sparse table with {} rows built in {} seconds", rmq_data.len(), start_time.elapsed().as_secs_f64());

        Self { node_depth, node_to_linearization_idx, rmq_data, precalc_log2, precalc_pow2 }
    }

    // Iterative depth-first traversal. The stack holds (node, index of the next child).
    fn euler_tour(children: &[Vec<NormalizedTaxId>], root: NormalizedTaxId) -> (Vec<NormalizedTaxId>, Vec<usize>, Vec<u64>) {
        let n_nodes = children.len();
        let mut linearization = Vec::with_capacity(2 * n_nodes);
        let mut first = vec![usize::MAX; n_nodes];
        let mut depth = vec![0_u64; n_nodes];

        first[root] = 0;
        linearization.push(root);
        let mut stack: Vec<(NormalizedTaxId, usize)> = vec![(root, 0)];
        while let Some(&(node, next)) = stack.last() {
            if next < children[node].len() {
                let top = stack.len() - 1;
                stack[top].1 += 1;
                let child = children[node][next];
                assert!(first[child] == usize::MAX, "node {} is reached twice", child);
                first[child] = linearization.len();
                linearization.push(child);
                stack.push((child, 0));
            } else {
                stack.pop();
                depth[node] = 1 + children[node].iter().map(|&c| depth[c]).max().unwrap_or(0);
                if let Some(&(parent, _)) = stack.last() {
                    linearization.push(parent);
                }
            }
        }
        (linearization, first, depth)
    }

    fn rmq_preprocessing(linearization: Vec<NormalizedTaxId>, node_depth: &[u64]) -> (Vec<Vec<NormalizedTaxId>>, Vec<usize>, Vec<usize>) {
        let len = linearization.len();
        let n_rows = (usize::BITS - len.leading_zeros()) as usize; // floor(log2(len)) + 1

        let mut rmq_data = Vec::with_capacity(n_rows);
        rmq_data.push(linearization);
        for row in 1..n_rows {
            let delta = 1_usize << (row - 1);
            let prev: &Vec<NormalizedTaxId> = &rmq_data[row - 1];
            let current: Vec<NormalizedTaxId> = (0..=len - 2 * delta).map(|i| {
                let (left, right) = (prev[i], prev[i + delta]);
                if node_depth[left] > node_depth[right] { left } else { right }
            }).collect();
            rmq_data.push(current);
        }

        let mut precalc_log2 = vec![0_usize; len];
        for i in 2..len {
            precalc_log2[i] = 1 + precalc_log2[i / 2];
        }
        let precalc_pow2 = (0..n_rows).map(|r| 1_usize << r).collect();

        (rmq_data, precalc_log2, precalc_pow2)
    }

    pub fn num_nodes(&self) -> usize {
        self.node_depth.len()
    }

    /// Returns the lowest common ancestor of the nodes. Panics if `nodes` is empty.
    pub fn lca(&self, nodes: &[NormalizedTaxId]) -> NormalizedTaxId {
        assert!(!nodes.is_empty(), "the LCA of an empty set is undefined");
        let mut left_idx = usize::MAX;
        let mut right_idx = 0_usize;
        for &node in nodes {
            let idx = self.node_to_linearization_idx[node];
            left_idx = left_idx.min(idx);
            right_idx = right_idx.max(idx);
        }

        let log_dist = self.precalc_log2[right_idx - left_idx];
        let left_lca = self.rmq_data[log_dist][left_idx];
        let right_lca = self.rmq_data[log_dist][right_idx + 1 - self.precalc_pow2[log_dist]];

        if self.node_depth[left_lca] > self.node_depth[right_lca] {
            left_lca
        } else {
            right_lca
        }
    }

    pub fn lca_pair(&self, a: NormalizedTaxId, b: NormalizedTaxId) -> NormalizedTaxId {
        self.lca(&[a, b])
    }

    /// Height of the subtree of the node, 1 for leaves.
    pub fn depth(&self, node: NormalizedTaxId) -> u64 {
        self.node_depth[node]
    }

    pub fn linearization(&self) -> &[NormalizedTaxId] {
        &self.rmq_data[0]
    }

    pub fn first_occurrence(&self, node: NormalizedTaxId) -> usize {
        self.node_to_linearization_idx[node]
    }

    /// Parent of every node, recovered from the Euler tour. The root is its own parent.
    pub fn node_parents(&self) -> Vec<NormalizedTaxId> {
        let linearization = self.linearization();
        let mut visited = vec![false; self.num_nodes()];
        let mut node_parent = vec![0; self.num_nodes()];

        visited[linearization[0]] = true;
        node_parent[linearization[0]] = linearization[0];
        for w in linearization.windows(2) {
            let (prv, act) = (w[0], w[1]);
            // On a first visit the previous entry is the parent, otherwise a child
            if !visited[act] {
                node_parent[act] = prv;
                visited[act] = true;
            }
        }
        node_parent
    }
}
