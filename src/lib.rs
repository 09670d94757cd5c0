//! # Introduction
//!
//! This crate stores and queries annotations of the nodes of a de Bruijn graph. An annotation
//! is a binary matrix with one row per node (k-mer) and one column per label, for example one
//! column per input genome. The crate provides two things:
//!
//! - The [row-diff](row_diff) compressed representation of such a matrix. Consecutive k-mers of
//! a genome usually carry the same labels, so most rows are stored only as the difference to the
//! row of their successor in the graph. Rows marked as *anchors* are stored in full. A batch of
//! rows is reconstructed by walking the successor chains of all rows of the batch at once,
//! so that each stored row on the shared parts of the chains is decoded only once
//! (see [resolve_batch] and [RowDiff::get_rows]).
//! - A [taxonomic classifier](taxonomy) that assigns to every k-mer the lowest common ancestor
//! of the taxa of the sequences it occurs in. LCA queries take constant time after a linear-time
//! preprocessing of the taxonomic tree, using a sparse table over its Euler tour.
//!
//! The graph is accessed only through the [DeBruijnGraph] and [RowDiffSuccessor] traits.
//! The crate includes a simple hash-table backed implementation, [HashDbg].
//!
//! # API Quick start
//!
//! ```
//! use annograph::*;
//!
//! // Build a graph and annotate every k-mer with the indices of the sequences containing it
//! let seqs: Vec<&[u8]> = vec![b"ACAGGTAGGAAAGGAAAGT", b"GTAAGTCTAGGA"];
//! let graph = HashDbg::from_sequences(4, &seqs);
//! let mut rows = vec![SetBitPositions::new(); graph.num_nodes()];
//! for (label, seq) in seqs.iter().enumerate() {
//!     graph.map_to_nodes(seq, &mut |node| {
//!         let row = graph_to_anno_index(node); // Every k-mer is in the graph
//!         if rows[row].last() != Some(&label) {
//!             rows[row].push(label);
//!         }
//!     });
//! }
//! let matrix = ColumnMajor::from_rows(&rows, seqs.len());
//!
//! // Convert to row-diff form
//! let parts = RowDiffBuilder::new().max_path_length(8).n_threads(2).run(&graph, &matrix).unwrap();
//! let rd = RowDiff::from_parts(&graph, parts).unwrap();
//!
//! // Decode rows
//! let agga = graph_to_anno_index(graph.get_node(b"AGGA").unwrap());
//! assert_eq!(rd.get_row(agga), vec![0, 1]);
//! assert_eq!(rd.get_rows(&[0, agga, 0]), vec![rows[0].clone(), rows[agga].clone(), rows[0].clone()]);
//!
//! // The rows that decoding the batch touches
//! let batch = rd.get_rd_ids(&[0, agga]);
//! assert!(batch.rd_ids.windows(2).all(|w| w[0] < w[1]));
//! ```
//!
//! # Files
//!
//! The diff matrix, the anchors and the fork successors can be written to one stream with
//! [RowDiff::serialize], or to separate files that are opened with [RowDiff::open]. The anchor
//! and fork successor files are [simple_sds_sbwt] bit vectors. A missing or unreadable file is
//! reported as an [Error] for which [Error::is_fatal] is true. Failures that affect a single
//! query, such as a sequence header naming an unknown accession, are not fatal.
//!
//! # Limitations
//!
//! [HashDbg] supports only the DNA alphabet ACGT and does not model reverse complements.
//! Any graph implementing the traits can be used instead.

// Index arithmetic over rows and tree positions is clearer with explicit loops
#![allow(clippy::needless_range_loop)]

mod error;
pub use error::{Error, Result};

mod util;
pub use util::{accession_from_header, DNA_ALPHABET};

mod graph;
pub use graph::*;

mod column_major;
pub use column_major::*;

pub mod row_diff;
pub use row_diff::{resolve_batch, RdBatch, RowDiff, RowDiffBuilder, RowDiffParts};

pub mod taxonomy;
