//! Taxonomic classification of graph k-mers.
//!
//! A [TaxonomyDb] is built from three text files: the taxonomic tree (NCBI `nodes.dmp`
//! layout, one `taxid | parent` relation per line), an accession-to-taxid lookup table,
//! and the headers of the sequences that will be classified. Only the part of the tree
//! above the taxids of those sequences is kept, with dense [NormalizedTaxId]s.
//!
//! Every k-mer (graph row) is assigned the lowest common ancestor of the taxa of all
//! sequences containing it. Assignments are merged incrementally with
//! [TaxonomyDb::update_taxonomic_map] and written out with [TaxonomyDb::export].
//!
//! ```
//! use annograph::taxonomy::TaxonomyDb;
//!
//! let tree = "1\t|\t1\t|\tno rank\n2\t|\t1\t|\tgenus\n3\t|\t1\t|\tgenus\n";
//! let lookup = "X\tX.1\t2\t0\nY\tY.1\t3\t0\n";
//! let headers = "gi|0|ref|X.1|\ngi|0|ref|Y.1|\n";
//! let mut db = TaxonomyDb::from_readers(tree.as_bytes(), lookup.as_bytes(), headers.as_bytes()).unwrap();
//!
//! let x = db.find_lca_labels(&["gi|0|ref|X.1|"]).unwrap();
//! let y = db.find_lca_labels(&["gi|0|ref|Y.1|"]).unwrap();
//! db.update_taxonomic_map(&[10, 11], x);
//! db.update_taxonomic_map(&[11], y);
//! assert_eq!(db.assignment(10), Some(x));
//! assert_eq!(db.assignment(11), Some(db.find_lca_pair(x, y)));
//! assert_eq!(db.taxid(db.assignment(11).unwrap()), 1);
//! ```

mod export;
mod rmq;
mod tree;

pub use export::ExportedTaxonomy;
pub use rmq::LcaIndex;
pub use tree::{normalize_tree, parse_headers, parse_lookup_table, parse_tree, NormalizedTree};

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::graph::{graph_to_anno_index, DeBruijnGraph, Row, NPOS};
use crate::util::{accession_from_header, write_string_vec, write_u64_slice};

/// A taxonomic id as it appears in the input files.
pub type TaxId = u64;

/// A dense id of a node of the normalized tree, in `[0, number of nodes)`.
pub type NormalizedTaxId = usize;

pub struct TaxonomyDb {
    lca_index: LcaIndex,
    node_to_taxid: Vec<TaxId>,
    node_to_acc_version: Vec<String>,
    lookup_table: HashMap<String, NormalizedTaxId>,
    taxonomic_map: HashMap<Row, NormalizedTaxId>,

    num_external_lca_calls: usize,
    num_external_lca_calls_failed: usize,
    num_taxid_failed: usize,
}

fn open_input(path: &Path, what: &'static str) -> Result<BufReader<File>> {
    if !path.exists() {
        return Err(Error::MissingFile { what, path: path.to_path_buf() });
    }
    Ok(BufReader::new(File::open(path)?))
}

impl TaxonomyDb {

    /// Builds the taxonomy from the tree, lookup table and headers files.
    pub fn new(taxo_tree_path: &Path, lookup_table_path: &Path, fasta_headers_path: &Path) -> Result<Self> {
        let tree = open_input(taxo_tree_path, "taxonomic tree")?;
        let lookup = open_input(lookup_table_path, "taxonomic lookup table")?;
        let headers = open_input(fasta_headers_path, "fasta headers")?;
        Self::from_readers(tree, lookup, headers)
    }

    /// Like [TaxonomyDb::new], reading the three inputs from the given readers.
    pub fn from_readers<T: BufRead, L: BufRead, H: BufRead>(taxo_tree: T, lookup_table: L, fasta_headers: H) -> Result<Self> {
        let start_time = std::time::Instant::now();
        let input_accessions = parse_headers(fasta_headers)?;
        log::trace!("Parsed {} accession versions from the fasta headers", input_accessions.len());

        let reversed_lookup = parse_lookup_table(lookup_table, &input_accessions)?;
        log::trace!("Found {} of them in the lookup table", reversed_lookup.len());

        let parents = parse_tree(taxo_tree)?;
        let tree = normalize_tree(&parents, &reversed_lookup)?;
        log::info!("Parsed taxonomy inputs in {} seconds: {} nodes in the tree, {} kept",
            start_time.elapsed().as_secs_f64(), parents.len(), tree.node_to_taxid.len());

        let start_time = std::time::Instant::now();
        let lca_index = LcaIndex::new(&tree.children, tree.root);
        log::info!("LCA index built in {} seconds", start_time.elapsed().as_secs_f64());

        Ok(Self {
            lca_index,
            node_to_taxid: tree.node_to_taxid,
            node_to_acc_version: tree.node_to_acc_version,
            lookup_table: tree.lookup_table,
            taxonomic_map: HashMap::new(),
            num_external_lca_calls: 0,
            num_external_lca_calls_failed: 0,
            num_taxid_failed: tree.num_taxid_failed,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.lca_index.num_nodes()
    }

    pub fn lca_index(&self) -> &LcaIndex {
        &self.lca_index
    }

    /// The external taxid of a normalized node.
    pub fn taxid(&self, node: NormalizedTaxId) -> TaxId {
        self.node_to_taxid[node]
    }

    /// The accession-version of a normalized node, empty if the node has none.
    pub fn accession(&self, node: NormalizedTaxId) -> &str {
        &self.node_to_acc_version[node]
    }

    /// Panics if `taxids` is empty.
    pub fn find_lca(&self, taxids: &[NormalizedTaxId]) -> NormalizedTaxId {
        self.lca_index.lca(taxids)
    }

    pub fn find_lca_pair(&self, a: NormalizedTaxId, b: NormalizedTaxId) -> NormalizedTaxId {
        self.lca_index.lca_pair(a, b)
    }

    /// The normalized id of the taxon named by a pipe-delimited sequence header.
    pub fn resolve_label(&self, label: &str) -> Result<NormalizedTaxId> {
        let acc = accession_from_header(label).ok_or_else(|| Error::MalformedLabel(label.to_string()))?;
        self.lookup_table.get(acc).copied().ok_or_else(|| Error::UnknownAccession(acc.to_string()))
    }

    /// The LCA of the taxa of the labels. If a label cannot be resolved, logs a warning,
    /// counts the failure and returns None.
    pub fn find_lca_labels(&mut self, labels: &[&str]) -> Option<NormalizedTaxId> {
        self.num_external_lca_calls += 1;
        if labels.is_empty() {
            log::warn!("LCA requested for an empty set of labels");
            self.num_external_lca_calls_failed += 1;
            return None;
        }
        let mut taxids = Vec::with_capacity(labels.len());
        for label in labels {
            match self.resolve_label(label) {
                Ok(t) => taxids.push(t),
                Err(e) => {
                    log::warn!("{}", e);
                    self.num_external_lca_calls_failed += 1;
                    return None;
                }
            }
        }
        Some(self.find_lca(&taxids))
    }

    /// Assigns `lca` to every k-mer without a taxon, and replaces the taxon of every
    /// other k-mer with its LCA with `lca`.
    pub fn update_taxonomic_map(&mut self, kmers: &[Row], lca: NormalizedTaxId) {
        assert!(lca < self.num_nodes());
        for &kmer in kmers {
            let merged = match self.taxonomic_map.get(&kmer) {
                Some(&current) => self.lca_index.lca_pair(current, lca),
                None => lca,
            };
            self.taxonomic_map.insert(kmer, merged);
        }
    }

    pub fn assignment(&self, kmer: Row) -> Option<NormalizedTaxId> {
        self.taxonomic_map.get(&kmer).copied()
    }

    pub fn taxonomic_map(&self) -> &HashMap<Row, NormalizedTaxId> {
        &self.taxonomic_map
    }

    /// Classifies the k-mers of every sequence in a FASTA or FASTQ stream by the taxon
    /// of its header. K-mers missing from the graph are skipped, and so are sequences
    /// whose header does not resolve. Returns the number of sequences used.
    pub fn add_fasta<G, R>(&mut self, graph: &G, input: R) -> Result<usize>
    where G: DeBruijnGraph + ?Sized, R: Read + Send + Sync + 'static {
        let start_time = std::time::Instant::now();
        let mut reader = jseqio::reader::DynamicFastXReader::new(BufReader::new(input))
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())))?;

        let mut n_used = 0_usize;
        let mut n_records = 0_usize;
        let mut rows = Vec::<Row>::new();
        loop {
            let rec = reader.read_next()
                .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())))?;
            let Some(rec) = rec else { break };
            n_records += 1;

            let header = String::from_utf8_lossy(rec.head).into_owned();
            let Some(taxid) = self.find_lca_labels(&[header.as_str()]) else { continue };

            rows.clear();
            graph.map_to_nodes(rec.seq, &mut |node| {
                if node != NPOS {
                    rows.push(graph_to_anno_index(node));
                }
            });
            self.update_taxonomic_map(&rows, taxid);
            n_used += 1;
        }

        log::info!("Classified k-mers of {}/{} sequences in {} seconds ({} rows assigned)",
            n_used, n_records, start_time.elapsed().as_secs_f64(), self.taxonomic_map.len());
        Ok(n_used)
    }

    pub fn num_external_lca_calls(&self) -> usize {
        self.num_external_lca_calls
    }

    pub fn num_external_lca_calls_failed(&self) -> usize {
        self.num_external_lca_calls_failed
    }

    /// Number of taxids from the lookup table that were left out of the tree.
    pub fn num_taxid_failed(&self) -> usize {
        self.num_taxid_failed
    }

    /// Writes the taxonomic map, the accession-versions and the parent array. See
    /// [ExportedTaxonomy] for the format. Returns the number of bytes written.
    pub fn export<W: Write>(&self, out: &mut W) -> Result<usize> {
        if self.num_external_lca_calls_failed > 0 {
            log::warn!("Total number of external LCA calls: {}, of which with unknown accession versions: {}",
                self.num_external_lca_calls, self.num_external_lca_calls_failed);
        }
        let node_parent: Vec<u64> = self.lca_index.node_parents().into_iter().map(|p| p as u64).collect();

        let mut n_written = export::write_taxonomic_map(out, &self.taxonomic_map)?;
        n_written += write_string_vec(out, &self.node_to_acc_version)?;
        n_written += write_u64_slice(out, &node_parent)?;
        Ok(n_written)
    }

    pub fn export_to_file(&self, path: &Path) -> Result<()> {
        let start_time = std::time::Instant::now();
        let mut out = BufWriter::new(File::create(path)?);
        let n_written = self.export(&mut out)?;
        out.flush()?;
        log::trace!("Exported {} bytes of taxonomic data to {} in {} seconds",
            n_written, path.display(), start_time.elapsed().as_secs_f64());
        Ok(())
    }
}
