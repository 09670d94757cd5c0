//! The binary format of an exported taxonomy, and reading it back.
//!
//! The file has three little-endian sections: the k-mer assignments as a `u64` count
//! followed by `(row, taxid)` pairs in increasing row order, the accession-versions as
//! a `u64` count followed by length-prefixed UTF-8 strings, and the parent of every
//! normalized node as a `u64` count followed by the values.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::graph::Row;
use crate::util::{read_string_vec, read_u64_vec, MAX_PREALLOC};

use super::NormalizedTaxId;

// Returns the number of bytes written
pub(crate) fn write_taxonomic_map<W: Write>(out: &mut W, map: &HashMap<Row, NormalizedTaxId>) -> std::io::Result<usize> {
    let mut pairs: Vec<(Row, NormalizedTaxId)> = map.iter().map(|(&r, &t)| (r, t)).collect();
    pairs.sort_unstable();
    out.write_u64::<LittleEndian>(pairs.len() as u64)?;
    for (row, taxid) in pairs.iter() {
        out.write_u64::<LittleEndian>(*row as u64)?;
        out.write_u64::<LittleEndian>(*taxid as u64)?;
    }
    Ok(8 + 16 * pairs.len())
}

fn read_taxonomic_map<R: Read>(input: &mut R) -> std::io::Result<HashMap<Row, NormalizedTaxId>> {
    let len = input.read_u64::<LittleEndian>()? as usize;
    let mut map = HashMap::with_capacity(len.min(MAX_PREALLOC));
    for _ in 0..len {
        let row = input.read_u64::<LittleEndian>()? as Row;
        let taxid = input.read_u64::<LittleEndian>()? as NormalizedTaxId;
        map.insert(row, taxid);
    }
    Ok(map)
}

fn corrupt(msg: String) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, msg))
}

/// A taxonomy written by [crate::taxonomy::TaxonomyDb::export], loaded for lookups.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ExportedTaxonomy {
    taxonomic_map: HashMap<Row, NormalizedTaxId>,
    node_to_acc_version: Vec<String>,
    node_parent: Vec<NormalizedTaxId>,
}

impl ExportedTaxonomy {

    pub fn load<R: Read>(input: &mut R) -> Result<Self> {
        let taxonomic_map = read_taxonomic_map(input)?;
        let node_to_acc_version = read_string_vec(input)?;
        let node_parent: Vec<NormalizedTaxId> = read_u64_vec(input)?.into_iter().map(|x| x as NormalizedTaxId).collect();

        let n_nodes = node_to_acc_version.len();
        if node_parent.len() != n_nodes {
            return Err(corrupt(format!("{} accession versions but {} parents", n_nodes, node_parent.len())));
        }
        if let Some(&p) = node_parent.iter().find(|&&p| p >= n_nodes) {
            return Err(corrupt(format!("parent {} is out of range", p)));
        }
        if let Some((&row, &t)) = taxonomic_map.iter().find(|&(_, &t)| t >= n_nodes) {
            return Err(corrupt(format!("row {} is assigned to taxid {} which is out of range", row, t)));
        }

        Ok(Self { taxonomic_map, node_to_acc_version, node_parent })
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingFile { what: "exported taxonomy", path: path.to_path_buf() });
        }
        let mut input = BufReader::new(File::open(path)?);
        let taxonomy = Self::load(&mut input)?;
        log::info!("Loaded taxonomy with {} nodes and {} assigned rows", taxonomy.num_nodes(), taxonomy.num_assignments());
        Ok(taxonomy)
    }

    pub fn num_nodes(&self) -> usize {
        self.node_parent.len()
    }

    pub fn num_assignments(&self) -> usize {
        self.taxonomic_map.len()
    }

    /// The taxon assigned to the row, if any.
    pub fn assignment(&self, row: Row) -> Option<NormalizedTaxId> {
        self.taxonomic_map.get(&row).copied()
    }

    /// The accession-version of the node. Empty for nodes without one.
    pub fn accession(&self, taxid: NormalizedTaxId) -> &str {
        &self.node_to_acc_version[taxid]
    }

    pub fn parent(&self, taxid: NormalizedTaxId) -> NormalizedTaxId {
        self.node_parent[taxid]
    }

    /// The node followed by its ancestors up to and including the root.
    pub fn lineage(&self, taxid: NormalizedTaxId) -> Vec<NormalizedTaxId> {
        let mut lineage = vec![taxid];
        let mut current = taxid;
        while self.node_parent[current] != current {
            current = self.node_parent[current];
            lineage.push(current);
            assert!(lineage.len() <= self.num_nodes(), "the parent array has a cycle");
        }
        lineage
    }
}
