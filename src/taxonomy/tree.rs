//! Parsing of the taxonomy inputs and normalization of the taxonomic tree.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::BufRead;

use crate::error::{Error, Result};
use crate::util::accession_from_header;

use super::{NormalizedTaxId, TaxId};

fn parse_taxid(field: &str, what: &'static str, line: usize) -> Result<TaxId> {
    field.trim().parse::<TaxId>().map_err(|e| Error::Parse { what, line, msg: format!("bad taxid '{}': {}", field, e) })
}

/// Reads the full `child -> parent` relation from a tab-separated tree file. Field 0
/// is the taxid and field 2 its parent. Empty lines are skipped.
pub fn parse_tree<R: BufRead>(input: R) -> Result<HashMap<TaxId, TaxId>> {
    const WHAT: &str = "taxonomic tree";
    let mut parents = HashMap::new();
    for (i, line) in input.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() < 3 {
            return Err(Error::Parse { what: WHAT, line: i + 1, msg: format!("expected at least 3 fields, found {}", parts.len()) });
        }
        let taxid = parse_taxid(parts[0], WHAT, i + 1)?;
        let parent = parse_taxid(parts[2], WHAT, i + 1)?;
        if parents.insert(taxid, parent).is_some() {
            return Err(Error::Parse { what: WHAT, line: i + 1, msg: format!("taxid {} appears twice", taxid) });
        }
    }
    Ok(parents)
}

/// Reads the accession-versions used by the input sequences. Field 0 of every line is
/// a pipe-delimited sequence header.
pub fn parse_headers<R: BufRead>(input: R) -> Result<HashSet<String>> {
    let mut accessions = HashSet::new();
    for (i, line) in input.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let header = line.split('\t').next().unwrap_or_default();
        match accession_from_header(header) {
            Some(acc) => { accessions.insert(acc.to_string()); }
            None => return Err(Error::Parse { what: "fasta headers", line: i + 1, msg: format!("no accession version in '{}'", header) }),
        }
    }
    Ok(accessions)
}

/// Reads an accession-to-taxid table with 4 tab-separated fields per line (field 1 is
/// the accession-version and field 2 the taxid) and keeps the accessions in `used`.
/// Returns the reversed table `taxid -> accession-version`.
pub fn parse_lookup_table<R: BufRead>(input: R, used: &HashSet<String>) -> Result<HashMap<TaxId, String>> {
    const WHAT: &str = "taxonomic lookup table";
    let mut reversed = HashMap::new();
    for (i, line) in input.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() != 4 {
            return Err(Error::Parse { what: WHAT, line: i + 1, msg: format!("expected 4 fields, found {}", parts.len()) });
        }
        if used.contains(parts[1]) {
            let taxid = parse_taxid(parts[2], WHAT, i + 1)?;
            reversed.insert(taxid, parts[1].to_string());
        }
    }
    Ok(reversed)
}

/// The part of the taxonomic tree spanned by the relevant taxids, with dense ids.
#[derive(Clone, Debug)]
pub struct NormalizedTree {
    pub children: Vec<Vec<NormalizedTaxId>>,
    pub root: NormalizedTaxId,
    /// External taxid of every normalized node.
    pub node_to_taxid: Vec<TaxId>,
    /// Accession-version of every normalized node, empty for nodes not named by the lookup table.
    pub node_to_acc_version: Vec<String>,
    /// Accession-version -> normalized id.
    pub lookup_table: HashMap<String, NormalizedTaxId>,
    /// Relevant taxids dropped because their chain of parents does not reach a root.
    pub num_taxid_failed: usize,
}

// Whether following parents from `taxid` reaches a self-parenting node.
// Results are memoized for every taxid on the walk.
fn reaches_root(taxid: TaxId, parents: &HashMap<TaxId, TaxId>, memo: &mut HashMap<TaxId, bool>) -> bool {
    let mut walk = Vec::<TaxId>::new();
    let mut on_walk = HashSet::<TaxId>::new();
    let mut current = taxid;
    let result = loop {
        if let Some(&known) = memo.get(&current) {
            break known;
        }
        if !on_walk.insert(current) {
            break false; // A cycle without a root
        }
        walk.push(current);
        match parents.get(&current) {
            None => {
                log::warn!("Taxid {} cannot be found in the taxonomic tree", current);
                break false;
            }
            Some(&parent) if parent == current => break true,
            Some(&parent) => current = parent,
        }
    };
    for t in walk {
        memo.insert(t, result);
    }
    result
}

/// Gives dense ids to the relevant taxids and all of their ancestors, breadth-first
/// from the relevant taxids in increasing order.
pub fn normalize_tree(parents: &HashMap<TaxId, TaxId>, reversed_lookup: &HashMap<TaxId, String>) -> Result<NormalizedTree> {
    let mut relevant: Vec<TaxId> = reversed_lookup.keys().copied().collect();
    relevant.sort_unstable();

    let mut memo = HashMap::<TaxId, bool>::new();
    let mut num_taxid_failed = 0_usize;
    let mut queue = VecDeque::<TaxId>::with_capacity(relevant.len());
    for taxid in relevant {
        if reaches_root(taxid, parents, &mut memo) {
            queue.push_back(taxid);
        } else {
            num_taxid_failed += 1;
        }
    }

    let mut normalized = HashMap::<TaxId, NormalizedTaxId>::new();
    let mut node_to_taxid = Vec::<TaxId>::new();
    let mut node_to_acc_version = Vec::<String>::new();
    let mut lookup_table = HashMap::<String, NormalizedTaxId>::new();
    let mut root: Option<NormalizedTaxId> = None;

    while let Some(taxid) = queue.pop_front() {
        if normalized.contains_key(&taxid) {
            continue;
        }
        let id = node_to_taxid.len();
        normalized.insert(taxid, id);
        node_to_taxid.push(taxid);
        let acc = reversed_lookup.get(&taxid).cloned().unwrap_or_default();
        if !acc.is_empty() {
            lookup_table.insert(acc.clone(), id);
        }
        node_to_acc_version.push(acc);

        let parent = parents[&taxid]; // Chains were checked above
        if parent == taxid {
            if let Some(r) = root {
                return Err(Error::InvalidInput(format!(
                    "the taxonomic tree has two roots: {} and {}", node_to_taxid[r], taxid)));
            }
            root = Some(id);
        } else {
            queue.push_back(parent);
        }
    }

    let n_nodes = node_to_taxid.len();
    if num_taxid_failed > 0 {
        log::warn!("Number of taxids succeeded {}, failed {}", n_nodes, num_taxid_failed);
    }
    let root = root.ok_or_else(|| Error::InvalidInput("no relevant taxid reaches the root of the taxonomic tree".to_string()))?;

    let mut children = vec![Vec::<NormalizedTaxId>::new(); n_nodes];
    for (id, taxid) in node_to_taxid.iter().enumerate() {
        if id != root {
            children[normalized[&parents[taxid]]].push(id);
        }
    }

    Ok(NormalizedTree { children, root, node_to_taxid, node_to_acc_version, lookup_table, num_taxid_failed })
}
