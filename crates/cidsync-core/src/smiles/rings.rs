//! Ring perception helpers
//!
//! Ring bonds are found as the non-bridges of the graph. Aromaticity works on
//! the set of all simple cycles up to a size limit, which is independent of
//! atom numbering.

use std::collections::VecDeque;

use super::graph::Molecule;
use crate::{Error, Result};

const MAX_CYCLES: usize = 20_000;

/// Set `in_ring` on every bond that lies on at least one cycle
pub fn mark_ring_bonds(mol: &mut Molecule) {
    let n = mol.atoms.len();
    let mut disc = vec![usize::MAX; n];
    let mut low = vec![0usize; n];
    let mut bridge = vec![false; mol.bonds.len()];
    let mut time = 0;

    for root in 0..n {
        if disc[root] != usize::MAX {
            continue;
        }
        disc[root] = time;
        low[root] = time;
        time += 1;
        // (atom, bond used to reach it, next adjacency index)
        let mut stack: Vec<(usize, usize, usize)> = vec![(root, usize::MAX, 0)];

        while let Some(top) = stack.last_mut() {
            let (v, via) = (top.0, top.1);
            if top.2 < mol.adjacency[v].len() {
                let (w, b) = mol.adjacency[v][top.2];
                top.2 += 1;
                if b == via {
                    continue;
                }
                if disc[w] == usize::MAX {
                    disc[w] = time;
                    low[w] = time;
                    time += 1;
                    stack.push((w, b, 0));
                } else {
                    low[v] = low[v].min(disc[w]);
                }
            } else {
                stack.pop();
                if let Some(&(u, _, _)) = stack.last() {
                    low[u] = low[u].min(low[v]);
                    if low[v] > disc[u] {
                        bridge[via] = true;
                    }
                }
            }
        }
    }

    for (i, bond) in mol.bonds.iter_mut().enumerate() {
        bond.in_ring = !bridge[i];
    }
}

/// Whether `atom` has at least one ring bond
pub fn atom_in_ring(mol: &Molecule, atom: usize) -> bool {
    mol.adjacency[atom]
        .iter()
        .any(|(_, b)| mol.bonds[*b].in_ring)
}

/// Size of the smallest ring containing `bond`, if any
pub fn smallest_ring_through(mol: &Molecule, bond: usize) -> Option<usize> {
    let (start, goal) = (mol.bonds[bond].a, mol.bonds[bond].b);
    let mut dist = vec![usize::MAX; mol.atoms.len()];
    let mut queue = VecDeque::new();
    dist[start] = 0;
    queue.push_back(start);

    while let Some(v) = queue.pop_front() {
        for &(w, b) in &mol.adjacency[v] {
            if b == bond || dist[w] != usize::MAX {
                continue;
            }
            dist[w] = dist[v] + 1;
            if w == goal {
                return Some(dist[w] + 1);
            }
            queue.push_back(w);
        }
    }
    None
}

/// All simple cycles of at most `max_len` atoms through `allowed` atoms,
/// following ring bonds only
///
/// Each cycle is returned once as its atom sequence, starting from its
/// lowest-indexed atom.
pub fn simple_cycles(mol: &Molecule, max_len: usize, allowed: &[bool]) -> Result<Vec<Vec<usize>>> {
    let mut cycles = Vec::new();
    let mut on_path = vec![false; mol.atoms.len()];

    for start in 0..mol.atoms.len() {
        if !allowed[start] {
            continue;
        }
        let mut path = vec![start];
        on_path[start] = true;
        extend(mol, max_len, allowed, &mut path, &mut on_path, &mut cycles)?;
        on_path[start] = false;
    }
    Ok(cycles)
}

fn extend(
    mol: &Molecule,
    max_len: usize,
    allowed: &[bool],
    path: &mut Vec<usize>,
    on_path: &mut [bool],
    cycles: &mut Vec<Vec<usize>>,
) -> Result<()> {
    let start = path[0];
    let last = path[path.len() - 1];

    for &(w, b) in &mol.adjacency[last] {
        if !mol.bonds[b].in_ring || !allowed[w] {
            continue;
        }
        if w == start {
            // Each cycle is seen in both directions; keep one.
            if path.len() >= 3 && path[1] < last {
                cycles.push(path.clone());
                if cycles.len() > MAX_CYCLES {
                    return Err(Error::Unsupported("ring system too large".to_string()));
                }
            }
            continue;
        }
        if w < start || on_path[w] || path.len() == max_len {
            continue;
        }
        path.push(w);
        on_path[w] = true;
        extend(mol, max_len, allowed, path, on_path, cycles)?;
        on_path[w] = false;
        path.pop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parser::parse;

    fn ring_mol(smiles: &str) -> Molecule {
        let mut mol = parse(smiles).unwrap();
        mark_ring_bonds(&mut mol);
        mol
    }

    #[test]
    fn test_chain_has_no_ring_bonds() {
        let mol = ring_mol("CCCC");
        assert!(mol.bonds.iter().all(|b| !b.in_ring));
    }

    #[test]
    fn test_ring_with_substituent() {
        let mol = ring_mol("C1CC1C");
        let ring_count = mol.bonds.iter().filter(|b| b.in_ring).count();
        assert_eq!(ring_count, 3);
        assert!(!mol.bonds[mol.bond_between(2, 3).unwrap()].in_ring);
    }

    #[test]
    fn test_smallest_ring_through_fused_bond() {
        // Naphthalene skeleton: the fusion bond is in two six-membered rings
        let mol = ring_mol("C1CCC2CCCCC2C1");
        let fusion = mol.bond_between(3, 8).unwrap();
        assert_eq!(smallest_ring_through(&mol, fusion), Some(6));
    }

    #[test]
    fn test_simple_cycles_bicyclic() {
        let mol = ring_mol("C1CCC2CCCCC2C1");
        let allowed = vec![true; mol.atoms.len()];
        let cycles = simple_cycles(&mol, 10, &allowed).unwrap();
        let mut sizes: Vec<usize> = cycles.iter().map(|c| c.len()).collect();
        sizes.sort();
        assert_eq!(sizes, vec![6, 6, 10]);
    }

    #[test]
    fn test_simple_cycles_respects_limit() {
        let mol = ring_mol("C1CCC2CCCCC2C1");
        let allowed = vec![true; mol.atoms.len()];
        let cycles = simple_cycles(&mol, 6, &allowed).unwrap();
        assert_eq!(cycles.len(), 2);
    }
}
