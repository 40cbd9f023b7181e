//! Canonical atom ranking
//!
//! Atoms start in cells ordered by an invariant built from local properties.
//! Cells are then split by how many neighbours (and over which bonds) each
//! member has in another cell, until no split is possible. The stable cells
//! are the symmetry classes. Ties among them are broken by singling out one
//! member and splitting again, until every atom has a distinct rank.
//!
//! # Guarantees
//!
//! - Symmetry classes depend only on the molecular graph, never on input
//!   atom order.
//! - [`rank_atoms`] picks tie-breaks by atom index; [`tie_break_rankings`]
//!   enumerates the alternatives, so a caller can pick the outcome that does
//!   not depend on input order when stereo makes the choice visible.
//! - Ranks are dense: `0..atoms.len()`.
//! - Refinement only revisits cells next to a cell that just split.

use std::collections::{BTreeMap, BTreeSet};

use super::graph::{BondOrder, Molecule};
use super::rings::atom_in_ring;

/// Upper bound on rankings produced by [`tie_break_rankings`]
pub const MAX_TIE_BREAK_RANKINGS: usize = 128;

/// Result of ranking a molecule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranking {
    /// Symmetry class per atom; equivalent atoms share a class
    pub classes: Vec<usize>,
    /// Distinct canonical rank per atom
    pub ranks: Vec<usize>,
}

/// Local invariant, compared lexicographically
type Invariant = (usize, u8, u16, i8, u8, bool, bool, u32);

fn invariant(mol: &Molecule, a: usize) -> Invariant {
    let atom = &mol.atoms[a];
    (
        mol.degree(a),
        atom.element.atomic_number(),
        atom.isotope.unwrap_or(0),
        atom.charge,
        atom.hydrogens,
        atom.aromatic,
        atom_in_ring(mol, a),
        atom.class.unwrap_or(0),
    )
}

/// Bond code used during refinement
fn bond_code(mol: &Molecule, b: usize) -> u8 {
    let bond = &mol.bonds[b];
    if bond.aromatic {
        return 4;
    }
    match bond.order {
        BondOrder::Single => 1,
        BondOrder::Double => 2,
        BondOrder::Triple => 3,
        BondOrder::Aromatic => 4,
        BondOrder::Quadruple => 5,
    }
}

// ── Partition ─────────────────────────────────────────────

/// Ordered partition of the atoms
///
/// A cell is named by its start position; members of the cell at `s` hold
/// ranks `s..s + len`. Splitting a cell keeps the first fragment at `s`, so
/// other cells never move.
#[derive(Debug, Clone)]
struct Partition {
    cell_of: Vec<usize>,
    cells: BTreeMap<usize, Vec<usize>>,
    /// Starts of cells with more than one member
    tied: BTreeSet<usize>,
}

impl Partition {
    fn from_keys<K: Ord>(keys: &[K]) -> Self {
        let mut atoms: Vec<usize> = (0..keys.len()).collect();
        atoms.sort_by(|&x, &y| keys[x].cmp(&keys[y]));

        let mut partition = Partition {
            cell_of: vec![0; keys.len()],
            cells: BTreeMap::new(),
            tied: BTreeSet::new(),
        };
        let mut start = 0;
        for (i, &a) in atoms.iter().enumerate() {
            if i > 0 && keys[a] != keys[atoms[i - 1]] {
                start = i;
            }
            partition.cell_of[a] = start;
            partition.cells.entry(start).or_default().push(a);
        }
        partition.tied = partition
            .cells
            .iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(start, _)| *start)
            .collect();
        partition
    }

    /// Coarsest stable refinement of the invariant partition
    fn stable(mol: &Molecule) -> Self {
        let keys: Vec<Invariant> = (0..mol.atoms.len()).map(|a| invariant(mol, a)).collect();
        let mut partition = Self::from_keys(&keys);
        let pending = partition.cells.keys().copied().collect();
        partition.refine(mol, pending);
        partition
    }

    /// Split cells against each pending cell until nothing changes
    fn refine(&mut self, mol: &Molecule, mut pending: BTreeSet<usize>) {
        while let Some(splitter) = pending.pop_first() {
            let Some(members) = self.cells.get(&splitter).cloned() else {
                continue;
            };
            let mut codes: BTreeMap<usize, Vec<u8>> = BTreeMap::new();
            for &x in &members {
                for &(w, b) in &mol.adjacency[x] {
                    codes.entry(w).or_default().push(bond_code(mol, b));
                }
            }
            let mut by_cell: BTreeMap<usize, Vec<(Vec<u8>, usize)>> = BTreeMap::new();
            for (w, mut key) in codes {
                key.sort_unstable();
                by_cell.entry(self.cell_of[w]).or_default().push((key, w));
            }
            for (cell, hits) in by_cell {
                self.split(cell, hits, &mut pending);
            }
        }
    }

    /// Split `cell` by the keys its members have against one splitter
    ///
    /// Atoms with more contacts come first; atoms without any come last.
    fn split(
        &mut self,
        cell: usize,
        mut hits: Vec<(Vec<u8>, usize)>,
        pending: &mut BTreeSet<usize>,
    ) {
        let Some(members) = self.cells.get(&cell).cloned() else {
            return;
        };
        hits.sort_unstable_by(|x, y| y.0.cmp(&x.0));
        if hits.len() == members.len() && hits[0].0 == hits[hits.len() - 1].0 {
            return;
        }

        let mut fragments: Vec<Vec<usize>> = Vec::new();
        let mut i = 0;
        while i < hits.len() {
            let same = hits[i..].iter().take_while(|(k, _)| *k == hits[i].0).count();
            fragments.push(hits[i..i + same].iter().map(|(_, w)| *w).collect());
            i += same;
        }
        if hits.len() < members.len() {
            let touched: BTreeSet<usize> = hits.iter().map(|(_, w)| *w).collect();
            fragments.push(members.into_iter().filter(|a| !touched.contains(a)).collect());
        }

        let was_pending = pending.contains(&cell);
        let mut largest = 0;
        for (f, fragment) in fragments.iter().enumerate() {
            if fragment.len() > fragments[largest].len() {
                largest = f;
            }
        }

        self.cells.remove(&cell);
        self.tied.remove(&cell);
        let mut start = cell;
        for (f, fragment) in fragments.into_iter().enumerate() {
            let len = fragment.len();
            for &a in &fragment {
                self.cell_of[a] = start;
            }
            if len > 1 {
                self.tied.insert(start);
            }
            // A cell already used as a splitter is covered by all but one part
            if was_pending || f != largest {
                pending.insert(start);
            }
            self.cells.insert(start, fragment);
            start += len;
        }
    }

    /// Give `atom` the lowest rank of its cell and refine
    fn single_out(&mut self, mol: &Molecule, atom: usize) {
        let cell = self.cell_of[atom];
        let Some(members) = self.cells.remove(&cell) else {
            return;
        };
        self.tied.remove(&cell);
        let rest: Vec<usize> = members.into_iter().filter(|&a| a != atom).collect();
        self.cells.insert(cell, vec![atom]);
        if !rest.is_empty() {
            let start = cell + 1;
            for &a in &rest {
                self.cell_of[a] = start;
            }
            if rest.len() > 1 {
                self.tied.insert(start);
            }
            self.cells.insert(start, rest);
        }
        self.refine(mol, BTreeSet::from([cell]));
    }

    fn first_tied(&self) -> Option<usize> {
        self.tied.first().copied()
    }

    /// Dense class index per atom
    fn classes(&self) -> Vec<usize> {
        let index: BTreeMap<usize, usize> = self
            .cells
            .keys()
            .enumerate()
            .map(|(i, start)| (*start, i))
            .collect();
        self.cell_of.iter().map(|start| index[start]).collect()
    }
}

/// Members of a tied cell worth trying as the next tie-break
///
/// Terminal atoms hanging off the same neighbour are interchangeable, so only
/// the first of each such group is kept.
fn tie_break_candidates(mol: &Molecule, members: &[usize]) -> Vec<usize> {
    let mut sorted = members.to_vec();
    sorted.sort_unstable();
    let mut seen_parents = BTreeSet::new();
    sorted
        .into_iter()
        .filter(|&a| match mol.adjacency[a].as_slice() {
            [(parent, _)] => seen_parents.insert(*parent),
            _ => true,
        })
        .collect()
}

// ── Ranking ───────────────────────────────────────────────

/// Compute symmetry classes and canonical ranks
pub fn rank_atoms(mol: &Molecule) -> Ranking {
    let mut partition = Partition::stable(mol);
    let classes = partition.classes();
    while let Some(cell) = partition.first_tied() {
        let Some(&chosen) = partition.cells.get(&cell).and_then(|m| m.iter().min()) else {
            break;
        };
        partition.single_out(mol, chosen);
    }
    Ranking {
        classes,
        ranks: partition.classes(),
    }
}

/// Every ranking reachable through distinct tie-break choices
///
/// At most `limit` rankings are produced; once the limit is near, the
/// remaining ties are broken by atom index as in [`rank_atoms`].
pub fn tie_break_rankings(mol: &Molecule, limit: usize) -> Vec<Ranking> {
    let base = Partition::stable(mol);
    let classes = base.classes();
    let mut found = Vec::new();
    let mut stack = vec![base];

    while let Some(partition) = stack.pop() {
        let Some(cell) = partition.first_tied() else {
            found.push(Ranking {
                classes: classes.clone(),
                ranks: partition.classes(),
            });
            continue;
        };
        let members = partition.cells.get(&cell).cloned().unwrap_or_default();
        let mut candidates = tie_break_candidates(mol, &members);
        if found.len() + stack.len() + candidates.len() > limit {
            candidates.truncate(1);
        }
        for &atom in candidates.iter().rev() {
            let mut next = partition.clone();
            next.single_out(mol, atom);
            stack.push(next);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parser::parse;
    use crate::smiles::sanitize::sanitize;

    fn ranked(smiles: &str) -> (Molecule, Ranking) {
        let mut mol = parse(smiles).unwrap();
        sanitize(&mut mol).unwrap();
        let ranking = rank_atoms(&mol);
        (mol, ranking)
    }

    #[test]
    fn test_ranks_are_a_permutation() {
        let (mol, ranking) = ranked("CC(C)C(=O)O");
        let mut sorted = ranking.ranks.clone();
        sorted.sort();
        assert_eq!(sorted, (0..mol.atoms.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_symmetric_methyls_share_class() {
        let (_, ranking) = ranked("CC(C)O");
        assert_eq!(ranking.classes[0], ranking.classes[2]);
        assert_ne!(ranking.ranks[0], ranking.ranks[2]);
    }

    #[test]
    fn test_benzene_atoms_all_equivalent() {
        let (_, ranking) = ranked("c1ccccc1");
        assert!(ranking.classes.iter().all(|c| *c == 0));
    }

    #[test]
    fn test_ethanol_methyl_ranks_first() {
        let (_, forward) = ranked("CCO");
        let (_, reverse) = ranked("OCC");
        assert_eq!(forward.ranks[0], 0);
        assert_eq!(reverse.ranks[2], 0);
    }

    #[test]
    fn test_chain_classes_pair_up_mirror_positions() {
        let (mol, ranking) = ranked("CCCCCCC");
        let n = mol.atoms.len();
        for i in 0..n {
            assert_eq!(ranking.classes[i], ranking.classes[n - 1 - i]);
        }
        assert_eq!(class_count(&ranking.classes), 4);
    }

    #[test]
    fn test_classes_independent_of_atom_order() {
        let (_, a) = ranked("OCC(C)CN");
        let (_, b) = ranked("NCC(C)CO");
        let mut left = a.classes.clone();
        let mut right = b.classes.clone();
        left.sort();
        right.sort();
        assert_eq!(left, right);
        // O and N are singled out by element alone
        assert_ne!(a.classes[0], b.classes[0]);
    }

    #[test]
    fn test_long_chain_ranks_quickly() {
        let chain = "C".repeat(5000);
        let (_, ranking) = ranked(&chain);
        // Mirror positions fill consecutive ranks from the ends inward
        assert_eq!(ranking.ranks[0], 0);
        assert_eq!(ranking.ranks[4999], 1);
        assert_eq!(ranking.ranks[1], 2);
        assert_eq!(ranking.ranks[4998], 3);
    }

    #[test]
    fn test_tie_breaks_enumerated_for_symmetric_molecule() {
        let mut mol = parse("OC1CC1O").unwrap();
        sanitize(&mut mol).unwrap();
        let rankings = tie_break_rankings(&mol, MAX_TIE_BREAK_RANKINGS);
        assert!(rankings.len() >= 2);
        assert!(rankings.iter().all(|r| r.classes == rankings[0].classes));
    }

    #[test]
    fn test_terminal_twins_tried_once() {
        let mut mol = parse("CC(C)(C)O").unwrap();
        sanitize(&mut mol).unwrap();
        assert_eq!(tie_break_rankings(&mol, MAX_TIE_BREAK_RANKINGS).len(), 1);
    }

    #[test]
    fn test_tie_break_limit_respected() {
        let mut mol = parse("C1CCCCCCCCCCCCCCCCCCC1").unwrap();
        sanitize(&mut mol).unwrap();
        assert!(tie_break_rankings(&mol, 8).len() <= 8);
    }

    #[test]
    fn test_ranking_determinism_100_iterations() {
        let (mol, first) = ranked("CC(C)(C)c1ccc(O)cc1");
        for _ in 0..100 {
            assert_eq!(rank_atoms(&mol), first);
        }
    }

    fn class_count(classes: &[usize]) -> usize {
        classes.iter().max().map_or(0, |m| m + 1)
    }
}
