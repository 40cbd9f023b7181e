//! Kekulization — assigns alternating single/double orders to aromatic input bonds
//!
//! An aromatic atom needs a double bond when its lowest allowed valence still
//! has room for one after all its other bonds and hydrogens are counted.
//! A perfect matching over the aromatic bonds between such atoms decides which
//! bonds become double; every other aromatic bond becomes single.
//!
//! # Guarantees
//!
//! - The result does not depend on the order alternatives are tried in:
//!   any perfect matching yields the same aromatic perception afterwards.
//! - Search is bounded; pathological inputs fail instead of hanging.

use super::element::Element;
use super::graph::{BondOrder, Molecule};
use crate::{Error, Result};

const STEP_LIMIT: usize = 100_000;

/// Whether an aromatic atom must receive one double bond
///
/// `aromatic_bonds` counts unresolved aromatic bonds, `other_valence` sums
/// the orders of all remaining bonds and `hydrogens` are explicit ones.
pub(crate) fn needs_double_bond(
    element: Element,
    charge: i8,
    hydrogens: u8,
    aromatic_bonds: u8,
    other_valence: u8,
    has_multiple_bond: bool,
) -> bool {
    if has_multiple_bond {
        return false;
    }
    match element.allowed_valences(charge).first() {
        Some(&lowest) => {
            u16::from(aromatic_bonds) + u16::from(other_valence) + u16::from(hydrogens)
                < u16::from(lowest)
        }
        None => false,
    }
}

/// Replace every `BondOrder::Aromatic` with a Kekulé order
pub fn kekulize(mol: &mut Molecule) -> Result<()> {
    if !mol.bonds.iter().any(|b| b.order == BondOrder::Aromatic) {
        return Ok(());
    }

    let n = mol.atoms.len();
    let mut needs = vec![false; n];
    for (i, atom) in mol.atoms.iter().enumerate() {
        if !atom.aromatic {
            continue;
        }
        let mut aromatic_bonds = 0u8;
        let mut other = 0u8;
        let mut multiple = false;
        for &(_, b) in &mol.adjacency[i] {
            let order = mol.bonds[b].order;
            if order == BondOrder::Aromatic {
                aromatic_bonds = aromatic_bonds.saturating_add(1);
            } else {
                other = other.saturating_add(order.valence());
                multiple |= order != BondOrder::Single;
            }
        }
        let hydrogens = if atom.bracket { atom.hydrogens } else { 0 };
        needs[i] = needs_double_bond(
            atom.element,
            atom.charge,
            hydrogens,
            aromatic_bonds,
            other,
            multiple,
        );
    }

    // Candidate edges: aromatic bonds joining two atoms that need a double bond
    let mut edges: Vec<Vec<(usize, usize)>> = vec![Vec::new(); n];
    for (b, bond) in mol.bonds.iter().enumerate() {
        if bond.order == BondOrder::Aromatic && needs[bond.a] && needs[bond.b] {
            edges[bond.a].push((bond.b, b));
            edges[bond.b].push((bond.a, b));
        }
    }

    let mut matcher = Matcher {
        edges: &edges,
        needs: &needs,
        mate: vec![None; n],
        steps: 0,
    };
    if !matcher.solve()? {
        return Err(Error::Chemistry("can't kekulize aromatic system".to_string()));
    }

    let doubles: Vec<bool> = {
        let mut d = vec![false; mol.bonds.len()];
        for b in matcher.mate.iter().flatten() {
            d[*b] = true;
        }
        d
    };
    for (b, bond) in mol.bonds.iter_mut().enumerate() {
        if bond.order == BondOrder::Aromatic {
            bond.order = if doubles[b] {
                BondOrder::Double
            } else {
                BondOrder::Single
            };
        }
    }
    Ok(())
}

struct Matcher<'a> {
    edges: &'a [Vec<(usize, usize)>],
    needs: &'a [bool],
    /// Matched bond per atom
    mate: Vec<Option<usize>>,
    steps: usize,
}

impl Matcher<'_> {
    fn free(&self, atom: usize) -> bool {
        self.needs[atom] && self.mate[atom].is_none()
    }

    fn options(&self, atom: usize) -> usize {
        self.edges[atom].iter().filter(|(w, _)| self.free(*w)).count()
    }

    /// Match the most constrained free atom first, backtracking on dead ends
    fn solve(&mut self) -> Result<bool> {
        self.steps += 1;
        if self.steps > STEP_LIMIT {
            return Err(Error::Unsupported(
                "aromatic system too large to kekulize".to_string(),
            ));
        }

        let mut best: Option<(usize, usize)> = None;
        for atom in 0..self.needs.len() {
            if !self.free(atom) {
                continue;
            }
            let count = self.options(atom);
            if count == 0 {
                return Ok(false);
            }
            if best.map_or(true, |(_, c)| count < c) {
                best = Some((atom, count));
            }
        }
        let Some((atom, _)) = best else {
            return Ok(true);
        };

        let edges = self.edges;
        for &(w, b) in &edges[atom] {
            if !self.free(w) {
                continue;
            }
            self.mate[atom] = Some(b);
            self.mate[w] = Some(b);
            if self.solve()? {
                return Ok(true);
            }
            self.mate[atom] = None;
            self.mate[w] = None;
        }
        Ok(false)
    }
}
