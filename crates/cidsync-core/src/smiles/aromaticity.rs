//! Aromaticity perception on a Kekulé structure
//!
//! Every ring atom that can take part in a conjugated ring is assigned a
//! pi-electron contribution. A simple cycle of such atoms whose total obeys
//! the 4n+2 rule marks its atoms and bonds aromatic.
//!
//! # Guarantees
//!
//! - Perception depends only on the Kekulé graph, not on how the input was
//!   written: `C1=CC=CC=C1` and `c1ccccc1` perceive identically.

use super::element::Element;
use super::graph::{BondOrder, Molecule};
use super::rings::{atom_in_ring, simple_cycles};
use crate::Result;

/// Largest ring considered for aromaticity
const MAX_RING_SIZE: usize = 10;

/// Reset and recompute the `aromatic` flags of all atoms and bonds
pub fn perceive(mol: &mut Molecule) -> Result<()> {
    for atom in &mut mol.atoms {
        atom.aromatic = false;
    }
    for bond in &mut mol.bonds {
        bond.aromatic = false;
    }

    let electrons: Vec<Option<u8>> = (0..mol.atoms.len())
        .map(|a| pi_electrons(mol, a))
        .collect();
    let candidates: Vec<bool> = electrons.iter().map(|e| e.is_some()).collect();
    if !candidates.iter().any(|c| *c) {
        return Ok(());
    }

    for cycle in simple_cycles(mol, MAX_RING_SIZE, &candidates)? {
        let total: u32 = cycle
            .iter()
            .map(|a| u32::from(electrons[*a].unwrap_or(0)))
            .sum();
        if total < 2 || (total - 2) % 4 != 0 {
            continue;
        }
        for (i, &a) in cycle.iter().enumerate() {
            let next = cycle[(i + 1) % cycle.len()];
            mol.atoms[a].aromatic = true;
            if let Some(b) = mol.bond_between(a, next) {
                mol.bonds[b].aromatic = true;
            }
        }
    }
    Ok(())
}

/// Pi electrons an atom donates to a ring, or `None` if it cannot be part of
/// an aromatic ring
fn pi_electrons(mol: &Molecule, a: usize) -> Option<u8> {
    let atom = &mol.atoms[a];
    if atom.element == Element::WILDCARD || !atom_in_ring(mol, a) {
        return None;
    }
    if mol.degree(a) + usize::from(atom.hydrogens) > 3 {
        return None;
    }

    let mut ring_double = false;
    let mut exocyclic_double = false;
    for &(w, b) in &mol.adjacency[a] {
        let bond = &mol.bonds[b];
        match bond.order {
            BondOrder::Single | BondOrder::Aromatic => {}
            BondOrder::Double if bond.in_ring => {
                if ring_double {
                    return None;
                }
                ring_double = true;
            }
            BondOrder::Double => {
                let partner = mol.atoms[w].element;
                if !matches!(partner, Element::O | Element::N | Element::S) {
                    return None;
                }
                exocyclic_double = true;
            }
            BondOrder::Triple | BondOrder::Quadruple => return None,
        }
    }

    match (ring_double, exocyclic_double) {
        (true, true) => None,
        (true, false) => Some(1),
        (false, true) => Some(0),
        (false, false) => lone_pair_or_empty(atom.element, atom.charge),
    }
}

/// Contribution of an atom with no double bond
fn lone_pair_or_empty(element: Element, charge: i8) -> Option<u8> {
    match (element, charge) {
        (e, 0 | -1) if e.has_lone_pair_donor() => Some(2),
        (Element::C, -1) => Some(2),
        (Element::C, 1) => Some(0),
        (Element::B, 0) => Some(0),
        _ => None,
    }
}
