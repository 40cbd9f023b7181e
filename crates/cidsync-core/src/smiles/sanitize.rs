//! Sanitization — turns a parsed graph into a chemically consistent molecule
//!
//! Passes run in a fixed order:
//!
//! 1. ring bond detection
//! 2. resolution of implicit bonds between aromatic atoms
//! 3. kekulization
//! 4. valence check and implicit hydrogen assignment
//! 5. folding of plain `[H]` atoms into their neighbour's hydrogen count
//! 6. aromaticity perception
//!
//! # Guarantees
//!
//! - A sanitized molecule has no `BondOrder::Aromatic` bonds; aromaticity
//!   lives in the `aromatic` flags only.
//! - `hydrogens` on every atom is the total attached hydrogen count.

use super::aromaticity;
use super::element::Element;
use super::graph::{BondOrder, Molecule, Neighbor};
use super::kekulize::{self, needs_double_bond};
use super::rings::{atom_in_ring, mark_ring_bonds};
use crate::{Error, Result};

/// Largest molecule the canonicalizer accepts
pub const MAX_ATOMS: usize = 10_000;

pub fn sanitize(mol: &mut Molecule) -> Result<()> {
    if mol.atoms.len() > MAX_ATOMS {
        return Err(Error::Unsupported(format!(
            "{} atoms exceeds the limit of {}",
            mol.atoms.len(),
            MAX_ATOMS
        )));
    }
    mark_ring_bonds(mol);
    resolve_aromatic_bonds(mol)?;
    kekulize::kekulize(mol)?;
    assign_hydrogens(mol)?;
    fold_explicit_hydrogens(mol);
    aromaticity::perceive(mol)?;
    Ok(())
}

/// Turn implicit bonds between two aromatic ring atoms into aromatic bonds
/// and reject aromatic atoms or bonds outside rings
pub(crate) fn resolve_aromatic_bonds(mol: &mut Molecule) -> Result<()> {
    for i in 0..mol.bonds.len() {
        let (a, b) = (mol.bonds[i].a, mol.bonds[i].b);
        let both_aromatic = mol.atoms[a].aromatic && mol.atoms[b].aromatic;
        let bond = &mut mol.bonds[i];
        if bond.implicit && both_aromatic && bond.in_ring {
            bond.order = BondOrder::Aromatic;
        }
        if bond.order == BondOrder::Aromatic && !(both_aromatic && bond.in_ring) {
            return Err(Error::Chemistry(format!(
                "aromatic bond between atoms {} and {} is not in an aromatic ring",
                a + 1,
                b + 1
            )));
        }
    }
    for (i, atom) in mol.atoms.iter().enumerate() {
        if atom.aromatic && !atom_in_ring(mol, i) {
            return Err(Error::Chemistry(format!(
                "non-ring atom {} marked aromatic",
                i + 1
            )));
        }
    }
    Ok(())
}

/// Hydrogens an unbracketed atom carries, given its bonds as written
///
/// `aromatic_bonds` counts bonds to be resolved by kekulization;
/// `other_valence` and `has_multiple_bond` describe the remaining bonds.
/// Returns `None` when no default valence can accommodate the bonds.
pub(crate) fn organic_hydrogens(
    element: Element,
    aromatic: bool,
    aromatic_bonds: u8,
    other_valence: u8,
    has_multiple_bond: bool,
) -> Option<u8> {
    let allowed = element.default_valences();
    if allowed.is_empty() {
        return Some(0);
    }
    let mut valence = aromatic_bonds.saturating_add(other_valence);
    if aromatic
        && needs_double_bond(
            element,
            0,
            0,
            aromatic_bonds,
            other_valence,
            has_multiple_bond,
        )
    {
        valence += 1;
    }
    allowed
        .iter()
        .find(|v| **v >= valence)
        .map(|v| v - valence)
}

fn assign_hydrogens(mol: &mut Molecule) -> Result<()> {
    for i in 0..mol.atoms.len() {
        let valence = mol.explicit_valence(i);
        let atom = &mut mol.atoms[i];
        if atom.bracket {
            let allowed = atom.element.allowed_valences(atom.charge);
            if let Some(&max) = allowed.last() {
                let total = valence.saturating_add(atom.hydrogens);
                if total > max {
                    return Err(Error::Chemistry(format!(
                        "explicit valence {} for atom {} ({}) exceeds the maximum of {}",
                        total,
                        i + 1,
                        atom.element,
                        max
                    )));
                }
            }
            continue;
        }
        let allowed = atom.element.default_valences();
        if allowed.is_empty() {
            continue;
        }
        match allowed.iter().find(|v| **v >= valence) {
            Some(v) => atom.hydrogens = v - valence,
            None => {
                return Err(Error::Chemistry(format!(
                    "explicit valence {} for atom {} ({}) is greater than permitted",
                    valence,
                    i + 1,
                    atom.element
                )))
            }
        }
    }
    Ok(())
}

/// Whether an atom is a plain `[H]` that can become an implicit hydrogen
fn is_foldable_hydrogen(mol: &Molecule, i: usize) -> bool {
    let atom = &mol.atoms[i];
    if atom.element != Element::H
        || atom.isotope.is_some()
        || atom.charge != 0
        || atom.class.is_some()
        || atom.hydrogens != 0
        || mol.degree(i) != 1
    {
        return false;
    }
    let (neighbor, bond) = mol.adjacency[i][0];
    mol.bonds[bond].order == BondOrder::Single && mol.atoms[neighbor].element != Element::H
}

fn fold_explicit_hydrogens(mol: &mut Molecule) {
    let removed: Vec<bool> = (0..mol.atoms.len())
        .map(|i| is_foldable_hydrogen(mol, i))
        .collect();
    if !removed.iter().any(|r| *r) {
        return;
    }

    for h in 0..mol.atoms.len() {
        if !removed[h] {
            continue;
        }
        let (parent, _) = mol.adjacency[h][0];
        let atom = &mut mol.atoms[parent];
        atom.hydrogens = atom.hydrogens.saturating_add(1);
        for entry in atom.order.iter_mut() {
            if *entry == Neighbor::Atom(h) {
                *entry = Neighbor::Hydrogen;
            }
        }
    }

    // Double-bond stereo that referenced a folded hydrogen moves to the
    // other substituent on the same end, with the configuration flipped.
    let mut stereo = std::mem::take(&mut mol.double_bond_stereo);
    stereo.retain_mut(|s| {
        let (a, b) = (mol.bonds[s.bond].a, mol.bonds[s.bond].b);
        let substitute = |end: usize, other_end: usize, reference: usize| {
            mol.adjacency[end]
                .iter()
                .map(|(w, _)| *w)
                .find(|w| *w != other_end && *w != reference && !removed[*w])
        };
        if removed[s.a_ref] {
            match substitute(a, b, s.a_ref) {
                Some(w) => {
                    s.a_ref = w;
                    s.config = s.config.flip();
                }
                None => return false,
            }
        }
        if removed[s.b_ref] {
            match substitute(b, a, s.b_ref) {
                Some(w) => {
                    s.b_ref = w;
                    s.config = s.config.flip();
                }
                None => return false,
            }
        }
        true
    });
    mol.double_bond_stereo = stereo;

    mol.remove_atoms(&removed);
}
