//! Canonical SMILES writer
//!
//! Output is produced in two passes over a depth-first traversal that always
//! visits neighbours in canonical rank order. The first pass fixes the
//! spanning tree and the ring-closure bonds; the second emits text, so ring
//! digits and `/` `\` marks can be chosen with the whole layout known.
//!
//! # Guarantees
//!
//! - Same sanitized graph and ranking → same layout and string.
//! - [`write_canonical`] gives the same string for every atom order of the
//!   same molecule, stereo included, while the tie-break rankings stay under
//!   [`MAX_TIE_BREAK_RANKINGS`].
//! - Stereo is only written where it is meaningful: tetrahedral centres need
//!   distinguishable neighbours (or a ring partner centre when two ring
//!   neighbours are equivalent), double bonds need distinguishable
//!   substituents and must not sit in a small ring.
//! - `/` `\` marks depend on the written layout only: the first mark of each
//!   double bond is `/` on the earliest written carrier.
//! - Writing then re-reading preserves element, charge, isotope, hydrogen
//!   count, bond multiplicity, chirality sense and cis/trans relationships.

use std::collections::{BTreeMap, BTreeSet};

use super::canon::{rank_atoms, tie_break_rankings, MAX_TIE_BREAK_RANKINGS};
use super::graph::{
    BondOrder, Chirality, Direction, DoubleBondConfig, DoubleBondStereo, Molecule, Neighbor,
};
use super::rings::{atom_in_ring, smallest_ring_through};
use super::sanitize::organic_hydrogens;
use crate::{Error, Result};

/// Double bonds in rings smaller than this carry no cis/trans mark
const MIN_STEREO_RING: usize = 8;

/// Write a sanitized molecule as canonical SMILES
///
/// Tie-breaks between symmetric atoms cannot show in a string without
/// stereo. With stereo they can, so every tie-break ranking is written and
/// the smallest string is kept.
pub fn write_canonical(mol: &Molecule) -> Result<String> {
    if mol.is_empty() {
        return Ok(String::new());
    }
    let ranking = rank_atoms(mol);
    let stereo = Stereo::effective(mol, &ranking.classes);
    if stereo.is_empty() {
        return write_ranked(mol, &ranking.ranks, &stereo);
    }

    let mut best: Option<String> = None;
    for candidate in tie_break_rankings(mol, MAX_TIE_BREAK_RANKINGS) {
        let written = write_ranked(mol, &candidate.ranks, &stereo)?;
        if best.as_ref().map_or(true, |b| written < *b) {
            best = Some(written);
        }
    }
    best.ok_or_else(|| Error::Unsupported("no ranking to write".to_string()))
}

fn write_ranked(mol: &Molecule, ranks: &[usize], stereo: &Stereo) -> Result<String> {
    let layout = Layout::build(mol, ranks);
    let directions = assign_directions(mol, &layout, &stereo.double_bonds);

    let mut emitter = Emitter {
        mol,
        layout: &layout,
        chirality: &stereo.chirality,
        directions: &directions,
        digit_of: vec![0; mol.bonds.len()],
        in_use: BTreeSet::new(),
        out: String::new(),
    };
    for (i, &root) in layout.roots.iter().enumerate() {
        if i > 0 {
            emitter.out.push('.');
        }
        emitter.emit(root)?;
    }
    Ok(emitter.out)
}

// ── Layout ─────────────────────────────────────────────

struct Layout {
    roots: Vec<usize>,
    /// Visit position per atom
    position: Vec<usize>,
    parent: Vec<Option<usize>>,
    /// (child, bond) in visit order
    children: Vec<Vec<(usize, usize)>>,
    /// Ring closures opened at an atom: (partner, bond)
    ring_open: Vec<Vec<(usize, usize)>>,
    /// Ring closures closed at an atom: (partner, bond)
    ring_close: Vec<Vec<(usize, usize)>>,
    /// Atom written first for each bond
    first: Vec<usize>,
}

impl Layout {
    fn build(mol: &Molecule, ranks: &[usize]) -> Self {
        let n = mol.atoms.len();
        let mut layout = Layout {
            roots: Vec::new(),
            position: vec![usize::MAX; n],
            parent: vec![None; n],
            children: vec![Vec::new(); n],
            ring_open: vec![Vec::new(); n],
            ring_close: vec![Vec::new(); n],
            first: vec![usize::MAX; mol.bonds.len()],
        };
        let sorted: Vec<Vec<(usize, usize)>> = mol
            .adjacency
            .iter()
            .map(|adj| {
                let mut adj = adj.clone();
                adj.sort_by_key(|(w, _)| ranks[*w]);
                adj
            })
            .collect();
        let mut by_rank: Vec<usize> = (0..n).collect();
        by_rank.sort_by_key(|a| ranks[*a]);

        let mut seen_bond = vec![false; mol.bonds.len()];
        let mut next_position = 0;
        for start in by_rank {
            if layout.position[start] != usize::MAX {
                continue;
            }
            layout.roots.push(start);
            layout.position[start] = next_position;
            next_position += 1;

            // (atom, next neighbour index)
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            while let Some(top) = stack.last_mut() {
                let a = top.0;
                let Some(&(w, b)) = sorted[a].get(top.1) else {
                    stack.pop();
                    continue;
                };
                top.1 += 1;
                if seen_bond[b] {
                    continue;
                }
                seen_bond[b] = true;
                if layout.position[w] != usize::MAX {
                    layout.ring_open[w].push((a, b));
                    layout.ring_close[a].push((w, b));
                    layout.first[b] = w;
                } else {
                    layout.children[a].push((w, b));
                    layout.parent[w] = Some(a);
                    layout.first[b] = a;
                    layout.position[w] = next_position;
                    next_position += 1;
                    stack.push((w, 0));
                }
            }
        }
        layout
    }

    /// Neighbours of `a` in the order they appear in the output
    fn output_order(&self, mol: &Molecule, a: usize) -> Vec<Neighbor> {
        let mut order = Vec::with_capacity(4);
        if let Some(p) = self.parent[a] {
            order.push(Neighbor::Atom(p));
        }
        for _ in 0..mol.atoms[a].hydrogens {
            order.push(Neighbor::Hydrogen);
        }
        for &(w, _) in self.ring_close[a].iter().chain(&self.ring_open[a]) {
            order.push(Neighbor::Atom(w));
        }
        for &(w, _) in &self.children[a] {
            order.push(Neighbor::Atom(w));
        }
        order
    }
}

// ── Stereo ─────────────────────────────────────────────

/// Stereo elements that survive symmetry checks
struct Stereo {
    chirality: Vec<Chirality>,
    double_bonds: Vec<DoubleBondStereo>,
}

impl Stereo {
    fn effective(mol: &Molecule, classes: &[usize]) -> Self {
        Stereo {
            chirality: effective_chirality(mol, classes),
            double_bonds: effective_double_bond_stereo(mol, classes),
        }
    }

    fn is_empty(&self) -> bool {
        self.double_bonds.is_empty() && self.chirality.iter().all(|c| *c == Chirality::None)
    }
}

/// How a tagged atom qualifies as a tetrahedral centre
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Centre {
    /// Every neighbour in its own symmetry class
    Distinct,
    /// One pair of equivalent neighbours, both reached over ring bonds
    RingPair,
}

fn centre_kind(mol: &Molecule, classes: &[usize], i: usize) -> Option<Centre> {
    let atom = &mol.atoms[i];
    if atom.chirality == Chirality::None || atom.hydrogens > 1 {
        return None;
    }
    let entries = mol.degree(i) + usize::from(atom.hydrogens);
    if !(3..=4).contains(&entries) || atom.order.len() != entries {
        return None;
    }

    let mut first_bond: BTreeMap<usize, usize> = BTreeMap::new();
    let mut repeated = Vec::new();
    for &(w, b) in &mol.adjacency[i] {
        match first_bond.get(&classes[w]) {
            Some(&earlier) => {
                repeated.push(earlier);
                repeated.push(b);
            }
            None => {
                first_bond.insert(classes[w], b);
            }
        }
    }
    match repeated.as_slice() {
        [] => Some(Centre::Distinct),
        [x, y] if mol.bonds[*x].in_ring && mol.bonds[*y].in_ring => Some(Centre::RingPair),
        _ => None,
    }
}

/// Ring system per atom; atoms joined through ring bonds share an id
fn ring_systems(mol: &Molecule) -> Vec<Option<usize>> {
    let mut system = vec![None; mol.atoms.len()];
    let mut next = 0;
    for start in 0..mol.atoms.len() {
        if system[start].is_some() || !atom_in_ring(mol, start) {
            continue;
        }
        system[start] = Some(next);
        let mut stack = vec![start];
        while let Some(a) = stack.pop() {
            for &(w, b) in &mol.adjacency[a] {
                if mol.bonds[b].in_ring && system[w].is_none() {
                    system[w] = Some(next);
                    stack.push(w);
                }
            }
        }
        next += 1;
    }
    system
}

/// Chirality tags that survive symmetry checks, per atom
///
/// A centre whose equivalent neighbours lie on a ring is kept only when a
/// second centre shares its ring system (cis/trans ring isomers).
fn effective_chirality(mol: &Molecule, classes: &[usize]) -> Vec<Chirality> {
    let kinds: Vec<Option<Centre>> = (0..mol.atoms.len())
        .map(|i| centre_kind(mol, classes, i))
        .collect();
    let systems = ring_systems(mol);
    let mut centres_in: BTreeMap<usize, usize> = BTreeMap::new();
    for (kind, system) in kinds.iter().zip(&systems) {
        if let (Some(_), Some(s)) = (kind, system) {
            *centres_in.entry(*s).or_default() += 1;
        }
    }

    kinds
        .iter()
        .enumerate()
        .map(|(i, kind)| match kind {
            Some(Centre::Distinct) => mol.atoms[i].chirality,
            Some(Centre::RingPair) => {
                let centres = systems[i].and_then(|s| centres_in.get(&s).copied());
                if centres.unwrap_or(0) >= 2 {
                    mol.atoms[i].chirality
                } else {
                    Chirality::None
                }
            }
            None => Chirality::None,
        })
        .collect()
}

fn effective_double_bond_stereo(mol: &Molecule, classes: &[usize]) -> Vec<DoubleBondStereo> {
    let distinguishable = |end: usize, other_end: usize| {
        let others: Vec<usize> = mol.adjacency[end]
            .iter()
            .map(|(w, _)| *w)
            .filter(|w| *w != other_end)
            .collect();
        match others.as_slice() {
            [_] => true,
            [x, y] => classes[*x] != classes[*y],
            _ => false,
        }
    };

    mol.double_bond_stereo
        .iter()
        .filter(|s| {
            let bond = &mol.bonds[s.bond];
            if bond.order != BondOrder::Double || bond.aromatic {
                return false;
            }
            if bond.in_ring
                && smallest_ring_through(mol, s.bond).map_or(false, |size| size < MIN_STEREO_RING)
            {
                return false;
            }
            distinguishable(bond.a, bond.b) && distinguishable(bond.b, bond.a)
        })
        .copied()
        .collect()
}

/// Choose `/` `\` marks for every stereo double bond
///
/// Returned directions read from `layout.first[bond]` to the other end.
fn assign_directions(
    mol: &Molecule,
    layout: &Layout,
    stereo: &[DoubleBondStereo],
) -> Vec<Option<Direction>> {
    let mut dirs: Vec<Option<Direction>> = vec![None; mol.bonds.len()];
    let get = |dirs: &[Option<Direction>], bond: usize, from: usize| {
        dirs[bond].map(|d| if layout.first[bond] == from { d } else { d.flip() })
    };
    let set = |dirs: &mut [Option<Direction>], bond: usize, from: usize, d: Direction| {
        dirs[bond] = Some(if layout.first[bond] == from { d } else { d.flip() });
    };

    let mut ordered: Vec<&DoubleBondStereo> = stereo.iter().collect();
    ordered.sort_by_key(|s| {
        let bond = &mol.bonds[s.bond];
        let (p, q) = (layout.position[bond.a], layout.position[bond.b]);
        (p.min(q), p.max(q))
    });

    for s in ordered {
        let bond = &mol.bonds[s.bond];
        // u is the end written first
        let (u, v, u_ref, v_ref) = if layout.position[bond.a] <= layout.position[bond.b] {
            (bond.a, bond.b, s.a_ref, s.b_ref)
        } else {
            (bond.b, bond.a, s.b_ref, s.a_ref)
        };
        let carriers = |end: usize, other_end: usize, dirs: &[Option<Direction>]| {
            let mut found: Vec<(usize, usize)> = mol.adjacency[end]
                .iter()
                .copied()
                .filter(|&(w, b)| {
                    w != other_end
                        && mol.bonds[b].order == BondOrder::Single
                        && !mol.bonds[b].aromatic
                })
                .collect();
            found.sort_by_key(|&(w, b)| (dirs[b].is_none(), layout.position[w]));
            found
        };

        let near = carriers(u, v, &dirs);
        let far = carriers(v, u, &dirs);
        'search: for &(x, bx) in &near {
            for &(y, by) in &far {
                let mut config = s.config;
                if x != u_ref {
                    config = config.flip();
                }
                if y != v_ref {
                    config = config.flip();
                }
                let trans = config == DoubleBondConfig::Trans;
                // Trans means the mark read x→u equals the mark read v→y.
                match (get(&dirs, bx, x), get(&dirs, by, v)) {
                    (Some(dx), Some(dy)) => {
                        if (dx == dy) == trans {
                            break 'search;
                        }
                    }
                    (Some(dx), None) => {
                        set(&mut dirs, by, v, if trans { dx } else { dx.flip() });
                        break 'search;
                    }
                    (None, Some(dy)) => {
                        set(&mut dirs, bx, x, if trans { dy } else { dy.flip() });
                        break 'search;
                    }
                    (None, None) => {
                        // First-written carrier of u, written as `/`
                        dirs[bx] = Some(Direction::Up);
                        if let Some(dx) = get(&dirs, bx, x) {
                            set(&mut dirs, by, v, if trans { dx } else { dx.flip() });
                        }
                        break 'search;
                    }
                }
            }
        }
    }
    dirs
}

/// Parity of the permutation taking `from` to `to`, or `None` if the two
/// lists are not permutations of each other
fn permutation_is_odd(from: &[Neighbor], to: &[Neighbor]) -> Option<bool> {
    if from.len() != to.len() {
        return None;
    }
    let mut used = vec![false; from.len()];
    let mut mapped = Vec::with_capacity(to.len());
    for entry in to {
        let index = (0..from.len()).find(|&i| !used[i] && from[i] == *entry)?;
        used[index] = true;
        mapped.push(index);
    }
    let mut inversions = 0;
    for i in 0..mapped.len() {
        for j in i + 1..mapped.len() {
            if mapped[i] > mapped[j] {
                inversions += 1;
            }
        }
    }
    Some(inversions % 2 == 1)
}

// ── Emission ───────────────────────────────────────────

struct Emitter<'a> {
    mol: &'a Molecule,
    layout: &'a Layout,
    chirality: &'a [Chirality],
    directions: &'a [Option<Direction>],
    /// Ring digit assigned to each ring-closure bond
    digit_of: Vec<u8>,
    in_use: BTreeSet<u8>,
    out: String,
}

enum Step {
    Atom(usize),
    Bond(usize),
    OpenBranch,
    CloseBranch,
}

impl Emitter<'_> {
    fn emit(&mut self, root: usize) -> Result<()> {
        let layout = self.layout;
        let mut steps = vec![Step::Atom(root)];
        while let Some(step) = steps.pop() {
            match step {
                Step::OpenBranch => self.out.push('('),
                Step::CloseBranch => self.out.push(')'),
                Step::Bond(b) => self.push_bond(b),
                Step::Atom(a) => {
                    self.push_atom(a)?;
                    // Pushed in reverse; all but the last child are branches
                    let children = &layout.children[a];
                    for (i, &(child, b)) in children.iter().enumerate().rev() {
                        let branch = i + 1 < children.len();
                        if branch {
                            steps.push(Step::CloseBranch);
                        }
                        steps.push(Step::Atom(child));
                        steps.push(Step::Bond(b));
                        if branch {
                            steps.push(Step::OpenBranch);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Atom symbol followed by its ring-closure digits
    fn push_atom(&mut self, a: usize) -> Result<()> {
        let chirality = self.output_chirality(a);
        let symbol = atom_symbol(self.mol, a, chirality)?;
        self.out.push_str(&symbol);

        let layout = self.layout;
        let mut freed = Vec::new();
        for &(_, b) in &layout.ring_close[a] {
            let digit = self.digit_of[b];
            push_ring_digit(&mut self.out, digit);
            freed.push(digit);
        }
        for &(_, b) in &layout.ring_open[a] {
            let digit = (1..=99u8)
                .find(|d| !self.in_use.contains(d))
                .ok_or_else(|| Error::Unsupported("more than 99 open rings".to_string()))?;
            self.in_use.insert(digit);
            self.digit_of[b] = digit;
            self.push_bond(b);
            push_ring_digit(&mut self.out, digit);
        }
        for digit in freed {
            self.in_use.remove(&digit);
        }
        Ok(())
    }

    fn output_chirality(&self, a: usize) -> Chirality {
        let tag = self.chirality[a];
        if tag == Chirality::None {
            return tag;
        }
        let written = self.layout.output_order(self.mol, a);
        match permutation_is_odd(&self.mol.atoms[a].order, &written) {
            Some(true) => tag.invert(),
            Some(false) => tag,
            None => Chirality::None,
        }
    }

    fn push_bond(&mut self, b: usize) {
        if let Some(d) = self.directions[b] {
            self.out.push(d.symbol());
            return;
        }
        let bond = &self.mol.bonds[b];
        if bond.aromatic {
            return;
        }
        match bond.order {
            BondOrder::Single => {
                if self.mol.atoms[bond.a].aromatic && self.mol.atoms[bond.b].aromatic {
                    self.out.push('-');
                }
            }
            BondOrder::Double => self.out.push('='),
            BondOrder::Triple => self.out.push('#'),
            BondOrder::Quadruple => self.out.push('$'),
            BondOrder::Aromatic => {}
        }
    }
}

fn push_ring_digit(out: &mut String, digit: u8) {
    if digit < 10 {
        out.push(char::from(b'0' + digit));
    } else {
        out.push_str(&format!("%{:02}", digit));
    }
}

/// Hydrogens a reader infers for `a` if it is written without brackets
fn implied_hydrogens(mol: &Molecule, a: usize) -> Option<u8> {
    let atom = &mol.atoms[a];
    let mut aromatic_bonds = 0u8;
    let mut other = 0u8;
    let mut multiple = false;
    for &(_, b) in &mol.adjacency[a] {
        let bond = &mol.bonds[b];
        if bond.aromatic {
            aromatic_bonds = aromatic_bonds.saturating_add(1);
        } else {
            other = other.saturating_add(bond.order.valence());
            multiple |= bond.order != BondOrder::Single;
        }
    }
    organic_hydrogens(atom.element, atom.aromatic, aromatic_bonds, other, multiple)
}

fn atom_symbol(mol: &Molecule, a: usize, chirality: Chirality) -> Result<String> {
    let atom = &mol.atoms[a];
    let symbol = if atom.aromatic {
        atom.element.symbol().to_ascii_lowercase()
    } else {
        atom.element.symbol().to_string()
    };

    let plain = atom.element.is_organic_subset()
        && (!atom.aromatic || atom.element.can_be_aromatic())
        && atom.charge == 0
        && atom.isotope.is_none()
        && atom.class.is_none()
        && chirality == Chirality::None
        && implied_hydrogens(mol, a) == Some(atom.hydrogens);
    if plain {
        return Ok(symbol);
    }

    let mut out = String::from("[");
    if let Some(isotope) = atom.isotope {
        out.push_str(&isotope.to_string());
    }
    out.push_str(&symbol);
    match chirality {
        Chirality::None => {}
        Chirality::Anticlockwise => out.push('@'),
        Chirality::Clockwise => out.push_str("@@"),
    }
    match atom.hydrogens {
        0 => {}
        1 => out.push('H'),
        n @ 2..=9 => {
            out.push('H');
            out.push_str(&n.to_string());
        }
        n => {
            return Err(Error::Unsupported(format!(
                "{} hydrogens on atom {}",
                n,
                a + 1
            )))
        }
    }
    match atom.charge {
        0 => {}
        1 => out.push('+'),
        -1 => out.push('-'),
        c if c > 0 => out.push_str(&format!("+{}", c)),
        c => out.push_str(&format!("-{}", -i16::from(c))),
    }
    if let Some(class) = atom.class {
        out.push(':');
        out.push_str(&class.to_string());
    }
    out.push(']');
    Ok(out)
}
