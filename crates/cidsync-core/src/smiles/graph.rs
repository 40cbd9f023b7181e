//! Molecule graph — atoms, bonds and stereo annotations
//!
//! The parser builds a `Molecule` directly from the token stream. All later
//! passes (sanitization, ranking, writing) operate on this graph.

use super::element::Element;

/// Bond multiplicity
///
/// After kekulization every bond carries a Kekulé order; the `aromatic` flag
/// on [`Bond`] records perceived aromaticity separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Quadruple,
    /// Unresolved aromatic bond from the input (`:` or implicit between aromatic atoms)
    Aromatic,
}

impl BondOrder {
    /// Contribution to the explicit valence of each end (aromatic counts 1)
    pub fn valence(&self) -> u8 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Quadruple => 4,
        }
    }
}

/// Direction of a `/` or `\` bond, read from the first atom to the second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// `/`
    Up,
    /// `\`
    Down,
}

impl Direction {
    pub fn flip(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Direction::Up => '/',
            Direction::Down => '\\',
        }
    }
}

/// Tetrahedral chirality tag as written (`@` / `@@`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chirality {
    None,
    /// `@`: remaining neighbours anticlockwise seen from the first
    Anticlockwise,
    /// `@@`
    Clockwise,
}

impl Chirality {
    pub fn invert(self) -> Chirality {
        match self {
            Chirality::None => Chirality::None,
            Chirality::Anticlockwise => Chirality::Clockwise,
            Chirality::Clockwise => Chirality::Anticlockwise,
        }
    }
}

/// One entry in an atom's written neighbour order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Neighbor {
    Atom(usize),
    Hydrogen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub element: Element,
    pub aromatic: bool,
    /// Written in square brackets in the input
    pub bracket: bool,
    pub isotope: Option<u16>,
    pub charge: i8,
    /// Total attached hydrogens (bracket count, then implicit ones once sanitized)
    pub hydrogens: u8,
    pub class: Option<u32>,
    pub chirality: Chirality,
    /// Neighbour order the chirality tag refers to
    pub order: Vec<Neighbor>,
}

impl Atom {
    pub fn new(element: Element) -> Self {
        Atom {
            element,
            aromatic: false,
            bracket: false,
            isotope: None,
            charge: 0,
            hydrogens: 0,
            class: None,
            chirality: Chirality::None,
            order: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bond {
    pub a: usize,
    pub b: usize,
    pub order: BondOrder,
    /// No bond symbol was written between the two atoms
    pub implicit: bool,
    /// Directional mark, read from `a` to `b`
    pub direction: Option<Direction>,
    pub aromatic: bool,
    pub in_ring: bool,
}

impl Bond {
    pub fn other(&self, atom: usize) -> usize {
        if self.a == atom {
            self.b
        } else {
            self.a
        }
    }

    /// Direction read from `from` towards the other end
    pub fn direction_from(&self, from: usize) -> Option<Direction> {
        self.direction
            .map(|d| if from == self.a { d } else { d.flip() })
    }
}

/// Relative placement of the reference substituents across a double bond
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoubleBondConfig {
    Cis,
    Trans,
}

impl DoubleBondConfig {
    pub fn flip(self) -> DoubleBondConfig {
        match self {
            DoubleBondConfig::Cis => DoubleBondConfig::Trans,
            DoubleBondConfig::Trans => DoubleBondConfig::Cis,
        }
    }
}

/// Cis/trans annotation of one double bond
///
/// `a_ref` is a neighbour of `bonds[bond].a`, `b_ref` a neighbour of
/// `bonds[bond].b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoubleBondStereo {
    pub bond: usize,
    pub a_ref: usize,
    pub b_ref: usize,
    pub config: DoubleBondConfig,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Molecule {
    pub atoms: Vec<Atom>,
    pub bonds: Vec<Bond>,
    /// Per atom: (neighbour atom, bond index)
    pub adjacency: Vec<Vec<(usize, usize)>>,
    pub double_bond_stereo: Vec<DoubleBondStereo>,
}

impl Molecule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_atom(&mut self, atom: Atom) -> usize {
        self.atoms.push(atom);
        self.adjacency.push(Vec::new());
        self.atoms.len() - 1
    }

    pub fn add_bond(&mut self, bond: Bond) -> usize {
        let idx = self.bonds.len();
        self.adjacency[bond.a].push((bond.b, idx));
        self.adjacency[bond.b].push((bond.a, idx));
        self.bonds.push(bond);
        idx
    }

    pub fn bond_between(&self, a: usize, b: usize) -> Option<usize> {
        self.adjacency[a]
            .iter()
            .find(|(n, _)| *n == b)
            .map(|(_, bond)| *bond)
    }

    pub fn degree(&self, atom: usize) -> usize {
        self.adjacency[atom].len()
    }

    /// Sum of bond valences at `atom`
    pub fn explicit_valence(&self, atom: usize) -> u8 {
        self.adjacency[atom]
            .iter()
            .fold(0u8, |acc, (_, b)| acc.saturating_add(self.bonds[*b].order.valence()))
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Remove the given atoms and every bond touching them
    ///
    /// Indices in bonds, neighbour orders and stereo annotations are remapped;
    /// annotations referring to removed atoms are dropped.
    pub fn remove_atoms(&mut self, removed: &[bool]) {
        let mut remap = vec![usize::MAX; self.atoms.len()];
        let mut next = 0;
        for (i, gone) in removed.iter().enumerate() {
            if !gone {
                remap[i] = next;
                next += 1;
            }
        }

        let mut bond_remap = vec![usize::MAX; self.bonds.len()];
        let mut bonds = Vec::with_capacity(self.bonds.len());
        for (i, bond) in self.bonds.iter().enumerate() {
            if removed[bond.a] || removed[bond.b] {
                continue;
            }
            bond_remap[i] = bonds.len();
            let mut bond = bond.clone();
            bond.a = remap[bond.a];
            bond.b = remap[bond.b];
            bonds.push(bond);
        }

        let mut atoms = Vec::with_capacity(next);
        for (i, atom) in self.atoms.iter().enumerate() {
            if removed[i] {
                continue;
            }
            let mut atom = atom.clone();
            atom.order = atom
                .order
                .iter()
                .filter_map(|n| match n {
                    Neighbor::Atom(a) if removed[*a] => None,
                    Neighbor::Atom(a) => Some(Neighbor::Atom(remap[*a])),
                    Neighbor::Hydrogen => Some(Neighbor::Hydrogen),
                })
                .collect();
            atoms.push(atom);
        }

        let stereo = self
            .double_bond_stereo
            .iter()
            .filter(|s| {
                bond_remap[s.bond] != usize::MAX && !removed[s.a_ref] && !removed[s.b_ref]
            })
            .map(|s| DoubleBondStereo {
                bond: bond_remap[s.bond],
                a_ref: remap[s.a_ref],
                b_ref: remap[s.b_ref],
                config: s.config,
            })
            .collect();

        self.atoms = atoms;
        self.bonds = bonds;
        self.double_bond_stereo = stereo;
        self.adjacency = vec![Vec::new(); self.atoms.len()];
        for (i, bond) in self.bonds.iter().enumerate() {
            self.adjacency[bond.a].push((bond.b, i));
            self.adjacency[bond.b].push((bond.a, i));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(a: usize, b: usize) -> Bond {
        Bond {
            a,
            b,
            order: BondOrder::Single,
            implicit: true,
            direction: None,
            aromatic: false,
            in_ring: false,
        }
    }

    #[test]
    fn test_bond_direction_from_either_end() {
        let mut bond = single(0, 1);
        bond.direction = Some(Direction::Up);
        assert_eq!(bond.direction_from(0), Some(Direction::Up));
        assert_eq!(bond.direction_from(1), Some(Direction::Down));
    }

    #[test]
    fn test_remove_atoms_remaps_indices() {
        let mut mol = Molecule::new();
        for _ in 0..3 {
            mol.add_atom(Atom::new(Element::C));
        }
        mol.add_bond(single(0, 1));
        mol.add_bond(single(1, 2));
        mol.atoms[2].order = vec![Neighbor::Atom(1)];

        mol.remove_atoms(&[true, false, false]);

        assert_eq!(mol.atoms.len(), 2);
        assert_eq!(mol.bonds.len(), 1);
        assert_eq!((mol.bonds[0].a, mol.bonds[0].b), (0, 1));
        assert_eq!(mol.atoms[1].order, vec![Neighbor::Atom(0)]);
        assert_eq!(mol.bond_between(0, 1), Some(0));
    }

    #[test]
    fn test_explicit_valence_counts_orders() {
        let mut mol = Molecule::new();
        mol.add_atom(Atom::new(Element::C));
        mol.add_atom(Atom::new(Element::O));
        let mut bond = single(0, 1);
        bond.order = BondOrder::Double;
        mol.add_bond(bond);
        assert_eq!(mol.explicit_valence(0), 2);
        assert_eq!(mol.degree(1), 1);
    }
}
