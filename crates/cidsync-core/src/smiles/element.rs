//! Element table — symbols, atomic numbers and default valences
//!
//! Atomic number 0 is reserved for the `*` wildcard atom.

use std::fmt;
use std::str::FromStr;

const SYMBOLS: [&str; 119] = [
    "*", "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S",
    "Cl", "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge",
    "As", "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd",
    "In", "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd",
    "Tb", "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg",
    "Tl", "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm",
    "Bk", "Cf", "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg", "Cn",
    "Nh", "Fl", "Mc", "Lv", "Ts", "Og",
];

/// A chemical element identified by atomic number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Element(u8);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownElement(pub String);

impl fmt::Display for UnknownElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown element symbol '{}'", self.0)
    }
}

impl Element {
    pub const WILDCARD: Element = Element(0);
    pub const H: Element = Element(1);
    pub const B: Element = Element(5);
    pub const C: Element = Element(6);
    pub const N: Element = Element(7);
    pub const O: Element = Element(8);
    pub const F: Element = Element(9);
    pub const P: Element = Element(15);
    pub const S: Element = Element(16);
    pub const CL: Element = Element(17);
    pub const AS: Element = Element(33);
    pub const SE: Element = Element(34);
    pub const BR: Element = Element(35);
    pub const TE: Element = Element(52);
    pub const I: Element = Element(53);

    pub fn from_atomic_number(z: u8) -> Option<Element> {
        if (z as usize) < SYMBOLS.len() {
            Some(Element(z))
        } else {
            None
        }
    }

    pub fn atomic_number(&self) -> u8 {
        self.0
    }

    pub fn symbol(&self) -> &'static str {
        SYMBOLS[self.0 as usize]
    }

    /// Symbols allowed outside brackets
    pub fn is_organic_subset(&self) -> bool {
        matches!(self.0, 0 | 5 | 6 | 7 | 8 | 9 | 15 | 16 | 17 | 35 | 53)
    }

    /// Elements that may be written in lowercase aromatic form
    pub fn can_be_aromatic(&self) -> bool {
        matches!(self.0, 0 | 5 | 6 | 7 | 8 | 15 | 16 | 33 | 34 | 52)
    }

    /// Elements that can donate a lone pair into an aromatic ring
    pub fn has_lone_pair_donor(&self) -> bool {
        matches!(self.0, 7 | 8 | 15 | 16 | 33 | 34 | 52)
    }

    /// Default valences of the neutral element, ascending
    ///
    /// Empty for elements whose valence is not checked (metals, noble gases,
    /// the wildcard).
    pub fn default_valences(&self) -> &'static [u8] {
        match self.0 {
            1 => &[1],
            5 => &[3],
            6 => &[4],
            7 => &[3],
            8 => &[2],
            9 => &[1],
            14 => &[4],
            15 => &[3, 5],
            16 => &[2, 4, 6],
            17 => &[1],
            32 => &[4],
            33 => &[3, 5],
            34 => &[2, 4, 6],
            35 => &[1],
            52 => &[2, 4, 6],
            53 => &[1, 3, 5],
            _ => &[],
        }
    }

    /// Allowed valences for this element carrying `charge`
    ///
    /// Charged p-block atoms take the valences of the isoelectronic neutral
    /// element in the same row (N+ behaves like C, O- like F).
    pub fn allowed_valences(&self, charge: i8) -> &'static [u8] {
        if charge == 0 {
            return self.default_valences();
        }
        if self.default_valences().is_empty() {
            return &[];
        }
        let shifted = self.0 as i16 - charge as i16;
        if shifted <= 0 || Self::row(shifted as u8) != Self::row(self.0) {
            return &[];
        }
        Element(shifted as u8).default_valences()
    }

    fn row(z: u8) -> u8 {
        match z {
            0..=2 => 1,
            3..=10 => 2,
            11..=18 => 3,
            19..=36 => 4,
            37..=54 => 5,
            55..=86 => 6,
            _ => 7,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for Element {
    type Err = UnknownElement;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SYMBOLS
            .iter()
            .position(|sym| *sym == s)
            .map(|z| Element(z as u8))
            .ok_or_else(|| UnknownElement(s.to_string()))
    }
}
