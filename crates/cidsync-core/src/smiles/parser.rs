//! SMILES parser — builds a molecule graph from the token stream
//!
//! Branches are tracked on a stack, ring closures in a table keyed by ring
//! number. Each atom records the order its neighbours were written in, which
//! is what a `@`/`@@` tag refers to.

use std::collections::BTreeMap;

use super::graph::{
    Atom, Bond, BondOrder, Direction, DoubleBondConfig, DoubleBondStereo, Molecule, Neighbor,
};
use super::tokenizer::{AtomSpec, BondSymbol, Span, SpannedToken, Token, Tokenizer};
use crate::{Error, Result};

/// Parse SMILES text into a molecule graph
///
/// The result is purely syntactic: implicit hydrogens, aromaticity and
/// valence are resolved later by sanitization.
pub fn parse(input: &str) -> Result<Molecule> {
    let tokens = Tokenizer::new(input).tokenize()?;
    Parser::new().run(&tokens)
}

struct OpenRing {
    atom: usize,
    symbol: Option<BondSymbol>,
    slot: usize,
    span: Span,
}

#[derive(PartialEq)]
enum Last {
    Start,
    Atom,
    Bond,
    Ring,
    Open,
    Close,
    Dot,
}

struct Parser {
    mol: Molecule,
    prev: Option<usize>,
    pending: Option<BondSymbol>,
    branches: Vec<Option<usize>>,
    rings: BTreeMap<u8, OpenRing>,
    last: Last,
}

impl Parser {
    fn new() -> Self {
        Parser {
            mol: Molecule::new(),
            prev: None,
            pending: None,
            branches: Vec::new(),
            rings: BTreeMap::new(),
            last: Last::Start,
        }
    }

    fn run(mut self, tokens: &[SpannedToken]) -> Result<Molecule> {
        for spanned in tokens {
            let span = spanned.span;
            match &spanned.token {
                Token::Atom(spec) => self.atom(spec),
                Token::Bond(symbol) => self.bond(*symbol, span)?,
                Token::RingClosure(number) => self.ring(*number, span)?,
                Token::OpenBranch => self.open_branch(span)?,
                Token::CloseBranch => self.close_branch(span)?,
                Token::Dot => self.dot(span)?,
            }
        }
        self.finish()
    }

    fn atom(&mut self, spec: &AtomSpec) {
        let mut atom = Atom::new(spec.element);
        atom.aromatic = spec.aromatic;
        atom.bracket = spec.bracket;
        atom.isotope = spec.isotope;
        atom.charge = spec.charge;
        atom.hydrogens = spec.hydrogens;
        atom.class = spec.class;
        atom.chirality = spec.chirality;

        let idx = self.mol.add_atom(atom);
        if let Some(prev) = self.prev {
            let symbol = self.pending.take();
            self.connect(prev, idx, symbol);
            self.mol.atoms[idx].order.push(Neighbor::Atom(prev));
            self.mol.atoms[prev].order.push(Neighbor::Atom(idx));
        }
        for _ in 0..spec.hydrogens {
            self.mol.atoms[idx].order.push(Neighbor::Hydrogen);
        }

        self.prev = Some(idx);
        self.last = Last::Atom;
    }

    fn bond(&mut self, symbol: BondSymbol, span: Span) -> Result<()> {
        if self.prev.is_none() || matches!(self.last, Last::Dot | Last::Start) {
            return Err(Error::Parse(format!(
                "bond must follow an atom at {}",
                span
            )));
        }
        if self.pending.is_some() {
            return Err(Error::Parse(format!("consecutive bond symbols at {}", span)));
        }
        self.pending = Some(symbol);
        self.last = Last::Bond;
        Ok(())
    }

    fn ring(&mut self, number: u8, span: Span) -> Result<()> {
        let current = match self.prev {
            Some(p) if !matches!(self.last, Last::Open | Last::Close | Last::Dot) => p,
            _ => {
                return Err(Error::Parse(format!(
                    "ring closure {} must follow an atom at {}",
                    number, span
                )))
            }
        };
        let symbol = self.pending.take();

        match self.rings.remove(&number) {
            Some(open) => {
                if open.atom == current {
                    return Err(Error::Parse(format!(
                        "ring closure {} bonds an atom to itself at {}",
                        number, span
                    )));
                }
                if self.mol.bond_between(open.atom, current).is_some() {
                    return Err(Error::Parse(format!(
                        "ring closure {} duplicates an existing bond at {}",
                        number, span
                    )));
                }
                let resolved = resolve_ring_symbol(open.symbol, symbol).ok_or_else(|| {
                    Error::Parse(format!(
                        "conflicting bond symbols on ring closure {} at {}",
                        number, span
                    ))
                })?;
                self.connect(open.atom, current, resolved);
                self.mol.atoms[open.atom].order[open.slot] = Neighbor::Atom(current);
                self.mol.atoms[current].order.push(Neighbor::Atom(open.atom));
            }
            None => {
                let slot = self.mol.atoms[current].order.len();
                self.mol.atoms[current].order.push(Neighbor::Atom(usize::MAX));
                self.rings.insert(
                    number,
                    OpenRing {
                        atom: current,
                        symbol,
                        slot,
                        span,
                    },
                );
            }
        }
        self.last = Last::Ring;
        Ok(())
    }

    fn open_branch(&mut self, span: Span) -> Result<()> {
        if self.prev.is_none() || matches!(self.last, Last::Dot | Last::Start | Last::Open) {
            return Err(Error::Parse(format!(
                "branch must follow an atom at {}",
                span
            )));
        }
        if self.pending.is_some() {
            return Err(Error::Parse(format!("bond symbol before branch at {}", span)));
        }
        self.branches.push(self.prev);
        self.last = Last::Open;
        Ok(())
    }

    fn close_branch(&mut self, span: Span) -> Result<()> {
        if self.last == Last::Open {
            return Err(Error::Parse(format!("empty branch at {}", span)));
        }
        if self.pending.is_some() {
            return Err(Error::Parse(format!("dangling bond before ')' at {}", span)));
        }
        match self.branches.pop() {
            Some(prev) => self.prev = prev,
            None => return Err(Error::Parse(format!("unbalanced ')' at {}", span))),
        }
        self.last = Last::Close;
        Ok(())
    }

    fn dot(&mut self, span: Span) -> Result<()> {
        if matches!(self.last, Last::Start | Last::Dot | Last::Open) {
            return Err(Error::Parse(format!("empty component at {}", span)));
        }
        if self.pending.is_some() {
            return Err(Error::Parse(format!("dangling bond before '.' at {}", span)));
        }
        if !self.branches.is_empty() {
            return Err(Error::Parse(format!("'.' inside a branch at {}", span)));
        }
        self.prev = None;
        self.last = Last::Dot;
        Ok(())
    }

    fn finish(mut self) -> Result<Molecule> {
        if self.pending.is_some() {
            return Err(Error::Parse("dangling bond at end of input".to_string()));
        }
        if self.last == Last::Dot {
            return Err(Error::Parse("trailing '.' at end of input".to_string()));
        }
        if !self.branches.is_empty() {
            return Err(Error::Parse("unclosed branch at end of input".to_string()));
        }
        if let Some((number, open)) = self.rings.iter().next() {
            return Err(Error::Parse(format!(
                "unclosed ring closure {} opened at {}",
                number, open.span
            )));
        }
        assign_double_bond_stereo(&mut self.mol)?;
        Ok(self.mol)
    }

    fn connect(&mut self, a: usize, b: usize, symbol: Option<BondSymbol>) {
        let (order, direction) = match symbol {
            None | Some(BondSymbol::Single) => (BondOrder::Single, None),
            Some(BondSymbol::Double) => (BondOrder::Double, None),
            Some(BondSymbol::Triple) => (BondOrder::Triple, None),
            Some(BondSymbol::Quadruple) => (BondOrder::Quadruple, None),
            Some(BondSymbol::Aromatic) => (BondOrder::Aromatic, None),
            Some(BondSymbol::Up) => (BondOrder::Single, Some(Direction::Up)),
            Some(BondSymbol::Down) => (BondOrder::Single, Some(Direction::Down)),
        };
        self.mol.add_bond(Bond {
            a,
            b,
            order,
            implicit: symbol.is_none(),
            direction,
            aromatic: false,
            in_ring: false,
        });
    }
}

/// Merge the bond symbols written at the opening and the closing digit
///
/// A direction written at the closing end reads from the closing atom, so it
/// is flipped to read from the opening atom.
fn resolve_ring_symbol(
    open: Option<BondSymbol>,
    close: Option<BondSymbol>,
) -> Option<Option<BondSymbol>> {
    let flip = |s: BondSymbol| match s {
        BondSymbol::Up => BondSymbol::Down,
        BondSymbol::Down => BondSymbol::Up,
        other => other,
    };
    match (open, close) {
        (None, None) => Some(None),
        (Some(o), None) => Some(Some(o)),
        (None, Some(c)) => Some(Some(flip(c))),
        (Some(o), Some(c)) if o == flip(c) => Some(Some(o)),
        _ => None,
    }
}

/// Derive cis/trans annotations from `/` and `\` marks around double bonds
///
/// For `x-u=v-y`, the substituents are trans when the direction read from
/// `x` to `u` equals the direction read from `v` to `y`.
fn assign_double_bond_stereo(mol: &mut Molecule) -> Result<()> {
    let mut stereo = Vec::new();
    for (idx, bond) in mol.bonds.iter().enumerate() {
        if bond.order != BondOrder::Double {
            continue;
        }
        let a_side = marked_neighbor(mol, bond.a, bond.b)?;
        let b_side = marked_neighbor(mol, bond.b, bond.a)?;
        if let (Some((x, dx)), Some((y, y_to_v))) = (a_side, b_side) {
            let dy = y_to_v.flip();
            let config = if dx == dy {
                DoubleBondConfig::Trans
            } else {
                DoubleBondConfig::Cis
            };
            stereo.push(DoubleBondStereo {
                bond: idx,
                a_ref: x,
                b_ref: y,
                config,
            });
        }
    }
    mol.double_bond_stereo = stereo;
    Ok(())
}

/// First neighbour of `center` (other than `partner`) whose bond carries a
/// direction, with the direction read from that neighbour towards `center`
fn marked_neighbor(
    mol: &Molecule,
    center: usize,
    partner: usize,
) -> Result<Option<(usize, Direction)>> {
    let mut found: Option<(usize, Direction)> = None;
    for &(nbr, bond) in &mol.adjacency[center] {
        if nbr == partner {
            continue;
        }
        let dir = match mol.bonds[bond].direction_from(nbr) {
            Some(d) => d,
            None => continue,
        };
        match found {
            None => found = Some((nbr, dir)),
            // Two substituents on the same end must point opposite ways.
            Some((_, first)) if first == dir => {
                return Err(Error::Parse(format!(
                    "conflicting bond directions around atom {}",
                    center + 1
                )))
            }
            Some(_) => {}
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::graph::Chirality;

    fn parse_err(input: &str) -> String {
        match parse(input) {
            Err(e) => e.to_string(),
            Ok(mol) => panic!("expected error for {}, got {:?}", input, mol),
        }
    }

    #[test]
    fn test_parse_chain() {
        let mol = parse("CCO").unwrap();
        assert_eq!(mol.atoms.len(), 3);
        assert_eq!(mol.bonds.len(), 2);
        assert!(mol.bonds.iter().all(|b| b.implicit));
    }

    #[test]
    fn test_parse_branch() {
        let mol = parse("CC(C)(C)O").unwrap();
        assert_eq!(mol.degree(1), 4);
        assert_eq!(mol.degree(4), 1);
    }

    #[test]
    fn test_parse_ring_closure() {
        let mol = parse("C1CC1").unwrap();
        assert_eq!(mol.bonds.len(), 3);
        assert!(mol.bond_between(0, 2).is_some());
    }

    #[test]
    fn test_parse_ring_closure_bond_symbol() {
        let mol = parse("C=1CCCC1").unwrap();
        let ring_bond = mol.bond_between(0, 4).unwrap();
        assert_eq!(mol.bonds[ring_bond].order, BondOrder::Double);
    }

    #[test]
    fn test_parse_disconnected() {
        let mol = parse("[Na+].[Cl-]").unwrap();
        assert_eq!(mol.atoms.len(), 2);
        assert!(mol.bonds.is_empty());
    }

    #[test]
    fn test_neighbor_order_for_chirality() {
        // N, implicit H, C(=O), C
        let mol = parse("N[C@@H](C)C(=O)O").unwrap();
        let center = &mol.atoms[1];
        assert_eq!(center.chirality, Chirality::Clockwise);
        assert_eq!(
            center.order,
            vec![
                Neighbor::Atom(0),
                Neighbor::Hydrogen,
                Neighbor::Atom(2),
                Neighbor::Atom(3)
            ]
        );
    }

    #[test]
    fn test_neighbor_order_ring_digit_position() {
        // Ring partner sits at the digit's position, before the branch
        let mol = parse("[C@]1(F)(Cl)CC1").unwrap();
        assert_eq!(
            mol.atoms[0].order,
            vec![
                Neighbor::Atom(4),
                Neighbor::Atom(1),
                Neighbor::Atom(2),
                Neighbor::Atom(3)
            ]
        );
    }

    #[test]
    fn test_double_bond_stereo_trans() {
        let mol = parse("F/C=C/F").unwrap();
        assert_eq!(mol.double_bond_stereo.len(), 1);
        assert_eq!(mol.double_bond_stereo[0].config, DoubleBondConfig::Trans);
    }

    #[test]
    fn test_double_bond_stereo_cis() {
        let mol = parse("F/C=C\\F").unwrap();
        assert_eq!(mol.double_bond_stereo[0].config, DoubleBondConfig::Cis);
    }

    #[test]
    fn test_double_bond_stereo_branch_form() {
        // C(\F)=C/F is the same trans isomer as F/C=C/F
        let mol = parse("C(\\F)=C/F").unwrap();
        assert_eq!(mol.double_bond_stereo[0].config, DoubleBondConfig::Trans);
    }

    #[test]
    fn test_one_sided_marks_give_no_stereo() {
        let mol = parse("F/C=CF").unwrap();
        assert!(mol.double_bond_stereo.is_empty());
    }

    #[test]
    fn test_unclosed_ring() {
        let err = parse_err("C1CC1C1");
        assert!(err.contains("unclosed ring closure 1"), "{}", err);
    }

    #[test]
    fn test_unbalanced_parentheses() {
        assert!(parse_err("CC(C").contains("unclosed branch"));
        assert!(parse_err("CC)C").contains("unbalanced ')'"));
    }

    #[test]
    fn test_empty_branch() {
        assert!(parse_err("C()C").contains("empty branch"));
    }

    #[test]
    fn test_leading_and_dangling_bonds() {
        assert!(parse_err("=CC").contains("bond must follow an atom"));
        assert!(parse_err("CC=").contains("dangling bond"));
        assert!(parse_err("C=.C").contains("dangling bond"));
    }

    #[test]
    fn test_ring_to_self_and_duplicate() {
        assert!(parse_err("C11").contains("to itself"));
        assert!(parse_err("C12CC12").contains("duplicates"));
    }

    #[test]
    fn test_conflicting_ring_symbols() {
        assert!(parse_err("C=1CCC#1").contains("conflicting bond symbols"));
    }

    #[test]
    fn test_conflicting_directions() {
        assert!(parse_err("F/C(\\F)=C/F").contains("conflicting bond directions"));
    }

    #[test]
    fn test_dot_edge_cases() {
        assert!(parse_err(".C").contains("empty component"));
        assert!(parse_err("C..C").contains("empty component"));
        assert!(parse_err("C.").contains("trailing"));
    }

    #[test]
    fn test_empty_string_is_empty_molecule() {
        let mol = parse("").unwrap();
        assert!(mol.is_empty());
    }
}
