//! SMILES tokenizer — converts a SMILES string into a token stream
//!
//! Handles: organic-subset and aromatic atoms, bracket atoms (isotope,
//! chirality, hydrogen count, charge, atom class), bond symbols, branches,
//! ring-closure digits (`0-9`, `%nn`) and the `.` disconnection.
//!
//! Guarantees:
//! - Deterministic: same input always produces same token stream
//! - Every error carries the column it was found at

use super::element::Element;
use super::graph::Chirality;
use crate::{Error, Result};

/// Bond symbols as written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondSymbol {
    Single,    // -
    Double,    // =
    Triple,    // #
    Quadruple, // $
    Aromatic,  // :
    Up,        // /
    Down,      // \
}

/// Atom as written, before any graph context is known
#[derive(Debug, Clone, PartialEq)]
pub struct AtomSpec {
    pub element: Element,
    pub aromatic: bool,
    pub bracket: bool,
    pub isotope: Option<u16>,
    pub chirality: Chirality,
    pub hydrogens: u8,
    pub charge: i8,
    pub class: Option<u32>,
}

impl AtomSpec {
    fn organic(element: Element, aromatic: bool) -> Self {
        AtomSpec {
            element,
            aromatic,
            bracket: false,
            isotope: None,
            chirality: Chirality::None,
            hydrogens: 0,
            charge: 0,
            class: None,
        }
    }
}

/// Token types for SMILES syntax
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Atom(AtomSpec),
    Bond(BondSymbol),
    RingClosure(u8),
    OpenBranch,  // (
    CloseBranch, // )
    Dot,         // .
}

/// Position in the SMILES string for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "column {}", self.offset + 1)
    }
}

/// Token with source position
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Tokenizer for SMILES text
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
}

impl Tokenizer {
    pub fn new(text: &str) -> Self {
        Tokenizer {
            input: text.chars().collect(),
            position: 0,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<SpannedToken>> {
        let mut tokens = Vec::new();
        while !self.is_at_end() {
            tokens.push(self.next_token()?);
        }
        Ok(tokens)
    }

    // ── Character helpers ──────────────────────────────────

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.input.get(self.position + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.position += 1;
        }
        ch
    }

    fn current_span(&self) -> Span {
        Span {
            offset: self.position,
        }
    }

    fn error(&self, message: impl std::fmt::Display) -> Error {
        Error::Parse(format!("{} at {}", message, self.current_span()))
    }

    // ── Main dispatch ──────────────────────────────────────

    fn next_token(&mut self) -> Result<SpannedToken> {
        let span = self.current_span();
        let ch = match self.peek() {
            Some(c) => c,
            None => return Err(self.error("unexpected end of input")),
        };

        let token = match ch {
            '-' => { self.advance(); Token::Bond(BondSymbol::Single) }
            '=' => { self.advance(); Token::Bond(BondSymbol::Double) }
            '#' => { self.advance(); Token::Bond(BondSymbol::Triple) }
            '$' => { self.advance(); Token::Bond(BondSymbol::Quadruple) }
            ':' => { self.advance(); Token::Bond(BondSymbol::Aromatic) }
            '/' => { self.advance(); Token::Bond(BondSymbol::Up) }
            '\\' => { self.advance(); Token::Bond(BondSymbol::Down) }
            '(' => { self.advance(); Token::OpenBranch }
            ')' => { self.advance(); Token::CloseBranch }
            '.' => { self.advance(); Token::Dot }
            '[' => self.read_bracket_atom()?,
            '%' => self.read_two_digit_ring()?,
            c if c.is_ascii_digit() => {
                self.advance();
                Token::RingClosure(c as u8 - b'0')
            }
            _ => self.read_organic_atom()?,
        };

        Ok(SpannedToken { token, span })
    }

    // ── Ring closures ──────────────────────────────────────

    fn read_two_digit_ring(&mut self) -> Result<Token> {
        self.advance(); // consume %
        match (self.peek(), self.peek_ahead(1)) {
            (Some(d1), Some(d2)) if d1.is_ascii_digit() && d2.is_ascii_digit() => {
                self.advance();
                self.advance();
                Ok(Token::RingClosure((d1 as u8 - b'0') * 10 + (d2 as u8 - b'0')))
            }
            _ => Err(self.error("'%' must be followed by two digits")),
        }
    }

    // ── Organic subset ─────────────────────────────────────

    fn read_organic_atom(&mut self) -> Result<Token> {
        let ch = self.peek().unwrap_or(' ');
        let (element, aromatic, width) = match (ch, self.peek_ahead(1)) {
            ('C', Some('l')) => (Element::CL, false, 2),
            ('B', Some('r')) => (Element::BR, false, 2),
            ('B', _) => (Element::B, false, 1),
            ('C', _) => (Element::C, false, 1),
            ('N', _) => (Element::N, false, 1),
            ('O', _) => (Element::O, false, 1),
            ('P', _) => (Element::P, false, 1),
            ('S', _) => (Element::S, false, 1),
            ('F', _) => (Element::F, false, 1),
            ('I', _) => (Element::I, false, 1),
            ('*', _) => (Element::WILDCARD, false, 1),
            ('b', _) => (Element::B, true, 1),
            ('c', _) => (Element::C, true, 1),
            ('n', _) => (Element::N, true, 1),
            ('o', _) => (Element::O, true, 1),
            ('p', _) => (Element::P, true, 1),
            ('s', _) => (Element::S, true, 1),
            _ => return Err(self.error(format!("unexpected character '{}'", ch))),
        };
        for _ in 0..width {
            self.advance();
        }
        Ok(Token::Atom(AtomSpec::organic(element, aromatic)))
    }

    // ── Bracket atoms ──────────────────────────────────────

    fn read_bracket_atom(&mut self) -> Result<Token> {
        self.advance(); // consume [

        let isotope = match self.read_digits(5)? {
            Some(v) => Some(u16::try_from(v).map_err(|_| self.error("isotope out of range"))?),
            None => None,
        };
        let (element, aromatic) = self.read_bracket_symbol()?;
        let chirality = self.read_chirality()?;
        let hydrogens = self.read_hydrogen_count()?;
        let charge = self.read_charge()?;
        let class = if self.peek() == Some(':') {
            self.advance();
            match self.read_digits(9)? {
                Some(v) => Some(v),
                None => return Err(self.error("atom class requires digits")),
            }
        } else {
            None
        };

        match self.advance() {
            Some(']') => {}
            Some(c) => {
                self.position -= 1;
                return Err(self.error(format!("unexpected '{}' in bracket atom", c)));
            }
            None => return Err(self.error("unterminated bracket atom")),
        }

        Ok(Token::Atom(AtomSpec {
            element,
            aromatic,
            bracket: true,
            isotope,
            chirality,
            hydrogens,
            charge,
            class,
        }))
    }

    fn read_digits(&mut self, max_len: usize) -> Result<Option<u32>> {
        let start = self.position;
        while let Some(ch) = self.peek() {
            if !ch.is_ascii_digit() {
                break;
            }
            if self.position - start == max_len {
                return Err(self.error("number too long"));
            }
            self.advance();
        }
        if self.position == start {
            return Ok(None);
        }
        let text: String = self.input[start..self.position].iter().collect();
        text.parse::<u32>()
            .map(Some)
            .map_err(|_| self.error(format!("invalid number '{}'", text)))
    }

    fn read_bracket_symbol(&mut self) -> Result<(Element, bool)> {
        let first = match self.peek() {
            Some(c) => c,
            None => return Err(self.error("unterminated bracket atom")),
        };

        if first == '*' {
            self.advance();
            return Ok((Element::WILDCARD, false));
        }

        if first.is_ascii_lowercase() {
            let two: Option<Element> = match (first, self.peek_ahead(1)) {
                ('s', Some('e')) => Some(Element::SE),
                ('a', Some('s')) => Some(Element::AS),
                ('t', Some('e')) => Some(Element::TE),
                _ => None,
            };
            if let Some(el) = two {
                self.advance();
                self.advance();
                return Ok((el, true));
            }
            let one = match first {
                'b' => Element::B,
                'c' => Element::C,
                'n' => Element::N,
                'o' => Element::O,
                'p' => Element::P,
                's' => Element::S,
                _ => return Err(self.error(format!("invalid aromatic symbol '{}'", first))),
            };
            self.advance();
            return Ok((one, true));
        }

        if !first.is_ascii_uppercase() {
            return Err(self.error(format!("expected element symbol, found '{}'", first)));
        }

        if let Some(second) = self.peek_ahead(1).filter(|c| c.is_ascii_lowercase()) {
            let symbol: String = [first, second].iter().collect();
            if let Ok(el) = symbol.parse::<Element>() {
                self.advance();
                self.advance();
                return Ok((el, false));
            }
        }

        let symbol = first.to_string();
        match symbol.parse::<Element>() {
            Ok(el) => {
                self.advance();
                Ok((el, false))
            }
            Err(e) => Err(self.error(e)),
        }
    }

    fn read_chirality(&mut self) -> Result<Chirality> {
        if self.peek() != Some('@') {
            return Ok(Chirality::None);
        }
        self.advance();
        let chirality = if self.peek() == Some('@') {
            self.advance();
            Chirality::Clockwise
        } else {
            Chirality::Anticlockwise
        };
        // @TH1, @SP2, @OH3 and friends
        if matches!(self.peek(), Some('T' | 'S' | 'O')) {
            return Err(Error::Unsupported(format!(
                "non-tetrahedral chirality class at {}",
                self.current_span()
            )));
        }
        Ok(chirality)
    }

    fn read_hydrogen_count(&mut self) -> Result<u8> {
        if self.peek() != Some('H') {
            return Ok(0);
        }
        self.advance();
        match self.peek() {
            Some(d) if d.is_ascii_digit() => {
                self.advance();
                Ok(d as u8 - b'0')
            }
            _ => Ok(1),
        }
    }

    fn read_charge(&mut self) -> Result<i8> {
        let sign: i8 = match self.peek() {
            Some('+') => 1,
            Some('-') => -1,
            _ => return Ok(0),
        };
        let sign_char = self.advance().unwrap_or('+');

        if let Some(magnitude) = self.read_digits(2)? {
            if magnitude > 15 {
                return Err(self.error("charge out of range"));
            }
            return Ok(sign * magnitude as i8);
        }

        // ++ / -- repeated form
        let mut magnitude: i8 = 1;
        while self.peek() == Some(sign_char) {
            self.advance();
            magnitude += 1;
            if magnitude > 15 {
                return Err(self.error("charge out of range"));
            }
        }
        Ok(sign * magnitude)
    }
}
