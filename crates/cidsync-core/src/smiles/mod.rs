//! SMILES canonicalization
//!
//! ```text
//! SMILES text → Tokenizer → Parser → Molecule → Sanitize → Rank → Writer
//! ```
//!
//! # Guarantees
//!
//! - **Deterministic**: same input always produces identical output
//! - **Idempotent**: canonicalizing a canonical string returns it unchanged
//! - **Order independent**: every atom order of one molecule gives one string,
//!   stereo included
//! - **Total**: [`canonical_smiles`] never panics and reports failure as `None`

pub mod aromaticity;
pub mod canon;
pub mod element;
pub mod graph;
pub mod kekulize;
pub mod parser;
pub mod rings;
pub mod sanitize;
pub mod tokenizer;
pub mod writer;

pub use element::Element;
pub use graph::Molecule;

use crate::Result;

/// Parse and sanitize SMILES text into a molecule graph
pub fn read_smiles(input: &str) -> Result<Molecule> {
    let mut mol = parser::parse(input)?;
    sanitize::sanitize(&mut mol)?;
    Ok(mol)
}

/// Canonical SMILES for `input`, or the reason it could not be produced
pub fn canonicalize(input: &str) -> Result<String> {
    let mol = read_smiles(input)?;
    writer::write_canonical(&mol)
}

/// Canonical SMILES for `input`, `None` on any failure
///
/// This is the per-row derivation used by the normalizer.
pub fn canonical_smiles(input: &str) -> Option<String> {
    canonicalize(input).ok()
}
