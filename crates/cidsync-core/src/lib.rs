//! cidsync core - PubChem compound refresh
//!
//! Downloads the PubChem CID-SMILES and CID-Synonym-filtered datasets,
//! canonicalizes every structure, and reloads two MySQL tables from the
//! result.
//!
//! # Architecture
//!
//! ```text
//! CID-SMILES ──→ Normalizer ──→ pubchem_rdkit_smiles.tsv ──→ pubmed_cid_smiles
//!                    ↓
//!                 smiles: Tokenizer → Parser → Sanitize → Rank → Writer
//!
//! CID-Synonym-filtered ─────────────────────────────────→ pubmed_cid_synonym_filtered
//! ```
//!
//! [`pipeline::Pipeline`] drives the stages; downloads, dumps and the database
//! sit behind the [`fetch::Fetcher`], [`backup::Dumper`] and
//! [`store::TableStore`] traits.
//!
//! # Guarantees
//!
//! - **Deterministic**: a structure has one canonical form however it is written
//! - **Row-preserving**: every input row yields exactly one output row, in order
//! - **Bounded**: normalization holds one chunk of rows in memory at a time

pub mod backup;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod fetch;
pub mod normalizer;
pub mod pipeline;
pub mod smiles;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use normalizer::{NormalizeSummary, Normalizer, DEFAULT_CHUNK_SIZE};
pub use pipeline::{Outcome, Pipeline, RunReport};
pub use smiles::{canonical_smiles, canonicalize};
