//! Structure normalizer — adds a canonical SMILES column to a CID/SMILES table
//!
//! The input is a header-less, tab-separated file of `(identifier, smiles)`
//! rows. Rows are read in fixed-size chunks; each chunk is derived and then
//! appended to the output file before the next one is read, so chunks already
//! written survive an interrupted run.
//!
//! # Pipeline
//!
//! `line → InputRecord → canonical_smiles → OutputRecord → id \t raw \t canonical`
//!
//! # Guarantees
//!
//! - **Row preserving**: one output row per input row, in input order
//! - **Byte exact**: identifier and raw structure are copied byte-for-byte
//! - **Total**: a structure that cannot be canonicalized yields an empty field,
//!   never an error

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::smiles::canonical_smiles;
use crate::{Error, Result};

/// Rows per chunk when none is configured
pub const DEFAULT_CHUNK_SIZE: usize = 100;

// ── Records ───────────────────────────────────────────────

/// One row of the input table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecord {
    pub id: Vec<u8>,
    pub raw: Vec<u8>,
}

impl InputRecord {
    /// Split a line (terminator already removed) at its first tab
    ///
    /// Everything after the first tab is the raw structure, further tabs
    /// included. A line without a tab has an empty raw structure.
    pub fn from_line(line: &[u8]) -> Self {
        match line.iter().position(|b| *b == b'\t') {
            Some(tab) => InputRecord {
                id: line[..tab].to_vec(),
                raw: line[tab + 1..].to_vec(),
            },
            None => InputRecord {
                id: line.to_vec(),
                raw: Vec::new(),
            },
        }
    }
}

/// One row of the output table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    pub id: Vec<u8>,
    pub raw: Vec<u8>,
    pub canonical: Option<String>,
}

impl OutputRecord {
    /// Derive the canonical column for one input row
    pub fn derive(input: InputRecord) -> Self {
        let canonical = std::str::from_utf8(&input.raw)
            .ok()
            .and_then(canonical_smiles);
        OutputRecord {
            id: input.id,
            raw: input.raw,
            canonical,
        }
    }

    /// Write the row as `id \t raw \t canonical \n`; `None` is an empty field
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_all(&self.id)?;
        out.write_all(b"\t")?;
        out.write_all(&self.raw)?;
        out.write_all(b"\t")?;
        if let Some(canonical) = &self.canonical {
            out.write_all(canonical.as_bytes())?;
        }
        out.write_all(b"\n")
    }
}

/// Counts reported by a normalization run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeSummary {
    pub rows_read: u64,
    pub canonicalized: u64,
    pub failed: u64,
    pub chunks: u64,
}

// ── Normalizer ────────────────────────────────────────────

/// Chunked streaming pass over a CID/SMILES file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    chunk_size: usize,
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Normalizer {
    /// # Errors
    /// Returns `Error::Config` if `chunk_size` is zero.
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than 0".to_string()));
        }
        Ok(Normalizer { chunk_size })
    }

    /// Normalize `input` and append the result to `output`
    pub fn normalize_file(&self, input: &Path, output: &Path) -> Result<NormalizeSummary> {
        self.normalize_file_with_progress(input, output, |_| {})
    }

    /// Like [`Normalizer::normalize_file`], calling `on_chunk` after every
    /// chunk is flushed
    pub fn normalize_file_with_progress<F>(
        &self,
        input: &Path,
        output: &Path,
        on_chunk: F,
    ) -> Result<NormalizeSummary>
    where
        F: FnMut(&NormalizeSummary),
    {
        let reader = File::open(input).map_err(|e| Error::io(input, e))?;
        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(output)
            .map_err(|e| Error::io(output, e))?;

        info!(
            input = %input.display(),
            output = %output.display(),
            chunk_size = self.chunk_size,
            "normalizing structures"
        );
        let summary = self.normalize_stream(
            BufReader::new(reader),
            BufWriter::new(writer),
            on_chunk,
            (input, output),
        )?;
        info!(
            rows = summary.rows_read,
            canonicalized = summary.canonicalized,
            failed = summary.failed,
            chunks = summary.chunks,
            "normalization finished"
        );
        Ok(summary)
    }

    /// Core loop over any reader/writer pair
    ///
    /// `paths` label I/O errors as (reader path, writer path).
    pub fn normalize_stream<R, W, F>(
        &self,
        mut reader: R,
        mut writer: W,
        mut on_chunk: F,
        paths: (&Path, &Path),
    ) -> Result<NormalizeSummary>
    where
        R: BufRead,
        W: Write,
        F: FnMut(&NormalizeSummary),
    {
        let (input, output) = paths;
        let mut summary = NormalizeSummary::default();
        let mut chunk: Vec<InputRecord> = Vec::with_capacity(self.chunk_size);
        let mut line = Vec::new();
        let mut eof = false;

        while !eof {
            chunk.clear();
            while chunk.len() < self.chunk_size {
                line.clear();
                let n = reader
                    .read_until(b'\n', &mut line)
                    .map_err(|e| Error::io(input, e))?;
                if n == 0 {
                    eof = true;
                    break;
                }
                let content = strip_terminator(&line);
                if content.is_empty() {
                    continue;
                }
                chunk.push(InputRecord::from_line(content));
            }
            if chunk.is_empty() {
                break;
            }

            let rows = chunk.len() as u64;
            let mut failed = 0u64;
            for record in chunk.drain(..) {
                let derived = OutputRecord::derive(record);
                if derived.canonical.is_none() {
                    failed += 1;
                }
                derived
                    .write_to(&mut writer)
                    .map_err(|e| Error::io(output, e))?;
            }
            writer.flush().map_err(|e| Error::io(output, e))?;

            summary.rows_read += rows;
            summary.failed += failed;
            summary.canonicalized += rows - failed;
            summary.chunks += 1;
            debug!(chunk = summary.chunks, rows, failed, "chunk written");
            on_chunk(&summary);
        }
        Ok(summary)
    }
}

fn strip_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
