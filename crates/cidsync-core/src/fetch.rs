//! Dataset download
//!
//! The pipeline talks to a [`Fetcher`]; the production [`HttpFetcher`]
//! streams a gzip-compressed resource over HTTPS, decompressing on the fly into
//! a temporary file that is renamed into place only once the whole body has
//! been read. A partial download therefore never appears under its final name.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::MultiGzDecoder;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::checkpoint::hex;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, TLS, connection reset)
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Body could not be decompressed or written
    #[error("writing {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What a completed download produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub path: PathBuf,
    /// Decompressed size in bytes
    pub bytes: u64,
    /// SHA-256 of the decompressed content, hex encoded
    pub sha256: String,
}

/// Retrieves one remote resource into a local file
pub trait Fetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<FetchReport, FetchError>;
}

/// Fetch only if `destination` does not exist yet
///
/// Returns `None` when the file is already present; the fetcher is not called
/// and the file is left untouched.
pub fn ensure_local<F: Fetcher + ?Sized>(
    fetcher: &F,
    url: &str,
    destination: &Path,
) -> Result<Option<FetchReport>, FetchError> {
    if destination.exists() {
        info!(path = %destination.display(), "already present, skipping download");
        return Ok(None);
    }
    fetcher.fetch(url, destination).map(Some)
}

// ── HTTP ──────────────────────────────────────────────────

/// Blocking HTTPS download with gzip decompression
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("cidsync/", env!("CARGO_PKG_VERSION")))
            .timeout(None::<Duration>)
            .build()
            .map_err(|source| FetchError::Http {
                url: String::new(),
                source,
            })?;
        Ok(HttpFetcher { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, destination: &Path) -> Result<FetchReport, FetchError> {
        info!(url, path = %destination.display(), "downloading");
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let report = write_decompressed(response, destination)?;
        info!(
            path = %report.path.display(),
            bytes = report.bytes,
            sha256 = %report.sha256,
            "download finished"
        );
        Ok(report)
    }
}

/// Decompress a gzip stream into `destination` via a sibling temp file
pub fn write_decompressed<R: Read>(body: R, destination: &Path) -> Result<FetchReport, FetchError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| FetchError::Io { path, source }
    };

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let tmp = partial_path(destination);
    let result = (|| {
        let file = File::create(&tmp).map_err(io_err(&tmp))?;
        let mut out = HashingWriter {
            inner: BufWriter::new(file),
            hasher: Sha256::new(),
            bytes: 0,
        };
        let mut decoder = MultiGzDecoder::new(body);
        io::copy(&mut decoder, &mut out).map_err(io_err(&tmp))?;
        out.inner.flush().map_err(io_err(&tmp))?;
        Ok::<_, FetchError>((out.bytes, hex(&out.hasher.finalize())))
    })();

    match result {
        Ok((bytes, sha256)) => {
            fs::rename(&tmp, destination).map_err(io_err(destination))?;
            Ok(FetchReport {
                path: destination.to_path_buf(),
                bytes,
                sha256,
            })
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    destination.with_file_name(name)
}

struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
    bytes: u64,
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::cell::Cell;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    struct CountingFetcher {
        calls: Cell<usize>,
    }

    impl Fetcher for CountingFetcher {
        fn fetch(&self, _url: &str, destination: &Path) -> Result<FetchReport, FetchError> {
            self.calls.set(self.calls.get() + 1);
            write_decompressed(gzip(b"1\tC\n").as_slice(), destination)
        }
    }

    #[test]
    fn test_present_file_skips_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("CID-SMILES");
        fs::write(&dest, "existing").unwrap();
        let fetcher = CountingFetcher { calls: Cell::new(0) };

        let report = ensure_local(&fetcher, "https://example.invalid/x.gz", &dest).unwrap();

        assert_eq!(report, None);
        assert_eq!(fetcher.calls.get(), 0);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "existing");
    }

    #[test]
    fn test_absent_file_is_fetched() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("CID-SMILES");
        let fetcher = CountingFetcher { calls: Cell::new(0) };

        let report = ensure_local(&fetcher, "https://example.invalid/x.gz", &dest)
            .unwrap()
            .unwrap();

        assert_eq!(fetcher.calls.get(), 1);
        assert_eq!(report.bytes, 4);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "1\tC\n");
    }

    #[test]
    fn test_decompressed_digest() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("abc");
        let report = write_decompressed(gzip(b"abc").as_slice(), &dest).unwrap();
        assert_eq!(
            report.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_corrupt_body_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("CID-SMILES");
        let err = write_decompressed(&b"definitely not gzip"[..], &dest).unwrap_err();
        assert!(matches!(err, FetchError::Io { .. }));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }
}
