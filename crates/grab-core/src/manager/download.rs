//! Streaming a response body to a file without leaving partial artifacts.
//!
//! The body goes to a uniquely named `<name>.<random>.part` file next to the
//! target and is hashed while it streams; the file is synced and renamed over
//! `path` only after the transfer succeeded. Any failure removes the part
//! file, and concurrent downloads of one target never share it.

use std::fs;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::transport::{BodySink, Request, TransportPool};

/// Suffix of in-progress download files.
pub const PART_SUFFIX: &str = ".part";

/// Outcome of a completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub path: PathBuf,
    /// Effective URL after redirects.
    pub url: String,
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the saved body.
    pub sha256: String,
}

/// Creates a fresh part file in the target's directory.
fn create_part(path: &Path) -> io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    tempfile::Builder::new()
        .prefix(&format!("{}.", name))
        .suffix(PART_SUFFIX)
        .tempfile_in(dir)
}

struct FileSink<'a> {
    file: BufWriter<NamedTempFile>,
    hasher: Sha256,
    bytes: u64,
    observer: Option<&'a dyn Fn(u64)>,
}

impl<'a> FileSink<'a> {
    fn new(part: NamedTempFile, observer: Option<&'a dyn Fn(u64)>) -> Self {
        Self {
            file: BufWriter::new(part),
            hasher: Sha256::new(),
            bytes: 0,
            observer,
        }
    }
}

impl BodySink for FileSink<'_> {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.file.write_all(chunk)?;
        self.hasher.update(chunk);
        self.bytes += chunk.len() as u64;
        if let Some(observe) = self.observer {
            observe(self.bytes);
        }
        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        if self.bytes == 0 {
            return Ok(());
        }
        self.file.flush()?;
        self.file.get_ref().as_file().set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.hasher = Sha256::new();
        self.bytes = 0;
        Ok(())
    }
}

impl FileSink<'_> {
    /// Flushes and syncs the part file, then moves it over `path`.
    fn persist(self, path: &Path) -> io::Result<(u64, String)> {
        let part = self.file.into_inner().map_err(|e| e.into_error())?;
        part.as_file().sync_all()?;
        part.persist(path).map_err(|e| e.error)?;
        Ok((self.bytes, hex::encode(self.hasher.finalize())))
    }
}

pub(crate) fn download_to(
    transport: &TransportPool,
    req: &Request,
    path: &Path,
    observer: Option<&dyn Fn(u64)>,
) -> Result<DownloadReport> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let part = create_part(path).map_err(|e| Error::io(path, e))?;
    tracing::trace!(part = %part.path().display(), "streaming to part file");
    let mut sink = FileSink::new(part, observer);

    // Dropping the sink on any error path deletes the part file.
    let head = transport.execute(req, &mut sink)?;
    let (bytes, sha256) = sink.persist(path).map_err(|e| Error::io(path, e))?;
    tracing::debug!(url = %head.url, path = %path.display(), bytes, "download saved");
    Ok(DownloadReport {
        path: path.to_path_buf(),
        url: head.url,
        bytes,
        sha256,
    })
}
