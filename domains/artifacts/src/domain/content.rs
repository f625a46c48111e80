//! Artifact binary content as an explicitly released resource
//!
//! An [`ArtifactContent`] owns a payload from ingestion start until the
//! request finishes. It must be re-readable (once for detection/sniffing,
//! once for persistence) and released exactly once on every exit path.
//! `Drop` is a backstop only; reaching it with an unreleased spill file is
//! logged as a leak.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use strata_common::{Error, Result};

#[derive(Debug)]
enum Backing {
    /// Payload held in memory
    Memory(Vec<u8>),
    /// Payload spilled to a temp file owned by this content
    Spilled(PathBuf),
    /// Payload backed by a file owned elsewhere (e.g. an archive work dir)
    Borrowed(PathBuf),
}

/// A named, byte-addressable payload with an explicit release lifecycle
#[derive(Debug)]
pub struct ArtifactContent {
    filename: String,
    backing: Backing,
    released: bool,
}

impl ArtifactContent {
    /// Content held in memory
    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            backing: Backing::Memory(bytes),
            released: false,
        }
    }

    /// Content backed by a file owned by someone else (an archive member
    /// inside an expansion work dir). Release does not remove the file.
    pub fn from_file(filename: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            backing: Backing::Borrowed(path.into()),
            released: false,
        }
    }

    /// Spill a payload to a temp file under `work_dir` and own it until
    /// release. Used when the payload should not be held in memory.
    pub fn spilled(filename: impl Into<String>, bytes: &[u8], work_dir: &Path) -> Result<Self> {
        let mut file = tempfile::NamedTempFile::new_in(work_dir)?;
        file.write_all(bytes)?;
        let (_, path) = file.keep().map_err(|e| Error::Io(e.error))?;
        Ok(Self {
            filename: filename.into(),
            backing: Backing::Spilled(path),
            released: false,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Rename the payload; used when the caller-supplied name arrives
    /// separately from the bytes (the Slug convention)
    pub fn set_filename(&mut self, filename: impl Into<String>) {
        self.filename = filename.into();
    }

    /// Full payload bytes. Re-readable: every call re-reads file-backed
    /// content from disk.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        if self.released {
            return Err(Error::Persistence(format!(
                "content '{}' accessed after release",
                self.filename
            )));
        }
        match &self.backing {
            Backing::Memory(bytes) => Ok(bytes.clone()),
            Backing::Spilled(path) | Backing::Borrowed(path) => Ok(fs::read(path)?),
        }
    }

    /// First `n` bytes of the payload, for content sniffing
    pub fn sniff(&self, n: usize) -> Result<Vec<u8>> {
        let mut bytes = self.bytes()?;
        bytes.truncate(n);
        Ok(bytes)
    }

    pub fn size(&self) -> Result<u64> {
        match &self.backing {
            Backing::Memory(bytes) => Ok(bytes.len() as u64),
            Backing::Spilled(path) | Backing::Borrowed(path) => Ok(fs::metadata(path)?.len()),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Release the payload. Idempotent; removes the spill file when this
    /// content owns one.
    pub fn cleanup(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match &mut self.backing {
            Backing::Memory(bytes) => bytes.clear(),
            Backing::Spilled(path) => {
                if let Err(e) = fs::remove_file(&*path) {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "failed to remove spilled content file"
                    );
                }
            }
            Backing::Borrowed(_) => {}
        }
    }
}

impl Drop for ArtifactContent {
    #[mutants::skip] // Backstop only; explicit cleanup() paths are tested directly
    fn drop(&mut self) {
        if !self.released {
            if let Backing::Spilled(path) = &self.backing {
                tracing::warn!(
                    filename = %self.filename,
                    path = %path.display(),
                    "artifact content dropped without explicit release"
                );
            }
            self.cleanup();
        }
    }
}
