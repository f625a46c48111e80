//! Scoped working state for one archive expansion
//!
//! An [`ArchiveContext`] owns a per-request temporary directory for the
//! lifetime of the expansion and maps extracted file paths back to
//! archive-relative paths. It is torn down on every exit path; `Drop` is a
//! backstop only.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::ZipArchive;

use strata_artifacts::ArtifactContent;
use strata_catalog::ArtifactType;
use strata_common::{Error, Result};

/// Per-request expansion state: a temp dir, the archive's own type, and
/// the archive payload
#[derive(Debug)]
pub struct ArchiveContext {
    work_dir: Option<TempDir>,
    archive_type: ArtifactType,
    archive_bytes: Vec<u8>,
}

impl ArchiveContext {
    /// Open an expansion context over the given content, placing the work
    /// dir under `work_dir_root`. Fails unless the payload is a readable
    /// zip archive.
    pub fn create(
        content: &ArtifactContent,
        archive_type: ArtifactType,
        work_dir_root: &Path,
    ) -> Result<Self> {
        let archive_bytes = content.bytes()?;
        ZipArchive::new(Cursor::new(&archive_bytes)).map_err(|e| {
            Error::Validation(format!(
                "content '{}' is not a readable zip archive: {e}",
                content.filename()
            ))
        })?;
        let work_dir = TempDir::new_in(work_dir_root)?;
        Ok(Self {
            work_dir: Some(work_dir),
            archive_type,
            archive_bytes,
        })
    }

    /// The archive's own resolved type
    pub fn archive_type(&self) -> &ArtifactType {
        &self.archive_type
    }

    fn extraction_root(&self) -> Result<PathBuf> {
        let work_dir = self.work_dir.as_ref().ok_or_else(|| {
            Error::Persistence("archive context used after cleanup".to_string())
        })?;
        Ok(work_dir.path().join("expanded"))
    }

    /// Extract every member into the working directory and return the
    /// regular files found, in stable (path-sorted) order.
    pub fn expand(&mut self) -> Result<Vec<PathBuf>> {
        let root = self.extraction_root()?;
        fs::create_dir_all(&root)?;

        let mut archive = ZipArchive::new(Cursor::new(&self.archive_bytes))
            .map_err(|e| Error::Validation(format!("unreadable zip archive: {e}")))?;

        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| Error::Validation(format!("unreadable archive member: {e}")))?;

            // Zip-slip guard: reject members whose names escape the
            // extraction root.
            let relative = entry.enclosed_name().ok_or_else(|| {
                Error::Validation(format!(
                    "archive member '{}' escapes the extraction directory",
                    entry.name()
                ))
            })?;
            let destination = root.join(relative);

            if entry.is_dir() {
                fs::create_dir_all(&destination)?;
                continue;
            }
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = fs::File::create(&destination)?;
            std::io::copy(&mut entry, &mut out)?;
        }

        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect();
        files.sort();

        tracing::debug!(members = files.len(), "expanded archive");
        Ok(files)
    }

    /// Map an extracted file path back to its archive-relative path, with
    /// forward slashes regardless of platform
    pub fn strip_work_dir(&self, path: &Path) -> Result<String> {
        let root = self.extraction_root()?;
        let relative = path.strip_prefix(&root).map_err(|_| {
            Error::Persistence(format!(
                "path {} is outside the extraction directory",
                path.display()
            ))
        })?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(parts.join("/"))
    }

    /// Remove the working directory. Idempotent.
    pub fn cleanup(&mut self) {
        if let Some(work_dir) = self.work_dir.take() {
            if let Err(e) = work_dir.close() {
                tracing::warn!(error = %e, "failed to remove archive work dir");
            }
        }
    }
}

impl Drop for ArchiveContext {
    fn drop(&mut self) {
        if self.work_dir.is_some() {
            tracing::warn!("archive context dropped without explicit cleanup");
            self.cleanup();
        }
    }
}
