//! Pluggable artifact type detection
//!
//! Detection runs through an ordered chain of detectors resolved at
//! startup; the first detector that claims the content wins. A chain that
//! claims nothing returns `None`, which callers treat as "do not ingest as
//! a typed artifact" rather than as an error. Classification is pure: no
//! detector may have side effects.

use strata_artifacts::ArtifactContent;
use strata_catalog::{ArtifactType, TypeCatalog, CORE_MODEL};
use strata_common::Result;

use crate::archive::ArchiveContext;

/// How many bytes detectors may sniff from the head of the payload
const SNIFF_LEN: usize = 512;

/// One pluggable detector in the chain
pub trait ArtifactDetector: Send + Sync {
    /// Whether this detector claims the content. `archive` is the enclosing
    /// expansion context when classifying an archive member.
    fn accepts(&self, content: &ArtifactContent, archive: Option<&ArchiveContext>) -> bool;

    /// Classify claimed content into a resolved type
    fn detect(
        &self,
        content: &ArtifactContent,
        archive: Option<&ArchiveContext>,
    ) -> Option<ArtifactType>;

    /// Whether content claimed by this detector should be expanded into
    /// child artifacts
    fn allow_expansion(&self, _content: &ArtifactContent, _archive: Option<&ArchiveContext>) -> bool {
        false
    }
}

/// Ordered, first-acceptor-wins detector chain
pub struct DetectorChain {
    detectors: Vec<Box<dyn ArtifactDetector>>,
}

impl DetectorChain {
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// The built-in chain: zip archives, then XML documents
    pub fn standard(catalog: &TypeCatalog) -> Result<Self> {
        let mut chain = Self::new();
        chain.push(Box::new(ZipArchiveDetector::new(catalog)?));
        chain.push(Box::new(XmlDetector::new(catalog)?));
        Ok(chain)
    }

    /// Append a detector. Earlier detectors take precedence.
    pub fn push(&mut self, detector: Box<dyn ArtifactDetector>) {
        self.detectors.push(detector);
    }

    /// Run the chain; the first acceptor classifies the content
    pub fn detect(
        &self,
        content: &ArtifactContent,
        archive: Option<&ArchiveContext>,
    ) -> Option<ArtifactType> {
        self.detectors
            .iter()
            .find(|detector| detector.accepts(content, archive))
            .and_then(|detector| detector.detect(content, archive))
    }

    /// Whether the first acceptor wants the content expanded
    pub fn allow_expansion(
        &self,
        content: &ArtifactContent,
        archive: Option<&ArchiveContext>,
    ) -> bool {
        self.detectors
            .iter()
            .find(|detector| detector.accepts(content, archive))
            .map(|detector| detector.allow_expansion(content, archive))
            .unwrap_or(false)
    }
}

impl Default for DetectorChain {
    fn default() -> Self {
        Self::new()
    }
}

fn sniff(content: &ArtifactContent) -> Vec<u8> {
    content.sniff(SNIFF_LEN).unwrap_or_default()
}

/// Leading bytes with ASCII whitespace and a UTF-8 BOM stripped
fn trimmed_head(head: &[u8]) -> &[u8] {
    let head = head.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(head);
    let start = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(head.len());
    &head[start..]
}

/// Detects XML documents by extension or XML declaration
pub struct XmlDetector {
    artifact_type: ArtifactType,
}

impl XmlDetector {
    pub fn new(catalog: &TypeCatalog) -> Result<Self> {
        Ok(Self {
            artifact_type: catalog.resolve(CORE_MODEL, "XmlDocument")?,
        })
    }
}

impl ArtifactDetector for XmlDetector {
    fn accepts(&self, content: &ArtifactContent, _archive: Option<&ArchiveContext>) -> bool {
        if content.filename().to_ascii_lowercase().ends_with(".xml") {
            return true;
        }
        trimmed_head(&sniff(content)).starts_with(b"<?xml")
    }

    fn detect(
        &self,
        content: &ArtifactContent,
        archive: Option<&ArchiveContext>,
    ) -> Option<ArtifactType> {
        self.accepts(content, archive)
            .then(|| self.artifact_type.clone())
    }
}

/// Zip local-file-header magic
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Detects zip archives by magic bytes; expansion applies only at the top
/// level (members that are themselves archives are stored, not re-expanded)
pub struct ZipArchiveDetector {
    artifact_type: ArtifactType,
}

impl ZipArchiveDetector {
    pub fn new(catalog: &TypeCatalog) -> Result<Self> {
        Ok(Self {
            artifact_type: catalog.resolve(CORE_MODEL, "ZipArchive")?,
        })
    }
}

impl ArtifactDetector for ZipArchiveDetector {
    fn accepts(&self, content: &ArtifactContent, _archive: Option<&ArchiveContext>) -> bool {
        sniff(content).starts_with(ZIP_MAGIC)
    }

    fn detect(
        &self,
        content: &ArtifactContent,
        archive: Option<&ArchiveContext>,
    ) -> Option<ArtifactType> {
        self.accepts(content, archive)
            .then(|| self.artifact_type.clone())
    }

    fn allow_expansion(&self, _content: &ArtifactContent, archive: Option<&ArchiveContext>) -> bool {
        archive.is_none()
    }
}
