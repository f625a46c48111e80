//! Ingestion domain: type detection, MIME resolution, archive expansion,
//! and the caller-facing service

pub mod archive;
pub mod detector;
pub mod mime;
pub mod service;

pub use archive::ArchiveContext;
pub use detector::{ArtifactDetector, DetectorChain, XmlDetector, ZipArchiveDetector};
pub use mime::determine_mime_type;
pub use service::IngestionService;
