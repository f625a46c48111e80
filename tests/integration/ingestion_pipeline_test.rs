//! End-to-end ingestion scenarios through the full service stack

mod common;

use std::sync::Arc;

use async_trait::async_trait;

use common::{build_zip, fixture};
use strata_artifacts::{
    ArtifactContent, BaseArtifact, EXPANDED_ARCHIVE_PATH_PROPERTY, EXPANDED_FROM_DOCUMENT,
};
use strata_catalog::TypeCatalog;
use strata_common::{Error, Result};
use strata_events::{ArtifactObserver, EventPublisher, RecordedEvent, RecordingObserver};
use strata_ingestion::{DetectorChain, IngestionService};

#[tokio::test]
async fn test_bundle_zip_scenario() {
    // A zip with one recognizable member (a.xml) and one nobody claims
    // (b.bin), uploaded under the name bundle.zip
    let f = fixture();
    let bytes = build_zip(&[
        ("a.xml", b"<?xml version=\"1.0\"?><a/>"),
        ("b.bin", &[0x00, 0x01, 0x02, 0x03]),
    ]);

    let archive = f
        .service
        .upload(Some("bundle.zip"), ArtifactContent::from_bytes("", bytes), None)
        .await
        .unwrap();

    assert_eq!(archive.name, "bundle.zip");
    assert_eq!(archive.artifact_type.name, "ZipArchive");
    assert!(archive.has_content());

    // Exactly one child survived detection
    let stored = f.gateway.artifacts();
    assert_eq!(stored.len(), 2);
    let child = stored
        .iter()
        .find(|a| a.name == "a.xml")
        .expect("a.xml not expanded");
    assert!(!stored.iter().any(|a| a.name == "b.bin"));

    // The child points back at the already-committed archive row
    let rel = child.relationship(EXPANDED_FROM_DOCUMENT).unwrap();
    assert_eq!(rel.targets, vec![archive.uuid.unwrap()]);
    assert_eq!(
        child.custom_property(EXPANDED_ARCHIVE_PATH_PROPERTY),
        Some("a.xml")
    );

    // The child's own content round-trips
    let child_bytes = f
        .service
        .get_content(child.uuid.unwrap(), "core", "XmlDocument")
        .await
        .unwrap();
    assert_eq!(child_bytes, b"<?xml version=\"1.0\"?><a/>");
}

#[tokio::test]
async fn test_nested_directories_keep_archive_relative_paths() {
    let f = fixture();
    let bytes = build_zip(&[
        ("docs/a.xml", b"<?xml version=\"1.0\"?><a/>"),
        ("docs/sub/b.xml", b"<?xml version=\"1.0\"?><b/>"),
    ]);

    f.service
        .upload(Some("nested.zip"), ArtifactContent::from_bytes("", bytes), None)
        .await
        .unwrap();

    let stored = f.gateway.artifacts();
    let paths: Vec<&str> = stored
        .iter()
        .filter_map(|a| a.custom_property(EXPANDED_ARCHIVE_PATH_PROPERTY))
        .collect();
    assert!(paths.contains(&"docs/a.xml"));
    assert!(paths.contains(&"docs/sub/b.xml"));
}

#[tokio::test]
async fn test_document_create_without_content_rejected() {
    let f = fixture();
    let ty = TypeCatalog::core().resolve("core", "Document").unwrap();
    let err = f
        .service
        .create_metadata("core", "Document", BaseArtifact::new("a.bin", ty))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_ARTIFACT_CREATION");
    assert_eq!(f.gateway.artifact_count(), 0);
}

#[tokio::test]
async fn test_unrecognized_upload_without_hint_rejected() {
    let f = fixture();
    let err = f
        .service
        .upload(
            Some("mystery.dat"),
            ArtifactContent::from_bytes("", vec![0x13, 0x37]),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "UNKNOWN_ARTIFACT_TYPE");
}

#[tokio::test]
async fn test_typed_upload_without_slug_uses_default_filename() {
    let f = fixture();
    let persisted = f
        .service
        .upload(
            None,
            ArtifactContent::from_bytes("", b"raw bytes".to_vec()),
            Some(("core", "Document")),
        )
        .await
        .unwrap();
    assert_eq!(persisted.name, "newartifact.bin");
}

#[tokio::test]
async fn test_full_lifecycle_event_sequence() {
    let f = fixture();
    let persisted = f
        .service
        .upload(
            Some("a.xml"),
            ArtifactContent::from_bytes("", b"<?xml version=\"1.0\"?><a/>".to_vec()),
            None,
        )
        .await
        .unwrap();
    let uuid = persisted.uuid.unwrap();

    let mut edited = persisted.clone();
    edited.set_custom_property("owner", "qa");
    f.service
        .update_metadata(uuid, "core", "XmlDocument", edited)
        .await
        .unwrap();
    f.service.delete(uuid, "core", "XmlDocument").await.unwrap();

    assert_eq!(
        f.observer.events(),
        vec![
            RecordedEvent::Created {
                name: "a.xml".to_string()
            },
            RecordedEvent::Updated {
                name: "a.xml".to_string(),
                old_version: 1,
            },
            RecordedEvent::Deleted {
                name: "a.xml".to_string()
            },
        ]
    );
}

struct ExplodingObserver;

#[async_trait]
impl ArtifactObserver for ExplodingObserver {
    async fn on_created(&self, _artifact: &BaseArtifact) -> Result<()> {
        Err(Error::Validation("observer exploded".to_string()))
    }

    async fn on_updated(&self, _new: &BaseArtifact, _old: &BaseArtifact) -> Result<()> {
        Err(Error::Validation("observer exploded".to_string()))
    }

    async fn on_deleted(&self, _artifact: &BaseArtifact) -> Result<()> {
        Err(Error::Validation("observer exploded".to_string()))
    }
}

#[tokio::test]
async fn test_observer_failure_does_not_fail_ingestion() {
    let gateway = strata_artifacts::InMemoryGateway::new(64);
    let catalog = TypeCatalog::core();
    let detectors = DetectorChain::standard(&catalog).unwrap();
    let recording = Arc::new(RecordingObserver::new());
    let mut publisher = EventPublisher::new();
    publisher.register(Arc::new(ExplodingObserver));
    publisher.register(recording.clone());

    let service = IngestionService::new(Arc::new(gateway.clone()), catalog, detectors, publisher);

    let persisted = service
        .upload(
            Some("a.xml"),
            ArtifactContent::from_bytes("", b"<?xml version=\"1.0\"?><a/>".to_vec()),
            None,
        )
        .await
        .unwrap();
    assert!(persisted.uuid.is_some());
    assert_eq!(gateway.artifact_count(), 1);
    // The observer after the failing one still ran
    assert_eq!(recording.event_count(), 1);
}
