//! Ordering and atomicity guarantees of archive expansion

mod common;

use common::{build_zip, tracking_fixture, TrackingGateway};
use strata_artifacts::{ArtifactContent, InMemoryGateway};

#[tokio::test]
async fn test_archive_row_committed_before_children_and_content_last() {
    let inner = InMemoryGateway::new(64);
    let gateway = TrackingGateway::new(inner);
    let service = tracking_fixture(gateway.clone());

    let bytes = build_zip(&[
        ("a.xml", b"<?xml version=\"1.0\"?><a/>"),
        ("b.xml", b"<?xml version=\"1.0\"?><b/>"),
    ]);
    service
        .upload(Some("bundle.zip"), ArtifactContent::from_bytes("", bytes), None)
        .await
        .unwrap();

    let ops = gateway.ops();
    assert_eq!(
        ops,
        vec![
            "persist:bundle.zip".to_string(),
            "persist:a.xml".to_string(),
            "persist:b.xml".to_string(),
            "update-content:bundle.zip".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_partial_batch_failure_rolls_back_everything() {
    let inner = InMemoryGateway::new(64);
    // Second child's persist fails mid-batch
    let gateway = TrackingGateway::failing_on(inner.clone(), "b.xml");
    let service = tracking_fixture(gateway.clone());

    let bytes = build_zip(&[
        ("a.xml", b"<?xml version=\"1.0\"?><a/>"),
        ("b.xml", b"<?xml version=\"1.0\"?><b/>"),
    ]);
    let err = service
        .upload(Some("bundle.zip"), ArtifactContent::from_bytes("", bytes), None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "PERSISTENCE_FAILURE");

    // No sibling rows remain, and the aborted archive row is gone too
    assert_eq!(inner.artifact_count(), 0);

    let ops = gateway.ops();
    assert_eq!(
        ops,
        vec![
            "persist:bundle.zip".to_string(),
            "persist:a.xml".to_string(),
            "persist-failed:b.xml".to_string(),
            // Compensating delete of the committed sibling, then removal of
            // the archive row itself
            "delete:a.xml".to_string(),
            "delete:bundle.zip".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_failed_content_attach_rolls_back_children_and_archive() {
    let inner = InMemoryGateway::new(64);
    // Children commit, then attaching the archive's own content fails
    let gateway = TrackingGateway::failing_on_content(inner.clone(), "bundle.zip");
    let service = tracking_fixture(gateway.clone());

    let bytes = build_zip(&[("a.xml", b"<?xml version=\"1.0\"?><a/>")]);
    let err = service
        .upload(Some("bundle.zip"), ArtifactContent::from_bytes("", bytes), None)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "PERSISTENCE_FAILURE");

    // No orphaned children pointing at a vanished archive row
    assert_eq!(inner.artifact_count(), 0);

    let ops = gateway.ops();
    assert_eq!(
        ops,
        vec![
            "persist:bundle.zip".to_string(),
            "persist:a.xml".to_string(),
            "update-content-failed:bundle.zip".to_string(),
            "delete:a.xml".to_string(),
            "delete:bundle.zip".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_failed_expansion_never_attaches_archive_content() {
    let inner = InMemoryGateway::new(64);
    let gateway = TrackingGateway::failing_on(inner.clone(), "a.xml");
    let service = tracking_fixture(gateway.clone());

    let bytes = build_zip(&[("a.xml", b"<?xml version=\"1.0\"?><a/>")]);
    service
        .upload(Some("bundle.zip"), ArtifactContent::from_bytes("", bytes), None)
        .await
        .unwrap_err();

    assert!(!gateway
        .ops()
        .iter()
        .any(|op| op.starts_with("update-content:")));
}
