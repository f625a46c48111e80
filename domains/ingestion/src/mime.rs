//! MIME resolution for ingested content
//!
//! Resolution runs after the artifact type is fixed, in precedence order:
//! filename extension, a short content sniff, the type's catalog default,
//! and finally `application/octet-stream`.

use strata_catalog::ArtifactType;

const OCTET_STREAM: &str = "application/octet-stream";

/// Resolve the MIME type for a payload
pub fn determine_mime_type(filename: &str, sniff: &[u8], artifact_type: &ArtifactType) -> String {
    // XML gets the application/ form, not mime_guess's text/xml
    if filename.to_ascii_lowercase().ends_with(".xml") {
        return "application/xml".to_string();
    }
    if let Some(guess) = mime_guess::from_path(filename).first() {
        return guess.essence_str().to_string();
    }

    if sniff.starts_with(b"PK\x03\x04") {
        return "application/zip".to_string();
    }
    let head = sniff
        .strip_prefix(&[0xEF, 0xBB, 0xBF])
        .unwrap_or(sniff);
    let head: Vec<u8> = head
        .iter()
        .copied()
        .skip_while(|b| b.is_ascii_whitespace())
        .collect();
    if head.starts_with(b"<?xml") {
        return "application/xml".to_string();
    }

    artifact_type
        .mime_type
        .clone()
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}
