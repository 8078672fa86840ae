//! Catalog export blob.
//!
//! An export is the JSON object `{"checksum": ..., "data": ...}` encoded as
//! standard base64. The checksum is the lowercase hex SHA-256 of the compact
//! JSON serialization of `data`.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::CatalogExport;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid export payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportBlob {
    pub checksum: String,
    pub data: Value,
}

impl ExportBlob {
    pub fn new(data: Value) -> Result<Self, ExportError> {
        let checksum = checksum(&data)?;
        Ok(Self { checksum, data })
    }

    /// Deserialize `data` as a catalog.
    pub fn catalog(&self) -> Result<CatalogExport, ExportError> {
        Ok(CatalogExport::deserialize(&self.data)?)
    }

    fn verify(&self) -> Result<(), ExportError> {
        let actual = checksum(&self.data)?;
        if actual.eq_ignore_ascii_case(self.checksum.trim()) {
            Ok(())
        } else {
            Err(ExportError::ChecksumMismatch {
                expected: self.checksum.clone(),
                actual,
            })
        }
    }
}

fn checksum(data: &Value) -> Result<String, ExportError> {
    let compact = serde_json::to_vec(data)?;
    Ok(hex::encode(Sha256::digest(&compact)))
}

/// Encode a catalog as an export blob.
pub fn encode_export(catalog: &CatalogExport) -> Result<String, ExportError> {
    let blob = ExportBlob::new(serde_json::to_value(catalog)?)?;
    Ok(STANDARD.encode(serde_json::to_vec(&blob)?))
}

/// Decode and verify an export blob.
pub fn try_decode_export(encoded: &str) -> Result<ExportBlob, ExportError> {
    let bytes = STANDARD.decode(encoded.trim())?;
    let blob: ExportBlob = serde_json::from_slice(&bytes)?;
    blob.verify()?;
    Ok(blob)
}

/// Like [`try_decode_export`], but logs failures and yields `None`.
pub fn decode_export(encoded: &str) -> Option<ExportBlob> {
    try_decode_export(encoded)
        .inspect_err(|e| tracing::error!(error = %e, "Failed to decode catalog export"))
        .ok()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::catalog::tests::sample_catalog;

    #[test]
    fn test_encoded_blob_decodes_to_same_catalog() {
        let catalog = sample_catalog();
        let encoded = encode_export(&catalog).unwrap();

        let blob = try_decode_export(&encoded).unwrap();
        assert_eq!(blob.checksum.len(), 64);
        assert_eq!(blob.catalog().unwrap(), catalog);
    }

    #[test]
    fn test_known_checksum() {
        // sha256("{}")
        let blob = ExportBlob::new(json!({})).unwrap();
        assert_eq!(
            blob.checksum,
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn test_tampered_data_is_rejected() {
        let blob = ExportBlob::new(json!({"products": []})).unwrap();
        let tampered = ExportBlob {
            data: json!({"products": [{"id": "x", "name": "X"}]}),
            ..blob
        };
        let encoded = STANDARD.encode(serde_json::to_vec(&tampered).unwrap());

        assert!(matches!(
            try_decode_export(&encoded),
            Err(ExportError::ChecksumMismatch { .. })
        ));
        assert_eq!(decode_export(&encoded), None);
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            try_decode_export("not base64!"),
            Err(ExportError::Base64(_))
        ));
        let not_json = STANDARD.encode("plain text");
        assert!(matches!(
            try_decode_export(&not_json),
            Err(ExportError::Json(_))
        ));
        assert_eq!(decode_export(""), None);
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let encoded = encode_export(&CatalogExport::default()).unwrap();
        assert!(try_decode_export(&format!("  {encoded}\n")).is_ok());
    }
}
