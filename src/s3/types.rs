//! S3 types shared by the signer, client and upload pipeline

use serde::{Deserialize, Serialize};

/// Static credentials for an S3-compatible store.
///
/// Read-only for the lifetime of the process. There are no built-in
/// defaults; both keys must come from configuration.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Access key ID
    pub access_key: String,
    /// Secret access key
    pub secret_key: String,
    /// Region used in the credential scope (e.g. "us-east-1", "auto")
    pub region: String,
}

impl Credentials {
    /// Create new credentials
    pub fn new(access_key: String, secret_key: String, region: String) -> Self {
        Self {
            access_key,
            secret_key,
            region,
        }
    }
}

/// A part that has been uploaded and acknowledged by the store.
///
/// Immutable once created. The ETag is kept verbatim as returned in the
/// response header (including any surrounding quotes) and echoed back
/// unchanged in the completion body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartRecord {
    /// Part number (1-indexed, contiguous)
    pub part_number: u32,
    /// ETag returned by UploadPart (non-empty, opaque)
    pub etag: String,
}

impl PartRecord {
    /// Create a new part record
    pub fn new(part_number: u32, etag: String) -> Self {
        Self { part_number, etag }
    }
}

/// Response from CreateMultipartUpload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateMultipartResponse {
    /// Bucket name echoed by the store
    pub bucket: String,
    /// Object key echoed by the store
    pub key: String,
    /// Upload ID binding all subsequent part/complete/abort calls
    pub upload_id: String,
}

/// Sizing knobs for the upload path.
///
/// Threshold and part size are independent configuration constants; any
/// positive value is valid for either.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Files at or below this size go up as a single PUT
    #[serde(default = "default_threshold")]
    pub threshold: u64,
    /// Byte size of each multipart part (last part may be shorter)
    #[serde(default = "default_part_size")]
    pub part_size: u64,
}

fn default_threshold() -> u64 {
    100 * 1024 * 1024
}

fn default_part_size() -> u64 {
    100 * 1024 * 1024
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            part_size: default_part_size(),
        }
    }
}
