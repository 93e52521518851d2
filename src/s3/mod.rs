//! S3 wire layer: AWS SigV4 signing plus the five upload operations
//! (PUT object, initiate/part/complete/abort multipart)

pub mod client;
pub mod signer;
pub mod types;

pub use client::{Result, S3Client, UploadError};
pub use signer::SignerV4;
pub use types::{Credentials, InitiateMultipartResponse, PartRecord, UploadSettings};
