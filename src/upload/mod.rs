//! Upload orchestration
//!
//! `Uploader` is the entry point both front-ends call: it resolves the
//! destination key, detects the content type, picks the simple or
//! multipart path by size, and returns the public URL of the stored
//! object.

pub mod chunk;
pub mod planner;
pub mod session;

use crate::config::Profile;
use crate::content_type;
use crate::s3::{Credentials, Result, S3Client, UploadError, UploadSettings};
use planner::UploadPlan;
use session::MultipartSession;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// One-stop uploader bound to an endpoint, bucket and credentials
#[derive(Clone)]
pub struct Uploader {
    client: S3Client,
    settings: UploadSettings,
}

impl Uploader {
    /// Build an uploader from a configuration profile
    pub fn new(profile: &Profile, settings: UploadSettings) -> Self {
        let credentials = Credentials::new(
            profile.access_key.clone(),
            profile.secret_key.clone(),
            profile.region.clone(),
        );
        let client = S3Client::new(&profile.endpoint, &profile.bucket, &credentials);

        Self { client, settings }
    }

    /// Upload a local file and return its public URL.
    ///
    /// The destination key is `{uuid}/{file_name}`; a fresh v4 UUID per
    /// call means keys are never reused and existing objects are never
    /// overwritten.
    pub async fn upload(&self, path: &Path) -> Result<String> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| UploadError::FileNotFound(path.to_path_buf()))?;
        if !metadata.is_file() {
            return Err(UploadError::FileNotFound(path.to_path_buf()));
        }
        let file_size = metadata.len();

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                UploadError::InvalidInput(format!("file name is not valid UTF-8: {:?}", path))
            })?;

        let key = format!("{}/{}", Uuid::new_v4(), file_name);
        let content_type = content_type::from_path(path);

        info!(
            key = %key,
            size = file_size,
            content_type = %content_type,
            "starting upload"
        );

        match planner::plan(file_size, self.settings.threshold) {
            UploadPlan::Simple => {
                let data = tokio::fs::read(path).await?;
                self.client
                    .put_object(&key, data.into(), content_type)
                    .await?;
            }
            UploadPlan::Multipart => {
                MultipartSession::run(
                    &self.client,
                    path,
                    file_size,
                    &key,
                    content_type,
                    self.settings.part_size,
                )
                .await?;
            }
        }

        let url = self.client.object_url(&key);
        info!(url = %url, "upload complete");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;

    fn test_uploader() -> Uploader {
        let profile = Profile {
            endpoint: "https://s3.example.com".to_string(),
            bucket: "public".to_string(),
            access_key: "access".to_string(),
            secret_key: "secret".to_string(),
            region: "us-east-1".to_string(),
        };
        Uploader::new(&profile, UploadSettings::default())
    }

    #[tokio::test]
    async fn test_missing_file_maps_to_file_not_found() {
        let uploader = test_uploader();
        let err = uploader
            .upload(Path::new("/no/such/file.bin"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_directory_maps_to_file_not_found() {
        let uploader = test_uploader();
        let dir = tempfile::tempdir().unwrap();
        let err = uploader.upload(dir.path()).await.unwrap_err();
        assert!(matches!(err, UploadError::FileNotFound(_)));
    }

    #[test]
    fn test_keys_are_unique_per_upload() {
        // Two uploads of the same file differ only in the UUID segment.
        let name = "report.pdf";
        let key_a = format!("{}/{}", Uuid::new_v4(), name);
        let key_b = format!("{}/{}", Uuid::new_v4(), name);
        assert_ne!(key_a, key_b);
        assert!(key_a.ends_with("/report.pdf"));
        assert!(key_b.ends_with("/report.pdf"));
    }
}
