//! Multipart upload session
//!
//! One session drives exactly one upload attempt through the protocol:
//! initiate, sequential part uploads, then complete. Any failure after a
//! successful initiate triggers a best-effort abort before the original
//! error is handed back unchanged. There is no way back to the start; a
//! new attempt means a new session.

use crate::s3::{PartRecord, Result, S3Client};
use crate::upload::chunk;
use crate::upload::planner;
use std::path::Path;
use tracing::{info, warn};

/// State for one in-flight multipart upload
pub struct MultipartSession<'a> {
    client: &'a S3Client,
    key: &'a str,
    upload_id: String,
    parts: Vec<PartRecord>,
}

impl<'a> MultipartSession<'a> {
    /// Issue the initiate call and return a live session.
    ///
    /// A missing UploadId in the response body fails here; nothing needs
    /// aborting yet since the store never acknowledged the upload.
    pub async fn initiate(client: &'a S3Client, key: &'a str, content_type: &str) -> Result<Self> {
        let response = client.create_multipart_upload(key, content_type).await?;
        info!(upload_id = %response.upload_id, key = %key, "multipart upload initiated");

        Ok(Self {
            client,
            key,
            upload_id: response.upload_id,
            parts: Vec::new(),
        })
    }

    /// Server-issued ID binding all calls of this session
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    /// Part records accumulated so far, ascending and contiguous
    pub fn parts(&self) -> &[PartRecord] {
        &self.parts
    }

    /// Upload every part in ascending order, then complete.
    ///
    /// Strictly sequential: part N+1 is not read from disk before part
    /// N's PUT has returned. Each record is appended only after the store
    /// acknowledged the part with a non-empty ETag.
    async fn drive(&mut self, path: &Path, file_size: u64, part_size: u64) -> Result<()> {
        let total_parts = planner::part_count(file_size, part_size);

        for part_number in 1..=total_parts {
            let (start, length) = planner::part_range(part_number, part_size, file_size);
            let data = chunk::read_chunk(path, start, length).await?;

            info!(part = part_number, total = total_parts, "uploading part");

            let record = self
                .client
                .upload_part(self.key, &self.upload_id, part_number as u32, data)
                .await?;
            self.parts.push(record);
        }

        self.client
            .complete_multipart_upload(self.key, &self.upload_id, &self.parts)
            .await
    }

    /// Best-effort abort. Its own failure is logged and swallowed so the
    /// error that broke the upload is the one the caller sees.
    async fn abort(&self) {
        if let Err(err) = self
            .client
            .abort_multipart_upload(self.key, &self.upload_id)
            .await
        {
            warn!(upload_id = %self.upload_id, error = %err, "abort of multipart upload failed");
        }
    }

    /// Run a whole multipart upload for `path`.
    ///
    /// On any failure after initiate the session aborts and re-raises the
    /// triggering error unchanged.
    pub async fn run(
        client: &'a S3Client,
        path: &Path,
        file_size: u64,
        key: &'a str,
        content_type: &str,
        part_size: u64,
    ) -> Result<()> {
        info!(
            size_mib = file_size / (1024 * 1024),
            key = %key,
            "multipart upload"
        );

        let mut session = Self::initiate(client, key, content_type).await?;

        if let Err(err) = session.drive(path, file_size, part_size).await {
            session.abort().await;
            return Err(err);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s3::types::PartRecord;

    #[test]
    fn test_part_records_stay_ordered() {
        // Sequential appends keep part numbers contiguous from 1.
        let mut parts: Vec<PartRecord> = Vec::new();
        for n in 1..=5u32 {
            parts.push(PartRecord::new(n, format!("\"etag-{}\"", n)));
        }

        for (idx, part) in parts.iter().enumerate() {
            assert_eq!(part.part_number, idx as u32 + 1);
            assert!(!part.etag.is_empty());
        }
    }
}
