//! Tool-invocation front-end
//!
//! Newline-delimited JSON over stdio. Each request line carries
//! `{"file": "<path>"}` and optionally an `"id"` that is echoed back.
//! Success answers `{"url": "..."}`, failure answers a structured
//! `{"error": {"kind": "...", "message": "..."}}`; the process keeps
//! serving either way. All upload logic lives in the shared core, this
//! layer only translates envelopes.

use crate::upload::Uploader;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

#[derive(Debug, Deserialize)]
struct ToolRequest {
    #[serde(default)]
    id: Option<Value>,
    file: Option<PathBuf>,
}

/// Serve upload requests from stdin until EOF
pub async fn run(uploader: &Uploader) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = tokio::io::stdout();

    info!("tool server ready");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_request(uploader, &line).await;

        let mut out = response.to_string();
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }

    Ok(())
}

/// Process one request line into a response value
async fn handle_request(uploader: &Uploader, line: &str) -> Value {
    let request: ToolRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => {
            return error_response(None, "invalid_request", &format!("malformed JSON: {}", err));
        }
    };

    let Some(file) = request.file else {
        return error_response(request.id, "invalid_request", "missing required field: file");
    };

    match uploader.upload(&file).await {
        Ok(url) => {
            let mut response = json!({ "url": url });
            if let Some(id) = request.id {
                response["id"] = id;
            }
            response
        }
        Err(err) => error_response(request.id, err.kind(), &err.to_string()),
    }
}

fn error_response(id: Option<Value>, kind: &str, message: &str) -> Value {
    let mut response = json!({
        "error": {
            "kind": kind,
            "message": message,
        }
    });
    if let Some(id) = id {
        response["id"] = id;
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::s3::UploadSettings;

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
    async fn test_malformed_json_is_an_error_response() {
        let response = handle_request(&test_uploader(), "{not json").await;
        assert_eq!(response["error"]["kind"], "invalid_request");
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let response = handle_request(&test_uploader(), r#"{"id": 7}"#).await;
        assert_eq!(response["error"]["kind"], "invalid_request");
        assert_eq!(response["id"], 7);
    }

    #[tokio::test]
    async fn test_missing_file_on_disk() {
        let response =
            handle_request(&test_uploader(), r#"{"file": "/no/such/file.png"}"#).await;
        assert_eq!(response["error"]["kind"], "file_not_found");
        assert!(response["error"]["message"]
            .as_str()
            .unwrap()
            .contains("file not found"));
    }
}
