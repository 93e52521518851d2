//! HTTP client for the S3 wire protocol
//!
//! Carries exactly the five operations the upload pipeline needs: simple
//! PUT, initiate multipart, upload part, complete multipart, abort
//! multipart. Each operation sends one signed request; there are no
//! retries, so a failure surfaces to the caller on the first non-2xx
//! response.

use crate::s3::signer::{self, SignerV4};
use crate::s3::types::{Credentials, InitiateMultipartResponse, PartRecord};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::HeaderMap;
use hyper::{Method, Request, StatusCode};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the upload pipeline
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("S3 error: {status} - {body}")]
    Transport { status: StatusCode, body: String },

    #[error("protocol error: {0}")]
    ProtocolParse(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::http::Error),

    #[error("Hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("client error: {0}")]
    Client(String),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hyper_util::client::legacy::Error> for UploadError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        UploadError::Client(err.to_string())
    }
}

impl From<quick_xml::Error> for UploadError {
    fn from(err: quick_xml::Error) -> Self {
        UploadError::XmlParse(err.to_string())
    }
}

impl UploadError {
    /// Stable machine-readable name for the error kind, used by the
    /// tool front-end's structured error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::FileNotFound(_) => "file_not_found",
            UploadError::Transport { .. } => "transport_failure",
            UploadError::ProtocolParse(_) => "protocol_parse_error",
            UploadError::InvalidInput(_) => "invalid_input",
            UploadError::Http(_) | UploadError::Hyper(_) | UploadError::Client(_) => "http_error",
            UploadError::XmlParse(_) => "protocol_parse_error",
            UploadError::Io(_) => "io_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, UploadError>;

/// S3 client bound to one endpoint and bucket.
///
/// Clone is cheap; clones share the underlying HTTP connection pool.
#[derive(Clone)]
pub struct S3Client {
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    signer: SignerV4,
    endpoint: String,
    bucket: String,
}

impl S3Client {
    /// Create a client for `endpoint` (scheme://host) and `bucket`.
    ///
    /// TCP settings follow common S3 client practice: TCP_NODELAY, a
    /// 10s connect timeout and 90s keepalive, with idle connections
    /// pooled for reuse across sequential part uploads.
    pub fn new(endpoint: &str, bucket: &str, credentials: &Credentials) -> Self {
        let insecure_tls = std::env::var("S3SEND_INSECURE_TLS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(10)));
        http.set_keepalive(Some(Duration::from_secs(90)));

        let tls = if insecure_tls {
            tracing::warn!("INSECURE TLS MODE ENABLED: certificate verification is disabled");
            TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .expect("failed to build TLS connector")
        } else {
            TlsConnector::new().expect("failed to build TLS connector")
        };

        let https = HttpsConnector::from((http, tls.into()));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .set_host(true)
            .build(https);

        let signer = SignerV4::new(credentials);

        Self {
            client,
            signer,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
        }
    }

    /// Public URL of an object, `{endpoint}/{bucket}/{encoded_key}`.
    ///
    /// This is both the address the upload requests go to and the URL
    /// handed back to the caller on success. The key is percent-encoded
    /// here, once; the signer consumes the path verbatim.
    pub fn object_url(&self, key: &str) -> String {
        let encoded_key = Self::encode_key(key);
        let mut url = String::with_capacity(
            self.endpoint.len() + 1 + self.bucket.len() + 1 + encoded_key.len(),
        );
        url.push_str(&self.endpoint);
        url.push('/');
        url.push_str(&self.bucket);
        url.push('/');
        url.push_str(&encoded_key);
        url
    }

    /// Encode an object key, preserving forward slashes.
    /// Borrows when no encoding is needed (the common case).
    fn encode_key(key: &str) -> Cow<'_, str> {
        let needs_encoding = key.bytes().any(
            |b| !matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/'),
        );

        if !needs_encoding {
            return Cow::Borrowed(key);
        }

        let mut result = String::with_capacity(key.len() + 32);
        signer::uri_encode_into(&mut result, key, false);
        Cow::Owned(result)
    }

    /// Send one signed request and collect the full response.
    ///
    /// Returns status, headers and body regardless of the status class;
    /// callers decide what a non-2xx means for their step.
    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: BTreeMap<String, String>,
        body: Bytes,
    ) -> Result<(StatusCode, HeaderMap, Bytes)> {
        let signed_headers = self.signer.sign(method.as_str(), url, headers, &body);

        let mut req = Request::builder().method(method).uri(url);
        for (key, value) in signed_headers.iter() {
            req = req.header(key, value);
        }

        let request = req.body(Full::new(body))?;
        let response = self.client.request(request).await?;

        let status = response.status();
        let resp_headers = response.headers().clone();
        let body_bytes = response.collect().await?.to_bytes();

        Ok((status, resp_headers, body_bytes))
    }

    fn transport_error(status: StatusCode, body: &[u8]) -> UploadError {
        UploadError::Transport {
            status,
            body: String::from_utf8_lossy(body).to_string(),
        }
    }

    /// Upload a whole object with a single PUT
    pub async fn put_object(&self, key: &str, data: Bytes, content_type: &str) -> Result<()> {
        let url = self.object_url(key);

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        headers.insert("content-length".to_string(), data.len().to_string());

        let (status, _, body) = self.send(Method::PUT, &url, headers, data).await?;

        if !status.is_success() {
            return Err(Self::transport_error(status, &body));
        }

        Ok(())
    }

    /// Initiate a multipart upload, returning the server-issued upload ID
    pub async fn create_multipart_upload(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<InitiateMultipartResponse> {
        let url = format!("{}?uploads", self.object_url(key));

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());

        let (status, _, body) = self.send(Method::POST, &url, headers, Bytes::new()).await?;

        if !status.is_success() {
            return Err(Self::transport_error(status, &body));
        }

        parse_initiate_response(&body)
    }

    /// Upload one part. Requires a non-empty ETag in the response.
    pub async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<PartRecord> {
        let url = self.part_url(key, upload_id, part_number);

        let mut headers = BTreeMap::new();
        headers.insert("content-length".to_string(), data.len().to_string());

        let (status, resp_headers, body) = self.send(Method::PUT, &url, headers, data).await?;

        if !status.is_success() {
            return Err(Self::transport_error(status, &body));
        }

        let etag = resp_headers
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                UploadError::ProtocolParse(format!("no ETag returned for part {}", part_number))
            })?;

        Ok(PartRecord::new(part_number, etag))
    }

    /// Complete a multipart upload from the accumulated part records,
    /// which must already be in ascending part-number order.
    pub async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartRecord],
    ) -> Result<()> {
        let url = self.upload_url(key, upload_id);
        let xml_bytes = complete_upload_xml(parts).into_bytes();

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/xml".to_string());
        headers.insert("content-length".to_string(), xml_bytes.len().to_string());

        let (status, _, body) = self
            .send(Method::POST, &url, headers, Bytes::from(xml_bytes))
            .await?;

        if !status.is_success() {
            return Err(Self::transport_error(status, &body));
        }

        Ok(())
    }

    /// Abort a multipart upload, deleting any parts the store kept
    pub async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        let url = self.upload_url(key, upload_id);

        let (status, _, body) = self
            .send(Method::DELETE, &url, BTreeMap::new(), Bytes::new())
            .await?;

        if !status.is_success() {
            return Err(Self::transport_error(status, &body));
        }

        Ok(())
    }

    /// `{object_url}?partNumber=N&uploadId=ID`
    fn part_url(&self, key: &str, upload_id: &str, part_number: u32) -> String {
        let base = self.object_url(key);
        let mut url = String::with_capacity(base.len() + 64);
        url.push_str(&base);
        url.push_str("?partNumber=");
        let _ = write!(url, "{}", part_number);
        url.push_str("&uploadId=");
        signer::uri_encode_into(&mut url, upload_id, true);
        url
    }

    /// `{object_url}?uploadId=ID`
    fn upload_url(&self, key: &str, upload_id: &str) -> String {
        let base = self.object_url(key);
        let mut url = String::with_capacity(base.len() + 64);
        url.push_str(&base);
        url.push_str("?uploadId=");
        signer::uri_encode_into(&mut url, upload_id, true);
        url
    }
}

/// Parse an InitiateMultipartUpload response body
fn parse_initiate_response(xml_data: &[u8]) -> Result<InitiateMultipartResponse> {
    let mut reader = Reader::from_reader(xml_data);
    reader.config_mut().trim_text_start = true;
    reader.config_mut().trim_text_end = true;

    let mut bucket = String::new();
    let mut key = String::new();
    let mut upload_id = String::new();
    let mut current_text = String::with_capacity(256);

    loop {
        match reader.read_event() {
            Ok(Event::Text(e)) => {
                current_text.clear();
                current_text.push_str(&e.unescape()?);
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"Bucket" => bucket = std::mem::take(&mut current_text),
                    b"Key" => key = std::mem::take(&mut current_text),
                    b"UploadId" => upload_id = std::mem::take(&mut current_text),
                    _ => {}
                }
                current_text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(UploadError::XmlParse(e.to_string())),
            _ => {}
        }
    }

    if upload_id.is_empty() {
        return Err(UploadError::ProtocolParse(
            "missing UploadId in InitiateMultipartUpload response".to_string(),
        ));
    }

    Ok(InitiateMultipartResponse {
        bucket,
        key,
        upload_id,
    })
}

/// Render the CompleteMultipartUpload body. ETags are opaque and go in
/// verbatim, exactly as the store returned them.
fn complete_upload_xml(parts: &[PartRecord]) -> String {
    let mut xml = String::with_capacity(parts.len() * 100 + 80);
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    xml.push_str("<CompleteMultipartUpload>");
    for part in parts {
        xml.push_str("<Part><PartNumber>");
        let _ = write!(xml, "{}", part.part_number);
        xml.push_str("</PartNumber><ETag>");
        xml.push_str(&part.etag);
        xml.push_str("</ETag></Part>");
    }
    xml.push_str("</CompleteMultipartUpload>");
    xml
}
