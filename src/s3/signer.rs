//! AWS Signature Version 4 signer
//!
//! Produces the `host`, `x-amz-date`, `x-amz-content-sha256` and
//! `authorization` headers for one HTTP request against an S3-compatible
//! endpoint. Signing is pure given a timestamp; `sign_at` exposes the
//! timestamp for deterministic output.
//!
//! The canonical URI is taken from the request URL verbatim. Percent
//! encoding of object keys happens exactly once, when the URL is built
//! (see `S3Client::object_url`), never inside the signer, so a path can
//! not be double-encoded.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::s3::types::Credentials;

type HmacSha256 = Hmac<Sha256>;

/// Hex lookup table for percent encoding
static HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// SHA-256 of the empty payload, precomputed
const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

/// AWS Signature Version 4 signer
pub struct SignerV4 {
    access_key: String,
    region: String,
    /// Precomputed "AWS4" + secret_key bytes
    aws4_key: Vec<u8>,
    /// Signing key cache per day: (date_stamp, derived_key).
    /// The derived key only changes with the date stamp, so this saves
    /// 4 HMAC operations per request.
    cached_signing_key: Mutex<Option<(String, [u8; 32])>>,
}

impl Clone for SignerV4 {
    fn clone(&self) -> Self {
        Self {
            access_key: self.access_key.clone(),
            region: self.region.clone(),
            aws4_key: self.aws4_key.clone(),
            // Each clone repopulates its own cache on first use
            cached_signing_key: Mutex::new(None),
        }
    }
}

impl SignerV4 {
    /// Create a signer from static credentials
    pub fn new(credentials: &Credentials) -> Self {
        let aws4_key = format!("AWS4{}", credentials.secret_key).into_bytes();
        Self {
            access_key: credentials.access_key.clone(),
            region: credentials.region.clone(),
            aws4_key,
            cached_signing_key: Mutex::new(None),
        }
    }

    /// Sign a request using the current wall-clock time.
    ///
    /// Returns the input headers (lowercase keys) plus `host`,
    /// `x-amz-date`, `x-amz-content-sha256` and `authorization`.
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        headers: BTreeMap<String, String>,
        payload: &[u8],
    ) -> BTreeMap<String, String> {
        self.sign_at(method, url, headers, payload, Utc::now())
    }

    /// Sign a request with an explicit timestamp.
    ///
    /// Output is fully deterministic for fixed inputs, which is what the
    /// reference-vector tests rely on.
    pub fn sign_at(
        &self,
        method: &str,
        url: &str,
        mut headers: BTreeMap<String, String>,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> BTreeMap<String, String> {
        let (host, path, query) = split_url(url);

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();

        let payload_hash = if payload.is_empty() {
            EMPTY_SHA256.to_string()
        } else {
            hex::encode(Sha256::digest(payload))
        };

        // Required headers, lowercase for the canonical form. BTreeMap
        // keeps them sorted by name.
        headers.insert("host".to_string(), host.to_string());
        headers.insert("x-amz-date".to_string(), amz_date.clone());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.clone());

        let canonical_query = canonical_query_string(query);
        let canonical_headers = canonical_header_block(&headers);
        let signed_headers = signed_header_list(&headers);

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, path, canonical_query, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/{}/aws4_request", date_stamp, self.region, SERVICE);
        let canonical_request_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM, amz_date, credential_scope, canonical_request_hash
        );

        let signature = self.calculate_signature(&date_stamp, &string_to_sign);

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.access_key, credential_scope, signed_headers, signature
        );
        headers.insert("authorization".to_string(), authorization);

        headers
    }

    /// Derive the signature, reusing the per-day signing key when possible
    fn calculate_signature(&self, date_stamp: &str, string_to_sign: &str) -> String {
        let signing_key = {
            let mut cache = self.cached_signing_key.lock().unwrap();
            match *cache {
                Some((ref cached_date, ref key)) if cached_date == date_stamp => *key,
                _ => {
                    let key = self.derive_signing_key(date_stamp);
                    *cache = Some((date_stamp.to_string(), key));
                    key
                }
            }
        };

        hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()))
    }

    /// Chained HMAC key derivation: date, region, service, terminator
    fn derive_signing_key(&self, date_stamp: &str) -> [u8; 32] {
        let k_date = hmac_sha256(&self.aws4_key, date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
        hmac_sha256(&k_service, b"aws4_request")
    }
}

/// HMAC-SHA256 returning a fixed-size array
fn hmac_sha256(key: &[u8], msg: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(msg);
    let result = mac.finalize().into_bytes();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Split a URL into (host, path, query) slices without allocating.
///
/// The host drops default ports (:443 for https, :80 for http). A URL
/// whose query starts before any path separator ("https://h?x") yields
/// path "/".
fn split_url(url: &str) -> (&str, &str, &str) {
    let after_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);

    let authority_end = after_scheme
        .find(|c| c == '/' || c == '?')
        .unwrap_or(after_scheme.len());
    let authority = &after_scheme[..authority_end];
    let rest = &after_scheme[authority_end..];

    let (path, query) = if let Some(stripped) = rest.strip_prefix('?') {
        ("/", stripped)
    } else {
        match rest.find('?') {
            Some(pos) => (&rest[..pos], &rest[pos + 1..]),
            None if rest.is_empty() => ("/", ""),
            None => (rest, ""),
        }
    };

    let host = if url.starts_with("https://") {
        authority.strip_suffix(":443").unwrap_or(authority)
    } else {
        authority.strip_suffix(":80").unwrap_or(authority)
    };

    (host, path, query)
}

/// Canonical query string: parameters sorted by key, each rendered as
/// `key=value`. A valueless parameter ("?uploads") normalizes to
/// "uploads=". Keys and values arrive already percent-encoded because
/// every URL is built by this crate; the sort is stable so equal keys
/// keep their original order.
fn canonical_query_string(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let mut params: Vec<(&str, &str)> = query
        .split('&')
        .map(|pair| match pair.find('=') {
            Some(pos) => (&pair[..pos], &pair[pos + 1..]),
            None => (pair, ""),
        })
        .collect();

    params.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = String::with_capacity(query.len() + 8);
    for (i, (k, v)) in params.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(k);
        out.push('=');
        out.push_str(v);
    }
    out
}

/// Canonical header block: `name:value\n` per header, values trimmed.
/// Keys are already lowercase and sorted by the BTreeMap.
fn canonical_header_block(headers: &BTreeMap<String, String>) -> String {
    let mut result = String::with_capacity(headers.len() * 64);
    for (k, v) in headers {
        result.push_str(k);
        result.push(':');
        result.push_str(v.trim());
        result.push('\n');
    }
    result
}

/// Signed header list: `;`-joined sorted lowercase names
fn signed_header_list(headers: &BTreeMap<String, String>) -> String {
    let mut result = String::with_capacity(headers.len() * 20);
    for (i, k) in headers.keys().enumerate() {
        if i > 0 {
            result.push(';');
        }
        result.push_str(k);
    }
    result
}

/// Percent-encode per RFC 3986 with the unreserved set, optionally
/// keeping `/` literal (for slash-delimited object keys).
pub(crate) fn uri_encode_into(buf: &mut String, s: &str, encode_slash: bool) {
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                buf.push(byte as char);
            }
            b'/' if !encode_slash => {
                buf.push('/');
            }
            _ => {
                buf.push('%');
                buf.push(HEX_UPPER[(byte >> 4) as usize] as char);
                buf.push(HEX_UPPER[(byte & 0xf) as usize] as char);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signer() -> SignerV4 {
        SignerV4::new(&Credentials::new(
            "access".to_string(),
            "secret".to_string(),
            "us-east-1".to_string(),
        ))
    }

    #[test]
    fn test_split_url() {
        assert_eq!(
            split_url("https://s3.example.com/bucket/key"),
            ("s3.example.com", "/bucket/key", "")
        );
        assert_eq!(
            split_url("https://s3.example.com:443/bucket/key?uploads"),
            ("s3.example.com", "/bucket/key", "uploads")
        );
        assert_eq!(
            split_url("http://localhost:9000/b/k?partNumber=1&uploadId=x"),
            ("localhost:9000", "/b/k", "partNumber=1&uploadId=x")
        );
        assert_eq!(split_url("https://host.example"), ("host.example", "/", ""));
        assert_eq!(
            split_url("https://host.example?lifecycle"),
            ("host.example", "/", "lifecycle")
        );
    }

    #[test]
    fn test_canonical_query_string() {
        assert_eq!(canonical_query_string(""), "");
        assert_eq!(canonical_query_string("uploads"), "uploads=");
        assert_eq!(
            canonical_query_string("uploadId=abc&partNumber=3"),
            "partNumber=3&uploadId=abc"
        );
        assert_eq!(
            canonical_query_string("partNumber=3&uploadId=a%2Fb"),
            "partNumber=3&uploadId=a%2Fb"
        );
    }

    #[test]
    fn test_uri_encode() {
        let mut buf = String::new();
        uri_encode_into(&mut buf, "hello world", true);
        assert_eq!(buf, "hello%20world");

        let mut buf = String::new();
        uri_encode_into(&mut buf, "a/b c", false);
        assert_eq!(buf, "a/b%20c");

        let mut buf = String::new();
        uri_encode_into(&mut buf, "test$file.text", true);
        assert_eq!(buf, "test%24file.text");
    }

    #[test]
    fn test_empty_sha256_constant() {
        assert_eq!(EMPTY_SHA256, hex::encode(Sha256::digest(b"")));
    }

    #[test]
    fn test_signing_key_cache() {
        let signer = test_signer();

        let sig1 = signer.calculate_signature("20260101", "payload");
        let sig2 = signer.calculate_signature("20260101", "payload");
        assert_eq!(sig1, sig2);

        let sig3 = signer.calculate_signature("20260102", "payload");
        assert_ne!(sig1, sig3);
    }

    #[test]
    fn test_sign_adds_required_headers() {
        let signer = test_signer();
        let headers = signer.sign(
            "PUT",
            "https://s3.example.com/bucket/key",
            BTreeMap::new(),
            b"body",
        );

        assert_eq!(headers.get("host").unwrap(), "s3.example.com");
        assert!(headers.contains_key("x-amz-date"));
        assert_eq!(
            headers.get("x-amz-content-sha256").unwrap(),
            &hex::encode(Sha256::digest(b"body"))
        );
        let auth = headers.get("authorization").unwrap();
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=access/"));
        assert!(auth.contains("SignedHeaders=host;x-amz-content-sha256;x-amz-date"));
    }

    #[test]
    fn test_signed_header_list_matches_canonical_block() {
        let signer = test_signer();
        let mut extra = BTreeMap::new();
        extra.insert("content-type".to_string(), "image/png".to_string());
        extra.insert("content-length".to_string(), "4".to_string());

        let headers = signer.sign("PUT", "https://s3.example.com/b/k", extra, b"data");
        let auth = headers.get("authorization").unwrap();
        assert!(auth.contains(
            "SignedHeaders=content-length;content-type;host;x-amz-content-sha256;x-amz-date"
        ));
    }
}
