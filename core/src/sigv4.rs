//! AWS Signature Version 4 request signing.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{QurlError, Result};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Hex SHA-256 of an empty payload.
pub const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Hex SHA-256 digest.
pub fn sha256_hex(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and the optional
    /// `AWS_SESSION_TOKEN`.
    pub fn from_env() -> Option<Self> {
        let access_key_id = non_empty_env("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = non_empty_env("AWS_SECRET_ACCESS_KEY")?;
        Some(Self {
            access_key_id,
            secret_access_key,
            session_token: non_empty_env("AWS_SESSION_TOKEN"),
        })
    }
}

/// `AWS_REGION`, falling back to `AWS_DEFAULT_REGION`.
pub fn region_from_env() -> Option<String> {
    non_empty_env("AWS_REGION").or_else(|| non_empty_env("AWS_DEFAULT_REGION"))
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Adds signature material to a request's headers.
pub trait Signer: Send + Sync {
    fn sign(
        &self,
        request: &mut reqwest::Request,
        payload_hash: &str,
        service: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()>;
}

/// SigV4 signer holding whatever credentials and region were available
/// when it was built; missing pieces surface as auth errors at sign time.
#[derive(Debug, Clone, Default)]
pub struct SigV4Signer {
    credentials: Option<Credentials>,
    region: Option<String>,
}

impl SigV4Signer {
    pub fn new(credentials: Credentials, region: impl Into<String>) -> Self {
        Self {
            credentials: Some(credentials),
            region: Some(region.into()),
        }
    }

    pub fn from_env() -> Self {
        Self {
            credentials: Credentials::from_env(),
            region: region_from_env(),
        }
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    fn require(&self) -> Result<(&Credentials, &str)> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            QurlError::auth("AWS credentials not found")
                .with_context("missing", "AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY")
                .with_suggestion(
                    "Export AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY (and AWS_SESSION_TOKEN for temporary credentials)",
                )
        })?;
        let region = self.region.as_deref().ok_or_else(|| {
            QurlError::auth("AWS region not configured")
                .with_context("missing", "AWS_REGION")
                .with_suggestion("Export AWS_REGION (or AWS_DEFAULT_REGION), e.g. AWS_REGION=us-east-1")
        })?;
        Ok((credentials, region))
    }
}

impl Signer for SigV4Signer {
    fn sign(
        &self,
        request: &mut reqwest::Request,
        payload_hash: &str,
        service: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let (credentials, region) = self.require()?;
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = timestamp.format("%Y%m%d").to_string();

        set_header(request, "x-amz-date", &amz_date)?;
        set_header(request, "x-amz-content-sha256", payload_hash)?;
        if let Some(token) = &credentials.session_token {
            set_header(request, "x-amz-security-token", token)?;
        }

        let (canonical_headers, signed_headers) = canonical_headers(request);
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            request.method().as_str(),
            canonical_uri(request.url(), service),
            canonical_query(request.url()),
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{date_stamp}/{region}/{service}/aws4_request");
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{credential_scope}\n{}",
            sha256_hex(canonical_request.as_bytes())
        );

        let signing_key =
            derive_signing_key(&credentials.secret_access_key, &date_stamp, region, service)?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        let authorization = format!(
            "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        );
        set_header(request, "authorization", &authorization)?;

        debug!(service, region, signed_headers = %signed_headers, "signed request with SigV4");
        Ok(())
    }
}

fn set_header(request: &mut reqwest::Request, name: &'static str, value: &str) -> Result<()> {
    let value = HeaderValue::from_str(value).map_err(|e| {
        QurlError::auth(format!("cannot encode {name} header"))
            .with_source(e)
    })?;
    request
        .headers_mut()
        .insert(HeaderName::from_static(name), value);
    Ok(())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| QurlError::internal(format!("HMAC key rejected: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub(crate) fn derive_signing_key(
    secret: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding with the SigV4 unreserved set.
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Every service except S3 expects the already-encoded path encoded again.
fn canonical_uri(url: &url::Url, service: &str) -> String {
    let path = url.path();
    if path.is_empty() {
        return "/".to_string();
    }
    if service == "s3" {
        return path.to_string();
    }
    uri_encode(path, false)
}

fn canonical_query(url: &url::Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k, true), uri_encode(&v, true)))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Signs `host`, `content-type` when present, and every `x-amz-*` header.
fn canonical_headers(request: &reqwest::Request) -> (String, String) {
    let url = request.url();
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => String::new(),
    };

    let mut entries: Vec<(String, String)> = vec![("host".to_string(), host)];
    for (name, value) in request.headers() {
        let name = name.as_str();
        if name == "content-type" || name.starts_with("x-amz-") {
            let value = value.to_str().unwrap_or_default();
            entries.push((name.to_string(), collapse_whitespace(value)));
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical = entries
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect::<String>();
    let signed = entries
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");
    (canonical, signed)
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
