//! `lambda://<function>/<path>` transport.
//!
//! Requests are translated into API Gateway HTTP API (payload v2.0) events
//! and sent through the Lambda `Invoke` REST endpoint; the proxy-style
//! payload that comes back is turned into a regular response.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, SET_COOKIE};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};
use url::Url;

use super::{Transport, TransportResponse};
use crate::error::{ErrorKind, QurlError, Result};
use crate::sigv4::{SigV4Signer, Signer, region_from_env, sha256_hex};

const INVOKE_API_VERSION: &str = "2015-03-31";
const FUNCTION_ERROR_HEADER: &str = "x-amz-function-error";

pub struct LambdaTransport {
    http: reqwest::Client,
    signer: Arc<dyn Signer>,
    region: Option<String>,
    endpoint: Option<String>,
}

impl LambdaTransport {
    pub fn new(
        http: reqwest::Client,
        signer: Arc<dyn Signer>,
        region: Option<String>,
        endpoint: Option<String>,
    ) -> Self {
        Self {
            http,
            signer,
            region,
            endpoint,
        }
    }

    /// Region from `AWS_REGION`; endpoint override from
    /// `AWS_ENDPOINT_URL_LAMBDA` or `AWS_ENDPOINT_URL`.
    pub fn from_env(http: reqwest::Client) -> Self {
        let endpoint = std::env::var("AWS_ENDPOINT_URL_LAMBDA")
            .or_else(|_| std::env::var("AWS_ENDPOINT_URL"))
            .ok()
            .filter(|v| !v.trim().is_empty());
        Self::new(
            http,
            Arc::new(SigV4Signer::from_env()),
            region_from_env(),
            endpoint,
        )
    }

    fn invoke_url(&self, function: &str) -> Result<Url> {
        let base = match (&self.endpoint, &self.region) {
            (Some(endpoint), _) => endpoint.trim_end_matches('/').to_string(),
            (None, Some(region)) => format!("https://lambda.{region}.amazonaws.com"),
            (None, None) => {
                return Err(QurlError::config("AWS region required for Lambda invocation")
                    .with_context("function", function)
                    .with_suggestion("Export AWS_REGION, or AWS_ENDPOINT_URL_LAMBDA for a local endpoint"));
            }
        };
        let mut url = Url::parse(&base).map_err(|e| {
            QurlError::config("invalid Lambda endpoint URL")
                .with_source(e)
                .with_context("endpoint", &base)
        })?;
        url.path_segments_mut()
            .map_err(|_| QurlError::config("Lambda endpoint URL cannot have a path").with_context("endpoint", &base))?
            .pop_if_empty()
            .extend([INVOKE_API_VERSION, "functions", function, "invocations"]);
        Ok(url)
    }
}

#[async_trait]
impl Transport for LambdaTransport {
    async fn send(&self, request: reqwest::Request) -> Result<TransportResponse> {
        let function = request
            .url()
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                QurlError::validation("lambda:// URL must name a function")
                    .with_context("url", request.url())
                    .with_suggestion("Use lambda://<function-name>/<path>")
            })?
            .to_string();

        let event = build_invoke_event(&request);
        let payload = serde_json::to_vec(&event)
            .map_err(|e| QurlError::wrap(ErrorKind::Internal, "failed to encode invoke event", e))?;

        let mut invoke = reqwest::Request::new(reqwest::Method::POST, self.invoke_url(&function)?);
        invoke
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let payload_hash = sha256_hex(&payload);
        *invoke.body_mut() = Some(payload.into());
        self.signer
            .sign(&mut invoke, &payload_hash, "lambda", Utc::now())
            .map_err(|e| QurlError::wrap(ErrorKind::Auth, "failed to sign Lambda invoke request", e))?;

        debug!(function = %function, "invoking Lambda function");
        let response = self
            .http
            .execute(invoke)
            .await
            .map_err(|e| QurlError::wrap(ErrorKind::Network, "Lambda invoke request failed", e))?;
        let status = response.status();
        let function_error = response
            .headers()
            .get(FUNCTION_ERROR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| QurlError::wrap(ErrorKind::Network, "failed to read Lambda invoke response", e))?;

        if !status.is_success() {
            return Err(QurlError::network(format!("Lambda Invoke API returned HTTP {status}"))
                .with_context("function", &function)
                .with_context("body", String::from_utf8_lossy(&bytes)));
        }
        if let Some(kind) = function_error {
            warn!(function = %function, kind = %kind, "Lambda function error");
            return Err(QurlError::network(format!("Lambda function error: {kind}"))
                .with_context("function", &function)
                .with_context("payload", String::from_utf8_lossy(&bytes)));
        }

        parse_invoke_payload(&bytes)
    }
}

/// API Gateway HTTP API (v2.0) event for a request.
pub fn build_invoke_event(request: &reqwest::Request) -> Value {
    let url = request.url();
    let path = if url.path().is_empty() { "/" } else { url.path() };
    let raw_query = url.query().unwrap_or_default();

    let mut headers: Map<String, Value> = Map::new();
    for name in request.headers().keys() {
        let joined = request
            .headers()
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(",");
        headers.insert(name.as_str().to_string(), Value::String(joined));
    }

    let mut query: Map<String, Value> = Map::new();
    for (key, value) in url.query_pairs() {
        match query.get_mut(key.as_ref()) {
            Some(Value::String(existing)) => {
                existing.push(',');
                existing.push_str(&value);
            }
            _ => {
                query.insert(key.into_owned(), Value::String(value.into_owned()));
            }
        }
    }

    let (body, is_base64) = match request.body().and_then(|b| b.as_bytes()) {
        None => (Value::Null, false),
        Some(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => (Value::String(text.to_string()), false),
            Err(_) => (Value::String(BASE64.encode(bytes)), true),
        },
    };

    let user_agent = request
        .headers()
        .get(reqwest::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let mut event = json!({
        "version": "2.0",
        "routeKey": "$default",
        "rawPath": path,
        "rawQueryString": raw_query,
        "headers": headers,
        "requestContext": {
            "routeKey": "$default",
            "stage": "$default",
            "timeEpoch": Utc::now().timestamp_millis(),
            "http": {
                "method": request.method().as_str(),
                "path": path,
                "protocol": "HTTP/1.1",
                "sourceIp": "127.0.0.1",
                "userAgent": user_agent
            }
        },
        "isBase64Encoded": is_base64
    });
    if !query.is_empty() {
        event["queryStringParameters"] = Value::Object(query);
    }
    if !body.is_null() {
        event["body"] = body;
    }
    event
}

/// Proxy-style payload (`statusCode`, `headers`, `body`...) to a response.
/// Anything else is returned verbatim as a 200 JSON body.
pub fn parse_invoke_payload(bytes: &[u8]) -> Result<TransportResponse> {
    let parsed: Option<Value> = serde_json::from_slice(bytes).ok();
    let Some(payload) = parsed.as_ref().and_then(Value::as_object) else {
        return Ok(raw_json_response(bytes));
    };
    let Some(status_code) = payload.get("statusCode").and_then(Value::as_u64) else {
        return Ok(raw_json_response(bytes));
    };

    let status = u16::try_from(status_code)
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| {
            QurlError::network("Lambda response has an invalid statusCode")
                .with_context("statusCode", status_code)
        })?;

    let mut headers = HeaderMap::new();
    if let Some(map) = payload.get("headers").and_then(Value::as_object) {
        for (name, value) in map {
            if let Some(value) = scalar_text(value) {
                append_header(&mut headers, name, &value);
            }
        }
    }
    if let Some(map) = payload.get("multiValueHeaders").and_then(Value::as_object) {
        for (name, values) in map {
            for value in values.as_array().into_iter().flatten() {
                if let Some(value) = scalar_text(value) {
                    append_header(&mut headers, name, &value);
                }
            }
        }
    }
    if let Some(cookies) = payload.get("cookies").and_then(Value::as_array) {
        for cookie in cookies.iter().filter_map(Value::as_str) {
            if let Ok(value) = HeaderValue::from_str(cookie) {
                headers.append(SET_COOKIE, value);
            }
        }
    }

    let body = payload
        .get("body")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let is_base64 = payload
        .get("isBase64Encoded")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let body = if is_base64 {
        BASE64.decode(body).map_err(|e| {
            QurlError::wrap(ErrorKind::Network, "Lambda response body is not valid base64", e)
        })?
    } else {
        body.as_bytes().to_vec()
    };

    Ok(TransportResponse::buffered(status, headers, body))
}

fn raw_json_response(bytes: &[u8]) -> TransportResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    TransportResponse::buffered(StatusCode::OK, headers, bytes.to_vec())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn append_header(headers: &mut HeaderMap, name: &str, value: &str) {
    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
    ) {
        headers.append(name, value);
    }
}
