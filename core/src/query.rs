//! Query-parameter and header list utilities.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::error::{QurlError, Result};

/// Splits `key=value`; a missing `=` yields an empty value.
pub fn parse_query_param(raw: &str) -> (&str, &str) {
    raw.split_once('=').unwrap_or((raw, ""))
}

/// Splits `Name: Value`, trimming both sides; a missing colon yields an empty value.
pub fn parse_header(raw: &str) -> (&str, &str) {
    match raw.split_once(':') {
        Some((name, value)) => (name.trim(), value.trim()),
        None => (raw.trim(), ""),
    }
}

/// Appends every `key=value` pair to the URL's query. Repeated keys
/// accumulate. An empty list leaves the URL untouched.
pub fn apply_query_parameters(url: &Url, params: &[String]) -> Url {
    let mut url = url.clone();
    if params.is_empty() {
        return url;
    }
    {
        let mut pairs = url.query_pairs_mut();
        for raw in params {
            let (key, value) = parse_query_param(raw);
            pairs.append_pair(key, value);
        }
    }
    url
}

/// Sets every `Name: Value` header, replacing any value already present.
pub fn apply_headers(headers: &mut HeaderMap, raw_headers: &[String]) -> Result<()> {
    for raw in raw_headers {
        let (name, value) = parse_header(raw);
        let (name, value) = header_pair(name, value)?;
        headers.insert(name, value);
    }
    Ok(())
}

pub fn header_pair(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
        QurlError::validation(format!("invalid header name '{name}'"))
            .with_source(e)
            .with_context("header", name)
            .with_suggestion("Headers use the form 'Name: Value', e.g. -H 'Accept: application/json'")
    })?;
    let header_value = HeaderValue::from_str(value).map_err(|e| {
        QurlError::validation(format!("invalid value for header '{name}'"))
            .with_source(e)
            .with_context("header", name)
    })?;
    Ok((header_name, header_value))
}
