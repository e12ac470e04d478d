use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::config::RequestConfig;
use crate::error::{ErrorKind, QurlError, Result};
use crate::openapi::SpecProvider;

/// Turns a path (or absolute URL) plus configuration into the target URL.
#[derive(Clone, Default)]
pub struct UrlResolver {
    spec: Option<Arc<dyn SpecProvider>>,
}

impl UrlResolver {
    pub fn new(spec: Option<Arc<dyn SpecProvider>>) -> Self {
        Self { spec }
    }

    /// Absolute URLs bypass server resolution entirely. Otherwise the base
    /// comes from, in order: the explicit server (URL or index), the spec's
    /// base URL. No base at all is a configuration error.
    pub async fn resolve(&self, path: &str, config: &RequestConfig) -> Result<Url> {
        if let Some(url) = parse_absolute(path)? {
            debug!(url = %url, "absolute URL, skipping server resolution");
            return Ok(url);
        }

        let base = self.base_url(config).await?;
        let url = join_base_and_path(&base, path)?;
        debug!(base = %base, path, url = %url, "resolved target URL");
        Ok(url)
    }

    async fn base_url(&self, config: &RequestConfig) -> Result<String> {
        match config.server() {
            Some(server) => match server_index(server) {
                Some(index) => self.indexed_server(index).await,
                None => self.explicit_server(server).await,
            },
            None => match &self.spec {
                Some(spec) => spec.base_url().await.map_err(|e| {
                    QurlError::wrap(
                        ErrorKind::OpenApi,
                        "could not determine a base URL from the OpenAPI document",
                        e,
                    )
                }),
                None => Err(QurlError::config("no server URL available")
                    .with_suggestion("Pass --server <url> or --openapi <spec-url>, or use an absolute URL")),
            },
        }
    }

    async fn indexed_server(&self, index: usize) -> Result<String> {
        let spec = self.spec.as_ref().ok_or_else(|| {
            QurlError::validation("server index requires an OpenAPI document")
                .with_context("server", index)
                .with_suggestion("Pass --openapi <spec-url> or a full --server URL")
        })?;
        let servers = spec.servers().await?;
        let server = servers.get(index).ok_or_else(|| {
            let available = if servers.is_empty() {
                "none".to_string()
            } else {
                format!("0-{}", servers.len() - 1)
            };
            QurlError::validation(format!("server index {index} is out of range"))
                .with_context("server", index)
                .with_context("available", available)
        })?;

        if !server.is_empty() && !is_absolute(server) {
            return spec.resolve_server(server).await;
        }
        Ok(server.clone())
    }

    async fn explicit_server(&self, server: &str) -> Result<String> {
        let has_scheme = server.contains("://")
            || server.starts_with("http://")
            || server.starts_with("https://");
        if !has_scheme {
            if let Some(spec) = &self.spec {
                debug!(server, "relative server, anchoring to the OpenAPI base URL");
                return spec.base_url().await.map_err(|e| {
                    QurlError::wrap(
                        ErrorKind::OpenApi,
                        "could not determine a base URL from the OpenAPI document",
                        e,
                    )
                });
            }
        }
        if !is_absolute(server) {
            return Err(QurlError::validation("server URL must be complete")
                .with_context("server", server)
                .with_suggestion("Use a full URL such as https://api.example.com"));
        }
        Ok(server.to_string())
    }
}

/// A single ASCII digit selects a server by index.
fn server_index(server: &str) -> Option<usize> {
    let bytes = server.as_bytes();
    if bytes.len() == 1 && bytes[0].is_ascii_digit() {
        Some(usize::from(bytes[0] - b'0'))
    } else {
        None
    }
}

fn is_absolute(raw: &str) -> bool {
    Url::parse(raw)
        .map(|u| !u.scheme().is_empty() && u.host_str().is_some_and(|h| !h.is_empty()))
        .unwrap_or(false)
}

fn parse_absolute(path: &str) -> Result<Option<Url>> {
    match Url::parse(path) {
        Ok(url) if url.host_str().is_some_and(|h| !h.is_empty()) => Ok(Some(url)),
        Ok(_) | Err(url::ParseError::RelativeUrlWithoutBase) => Ok(None),
        Err(e) if path.contains("://") => Err(QurlError::validation("malformed URL")
            .with_source(e)
            .with_context("path", path)),
        Err(_) => Ok(None),
    }
}

/// `path` gets a leading slash; a base path other than `/` is kept as a
/// prefix. The base's query string survives.
pub fn join_base_and_path(base: &str, path: &str) -> Result<Url> {
    let mut url = Url::parse(base).map_err(|e| {
        QurlError::validation("malformed server URL")
            .with_source(e)
            .with_context("server", base)
    })?;
    if url.cannot_be_a_base() {
        return Err(QurlError::validation("server URL cannot be used as a base")
            .with_context("server", base));
    }

    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let base_path = url.path();
    let joined = if !base_path.is_empty() && base_path != "/" {
        format!("{}{}", base_path.trim_end_matches('/'), path)
    } else {
        path
    };
    url.set_path(&joined);
    Ok(url)
}
