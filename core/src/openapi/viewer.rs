use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderValue};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use super::SpecProvider;
use super::document::OpenApiDocument;
use super::render::render_view;
use crate::error::{QurlError, Result};

/// Where the OpenAPI document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecSource {
    Remote(Url),
    File(PathBuf),
}

impl SpecSource {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(QurlError::config("OpenAPI location must not be empty"));
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            let url = Url::parse(raw).map_err(|e| {
                QurlError::validation("invalid OpenAPI URL")
                    .with_source(e)
                    .with_context("openapi", raw)
            })?;
            return Ok(SpecSource::Remote(url));
        }
        if let Some(path) = raw.strip_prefix("file://") {
            return Ok(SpecSource::File(PathBuf::from(path)));
        }
        Ok(SpecSource::File(PathBuf::from(raw)))
    }

    /// `scheme://host[:port]` of a remote spec.
    pub fn origin(&self) -> Option<String> {
        match self {
            SpecSource::Remote(url) => {
                let origin = url.origin();
                origin.is_tuple().then(|| origin.ascii_serialization())
            }
            SpecSource::File(_) => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            SpecSource::Remote(url) => url.to_string(),
            SpecSource::File(path) => path.display().to_string(),
        }
    }
}

/// Spec provider backed by an OpenAPI document, loaded on first use and
/// reused for the lifetime of the viewer.
pub struct OpenApiViewer {
    source: SpecSource,
    http: reqwest::Client,
    document: OnceCell<OpenApiDocument>,
}

impl OpenApiViewer {
    pub fn new(source: SpecSource) -> Self {
        Self::with_client(source, reqwest::Client::new())
    }

    pub fn with_client(source: SpecSource, http: reqwest::Client) -> Self {
        Self {
            source,
            http,
            document: OnceCell::new(),
        }
    }

    pub fn from_location(location: &str) -> Result<Self> {
        Ok(Self::new(SpecSource::parse(location)?))
    }

    /// Builds a viewer around an already-parsed document.
    pub fn from_document(source: SpecSource, document: OpenApiDocument) -> Self {
        Self {
            source,
            http: reqwest::Client::new(),
            document: OnceCell::new_with(Some(document)),
        }
    }

    pub fn source(&self) -> &SpecSource {
        &self.source
    }

    pub async fn document(&self) -> Result<&OpenApiDocument> {
        self.document.get_or_try_init(|| self.load()).await
    }

    async fn load(&self) -> Result<OpenApiDocument> {
        let text = match &self.source {
            SpecSource::Remote(url) => self.fetch(url).await?,
            SpecSource::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                QurlError::openapi("failed to read OpenAPI file")
                    .with_source(e)
                    .with_context("openapi", path.display())
            })?,
        };
        let document = OpenApiDocument::parse(&text)
            .map_err(|e| e.with_context("openapi", self.source.display()))?;
        info!(
            source = %self.source.display(),
            title = document.title().unwrap_or_default(),
            "loaded OpenAPI document"
        );
        Ok(document)
    }

    async fn fetch(&self, url: &Url) -> Result<String> {
        debug!(url = %url, "fetching OpenAPI document");
        let response = self.http.get(url.clone()).send().await.map_err(|e| {
            QurlError::openapi("failed to fetch OpenAPI document")
                .with_source(e)
                .with_context("openapi", url)
                .with_suggestion("Check that the --openapi URL is reachable")
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(
                QurlError::openapi(format!("OpenAPI document request returned HTTP {status}"))
                    .with_context("openapi", url),
            );
        }
        response.text().await.map_err(|e| {
            QurlError::openapi("failed to read OpenAPI document body")
                .with_source(e)
                .with_context("openapi", url)
        })
    }

    fn anchor_to_origin(&self, server: &str) -> Option<String> {
        let origin = self.source.origin()?;
        if server.is_empty() || server == "/" {
            return Some(origin);
        }
        Some(format!(
            "{}/{}",
            origin,
            server.trim_start_matches('/').trim_end_matches('/')
        ))
    }
}

fn is_absolute(url: &str) -> bool {
    Url::parse(url)
        .map(|u| !u.scheme().is_empty() && u.host_str().is_some_and(|h| !h.is_empty()))
        .unwrap_or(false)
}

/// Path part of whatever the user typed: absolute URLs lose their origin,
/// query strings are dropped.
fn lookup_path(path: &str) -> String {
    let path = match Url::parse(path) {
        Ok(url) if url.has_host() => url.path().to_string(),
        _ => path.to_string(),
    };
    let path = path.split(['?', '#']).next().unwrap_or_default();
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

#[async_trait]
impl SpecProvider for OpenApiViewer {
    async fn base_url(&self) -> Result<String> {
        let document = self.document().await?;
        if let Some(first) = document.servers().first() {
            if is_absolute(first) {
                return Ok(first.clone());
            }
            if let Some(anchored) = self.anchor_to_origin(first) {
                return Ok(anchored);
            }
        }
        self.source.origin().ok_or_else(|| {
            QurlError::openapi("OpenAPI document declares no usable server URL")
                .with_context("openapi", self.source.display())
                .with_suggestion("Add an absolute URL to the document's servers, or pass --server")
        })
    }

    async fn servers(&self) -> Result<Vec<String>> {
        Ok(self.document().await?.servers())
    }

    async fn resolve_server(&self, server: &str) -> Result<String> {
        if is_absolute(server) {
            return Ok(server.to_string());
        }
        self.anchor_to_origin(server).ok_or_else(|| {
            QurlError::openapi("relative server URL cannot be resolved without a remote OpenAPI URL")
                .with_context("server", server)
                .with_suggestion("Pass an absolute --server URL")
        })
    }

    async fn set_headers(
        &self,
        request: &mut reqwest::Request,
        path: &str,
        method: &str,
    ) -> Result<()> {
        let document = self.document().await?;
        let path = lookup_path(path);
        let method = method.trim().to_uppercase();
        let operations = document.operations();
        let Some(operation) = operations
            .iter()
            .filter(|op| op.method == method)
            .find(|op| op.path == path || op.matches_path(&path))
        else {
            debug!(path = %path, method = %method, "no matching operation for header hints");
            return Ok(());
        };

        let accept = operation.accept_content_types();
        if accept.is_empty() {
            return Ok(());
        }
        let value = HeaderValue::from_str(&accept.join(", ")).map_err(|e| {
            QurlError::openapi("declared content types are not a valid Accept header")
                .with_source(e)
        })?;
        debug!(accept = ?value, operation = %operation.path, "suggesting Accept header");
        request.headers_mut().insert(ACCEPT, value);
        Ok(())
    }

    async fn view(&self, path: &str, method: &str) -> Result<String> {
        let document = self.document().await?;
        Ok(render_view(document, path, method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn viewer(source: &str, servers: serde_json::Value) -> OpenApiViewer {
        let document = OpenApiDocument::from_value(json!({
            "openapi": "3.0.0",
            "info": { "title": "T", "version": "1" },
            "servers": servers,
            "paths": {
                "/users/{id}": {
                    "get": {
                        "responses": {
                            "200": { "description": "OK", "content": { "application/json": {}, "application/xml": {} } }
                        }
                    }
                }
            }
        }))
        .unwrap();
        OpenApiViewer::from_document(SpecSource::parse(source).unwrap(), document)
    }

    #[tokio::test]
    async fn base_url_prefers_absolute_first_server() {
        let viewer = viewer(
            "https://docs.example.com/openapi.json",
            json!([{ "url": "https://api.example.com/v1" }, { "url": "https://other.example.com" }]),
        );
        assert_eq!(viewer.base_url().await.unwrap(), "https://api.example.com/v1");
    }

    #[tokio::test]
    async fn relative_server_is_anchored_to_spec_origin() {
        let viewer = viewer(
            "https://docs.example.com:8443/specs/openapi.json",
            json!([{ "url": "/v2/" }]),
        );
        assert_eq!(
            viewer.base_url().await.unwrap(),
            "https://docs.example.com:8443/v2"
        );
    }

    #[tokio::test]
    async fn no_servers_falls_back_to_spec_origin_only() {
        let viewer = viewer("https://docs.example.com/specs/openapi.json", json!([]));
        assert_eq!(viewer.base_url().await.unwrap(), "https://docs.example.com");
    }

    #[tokio::test]
    async fn file_spec_without_absolute_server_fails() {
        let viewer = viewer("./openapi.yaml", json!([{ "url": "/v1" }]));
        let err = viewer.base_url().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::OpenApi);
    }

    #[tokio::test]
    async fn set_headers_uses_declared_content_types() {
        let viewer = viewer("https://docs.example.com/openapi.json", json!([]));
        let mut request = reqwest::Request::new(
            reqwest::Method::GET,
            Url::parse("https://api.example.com/users/7").unwrap(),
        );
        viewer
            .set_headers(&mut request, "/users/7?expand=1", "get")
            .await
            .unwrap();
        assert_eq!(
            request.headers().get(ACCEPT).unwrap(),
            "application/json, application/xml"
        );
    }

    #[tokio::test]
    async fn documents_load_lazily_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("openapi.yaml");
        std::fs::write(
            &path,
            "openapi: 3.0.0\ninfo:\n  title: Disk\n  version: '1'\nservers:\n  - url: https://disk.example.com\npaths:\n  /ping:\n    get:\n      summary: Ping\n      responses: {}\n",
        )
        .unwrap();

        let viewer = OpenApiViewer::from_location(path.to_str().unwrap()).unwrap();
        assert_eq!(viewer.servers().await.unwrap(), vec!["https://disk.example.com"]);
        let text = viewer.view("*", "ANY").await.unwrap();
        assert!(text.contains("/ping"));
    }

    #[test]
    fn lookup_path_strips_origin_and_query() {
        assert_eq!(lookup_path("https://x.example.com/a/b?c=d"), "/a/b");
        assert_eq!(lookup_path("users"), "/users");
    }
}
