//! OpenAPI spec provider.
//!
//! The executor and the MCP runtime only depend on [`SpecProvider`];
//! [`OpenApiViewer`] is the implementation backed by a real document.

mod document;
mod render;
mod viewer;

use async_trait::async_trait;

use crate::error::Result;

pub use document::{
    OpenApiDocument, Operation, Parameter, RequestBody, ResponseInfo, path_matches_template,
};
pub use render::NO_ENDPOINTS_FOUND;
pub use viewer::{OpenApiViewer, SpecSource};

/// Queries answered from an OpenAPI document.
#[async_trait]
pub trait SpecProvider: Send + Sync {
    /// Base URL: first declared server if resolvable, else the spec's own
    /// scheme and host.
    async fn base_url(&self) -> Result<String>;

    /// Declared server URLs, in order.
    async fn servers(&self) -> Result<Vec<String>>;

    /// Anchors a relative server URL to the spec's origin.
    async fn resolve_server(&self, server: &str) -> Result<String>;

    /// Best-effort header suggestions (notably `Accept`) for an operation.
    async fn set_headers(
        &self,
        request: &mut reqwest::Request,
        path: &str,
        method: &str,
    ) -> Result<()>;

    /// Documentation text for matching endpoints.
    async fn view(&self, path: &str, method: &str) -> Result<String>;
}
