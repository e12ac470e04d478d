use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderValue, USER_AGENT};
use tracing::{debug, warn};
use url::Url;

use crate::auth::Authenticator;
use crate::config::RequestConfig;
use crate::error::{ErrorKind, QurlError, Result};
use crate::openapi::SpecProvider;
use crate::query::apply_headers;

/// Upper bound on spec-derived header hints; a slow document never blocks
/// the request.
pub const HEADER_HINT_TIMEOUT: Duration = Duration::from_secs(5);

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

pub fn user_agent() -> String {
    format!("qurl/{}", env!("CARGO_PKG_VERSION"))
}

/// Brace- or bracket-delimited bodies are JSON, everything else is form data.
pub fn detect_content_type(body: &str) -> &'static str {
    let trimmed = body.trim();
    let json_like = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if json_like {
        JSON_CONTENT_TYPE
    } else {
        FORM_CONTENT_TYPE
    }
}

pub struct RequestBuilder {
    spec: Option<Arc<dyn SpecProvider>>,
    authenticator: Authenticator,
    hint_timeout: Duration,
}

impl RequestBuilder {
    pub fn new(spec: Option<Arc<dyn SpecProvider>>, authenticator: Authenticator) -> Self {
        Self {
            spec,
            authenticator,
            hint_timeout: HEADER_HINT_TIMEOUT,
        }
    }

    pub fn with_hint_timeout(mut self, timeout: Duration) -> Self {
        self.hint_timeout = timeout;
        self
    }

    /// Header precedence, lowest first: User-Agent, spec hints, signing,
    /// user headers. Content-Type is only inferred when nothing set it.
    pub async fn build(
        &self,
        method: &str,
        target: &Url,
        original_path: &str,
        config: &RequestConfig,
    ) -> Result<reqwest::Request> {
        let method = Method::from_bytes(method.as_bytes()).map_err(|e| {
            QurlError::validation("invalid HTTP method")
                .with_source(e)
                .with_context("method", method)
        })?;

        let mut request = reqwest::Request::new(method.clone(), target.clone());
        let body = config.body();
        if let Some(body) = body {
            *request.body_mut() = Some(body.to_string().into());
        }

        let agent = HeaderValue::from_str(&user_agent())
            .map_err(|e| QurlError::wrap(ErrorKind::Internal, "invalid user agent", e))?;
        request.headers_mut().insert(USER_AGENT, agent);

        if let Some(spec) = &self.spec {
            if !original_path.is_empty() {
                self.apply_spec_hints(spec.as_ref(), &mut request, original_path, method.as_str())
                    .await;
            }
        }

        self.authenticator
            .apply(&mut request, target, config)
            .map_err(|e| {
                if e.kind() == ErrorKind::Auth {
                    e
                } else {
                    QurlError::wrap(ErrorKind::Auth, "authentication failed", e)
                }
            })?;

        apply_headers(request.headers_mut(), &config.headers)?;

        if let Some(body) = body {
            if !request.headers().contains_key(CONTENT_TYPE) {
                let content_type = detect_content_type(body);
                debug!(content_type, "inferred request content type");
                request
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }

        Ok(request)
    }

    async fn apply_spec_hints(
        &self,
        spec: &dyn SpecProvider,
        request: &mut reqwest::Request,
        path: &str,
        method: &str,
    ) {
        match tokio::time::timeout(self.hint_timeout, spec.set_headers(request, path, method)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(path, method, error = %e.detailed_message(), "skipping OpenAPI header hints"),
            Err(_) => warn!(path, method, "OpenAPI header hints timed out"),
        }
    }
}
