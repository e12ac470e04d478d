use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::auth::Authenticator;
use crate::builder::{RequestBuilder, user_agent};
use crate::config::RequestConfig;
use crate::error::{ErrorKind, QurlError, Result};
use crate::openapi::{OpenApiViewer, SpecProvider, SpecSource};
use crate::query::apply_query_parameters;
use crate::resolver::UrlResolver;
use crate::response::{ExecutionResult, RequestTrace, ResponseHandler};
use crate::transport::{RoutingTransport, Transport, TransportResponse};

pub const CLI_EXECUTE_DEADLINE: Duration = Duration::from_secs(30);

/// Fails with a network error when `future` does not finish in time.
pub async fn with_deadline<T>(
    deadline: Duration,
    operation: &str,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, future).await {
        Ok(result) => result,
        Err(_) => Err(QurlError::network(format!("{operation} timed out"))
            .with_context("deadline", format!("{}s", deadline.as_secs()))),
    }
}

/// Drives one request through resolution, building, sending and output.
pub struct Executor {
    spec: Option<Arc<dyn SpecProvider>>,
    resolver: UrlResolver,
    builder: RequestBuilder,
    transport: Arc<dyn Transport>,
    handler: ResponseHandler,
}

impl Executor {
    pub fn new(
        transport: Arc<dyn Transport>,
        spec: Option<Arc<dyn SpecProvider>>,
        authenticator: Authenticator,
    ) -> Self {
        Self {
            resolver: UrlResolver::new(spec.clone()),
            builder: RequestBuilder::new(spec.clone(), authenticator),
            spec,
            transport,
            handler: ResponseHandler,
        }
    }

    /// Production wiring: one shared HTTP client, the routing transport,
    /// environment credentials and an optional lazily-loaded OpenAPI document.
    pub fn from_env(openapi: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent())
            .build()
            .map_err(|e| QurlError::wrap(ErrorKind::Internal, "failed to build HTTP client", e))?;

        let spec: Option<Arc<dyn SpecProvider>> = match openapi.map(str::trim) {
            Some(location) if !location.is_empty() => {
                let source = SpecSource::parse(location)?;
                Some(Arc::new(OpenApiViewer::with_client(source, client.clone())))
            }
            _ => None,
        };

        Ok(Self::new(
            Arc::new(RoutingTransport::from_env(client)),
            spec,
            Authenticator::from_env(),
        ))
    }

    pub fn spec(&self) -> Option<&Arc<dyn SpecProvider>> {
        self.spec.as_ref()
    }

    /// Prints the response for the terminal.
    pub async fn execute(
        &self,
        config: &RequestConfig,
        out: &mut (dyn Write + Send),
        diag: &mut (dyn Write + Send),
    ) -> Result<()> {
        let (response, trace) = self.send(config).await?;
        self.handler.write(response, &trace, config, out, diag).await
    }

    /// Same pipeline, but the response is returned instead of printed.
    pub async fn execute_for_mcp(&self, config: &RequestConfig) -> Result<ExecutionResult> {
        let (response, _) = self.send(config).await?;
        self.handler.collect(response).await
    }

    /// Documentation for endpoints matching `path` and `method`; blanks
    /// mean every path and every method.
    pub async fn show_docs(&self, path: &str, method: &str) -> Result<String> {
        let spec = self.spec.as_ref().ok_or_else(|| {
            QurlError::config("an OpenAPI document is required to show documentation")
                .with_suggestion("Pass --openapi <spec-url> or set QURL_OPENAPI")
        })?;
        let path = if path.trim().is_empty() { "*" } else { path };
        let method = if method.trim().is_empty() { "ANY" } else { method };
        spec.view(path, method).await
    }

    async fn send(&self, config: &RequestConfig) -> Result<(TransportResponse, RequestTrace)> {
        let target = self.resolver.resolve(&config.path, config).await?;
        let target = apply_query_parameters(&target, &config.query_params);
        let method = config.primary_method();
        let request = self
            .builder
            .build(method, &target, &config.path, config)
            .await?;
        let trace = RequestTrace::capture(&request);

        let started = Instant::now();
        info!(method, url = %target, "sending request");
        let response = self.transport.send(request).await.map_err(|e| {
            let kind = match e.kind() {
                ErrorKind::Auth | ErrorKind::Config | ErrorKind::Validation => e.kind(),
                _ => ErrorKind::Network,
            };
            QurlError::wrap(kind, format!("{method} {target} failed"), e)
                .with_context("url", &target)
                .with_context("elapsed_ms", started.elapsed().as_millis())
        })?;
        debug!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "received response"
        );
        Ok((response, trace))
    }
}
