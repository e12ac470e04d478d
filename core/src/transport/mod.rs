//! Outbound transports: plain HTTP via reqwest, and direct Lambda
//! invocation for `lambda://` targets.

mod lambda;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;

use crate::auth::is_direct_invocation;
use crate::error::{ErrorKind, QurlError, Result};

pub use lambda::{LambdaTransport, build_invoke_event, parse_invoke_payload};

/// Sends one request; a single attempt, never retried.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: reqwest::Request) -> Result<TransportResponse>;
}

enum ResponseBody {
    Streaming(reqwest::Response),
    Buffered(Vec<u8>),
}

/// Status and headers of a response whose body may still be in flight.
pub struct TransportResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
}

impl TransportResponse {
    pub fn streaming(response: reqwest::Response) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            body: ResponseBody::Streaming(response),
        }
    }

    pub fn buffered(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: ResponseBody::Buffered(body.into()),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Reads the full body.
    pub async fn bytes(self) -> Result<Vec<u8>> {
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Streaming(response) => response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| QurlError::wrap(ErrorKind::Network, "failed to read response body", e)),
        }
    }
}

#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: reqwest::Request) -> Result<TransportResponse> {
        let response = self.client.execute(request).await.map_err(|e| {
            let message = if e.is_timeout() {
                "request timed out"
            } else if e.is_connect() {
                "connection failed"
            } else {
                "request failed"
            };
            QurlError::wrap(ErrorKind::Network, message, e)
        })?;
        Ok(TransportResponse::streaming(response))
    }
}

/// Sends `lambda://` targets to the invocation transport and everything
/// else over HTTP.
#[derive(Clone)]
pub struct RoutingTransport {
    http: Arc<dyn Transport>,
    lambda: Arc<dyn Transport>,
}

impl RoutingTransport {
    pub fn new(http: Arc<dyn Transport>, lambda: Arc<dyn Transport>) -> Self {
        Self { http, lambda }
    }

    /// reqwest for HTTP, environment-configured Lambda invoke for `lambda://`.
    pub fn from_env(client: reqwest::Client) -> Self {
        Self::new(
            Arc::new(ReqwestTransport::new(client.clone())),
            Arc::new(LambdaTransport::from_env(client)),
        )
    }
}

#[async_trait]
impl Transport for RoutingTransport {
    async fn send(&self, request: reqwest::Request) -> Result<TransportResponse> {
        if is_direct_invocation(request.url()) {
            self.lambda.send(request).await
        } else {
            self.http.send(request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Named {
        name: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Transport for Named {
        async fn send(&self, _request: reqwest::Request) -> Result<TransportResponse> {
            self.seen.lock().unwrap().push(self.name);
            Ok(TransportResponse::buffered(
                StatusCode::OK,
                HeaderMap::new(),
                self.name.as_bytes().to_vec(),
            ))
        }
    }

    #[tokio::test]
    async fn routing_dispatches_on_scheme() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let routing = RoutingTransport::new(
            Arc::new(Named { name: "http", seen: seen.clone() }),
            Arc::new(Named { name: "lambda", seen: seen.clone() }),
        );

        let http_req = reqwest::Request::new(
            reqwest::Method::GET,
            url::Url::parse("https://api.example.com/x").unwrap(),
        );
        let lambda_req = reqwest::Request::new(
            reqwest::Method::GET,
            url::Url::parse("lambda://fn/x").unwrap(),
        );
        let body = routing.send(lambda_req).await.unwrap().bytes().await.unwrap();
        assert_eq!(body, b"lambda");
        routing.send(http_req).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["lambda", "http"]);
    }
}
