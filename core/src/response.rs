//! Rendering of responses for the terminal and collection for MCP tools.

use std::io::Write;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use url::Url;

use crate::config::RequestConfig;
use crate::error::{ErrorKind, QurlError, Result};
use crate::transport::TransportResponse;

/// `HTTP/1.1 200 OK`
pub fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("HTTP/1.1 {} {}", status.as_u16(), reason),
        None => format!("HTTP/1.1 {}", status.as_u16()),
    }
}

/// One `name: value` line per header value, each line starting with `prefix`.
pub fn format_headers(headers: &HeaderMap, prefix: &str) -> String {
    let mut out = String::new();
    for (name, value) in headers {
        out.push_str(prefix);
        out.push_str(name.as_str());
        out.push_str(": ");
        out.push_str(&String::from_utf8_lossy(value.as_bytes()));
        out.push('\n');
    }
    out
}

/// Snapshot of an outgoing request for the verbose trace.
#[derive(Debug, Clone)]
pub struct RequestTrace {
    method: String,
    url: Url,
    headers: HeaderMap,
}

impl RequestTrace {
    pub fn capture(request: &reqwest::Request) -> Self {
        Self {
            method: request.method().to_string(),
            url: request.url().clone(),
            headers: request.headers().clone(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// curl-style `> ` lines ending with a lone `>`.
    pub fn render(&self) -> String {
        let mut target = self.url.path().to_string();
        if let Some(query) = self.url.query() {
            target.push('?');
            target.push_str(query);
        }
        let mut out = format!("> {} {} HTTP/1.1\n", self.method, target);
        if let Some(host) = self.url.host_str() {
            match self.url.port() {
                Some(port) => out.push_str(&format!("> Host: {host}:{port}\n")),
                None => out.push_str(&format!("> Host: {host}\n")),
            }
        }
        out.push_str(&format_headers(&self.headers, "> "));
        out.push_str(">\n");
        out
    }
}

/// Fully-read response handed to MCP tools.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseHandler;

impl ResponseHandler {
    /// Writes exactly one of: verbose trace on `diag` plus body, status and
    /// headers plus body, or the body alone.
    pub async fn write(
        &self,
        response: TransportResponse,
        trace: &RequestTrace,
        config: &RequestConfig,
        out: &mut (dyn Write + Send),
        diag: &mut (dyn Write + Send),
    ) -> Result<()> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        if config.verbose {
            let mut preamble = trace.render();
            preamble.push_str(&format!("< {}\n", status_line(status)));
            preamble.push_str(&format_headers(&headers, "< "));
            preamble.push_str("<\n");
            diag.write_all(preamble.as_bytes()).map_err(write_failed)?;
        } else if config.include_headers {
            let mut preamble = status_line(status);
            preamble.push('\n');
            preamble.push_str(&format_headers(&headers, ""));
            preamble.push('\n');
            out.write_all(preamble.as_bytes()).map_err(write_failed)?;
        }

        out.write_all(&body).map_err(write_failed)?;
        if !body.is_empty() && !body.ends_with(b"\n") {
            out.write_all(b"\n").map_err(write_failed)?;
        }
        out.flush().map_err(write_failed)?;
        diag.flush().map_err(write_failed)
    }

    pub async fn collect(&self, response: TransportResponse) -> Result<ExecutionResult> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok(ExecutionResult {
            status,
            headers,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

fn write_failed(e: std::io::Error) -> QurlError {
    QurlError::wrap(ErrorKind::Internal, "failed to write output", e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{CONTENT_TYPE, HeaderValue};

    fn json_response() -> TransportResponse {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        TransportResponse::buffered(StatusCode::OK, headers, br#"{"ok":true}"#.to_vec())
    }

    fn trace() -> RequestTrace {
        let url = Url::parse("https://api.example.com:8443/users?page=2").unwrap();
        let mut request = reqwest::Request::new(reqwest::Method::GET, url);
        request
            .headers_mut()
            .insert("x-trace", HeaderValue::from_static("1"));
        RequestTrace::capture(&request)
    }

    async fn render(config: RequestConfig) -> (String, String) {
        let mut out = Vec::new();
        let mut diag = Vec::new();
        ResponseHandler
            .write(json_response(), &trace(), &config, &mut out, &mut diag)
            .await
            .unwrap();
        (
            String::from_utf8(out).unwrap(),
            String::from_utf8(diag).unwrap(),
        )
    }

    #[test]
    fn status_line_includes_reason() {
        assert_eq!(status_line(StatusCode::NOT_FOUND), "HTTP/1.1 404 Not Found");
        assert_eq!(
            status_line(StatusCode::from_u16(599).unwrap()),
            "HTTP/1.1 599"
        );
    }

    #[tokio::test]
    async fn body_only_by_default() {
        let (out, diag) = render(RequestConfig::default()).await;
        assert_eq!(out, "{\"ok\":true}\n");
        assert!(diag.is_empty());
    }

    #[tokio::test]
    async fn include_headers_prefixes_status_and_headers() {
        let config = RequestConfig {
            include_headers: true,
            ..RequestConfig::default()
        };
        let (out, diag) = render(config).await;
        assert_eq!(
            out,
            "HTTP/1.1 200 OK\ncontent-type: application/json\n\n{\"ok\":true}\n"
        );
        assert!(diag.is_empty());
    }

    #[tokio::test]
    async fn verbose_writes_trace_to_diagnostics() {
        let config = RequestConfig {
            verbose: true,
            include_headers: true,
            ..RequestConfig::default()
        };
        let (out, diag) = render(config).await;
        assert_eq!(out, "{\"ok\":true}\n");
        assert_eq!(
            diag,
            "> GET /users?page=2 HTTP/1.1\n\
             > Host: api.example.com:8443\n\
             > x-trace: 1\n\
             >\n\
             < HTTP/1.1 200 OK\n\
             < content-type: application/json\n\
             <\n"
        );
    }

    #[tokio::test]
    async fn collect_reads_body_as_text() {
        let result = ResponseHandler.collect(json_response()).await.unwrap();
        assert_eq!(result.status, StatusCode::OK);
        assert_eq!(result.body, r#"{"ok":true}"#);
        assert_eq!(result.headers[CONTENT_TYPE], "application/json");
    }
}
