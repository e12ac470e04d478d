use std::time::Duration;

use qurl_core::response::{format_headers, status_line};
use qurl_core::{
    ErrorKind, ExecutionResult, Executor, McpAccessPolicy, QurlError, RequestConfig, with_deadline,
};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::protocol::{
    MCP_PROTOCOL_VERSION, MCP_SERVER_NAME, RpcError, error_response, success_response,
    text_result, tool_definitions,
};
use crate::tools::{DiscoverRequest, ExecuteRequest, ToolCall};

pub const DISCOVER_DEADLINE: Duration = Duration::from_secs(10);
pub const EXECUTE_DEADLINE: Duration = Duration::from_secs(30);

/// Server-wide settings fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct McpRuntimeConfig {
    pub policy: McpAccessPolicy,
    /// Server, verbose and include flags every call starts from.
    pub defaults: RequestConfig,
    pub description: Option<String>,
}

pub struct McpServer {
    config: McpRuntimeConfig,
    executor: Executor,
}

impl McpServer {
    pub fn new(config: McpRuntimeConfig, executor: Executor) -> Self {
        Self { config, executor }
    }

    /// Reads one JSON-RPC message per line until end of input. Each message
    /// is fully handled, including its outbound request, before the next
    /// line is read.
    pub async fn serve<R, W>(&self, mut reader: R, writer: &mut W) -> Result<(), QurlError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();
        info!(server = MCP_SERVER_NAME, "MCP server ready");
        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf).await.map_err(|e| {
                QurlError::wrap(ErrorKind::Mcp, "failed to read MCP message", e)
            })?;
            if read == 0 {
                debug!("input closed, shutting down");
                return Ok(());
            }
            let line = buf.trim_ascii();
            if line.is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(line).await {
                let mut bytes = serde_json::to_vec(&response).map_err(|e| {
                    QurlError::wrap(ErrorKind::Internal, "failed to encode MCP response", e)
                })?;
                bytes.push(b'\n');
                writer.write_all(&bytes).await.map_err(write_failed)?;
                writer.flush().await.map_err(write_failed)?;
            }
        }
    }

    /// Bytes that are not valid UTF-8 JSON get a parse error like any
    /// other malformed line.
    pub async fn handle_line(&self, line: impl AsRef<[u8]>) -> Option<Value> {
        match serde_json::from_slice::<Value>(line.as_ref()) {
            Ok(message) => self.handle_single_message(message).await,
            Err(e) => {
                warn!(error = %e, "discarding unparseable MCP line");
                Some(error_response(Value::Null, RpcError::parse_error()))
            }
        }
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A client response; this server never sends requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        match obj.get("id").cloned() {
            Some(id) => {
                debug!(method, "handling request");
                Some(match self.handle_request(method, params).await {
                    Ok(result) => success_response(id, result),
                    Err(err) => error_response(id, err),
                })
            }
            None => {
                // notifications/cancelled has no effect on a call already
                // finished by the time it is read.
                debug!(method, "ignoring notification");
                None
            }
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list_payload()),
            "tools/call" => match ToolCall::from_params(params)? {
                ToolCall::Discover(request) => self.discover(request).await,
                ToolCall::Execute(request) => self.execute(request).await,
            },
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        let mut server_info = json!({
            "name": MCP_SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        });
        if let Some(description) = self.config.description.as_deref().filter(|d| !d.is_empty()) {
            server_info["description"] = Value::String(description.to_string());
        }
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": server_info
        })
    }

    fn tools_list_payload(&self) -> Value {
        let tools: Vec<Value> = tool_definitions(&self.config.policy)
            .iter()
            .map(|tool| tool.to_value())
            .collect();
        json!({ "tools": tools })
    }

    async fn discover(&self, request: DiscoverRequest) -> Result<Value, RpcError> {
        let (path, method) = request.scoped(&self.config.policy)?;
        debug!(path = %path, method = %method, "discover");
        let text = with_deadline(
            DISCOVER_DEADLINE,
            "discover",
            self.executor.show_docs(&path, &method),
        )
        .await
        .map_err(|e| RpcError::internal(e.detailed_message()))?;
        Ok(text_result(text, None))
    }

    async fn execute(&self, request: ExecuteRequest) -> Result<Value, RpcError> {
        let path = request.scoped_path(&self.config.policy)?;
        let config = self.call_config(path, &request);
        debug!(method = %request.method, path = %config.path, "execute");

        let result = with_deadline(
            EXECUTE_DEADLINE,
            "execute",
            self.executor.execute_for_mcp(&config),
        )
        .await
        .map_err(|e| RpcError::internal(e.detailed_message()))?;

        let preamble = preamble(&config, &result);
        match &request.filter {
            Some(filter) => {
                let filtered = filter
                    .apply(&result.body)
                    .map_err(|e| RpcError::internal(e.detailed_message()))?;
                Ok(text_result(
                    format!("{preamble}{}", filtered.content),
                    Some(filtered.meta),
                ))
            }
            None => Ok(text_result(format!("{preamble}{}", result.body), None)),
        }
    }

    fn call_config(&self, path: String, request: &ExecuteRequest) -> RequestConfig {
        let policy = &self.config.policy;
        let defaults = &self.config.defaults;
        RequestConfig {
            methods: vec![request.method.clone()],
            path,
            headers: request.header_lines(&policy.inherited_headers),
            query_params: request.query_pairs(),
            body: request.body.clone(),
            server: defaults.server.clone(),
            verbose: defaults.verbose,
            include_headers: defaults.include_headers,
            sigv4_enabled: policy.sigv4,
            sigv4_service: policy.sigv4_service.clone(),
        }
        .normalized()
    }
}

/// Status line, plus headers when requested, ahead of the body.
fn preamble(config: &RequestConfig, result: &ExecutionResult) -> String {
    if !config.verbose && !config.include_headers {
        return String::new();
    }
    let mut out = status_line(result.status);
    out.push('\n');
    if config.include_headers {
        out.push_str(&format_headers(&result.headers, ""));
    }
    out.push('\n');
    out
}

fn write_failed(e: std::io::Error) -> QurlError {
    QurlError::wrap(ErrorKind::Mcp, "failed to write MCP response", e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    use async_trait::async_trait;
    use qurl_core::openapi::SpecProvider;
    use qurl_core::sigv4::SigV4Signer;
    use qurl_core::{Authenticator, Transport, TransportResponse};
    use reqwest::StatusCode;
    use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
    use tokio::io::BufReader;

    type Log = Arc<Mutex<Vec<String>>>;

    struct ScriptedTransport {
        log: Log,
        body: String,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: reqwest::Request) -> qurl_core::Result<TransportResponse> {
            self.log
                .lock()
                .unwrap()
                .push(format!("send {} {}", request.method(), request.url()));
            tokio::task::yield_now().await;
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Ok(TransportResponse::buffered(
                StatusCode::OK,
                headers,
                self.body.clone().into_bytes(),
            ))
        }
    }

    struct RecordingWriter {
        log: Log,
        bytes: Vec<u8>,
    }

    impl AsyncWrite for RecordingWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            if buf.ends_with(b"\n") {
                self.log.lock().unwrap().push("respond".to_string());
            }
            self.bytes.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    struct StaticSpec;

    #[async_trait]
    impl SpecProvider for StaticSpec {
        async fn base_url(&self) -> qurl_core::Result<String> {
            Ok("https://api.example.com".into())
        }

        async fn servers(&self) -> qurl_core::Result<Vec<String>> {
            Ok(vec!["https://api.example.com".into()])
        }

        async fn resolve_server(&self, server: &str) -> qurl_core::Result<String> {
            Ok(server.to_string())
        }

        async fn set_headers(
            &self,
            _request: &mut reqwest::Request,
            _path: &str,
            _method: &str,
        ) -> qurl_core::Result<()> {
            Ok(())
        }

        async fn view(&self, path: &str, method: &str) -> qurl_core::Result<String> {
            Ok(format!("view {method} {path}"))
        }
    }

    fn server_with(config: McpRuntimeConfig, body: &str) -> (McpServer, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let transport = Arc::new(ScriptedTransport {
            log: log.clone(),
            body: body.to_string(),
        });
        let executor = Executor::new(
            transport,
            Some(Arc::new(StaticSpec)),
            Authenticator::new(Arc::new(SigV4Signer::default())),
        );
        (McpServer::new(config, executor), log)
    }

    fn server(body: &str) -> (McpServer, Log) {
        server_with(McpRuntimeConfig::default(), body)
    }

    async fn run(server: &McpServer, log: &Log, input: &str) -> Vec<Value> {
        let mut writer = RecordingWriter {
            log: log.clone(),
            bytes: Vec::new(),
        };
        server
            .serve(BufReader::new(input.as_bytes()), &mut writer)
            .await
            .unwrap();
        String::from_utf8(writer.bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn tool_call(id: u64, name: &str, arguments: Value) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": { "name": name, "arguments": arguments }
        })
        .to_string()
    }

    fn text(response: &Value) -> &str {
        response["result"]["content"][0]["text"].as_str().unwrap()
    }

    #[tokio::test]
    async fn consecutive_calls_are_strictly_sequential() {
        let (server, log) = server(r#"{"ok":true}"#);
        let input = format!(
            "{}\n{}\n",
            tool_call(1, "execute", json!({"path": "/first"})),
            tool_call(2, "execute", json!({"path": "/second"}))
        );
        let responses = run(&server, &log, &input).await;

        assert_eq!(responses.len(), 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "send GET https://api.example.com/first",
                "respond",
                "send GET https://api.example.com/second",
                "respond",
            ]
        );
    }

    #[tokio::test]
    async fn parse_errors_do_not_stop_the_loop() {
        let (server, log) = server("{}");
        let input = format!(
            "not json\n\n{}\n",
            json!({"jsonrpc": "2.0", "id": 3, "method": "ping"})
        );
        let responses = run(&server, &log, &input).await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["error"]["code"], -32700);
        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[1]["id"], 3);
        assert_eq!(responses[1]["result"], json!({}));
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_a_parse_error() {
        let (server, log) = server("{}");
        let mut writer = RecordingWriter {
            log: log.clone(),
            bytes: Vec::new(),
        };
        let mut input = format!("{}\n", json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
            .into_bytes();
        input.extend_from_slice(b"\xff\xfe garbage\n");
        input.extend_from_slice(
            format!("{}\n", json!({"jsonrpc": "2.0", "id": 2, "method": "ping"})).as_bytes(),
        );

        server
            .serve(BufReader::new(input.as_slice()), &mut writer)
            .await
            .unwrap();
        let responses: Vec<Value> = String::from_utf8(writer.bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["error"]["code"], -32700);
        assert_eq!(responses[1]["id"], Value::Null);
        assert_eq!(responses[2]["id"], 2);
        assert_eq!(responses[2]["result"], json!({}));
    }

    #[tokio::test]
    async fn last_line_without_newline_is_handled() {
        let (server, log) = server("{}");
        let input = json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}).to_string();
        let responses = run(&server, &log, &input).await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], 7);
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let (server, log) = server("{}");
        let input = format!(
            "{}\n{}\n",
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "method": "notifications/cancelled", "params": {"requestId": 1}})
        );
        assert!(run(&server, &log, &input).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_methods_and_tools_are_not_found() {
        let (server, _) = server("{}");
        let unknown = server
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(unknown["error"]["code"], -32601);

        let tool = server
            .handle_line(&tool_call(2, "shell", json!({})))
            .await
            .unwrap();
        assert_eq!(tool["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn non_object_json_is_invalid_request() {
        let (server, _) = server("{}");
        let response = server.handle_line("[1,2]").await.unwrap();
        assert_eq!(response["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn initialize_reports_description_and_tools_capability() {
        let (server, _) = server_with(
            McpRuntimeConfig {
                description: Some("Orders API".into()),
                ..McpRuntimeConfig::default()
            },
            "{}",
        );
        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{}}"#)
            .await
            .unwrap();
        let result = &response["result"];
        assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "qurl");
        assert_eq!(result["serverInfo"]["description"], "Orders API");
        assert_eq!(result["capabilities"]["tools"], json!({}));
    }

    #[tokio::test]
    async fn tools_list_returns_discover_and_execute() {
        let (server, _) = server("{}");
        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
            .await
            .unwrap();
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["name"], "discover");
        assert_eq!(tools[1]["name"], "execute");
        assert!(tools[1]["inputSchema"]["properties"]["jmespath"].is_object());
    }

    #[tokio::test]
    async fn discover_applies_prefix_policy() {
        let (server, _) = server_with(
            McpRuntimeConfig {
                policy: McpAccessPolicy::new(Vec::<String>::new(), "/api/"),
                ..McpRuntimeConfig::default()
            },
            "{}",
        );
        let all = server
            .handle_line(&tool_call(1, "discover", json!({"path": "*"})))
            .await
            .unwrap();
        assert_eq!(text(&all), "view ANY /api/*");

        let admin = server
            .handle_line(&tool_call(2, "discover", json!({"path": "/admin"})))
            .await
            .unwrap();
        assert_eq!(text(&admin), "view ANY /api/admin");
    }

    #[tokio::test]
    async fn execute_rejects_disallowed_methods() {
        let (server, log) = server_with(
            McpRuntimeConfig {
                policy: McpAccessPolicy::new(["GET"], ""),
                ..McpRuntimeConfig::default()
            },
            "{}",
        );
        let response = server
            .handle_line(&tool_call(1, "execute", json!({"path": "/x", "method": "delete"})))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32602);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_regex_returns_unfiltered_body() {
        let body = r#"{"items":[1,2,3]}"#;
        let (server, _) = server(body);
        for regex in ["", "   "] {
            let response = server
                .handle_line(&tool_call(1, "execute", json!({"path": "/x", "regex": regex})))
                .await
                .unwrap();
            assert_eq!(text(&response), body);
            assert!(response["result"].get("_meta").is_none());
        }
    }

    #[tokio::test]
    async fn oversized_context_lines_keep_the_server_alive() {
        let body = "first line\nan error occurred\nlast line";
        let (server, log) = server(body);
        let input = format!(
            "{}\n{}\n",
            tool_call(
                1,
                "execute",
                json!({"path": "/logs", "regex": "error", "context_lines": i64::MAX})
            ),
            json!({"jsonrpc": "2.0", "id": 2, "method": "ping"})
        );
        let responses = run(&server, &log, &input).await;

        assert_eq!(responses.len(), 2);
        assert!(text(&responses[0]).contains("an error occurred"));
        assert_eq!(responses[0]["result"]["_meta"]["filter"]["context_windows"], 1);
        assert_eq!(responses[1]["id"], 2);
    }

    #[tokio::test]
    async fn jmespath_filter_attaches_meta() {
        let body = r#"{"items":[{"status":"failed"},{"status":"ok"},{"status":"failed"}]}"#;
        let (server, _) = server(body);
        let response = server
            .handle_line(&tool_call(
                1,
                "execute",
                json!({"path": "/jobs", "jmespath": "items[?status=='failed']"}),
            ))
            .await
            .unwrap();
        let meta = &response["result"]["_meta"];
        assert_eq!(meta["filter"]["type"], "jmespath");
        assert_eq!(meta["filter"]["result_count"], 2);
        let parsed: Value = serde_json::from_str(text(&response)).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn filter_failures_are_internal_errors() {
        let (server, _) = server("<html>not json</html>");
        let response = server
            .handle_line(&tool_call(1, "execute", json!({"path": "/x", "jmespath": "a"})))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32603);
    }

    #[tokio::test]
    async fn include_headers_default_prepends_status_and_headers() {
        let (server, _) = server_with(
            McpRuntimeConfig {
                defaults: RequestConfig {
                    include_headers: true,
                    ..RequestConfig::default()
                },
                ..McpRuntimeConfig::default()
            },
            "{}",
        );
        let response = server
            .handle_line(&tool_call(1, "execute", json!({"path": "/x"})))
            .await
            .unwrap();
        assert_eq!(
            text(&response),
            "HTTP/1.1 200 OK\ncontent-type: application/json\n\n{}"
        );
    }
}
