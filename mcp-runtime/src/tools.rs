//! Typed tool calls: arguments are decoded into per-tool structs and
//! validated before anything touches the network.

use std::collections::BTreeMap;

use qurl_core::McpAccessPolicy;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::filter::{DEFAULT_CONTEXT_LINES, FilterResult, jmespath_filter, regex_filter};
use crate::protocol::RpcError;

const ANY_METHOD: &str = "ANY";

#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    Discover(DiscoverRequest),
    Execute(ExecuteRequest),
}

impl ToolCall {
    /// Decodes `tools/call` params. Unknown tools are -32601, malformed
    /// arguments -32602.
    pub fn from_params(params: Value) -> Result<Self, RpcError> {
        let params = match params {
            Value::Object(map) => map,
            _ => return Err(RpcError::invalid_params("tools/call params must be an object")),
        };
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;
        let arguments = match params.get("arguments") {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        match name {
            "discover" => {
                let args: DiscoverArgs = decode(name, arguments)?;
                Ok(Self::Discover(args.into_request()))
            }
            "execute" => {
                let args: ExecuteArgs = decode(name, arguments)?;
                Ok(Self::Execute(args.validate()?))
            }
            other => Err(RpcError::tool_not_found(other)),
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(tool: &str, arguments: Value) -> Result<T, RpcError> {
    serde_json::from_value(arguments)
        .map_err(|e| RpcError::invalid_params(format!("invalid arguments for {tool}: {e}")))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Default, Deserialize)]
struct DiscoverArgs {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    method: Option<String>,
}

impl DiscoverArgs {
    fn into_request(self) -> DiscoverRequest {
        DiscoverRequest {
            path: non_blank(self.path),
            method: non_blank(self.method).map(|m| m.trim().to_uppercase()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverRequest {
    pub path: Option<String>,
    pub method: Option<String>,
}

impl DiscoverRequest {
    /// Path and method handed to the documentation view after policy is
    /// applied.
    pub fn scoped(&self, policy: &McpAccessPolicy) -> Result<(String, String), RpcError> {
        let method = match &self.method {
            Some(method) => method.clone(),
            None => policy.single_method().unwrap_or(ANY_METHOD).to_string(),
        };
        let concrete = !(method == ANY_METHOD || method == "*");
        if concrete && !policy.is_method_allowed(&method) {
            return Err(method_not_allowed(&method, policy));
        }
        let path = apply_path_prefix(&policy.path_prefix, self.path.as_deref().unwrap_or("*"));
        Ok((path, method))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ExecuteArgs {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    query: Option<BTreeMap<String, String>>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    regex: Option<String>,
    #[serde(default)]
    jmespath: Option<String>,
    #[serde(default)]
    context_lines: Option<i64>,
}

impl ExecuteArgs {
    fn validate(self) -> Result<ExecuteRequest, RpcError> {
        let path = non_blank(self.path)
            .ok_or_else(|| RpcError::invalid_params("execute requires a non-empty 'path'"))?;
        let method = non_blank(self.method)
            .map(|m| m.trim().to_uppercase())
            .unwrap_or_else(|| "GET".to_string());

        let filter = match (non_blank(self.regex), non_blank(self.jmespath)) {
            (Some(_), Some(_)) => {
                return Err(RpcError::invalid_params(
                    "Cannot use both regex and jmespath filters simultaneously",
                ));
            }
            (Some(pattern), None) => Some(ResponseFilter::Regex {
                pattern,
                context_lines: self
                    .context_lines
                    .map(|n| usize::try_from(n.max(0)).unwrap_or(DEFAULT_CONTEXT_LINES))
                    .unwrap_or(DEFAULT_CONTEXT_LINES),
            }),
            (None, Some(expression)) => Some(ResponseFilter::JmesPath { expression }),
            (None, None) => None,
        };

        Ok(ExecuteRequest {
            path,
            method,
            headers: self.headers.unwrap_or_default(),
            query: self.query.unwrap_or_default(),
            body: self.body.filter(|b| !b.is_empty()),
            filter,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseFilter {
    Regex { pattern: String, context_lines: usize },
    JmesPath { expression: String },
}

impl ResponseFilter {
    pub fn apply(&self, body: &str) -> qurl_core::Result<FilterResult> {
        match self {
            Self::Regex {
                pattern,
                context_lines,
            } => regex_filter(body, pattern, *context_lines),
            Self::JmesPath { expression } => jmespath_filter(body, expression),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteRequest {
    pub path: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Option<String>,
    pub filter: Option<ResponseFilter>,
}

impl ExecuteRequest {
    /// Method and path checks, both always enforced.
    pub fn scoped_path(&self, policy: &McpAccessPolicy) -> Result<String, RpcError> {
        if !policy.is_method_allowed(&self.method) {
            return Err(method_not_allowed(&self.method, policy));
        }
        if policy.path_prefix.is_empty() {
            return Ok(self.path.clone());
        }
        if self.path.contains("://") {
            return Err(RpcError::invalid_params(format!(
                "Absolute URLs are not allowed; paths are restricted to {}",
                policy.path_prefix
            )));
        }
        if self.path.split(['/', '?']).any(|segment| segment == "..") {
            return Err(RpcError::invalid_params(format!(
                "Path must not leave {}",
                policy.path_prefix
            )));
        }
        Ok(apply_path_prefix(&policy.path_prefix, &self.path))
    }

    /// `Name: Value` header strings, inherited ones first.
    pub fn header_lines(&self, inherited: &[String]) -> Vec<String> {
        inherited
            .iter()
            .cloned()
            .chain(self.headers.iter().map(|(k, v)| format!("{k}: {v}")))
            .collect()
    }

    pub fn query_pairs(&self) -> Vec<String> {
        self.query.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

fn method_not_allowed(method: &str, policy: &McpAccessPolicy) -> RpcError {
    RpcError::invalid_params(format!(
        "Method {method} is not allowed. Allowed methods: {}",
        policy.allowed_methods_list()
    ))
}

/// Confines `path` under `prefix`. Blank or `*` paths select the whole
/// prefix; other paths get the prefix prepended unless already under it.
pub fn apply_path_prefix(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        return path.to_string();
    }
    let path = path.trim();
    if path.is_empty() || path == "*" {
        return format!("{prefix}*");
    }
    if path.starts_with(prefix) {
        return path.to_string();
    }
    let stripped = path.strip_prefix('/').unwrap_or(path);
    if prefix.ends_with('/') {
        format!("{prefix}{stripped}")
    } else {
        format!("{prefix}/{stripped}")
    }
}
