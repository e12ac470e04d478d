//! JSON-RPC envelopes and the static tool surface.

use qurl_core::McpAccessPolicy;
use serde_json::{Value, json};

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const MCP_SERVER_NAME: &str = "qurl";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn parse_error() -> Self {
        Self {
            code: PARSE_ERROR,
            message: "Parse error".to_string(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_REQUEST,
            message: message.into(),
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("Method not found: {method}"),
        }
    }

    pub fn tool_not_found(tool: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("Tool not found: {tool}"),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            code: INTERNAL_ERROR,
            message: message.into(),
        }
    }
}

pub fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}

/// Single text block tool result, with optional `_meta`.
pub fn text_result(text: String, meta: Option<Value>) -> Value {
    let mut result = json!({
        "content": [
            { "type": "text", "text": text }
        ]
    });
    if let Some(meta) = meta {
        result["_meta"] = meta;
    }
    result
}

#[derive(Debug)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn to_value(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }
}

fn policy_note(policy: &McpAccessPolicy) -> String {
    let mut notes = Vec::new();
    if !policy.allowed_methods.is_empty() {
        notes.push(format!("Allowed methods: {}.", policy.allowed_methods_list()));
    }
    if !policy.path_prefix.is_empty() {
        notes.push(format!("Paths are restricted to {}.", policy.path_prefix));
    }
    if notes.is_empty() {
        String::new()
    } else {
        format!(" {}", notes.join(" "))
    }
}

pub fn tool_definitions(policy: &McpAccessPolicy) -> Vec<ToolDefinition> {
    let note = policy_note(policy);
    vec![
        ToolDefinition {
            name: "discover",
            description: format!(
                "Explore the API described by the OpenAPI document: list endpoints or show \
                 parameters, request bodies and responses for one path. Call this before \
                 execute when unsure which endpoint to use.{note}"
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to inspect. '*' or empty lists every endpoint; a trailing '/' lists a subtree."
                    },
                    "method": {
                        "type": "string",
                        "description": "HTTP method filter, comma-separated methods, or ANY."
                    }
                }
            }),
        },
        ToolDefinition {
            name: "execute",
            description: format!(
                "Send an HTTP request to the API and return the response body. Large \
                 responses can be narrowed with either a regex (context excerpts) or a \
                 JMESPath expression (JSON projection), not both.{note}"
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Request path such as /users/42, or a full URL."
                    },
                    "method": {
                        "type": "string",
                        "description": "HTTP method (default GET)."
                    },
                    "headers": {
                        "type": "object",
                        "additionalProperties": { "type": "string" },
                        "description": "Extra request headers."
                    },
                    "query": {
                        "type": "object",
                        "additionalProperties": { "type": "string" },
                        "description": "Query parameters."
                    },
                    "body": {
                        "type": "string",
                        "description": "Request body. JSON bodies get application/json automatically."
                    },
                    "regex": {
                        "type": "string",
                        "description": "Return only excerpts around matches of this regular expression."
                    },
                    "jmespath": {
                        "type": "string",
                        "description": "JMESPath expression applied to a JSON response."
                    },
                    "context_lines": {
                        "type": "integer",
                        "description": "Approximate lines of context around regex matches (default 5).",
                        "default": 5
                    }
                },
                "required": ["path"]
            }),
        },
    ]
}
