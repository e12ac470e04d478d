use std::fmt;

use serde_json::{Value, json};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, QurlError>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error taxonomy shared by the CLI and the MCP runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input the caller controls.
    Validation,
    /// Transport failure or response-read failure.
    Network,
    /// Signing or credential failure.
    Auth,
    /// Missing required configuration.
    Config,
    /// Spec-provider failure (loading, parsing, lookups).
    OpenApi,
    /// Protocol-level misuse of the MCP server.
    Mcp,
    /// Unexpected failure.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Network => "network_error",
            ErrorKind::Auth => "auth_error",
            ErrorKind::Config => "config_error",
            ErrorKind::OpenApi => "openapi_error",
            ErrorKind::Mcp => "mcp_error",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error: every failure carries enough information for a user
/// (or an agent) to understand what went wrong and how to fix it.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct QurlError {
    kind: ErrorKind,
    message: String,
    context: Vec<(String, String)>,
    suggestion: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl QurlError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
            suggestion: None,
            source: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn openapi(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OpenApi, message)
    }

    pub fn mcp(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Mcp, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Wraps `source` under a new kind and message, keeping it reachable
    /// through `std::error::Error::source`.
    pub fn wrap(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::new(kind, message).with_source(source)
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.context.push((key.into(), value.to_string()));
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &[(String, String)] {
        &self.context
    }

    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn suggestion(&self) -> Option<&str> {
        self.suggestion.as_deref()
    }

    /// Message followed by the chain of wrapped causes.
    pub fn detailed_message(&self) -> String {
        let mut out = self.message.clone();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            out.push_str(": ");
            out.push_str(&err.to_string());
            cause = err.source();
        }
        out
    }

    pub fn to_value(&self) -> Value {
        let mut payload = json!({
            "error": self.kind.as_str(),
            "message": self.detailed_message(),
        });
        if !self.context.is_empty() {
            let context: serde_json::Map<String, Value> = self
                .context
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            payload["context"] = Value::Object(context);
        }
        if let Some(suggestion) = &self.suggestion {
            payload["docs_hint"] = Value::String(suggestion.clone());
        }
        payload
    }
}
