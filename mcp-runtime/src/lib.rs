//! Model Context Protocol server exposing an HTTP API as two tools,
//! `discover` and `execute`, over line-delimited JSON-RPC on stdio.

mod filter;
mod protocol;
mod server;
mod tools;

use clap::Args;
use qurl_core::config::DEFAULT_SIGV4_SERVICE;
use qurl_core::logging::LogSettings;
use qurl_core::{Executor, McpAccessPolicy, QurlError, RequestConfig};
use tokio::io::{self, BufReader};
use tracing::error;

pub use filter::{FilterResult, estimate_tokens, jmespath_filter, regex_filter};
pub use protocol::{MCP_PROTOCOL_VERSION, RpcError, ToolDefinition, tool_definitions};
pub use server::{DISCOVER_DEADLINE, EXECUTE_DEADLINE, McpRuntimeConfig, McpServer};
pub use tools::{DiscoverRequest, ExecuteRequest, ResponseFilter, ToolCall, apply_path_prefix};

#[derive(Args, Clone, Debug, Default)]
pub struct McpServeArgs {
    /// Restrict every tool call to paths under this prefix
    pub path_prefix: Option<String>,
    /// Allowed HTTP methods (repeatable); all methods when omitted
    #[arg(short = 'X', long = "request")]
    pub methods: Vec<String>,
    /// Header sent with every request, "Name: Value" (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,
    /// Server URL or index into the OpenAPI servers list
    #[arg(long, env = "QURL_SERVER")]
    pub server: Option<String>,
    /// OpenAPI document URL or file path
    #[arg(long, env = "QURL_OPENAPI")]
    pub openapi: Option<String>,
    /// Prefix tool results with the status line
    #[arg(short, long)]
    pub verbose: bool,
    /// Prefix tool results with the status line and response headers
    #[arg(short, long)]
    pub include: bool,
    /// Sign requests with AWS SigV4
    #[arg(long)]
    pub aws_sigv4: bool,
    /// Service name used for SigV4 signing
    #[arg(long, default_value = DEFAULT_SIGV4_SERVICE)]
    pub aws_service: String,
    /// Server description reported on initialize
    #[arg(long = "mcp-desc", env = "QURL_MCP_DESCRIPTION")]
    pub description: Option<String>,
}

impl McpServeArgs {
    pub fn runtime_config(&self) -> McpRuntimeConfig {
        let policy = McpAccessPolicy::new(&self.methods, self.path_prefix.clone().unwrap_or_default())
            .with_inherited_headers(self.headers.clone())
            .with_sigv4(self.aws_sigv4, self.aws_service.clone());
        McpRuntimeConfig {
            policy,
            defaults: RequestConfig {
                server: self.server.clone(),
                verbose: self.verbose,
                include_headers: self.include,
                ..RequestConfig::default()
            },
            description: self.description.clone(),
        }
    }
}

/// Serves MCP on stdin/stdout until input closes. Returns the process exit
/// code.
pub async fn run(args: McpServeArgs) -> i32 {
    let _log_guard = LogSettings::from_env().install();
    match serve_stdio(&args).await {
        Ok(()) => 0,
        Err(err) => {
            error!(error = %err.detailed_message(), "MCP server stopped");
            eprintln!("{}", err.to_value());
            1
        }
    }
}

async fn serve_stdio(args: &McpServeArgs) -> Result<(), QurlError> {
    let openapi = args
        .openapi
        .clone()
        .or_else(|| std::env::var("OPENAPI_URL").ok());
    let executor = Executor::from_env(openapi.as_deref())?;
    let server = McpServer::new(args.runtime_config(), executor);

    let reader = BufReader::new(io::stdin());
    let mut stdout = io::stdout();
    server.serve(reader, &mut stdout).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_args_become_policy_and_defaults() {
        let args = McpServeArgs {
            path_prefix: Some("/api/".into()),
            methods: vec!["get".into()],
            headers: vec!["Authorization: Bearer t".into()],
            server: Some("https://api.example.com".into()),
            include: true,
            aws_sigv4: true,
            aws_service: "lambda".into(),
            description: Some("Orders".into()),
            ..McpServeArgs::default()
        };
        let config = args.runtime_config();

        assert_eq!(config.policy.single_method(), Some("GET"));
        assert_eq!(config.policy.path_prefix, "/api/");
        assert_eq!(config.policy.inherited_headers, vec!["Authorization: Bearer t"]);
        assert!(config.policy.sigv4);
        assert_eq!(config.policy.sigv4_service, "lambda");
        assert_eq!(config.defaults.server(), Some("https://api.example.com"));
        assert!(config.defaults.include_headers);
        assert!(!config.defaults.verbose);
        assert_eq!(config.description.as_deref(), Some("Orders"));
    }

    #[test]
    fn no_methods_means_unrestricted() {
        let config = McpServeArgs::default().runtime_config();
        assert!(config.policy.allowed_methods.is_empty());
        assert!(config.policy.is_method_allowed("DELETE"));
    }
}
