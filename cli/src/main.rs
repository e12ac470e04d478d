mod commands;
mod util;

use clap::Parser;
use qurl_core::RequestConfig;
use qurl_core::config::DEFAULT_SIGV4_SERVICE;
use qurl_core::logging::LogSettings;
use qurl_mcp_runtime::{McpServeArgs, run as run_mcp};

use crate::util::{exit_error, openapi_location, read_body};

#[derive(Parser, Debug)]
#[command(
    name = "qurl",
    version,
    about = "curl for OpenAPI-described APIs, with an MCP server mode for LLM agents"
)]
struct Cli {
    /// Request path (resolved against the server) or full URL
    path: Option<String>,

    /// HTTP method (repeatable; with --docs, a filter)
    #[arg(short = 'X', long = "request")]
    methods: Vec<String>,

    /// Request header "Name: Value" (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Query parameter key=value (repeatable)
    #[arg(short = 'q', long = "query")]
    query: Vec<String>,

    /// Request body; @file reads a file, @- reads stdin
    #[arg(short = 'd', long = "data")]
    data: Option<String>,

    /// Server URL or index into the OpenAPI servers list
    #[arg(long, env = "QURL_SERVER")]
    server: Option<String>,

    /// OpenAPI document URL or file path
    #[arg(long, env = "QURL_OPENAPI")]
    openapi: Option<String>,

    /// Print the request and response trace on stderr
    #[arg(short, long)]
    verbose: bool,

    /// Include the status line and response headers in the output
    #[arg(short, long)]
    include: bool,

    /// Show API documentation instead of sending a request
    #[arg(long)]
    docs: bool,

    /// Sign requests with AWS SigV4
    #[arg(long)]
    aws_sigv4: bool,

    /// Service name used for SigV4 signing
    #[arg(long, default_value = DEFAULT_SIGV4_SERVICE)]
    aws_service: String,

    /// Run as an MCP server on stdio
    #[arg(long)]
    mcp: bool,

    /// Server description reported to MCP clients
    #[arg(long = "mcp-desc", env = "QURL_MCP_DESCRIPTION")]
    mcp_desc: Option<String>,
}

impl Cli {
    fn request_config(&self) -> qurl_core::Result<RequestConfig> {
        let body = self.data.as_deref().map(read_body).transpose()?;
        Ok(RequestConfig {
            methods: self.methods.clone(),
            path: self.path.clone().unwrap_or_default(),
            headers: self.headers.clone(),
            query_params: self.query.clone(),
            body,
            server: self.server.clone(),
            verbose: self.verbose,
            include_headers: self.include,
            sigv4_enabled: self.aws_sigv4,
            sigv4_service: self.aws_service.clone(),
        }
        .normalized())
    }

    fn mcp_args(&self) -> McpServeArgs {
        McpServeArgs {
            path_prefix: self.path.clone(),
            methods: self.methods.clone(),
            headers: self.headers.clone(),
            server: self.server.clone(),
            openapi: openapi_location(self.openapi.clone()),
            verbose: self.verbose,
            include: self.include,
            aws_sigv4: self.aws_sigv4,
            aws_service: self.aws_service.clone(),
            description: self.mcp_desc.clone(),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if cli.mcp {
        std::process::exit(run_mcp(cli.mcp_args()).await);
    }

    let _log_guard = LogSettings::from_env().with_verbose(cli.verbose).install();
    let openapi = openapi_location(cli.openapi.clone());

    let code = if cli.docs {
        let methods = cli.methods.join(",");
        commands::docs::run(cli.path.as_deref().unwrap_or(""), &methods, openapi).await
    } else {
        let config = cli.request_config().unwrap_or_else(|e| exit_error(&e));
        commands::request::run(config, openapi).await
    };
    std::process::exit(code);
}
