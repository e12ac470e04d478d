use clap::Parser;

use qurl_mcp_runtime::{McpServeArgs, run as run_mcp};

#[derive(Parser)]
#[command(
    name = "qurl-mcp",
    version,
    about = "qurl MCP server: discover and call an OpenAPI-described API over stdio"
)]
struct Cli {
    #[command(flatten)]
    serve: McpServeArgs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let code = run_mcp(cli.serve).await;
    std::process::exit(code);
}
