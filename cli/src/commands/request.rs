use qurl_core::executor::CLI_EXECUTE_DEADLINE;
use qurl_core::{Executor, QurlError, RequestConfig, with_deadline};
use tracing::debug;

use crate::util::exit_error;

/// Sends one request and prints the response. Any HTTP status counts as
/// success; only failures to get a response exit non-zero.
pub async fn run(config: RequestConfig, openapi: Option<String>) -> i32 {
    if config.path.trim().is_empty() {
        exit_error(
            &QurlError::validation("a request path or URL is required")
                .with_suggestion("Usage: qurl [OPTIONS] <PATH|URL>, or qurl --docs to browse the API"),
        );
    }

    let executor = Executor::from_env(openapi.as_deref()).unwrap_or_else(|e| exit_error(&e));
    debug!(path = %config.path, method = config.primary_method(), "executing request");

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let result = with_deadline(
        CLI_EXECUTE_DEADLINE,
        "request",
        executor.execute(&config, &mut stdout, &mut stderr),
    )
    .await;

    match result {
        Ok(()) => 0,
        Err(err) => exit_error(&err),
    }
}
