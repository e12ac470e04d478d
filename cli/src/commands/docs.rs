use qurl_core::executor::CLI_EXECUTE_DEADLINE;
use qurl_core::{Executor, with_deadline};

use crate::util::exit_error;

/// Prints documentation for `path` and `methods` ("" means everything).
pub async fn run(path: &str, methods: &str, openapi: Option<String>) -> i32 {
    let executor = Executor::from_env(openapi.as_deref()).unwrap_or_else(|e| exit_error(&e));
    match with_deadline(CLI_EXECUTE_DEADLINE, "docs", executor.show_docs(path, methods)).await {
        Ok(text) => {
            println!("{}", text.trim_end());
            0
        }
        Err(err) => exit_error(&err),
    }
}
