use std::fmt::Write;

use super::document::{OpenApiDocument, Operation};

pub const NO_ENDPOINTS_FOUND: &str = "No endpoints found matching the specified path and method";

/// Which methods a view covers. `*`, `ANY` and empty mean all;
/// a comma-joined list means any of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MethodFilter {
    Any,
    OneOf(Vec<String>),
}

impl MethodFilter {
    pub(crate) fn parse(raw: &str) -> Self {
        let methods: Vec<String> = raw
            .split(',')
            .map(|m| m.trim().to_uppercase())
            .filter(|m| !m.is_empty())
            .collect();
        if methods.is_empty() || methods.iter().any(|m| m == "*" || m == "ANY") {
            MethodFilter::Any
        } else {
            MethodFilter::OneOf(methods)
        }
    }

    fn accepts(&self, method: &str) -> bool {
        match self {
            MethodFilter::Any => true,
            MethodFilter::OneOf(methods) => methods.iter().any(|m| m == method),
        }
    }
}

enum PathFilter<'a> {
    All,
    Subtree(&'a str),
    Exact(&'a str),
}

impl<'a> PathFilter<'a> {
    fn parse(raw: &'a str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw == "*" {
            PathFilter::All
        } else if raw.ends_with('/') {
            PathFilter::Subtree(raw)
        } else {
            PathFilter::Exact(raw)
        }
    }

    fn accepts(&self, op: &Operation) -> bool {
        match self {
            PathFilter::All => true,
            PathFilter::Subtree(prefix) => {
                op.path.starts_with(prefix) || op.path == prefix.trim_end_matches('/')
            }
            PathFilter::Exact(path) => op.path == *path || op.matches_path(path),
        }
    }
}

pub(crate) fn render_view(document: &OpenApiDocument, path: &str, method: &str) -> String {
    let path_filter = PathFilter::parse(path);
    let method_filter = MethodFilter::parse(method);
    let matched: Vec<Operation> = document
        .operations()
        .into_iter()
        .filter(|op| path_filter.accepts(op) && method_filter.accepts(&op.method))
        .collect();

    if matched.is_empty() {
        return NO_ENDPOINTS_FOUND.to_string();
    }

    match path_filter {
        PathFilter::All => {
            let mut out = String::new();
            if let Some(title) = document.title() {
                match document.version() {
                    Some(version) => {
                        let _ = writeln!(out, "{title} ({version})\n");
                    }
                    None => {
                        let _ = writeln!(out, "{title}\n");
                    }
                }
            }
            out.push_str(&render_index(&matched));
            out
        }
        PathFilter::Subtree(_) => render_index(&matched),
        PathFilter::Exact(_) => matched
            .iter()
            .map(render_operation)
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn render_index(ops: &[Operation]) -> String {
    let mut out = String::new();
    for op in ops {
        let _ = write!(out, "{:<7} {}", op.method, op.path);
        if !op.summary.is_empty() {
            let _ = write!(out, "  {}", op.summary);
        }
        if op.deprecated {
            out.push_str(" (deprecated)");
        }
        out.push('\n');
    }
    out
}

fn render_operation(op: &Operation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", op.method, op.path);
    if op.deprecated {
        out.push_str("  DEPRECATED\n");
    }
    if !op.summary.is_empty() {
        let _ = writeln!(out, "  {}", op.summary);
    }
    if let Some(operation_id) = &op.operation_id {
        let _ = writeln!(out, "  operationId: {operation_id}");
    }
    if !op.description.is_empty() {
        out.push('\n');
        for line in op.description.lines() {
            let _ = writeln!(out, "  {line}");
        }
    }

    if !op.parameters.is_empty() {
        out.push_str("\n  Parameters:\n");
        for param in &op.parameters {
            let required = if param.required { ", required" } else { "" };
            let _ = write!(out, "    {} ({}{})", param.name, param.location, required);
            if let Some(schema_type) = &param.schema_type {
                let _ = write!(out, " [{schema_type}]");
            }
            if !param.description.is_empty() {
                let _ = write!(out, ": {}", param.description);
            }
            out.push('\n');
        }
    }

    if let Some(body) = &op.request_body {
        let required = if body.required { " (required)" } else { "" };
        let _ = writeln!(
            out,
            "\n  Request body{required}: {}",
            body.content_types.join(", ")
        );
    }

    if !op.responses.is_empty() {
        out.push_str("\n  Responses:\n");
        for response in &op.responses {
            let _ = write!(out, "    {}", response.code);
            if !response.description.is_empty() {
                let _ = write!(out, ": {}", response.description);
            }
            if !response.content_types.is_empty() {
                let _ = write!(out, " [{}]", response.content_types.join(", "));
            }
            out.push('\n');
        }
    }
    out
}
