//! Response filters that cut large API bodies down to the parts a model
//! asked for, with byte and token accounting.

use qurl_core::{QurlError, Result};
use regex::Regex;
use serde_json::{Value, json};

pub const DEFAULT_CONTEXT_LINES: usize = 5;
const CHARS_PER_LINE: usize = 80;
const MIN_CONTEXT_CHARS: usize = 100;

/// Rough token count: four bytes per token.
pub fn estimate_tokens(bytes: usize) -> usize {
    bytes / 4
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    pub content: String,
    pub meta: Value,
}

fn size_meta(source: usize, returned: usize) -> (Value, Value) {
    (
        json!({
            "source_estimate": estimate_tokens(source),
            "returned_estimate": estimate_tokens(returned),
        }),
        json!({
            "source": source,
            "returned": returned,
        }),
    )
}

/// Excerpts around every match of `pattern`, overlapping excerpts merged.
pub fn regex_filter(body: &str, pattern: &str, context_lines: usize) -> Result<FilterResult> {
    let re = Regex::new(pattern).map_err(|e| {
        QurlError::validation(format!("invalid regex pattern: {e}")).with_context("pattern", pattern)
    })?;
    let context_chars = context_lines
        .saturating_mul(CHARS_PER_LINE)
        .max(MIN_CONTEXT_CHARS);

    let mut total_matches = 0;
    let mut windows: Vec<(usize, usize)> = Vec::new();
    for m in re.find_iter(body) {
        total_matches += 1;
        let start = floor_boundary(body, m.start().saturating_sub(context_chars));
        let end = ceil_boundary(body, m.end().saturating_add(context_chars).min(body.len()));
        match windows.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => windows.push((start, end)),
        }
    }

    let content = windows
        .iter()
        .enumerate()
        .map(|(i, &(start, end))| {
            let prefix = if start > 0 { "..." } else { "" };
            let suffix = if end < body.len() { "..." } else { "" };
            format!(
                "=== Context Window {} (bytes {}-{}) ===\n{}{}{}",
                i + 1,
                start,
                end,
                prefix,
                &body[start..end],
                suffix
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    let (tokens, bytes) = size_meta(body.len(), content.len());
    Ok(FilterResult {
        meta: json!({
            "filter": {
                "type": "regex",
                "pattern": pattern,
                "context_lines": context_lines,
                "total_matches": total_matches,
                "context_windows": windows.len(),
            },
            "tokens": tokens,
            "bytes": bytes,
        }),
        content,
    })
}

/// Evaluates `expression` against the JSON body and pretty-prints the result.
pub fn jmespath_filter(body: &str, expression: &str) -> Result<FilterResult> {
    let document: Value = serde_json::from_str(body).map_err(|e| {
        QurlError::validation("response body is not valid JSON")
            .with_source(e)
            .with_suggestion("Use a regex filter for non-JSON responses")
    })?;
    let compiled = jmespath::compile(expression).map_err(|e| {
        QurlError::validation(format!("invalid JMESPath expression: {e}"))
            .with_context("expression", expression)
    })?;
    let result = compiled.search(document).map_err(|e| {
        QurlError::validation(format!("JMESPath evaluation failed: {e}"))
            .with_context("expression", expression)
    })?;

    let result_count = if result.is_null() {
        0
    } else {
        result.as_array().map_or(1, Vec::len)
    };
    let content = serde_json::to_string_pretty(&*result)
        .map_err(|e| QurlError::internal(format!("failed to serialize JMESPath result: {e}")))?;

    let (tokens, bytes) = size_meta(body.len(), content.len());
    Ok(FilterResult {
        meta: json!({
            "filter": {
                "type": "jmespath",
                "expression": expression,
                "result_count": result_count,
            },
            "tokens": tokens,
            "bytes": bytes,
        }),
        content,
    })
}

fn floor_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_boundary(text: &str, mut index: usize) -> usize {
    while index < text.len() && !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
