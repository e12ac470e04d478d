//! Parsed OpenAPI document and the flat operation list derived from it.

use serde_json::Value;

use crate::error::{QurlError, Result};

const METHODS: [&str; 8] = [
    "get", "post", "put", "patch", "delete", "head", "options", "trace",
];

/// A single operation of the document, flattened for lookups and rendering.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Uppercased HTTP method.
    pub method: String,
    /// Path template, e.g. `/users/{id}`.
    pub path: String,
    pub operation_id: Option<String>,
    pub summary: String,
    pub description: String,
    pub deprecated: bool,
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
    pub responses: Vec<ResponseInfo>,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub location: String,
    pub required: bool,
    pub description: String,
    pub schema_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RequestBody {
    pub required: bool,
    pub content_types: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResponseInfo {
    /// Status code or range as declared (`200`, `2XX`, `default`).
    pub code: String,
    pub description: String,
    pub content_types: Vec<String>,
}

impl ResponseInfo {
    pub fn is_success(&self) -> bool {
        self.code.starts_with('2')
    }
}

impl Operation {
    /// Whether a concrete request path matches this operation's template.
    pub fn matches_path(&self, path: &str) -> bool {
        path_matches_template(&self.path, path)
    }

    /// Content types worth advertising in `Accept`: those of 2xx responses,
    /// or of any response when no 2xx response declares content.
    pub fn accept_content_types(&self) -> Vec<String> {
        let success = collect_unique(
            self.responses
                .iter()
                .filter(|r| r.is_success())
                .flat_map(|r| r.content_types.iter()),
        );
        if !success.is_empty() {
            return success;
        }
        collect_unique(self.responses.iter().flat_map(|r| r.content_types.iter()))
    }
}

fn collect_unique<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

/// `{param}` segments match any non-empty segment; trailing slashes are ignored.
pub fn path_matches_template(template: &str, path: &str) -> bool {
    let template_segments: Vec<&str> = template.trim_end_matches('/').split('/').collect();
    let path_segments: Vec<&str> = path.trim_end_matches('/').split('/').collect();
    if template_segments.len() != path_segments.len() {
        return false;
    }
    template_segments
        .iter()
        .zip(path_segments.iter())
        .all(|(t, p)| {
            if t.contains('{') && t.contains('}') {
                !p.is_empty()
            } else {
                t == p
            }
        })
}

#[derive(Debug, Clone)]
pub struct OpenApiDocument {
    raw: Value,
}

impl OpenApiDocument {
    /// Parses JSON, falling back to YAML.
    pub fn parse(text: &str) -> Result<Self> {
        let raw = match serde_json::from_str::<Value>(text) {
            Ok(value) => value,
            Err(json_err) => serde_yaml::from_str::<Value>(text).map_err(|yaml_err| {
                QurlError::openapi("OpenAPI document is neither valid JSON nor YAML")
                    .with_source(yaml_err)
                    .with_context("json_error", json_err)
            })?,
        };
        Self::from_value(raw)
    }

    pub fn from_value(raw: Value) -> Result<Self> {
        if !raw.is_object() {
            return Err(QurlError::openapi("OpenAPI document must be an object"));
        }
        if raw.get("openapi").is_none() && raw.get("swagger").is_none() {
            return Err(QurlError::openapi(
                "document has no 'openapi' version field",
            )
            .with_suggestion("Point --openapi at an OpenAPI v3 JSON or YAML document"));
        }
        Ok(Self { raw })
    }

    pub fn title(&self) -> Option<&str> {
        self.raw.pointer("/info/title").and_then(Value::as_str)
    }

    pub fn version(&self) -> Option<&str> {
        self.raw.pointer("/info/version").and_then(Value::as_str)
    }

    /// Declared server URLs in order, with `{variable}` placeholders
    /// replaced by their declared defaults.
    pub fn servers(&self) -> Vec<String> {
        let Some(servers) = self.raw.get("servers").and_then(Value::as_array) else {
            return Vec::new();
        };
        servers
            .iter()
            .filter_map(|server| {
                let url = server.get("url")?.as_str()?;
                Some(substitute_server_variables(url, server.get("variables")))
            })
            .collect()
    }

    pub fn operations(&self) -> Vec<Operation> {
        let mut ops = Vec::new();
        let Some(paths) = self.raw.get("paths").and_then(Value::as_object) else {
            return ops;
        };

        for (path, path_item) in paths {
            let path_item = self.resolve(path_item);
            let path_level_params = path_item.get("parameters");
            for method in METHODS {
                let Some(operation) = path_item.get(method) else {
                    continue;
                };
                ops.push(self.extract_operation(path, method, operation, path_level_params));
            }
        }

        ops.sort_by(|a, b| {
            a.path
                .cmp(&b.path)
                .then(method_rank(&a.method).cmp(&method_rank(&b.method)))
        });
        ops
    }

    fn extract_operation(
        &self,
        path: &str,
        method: &str,
        operation: &Value,
        path_level_params: Option<&Value>,
    ) -> Operation {
        let text = |key: &str| {
            operation
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string()
        };

        Operation {
            method: method.to_uppercase(),
            path: path.to_string(),
            operation_id: operation
                .get("operationId")
                .and_then(Value::as_str)
                .map(str::to_string),
            summary: text("summary"),
            description: text("description"),
            deprecated: operation
                .get("deprecated")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            parameters: self.collect_parameters(path_level_params, operation.get("parameters")),
            request_body: operation
                .get("requestBody")
                .map(|rb| self.resolve(rb))
                .map(|rb| RequestBody {
                    required: rb.get("required").and_then(Value::as_bool).unwrap_or(false),
                    content_types: content_type_keys(rb.get("content")),
                }),
            responses: self.collect_responses(operation.get("responses")),
        }
    }

    /// Path-level parameters are overridden by operation-level ones with
    /// the same name and location.
    fn collect_parameters(
        &self,
        path_level: Option<&Value>,
        operation_level: Option<&Value>,
    ) -> Vec<Parameter> {
        let mut params: Vec<Parameter> = Vec::new();
        for source in [path_level, operation_level].into_iter().flatten() {
            let Some(items) = source.as_array() else {
                continue;
            };
            for item in items {
                let Some(param) = self.parse_parameter(item) else {
                    continue;
                };
                params.retain(|p| !(p.name == param.name && p.location == param.location));
                params.push(param);
            }
        }
        params
    }

    fn parse_parameter(&self, raw: &Value) -> Option<Parameter> {
        let param = self.resolve(raw);
        let name = param.get("name")?.as_str()?.to_string();
        let location = param.get("in")?.as_str()?.to_string();
        Some(Parameter {
            required: param
                .get("required")
                .and_then(Value::as_bool)
                .unwrap_or(location == "path"),
            description: param
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string(),
            schema_type: param
                .get("schema")
                .map(|s| self.resolve(s))
                .and_then(|s| s.get("type"))
                .and_then(Value::as_str)
                .map(str::to_string),
            name,
            location,
        })
    }

    fn collect_responses(&self, responses: Option<&Value>) -> Vec<ResponseInfo> {
        let Some(responses) = responses.and_then(Value::as_object) else {
            return Vec::new();
        };
        let mut out: Vec<ResponseInfo> = responses
            .iter()
            .map(|(code, response)| {
                let response = self.resolve(response);
                ResponseInfo {
                    code: code.clone(),
                    description: response
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .trim()
                        .to_string(),
                    content_types: content_type_keys(response.get("content")),
                }
            })
            .collect();
        out.sort_by(|a, b| a.code.cmp(&b.code));
        out
    }

    /// Follows a local `$ref` (`#/components/...`); anything else is
    /// returned unchanged.
    fn resolve<'a>(&'a self, value: &'a Value) -> &'a Value {
        let mut current = value;
        for _ in 0..8 {
            let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
                break;
            };
            let Some(pointer) = reference.strip_prefix('#') else {
                break;
            };
            match self.raw.pointer(pointer) {
                Some(target) => current = target,
                None => break,
            }
        }
        current
    }
}

fn content_type_keys(content: Option<&Value>) -> Vec<String> {
    content
        .and_then(Value::as_object)
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default()
}

fn method_rank(method: &str) -> usize {
    METHODS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(method))
        .unwrap_or(METHODS.len())
}

fn substitute_server_variables(url: &str, variables: Option<&Value>) -> String {
    let Some(variables) = variables.and_then(Value::as_object) else {
        return url.to_string();
    };
    let mut out = url.to_string();
    for (name, variable) in variables {
        if let Some(default) = variable.get("default").and_then(Value::as_str) {
            out = out.replace(&format!("{{{name}}}"), default);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> OpenApiDocument {
        OpenApiDocument::from_value(json!({
            "openapi": "3.0.3",
            "info": { "title": "Pets", "version": "1.2.0" },
            "servers": [
                { "url": "https://{region}.example.com/v1", "variables": { "region": { "default": "eu" } } },
                { "url": "/relative" }
            ],
            "components": {
                "parameters": {
                    "PetId": { "name": "id", "in": "path", "description": "Pet id", "schema": { "type": "integer" } }
                }
            },
            "paths": {
                "/pets/{id}": {
                    "parameters": [ { "$ref": "#/components/parameters/PetId" } ],
                    "get": {
                        "summary": "Get a pet",
                        "responses": {
                            "200": { "description": "OK", "content": { "application/json": {} } },
                            "404": { "description": "Missing", "content": { "application/problem+json": {} } }
                        }
                    },
                    "delete": {
                        "summary": "Delete a pet",
                        "responses": { "default": { "description": "Error", "content": { "text/plain": {} } } }
                    }
                },
                "/pets": {
                    "post": { "summary": "Create", "requestBody": { "required": true, "content": { "application/json": {} } }, "responses": {} },
                    "get": { "summary": "List", "responses": {} }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn servers_substitute_variable_defaults() {
        assert_eq!(
            sample().servers(),
            vec!["https://eu.example.com/v1", "/relative"]
        );
    }

    #[test]
    fn operations_are_sorted_by_path_then_method() {
        let ops = sample().operations();
        let keys: Vec<String> = ops
            .iter()
            .map(|op| format!("{} {}", op.method, op.path))
            .collect();
        assert_eq!(
            keys,
            vec!["GET /pets", "POST /pets", "GET /pets/{id}", "DELETE /pets/{id}"]
        );
    }

    #[test]
    fn parameters_follow_local_refs() {
        let ops = sample().operations();
        let get = ops
            .iter()
            .find(|op| op.method == "GET" && op.path == "/pets/{id}")
            .unwrap();
        assert_eq!(get.parameters.len(), 1);
        assert_eq!(get.parameters[0].name, "id");
        assert!(get.parameters[0].required);
        assert_eq!(get.parameters[0].schema_type.as_deref(), Some("integer"));
    }

    #[test]
    fn accept_prefers_success_responses() {
        let ops = sample().operations();
        let get = ops
            .iter()
            .find(|op| op.method == "GET" && op.path == "/pets/{id}")
            .unwrap();
        assert_eq!(get.accept_content_types(), vec!["application/json"]);

        let delete = ops.iter().find(|op| op.method == "DELETE").unwrap();
        assert_eq!(delete.accept_content_types(), vec!["text/plain"]);
    }

    #[test]
    fn template_matching() {
        assert!(path_matches_template("/pets/{id}", "/pets/42"));
        assert!(path_matches_template("/pets/{id}", "/pets/42/"));
        assert!(!path_matches_template("/pets/{id}", "/pets"));
        assert!(!path_matches_template("/pets/{id}", "/owners/42"));
    }

    #[test]
    fn yaml_documents_parse() {
        let doc = OpenApiDocument::parse(
            "openapi: 3.0.0\ninfo:\n  title: Y\n  version: '1'\npaths: {}\n",
        )
        .unwrap();
        assert_eq!(doc.title(), Some("Y"));
        assert!(doc.operations().is_empty());
    }

    #[test]
    fn non_openapi_documents_are_rejected() {
        let err = OpenApiDocument::parse("{\"hello\": 1}").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::OpenApi);
    }
}
