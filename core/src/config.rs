use std::collections::BTreeSet;

pub const DEFAULT_METHOD: &str = "GET";
pub const DEFAULT_SIGV4_SERVICE: &str = "execute-api";

/// Everything needed to issue one logical request.
///
/// Built once per CLI invocation, or once per MCP `execute` call on top of
/// the server-level defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestConfig {
    /// Ordered HTTP verbs; the first one is the primary method.
    pub methods: Vec<String>,
    pub path: String,
    /// `Name: Value` strings, applied in order (last one wins).
    pub headers: Vec<String>,
    /// `key=value` strings.
    pub query_params: Vec<String>,
    pub body: Option<String>,
    /// Absolute URL, relative URL, or single-digit server index.
    pub server: Option<String>,
    pub verbose: bool,
    pub include_headers: bool,
    pub sigv4_enabled: bool,
    pub sigv4_service: String,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            methods: vec![DEFAULT_METHOD.to_string()],
            path: String::new(),
            headers: Vec::new(),
            query_params: Vec::new(),
            body: None,
            server: None,
            verbose: false,
            include_headers: false,
            sigv4_enabled: false,
            sigv4_service: DEFAULT_SIGV4_SERVICE.to_string(),
        }
    }
}

impl RequestConfig {
    /// Uppercases methods, drops blanks and restores the `GET` default.
    pub fn normalized(mut self) -> Self {
        self.methods = self
            .methods
            .iter()
            .map(|m| m.trim().to_uppercase())
            .filter(|m| !m.is_empty())
            .collect();
        if self.methods.is_empty() {
            self.methods.push(DEFAULT_METHOD.to_string());
        }
        if self.sigv4_service.trim().is_empty() {
            self.sigv4_service = DEFAULT_SIGV4_SERVICE.to_string();
        }
        self
    }

    pub fn primary_method(&self) -> &str {
        self.methods
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_METHOD)
    }

    /// The configured server, if non-empty.
    pub fn server(&self) -> Option<&str> {
        self.server
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref().filter(|b| !b.is_empty())
    }

    /// Methods joined with commas, as understood by documentation views.
    pub fn methods_filter(&self) -> String {
        self.methods.join(",")
    }
}

/// Access constraints and inherited settings of one MCP server instance.
/// Immutable once the server starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct McpAccessPolicy {
    /// Uppercased verbs; empty means unrestricted.
    pub allowed_methods: BTreeSet<String>,
    /// Empty means unrestricted.
    pub path_prefix: String,
    pub inherited_headers: Vec<String>,
    pub sigv4: bool,
    pub sigv4_service: String,
}

impl McpAccessPolicy {
    pub fn new(
        allowed_methods: impl IntoIterator<Item = impl AsRef<str>>,
        path_prefix: impl Into<String>,
    ) -> Self {
        Self {
            allowed_methods: allowed_methods
                .into_iter()
                .map(|m| m.as_ref().trim().to_uppercase())
                .filter(|m| !m.is_empty())
                .collect(),
            path_prefix: path_prefix.into(),
            inherited_headers: Vec::new(),
            sigv4: false,
            sigv4_service: DEFAULT_SIGV4_SERVICE.to_string(),
        }
    }

    pub fn with_inherited_headers(mut self, headers: Vec<String>) -> Self {
        self.inherited_headers = headers;
        self
    }

    pub fn with_sigv4(mut self, enabled: bool, service: impl Into<String>) -> Self {
        self.sigv4 = enabled;
        self.sigv4_service = service.into();
        self
    }

    pub fn is_method_allowed(&self, method: &str) -> bool {
        self.allowed_methods.is_empty()
            || self
                .allowed_methods
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(method.trim()))
    }

    pub fn allowed_methods_list(&self) -> String {
        self.allowed_methods
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The single allowed method, when exactly one is configured.
    pub fn single_method(&self) -> Option<&str> {
        if self.allowed_methods.len() == 1 {
            self.allowed_methods.iter().next().map(String::as_str)
        } else {
            None
        }
    }
}
