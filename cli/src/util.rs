use std::io::Read;
use std::path::Path;

use qurl_core::{QurlError, Result};

/// Prints the error as a single JSON line on stderr and exits with status 1.
pub fn exit_error(err: &QurlError) -> ! {
    eprintln!("{}", err.to_value());
    std::process::exit(1);
}

/// `@-` reads the body from stdin, `@path` from a file; anything else is
/// the body itself.
pub fn read_body(raw: &str) -> Result<String> {
    match raw.strip_prefix('@') {
        Some("-") => {
            let mut body = String::new();
            std::io::stdin().read_to_string(&mut body).map_err(|e| {
                QurlError::validation("failed to read request body from stdin").with_source(e)
            })?;
            Ok(body)
        }
        Some(path) if !path.is_empty() => read_body_file(Path::new(path)),
        _ => Ok(raw.to_string()),
    }
}

fn read_body_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        QurlError::validation("failed to read request body file")
            .with_source(e)
            .with_context("file", path.display())
            .with_suggestion("Use -d @<file> with a readable file, or -d @- for stdin")
    })
}

/// `--openapi`/`QURL_OPENAPI`, falling back to `OPENAPI_URL`.
pub fn openapi_location(flag: Option<String>) -> Option<String> {
    flag.filter(|v| !v.trim().is_empty())
        .or_else(|| std::env::var("OPENAPI_URL").ok())
        .filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn literal_bodies_pass_through() {
        assert_eq!(read_body(r#"{"a":1}"#).unwrap(), r#"{"a":1}"#);
        assert_eq!(read_body("@").unwrap(), "@");
    }

    #[test]
    fn at_path_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "name=qurl").unwrap();
        let raw = format!("@{}", file.path().display());
        assert_eq!(read_body(&raw).unwrap(), "name=qurl");
    }

    #[test]
    fn missing_file_is_validation_error() {
        let err = read_body("@/definitely/not/here.json").unwrap_err();
        assert_eq!(err.kind(), qurl_core::ErrorKind::Validation);
        assert_eq!(err.context_value("file"), Some("/definitely/not/here.json"));
    }
}
