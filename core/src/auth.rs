use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use url::Url;

use crate::config::RequestConfig;
use crate::error::{ErrorKind, QurlError, Result};
use crate::sigv4::{EMPTY_PAYLOAD_SHA256, SigV4Signer, Signer, sha256_hex};

/// Pseudo-scheme addressing a function invocation instead of a socket.
pub const LAMBDA_SCHEME: &str = "lambda";

pub fn is_direct_invocation(url: &Url) -> bool {
    url.scheme() == LAMBDA_SCHEME
}

/// Decides whether and how a request is signed.
#[derive(Clone)]
pub struct Authenticator {
    signer: Arc<dyn Signer>,
}

impl Authenticator {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }

    /// SigV4 with credentials and region from the environment.
    pub fn from_env() -> Self {
        Self::new(Arc::new(SigV4Signer::from_env()))
    }

    /// Direct invocations are never signed; otherwise SigV4 applies when
    /// enabled. Failures are user-actionable and never retried.
    pub fn apply(
        &self,
        request: &mut reqwest::Request,
        target: &Url,
        config: &RequestConfig,
    ) -> Result<()> {
        if is_direct_invocation(target) {
            debug!(target = %target, "direct invocation, skipping request signing");
            return Ok(());
        }
        if !config.sigv4_enabled {
            return Ok(());
        }

        let payload_hash = match request.body().and_then(|b| b.as_bytes()) {
            Some(bytes) if !bytes.is_empty() => sha256_hex(bytes),
            _ => EMPTY_PAYLOAD_SHA256.to_string(),
        };

        self.signer
            .sign(request, &payload_hash, &config.sigv4_service, Utc::now())
            .map_err(|e| {
                let suggestion = e
                    .suggestion()
                    .unwrap_or("Check AWS credentials, region and --aws-service")
                    .to_string();
                QurlError::wrap(ErrorKind::Auth, "SigV4 signing failed", e)
                    .with_context("service", &config.sigv4_service)
                    .with_suggestion(suggestion)
            })
    }
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSigner {
        calls: Mutex<Vec<(String, String)>>,
    }

    impl Signer for RecordingSigner {
        fn sign(
            &self,
            request: &mut reqwest::Request,
            payload_hash: &str,
            service: &str,
            _timestamp: chrono::DateTime<Utc>,
        ) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((payload_hash.to_string(), service.to_string()));
            request
                .headers_mut()
                .insert("authorization", "signed".parse().unwrap());
            Ok(())
        }
    }

    fn sigv4_config() -> RequestConfig {
        RequestConfig {
            sigv4_enabled: true,
            sigv4_service: "lambda".to_string(),
            ..RequestConfig::default()
        }
    }

    #[test]
    fn direct_invocation_skips_signing() {
        let signer = Arc::new(RecordingSigner::default());
        let auth = Authenticator::new(signer.clone());
        let url = Url::parse("lambda://my-function/users").unwrap();
        let mut request = reqwest::Request::new(reqwest::Method::GET, url.clone());

        auth.apply(&mut request, &url, &sigv4_config()).unwrap();
        assert!(signer.calls.lock().unwrap().is_empty());
        assert!(request.headers().get("authorization").is_none());
    }

    #[test]
    fn disabled_signing_is_noop() {
        let signer = Arc::new(RecordingSigner::default());
        let auth = Authenticator::new(signer.clone());
        let url = Url::parse("https://api.example.com/").unwrap();
        let mut request = reqwest::Request::new(reqwest::Method::GET, url.clone());

        auth.apply(&mut request, &url, &RequestConfig::default())
            .unwrap();
        assert!(signer.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn body_digest_is_passed_to_signer() {
        let signer = Arc::new(RecordingSigner::default());
        let auth = Authenticator::new(signer.clone());
        let url = Url::parse("https://api.example.com/").unwrap();
        let mut request = reqwest::Request::new(reqwest::Method::POST, url.clone());
        *request.body_mut() = Some("abc".into());

        auth.apply(&mut request, &url, &sigv4_config()).unwrap();
        let calls = signer.calls.lock().unwrap();
        assert_eq!(
            calls[0].0,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(calls[0].1, "lambda");
        assert_eq!(request.headers().get("authorization").unwrap(), "signed");
    }

    #[test]
    fn signer_failures_are_wrapped_as_auth() {
        let auth = Authenticator::new(Arc::new(SigV4Signer::default()));
        let url = Url::parse("https://api.example.com/").unwrap();
        let mut request = reqwest::Request::new(reqwest::Method::GET, url.clone());

        let err = auth.apply(&mut request, &url, &sigv4_config()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(err.context_value("service"), Some("lambda"));
        assert!(err.suggestion().is_some());
    }
}
