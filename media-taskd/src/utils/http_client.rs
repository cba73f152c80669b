use std::{sync::OnceLock, time::Duration};

use reqwest::Url;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Install the process-wide rustls crypto provider once.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the client used for calls to the request server.
pub fn build_client(request_timeout: Duration) -> reqwest::Client {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder();
    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }

    builder.build().unwrap_or_else(|error| {
        warn!(
            error = %error,
            "Failed to create configured HTTP client; falling back to reqwest defaults"
        );
        reqwest::Client::new()
    })
}

/// Append percent-encoded path segments to `base`.
///
/// ```ignore
/// let url = endpoint_url("http://host:7799/api/", &["shares", "a b"])?;
/// assert_eq!(url.as_str(), "http://host:7799/api/shares/a%20b");
/// ```
pub fn endpoint_url(base: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| Error::config(format!("invalid request server URL {base:?}: {e}")))?;

    url.path_segments_mut()
        .map_err(|_| Error::config(format!("request server URL cannot be a base: {base}")))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_segments() {
        let url = endpoint_url("http://127.0.0.1:7799", &["tasks-status", "t1"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:7799/tasks-status/t1");
    }

    #[test]
    fn keeps_base_path_and_encodes() {
        let url = endpoint_url("http://host/api/", &["shares", "a b/c"]).unwrap();
        assert_eq!(url.as_str(), "http://host/api/shares/a%20b%2Fc");
    }

    #[test]
    fn rejects_garbage() {
        assert!(endpoint_url("not a url", &["x"]).is_err());
        assert!(endpoint_url("mailto:ops@example.com", &["x"]).is_err());
    }
}
