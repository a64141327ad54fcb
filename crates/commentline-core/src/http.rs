//! Blocking HTTP GET over a shared async client.
//!
//! Uses async reqwest internally with `tokio::time::timeout` for stall
//! detection, but presents a sync interface for the single-threaded harvester.

use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Network settings applied to the shared client
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Whole-request deadline (send + body)
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: concat!("commentline/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

static HTTP_CONFIG: OnceLock<HttpConfig> = OnceLock::new();

/// Install HTTP settings; only the first call before any request takes effect
pub fn set_http_config(config: HttpConfig) {
    if HTTP_CONFIG.set(config).is_err() {
        log::debug!("HTTP config already set, ignoring override");
    }
}

/// Active HTTP settings
pub fn http_config() -> &'static HttpConfig {
    HTTP_CONFIG.get_or_init(HttpConfig::default)
}

/// Error types for HTTP operations
#[derive(Debug)]
pub enum HttpError {
    /// No response within the configured deadline
    Timeout,
    /// Connection, TLS or body transfer failure
    Network(String),
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out after {:?}", http_config().timeout),
            Self::Network(msg) => write!(f, "HTTP error: {msg}"),
        }
    }
}

impl std::error::Error for HttpError {}

impl HttpError {
    fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Response status plus the full body
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(http_config().user_agent.clone())
        .pool_max_idle_per_host(4)
        .build()
        .expect("failed to build HTTP client")
});

/// Get shared HTTP client.
pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// GET `url` with query parameters, blocking until the body is read.
///
/// Non-2xx statuses are returned as responses, not errors, so callers can
/// classify them from the body.
pub fn get_text(url: &str, query: &[(&str, String)]) -> Result<HttpResponse, HttpError> {
    let deadline = http_config().timeout;
    SHARED_RUNTIME.handle().block_on(async {
        let request = async {
            let response = http_client()
                .get(url)
                .query(query)
                .send()
                .await
                .map_err(|e| HttpError::from_reqwest(&e))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| HttpError::from_reqwest(&e))?;
            Ok(HttpResponse { status, body })
        };
        match tokio::time::timeout(deadline, request).await {
            Ok(result) => result,
            Err(_) => Err(HttpError::Timeout),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range() {
        let ok = HttpResponse {
            status: 204,
            body: String::new(),
        };
        assert!(ok.is_success());
        let limited = HttpResponse {
            status: 429,
            body: String::new(),
        };
        assert!(!limited.is_success());
    }

    #[test]
    fn default_user_agent_names_crate() {
        assert!(HttpConfig::default().user_agent.starts_with("commentline/"));
    }
}
