use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::shutdown::Shutdown;

pub const DEFAULT_USER_AGENT: &str = concat!("gator/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_FEED_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving a feed document.
///
/// All of them are feed-scoped: the scheduler logs them and moves on to the
/// next tick. Nothing here is retried.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[source] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the size limit
    #[error("Response too large (limit {limit} bytes)")]
    ResponseTooLarge { limit: usize },
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Shutdown was requested while the request was in flight
    #[error("Request cancelled by shutdown")]
    Cancelled,
    /// The HTTP client could not be constructed
    #[error("Could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Knobs for [`FeedFetcher`]; built from the user's config in `main`.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    /// Deadline for the whole request, body included
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_bytes: DEFAULT_MAX_FEED_BYTES,
        }
    }
}

/// Single-request HTTP client for feed documents.
///
/// Issues one GET per call with an identifying `User-Agent`, a bounded
/// deadline and a body size cap. The caller's [`Shutdown`] aborts an
/// in-flight request.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl FeedFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            timeout: config.timeout,
            max_bytes: config.max_bytes,
        })
    }

    /// Fetch the raw bytes at `url`.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Network`] - Connection or TLS errors
    /// - [`FetchError::Timeout`] - Request (including body) exceeded the deadline
    /// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
    /// - [`FetchError::ResponseTooLarge`] - Body exceeded the size cap
    /// - [`FetchError::IncompleteResponse`] - Body shorter than `Content-Length`
    /// - [`FetchError::Cancelled`] - `shutdown` fired first
    pub async fn fetch(&self, url: &str, shutdown: &mut Shutdown) -> Result<Vec<u8>, FetchError> {
        if shutdown.is_triggered() {
            return Err(FetchError::Cancelled);
        }

        let request = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| self.classify(e))?;

            if !response.status().is_success() {
                return Err(FetchError::HttpStatus(response.status().as_u16()));
            }

            read_limited_bytes(response, self.max_bytes)
                .await
                .map_err(|e| match e {
                    FetchError::Network(inner) => self.classify(inner),
                    other => other,
                })
        };

        tokio::select! {
            biased;
            _ = shutdown.triggered() => {
                tracing::debug!(url = %url, "fetch aborted by shutdown");
                Err(FetchError::Cancelled)
            }
            result = tokio::time::timeout(self.timeout, request) => {
                result.map_err(|_| FetchError::Timeout(self.timeout))?
            }
        }
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Network(err)
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge { limit });
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge { limit });
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title></channel></rss>"#;

    fn fetcher_with(timeout: Duration, max_bytes: usize) -> FeedFetcher {
        FeedFetcher::new(&FetchConfig {
            timeout,
            max_bytes,
            ..FetchConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success_sends_user_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(header("user-agent", DEFAULT_USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = FeedFetcher::new(&FetchConfig::default()).unwrap();
        let bytes = fetcher
            .fetch(&format!("{}/feed", mock_server.uri()), &mut Shutdown::never())
            .await
            .unwrap();
        assert_eq!(bytes, VALID_RSS.as_bytes());
    }

    #[tokio::test]
    async fn test_custom_user_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "gator-test/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = FeedFetcher::new(&FetchConfig {
            user_agent: "gator-test/1.0".to_string(),
            ..FetchConfig::default()
        })
        .unwrap();
        assert!(fetcher
            .fetch(&mock_server.uri(), &mut Shutdown::never())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_fetch_http_status_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = FeedFetcher::new(&FetchConfig::default()).unwrap();
        let err = fetcher
            .fetch(&mock_server.uri(), &mut Shutdown::never())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(503)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_fetch_404() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let fetcher = FeedFetcher::new(&FetchConfig::default()).unwrap();
        let err = fetcher
            .fetch(&mock_server.uri(), &mut Shutdown::never())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus(404)));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let fetcher = fetcher_with(Duration::from_millis(200), DEFAULT_MAX_FEED_BYTES);
        let err = fetcher
            .fetch(&mock_server.uri(), &mut Shutdown::never())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_fetch_body_too_large() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
            .mount(&mock_server)
            .await;

        let fetcher = fetcher_with(DEFAULT_TIMEOUT, 1024);
        let err = fetcher
            .fetch(&mock_server.uri(), &mut Shutdown::never())
            .await
            .unwrap_err();
        assert!(
            matches!(err, FetchError::ResponseTooLarge { limit: 1024 }),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        // Bind then drop a listener to get a port nobody is serving.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let fetcher = FeedFetcher::new(&FetchConfig::default()).unwrap();
        let err = fetcher
            .fetch(&format!("http://127.0.0.1:{port}/feed"), &mut Shutdown::never())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_shutdown_aborts_in_flight_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&mock_server)
            .await;

        let (trigger, mut listener) = shutdown::channel();
        let fetcher = FeedFetcher::new(&FetchConfig::default()).unwrap();
        let url = mock_server.uri();

        let started = std::time::Instant::now();
        let handle = tokio::spawn(async move { fetcher.fetch(&url, &mut listener).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.trigger();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, FetchError::Cancelled), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_already_cancelled_skips_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let (trigger, mut listener) = shutdown::channel();
        trigger.trigger();
        let fetcher = FeedFetcher::new(&FetchConfig::default()).unwrap();
        let err = fetcher.fetch(&mock_server.uri(), &mut listener).await.unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
    }
}
