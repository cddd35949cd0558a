//! Remote interpretation client.
//!
//! One GET per lookup against the interpretation API, bounded by a hard
//! deadline that aborts the in-flight request. Payload validation happens
//! here at the boundary; later tiers trust what they receive. The service
//! signals "no confident answer" through a sentinel phrase in the meaning
//! itself, which callers may show but must never persist.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::protocol::InterpretPayload;

/// Default interpretation API root.
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api/v1";
/// Hard deadline for one interpretation request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Phrase the service embeds when it found no confident interpretation.
pub const NOT_FOUND_SENTINEL: &str = "정확한 해석을 찾지 못했습니다";

/// Escapes everything except alphanumerics and `-_.!~*'()`, the same set
/// `encodeURIComponent` leaves bare.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub api_base: String,
    pub timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ResolverConfig {
    /// Default config with the `JARGON_API_BASE` environment override applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base) = std::env::var("JARGON_API_BASE") {
            if !base.is_empty() {
                config.api_base = base;
            }
        }
        config
    }
}

#[derive(Debug)]
pub enum ResolveError {
    /// The deadline elapsed and the request was aborted.
    Timeout,
    /// The API answered with a non-success status.
    HttpStatus(u16),
    /// Connection-level failure.
    Network(String),
    /// The body did not match the expected payload schema.
    MalformedPayload(String),
    /// The caller's token was cancelled while the request was in flight.
    Cancelled,
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::Timeout => write!(f, "interpretation request timed out"),
            ResolveError::HttpStatus(code) => write!(f, "API {code}"),
            ResolveError::Network(e) => write!(f, "network error: {e}"),
            ResolveError::MalformedPayload(e) => write!(f, "malformed interpretation payload: {e}"),
            ResolveError::Cancelled => write!(f, "interpretation request cancelled"),
        }
    }
}

impl std::error::Error for ResolveError {}

impl From<reqwest::Error> for ResolveError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ResolveError::Timeout
        } else if e.is_decode() {
            ResolveError::MalformedPayload(e.to_string())
        } else {
            ResolveError::Network(e.to_string())
        }
    }
}

/// A validated answer from the interpretation backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    pub meaning_line: String,
    /// Hostname the answer came from, recorded into the cache entry.
    pub source_host: String,
    /// False for sentinel or empty answers, which must not be persisted.
    pub cacheable: bool,
}

pub type ResolveFuture<'a> = Pin<Box<dyn Future<Output = Result<Interpretation, ResolveError>> + Send + 'a>>;

/// Backend seam for the remote tier, so tests and alternate transports can
/// stand in for the HTTP client.
pub trait Interpret: Send + Sync {
    fn interpret<'a>(
        &'a self,
        term: &'a str,
        context: &'a str,
        cancel: &'a CancellationToken,
    ) -> ResolveFuture<'a>;
}

/// reqwest-backed resolver talking to the interpretation API.
pub struct HttpResolver {
    http: reqwest::Client,
    api_base: String,
}

impl HttpResolver {
    pub fn new(config: ResolverConfig) -> Result<Self, ResolveError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ResolveError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_base: config.api_base,
        })
    }

    fn interpret_url(&self, term: &str) -> String {
        format!(
            "{}/jargons/interpret/{}",
            self.api_base,
            utf8_percent_encode(term, COMPONENT)
        )
    }

    async fn fetch(&self, term: &str, context: &str) -> Result<Interpretation, ResolveError> {
        let url = self.interpret_url(term);
        let started = Instant::now();

        let response = self
            .http
            .get(&url)
            .query(&[("context", context)])
            .send()
            .await?;

        let status = response.status();
        debug!(
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "interpretation fetch answered"
        );
        if !status.is_success() {
            return Err(ResolveError::HttpStatus(status.as_u16()));
        }

        let source_host = response
            .url()
            .host_str()
            .map(str::to_string)
            .unwrap_or_default();
        let payload: InterpretPayload = response.json().await?;

        let cacheable =
            !payload.meaning_line.is_empty() && !payload.meaning_line.contains(NOT_FOUND_SENTINEL);
        Ok(Interpretation {
            meaning_line: payload.meaning_line,
            source_host,
            cacheable,
        })
    }
}

impl Interpret for HttpResolver {
    fn interpret<'a>(
        &'a self,
        term: &'a str,
        context: &'a str,
        cancel: &'a CancellationToken,
    ) -> ResolveFuture<'a> {
        Box::pin(async move {
            tokio::select! {
                result = self.fetch(term, context) => result,
                _ = cancel.cancelled() => Err(ResolveError::Cancelled),
            }
        })
    }
}

/// Scripted resolver for pipeline tests: pops pre-seeded outcomes and records
/// what it was asked.
#[cfg(test)]
pub struct StubResolver {
    outcomes: parking_lot::Mutex<Vec<Result<Interpretation, ResolveError>>>,
    seen: parking_lot::Mutex<Vec<(String, String)>>,
    calls: std::sync::atomic::AtomicUsize,
    delay: Option<Duration>,
}

#[cfg(test)]
impl StubResolver {
    pub fn new(outcomes: Vec<Result<Interpretation, ResolveError>>) -> Self {
        Self {
            outcomes: parking_lot::Mutex::new(outcomes),
            seen: parking_lot::Mutex::new(Vec::new()),
            calls: std::sync::atomic::AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn answering(meaning_line: &str) -> Self {
        Self::new(vec![Ok(Interpretation {
            meaning_line: meaning_line.to_string(),
            source_host: "127.0.0.1".to_string(),
            cacheable: true,
        })])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// `(term, context)` pairs in call order.
    pub fn seen(&self) -> Vec<(String, String)> {
        self.seen.lock().clone()
    }
}

#[cfg(test)]
impl Interpret for StubResolver {
    fn interpret<'a>(
        &'a self,
        term: &'a str,
        context: &'a str,
        cancel: &'a CancellationToken,
    ) -> ResolveFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.seen
                .lock()
                .push((term.to_string(), context.to_string()));
            if let Some(delay) = self.delay {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(ResolveError::Cancelled),
                }
            }
            self.outcomes
                .lock()
                .pop()
                .unwrap_or_else(|| Err(ResolveError::Network("stub exhausted".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one connection, read the request, answer with `response` raw.
    async fn serve_once(listener: TcpListener, response: String) {
        if let Ok((mut sock, _)) = listener.accept().await {
            let mut buf = [0u8; 2048];
            let _ = sock.read(&mut buf).await;
            let _ = sock.write_all(response.as_bytes()).await;
            let _ = sock.shutdown().await;
        }
    }

    fn http_response(status_line: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    async fn resolver_for(listener: &TcpListener, timeout: Duration) -> HttpResolver {
        let addr = listener.local_addr().unwrap();
        HttpResolver::new(ResolverConfig {
            api_base: format!("http://{addr}/api/v1"),
            timeout,
        })
        .unwrap()
    }

    #[test]
    fn test_url_building_percent_encodes_the_term() {
        let resolver = HttpResolver::new(ResolverConfig::default()).unwrap();
        let url = resolver.interpret_url("갑분싸");
        assert_eq!(
            url,
            "http://127.0.0.1:8000/api/v1/jargons/interpret/%EA%B0%91%EB%B6%84%EC%8B%B8"
        );

        // spaces and slashes cannot leak into the path segment
        let url = resolver.interpret_url("a b/c");
        assert_eq!(url, "http://127.0.0.1:8000/api/v1/jargons/interpret/a%20b%2Fc");
    }

    #[test]
    fn test_default_deadline_is_ten_seconds() {
        assert_eq!(ResolverConfig::default().timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_success_payload_is_cacheable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let resolver = resolver_for(&listener, Duration::from_secs(5)).await;
        tokio::spawn(serve_once(
            listener,
            http_response("200 OK", r#"{"meaning_line":"갑자기 분위기가 싸해짐"}"#),
        ));

        let cancel = CancellationToken::new();
        let got = resolver.interpret("갑분싸", "", &cancel).await.unwrap();
        assert_eq!(got.meaning_line, "갑자기 분위기가 싸해짐");
        assert_eq!(got.source_host, "127.0.0.1");
        assert!(got.cacheable);
    }

    #[tokio::test]
    async fn test_sentinel_answer_is_not_cacheable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let resolver = resolver_for(&listener, Duration::from_secs(5)).await;
        let body = format!(r#"{{"meaning_line":"{NOT_FOUND_SENTINEL}."}}"#);
        tokio::spawn(serve_once(listener, http_response("200 OK", &body)));

        let cancel = CancellationToken::new();
        let got = resolver.interpret("듣보잡어", "", &cancel).await.unwrap();
        assert!(got.meaning_line.contains(NOT_FOUND_SENTINEL));
        assert!(!got.cacheable);
    }

    #[tokio::test]
    async fn test_non_success_status_maps_to_http_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let resolver = resolver_for(&listener, Duration::from_secs(5)).await;
        tokio::spawn(serve_once(listener, http_response("404 Not Found", "{}")));

        let cancel = CancellationToken::new();
        let err = resolver.interpret("없는말", "", &cancel).await.unwrap_err();
        assert!(matches!(err, ResolveError::HttpStatus(404)));
        assert_eq!(err.to_string(), "API 404");
    }

    #[tokio::test]
    async fn test_schema_violation_maps_to_malformed_payload() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let resolver = resolver_for(&listener, Duration::from_secs(5)).await;
        tokio::spawn(serve_once(
            listener,
            http_response("200 OK", r#"{"unexpected":"shape"}"#),
        ));

        let cancel = CancellationToken::new();
        let err = resolver.interpret("말", "", &cancel).await.unwrap_err();
        assert!(matches!(err, ResolveError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn test_unresponsive_server_aborts_with_timeout() {
        // accept the connection but never answer
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let resolver = resolver_for(&listener, Duration::from_millis(200)).await;
        tokio::spawn(async move {
            if let Ok((sock, _)) = listener.accept().await {
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(sock);
            }
        });

        let cancel = CancellationToken::new();
        let started = Instant::now();
        let err = resolver.interpret("느림보", "", &cancel).await.unwrap_err();
        assert!(matches!(err, ResolveError::Timeout));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancelled_token_wins_over_a_hung_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let resolver = resolver_for(&listener, Duration::from_secs(30)).await;
        tokio::spawn(async move {
            if let Ok((sock, _)) = listener.accept().await {
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(sock);
            }
        });

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = resolver.interpret("중단", "", &cancel).await.unwrap_err();
        assert!(matches!(err, ResolveError::Cancelled));
    }
}
