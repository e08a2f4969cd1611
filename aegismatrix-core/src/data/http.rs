//! Blocking HTTP plumbing shared by the providers.
//!
//! [`HttpTransport`] is the seam the chart providers send requests through;
//! tests script it to produce 429s, timeouts and odd bodies.
//! [`SessionTransport`] is the matching seam for endpoints that need a
//! warm-up request first: it opens an [`HttpSession`] that lives only as long
//! as the call that opened it. [`CookieSessions`] opens real
//! [`ScopedSession`]s.

use super::headers::RequestIdentity;
use super::provider::DataError;
use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use std::time::Duration;
use tracing::debug;

/// Status code and body of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One-shot GET with an explicit request identity.
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str, identity: &RequestIdentity) -> Result<HttpReply, DataError>;
}

/// `reqwest::blocking` transport with a fixed per-request timeout.
#[derive(Debug, Clone)]
pub struct BlockingTransport {
    client: Client,
}

impl BlockingTransport {
    pub fn new(timeout: Duration) -> Result<Self, DataError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl HttpTransport for BlockingTransport {
    fn get(&self, url: &str, identity: &RequestIdentity) -> Result<HttpReply, DataError> {
        let resp = self
            .client
            .get(url)
            .headers(identity.header_map())
            .send()
            .map_err(|e| DataError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .map_err(|e| DataError::Transport(format!("failed to read body: {e}")))?;
        Ok(HttpReply { status, body })
    }
}

/// Client that carries the cookies set by its warm-up request.
pub trait HttpSession {
    fn get(&self, url: &str) -> Result<HttpReply, DataError>;
}

/// Opens one [`HttpSession`] per call.
pub trait SessionTransport: Send + Sync {
    /// Warm up on `warmup_url` with `headers` as the session defaults.
    fn open(
        &self,
        warmup_url: &str,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Result<Box<dyn HttpSession>, DataError>;
}

/// Real cookie sessions over `reqwest::blocking`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieSessions;

impl SessionTransport for CookieSessions {
    fn open(
        &self,
        warmup_url: &str,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Result<Box<dyn HttpSession>, DataError> {
        Ok(Box::new(ScopedSession::open(warmup_url, headers, timeout)?))
    }
}

/// Cookie-enabled client established by a warm-up GET.
///
/// The warm-up response status is ignored: home pages often answer with a
/// redirect or 404 while still setting the cookies the data endpoint needs.
/// Only a transport failure aborts the session.
pub struct ScopedSession {
    client: Client,
}

impl ScopedSession {
    pub fn open(warmup_url: &str, headers: HeaderMap, timeout: Duration) -> Result<Self, DataError> {
        let client = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| DataError::Session(format!("failed to build session client: {e}")))?;

        let warmup = client
            .get(warmup_url)
            .send()
            .map_err(|e| DataError::Session(format!("warm-up GET {warmup_url} failed: {e}")))?;
        debug!(url = warmup_url, status = warmup.status().as_u16(), "session warmed up");

        Ok(Self { client })
    }
}

impl HttpSession for ScopedSession {
    fn get(&self, url: &str) -> Result<HttpReply, DataError> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| DataError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .map_err(|e| DataError::Transport(format!("failed to read body: {e}")))?;
        Ok(HttpReply { status, body })
    }
}
