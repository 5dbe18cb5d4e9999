//! Remote stream-only resources (`http:` and `https:` schemes).
//!
//! These resources support reading via GET and writing via PUT; existence,
//! size and modification time come from a HEAD request. There is no directory
//! listing. The factory also binds `ftp:`, handing those URLs to
//! [`FtpResource`](super::FtpResource).
//!
//! A PUT is sent only when the writer is flushed. Dropping a writer without
//! flushing discards what was written, so a copy that fails halfway never
//! replaces the remote content with a truncated body.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_LENGTH, LAST_MODIFIED};
use reqwest::StatusCode;
use url::Url;

use super::ftp::FtpResource;
use crate::error::{ResourceError, ResourceResult};
use crate::resolver::{ResourceFactory, Resolver};
use crate::resource::{validate_child_name, Resource, ResourceReader, ResourceRef, ResourceWriter};

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("strata/", env!("CARGO_PKG_VERSION"));

/// A resource reached over a URL protocol.
#[derive(Debug, Clone)]
pub struct UrlResource {
    uri: Url,
    client: Client,
}

impl UrlResource {
    /// Create a resource for a URL using the given HTTP client.
    pub fn new(uri: Url, client: Client) -> Self {
        Self { uri, client }
    }

    fn is_http(&self) -> bool {
        matches!(self.uri.scheme(), "http" | "https")
    }

    fn http_error(&self, reason: impl Into<String>) -> ResourceError {
        ResourceError::Http {
            uri: self.uri.to_string(),
            reason: reason.into(),
        }
    }

    fn require_http(&self, operation: &'static str) -> ResourceResult<()> {
        if self.is_http() {
            Ok(())
        } else {
            Err(ResourceError::unsupported(operation, self.uri.as_str()))
        }
    }

    /// Issue a HEAD request and return the response if it succeeded.
    fn head(&self) -> ResourceResult<Response> {
        self.require_http("metadata")?;
        let response = self
            .client
            .head(self.uri.clone())
            .send()
            .map_err(|e| self.http_error(e.to_string()))?;
        self.check_status(response, "HEAD")
    }

    fn check_status(&self, response: Response, method: &str) -> ResourceResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Err(ResourceError::io(
                self.uri.as_str(),
                io::Error::new(io::ErrorKind::NotFound, format!("{} returned {}", method, status)),
            ));
        }
        Err(self.http_error(format!("{} request failed with status {}", method, status)))
    }

    fn with_path(&self, edit: impl FnOnce(&mut url::PathSegmentsMut<'_>)) -> Option<Url> {
        let mut uri = self.uri.clone();
        {
            let mut segments = uri.path_segments_mut().ok()?;
            edit(&mut segments);
        }
        Some(uri)
    }
}

impl Resource for UrlResource {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn parent(&self) -> Option<ResourceRef> {
        if self.uri.path() == "/" || self.uri.path().is_empty() {
            return None;
        }
        let uri = self.with_path(|segments| {
            segments.pop_if_empty().pop();
        })?;
        Some(Arc::new(UrlResource::new(uri, self.client.clone())))
    }

    fn exists(&self) -> bool {
        if !self.is_http() {
            return false;
        }
        match self.client.head(self.uri.clone()).send() {
            Ok(response) if response.status() == StatusCode::METHOD_NOT_ALLOWED => self
                .client
                .get(self.uri.clone())
                .send()
                .map(|r| r.status().is_success())
                .unwrap_or(false),
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(uri = %self.uri, error = %e, "Existence check failed");
                false
            }
        }
    }

    fn supports_read(&self) -> bool {
        self.is_http()
    }

    fn supports_write(&self) -> bool {
        self.is_http()
    }

    fn size(&self) -> ResourceResult<u64> {
        let response = self.head()?;
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| self.http_error("response has no content-length"))
    }

    fn last_modified(&self) -> Option<SystemTime> {
        let response = self.head().ok()?;
        let value = response.headers().get(LAST_MODIFIED)?.to_str().ok()?;
        parse_http_date(value)
    }

    fn open_read(&self) -> ResourceResult<ResourceReader> {
        self.require_http("read")?;
        let response = self
            .client
            .get(self.uri.clone())
            .send()
            .map_err(|e| self.http_error(e.to_string()))?;
        let response = self.check_status(response, "GET")?;
        Ok(Box::new(response))
    }

    /// Buffer content for a PUT that is sent on `flush()`.
    fn open_write(&self) -> ResourceResult<ResourceWriter> {
        self.require_http("write")?;
        Ok(Box::new(PutWriter::new(self.uri.clone(), self.client.clone())))
    }

    fn delete(&self) -> ResourceResult<()> {
        self.require_http("delete")?;
        let response = self
            .client
            .delete(self.uri.clone())
            .send()
            .map_err(|e| self.http_error(e.to_string()))?;
        self.check_status(response, "DELETE").map(|_| ())
    }

    fn child(&self, name: &str) -> ResourceResult<ResourceRef> {
        validate_child_name(&self.uri, name)?;
        let uri = self
            .with_path(|segments| {
                segments.pop_if_empty().push(name);
            })
            .ok_or_else(|| ResourceError::unsupported("child", self.uri.as_str()))?;
        Ok(Arc::new(UrlResource::new(uri, self.client.clone())))
    }
}

/// Writer that buffers content and uploads it with a single PUT.
///
/// The upload happens on the first `flush()`. An unflushed writer uploads
/// nothing when dropped.
#[derive(Debug)]
struct PutWriter {
    uri: Url,
    client: Client,
    buffer: Vec<u8>,
    sent: bool,
}

impl PutWriter {
    fn new(uri: Url, client: Client) -> Self {
        Self {
            uri,
            client,
            buffer: Vec::new(),
            sent: false,
        }
    }

    fn send(&mut self) -> io::Result<()> {
        self.sent = true;
        let body = std::mem::take(&mut self.buffer);
        let response = self
            .client
            .put(self.uri.clone())
            .body(body)
            .send()
            .map_err(io::Error::other)?;

        if !response.status().is_success() {
            return Err(io::Error::other(format!(
                "PUT {} failed with status {}",
                self.uri,
                response.status()
            )));
        }
        Ok(())
    }
}

impl Write for PutWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.sent {
            return Err(io::Error::other("content already uploaded"));
        }
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.sent {
            return Ok(());
        }
        self.send()
    }
}

impl Drop for PutWriter {
    fn drop(&mut self) {
        if !self.sent && !self.buffer.is_empty() {
            tracing::warn!(
                uri = %self.uri,
                bytes = self.buffer.len(),
                "Discarding unflushed upload"
            );
        }
    }
}

/// Parse an HTTP date header (RFC 2822 form, e.g. `Wed, 21 Oct 2015 07:28:00 GMT`).
fn parse_http_date(value: &str) -> Option<SystemTime> {
    let parsed = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let secs = u64::try_from(parsed.timestamp()).ok()?;
    Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
}

/// Factory for `http:`, `https:` and `ftp:` URIs.
#[derive(Debug, Clone)]
pub struct UrlFactory {
    client: Client,
    timeout: Duration,
}

impl UrlFactory {
    /// Create a factory with the default timeout and user agent.
    pub fn new() -> ResourceResult<Self> {
        Self::with_settings(Duration::from_secs(DEFAULT_TIMEOUT_SECS), DEFAULT_USER_AGENT)
    }

    /// Create a factory with a custom request timeout and user agent.
    pub fn with_settings(timeout: Duration, user_agent: &str) -> ResourceResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| ResourceError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }
}

impl ResourceFactory for UrlFactory {
    fn schemes(&self) -> &[&'static str] {
        &["http", "https", "ftp"]
    }

    fn resolve(&self, uri: &Url, _resolver: &Resolver) -> ResourceResult<ResourceRef> {
        if uri.cannot_be_a_base() {
            return Err(ResourceError::unresolvable(
                uri.as_str(),
                "URL has no hierarchical path",
            ));
        }
        if uri.scheme() == "ftp" {
            return Ok(Arc::new(FtpResource::new(uri.clone(), self.timeout)));
        }
        Ok(Arc::new(UrlResource::new(uri.clone(), self.client.clone())))
    }
}
