//! Read-only resources on FTP servers (`ftp:` scheme).
//!
//! Each operation opens its own control connection, logs in, and quits when
//! done; no session outlives a call. Existence and size come from `SIZE`,
//! the modification time from `MDTM`, and content from a passive-mode `RETR`
//! buffered in memory. Writing is not supported.
//!
//! Credentials come from the URL's user info, defaulting to an anonymous login.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};
use url::Url;

use crate::error::{ResourceError, ResourceResult};
use crate::resource::{validate_child_name, Resource, ResourceReader, ResourceRef};

/// Login used when the URL carries no user name.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Password sent with the anonymous login.
const ANONYMOUS_PASSWORD: &str = "anonymous@";

/// FTP reply code for "file unavailable".
const FILE_UNAVAILABLE: u32 = 550;

/// A file on an FTP server.
#[derive(Debug, Clone)]
pub struct FtpResource {
    uri: Url,
    timeout: Duration,
}

impl FtpResource {
    /// Create a resource for an `ftp:` URL. `timeout` bounds the connect.
    pub fn new(uri: Url, timeout: Duration) -> Self {
        Self { uri, timeout }
    }

    fn ftp_error(&self, reason: impl Into<String>) -> ResourceError {
        ResourceError::Ftp {
            uri: self.uri.to_string(),
            reason: reason.into(),
        }
    }

    fn map_error(&self, error: FtpError) -> ResourceError {
        match error {
            FtpError::UnexpectedResponse(response)
                if response.status.code() == FILE_UNAVAILABLE =>
            {
                ResourceError::io(
                    self.uri.as_str(),
                    io::Error::new(io::ErrorKind::NotFound, "server replied 550"),
                )
            }
            other => self.ftp_error(other.to_string()),
        }
    }

    fn server_addr(&self) -> ResourceResult<SocketAddr> {
        let host = self
            .uri
            .host_str()
            .ok_or_else(|| self.ftp_error("URL has no host"))?;
        let port = self.uri.port_or_known_default().unwrap_or(21);
        (host, port)
            .to_socket_addrs()
            .map_err(|e| self.ftp_error(format!("cannot resolve {}: {}", host, e)))?
            .next()
            .ok_or_else(|| self.ftp_error(format!("no address for {}", host)))
    }

    fn credentials(&self) -> ResourceResult<(String, String)> {
        if self.uri.username().is_empty() {
            return Ok((ANONYMOUS_USER.to_string(), ANONYMOUS_PASSWORD.to_string()));
        }
        let decode = |raw: &str| {
            urlencoding::decode(raw)
                .map(|s| s.into_owned())
                .map_err(|e| ResourceError::unresolvable(self.uri.as_str(), e.to_string()))
        };
        let user = decode(self.uri.username())?;
        let password = decode(self.uri.password().unwrap_or(""))?;
        Ok((user, password))
    }

    /// Server-side path of the file.
    fn remote_path(&self) -> ResourceResult<String> {
        urlencoding::decode(self.uri.path())
            .map(|s| s.into_owned())
            .map_err(|e| ResourceError::unresolvable(self.uri.as_str(), e.to_string()))
    }

    /// Run `action` in a fresh, logged-in binary-mode session.
    fn with_session<T>(
        &self,
        action: impl FnOnce(&mut FtpStream, &str) -> Result<T, FtpError>,
    ) -> ResourceResult<T> {
        let addr = self.server_addr()?;
        let (user, password) = self.credentials()?;
        let path = self.remote_path()?;

        let mut session =
            FtpStream::connect_timeout(addr, self.timeout).map_err(|e| self.map_error(e))?;
        let result = session
            .login(user.as_str(), password.as_str())
            .and_then(|_| session.transfer_type(FileType::Binary))
            .and_then(|_| action(&mut session, &path));

        if let Err(e) = session.quit() {
            tracing::debug!(uri = %self.uri, error = %e, "FTP quit failed");
        }
        result.map_err(|e| self.map_error(e))
    }
}

impl Resource for FtpResource {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn parent(&self) -> Option<ResourceRef> {
        if self.uri.path() == "/" || self.uri.path().is_empty() {
            return None;
        }
        let mut uri = self.uri.clone();
        uri.path_segments_mut().ok()?.pop_if_empty().pop();
        Some(Arc::new(FtpResource::new(uri, self.timeout)))
    }

    fn exists(&self) -> bool {
        match self.with_session(|session, path| session.size(path)) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(uri = %self.uri, error = %e, "FTP SIZE failed");
                false
            }
        }
    }

    fn supports_read(&self) -> bool {
        true
    }

    fn supports_write(&self) -> bool {
        false
    }

    fn size(&self) -> ResourceResult<u64> {
        let size = self.with_session(|session, path| session.size(path))?;
        u64::try_from(size).map_err(|e| self.ftp_error(e.to_string()))
    }

    fn last_modified(&self) -> Option<SystemTime> {
        let stamp = self
            .with_session(|session, path| session.mdtm(path))
            .ok()?;
        let secs = u64::try_from(stamp.and_utc().timestamp()).ok()?;
        Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }

    fn open_read(&self) -> ResourceResult<ResourceReader> {
        let content = self.with_session(|session, path| session.retr_as_buffer(path))?;
        tracing::debug!(
            uri = %self.uri,
            bytes = content.get_ref().len(),
            "Retrieved FTP file"
        );
        Ok(Box::new(content))
    }

    fn child(&self, name: &str) -> ResourceResult<ResourceRef> {
        validate_child_name(&self.uri, name)?;
        let mut uri = self.uri.clone();
        uri.path_segments_mut()
            .map_err(|_| ResourceError::unsupported("child", self.uri.as_str()))?
            .pop_if_empty()
            .push(name);
        Ok(Arc::new(FtpResource::new(uri, self.timeout)))
    }
}
