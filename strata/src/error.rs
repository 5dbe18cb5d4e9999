//! Error types for resource resolution and access.
//!
//! Callers are expected to branch on the error kind rather than on messages:
//! "nothing knows how to resolve this URI" ([`ResourceError::UnresolvableUri`]),
//! "this kind of resource cannot do that" ([`ResourceError::Unsupported`]) and
//! "the backing store failed" ([`ResourceError::Io`], [`ResourceError::Http`],
//! [`ResourceError::Ftp`], [`ResourceError::Archive`]) are distinct variants.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Errors that can occur while resolving or accessing resources.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// No factory could turn the URI into a resource, or the URI is malformed.
    #[error("cannot resolve {uri}: {reason}")]
    UnresolvableUri { uri: String, reason: String },

    /// The resource does not support the requested operation.
    #[error("{operation} is not supported by {uri}")]
    Unsupported {
        operation: &'static str,
        uri: String,
    },

    /// A factory is already bound to the scheme.
    #[error("scheme '{scheme}' is already registered")]
    AlreadyRegistered { scheme: String },

    /// I/O failure reported by the backing store.
    #[error("I/O error on {uri}: {source}")]
    Io {
        uri: String,
        #[source]
        source: io::Error,
    },

    /// HTTP request failed or returned an unexpected status.
    #[error("HTTP error on {uri}: {reason}")]
    Http { uri: String, reason: String },

    /// FTP session failed or the server refused a command.
    #[error("FTP error on {uri}: {reason}")]
    Ftp { uri: String, reason: String },

    /// The archive could not be opened or scanned.
    #[error("archive error in {}: {reason}", path.display())]
    Archive { path: PathBuf, reason: String },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ResourceError {
    /// Build an [`ResourceError::UnresolvableUri`].
    pub fn unresolvable(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnresolvableUri {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    /// Build an [`ResourceError::Unsupported`].
    pub fn unsupported(operation: &'static str, uri: impl Into<String>) -> Self {
        Self::Unsupported {
            operation,
            uri: uri.into(),
        }
    }

    /// Build an [`ResourceError::Io`].
    pub fn io(uri: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            uri: uri.into(),
            source,
        }
    }

    /// Check if this error means the operation is not available for the resource.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Check if this error means the URI could not be resolved.
    pub fn is_unresolvable(&self) -> bool {
        matches!(self, Self::UnresolvableUri { .. })
    }

    /// Check if this error is an I/O "not found" from the backing store.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolvable_display() {
        let err = ResourceError::unresolvable("mem://x", "no factory for scheme 'mem'");
        assert_eq!(
            err.to_string(),
            "cannot resolve mem://x: no factory for scheme 'mem'"
        );
        assert!(err.is_unresolvable());
        assert!(!err.is_unsupported());
    }

    #[test]
    fn test_unsupported_display() {
        let err = ResourceError::unsupported("write", "jar:file:///a.zip!/b");
        assert_eq!(
            err.to_string(),
            "write is not supported by jar:file:///a.zip!/b"
        );
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_already_registered_display() {
        let err = ResourceError::AlreadyRegistered {
            scheme: "file".to_string(),
        };
        assert_eq!(err.to_string(), "scheme 'file' is already registered");
    }

    #[test]
    fn test_io_not_found() {
        let err = ResourceError::io(
            "file:///missing",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_not_found());
        assert!(std::error::Error::source(&err).is_some());

        let other = ResourceError::io(
            "file:///denied",
            io::Error::new(io::ErrorKind::PermissionDenied, "no"),
        );
        assert!(!other.is_not_found());
    }
}
