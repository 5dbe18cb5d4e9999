//! Factory for the `ovl` scheme.

use url::Url;

use crate::error::{ResourceError, ResourceResult};
use crate::resolver::{ResourceFactory, Resolver};
use crate::resource::ResourceRef;

use super::context::OverlayContext;
use super::resource::{OverlayResource, DEFAULT_MARKER_NAME};

/// Resolves `ovl:` URIs.
///
/// Two forms are accepted:
///
/// - `ovl:<inner-uri>` resolves the inner URI and wraps it with any bases its
///   marker files declare.
/// - `ovl://<name>/<path>` looks `name` up in the calling thread's current
///   [`OverlayContext`] and walks `path` below that root.
#[derive(Debug, Clone)]
pub struct OverlayFactory {
    marker_name: String,
}

impl Default for OverlayFactory {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER_NAME)
    }
}

impl OverlayFactory {
    /// Create a factory recognizing marker files named `marker_name`.
    pub fn new(marker_name: impl Into<String>) -> Self {
        Self {
            marker_name: marker_name.into(),
        }
    }

    /// Name of the marker file that declares a base.
    pub fn marker_name(&self) -> &str {
        &self.marker_name
    }

    fn resolve_wrapped(&self, uri: &Url, resolver: &Resolver) -> ResourceResult<ResourceRef> {
        // Everything after the scheme, so the inner query and fragment survive.
        let inner = &uri.as_str()[uri.scheme().len() + 1..];
        if inner.is_empty() {
            return Err(ResourceError::unresolvable(uri.as_str(), "missing inner URI"));
        }
        let candidate = resolver.resolve_str(inner)?;
        OverlayResource::wrap(candidate, resolver, &self.marker_name)
    }

    fn resolve_named(&self, uri: &Url) -> ResourceResult<ResourceRef> {
        let name = uri.host_str().unwrap_or("");
        let segments = uri
            .path_segments()
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .map(|s| {
                urlencoding::decode(s)
                    .map(|decoded| decoded.into_owned())
                    .map_err(|e| ResourceError::unresolvable(uri.as_str(), e.to_string()))
            })
            .collect::<ResourceResult<Vec<String>>>()?;

        let context = OverlayContext::current().ok_or_else(|| {
            ResourceError::unresolvable(uri.as_str(), "no overlay context is active")
        })?;

        context.resolve(uri, name, &segments)
    }
}

impl ResourceFactory for OverlayFactory {
    fn schemes(&self) -> &[&'static str] {
        &["ovl"]
    }

    fn resolve(&self, uri: &Url, resolver: &Resolver) -> ResourceResult<ResourceRef> {
        if uri.cannot_be_a_base() {
            self.resolve_wrapped(uri, resolver)
        } else {
            self.resolve_named(uri)
        }
    }
}
