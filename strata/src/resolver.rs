//! Scheme-keyed dispatch from URIs to resources.
//!
//! A [`Resolver`] maps URI schemes to [`ResourceFactory`] implementations, with
//! an optional default factory for schemes nobody claimed. Registration
//! happens once at startup through `&mut self`; afterwards the resolver is
//! shared read-only (typically behind an `Arc`) and needs no locking.
//!
//! Resolution is a pure lookup. Resolved resources are not cached; only the
//! expensive backing handles are (see [`crate::archive`]).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use strata::backend::FileFactory;
//! use strata::resolver::Resolver;
//!
//! let mut resolver = Resolver::new();
//! resolver.register_factory(Arc::new(FileFactory::new()))?;
//!
//! let resource = resolver.resolve_str("file:///tmp/notes.txt")?;
//! println!("exists: {}", resource.exists());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::archive::{ArchiveFactory, ArchiveRegistry};
use crate::backend::{FileFactory, UrlFactory};
use crate::error::{ResourceError, ResourceResult};
use crate::overlay::OverlayFactory;
use crate::resource::ResourceRef;

/// Translates URIs of one or more schemes into resources.
///
/// Factories are stateless with respect to individual URIs; they may hold
/// shared infrastructure such as an HTTP client or an archive registry.
pub trait ResourceFactory: Send + Sync {
    /// Scheme strings this factory accepts (lowercase, without the colon).
    fn schemes(&self) -> &[&'static str];

    /// Build the resource for `uri`.
    ///
    /// `resolver` is the resolver performing the dispatch, for factories whose
    /// URIs wrap other URIs.
    fn resolve(&self, uri: &Url, resolver: &Resolver) -> ResourceResult<ResourceRef>;
}

/// Registry of scheme → factory bindings.
#[derive(Default)]
pub struct Resolver {
    factories: HashMap<String, Arc<dyn ResourceFactory>>,
    default_factory: Option<Arc<dyn ResourceFactory>>,
}

impl Resolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver with the built-in factories registered.
    ///
    /// Binds `file`, `http`, `https`, `ftp`, `jar` and `ovl`. The overlay
    /// factory recognizes marker files named `marker_name`.
    pub fn with_standard_factories(
        archives: Arc<ArchiveRegistry>,
        url_factory: UrlFactory,
        marker_name: impl Into<String>,
    ) -> ResourceResult<Self> {
        let mut resolver = Self::new();
        resolver.register_factory(Arc::new(FileFactory::new()))?;
        resolver.register_factory(Arc::new(url_factory))?;
        resolver.register_factory(Arc::new(ArchiveFactory::new(archives)))?;
        resolver.register_factory(Arc::new(OverlayFactory::new(marker_name)))?;
        Ok(resolver)
    }

    /// Bind `scheme` to `factory`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::AlreadyRegistered`] if the scheme is already bound.
    pub fn register(
        &mut self,
        scheme: &str,
        factory: Arc<dyn ResourceFactory>,
    ) -> ResourceResult<()> {
        let scheme = scheme.to_ascii_lowercase();
        if self.factories.contains_key(&scheme) {
            return Err(ResourceError::AlreadyRegistered { scheme });
        }
        tracing::debug!(scheme = %scheme, "Registered resource factory");
        self.factories.insert(scheme, factory);
        Ok(())
    }

    /// Bind every scheme the factory advertises.
    ///
    /// Either all schemes are bound or, on collision, none are.
    pub fn register_factory(&mut self, factory: Arc<dyn ResourceFactory>) -> ResourceResult<()> {
        if let Some(taken) = factory
            .schemes()
            .iter()
            .find(|s| self.factories.contains_key(&s.to_ascii_lowercase()))
        {
            return Err(ResourceError::AlreadyRegistered {
                scheme: taken.to_ascii_lowercase(),
            });
        }

        for scheme in factory.schemes() {
            self.register(scheme, Arc::clone(&factory))?;
        }
        Ok(())
    }

    /// Set the factory used for schemes with no explicit binding.
    pub fn set_default_factory(&mut self, factory: Arc<dyn ResourceFactory>) {
        self.default_factory = Some(factory);
    }

    /// Resolve a parsed URI.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnresolvableUri`] when no factory handles the
    /// scheme, or whatever the chosen factory reports.
    pub fn resolve(&self, uri: &Url) -> ResourceResult<ResourceRef> {
        let factory = self
            .factories
            .get(uri.scheme())
            .or(self.default_factory.as_ref())
            .ok_or_else(|| {
                ResourceError::unresolvable(
                    uri.as_str(),
                    format!("no factory registered for scheme '{}'", uri.scheme()),
                )
            })?;

        factory.resolve(uri, self)
    }

    /// Parse and resolve a URI string.
    pub fn resolve_str(&self, uri: &str) -> ResourceResult<ResourceRef> {
        let parsed =
            Url::parse(uri).map_err(|e| ResourceError::unresolvable(uri, e.to_string()))?;
        self.resolve(&parsed)
    }

    /// Check if a scheme has an explicit binding.
    pub fn has_scheme(&self, scheme: &str) -> bool {
        self.factories.contains_key(&scheme.to_ascii_lowercase())
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("schemes", &self.schemes())
            .field("has_default", &self.default_factory.is_some())
            .finish()
    }
}
