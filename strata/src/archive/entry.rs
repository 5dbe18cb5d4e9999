//! Resources addressing entries inside archive files (`jar:` scheme).
//!
//! URIs take the form `jar:<archive-uri>!/<entry-path>`. The archive URI is
//! resolved through the active resolver and must land on a local file.

use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use url::Url;

use super::cache::{ArchiveCache, ArchiveRegistry, EntryStream};
use super::index::normalize_entry_name;
use crate::error::{ResourceError, ResourceResult};
use crate::resolver::{ResourceFactory, Resolver};
use crate::resource::{validate_child_name, Container, Resource, ResourceReader, ResourceRef};

/// Separator between the archive URI and the entry path.
const ENTRY_SEPARATOR: &str = "!/";

/// An entry (file or directory) inside an archive.
///
/// Entry lookups go through the shared [`ArchiveCache`], so every resource
/// over the same archive shares one index and one handle lifetime.
#[derive(Debug, Clone)]
pub struct ArchiveEntryResource {
    uri: Url,
    archive_uri: Url,
    entry: String,
    cache: Arc<ArchiveCache>,
}

impl ArchiveEntryResource {
    /// Create a resource for `entry` inside the archive identified by `archive_uri`.
    pub fn new(
        archive_uri: Url,
        entry: &str,
        cache: Arc<ArchiveCache>,
    ) -> ResourceResult<Self> {
        let entry = normalize_entry_name(entry);
        let raw = format!("jar:{}{}{}", archive_uri, ENTRY_SEPARATOR, entry);
        let uri = Url::parse(&raw).map_err(|e| ResourceError::unresolvable(raw, e.to_string()))?;
        Ok(Self {
            uri,
            archive_uri,
            entry,
            cache,
        })
    }

    /// Path of the entry inside the archive (`""` for the archive root).
    pub fn entry_name(&self) -> &str {
        &self.entry
    }

    /// The shared cache backing this resource.
    pub fn cache(&self) -> &Arc<ArchiveCache> {
        &self.cache
    }

    /// Open the entry's content as an [`EntryStream`].
    pub fn open_entry(&self) -> ResourceResult<EntryStream> {
        let index = self.cache.index()?;
        match index.get(&self.entry) {
            Some(entry) if entry.is_dir => {
                Err(ResourceError::unsupported("read", self.uri.as_str()))
            }
            Some(_) => self.cache.open_entry(&self.entry),
            None if self.entry.is_empty() => {
                Err(ResourceError::unsupported("read", self.uri.as_str()))
            }
            None => Err(self.not_found()),
        }
    }

    fn sibling(&self, entry: &str) -> ResourceResult<Self> {
        Self::new(self.archive_uri.clone(), entry, Arc::clone(&self.cache))
    }

    fn not_found(&self) -> ResourceError {
        ResourceError::io(
            self.uri.as_str(),
            io::Error::new(io::ErrorKind::NotFound, "no such archive entry"),
        )
    }
}

impl Resource for ArchiveEntryResource {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        self.entry
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    fn parent(&self) -> Option<ResourceRef> {
        if self.entry.is_empty() {
            return None;
        }
        let parent = self.entry.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
        self.sibling(parent)
            .ok()
            .map(|r| Arc::new(r) as ResourceRef)
    }

    fn exists(&self) -> bool {
        match self.cache.index() {
            Ok(index) => self.entry.is_empty() || index.get(&self.entry).is_some(),
            Err(e) => {
                tracing::debug!(uri = %self.uri, error = %e, "Archive unavailable");
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
        let index = self.cache.index()?;
        if self.entry.is_empty() {
            return Ok(0);
        }
        index
            .get(&self.entry)
            .map(|e| e.size)
            .ok_or_else(|| self.not_found())
    }

    fn last_modified(&self) -> Option<SystemTime> {
        if self.entry.is_empty() {
            return std::fs::metadata(self.cache.path())
                .and_then(|m| m.modified())
                .ok();
        }
        let index = self.cache.index().ok()?;
        index.get(&self.entry)?.modified
    }

    fn open_read(&self) -> ResourceResult<ResourceReader> {
        Ok(Box::new(self.open_entry()?))
    }

    fn child(&self, name: &str) -> ResourceResult<ResourceRef> {
        validate_child_name(&self.uri, name)?;
        let entry = if self.entry.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.entry, name)
        };
        Ok(Arc::new(self.sibling(&entry)?))
    }

    fn as_container(&self) -> Option<&dyn Container> {
        match self.cache.index() {
            Ok(index) if index.is_directory(&self.entry) => Some(self),
            _ => None,
        }
    }
}

impl Container for ArchiveEntryResource {
    fn children(&self) -> ResourceResult<Vec<ResourceRef>> {
        let index = self.cache.index()?;
        index
            .children(&self.entry)
            .into_iter()
            .map(|e| self.sibling(&e.name).map(|r| Arc::new(r) as ResourceRef))
            .collect()
    }

    fn create_container(&self, _name: &str) -> ResourceResult<ResourceRef> {
        Err(ResourceError::unsupported("create_container", self.uri.as_str()))
    }
}

/// Factory for `jar:` URIs, sharing caches through an [`ArchiveRegistry`].
#[derive(Debug, Clone)]
pub struct ArchiveFactory {
    archives: Arc<ArchiveRegistry>,
}

impl ArchiveFactory {
    /// Create a factory backed by the given registry.
    pub fn new(archives: Arc<ArchiveRegistry>) -> Self {
        Self { archives }
    }

    /// The registry of archive caches.
    pub fn archives(&self) -> &Arc<ArchiveRegistry> {
        &self.archives
    }
}

impl ResourceFactory for ArchiveFactory {
    fn schemes(&self) -> &[&'static str] {
        &["jar"]
    }

    fn resolve(&self, uri: &Url, resolver: &Resolver) -> ResourceResult<ResourceRef> {
        let (archive_part, entry) = split_archive_uri(uri.as_str())
            .ok_or_else(|| ResourceError::unresolvable(uri.as_str(), "missing '!/' separator"))?;

        let archive_uri = Url::parse(archive_part)
            .map_err(|e| ResourceError::unresolvable(uri.as_str(), e.to_string()))?;
        let archive = resolver.resolve(&archive_uri)?;
        let path = archive.local_path().ok_or_else(|| {
            ResourceError::unresolvable(uri.as_str(), "archive is not a local file")
        })?;

        let entry = urlencoding::decode(entry)
            .map_err(|e| ResourceError::unresolvable(uri.as_str(), e.to_string()))?;

        let cache = self.archives.get_or_create(path);
        Ok(Arc::new(ArchiveEntryResource::new(
            archive_uri,
            &entry,
            cache,
        )?))
    }
}

/// Split `jar:<archive>!/<entry>` into its archive URI and entry path.
fn split_archive_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("jar:")?;
    if let Some(archive) = rest.strip_suffix('!') {
        return Some((archive, ""));
    }
    rest.split_once(ENTRY_SEPARATOR)
}
