//! Local filesystem resources (`file:` scheme).

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use url::Url;

use crate::error::{ResourceError, ResourceResult};
use crate::resolver::{ResourceFactory, Resolver};
use crate::resource::{
    move_via_copy, validate_child_name, Container, Resource, ResourceReader, ResourceRef,
    ResourceWriter,
};

/// A resource backed by a path on the local filesystem.
///
/// The resource is its own [`Container`] whenever the path is a directory.
#[derive(Debug, Clone)]
pub struct FileResource {
    path: PathBuf,
    uri: Url,
}

impl FileResource {
    /// Create a resource for a filesystem path.
    ///
    /// Relative paths are made absolute against the current directory.
    pub fn new(path: impl Into<PathBuf>) -> ResourceResult<Self> {
        let path = path.into();
        let path = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()
                .map_err(|e| ResourceError::io(path.display().to_string(), e))?
                .join(path)
        };

        let uri = Url::from_file_path(&path).map_err(|()| {
            ResourceError::unresolvable(
                path.display().to_string(),
                "path cannot be expressed as a file URI",
            )
        })?;

        Ok(Self { path, uri })
    }

    /// Create a resource from a `file:` URI.
    pub fn from_url(uri: &Url) -> ResourceResult<Self> {
        let path = uri
            .to_file_path()
            .map_err(|()| ResourceError::unresolvable(uri.as_str(), "not a local file URI"))?;
        Self::new(path)
    }

    /// The filesystem path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> ResourceError {
        ResourceError::io(self.uri.as_str(), source)
    }
}

impl Resource for FileResource {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    fn parent(&self) -> Option<ResourceRef> {
        let parent = self.path.parent()?;
        FileResource::new(parent)
            .ok()
            .map(|p| Arc::new(p) as ResourceRef)
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn supports_read(&self) -> bool {
        true
    }

    fn supports_write(&self) -> bool {
        true
    }

    fn size(&self) -> ResourceResult<u64> {
        let metadata = fs::metadata(&self.path).map_err(|e| self.io_error(e))?;
        Ok(metadata.len())
    }

    fn last_modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    fn open_read(&self) -> ResourceResult<ResourceReader> {
        let file = File::open(&self.path).map_err(|e| self.io_error(e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn open_write(&self) -> ResourceResult<ResourceWriter> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let file = File::create(&self.path).map_err(|e| self.io_error(e))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn delete(&self) -> ResourceResult<()> {
        let result = if self.path.is_dir() {
            fs::remove_dir(&self.path)
        } else {
            fs::remove_file(&self.path)
        };
        result.map_err(|e| self.io_error(e))
    }

    fn child(&self, name: &str) -> ResourceResult<ResourceRef> {
        validate_child_name(&self.uri, name)?;
        Ok(Arc::new(FileResource::new(self.path.join(name))?))
    }

    fn as_container(&self) -> Option<&dyn Container> {
        if self.path.is_dir() {
            Some(self)
        } else {
            None
        }
    }

    fn local_path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    /// Rename natively when the destination is also on the filesystem,
    /// falling back to stream copy + delete when that fails (e.g. across devices).
    fn move_to(&self, dest: &dyn Resource) -> ResourceResult<()> {
        if let Some(dest_path) = dest.local_path() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
            match fs::rename(&self.path, dest_path) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound && !self.exists() => {
                    return Err(self.io_error(e));
                }
                Err(e) => {
                    tracing::debug!(
                        from = %self.path.display(),
                        to = %dest_path.display(),
                        error = %e,
                        "Native rename failed, falling back to copy"
                    );
                }
            }
        }
        move_via_copy(self, dest)
    }
}

impl Container for FileResource {
    fn children(&self) -> ResourceResult<Vec<ResourceRef>> {
        let entries = fs::read_dir(&self.path).map_err(|e| self.io_error(e))?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.io_error(e))?;
            paths.push(entry.path());
        }
        paths.sort();

        paths
            .into_iter()
            .map(|p| FileResource::new(p).map(|r| Arc::new(r) as ResourceRef))
            .collect()
    }

    fn create_container(&self, name: &str) -> ResourceResult<ResourceRef> {
        validate_child_name(&self.uri, name)?;
        let path = self.path.join(name);
        fs::create_dir_all(&path).map_err(|e| self.io_error(e))?;
        Ok(Arc::new(FileResource::new(path)?))
    }
}

/// Factory for `file:` URIs.
#[derive(Debug, Default)]
pub struct FileFactory;

impl FileFactory {
    /// Create a new file factory.
    pub fn new() -> Self {
        Self
    }
}

impl ResourceFactory for FileFactory {
    fn schemes(&self) -> &[&'static str] {
        &["file"]
    }

    fn resolve(&self, uri: &Url, _resolver: &Resolver) -> ResourceResult<ResourceRef> {
        Ok(Arc::new(FileResource::from_url(uri)?))
    }
}
