//! The resource contract shared by every backend.
//!
//! A [`Resource`] is a cheap, stateless handle to URI-addressed byte content.
//! Creating one never touches the backing store; existence and metadata are
//! queried lazily. Many handles may refer to the same physical entity.
//!
//! Resources that have children expose a [`Container`] facet through
//! [`Resource::as_container`]. Whether a resource supports reading or writing
//! is queryable up front with [`Resource::supports_read`] and
//! [`Resource::supports_write`]; the error path is reserved for genuine faults
//! and for callers that ignore the capability flags.
//!
//! # Example
//!
//! ```ignore
//! use strata::resource::{read_to_string, Resource};
//!
//! let resource = resolver.resolve_str("file:///etc/hostname")?;
//! if resource.supports_read() && resource.exists() {
//!     println!("{}", read_to_string(resource.as_ref())?);
//! }
//! ```

mod ops;

use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use url::Url;

use crate::error::{ResourceError, ResourceResult};

pub use ops::{copy_via_streams, move_via_copy, read_to_string, read_to_vec, write_bytes};

/// Shared handle to any resource.
pub type ResourceRef = Arc<dyn Resource>;

/// Byte stream returned by [`Resource::open_read`].
pub type ResourceReader = Box<dyn Read + Send>;

/// Byte sink returned by [`Resource::open_write`].
pub type ResourceWriter = Box<dyn Write + Send>;

/// A URI-addressed, possibly non-existent handle to byte content and/or children.
pub trait Resource: Send + Sync + fmt::Debug {
    /// Absolute URI identifying this resource.
    fn uri(&self) -> &Url;

    /// Local name: the last segment of the URI path.
    fn name(&self) -> String {
        last_segment(self.uri().path()).to_string()
    }

    /// The enclosing resource, if there is one.
    fn parent(&self) -> Option<ResourceRef>;

    /// Whether the backing entity currently exists.
    fn exists(&self) -> bool;

    /// Whether [`Resource::open_read`] is available for this kind of resource.
    fn supports_read(&self) -> bool;

    /// Whether [`Resource::open_write`] and [`Resource::delete`] are available.
    fn supports_write(&self) -> bool;

    /// Size of the content in bytes.
    fn size(&self) -> ResourceResult<u64>;

    /// Last modification time, or `None` when unknown or missing.
    fn last_modified(&self) -> Option<SystemTime>;

    /// Open the content for reading.
    fn open_read(&self) -> ResourceResult<ResourceReader>;

    /// Open the content for writing, replacing what is there.
    fn open_write(&self) -> ResourceResult<ResourceWriter> {
        Err(ResourceError::unsupported("write", self.uri().as_str()))
    }

    /// Remove the backing entity.
    fn delete(&self) -> ResourceResult<()> {
        Err(ResourceError::unsupported("delete", self.uri().as_str()))
    }

    /// Handle to a named child. The child need not exist.
    fn child(&self, name: &str) -> ResourceResult<ResourceRef> {
        let _ = name;
        Err(ResourceError::unsupported("child", self.uri().as_str()))
    }

    /// The container facet, when this resource currently has children.
    fn as_container(&self) -> Option<&dyn Container> {
        None
    }

    /// Filesystem path backing this resource, for backends that have one.
    fn local_path(&self) -> Option<&Path> {
        None
    }

    /// Move this resource's content to `dest`.
    ///
    /// The default streams the bytes across and deletes the source.
    fn move_to(&self, dest: &dyn Resource) -> ResourceResult<()> {
        move_via_copy(self, dest)
    }

    /// Rename within the parent, returning the renamed resource.
    fn rename(&self, new_name: &str) -> ResourceResult<ResourceRef> {
        let parent = self
            .parent()
            .ok_or_else(|| ResourceError::unsupported("rename", self.uri().as_str()))?;
        let target = parent.child(new_name)?;
        self.move_to(target.as_ref())?;
        Ok(target)
    }
}

/// The child-enumeration facet of a resource.
pub trait Container: Send + Sync {
    /// Resources directly contained in this one.
    fn children(&self) -> ResourceResult<Vec<ResourceRef>>;

    /// Create a child container and return it.
    fn create_container(&self, name: &str) -> ResourceResult<ResourceRef>;
}

/// Last non-empty `/`-separated segment of a path.
pub(crate) fn last_segment(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// Reject names that would escape the parent or address several levels.
pub(crate) fn validate_child_name(uri: &Url, name: &str) -> ResourceResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(ResourceError::unresolvable(
            uri.as_str(),
            format!("invalid child name '{}'", name),
        ));
    }
    Ok(())
}
