//! Structural merge of two resource trees.
//!
//! An [`OverlayResource`] pairs a writable *overlay* with a read-only *base*.
//! It holds no state of its own; every operation delegates:
//!
//! | Operation                         | Target                                  |
//! |-----------------------------------|-----------------------------------------|
//! | `exists`                          | overlay OR base                         |
//! | `open_read`, `size`, `last_modified` | overlay if it exists, else base      |
//! | `open_write`, `create_container`  | overlay                                 |
//! | `delete`                          | every layer the entity exists in        |
//! | `move_to`, `rename`               | overlay, only while the base lacks it   |
//! | `child`                           | new overlay of both layers' children    |
//! | `children`                        | overlay children then base children     |
//!
//! Deleting removes the entity from both layers so a deleted overlay entry
//! never lets the base entry reappear. Every layer holding the entity must
//! support writes; otherwise the call reports [`ResourceError::Unsupported`]
//! and neither layer is touched.
//!
//! Moving never writes the base. An entity the base also holds cannot be
//! moved, since the base copy would stay visible at the old name.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use ini::Ini;
use url::Url;

use crate::error::{ResourceError, ResourceResult};
use crate::resolver::Resolver;
use crate::resource::{
    read_to_string, Container, Resource, ResourceReader, ResourceRef, ResourceWriter,
};

/// Default name of the marker file that declares an overlay's base.
pub const DEFAULT_MARKER_NAME: &str = "overlay.properties";

/// Marker key naming the base URI.
const BASE_KEY: &str = "base";

/// Deepest chain of marker-declared bases followed before giving up.
const MAX_BASE_CHAIN: usize = 16;

/// A writable overlay shadowing a read-only base.
#[derive(Debug, Clone)]
pub struct OverlayResource {
    uri: Url,
    overlay: ResourceRef,
    base: ResourceRef,
}

impl OverlayResource {
    /// Merge `overlay` over `base`. The URI is `ovl:` followed by the overlay's URI.
    pub fn new(overlay: ResourceRef, base: ResourceRef) -> ResourceResult<Self> {
        let raw = format!("ovl:{}", overlay.uri());
        let uri = Url::parse(&raw).map_err(|e| ResourceError::unresolvable(raw, e.to_string()))?;
        Ok(Self::with_uri(uri, overlay, base))
    }

    /// Merge `overlay` over `base` under an explicit URI.
    pub fn with_uri(uri: Url, overlay: ResourceRef, base: ResourceRef) -> Self {
        Self { uri, overlay, base }
    }

    /// The writable top layer.
    pub fn overlay(&self) -> &ResourceRef {
        &self.overlay
    }

    /// The read-only fallback layer.
    pub fn base(&self) -> &ResourceRef {
        &self.base
    }

    /// Wrap `candidate` in overlays declared by marker files.
    ///
    /// If `candidate` is a container holding a marker file named
    /// `marker_name` with a `base` property, the base URI (relative to the
    /// marker file) is resolved, wrapped the same way, and merged under
    /// `candidate`. Otherwise `candidate` is returned unchanged.
    ///
    /// # Marker format
    ///
    /// ```text
    /// # overlay.properties
    /// base = ../vendor/theme/
    /// ```
    pub fn wrap(
        candidate: ResourceRef,
        resolver: &Resolver,
        marker_name: &str,
    ) -> ResourceResult<ResourceRef> {
        Self::wrap_at_depth(candidate, resolver, marker_name, 0)
    }

    fn wrap_at_depth(
        candidate: ResourceRef,
        resolver: &Resolver,
        marker_name: &str,
        depth: usize,
    ) -> ResourceResult<ResourceRef> {
        if candidate.as_container().is_none() {
            return Ok(candidate);
        }

        let marker = candidate.child(marker_name)?;
        if !marker.exists() {
            return Ok(candidate);
        }

        if depth >= MAX_BASE_CHAIN {
            return Err(ResourceError::unresolvable(
                candidate.uri().as_str(),
                format!("overlay base chain exceeds {} levels", MAX_BASE_CHAIN),
            ));
        }

        let Some(base_ref) = read_base_property(marker.as_ref())? else {
            return Ok(candidate);
        };

        let base_uri = marker
            .uri()
            .join(&base_ref)
            .map_err(|e| ResourceError::unresolvable(base_ref.as_str(), e.to_string()))?;

        tracing::debug!(
            overlay = %candidate.uri(),
            base = %base_uri,
            "Wrapping overlay declared by marker"
        );

        let base = resolver.resolve(&base_uri)?;
        let base = Self::wrap_at_depth(base, resolver, marker_name, depth + 1)?;
        Ok(Arc::new(OverlayResource::new(candidate, base)?))
    }

    /// The layer reads come from.
    fn active(&self) -> &ResourceRef {
        if self.overlay.exists() {
            &self.overlay
        } else {
            &self.base
        }
    }

    /// Fail unless a move can be carried out in the overlay alone.
    fn check_movable(&self, operation: &'static str) -> ResourceResult<()> {
        if self.base.exists() {
            return Err(ResourceError::unsupported(operation, self.base.uri().as_str()));
        }
        if !self.overlay.supports_write() {
            return Err(ResourceError::unsupported(operation, self.overlay.uri().as_str()));
        }
        Ok(())
    }
}

/// Read the `base` key from a properties-style marker file.
fn read_base_property(marker: &dyn Resource) -> ResourceResult<Option<String>> {
    let text = read_to_string(marker)?;
    let properties = Ini::load_from_str(&text).map_err(|e| {
        ResourceError::Config(format!("malformed overlay marker {}: {}", marker.uri(), e))
    })?;
    Ok(properties
        .general_section()
        .get(BASE_KEY)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from))
}

impl Resource for OverlayResource {
    fn uri(&self) -> &Url {
        &self.uri
    }

    fn name(&self) -> String {
        self.overlay.name()
    }

    fn parent(&self) -> Option<ResourceRef> {
        match (self.overlay.parent(), self.base.parent()) {
            (Some(overlay), Some(base)) => OverlayResource::new(overlay, base)
                .ok()
                .map(|r| Arc::new(r) as ResourceRef),
            (Some(overlay), None) => Some(overlay),
            (None, Some(base)) => Some(base),
            (None, None) => None,
        }
    }

    fn exists(&self) -> bool {
        self.overlay.exists() || self.base.exists()
    }

    fn supports_read(&self) -> bool {
        self.overlay.supports_read() || self.base.supports_read()
    }

    fn supports_write(&self) -> bool {
        self.overlay.supports_write()
    }

    fn size(&self) -> ResourceResult<u64> {
        self.active().size()
    }

    fn last_modified(&self) -> Option<SystemTime> {
        self.active().last_modified()
    }

    fn open_read(&self) -> ResourceResult<ResourceReader> {
        self.active().open_read()
    }

    fn open_write(&self) -> ResourceResult<ResourceWriter> {
        self.overlay.open_write()
    }

    fn delete(&self) -> ResourceResult<()> {
        let in_overlay = self.overlay.exists();
        let in_base = self.base.exists();

        if !in_overlay && !in_base {
            return self.overlay.delete();
        }
        for (present, layer) in [(in_overlay, &self.overlay), (in_base, &self.base)] {
            if present && !layer.supports_write() {
                return Err(ResourceError::unsupported("delete", layer.uri().as_str()));
            }
        }
        if in_overlay {
            self.overlay.delete()?;
        }
        if in_base {
            self.base.delete()?;
        }
        Ok(())
    }

    fn child(&self, name: &str) -> ResourceResult<ResourceRef> {
        let overlay = self.overlay.child(name)?;
        let base = self.base.child(name)?;
        Ok(Arc::new(OverlayResource::new(overlay, base)?))
    }

    fn move_to(&self, dest: &dyn Resource) -> ResourceResult<()> {
        self.check_movable("move")?;
        if !dest.supports_write() {
            return Err(ResourceError::unsupported("move", dest.uri().as_str()));
        }
        self.overlay.move_to(dest)
    }

    /// Rename inside the overlay layer. The result pairs the renamed overlay
    /// entry with the base's sibling of the same name, when there is one.
    fn rename(&self, new_name: &str) -> ResourceResult<ResourceRef> {
        self.check_movable("rename")?;
        let overlay_parent = self
            .overlay
            .parent()
            .ok_or_else(|| ResourceError::unsupported("rename", self.uri.as_str()))?;
        let target = overlay_parent.child(new_name)?;
        self.overlay.move_to(target.as_ref())?;

        match self.base.parent() {
            Some(base_parent) => {
                let base = base_parent.child(new_name)?;
                Ok(Arc::new(OverlayResource::new(target, base)?))
            }
            None => Ok(target),
        }
    }

    fn as_container(&self) -> Option<&dyn Container> {
        if self.overlay.as_container().is_some() || self.base.as_container().is_some() {
            Some(self)
        } else {
            None
        }
    }

    /// The overlay's path, only while the overlay layer exists.
    fn local_path(&self) -> Option<&Path> {
        if self.overlay.exists() {
            self.overlay.local_path()
        } else {
            None
        }
    }
}

impl Container for OverlayResource {
    fn children(&self) -> ResourceResult<Vec<ResourceRef>> {
        let mut names = Vec::new();
        for layer in [&self.overlay, &self.base] {
            if let Some(container) = layer.as_container() {
                names.extend(container.children()?.iter().map(|c| c.name()));
            }
        }

        names.iter().map(|name| self.child(name)).collect()
    }

    fn create_container(&self, name: &str) -> ResourceResult<ResourceRef> {
        let container = self
            .overlay
            .as_container()
            .ok_or_else(|| ResourceError::unsupported("create_container", self.uri.as_str()))?;
        let created = container.create_container(name)?;
        let base = self.base.child(name)?;
        Ok(Arc::new(OverlayResource::new(created, base)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FileFactory, FileResource};
    use crate::resource::{read_to_string, write_bytes};
    use std::fs;
    use tempfile::TempDir;

    struct Layers {
        _temp: TempDir,
        overlay_dir: std::path::PathBuf,
        base_dir: std::path::PathBuf,
    }

    fn layers() -> Layers {
        let temp = TempDir::new().unwrap();
        let overlay_dir = temp.path().join("overlay");
        let base_dir = temp.path().join("base");
        fs::create_dir_all(&overlay_dir).unwrap();
        fs::create_dir_all(&base_dir).unwrap();
        Layers {
            _temp: temp,
            overlay_dir,
            base_dir,
        }
    }

    fn merged(layers: &Layers) -> OverlayResource {
        OverlayResource::new(
            Arc::new(FileResource::new(&layers.overlay_dir).unwrap()),
            Arc::new(FileResource::new(&layers.base_dir).unwrap()),
        )
        .unwrap()
    }

    fn file_resolver() -> Resolver {
        let mut resolver = Resolver::new();
        resolver
            .register_factory(Arc::new(FileFactory::new()))
            .unwrap();
        resolver
    }

    #[test]
    fn test_uri_prefixes_overlay_uri() {
        let layers = layers();
        let root = merged(&layers);
        assert!(root.uri().as_str().starts_with("ovl:file://"));
        assert_eq!(root.name(), "overlay");
    }

    #[test]
    fn test_base_shows_through_then_overlay_shadows() {
        let layers = layers();
        fs::write(layers.base_dir.join("base.txt"), b"B").unwrap();
        let file = merged(&layers).child("base.txt").unwrap();

        assert!(file.exists());
        assert_eq!(read_to_string(file.as_ref()).unwrap(), "B");

        write_bytes(file.as_ref(), b"O").unwrap();

        assert!(layers.overlay_dir.join("base.txt").exists());
        assert_eq!(read_to_string(file.as_ref()).unwrap(), "O");
        assert_eq!(fs::read(layers.base_dir.join("base.txt")).unwrap(), b"B");
    }

    #[test]
    fn test_metadata_follows_active_layer() {
        let layers = layers();
        fs::write(layers.base_dir.join("f.txt"), b"base content").unwrap();
        let file = merged(&layers).child("f.txt").unwrap();
        assert_eq!(file.size().unwrap(), 12);

        fs::write(layers.overlay_dir.join("f.txt"), b"ovl").unwrap();
        assert_eq!(file.size().unwrap(), 3);
    }

    #[test]
    fn test_nested_children_keep_precedence() {
        let layers = layers();
        fs::create_dir_all(layers.base_dir.join("a/b")).unwrap();
        fs::write(layers.base_dir.join("a/b/deep.txt"), b"base deep").unwrap();
        let root = merged(&layers);

        let deep = root
            .child("a")
            .and_then(|a| a.child("b"))
            .and_then(|b| b.child("deep.txt"))
            .unwrap();
        assert!(deep.exists());
        assert_eq!(read_to_string(deep.as_ref()).unwrap(), "base deep");

        fs::create_dir_all(layers.overlay_dir.join("a/b")).unwrap();
        fs::write(layers.overlay_dir.join("a/b/deep.txt"), b"overlay deep").unwrap();
        assert_eq!(read_to_string(deep.as_ref()).unwrap(), "overlay deep");
    }

    #[test]
    fn test_children_concatenate_layers() {
        let layers = layers();
        fs::write(layers.overlay_dir.join("shared.txt"), b"o").unwrap();
        fs::write(layers.overlay_dir.join("only_overlay.txt"), b"o").unwrap();
        fs::write(layers.base_dir.join("shared.txt"), b"b").unwrap();
        fs::write(layers.base_dir.join("only_base.txt"), b"b").unwrap();

        let root = merged(&layers);
        let names: Vec<String> = root
            .as_container()
            .unwrap()
            .children()
            .unwrap()
            .iter()
            .map(|c| c.name())
            .collect();

        assert_eq!(
            names,
            vec!["only_overlay.txt", "shared.txt", "only_base.txt", "shared.txt"]
        );
    }

    #[test]
    fn test_delete_removes_both_layers() {
        let layers = layers();
        fs::write(layers.overlay_dir.join("x.txt"), b"o").unwrap();
        fs::write(layers.base_dir.join("x.txt"), b"b").unwrap();
        let file = merged(&layers).child("x.txt").unwrap();

        file.delete().unwrap();

        assert!(!file.exists());
        assert!(!layers.overlay_dir.join("x.txt").exists());
        assert!(!layers.base_dir.join("x.txt").exists());
    }

    /// A file layer that refuses writes, standing in for a read-only base.
    #[derive(Debug)]
    struct ReadOnly(ResourceRef);

    impl Resource for ReadOnly {
        fn uri(&self) -> &Url {
            self.0.uri()
        }

        fn name(&self) -> String {
            self.0.name()
        }

        fn parent(&self) -> Option<ResourceRef> {
            self.0
                .parent()
                .map(|p| Arc::new(ReadOnly(p)) as ResourceRef)
        }

        fn exists(&self) -> bool {
            self.0.exists()
        }

        fn supports_read(&self) -> bool {
            true
        }

        fn supports_write(&self) -> bool {
            false
        }

        fn size(&self) -> ResourceResult<u64> {
            self.0.size()
        }

        fn last_modified(&self) -> Option<SystemTime> {
            self.0.last_modified()
        }

        fn open_read(&self) -> ResourceResult<ResourceReader> {
            self.0.open_read()
        }

        fn child(&self, name: &str) -> ResourceResult<ResourceRef> {
            Ok(Arc::new(ReadOnly(self.0.child(name)?)))
        }
    }

    fn merged_over_read_only(layers: &Layers) -> OverlayResource {
        OverlayResource::new(
            Arc::new(FileResource::new(&layers.overlay_dir).unwrap()),
            Arc::new(ReadOnly(Arc::new(FileResource::new(&layers.base_dir).unwrap()))),
        )
        .unwrap()
    }

    #[test]
    fn test_delete_over_read_only_base_touches_nothing() {
        let layers = layers();
        fs::write(layers.overlay_dir.join("x.txt"), b"o").unwrap();
        fs::write(layers.base_dir.join("x.txt"), b"b").unwrap();
        let file = merged_over_read_only(&layers).child("x.txt").unwrap();

        let err = file.delete().unwrap_err();

        assert!(err.is_unsupported());
        assert_eq!(fs::read(layers.overlay_dir.join("x.txt")).unwrap(), b"o");
        assert_eq!(fs::read(layers.base_dir.join("x.txt")).unwrap(), b"b");
    }

    #[test]
    fn test_delete_overlay_only_over_read_only_base() {
        let layers = layers();
        fs::write(layers.overlay_dir.join("x.txt"), b"o").unwrap();
        let file = merged_over_read_only(&layers).child("x.txt").unwrap();

        file.delete().unwrap();

        assert!(!layers.overlay_dir.join("x.txt").exists());
    }

    #[test]
    fn test_rename_base_entry_fails_without_side_effects() {
        let layers = layers();
        fs::write(layers.base_dir.join("a.txt"), b"base").unwrap();

        for root in [merged(&layers), merged_over_read_only(&layers)] {
            let file = root.child("a.txt").unwrap();
            let err = file.rename("b.txt").unwrap_err();

            assert!(err.is_unsupported());
            assert_eq!(fs::read(layers.base_dir.join("a.txt")).unwrap(), b"base");
            assert!(!layers.base_dir.join("b.txt").exists());
            assert!(!layers.overlay_dir.join("b.txt").exists());
        }
    }

    #[test]
    fn test_rename_shadowed_entry_keeps_both_layers() {
        let layers = layers();
        fs::write(layers.overlay_dir.join("a.txt"), b"overlay").unwrap();
        fs::write(layers.base_dir.join("a.txt"), b"base").unwrap();
        let file = merged(&layers).child("a.txt").unwrap();

        assert!(file.rename("b.txt").unwrap_err().is_unsupported());

        assert_eq!(fs::read(layers.overlay_dir.join("a.txt")).unwrap(), b"overlay");
        assert_eq!(fs::read(layers.base_dir.join("a.txt")).unwrap(), b"base");
        assert!(!layers.overlay_dir.join("b.txt").exists());
    }

    #[test]
    fn test_rename_overlay_entry_leaves_base_alone() {
        let layers = layers();
        fs::write(layers.overlay_dir.join("a.txt"), b"overlay").unwrap();
        fs::write(layers.base_dir.join("other.txt"), b"base").unwrap();
        let file = merged_over_read_only(&layers).child("a.txt").unwrap();

        let renamed = file.rename("b.txt").unwrap();

        assert!(renamed.uri().as_str().starts_with("ovl:"));
        assert_eq!(read_to_string(renamed.as_ref()).unwrap(), "overlay");
        assert!(!layers.overlay_dir.join("a.txt").exists());
        assert_eq!(fs::read(layers.base_dir.join("other.txt")).unwrap(), b"base");
        assert!(!layers.base_dir.join("b.txt").exists());
    }

    #[test]
    fn test_move_to_read_only_destination_fails() {
        let layers = layers();
        fs::write(layers.overlay_dir.join("a.txt"), b"overlay").unwrap();
        let file = merged(&layers).child("a.txt").unwrap();
        let dest = ReadOnly(Arc::new(
            FileResource::new(layers.base_dir.join("a.txt")).unwrap(),
        ));

        assert!(file.move_to(&dest).unwrap_err().is_unsupported());
        assert!(layers.overlay_dir.join("a.txt").exists());
    }

    #[test]
    fn test_delete_missing_fails() {
        let layers = layers();
        let file = merged(&layers).child("missing.txt").unwrap();
        assert!(file.delete().unwrap_err().is_not_found());
    }

    #[test]
    fn test_create_container_targets_overlay() {
        let layers = layers();
        let root = merged(&layers);

        let created = root.as_container().unwrap().create_container("new").unwrap();

        assert!(layers.overlay_dir.join("new").is_dir());
        assert!(!layers.base_dir.join("new").exists());
        assert!(created.exists());
    }

    #[test]
    fn test_parent_composes_layers() {
        let layers = layers();
        let file = merged(&layers).child("f.txt").unwrap();
        let parent = file.parent().unwrap();
        assert!(parent.uri().as_str().starts_with("ovl:file://"));
        assert!(parent.uri().as_str().ends_with("/overlay"));
    }

    #[test]
    fn test_wrap_without_marker_returns_candidate() {
        let layers = layers();
        let candidate: ResourceRef = Arc::new(FileResource::new(&layers.overlay_dir).unwrap());

        let wrapped = OverlayResource::wrap(candidate.clone(), &file_resolver(), DEFAULT_MARKER_NAME)
            .unwrap();

        assert_eq!(wrapped.uri(), candidate.uri());
    }

    #[test]
    fn test_wrap_follows_relative_marker() {
        let layers = layers();
        fs::write(
            layers.overlay_dir.join(DEFAULT_MARKER_NAME),
            "# declared base\nbase = ../base/\n",
        )
        .unwrap();
        fs::write(layers.base_dir.join("from_base.txt"), b"hello from base").unwrap();
        let candidate: ResourceRef = Arc::new(FileResource::new(&layers.overlay_dir).unwrap());

        let wrapped = OverlayResource::wrap(candidate, &file_resolver(), DEFAULT_MARKER_NAME)
            .unwrap();

        assert!(wrapped.uri().as_str().starts_with("ovl:"));
        let file = wrapped.child("from_base.txt").unwrap();
        assert_eq!(read_to_string(file.as_ref()).unwrap(), "hello from base");
    }

    #[test]
    fn test_wrap_chains_recursively() {
        let temp = TempDir::new().unwrap();
        for dir in ["top", "middle", "bottom"] {
            fs::create_dir_all(temp.path().join(dir)).unwrap();
        }
        fs::write(temp.path().join("top").join(DEFAULT_MARKER_NAME), "base=../middle").unwrap();
        fs::write(temp.path().join("middle").join(DEFAULT_MARKER_NAME), "base=../bottom").unwrap();
        fs::write(temp.path().join("bottom/leaf.txt"), b"bottom").unwrap();

        let candidate: ResourceRef = Arc::new(FileResource::new(temp.path().join("top")).unwrap());
        let wrapped = OverlayResource::wrap(candidate, &file_resolver(), DEFAULT_MARKER_NAME)
            .unwrap();

        let leaf = wrapped.child("leaf.txt").unwrap();
        assert_eq!(read_to_string(leaf.as_ref()).unwrap(), "bottom");
    }

    #[test]
    fn test_wrap_detects_cycles() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a")).unwrap();
        fs::create_dir_all(temp.path().join("b")).unwrap();
        fs::write(temp.path().join("a").join(DEFAULT_MARKER_NAME), "base=../b").unwrap();
        fs::write(temp.path().join("b").join(DEFAULT_MARKER_NAME), "base=../a").unwrap();

        let candidate: ResourceRef = Arc::new(FileResource::new(temp.path().join("a")).unwrap());
        let err = OverlayResource::wrap(candidate, &file_resolver(), DEFAULT_MARKER_NAME)
            .unwrap_err();

        assert!(err.is_unresolvable());
    }

    #[test]
    fn test_wrap_marker_without_base_key() {
        let layers = layers();
        fs::write(layers.overlay_dir.join(DEFAULT_MARKER_NAME), "other=value\n").unwrap();
        let candidate: ResourceRef = Arc::new(FileResource::new(&layers.overlay_dir).unwrap());

        let wrapped = OverlayResource::wrap(candidate.clone(), &file_resolver(), DEFAULT_MARKER_NAME)
            .unwrap();

        assert_eq!(wrapped.uri(), candidate.uri());
    }
}
