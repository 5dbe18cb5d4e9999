//! Integration tests for the overlay engine.
//!
//! These tests verify:
//! - Read precedence and write redirection through `OverlayResource`
//! - The precedence rule holding at every depth (property-based)
//! - Named `ovl://` resolution through nested contexts and worker threads
//!
//! Run with: `cargo test --test overlay_integration`

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use proptest::prelude::*;
use tempfile::TempDir;

use strata::archive::ArchiveRegistry;
use strata::backend::{FileResource, UrlFactory};
use strata::overlay::{spawn_with_context, ContextSnapshot, OverlayContext, OverlayResource};
use strata::resource::{read_to_string, write_bytes};
use strata::{Resource, ResourceRef, Resolver};

// ============================================================================
// Helper Functions
// ============================================================================

fn standard_resolver() -> Resolver {
    Resolver::with_standard_factories(
        Arc::new(ArchiveRegistry::default()),
        UrlFactory::new().unwrap(),
        "overlay.properties",
    )
    .unwrap()
}

fn dir_resource(path: &Path) -> ResourceRef {
    fs::create_dir_all(path).unwrap();
    Arc::new(FileResource::new(path).unwrap())
}

// ============================================================================
// Precedence Scenarios
// ============================================================================

/// Base content shows through until the overlay is written, then the overlay wins.
#[test]
fn test_base_then_overlay_scenario() {
    let temp = TempDir::new().unwrap();
    let overlay = dir_resource(&temp.path().join("overlay"));
    let base = dir_resource(&temp.path().join("base"));
    fs::write(temp.path().join("base/base.txt"), "B").unwrap();

    let root = OverlayResource::new(overlay, base).unwrap();
    let file = root.child("base.txt").unwrap();

    assert!(file.exists());
    assert_eq!(read_to_string(file.as_ref()).unwrap(), "B");

    write_bytes(file.as_ref(), b"O").unwrap();

    assert!(file.exists());
    assert!(temp.path().join("overlay/base.txt").exists());
    assert_eq!(read_to_string(file.as_ref()).unwrap(), "O");
}

/// Deleting through an overlay removes the entry from both layers.
#[test]
fn test_deleted_entry_does_not_resurface() {
    let temp = TempDir::new().unwrap();
    let overlay = dir_resource(&temp.path().join("overlay"));
    let base = dir_resource(&temp.path().join("base"));
    fs::write(temp.path().join("overlay/x.txt"), "O").unwrap();
    fs::write(temp.path().join("base/x.txt"), "B").unwrap();

    let file = OverlayResource::new(overlay, base)
        .unwrap()
        .child("x.txt")
        .unwrap();
    file.delete().unwrap();

    assert!(!file.exists());
    assert!(file.open_read().err().unwrap().is_not_found());
}

/// A rename inside an overlay lands in the overlay layer.
#[test]
fn test_rename_within_overlay() {
    let temp = TempDir::new().unwrap();
    let overlay = dir_resource(&temp.path().join("overlay"));
    let base = dir_resource(&temp.path().join("base"));
    fs::write(temp.path().join("overlay/draft.txt"), "text").unwrap();

    let root = OverlayResource::new(overlay, base).unwrap();
    let renamed = root.child("draft.txt").unwrap().rename("final.txt").unwrap();

    assert_eq!(read_to_string(renamed.as_ref()).unwrap(), "text");
    assert!(temp.path().join("overlay/final.txt").exists());
    assert!(!temp.path().join("overlay/draft.txt").exists());
}

// ============================================================================
// Property Tests
// ============================================================================

/// Per-file placement: content in the overlay, the base, both, or neither.
fn placement() -> impl Strategy<Value = (Option<String>, Option<String>)> {
    (
        proptest::option::of("[a-z]{1,8}"),
        proptest::option::of("[A-Z]{1,8}"),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// exists() is the OR of both layers; content comes from the overlay
    /// whenever the overlay has the file, at any nesting depth.
    #[test]
    fn test_overlay_precedence(
        files in proptest::collection::btree_map("[a-z]{1,6}", placement(), 1..6),
        depth in 0usize..3,
    ) {
        let temp = TempDir::new().unwrap();
        let nested: Vec<String> = (0..depth).map(|i| format!("d{}", i)).collect();
        let mut overlay_dir = temp.path().join("overlay");
        let mut base_dir = temp.path().join("base");
        for segment in &nested {
            overlay_dir.push(segment);
            base_dir.push(segment);
        }
        fs::create_dir_all(&overlay_dir).unwrap();
        fs::create_dir_all(&base_dir).unwrap();

        let files: BTreeMap<String, (Option<String>, Option<String>)> = files;
        for (name, (in_overlay, in_base)) in &files {
            if let Some(content) = in_overlay {
                fs::write(overlay_dir.join(name), content).unwrap();
            }
            if let Some(content) = in_base {
                fs::write(base_dir.join(name), content).unwrap();
            }
        }

        let mut node: ResourceRef = Arc::new(
            OverlayResource::new(
                dir_resource(&temp.path().join("overlay")),
                dir_resource(&temp.path().join("base")),
            )
            .unwrap(),
        );
        for segment in &nested {
            node = node.child(segment).unwrap();
        }

        for (name, (in_overlay, in_base)) in &files {
            let file = node.child(name).unwrap();
            prop_assert_eq!(file.exists(), in_overlay.is_some() || in_base.is_some());

            match (in_overlay, in_base) {
                (Some(expected), _) | (None, Some(expected)) => {
                    prop_assert_eq!(&read_to_string(file.as_ref()).unwrap(), expected);
                }
                (None, None) => {
                    prop_assert!(file.open_read().is_err());
                }
            }
        }
    }
}

// ============================================================================
// Named Contexts
// ============================================================================

/// Nested contexts resolve their own roots and inherit the parent's.
#[test]
fn test_nested_contexts_through_resolver() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("app/conf")).unwrap();
    fs::write(temp.path().join("app/conf/app.ini"), "[app]").unwrap();
    fs::write(temp.path().join("req.txt"), "request").unwrap();

    let resolver = standard_resolver();
    let (app, _app_guard) = OverlayContext::push_new();
    app.mount("app", dir_resource(&temp.path().join("app")));

    {
        let (request, _request_guard) = OverlayContext::push_new();
        request.mount("", dir_resource(temp.path()));

        let conf = resolver.resolve_str("ovl://app/conf/app.ini").unwrap();
        assert_eq!(read_to_string(conf.as_ref()).unwrap(), "[app]");

        let req = resolver.resolve_str("ovl:///req.txt").unwrap();
        assert_eq!(read_to_string(req.as_ref()).unwrap(), "request");
    }

    // The request context is gone; its empty-name root no longer resolves.
    assert!(resolver
        .resolve_str("ovl:///req.txt")
        .unwrap_err()
        .is_unresolvable());
    assert!(resolver.resolve_str("ovl://app/conf/app.ini").is_ok());
}

/// A spawned worker sees the context that was current at spawn time.
#[test]
fn test_worker_threads_inherit_snapshot() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("shared.txt"), "shared").unwrap();

    let resolver = Arc::new(standard_resolver());
    let (context, _guard) = OverlayContext::push_new();
    context.mount("data", dir_resource(temp.path()));

    let worker_resolver = Arc::clone(&resolver);
    let content = spawn_with_context(move || {
        let resource = worker_resolver.resolve_str("ovl://data/shared.txt").unwrap();
        read_to_string(resource.as_ref()).unwrap()
    })
    .join()
    .unwrap();
    assert_eq!(content, "shared");

    // Mounts added after the snapshot are visible: the snapshot shares the context.
    let snapshot = ContextSnapshot::capture();
    context.mount("late", dir_resource(&temp.path().join("late")));
    let sees_late = std::thread::spawn(move || {
        let _guard = snapshot.install();
        OverlayContext::current()
            .and_then(|c| c.lookup("late"))
            .is_some()
    })
    .join()
    .unwrap();
    assert!(sees_late);
}

/// A plain thread does not inherit anything.
#[test]
fn test_unshared_thread_has_no_context() {
    let temp = TempDir::new().unwrap();
    let resolver = Arc::new(standard_resolver());
    let (context, _guard) = OverlayContext::push_new();
    context.mount("data", dir_resource(temp.path()));

    let err = std::thread::spawn(move || resolver.resolve_str("ovl://data/x").unwrap_err())
        .join()
        .unwrap();
    assert!(err.is_unresolvable());
}
