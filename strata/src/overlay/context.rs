//! Thread-scoped naming contexts for `ovl://name/...` URIs.
//!
//! An [`OverlayContext`] maps names to root resources. Each thread keeps a
//! stack of active contexts; the top of the stack is what
//! [`OverlayContext::current`] returns and what the `ovl` factory resolves
//! named URIs against.
//!
//! ```text
//!   thread stack            parent chain (fixed on first push)
//!   ┌───────────┐
//!   │  request  │ ──parent──► app ──parent──► (none)
//!   ├───────────┤
//!   │    app    │
//!   └───────────┘
//! ```
//!
//! A context's parent is the context that was current the first time it was
//! pushed, and never changes afterwards. Lookups that miss in a context
//! continue up the parent chain.
//!
//! Pushing returns a [`ContextGuard`]; dropping the guard pops the context.
//! Guards are tied to the thread that created them. To carry the current
//! context into a worker thread, capture a [`ContextSnapshot`] or use
//! [`spawn_with_context`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

use parking_lot::RwLock;
use url::Url;

use crate::error::{ResourceError, ResourceResult};
use crate::resource::ResourceRef;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Arc<OverlayContext>>> = const { RefCell::new(Vec::new()) };
}

/// A named set of overlay roots.
#[derive(Default)]
pub struct OverlayContext {
    parent: OnceLock<Option<Arc<OverlayContext>>>,
    roots: RwLock<HashMap<String, ResourceRef>>,
}

impl OverlayContext {
    /// Create an empty, unattached context.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The context on top of this thread's stack.
    pub fn current() -> Option<Arc<OverlayContext>> {
        CONTEXT_STACK
            .try_with(|stack| stack.borrow().last().cloned())
            .ok()
            .flatten()
    }

    /// Create a new context and push it. Its parent is the current context.
    pub fn push_new() -> (Arc<OverlayContext>, ContextGuard) {
        let context = Self::new();
        let guard = context.push();
        (context, guard)
    }

    /// Make this context current on the calling thread until the guard drops.
    ///
    /// The first push fixes the parent to whatever was current at that moment.
    /// A context never becomes its own parent.
    pub fn push(self: &Arc<Self>) -> ContextGuard {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let top = stack.last().cloned();
            self.parent.get_or_init(|| top.filter(|t| !Arc::ptr_eq(t, self)));
            let depth = stack.len();
            stack.push(Arc::clone(self));
            tracing::trace!(depth, "Pushed overlay context");
            ContextGuard {
                depth,
                _not_send: PhantomData,
            }
        })
    }

    /// The inherited context, once this context has been pushed.
    pub fn parent(&self) -> Option<Arc<OverlayContext>> {
        self.parent.get().cloned().flatten()
    }

    /// Bind `name` to `root`, replacing any previous binding in this context.
    pub fn mount(&self, name: impl Into<String>, root: ResourceRef) {
        let name = name.into();
        tracing::debug!(name = %name, root = %root.uri(), "Mounted overlay root");
        self.roots.write().insert(name, root);
    }

    /// Remove a binding from this context. Parent bindings are unaffected.
    pub fn unmount(&self, name: &str) -> Option<ResourceRef> {
        self.roots.write().remove(name)
    }

    /// Names bound directly in this context, sorted.
    pub fn mounted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.roots.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Find the root bound to `name` here or in an ancestor.
    pub fn lookup(&self, name: &str) -> Option<ResourceRef> {
        if let Some(root) = self.roots.read().get(name) {
            return Some(Arc::clone(root));
        }
        let mut next = self.parent();
        while let Some(context) = next {
            if let Some(root) = context.roots.read().get(name) {
                return Some(Arc::clone(root));
            }
            next = context.parent();
        }
        None
    }

    /// Resolve `name` and walk `segments` below it with `child`.
    pub fn resolve(&self, uri: &Url, name: &str, segments: &[String]) -> ResourceResult<ResourceRef> {
        let mut resource = self.lookup(name).ok_or_else(|| {
            ResourceError::unresolvable(
                uri.as_str(),
                format!("no overlay root named '{}' in the current context", name),
            )
        })?;

        for segment in segments {
            resource = resource.child(segment)?;
        }
        Ok(resource)
    }
}

impl std::fmt::Debug for OverlayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayContext")
            .field("mounted", &self.mounted_names())
            .field("has_parent", &self.parent().is_some())
            .finish()
    }
}

/// Pops a pushed context when dropped.
///
/// Guards must be dropped on the thread that created them, innermost first.
/// Dropping an outer guard also pops anything pushed above it.
#[must_use = "the context is popped when the guard is dropped"]
#[derive(Debug)]
pub struct ContextGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let depth = self.depth;
        let _ = CONTEXT_STACK.try_with(|stack| {
            stack.borrow_mut().truncate(depth);
        });
        tracing::trace!(depth, "Popped overlay context");
    }
}

/// The current context of one thread, ready to be installed on another.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    context: Option<Arc<OverlayContext>>,
}

impl ContextSnapshot {
    /// Capture the calling thread's current context.
    pub fn capture() -> Self {
        Self {
            context: OverlayContext::current(),
        }
    }

    /// The captured context, if any.
    pub fn context(&self) -> Option<&Arc<OverlayContext>> {
        self.context.as_ref()
    }

    /// Push the captured context on the calling thread.
    pub fn install(&self) -> Option<ContextGuard> {
        self.context.as_ref().map(|context| context.push())
    }
}

/// Spawn a thread that starts with the caller's current context.
pub fn spawn_with_context<F, T>(f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let snapshot = ContextSnapshot::capture();
    std::thread::spawn(move || {
        let _guard = snapshot.install();
        f()
    })
}
