//! Layered resource trees.
//!
//! # Overview
//!
//! An overlay merges a writable tree over a read-only one. Reads prefer the
//! overlay and fall through to the base; writes always land in the overlay.
//!
//! ```text
//!   ovl:file:///srv/site/            overlay.properties: base = ../theme/
//!        │
//!        ▼
//!   ┌──────────────────┐   miss   ┌───────────────────┐
//!   │ /srv/site (rw)   │ ───────► │ /srv/theme (ro)   │
//!   └──────────────────┘          └───────────────────┘
//! ```
//!
//! Overlays are created three ways:
//!
//! - directly with [`OverlayResource::new`]
//! - from a marker file, via [`OverlayResource::wrap`] or an `ovl:<uri>` URI
//! - by name from the thread's [`OverlayContext`], via `ovl://name/path`

mod context;
mod factory;
mod resource;

pub use context::{spawn_with_context, ContextGuard, ContextSnapshot, OverlayContext};
pub use factory::OverlayFactory;
pub use resource::{OverlayResource, DEFAULT_MARKER_NAME};
