//! Archive-backed resources with a shared, reference-counted archive cache.
//!
//! # Overview
//!
//! Entries inside local ZIP/JAR archives are addressed as
//! `jar:<archive-uri>!/<entry-path>`. Opening an archive and scanning its
//! central directory is expensive, so every resource over the same archive
//! shares a single [`ArchiveCache`]:
//!
//! ```text
//! ┌──────────────────────────┐      ┌──────────────────────────────┐
//! │ ArchiveEntryResource ×N  │ ───► │ ArchiveRegistry              │
//! │ (jar:file:///a.zip!/...) │      │  canonical path → cache      │
//! └──────────────────────────┘      └──────────────┬───────────────┘
//!                                                  ▼
//!                                   ┌──────────────────────────────┐
//!                                   │ ArchiveCache                 │
//!                                   │  index (entries, dirs)       │
//!                                   │  open_count / physical handle│
//!                                   │  mtime + check watermarks    │
//!                                   └──────────────────────────────┘
//! ```
//!
//! Readers receive an [`EntryStream`] that holds an [`ArchiveHandle`]; the
//! archive file stays open exactly as long as at least one handle is alive.

mod cache;
mod entry;
mod index;

pub use cache::{
    ArchiveCache, ArchiveHandle, ArchiveRegistry, EntryStream, DEFAULT_CHECK_INTERVAL,
};
pub use entry::{ArchiveEntryResource, ArchiveFactory};
pub use index::{ArchiveEntry, ArchiveIndex};
