//! Shared per-archive cache with a reference-counted physical handle.
//!
//! Every absolute archive path maps to one [`ArchiveCache`] through an
//! [`ArchiveRegistry`]. The cache owns the entry index and keeps the archive
//! file open only while some consumer holds an [`ArchiveHandle`]:
//!
//! ```text
//! open_count: 0 ──acquire──► 1 ──acquire──► 2
//!   (closed)    (physical open)     ...
//! open_count: 2 ──release──► 1 ──release──► 0
//!                               (physical close)
//! ```
//!
//! # Staleness
//!
//! [`ArchiveCache::check`] rebuilds the index only when nobody holds the
//! handle, the throttle interval has elapsed since the previous check, and
//! the archive's modification time differs from the one the index was built
//! from. A failed scan leaves the previous index and watermarks in place.
//!
//! # Thread Safety
//!
//! All state transitions (open count, physical open/close, index rebuild,
//! watermarks) happen under one `parking_lot::Mutex` per cache, so a handle
//! open always precedes the reads that depend on it and a close never races
//! a concurrent acquire.
//!
//! Entry content is not read under that lock. Opening an entry only locates
//! its compressed bytes; the returned [`EntryStream`] then reads them through
//! its own positional cursor over the shared file and inflates lazily.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use dashmap::DashMap;
use flate2::read::DeflateDecoder;
use parking_lot::Mutex;
use zip::result::ZipError;
use zip::{CompressionMethod, ZipArchive};

use super::index::{normalize_entry_name, ArchiveIndex};
use crate::error::{ResourceError, ResourceResult};

/// Default minimum time between two staleness checks of the same archive.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// One open archive file shared by every reader.
///
/// Clones share the file but keep their own cursor; reads are positional,
/// so concurrent readers never disturb each other.
#[derive(Debug, Clone)]
struct SharedFile {
    file: Arc<File>,
    pos: u64,
}

impl SharedFile {
    fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            file: Arc::new(File::open(path)?),
            pos: 0,
        })
    }

    /// A clone positioned at `offset`.
    fn at(&self, offset: u64) -> Self {
        Self {
            file: Arc::clone(&self.file),
            pos: offset,
        }
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

impl Read for SharedFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = read_at(&self.file, buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for SharedFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.file.metadata()?.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of archive")
        })?;
        self.pos = target;
        Ok(target)
    }
}

struct OpenArchive {
    zip: ZipArchive<SharedFile>,
    file: SharedFile,
}

struct CacheState {
    open_count: usize,
    archive: Option<OpenArchive>,
    index: Arc<ArchiveIndex>,
    last_modified: Option<SystemTime>,
    last_checked: Option<Instant>,
}

/// Where an entry's compressed bytes live in the archive file.
struct EntryLocation {
    source: SharedFile,
    compressed_size: u64,
    compression: CompressionMethod,
}

/// Cached index plus lazily opened handle for one archive file.
pub struct ArchiveCache {
    path: PathBuf,
    check_interval: Duration,
    state: Mutex<CacheState>,
    physical_opens: AtomicU64,
}

impl ArchiveCache {
    /// Create a cache for the archive at `path`. Nothing is opened yet.
    pub fn new(path: impl Into<PathBuf>, check_interval: Duration) -> Self {
        Self {
            path: path.into(),
            check_interval,
            state: Mutex::new(CacheState {
                open_count: 0,
                archive: None,
                index: Arc::new(ArchiveIndex::new()),
                last_modified: None,
                last_checked: None,
            }),
            physical_opens: AtomicU64::new(0),
        }
    }

    /// Path of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of live handles.
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Whether the archive file is physically open.
    pub fn is_open(&self) -> bool {
        self.state.lock().archive.is_some()
    }

    /// How many times the archive file has been physically opened.
    pub fn physical_opens(&self) -> u64 {
        self.physical_opens.load(Ordering::Relaxed)
    }

    /// Rebuild the index if the archive changed on disk.
    ///
    /// No-op while any handle is held or within the throttle interval of the
    /// previous check.
    pub fn check(&self) -> ResourceResult<()> {
        let mut state = self.state.lock();

        if state.open_count > 0 {
            return Ok(());
        }

        let now = Instant::now();
        if let Some(last) = state.last_checked {
            if now.duration_since(last) < self.check_interval {
                return Ok(());
            }
        }

        let mtime = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|e| ResourceError::io(self.path.display().to_string(), e))?;

        if state.last_modified == Some(mtime) {
            state.last_checked = Some(now);
            return Ok(());
        }

        self.acquire_locked(&mut state)?;
        let scanned = match state.archive.as_mut() {
            Some(open) => ArchiveIndex::scan(&mut open.zip).map_err(|e| self.archive_error(e)),
            None => Err(self.archive_error("archive handle missing after open")),
        };
        self.release_locked(&mut state);
        let index = scanned?;

        tracing::debug!(
            path = %self.path.display(),
            entries = index.len(),
            "Rebuilt archive index"
        );

        state.index = Arc::new(index);
        state.last_modified = Some(mtime);
        state.last_checked = Some(now);
        Ok(())
    }

    /// Check for staleness and return the current index.
    pub fn index(&self) -> ResourceResult<Arc<ArchiveIndex>> {
        self.check()?;
        Ok(Arc::clone(&self.state.lock().index))
    }

    /// Take a handle, physically opening the archive on the first one.
    pub fn acquire(self: &Arc<Self>) -> ResourceResult<ArchiveHandle> {
        let mut state = self.state.lock();
        self.acquire_locked(&mut state)?;
        Ok(ArchiveHandle {
            cache: Arc::clone(self),
        })
    }

    /// Open a stream over one entry's content.
    ///
    /// The returned stream holds a handle until it is closed or dropped.
    /// Only the entry lookup happens under the cache lock; content is read
    /// and inflated as the stream is consumed.
    pub fn open_entry(self: &Arc<Self>, name: &str) -> ResourceResult<EntryStream> {
        let handle = self.acquire()?;
        let name = normalize_entry_name(name);
        let location = self.locate(&name)?;

        let raw = location.source.take(location.compressed_size);
        let content: Box<dyn Read + Send> = match location.compression {
            CompressionMethod::Stored => Box::new(raw),
            CompressionMethod::Deflated => Box::new(DeflateDecoder::new(raw)),
            other => {
                return Err(self.archive_error(format!(
                    "entry {} uses unsupported compression {:?}",
                    name, other
                )))
            }
        };

        Ok(EntryStream {
            content,
            handle: Some(handle),
        })
    }

    /// Find an entry's data offset. Requires a held handle.
    fn locate(&self, name: &str) -> ResourceResult<EntryLocation> {
        let mut state = self.state.lock();
        let open = state
            .archive
            .as_mut()
            .ok_or_else(|| self.archive_error("archive handle missing while held"))?;
        let entry = open.zip.by_name(name).map_err(|e| match e {
            ZipError::FileNotFound => ResourceError::io(
                format!("{}!/{}", self.path.display(), name),
                io::Error::new(io::ErrorKind::NotFound, "no such archive entry"),
            ),
            other => self.archive_error(other),
        })?;
        Ok(EntryLocation {
            source: open.file.at(entry.data_start()),
            compressed_size: entry.compressed_size(),
            compression: entry.compression(),
        })
    }

    fn acquire_locked(&self, state: &mut CacheState) -> ResourceResult<()> {
        if state.open_count == 0 {
            let file = SharedFile::open(&self.path)
                .map_err(|e| ResourceError::io(self.path.display().to_string(), e))?;
            let zip = ZipArchive::new(file.clone()).map_err(|e| self.archive_error(e))?;
            state.archive = Some(OpenArchive { zip, file });
            self.physical_opens.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(path = %self.path.display(), "Opened archive");
        }
        state.open_count += 1;
        Ok(())
    }

    fn release_locked(&self, state: &mut CacheState) {
        debug_assert!(state.open_count > 0, "archive handle released twice");
        state.open_count = state.open_count.saturating_sub(1);
        if state.open_count == 0 && state.archive.take().is_some() {
            tracing::debug!(path = %self.path.display(), "Closed archive");
        }
    }

    fn release(&self) {
        let mut state = self.state.lock();
        self.release_locked(&mut state);
    }

    fn archive_error(&self, reason: impl ToString) -> ResourceError {
        ResourceError::Archive {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Debug for ArchiveCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ArchiveCache")
            .field("path", &self.path)
            .field("open_count", &state.open_count)
            .field("entries", &state.index.len())
            .finish()
    }
}

/// A live claim on an archive's physical handle. Dropping it releases the claim.
pub struct ArchiveHandle {
    cache: Arc<ArchiveCache>,
}

impl ArchiveHandle {
    /// The cache this handle belongs to.
    pub fn cache(&self) -> &Arc<ArchiveCache> {
        &self.cache
    }
}

impl Drop for ArchiveHandle {
    fn drop(&mut self) {
        self.cache.release();
    }
}

impl fmt::Debug for ArchiveHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveHandle")
            .field("path", &self.cache.path)
            .finish()
    }
}

/// Readable content of one archive entry.
///
/// Holds an [`ArchiveHandle`] until [`EntryStream::close`] is called or the
/// stream is dropped; closing more than once releases the handle only once.
pub struct EntryStream {
    // Dropped before the handle so the file is released first.
    content: Box<dyn Read + Send>,
    handle: Option<ArchiveHandle>,
}

impl EntryStream {
    /// Release the archive handle. Further reads return end of stream.
    pub fn close(&mut self) {
        self.content = Box::new(io::empty());
        self.handle.take();
    }

    /// Whether the stream still holds its archive handle.
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }
}

impl Read for EntryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.content.read(buf)
    }
}

impl fmt::Debug for EntryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryStream")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Registry mapping canonical archive paths to their shared caches.
#[derive(Debug)]
pub struct ArchiveRegistry {
    caches: DashMap<PathBuf, Arc<ArchiveCache>>,
    check_interval: Duration,
}

impl Default for ArchiveRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CHECK_INTERVAL)
    }
}

impl ArchiveRegistry {
    /// Create a registry whose caches use the given check interval.
    pub fn new(check_interval: Duration) -> Self {
        Self {
            caches: DashMap::new(),
            check_interval,
        }
    }

    /// Get the cache for an archive, creating it on first access.
    ///
    /// Paths are canonicalized when the file exists so that different
    /// spellings of the same archive share one cache.
    pub fn get_or_create(&self, path: &Path) -> Arc<ArchiveCache> {
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let interval = self.check_interval;
        self.caches
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::debug!(path = %key.display(), "Tracking archive");
                Arc::new(ArchiveCache::new(key.clone(), interval))
            })
            .clone()
    }

    /// Number of archives tracked.
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    /// Check if no archives are tracked.
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}
