//! Entry index for a single archive.

use std::collections::HashMap;
use std::io::{Read, Seek};
use std::time::{Duration, SystemTime};

use zip::ZipArchive;

/// Metadata for one entry in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry path inside the archive, without leading or trailing `/`.
    pub name: String,

    /// Whether this entry is a directory.
    pub is_dir: bool,

    /// Uncompressed size (0 for directories).
    pub size: u64,

    /// Modification time recorded in the archive, if any.
    pub modified: Option<SystemTime>,
}

impl ArchiveEntry {
    /// Create a file entry.
    pub fn file(name: impl Into<String>, size: u64, modified: Option<SystemTime>) -> Self {
        Self {
            name: normalize_entry_name(&name.into()),
            is_dir: false,
            size,
            modified,
        }
    }

    /// Create a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: normalize_entry_name(&name.into()),
            is_dir: true,
            size: 0,
            modified: None,
        }
    }

    /// Path of the enclosing directory (`""` for top-level entries).
    pub fn parent_name(&self) -> &str {
        parent_of(&self.name)
    }
}

/// Index of every entry in an archive, built by a full scan.
///
/// Holds the flat entry list, a name lookup and a directory map from each
/// directory path (`""` is the archive root) to the entries directly under it.
/// Directories that only exist implicitly, as prefixes of entry names, get
/// synthesized directory entries so the tree can be walked.
#[derive(Debug, Clone)]
pub struct ArchiveIndex {
    entries: Vec<ArchiveEntry>,
    by_name: HashMap<String, usize>,
    directories: HashMap<String, Vec<usize>>,
}

impl Default for ArchiveIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveIndex {
    /// Create an empty index containing only the root directory.
    pub fn new() -> Self {
        let mut directories = HashMap::new();
        directories.insert(String::new(), Vec::new());
        Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
            directories,
        }
    }

    /// Build an index from entry metadata. The first entry with a given name wins.
    pub fn from_entries(entries: impl IntoIterator<Item = ArchiveEntry>) -> Self {
        let mut index = Self::new();
        for entry in entries {
            index.insert(entry);
        }
        index
    }

    /// Scan every entry of an open archive.
    pub fn scan<R: Read + Seek>(archive: &mut ZipArchive<R>) -> zip::result::ZipResult<Self> {
        let mut index = Self::new();
        for i in 0..archive.len() {
            let file = archive.by_index_raw(i)?;
            let modified = file.last_modified().and_then(zip_time_to_system);
            let entry = if file.is_dir() {
                ArchiveEntry {
                    modified,
                    ..ArchiveEntry::directory(file.name())
                }
            } else {
                ArchiveEntry::file(file.name(), file.size(), modified)
            };
            index.insert(entry);
        }
        Ok(index)
    }

    fn insert(&mut self, entry: ArchiveEntry) {
        if entry.name.is_empty() || self.by_name.contains_key(&entry.name) {
            return;
        }

        let parent = entry.parent_name().to_string();
        if !parent.is_empty() && !self.by_name.contains_key(&parent) {
            self.insert(ArchiveEntry::directory(parent.clone()));
        }

        let position = self.entries.len();
        if entry.is_dir {
            self.directories.entry(entry.name.clone()).or_default();
        }
        self.by_name.insert(entry.name.clone(), position);
        self.entries.push(entry);
        self.directories.entry(parent).or_default().push(position);
    }

    /// Look up an entry by path.
    pub fn get(&self, name: &str) -> Option<&ArchiveEntry> {
        let name = normalize_entry_name(name);
        self.by_name.get(&name).map(|&i| &self.entries[i])
    }

    /// Check if the path names a directory (including the root `""`).
    pub fn is_directory(&self, name: &str) -> bool {
        self.directories.contains_key(&normalize_entry_name(name))
    }

    /// Entries directly inside a directory. Empty for unknown paths.
    pub fn children(&self, name: &str) -> Vec<&ArchiveEntry> {
        self.directories
            .get(&normalize_entry_name(name))
            .map(|children| children.iter().map(|&i| &self.entries[i]).collect())
            .unwrap_or_default()
    }

    /// All entries in scan order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Number of entries, including synthesized directories.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Strip leading and trailing `/` from an entry path.
pub(crate) fn normalize_entry_name(name: &str) -> String {
    name.trim_matches('/').to_string()
}

fn parent_of(name: &str) -> &str {
    name.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn zip_time_to_system(time: zip::DateTime) -> Option<SystemTime> {
    let naive = chrono::NaiveDate::from_ymd_opt(
        i32::from(time.year()),
        u32::from(time.month()),
        u32::from(time.day()),
    )?
    .and_hms_opt(
        u32::from(time.hour()),
        u32::from(time.minute()),
        u32::from(time.second()),
    )?;
    let secs = u64::try_from(naive.and_utc().timestamp()).ok()?;
    Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
}
