//! Memoized file metadata lookups.
//!
//! A build stats the same headers over and over, once for every translation
//! unit that includes them. [`StatCache`] remembers each successful lookup
//! for the life of the cache. The index is guarded by a mutex, but the
//! underlying `stat` call is made without holding it: two workers asking
//! for the same path at the same moment may both hit the filesystem, and
//! the first answer stored wins. The answers are identical, so this only
//! costs a redundant syscall.
//!
//! Failed lookups are not cached. Absence is data the next build step may
//! change (a compile creates its object file), and other errors should be
//! reported again rather than remembered.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;

/// The metadata the staleness checks need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub modified: SystemTime,
    pub len: u64,
    pub is_dir: bool,
}

impl FileStat {
    pub fn from_metadata(metadata: &fs::Metadata) -> io::Result<Self> {
        Ok(FileStat {
            modified: metadata.modified()?,
            len: metadata.len(),
            is_dir: metadata.is_dir(),
        })
    }

    /// Metadata for a file modified at `time`, for callers that already
    /// know the timestamp.
    pub fn with_modified(modified: SystemTime) -> Self {
        FileStat {
            modified,
            len: 0,
            is_dir: false,
        }
    }

    /// True if this file was modified strictly after `other`.
    pub fn is_newer_than(&self, other: &FileStat) -> bool {
        self.modified > other.modified
    }
}

/// Process-lifetime cache of file metadata, shared by all workers.
#[derive(Debug, Default)]
pub struct StatCache {
    entries: Mutex<HashMap<PathBuf, FileStat>>,
}

impl StatCache {
    pub fn new() -> Self {
        StatCache::default()
    }

    /// Stat a path, answering from the cache when possible.
    pub fn stat(&self, path: &Path) -> io::Result<FileStat> {
        if let Some(stat) = self.entries.lock().get(path) {
            return Ok(*stat);
        }

        let stat = FileStat::from_metadata(&fs::metadata(path)?)?;

        Ok(*self
            .entries
            .lock()
            .entry(path.to_path_buf())
            .or_insert(stat))
    }

    /// Forget a path. Call this before anything rewrites the file so a
    /// later lookup sees its new modification time.
    pub fn invalidate(&self, path: &Path) {
        self.entries.lock().remove(path);
    }

    /// Stat every path and return the most recent modification time, or
    /// `None` for an empty list. The first failure is returned as-is.
    pub fn newest_of<P: AsRef<Path>>(&self, paths: &[P]) -> io::Result<Option<(PathBuf, SystemTime)>> {
        let mut newest: Option<(PathBuf, SystemTime)> = None;
        for path in paths {
            let path = path.as_ref();
            let modified = self.stat(path)?.modified;
            if newest.as_ref().is_none_or(|(_, t)| modified > *t) {
                newest = Some((path.to_path_buf(), modified));
            }
        }
        Ok(newest)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
