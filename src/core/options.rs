//! Compiler and linker option sets.
//!
//! An [`Options`] is an ordered list of tokens plus the modification time of
//! whatever produced them. The timestamp is a build input: an object file
//! older than its options is stale.

use std::fmt;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

/// An ordered sequence of option words and the time they last changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Option values, in order
    pub values: Vec<String>,
    /// File the options were read from, if any
    pub path: Option<PathBuf>,
    mtime: Option<SystemTime>,
}

impl Options {
    /// Create an empty option set with no timestamp.
    pub fn new() -> Self {
        Options::default()
    }

    /// Create an option set from values and a modification time.
    pub fn from_values<I, S>(values: I, mtime: Option<SystemTime>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Options {
            values: values.into_iter().map(Into::into).collect(),
            path: None,
            mtime,
        }
    }

    /// Read options from a word-based file.
    ///
    /// Blank lines and lines starting with `#` are skipped; every other
    /// line is split on whitespace. The file's mtime becomes the options'
    /// modification time.
    pub fn read_from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open options file: {}", path.display()))?;
        let mtime = file
            .metadata()
            .and_then(|m| m.modified())
            .with_context(|| format!("failed to stat options file: {}", path.display()))?;

        let mut options = Options {
            values: Vec::new(),
            path: Some(path.to_path_buf()),
            mtime: Some(mtime),
        };

        for line in std::io::BufReader::new(file).lines() {
            let line =
                line.with_context(|| format!("failed to read options file: {}", path.display()))?;
            let line = line.trim_start();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            options
                .values
                .extend(line.split_whitespace().map(str::to_string));
        }

        Ok(options)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append an option. Does not change the modification time.
    pub fn append(&mut self, option: impl Into<String>) {
        self.values.push(option.into());
    }

    /// Insert an option at the front. Does not change the modification time.
    pub fn prepend(&mut self, option: impl Into<String>) {
        self.values.insert(0, option.into());
    }

    pub fn set_mod_time(&mut self, time: Option<SystemTime>) {
        self.mtime = time;
    }

    /// The modification time of the freshest input behind these options.
    pub fn mod_time(&self) -> Option<SystemTime> {
        self.mtime
    }

    /// Copy values and timestamp from another set, keeping our path.
    pub fn set_from(&mut self, other: &Options) {
        self.values = other.values.clone();
        self.mtime = other.mtime;
    }

    /// Index of the first option equal to `s`.
    pub fn option_index(&self, s: &str) -> Option<usize> {
        self.values.iter().position(|v| v == s)
    }

    /// Remove `flag` and the value following it, returning the value.
    ///
    /// Used to pull a `-o <path>` out of an options file.
    pub fn take_flag_value(&mut self, flag: &str) -> Option<String> {
        let index = self.option_index(flag)?;
        if index + 1 >= self.values.len() {
            return None;
        }
        let value = self.values.remove(index + 1);
        self.values.remove(index);
        Some(value)
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.values.join(" "))
    }
}

/// The later of two optional timestamps.
pub fn most_recent(a: Option<SystemTime>, b: Option<SystemTime>) -> Option<SystemTime> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// The modification time of the more recently modified of two option sets.
pub fn most_recent_mod_time(a: &Options, b: &Options) -> Option<SystemTime> {
    most_recent(a.mod_time(), b.mod_time())
}
