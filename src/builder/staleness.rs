//! Up-to-date checks.
//!
//! A target is current only if it exists and is newer than everything that
//! went into it. For a compiled object that is its source, the options it
//! was compiled with, and every file in its dependency record. For a
//! linked artifact it is the link options, the object files, any other
//! inputs, and each library named by path.
//!
//! Equal timestamps count as up to date. A file that does not exist is
//! data (the target must be built, or a dependency went away); any other
//! stat failure is an error and is returned rather than guessed at.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

use crate::builder::stat::{FileStat, StatCache};
use crate::core::Options;

/// Why a target has to be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    TargetMissing,
    SourceNewer,
    OptionsNewer,
    DependencyMissing(PathBuf),
    DependencyNewer(PathBuf),
    /// An object file or other link input is newer
    InputNewer(PathBuf),
    LibraryNewer(PathBuf),
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::TargetMissing => f.write_str("target does not exist"),
            StaleReason::SourceNewer => f.write_str("source is newer"),
            StaleReason::OptionsNewer => f.write_str("options are newer"),
            StaleReason::DependencyMissing(p) => write!(f, "dependency {} does not exist", p.display()),
            StaleReason::DependencyNewer(p) => write!(f, "dependency {} is newer", p.display()),
            StaleReason::InputNewer(p) => write!(f, "input {} is newer", p.display()),
            StaleReason::LibraryNewer(p) => write!(f, "library {} is newer", p.display()),
        }
    }
}

/// The outcome of an up-to-date check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    UpToDate,
    Stale(StaleReason),
}

impl Staleness {
    pub fn is_up_to_date(&self) -> bool {
        matches!(self, Staleness::UpToDate)
    }

    pub fn reason(&self) -> Option<&StaleReason> {
        match self {
            Staleness::UpToDate => None,
            Staleness::Stale(reason) => Some(reason),
        }
    }
}

/// The source file a target is compiled from.
#[derive(Debug, Clone, Copy)]
pub struct SourceInput<'a> {
    pub path: &'a Path,
    pub stat: FileStat,
}

fn is_newer(time: Option<SystemTime>, than: &FileStat) -> bool {
    time.is_some_and(|t| t > than.modified)
}

fn trace(source: &Path, target: &Path, verdict: &Result<Staleness>) {
    match verdict {
        Ok(verdict) => tracing::debug!(
            target: "dcc::deps",
            source = %source.display(),
            output = %target.display(),
            up_to_date = verdict.is_up_to_date(),
            reason = %verdict.reason().map(ToString::to_string).unwrap_or_default(),
            "staleness"
        ),
        Err(e) => tracing::debug!(
            target: "dcc::deps",
            source = %source.display(),
            output = %target.display(),
            error = %format!("{:#}", e),
            "staleness"
        ),
    }
}

/// Stat `target`, mapping "does not exist" to `None`.
fn stat_target(cache: &StatCache, target: &Path) -> Result<Option<FileStat>> {
    match cache.stat(target) {
        Ok(stat) => Ok(Some(stat)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to stat {}", target.display())),
    }
}

/// Decide whether a compiled `target` is current.
///
/// Checks run in a fixed order and stop at the first reason to rebuild:
/// the target itself, the source, the options, then each dependency in the
/// order listed.
pub fn is_up_to_date(
    cache: &StatCache,
    target: &Path,
    deps: &[PathBuf],
    source: SourceInput<'_>,
    options: &Options,
) -> Result<Staleness> {
    let verdict = check_unit(cache, target, deps, &source.stat, options);
    trace(source.path, target, &verdict);
    verdict
}

fn check_unit(
    cache: &StatCache,
    target: &Path,
    deps: &[PathBuf],
    source: &FileStat,
    options: &Options,
) -> Result<Staleness> {
    let Some(target_stat) = stat_target(cache, target)? else {
        return Ok(Staleness::Stale(StaleReason::TargetMissing));
    };
    if source.is_newer_than(&target_stat) {
        return Ok(Staleness::Stale(StaleReason::SourceNewer));
    }
    if is_newer(options.mod_time(), &target_stat) {
        return Ok(Staleness::Stale(StaleReason::OptionsNewer));
    }
    for dep in deps {
        match cache.stat(dep) {
            Ok(stat) if stat.is_newer_than(&target_stat) => {
                return Ok(Staleness::Stale(StaleReason::DependencyNewer(dep.clone())));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Staleness::Stale(StaleReason::DependencyMissing(dep.clone())));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to stat {}", dep.display()));
            }
        }
    }
    Ok(Staleness::UpToDate)
}

/// Everything a linked artifact is built from.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactInputs<'a> {
    /// Object files
    pub objects: &'a [PathBuf],
    /// Inputs that are neither objects nor libraries
    pub others: &'a [PathBuf],
    /// Library references: paths, `-lname` or `-framework name`
    pub libraries: &'a [String],
    /// The freshest of the option and library-list timestamps
    pub options: Option<SystemTime>,
}

/// Library references that name a file, skipping `-lname` and
/// `-framework name` which cannot be stat'd.
pub fn library_files(libraries: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut iter = libraries.iter();
    while let Some(lib) = iter.next() {
        if lib == "-framework" {
            iter.next();
            continue;
        }
        if lib.starts_with("-l") {
            continue;
        }
        files.push(PathBuf::from(lib));
    }
    files
}

/// Decide whether a linked `target` is current.
///
/// Stale if it is missing, or if the options, the newest object, the
/// newest other input, or any library file is newer than it. Inputs that
/// cannot be stat'd are errors.
pub fn artifact_is_up_to_date(
    cache: &StatCache,
    target: &Path,
    inputs: &ArtifactInputs<'_>,
) -> Result<Staleness> {
    let verdict = check_artifact(cache, target, inputs);
    trace(Path::new(""), target, &verdict);
    verdict
}

fn check_artifact(cache: &StatCache, target: &Path, inputs: &ArtifactInputs<'_>) -> Result<Staleness> {
    let Some(target_stat) = stat_target(cache, target)? else {
        return Ok(Staleness::Stale(StaleReason::TargetMissing));
    };
    if is_newer(inputs.options, &target_stat) {
        return Ok(Staleness::Stale(StaleReason::OptionsNewer));
    }

    for group in [inputs.objects, inputs.others] {
        let newest = cache
            .newest_of(group)
            .context("failed to stat link inputs")?;
        if let Some((path, modified)) = newest {
            if modified > target_stat.modified {
                return Ok(Staleness::Stale(StaleReason::InputNewer(path)));
            }
        }
    }

    for lib in library_files(inputs.libraries) {
        let stat = cache
            .stat(&lib)
            .with_context(|| format!("failed to stat {}", lib.display()))?;
        if stat.is_newer_than(&target_stat) {
            return Ok(Staleness::Stale(StaleReason::LibraryNewer(lib)));
        }
    }

    Ok(Staleness::UpToDate)
}
