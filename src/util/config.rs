//! Configuration file support for dcc.
//!
//! dcc reads two optional configuration files:
//! - Global: `~/.dcc/config.toml` - User-wide defaults
//! - Project: `.dcc/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config. The environment
//! variables `NUMJOBS` and `DEPSDIR` override both, and command-line flags
//! override everything.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default directory, relative to each object file, holding dependency records.
pub const DEFAULT_DEPS_DIR: &str = ".dcc.d";

/// Default directory holding dcc's own files.
pub const DEFAULT_DCC_DIR: &str = ".dcc";

/// The line prefix `cl /showIncludes` uses for include notices.
pub const DEFAULT_SHOW_INCLUDES_PREFIX: &str = "Note: including file:";

/// Build engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Number of concurrent compilations
    pub jobs: usize,

    /// Skip all staleness checks and rebuild everything
    pub force: bool,

    /// Suppress command echo
    pub quiet: bool,

    /// Echo full command lines
    pub verbose: bool,

    /// Directory, next to each object file, for dependency records
    pub deps_dir: PathBuf,

    /// Directory object files are written to
    pub objdir: PathBuf,

    /// Prefix identifying include-trace lines in MSVC-style output
    pub show_includes_prefix: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        BuildConfig {
            jobs: default_jobs(),
            force: false,
            quiet: false,
            verbose: false,
            deps_dir: PathBuf::from(DEFAULT_DEPS_DIR),
            objdir: PathBuf::from("."),
            show_includes_prefix: DEFAULT_SHOW_INCLUDES_PREFIX.to_string(),
        }
    }
}

/// Twice the available parallelism.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(2)
}

/// Partial configuration as found in a config file. Unset keys leave the
/// lower-precedence value alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ConfigFile {
    build: PartialBuildConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct PartialBuildConfig {
    jobs: Option<usize>,
    force: Option<bool>,
    quiet: Option<bool>,
    verbose: Option<bool>,
    deps_dir: Option<PathBuf>,
    objdir: Option<PathBuf>,
    show_includes_prefix: Option<String>,
}

impl BuildConfig {
    /// Load configuration from the global and project files, then apply
    /// environment overrides.
    pub fn load(project_root: &Path) -> Result<Self> {
        let mut config = BuildConfig::default();

        if let Some(global) = global_config_path() {
            if global.exists() {
                config.merge_file(&global)?;
            }
        }

        let project = project_config_path(project_root);
        if project.exists() {
            config.merge_file(&project)?;
        }

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Merge settings from a TOML file (file takes precedence).
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        self.merge_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    fn merge_str(&mut self, contents: &str) -> Result<()> {
        let file: ConfigFile = toml::from_str(contents)?;
        let build = file.build;

        if let Some(jobs) = build.jobs {
            self.jobs = jobs.max(1);
        }
        if let Some(force) = build.force {
            self.force = force;
        }
        if let Some(quiet) = build.quiet {
            self.quiet = quiet;
        }
        if let Some(verbose) = build.verbose {
            self.verbose = verbose;
        }
        if let Some(deps_dir) = build.deps_dir {
            self.deps_dir = deps_dir;
        }
        if let Some(objdir) = build.objdir {
            self.objdir = objdir;
        }
        if let Some(prefix) = build.show_includes_prefix {
            self.show_includes_prefix = prefix;
        }
        Ok(())
    }

    /// Apply `NUMJOBS` and `DEPSDIR` overrides using the given lookup.
    ///
    /// An unparsable `NUMJOBS` is reported and ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("NUMJOBS").filter(|v| !v.is_empty()) {
            match value.parse::<usize>() {
                Ok(n) if n > 0 => self.jobs = n,
                Ok(_) => tracing::warn!("environment variable NUMJOBS must be positive"),
                Err(e) => tracing::warn!("environment variable NUMJOBS has invalid value: {}", e),
            }
        }
        if let Some(value) = lookup("DEPSDIR").filter(|v| !v.is_empty()) {
            self.deps_dir = PathBuf::from(value);
        }
    }
}

/// Get the global dcc config directory (~/.dcc).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(DEFAULT_DCC_DIR))
}

/// Get the global config path (~/.dcc/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.dcc/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(DEFAULT_DCC_DIR).join("config.toml")
}
