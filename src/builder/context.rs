//! Build context - toolchain, platform, and the shared stat cache.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::builder::stat::StatCache;
use crate::builder::toolchain::{select_toolchain, Toolchain};
use crate::core::Platform;
use crate::util::config::BuildConfig;

/// Everything the compile and link stages share.
#[derive(Clone)]
pub struct BuildContext {
    /// Dependency protocol for the compiler in use
    pub toolchain: Arc<dyn Toolchain>,

    /// Naming and tool conventions
    pub platform: Platform,

    /// Jobs, force/quiet/verbose and output directories
    pub config: BuildConfig,

    /// File metadata shared by every worker for the life of the build
    pub stat: Arc<StatCache>,
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("toolchain", &self.toolchain.name())
            .field("platform", &self.platform)
            .field("config", &self.config)
            .field("stat_entries", &self.stat.len())
            .finish()
    }
}

impl BuildContext {
    pub fn new(toolchain: Arc<dyn Toolchain>, platform: Platform, config: BuildConfig) -> Self {
        BuildContext {
            toolchain,
            platform,
            config,
            stat: Arc::new(StatCache::new()),
        }
    }

    /// Create a context for the compiler named `compiler`.
    pub fn for_compiler(compiler: &str, platform: Platform, config: BuildConfig) -> Result<Self> {
        let toolchain = select_toolchain(compiler, &config)?;
        tracing::debug!("using {} for dependency tracking", toolchain.name());
        Ok(BuildContext::new(toolchain, platform, config))
    }

    /// Share an existing stat cache, e.g. between the compile and link stages.
    pub fn with_stat_cache(mut self, stat: Arc<StatCache>) -> Self {
        self.stat = stat;
        self
    }

    /// The compiler command.
    pub fn compiler(&self) -> &str {
        self.toolchain.name()
    }

    /// The configured object directory, or `None` for "next to the source".
    pub fn objdir(&self) -> Option<&Path> {
        let objdir = self.config.objdir.as_path();
        if objdir.as_os_str().is_empty() || objdir == Path::new(".") {
            None
        } else {
            Some(objdir)
        }
    }
}
