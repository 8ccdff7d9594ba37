//! Dependency protocols for C/C++ compilers.
//!
//! Toolchains report header dependencies in one of two ways:
//!
//! - gcc-style compilers (gcc, clang, icc) write a make-format dependency
//!   file when asked with `-MD -MF`. See [`GccToolchain`].
//! - Microsoft's `cl` only prints an "including file" notice per header
//!   with `/showIncludes`; those lines are scraped from its output into a
//!   dependency record. See [`MsvcToolchain`].
//!
//! Both sit behind the [`Toolchain`] trait, chosen once at startup from
//! the compiler's name by [`select_toolchain`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::builder::errors::{DepsError, ToolchainError};
use crate::builder::output_mux::MuxWriter;
use crate::util::config::BuildConfig;

mod gcc;
mod msvc;

pub use gcc::{parse_make_dependencies, GccToolchain};
pub use msvc::{parse_include_record, scrape_show_includes, MsvcToolchain};

/// One translation unit to compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileUnit {
    /// Source file to compile
    pub source: PathBuf,
    /// Object file to produce
    pub object: PathBuf,
    /// Dependency record to produce alongside the object
    pub deps: PathBuf,
}

/// A dependency record read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRecord {
    /// The rule target, normally the object file
    pub target: String,
    /// Files the target depended on, in the order the compiler listed them
    pub deps: Vec<PathBuf>,
}

/// A compiler and the way it reports header dependencies.
pub trait Toolchain: Send + Sync {
    /// The compiler command.
    fn name(&self) -> &str;

    /// Compile `unit.source` to `unit.object` with `options`, writing a
    /// dependency record to `unit.deps`. Diagnostics go to `stderr`.
    ///
    /// On failure no partially written dependency record is left behind.
    fn compile(&self, unit: &CompileUnit, options: &[String], stderr: &mut MuxWriter) -> Result<()>;

    /// Arguments naming the executable a link step produces.
    fn executable_output_args(&self, target: &Path) -> Vec<String> {
        vec!["-o".to_string(), target.display().to_string()]
    }

    /// Read a dependency record written by a previous [`Toolchain::compile`].
    fn read_dependencies(&self, path: &Path) -> Result<DependencyRecord, DepsError> {
        let _ = path;
        Err(DepsError::NotImplemented {
            toolchain: self.name().to_string(),
        })
    }
}

const GCC_STYLE: &[&str] = &["cc", "c++", "gcc", "g++", "clang", "clang++", "icc", "icpc"];
const MSVC_STYLE: &[&str] = &["cl", "cl.exe", "clang-cl", "clang-cl.exe"];

/// Pick the dependency protocol for a compiler by name.
///
/// Known names match exactly (ignoring any directory); otherwise any name
/// containing `gcc`, `g++` or `clang` is treated as gcc-style, which covers
/// cross compilers such as `arm-none-eabi-gcc`.
pub fn select_toolchain(name: &str, config: &BuildConfig) -> Result<Arc<dyn Toolchain>, ToolchainError> {
    let base = Path::new(name)
        .file_name()
        .map(|b| b.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());

    if MSVC_STYLE.contains(&base.as_str()) {
        return Ok(Arc::new(MsvcToolchain::new(name, &config.show_includes_prefix)));
    }

    if GCC_STYLE.contains(&base.as_str())
        || ["gcc", "g++", "clang"].iter().any(|family| base.contains(family))
    {
        return Ok(Arc::new(GccToolchain::new(name)));
    }

    Err(ToolchainError::Unsupported {
        name: name.to_string(),
    })
}
