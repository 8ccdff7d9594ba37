//! GCC/Clang toolchain: make-format dependency files.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Result;

use crate::builder::errors::DepsError;
use crate::builder::output_mux::MuxWriter;
use crate::util::fs::remove_file_if_exists;
use crate::util::process::ProcessBuilder;

use super::{CompileUnit, DependencyRecord, Toolchain};

/// A compiler that writes make-style dependencies with `-MD -MF`.
///
/// Used for gcc, clang and icc and anything named like them, e.g. cross
/// compilers.
#[derive(Debug, Clone)]
pub struct GccToolchain {
    command: String,
}

impl GccToolchain {
    pub fn new(command: impl Into<String>) -> Self {
        GccToolchain {
            command: command.into(),
        }
    }

    /// The command that compiles `unit`.
    pub fn compile_command(&self, unit: &CompileUnit, options: &[String]) -> ProcessBuilder {
        ProcessBuilder::new(&self.command)
            .args(options)
            .arg("-MD")
            .arg("-MF")
            .arg(&unit.deps)
            .arg("-c")
            .arg(&unit.source)
            .arg("-o")
            .arg(&unit.object)
    }
}

impl Toolchain for GccToolchain {
    fn name(&self) -> &str {
        &self.command
    }

    fn compile(&self, unit: &CompileUnit, options: &[String], stderr: &mut MuxWriter) -> Result<()> {
        let result = self
            .compile_command(unit, options)
            .run_with(Stdio::inherit(), stderr.stdio()?);

        if result.is_err() {
            if let Err(e) = remove_file_if_exists(&unit.deps) {
                tracing::warn!("failed to remove {}: {}", unit.deps.display(), e);
            }
        }
        result
    }

    fn read_dependencies(&self, path: &Path) -> Result<DependencyRecord, DepsError> {
        let text = std::fs::read_to_string(path)?;
        parse_make_dependencies(&text)
    }
}

/// Parse a make-format dependency rule: `target: dep dep \` ...
///
/// The target may be followed by a separate `:` token. Line-continuation
/// backslashes are dropped. A second rule is rejected rather than merged.
pub fn parse_make_dependencies(text: &str) -> Result<DependencyRecord, DepsError> {
    let mut words = text.split_whitespace();

    let first = words.next().ok_or(DepsError::UnexpectedEof)?;
    let target = match first.strip_suffix(':') {
        Some(target) => target,
        None => {
            if words.next() != Some(":") {
                return Err(DepsError::NoColon);
            }
            first
        }
    };

    let mut deps = Vec::new();
    for word in words {
        let word = word.strip_suffix('\\').unwrap_or(word);
        if word.is_empty() {
            continue;
        }
        if word.ends_with(':') {
            return Err(DepsError::MultipleTargets);
        }
        deps.push(PathBuf::from(word));
    }

    Ok(DependencyRecord {
        target: target.to_string(),
        deps,
    })
}
