//! MSVC toolchain: dependencies scraped from `/showIncludes` output.
//!
//! `cl` has no dependency-file mode. With `/showIncludes` it prints a
//! notice for every header it opens, mixed in with its ordinary
//! diagnostics. The compiler's output is routed through a pipe and a
//! scraper thread splits it: include notices go to the dependency record,
//! everything else to the unit's error stream.
//!
//! Record format: the object path on the first line, then one dependency
//! per line.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::thread;

use anyhow::{anyhow, Context, Result};

use crate::builder::errors::DepsError;
use crate::builder::output_mux::MuxWriter;
use crate::util::fs::remove_file_if_exists;
use crate::util::process::ProcessBuilder;

use super::{CompileUnit, DependencyRecord, Toolchain};

/// Microsoft's `cl` (or a compatible driver such as `clang-cl`).
#[derive(Debug, Clone)]
pub struct MsvcToolchain {
    command: String,
    prefix: String,
}

impl MsvcToolchain {
    /// `prefix` is the include-notice prefix, which `cl` localizes.
    pub fn new(command: impl Into<String>, prefix: impl Into<String>) -> Self {
        MsvcToolchain {
            command: command.into(),
            prefix: prefix.into(),
        }
    }

    /// The command that compiles `unit`.
    pub fn compile_command(&self, unit: &CompileUnit, options: &[String]) -> ProcessBuilder {
        ProcessBuilder::new(&self.command)
            .args(options)
            .args(["/nologo", "/showIncludes", "/c"])
            .arg(&unit.source)
            .arg(format!("/Fo{}", unit.object.display()))
    }

    fn compile_with_record(
        &self,
        unit: &CompileUnit,
        options: &[String],
        stderr: &mut MuxWriter,
    ) -> Result<()> {
        let file = File::create(&unit.deps)
            .with_context(|| format!("failed to create {}", unit.deps.display()))?;
        let mut record = BufWriter::new(file);
        writeln!(record, "{}", unit.object.display())
            .with_context(|| format!("failed to write {}", unit.deps.display()))?;

        let (reader, writer) = io::pipe()?;
        let mut diagnostics = stderr.try_clone()?;
        let prefix = self.prefix.clone();
        let source_name = unit
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let scraper = thread::Builder::new()
            .name("show-includes".to_string())
            .spawn(move || {
                scrape_show_includes(
                    BufReader::new(reader),
                    &prefix,
                    &source_name,
                    &mut record,
                    &mut diagnostics,
                )?;
                record.into_inner().map_err(|e| e.into_error())?.sync_all()
            })?;

        // `writer` moves into the child's stdout and is closed when the
        // command is dropped, which ends the scraper's input.
        let compiled = self
            .compile_command(unit, options)
            .run_with(Stdio::from(writer), stderr.stdio()?);

        let scraped = scraper
            .join()
            .map_err(|_| anyhow!("include scraper panicked"))?
            .with_context(|| format!("failed to write {}", unit.deps.display()));

        compiled.and(scraped)
    }
}

impl Toolchain for MsvcToolchain {
    fn name(&self) -> &str {
        &self.command
    }

    fn executable_output_args(&self, target: &Path) -> Vec<String> {
        vec![format!("/Fe{}", target.display())]
    }

    fn compile(&self, unit: &CompileUnit, options: &[String], stderr: &mut MuxWriter) -> Result<()> {
        let result = self.compile_with_record(unit, options, stderr);
        if result.is_err() {
            if let Err(e) = remove_file_if_exists(&unit.deps) {
                tracing::warn!("failed to remove {}: {}", unit.deps.display(), e);
            }
        }
        result
    }

    fn read_dependencies(&self, path: &Path) -> Result<DependencyRecord, DepsError> {
        let text = std::fs::read_to_string(path)?;
        parse_include_record(&text)
    }
}

/// Split compiler output into include notices and diagnostics.
///
/// Lines starting with `prefix` contribute their (trimmed) path to `deps`.
/// `cl` echoes the name of the file being compiled; that line is dropped.
/// Everything else is passed through to `diagnostics`.
pub fn scrape_show_includes<R, D, E>(
    input: R,
    prefix: &str,
    source_name: &str,
    deps: &mut D,
    diagnostics: &mut E,
) -> io::Result<()>
where
    R: BufRead,
    D: Write,
    E: Write,
{
    for line in input.lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if let Some(path) = line.strip_prefix(prefix) {
            writeln!(deps, "{}", path.trim())?;
        } else if line != source_name {
            writeln!(diagnostics, "{}", line)?;
        }
    }
    deps.flush()?;
    diagnostics.flush()
}

/// Parse an include-trace dependency record.
pub fn parse_include_record(text: &str) -> Result<DependencyRecord, DepsError> {
    let mut lines = text.lines().map(|l| l.trim_end_matches('\r'));
    let target = lines
        .next()
        .filter(|t| !t.trim().is_empty())
        .ok_or(DepsError::UnexpectedEof)?;

    let deps = lines
        .filter(|l| !l.trim().is_empty())
        .map(PathBuf::from)
        .collect();

    Ok(DependencyRecord {
        target: target.to_string(),
        deps,
    })
}
