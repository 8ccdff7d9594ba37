//! Parallel compilation of translation units.
//!
//! A feeder pushes source paths onto a bounded queue, a fixed pool of
//! workers pulls from it, and the calling thread collects one result per
//! unit. Each worker checks whether its unit is up to date before
//! invoking the compiler. A failing unit is logged and counted but does not
//! stop the rest of the batch.

use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::bounded;

use crate::builder::context::BuildContext;
use crate::builder::errors::DepsError;
use crate::builder::output_mux::OutputMux;
use crate::builder::staleness::{is_up_to_date, SourceInput};
use crate::builder::toolchain::CompileUnit;
use crate::core::classify::{deps_filename, object_filename};
use crate::core::Options;
use crate::util::fs::ensure_dir;

/// What happened to one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    Compiled,
    UpToDate,
}

/// Totals for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub compiled: usize,
    pub up_to_date: usize,
    pub failed: usize,
    /// Output streams handed to compiler processes
    pub output_streams: usize,
}

impl BatchSummary {
    /// True if every unit compiled or was already up to date.
    pub fn succeeded(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} compiled, {} up to date, {} failed",
            self.compiled, self.up_to_date, self.failed
        )
    }
}

/// Compiles batches of sources with the context's toolchain.
pub struct Scheduler<'a> {
    ctx: &'a BuildContext,
}

impl<'a> Scheduler<'a> {
    pub fn new(ctx: &'a BuildContext) -> Self {
        Scheduler { ctx }
    }

    /// Compile every source, routing compiler diagnostics to stderr.
    ///
    /// Returns true iff every unit compiled or was already up to date.
    pub fn compile_all(&self, sources: &[PathBuf], options: &Options, objdir: &Path) -> bool {
        match self.compile_all_to(sources, options, objdir, io::stderr()) {
            Ok((summary, _)) => summary.succeeded(),
            Err(e) => {
                tracing::error!("{:#}", e);
                false
            }
        }
    }

    /// Compile every source, writing compiler diagnostics to `out`.
    ///
    /// Errors are only returned for failures of the batch machinery itself;
    /// per-unit failures are logged and counted in the summary.
    pub fn compile_all_to<W>(
        &self,
        sources: &[PathBuf],
        options: &Options,
        objdir: &Path,
        out: W,
    ) -> Result<(BatchSummary, W)>
    where
        W: Write + Send + 'static,
    {
        let mux = OutputMux::new(out)?;
        let jobs = self.ctx.config.jobs.max(1);
        let workers = jobs.min(sources.len());

        let (work_tx, work_rx) = bounded::<&Path>(jobs);
        let (result_tx, result_rx) = bounded::<(&Path, Result<UnitOutcome>)>(jobs);

        let mut summary = thread::scope(|s| {
            s.spawn(move || {
                for source in sources {
                    if work_tx.send(source.as_path()).is_err() {
                        break;
                    }
                }
            });

            for _ in 0..workers {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                let mux = &mux;
                s.spawn(move || {
                    for source in work_rx {
                        let result = self.compile(source, options, objdir, mux);
                        if result_tx.send((source, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(work_rx);
            drop(result_tx);

            let mut summary = BatchSummary::default();
            for (source, result) in result_rx {
                match result {
                    Ok(UnitOutcome::Compiled) => summary.compiled += 1,
                    Ok(UnitOutcome::UpToDate) => summary.up_to_date += 1,
                    Err(e) => {
                        tracing::error!("{}: {:#}", source.display(), e);
                        summary.failed += 1;
                    }
                }
            }
            summary
        });

        summary.output_streams = mux.streams_created();
        let out = mux.stop()?;

        tracing::info!("{}", summary);
        Ok((summary, out))
    }

    /// Compile one source if it is out of date.
    pub fn compile<W>(
        &self,
        source: &Path,
        options: &Options,
        objdir: &Path,
        mux: &OutputMux<W>,
    ) -> Result<UnitOutcome>
    where
        W: Write + Send + 'static,
    {
        let ctx = self.ctx;
        let object = object_filename(source, objdir, &ctx.platform);
        let deps = deps_filename(&object, &ctx.config.deps_dir);

        let object_dir = object.parent().unwrap_or(Path::new(""));
        ensure_dir(object_dir)?;
        let deps_dir = deps.parent().unwrap_or(Path::new(""));
        if deps_dir != object_dir {
            ensure_dir(deps_dir)?;
        }

        let unit = CompileUnit {
            source: source.to_path_buf(),
            object,
            deps,
        };

        if !ctx.config.force && self.is_current(&unit, options)? {
            return Ok(UnitOutcome::UpToDate);
        }

        ctx.stat.invalidate(&unit.object);
        self.echo(&unit, options, objdir);

        let mut stderr = mux
            .new_writer()
            .context("failed to create compiler output stream")?;
        ctx.toolchain.compile(&unit, &options.values, &mut stderr)?;
        Ok(UnitOutcome::Compiled)
    }

    fn is_current(&self, unit: &CompileUnit, options: &Options) -> Result<bool> {
        let ctx = self.ctx;
        let source_stat = ctx
            .stat
            .stat(&unit.source)
            .with_context(|| format!("failed to stat {}", unit.source.display()))?;

        let record = match ctx.toolchain.read_dependencies(&unit.deps) {
            Ok(record) => record,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(DepsError::NotImplemented { toolchain }) => {
                tracing::debug!("{}: no dependency information, recompiling", toolchain);
                return Ok(false);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", unit.deps.display()));
            }
        };

        if Path::new(&record.target).file_name() != unit.object.file_name() {
            tracing::warn!(
                "got dependency target `{}` for object file `{}`",
                record.target,
                unit.object.display()
            );
        }

        let verdict = is_up_to_date(
            &ctx.stat,
            &unit.object,
            &record.deps,
            SourceInput {
                path: &unit.source,
                stat: source_stat,
            },
            options,
        )?;
        Ok(verdict.is_up_to_date())
    }

    fn echo(&self, unit: &CompileUnit, options: &Options, objdir: &Path) {
        let config = &self.ctx.config;
        if config.quiet {
            return;
        }
        let mut line = vec![self.ctx.compiler().to_string()];
        if config.verbose {
            line.extend(options.values.iter().cloned());
            line.push(unit.source.display().to_string());
            if objdir != Path::new(".") && !objdir.as_os_str().is_empty() {
                line.push("-o".to_string());
                line.push(unit.object.display().to_string());
            }
        } else {
            line.push(unit.source.display().to_string());
        }
        println!("{}", line.join(" "));
    }
}
