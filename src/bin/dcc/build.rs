//! Compile, then link or archive.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::cli::{Cli, RunMode};
use dcc::builder::compile_commands::write_compile_commands;
use dcc::builder::{BuildContext, Libraries, LinkInputs, Linker, Scheduler};
use dcc::core::classify::{is_cplusplus_file, is_header_file, is_library_file, object_filename, will_be_compiled};
use dcc::core::options::most_recent;
use dcc::core::{Options, Platform};
use dcc::util::config::{BuildConfig, DEFAULT_DCC_DIR};
use dcc::util::process::find_executable;

/// Command-line inputs sorted by kind.
#[derive(Debug, Default, PartialEq, Eq)]
struct Inputs {
    sources: Vec<PathBuf>,
    objects: Vec<PathBuf>,
    others: Vec<PathBuf>,
    compiler_options: Vec<String>,
    libraries: Vec<String>,
}

fn classify_inputs(args: &[String], platform: &Platform) -> Inputs {
    let mut inputs = Inputs::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-L" | "-F" | "-framework" => {
                inputs.libraries.push(arg.clone());
                inputs.libraries.extend(iter.next().cloned());
            }
            a if a.starts_with("-l") || a.starts_with("-L") || a.starts_with("-F") => {
                inputs.libraries.push(arg.clone());
            }
            a if a.starts_with('-') => inputs.compiler_options.push(arg.clone()),
            _ => {
                let path = PathBuf::from(arg);
                if will_be_compiled(&path) {
                    inputs.sources.push(path);
                } else if is_library_file(&path, platform) {
                    inputs.libraries.push(arg.clone());
                } else if arg.ends_with(platform.object_suffix) {
                    inputs.objects.push(path);
                } else {
                    inputs.others.push(path);
                }
            }
        }
    }
    inputs
}

/// Read an options file given explicitly, or the first of `names` found in
/// `.dcc/` or the current directory. No file means no options.
fn read_options(explicit: Option<&Path>, names: &[&str], cwd: &Path) -> Result<Options> {
    if let Some(path) = explicit {
        return Options::read_from_file(path);
    }
    let found = names.iter().find_map(|name| {
        [cwd.join(DEFAULT_DCC_DIR).join(name), cwd.join(name)]
            .into_iter()
            .find(|p| p.is_file())
    });
    match found {
        Some(path) => {
            tracing::debug!("reading options from {}", path.display());
            Options::read_from_file(&path)
        }
        None => Ok(Options::new()),
    }
}

/// Remove a `-o FILE` from an options file, returning `FILE`.
fn take_output_option(options: &mut Options, origin: &str) -> Result<Option<PathBuf>> {
    if options.option_index("-o").is_none() {
        return Ok(None);
    }
    match options.take_flag_value("-o") {
        Some(path) => Ok(Some(PathBuf::from(path))),
        None => bail!("invalid -o option in compiler options file {}", origin),
    }
}

/// Directories named by `-Ldir` or `-L dir` in linker options.
fn linker_search_dirs(options: &Options) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let mut iter = options.values.iter();
    while let Some(value) = iter.next() {
        if value == "-L" {
            dirs.extend(iter.next().map(PathBuf::from));
        } else if let Some(dir) = value.strip_prefix("-L") {
            dirs.push(PathBuf::from(dir));
        }
    }
    dirs
}

/// Fold the compiler executable's mtime into the options so a compiler
/// upgrade rebuilds everything.
fn add_compiler_mod_time(options: &mut Options, compiler: &str) {
    let mtime = find_executable(compiler)
        .and_then(|path| std::fs::metadata(path).ok())
        .and_then(|m| m.modified().ok());
    options.set_mod_time(most_recent(options.mod_time(), mtime));
}

fn configure(cli: &Cli, cwd: &Path) -> Result<BuildConfig> {
    let mut config = BuildConfig::load(cwd)?;
    if let Some(jobs) = cli.jobs {
        config.jobs = jobs.max(1);
    }
    if let Some(ref objdir) = cli.objdir {
        config.objdir = objdir.clone();
    }
    config.force |= cli.force;
    if cli.quiet {
        config.quiet = true;
        config.verbose = false;
    }
    if cli.verbose {
        config.verbose = true;
        config.quiet = false;
    }
    Ok(config)
}

pub fn execute(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    let platform = Platform::host();
    let config = configure(&cli, &cwd)?;
    let inputs = classify_inputs(&cli.inputs, &platform);

    let cplusplus = inputs.sources.iter().any(|s| is_cplusplus_file(s));
    let compiler = match cli.cc {
        Some(ref cc) => cc.clone(),
        None if cplusplus => platform.default_cxx.to_string(),
        None => platform.default_cc.to_string(),
    };

    let flags_files: &[&str] = if cplusplus { &["CXXFLAGS", "CFLAGS"] } else { &["CFLAGS"] };
    let mut compiler_options = read_options(cli.cflags_file.as_deref(), flags_files, &cwd)?;
    let flags_output = take_output_option(&mut compiler_options, flags_files[0])?;
    let output = cli.output.clone().or(flags_output);
    compiler_options.values.extend(inputs.compiler_options.iter().cloned());
    add_compiler_mod_time(&mut compiler_options, &compiler);

    let objdir = config.objdir.clone();
    let ctx = BuildContext::for_compiler(&compiler, platform, config)?;

    if cli.write_compile_commands || cli.append_compile_commands {
        let path = write_compile_commands(
            &ctx,
            &inputs.sources,
            &compiler_options,
            &objdir,
            &cwd,
            cli.append_compile_commands,
        )?;
        tracing::debug!("wrote {}", path.display());
    }

    if !Scheduler::new(&ctx).compile_all(&inputs.sources, &compiler_options, &objdir) {
        bail!("not all files compiled");
    }

    let mode = cli.mode();
    if mode == RunMode::CompileOnly {
        return Ok(());
    }

    let mut objects: Vec<PathBuf> = inputs
        .sources
        .iter()
        .filter(|s| !is_header_file(s))
        .map(|s| object_filename(s, &objdir, &ctx.platform))
        .collect();
    objects.extend(inputs.objects.iter().cloned());
    if objects.is_empty() {
        return Ok(());
    }

    let linker = Linker::new(&ctx);
    if mode == RunMode::StaticLibrary {
        let target = output.as_deref().context("--lib requires an output file (-o)")?;
        linker.archive(target, &objects)?;
        return Ok(());
    }

    let linker_options = read_options(cli.ldflags_file.as_deref(), &["LDFLAGS"], &cwd)?;
    let mut lib_options = read_options(cli.libs_file.as_deref(), &["LIBS"], &cwd)?;
    lib_options.values.extend(inputs.libraries.iter().cloned());

    let mut libraries = Libraries::from_options(&lib_options);
    let mut search = linker_search_dirs(&linker_options);
    search.extend(libraries.search_dirs.iter().cloned());
    search.extend(ctx.platform.library_paths.iter().cloned());
    libraries.resolve(&ctx.platform, &search);

    let link_inputs = LinkInputs {
        objects: &objects,
        others: &inputs.others,
        libraries: &libraries,
        options: &linker_options,
    };

    match mode {
        RunMode::SharedLibrary => {
            let target = output.as_deref().context("--dll requires an output file (-o)")?;
            linker.shared_library(target, &link_inputs)?
        }
        RunMode::Plugin => {
            let target = output.as_deref().context("--plugin requires an output file (-o)")?;
            linker.plugin(target, &link_inputs)?
        }
        _ => linker.link(output.as_deref(), &link_inputs)?,
    };
    Ok(())
}
