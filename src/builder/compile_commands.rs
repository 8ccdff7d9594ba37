//! `compile_commands.json` generation for editors and language servers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::context::BuildContext;
use crate::core::classify::object_filename;
use crate::core::Options;

/// File name of the compilation database.
pub const COMPILE_COMMANDS_FILE: &str = "compile_commands.json";

/// One entry of a JSON compilation database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileCommand {
    pub directory: PathBuf,
    pub command: String,
    pub file: PathBuf,
}

/// The database entries for `sources`.
pub fn compile_commands(
    ctx: &BuildContext,
    sources: &[PathBuf],
    options: &Options,
    objdir: &Path,
    cwd: &Path,
) -> Vec<CompileCommand> {
    sources
        .iter()
        .map(|source| {
            let object = object_filename(source, objdir, &ctx.platform);
            let mut command = vec![ctx.compiler().to_string()];
            command.extend(options.values.iter().cloned());
            command.extend([
                "-o".to_string(),
                object.display().to_string(),
                "-c".to_string(),
                source.display().to_string(),
            ]);
            CompileCommand {
                directory: cwd.to_path_buf(),
                command: command.join(" "),
                file: source.clone(),
            }
        })
        .collect()
}

/// Write `<objdir>/compile_commands.json`.
///
/// With `append`, entries already in the file are kept, except those for
/// files in `sources`, which are replaced. Returns the path written.
pub fn write_compile_commands(
    ctx: &BuildContext,
    sources: &[PathBuf],
    options: &Options,
    objdir: &Path,
    cwd: &Path,
    append: bool,
) -> Result<PathBuf> {
    let path = objdir.join(COMPILE_COMMANDS_FILE);
    let fresh = compile_commands(ctx, sources, options, objdir, cwd);

    let mut commands = if append {
        read_compile_commands(&path)?
    } else {
        Vec::new()
    };
    commands.retain(|existing| !fresh.iter().any(|c| c.file == existing.file));
    commands.extend(fresh);

    crate::util::fs::ensure_dir(objdir)?;
    let json = serde_json::to_string_pretty(&commands)?;
    std::fs::write(&path, json + "\n")
        .with_context(|| format!("failed to write {}", path.display()))?;

    tracing::debug!("wrote {} entries to {}", commands.len(), path.display());
    Ok(path)
}

/// Read a compilation database. A missing file is an empty database.
pub fn read_compile_commands(path: &Path) -> Result<Vec<CompileCommand>> {
    match std::fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}
