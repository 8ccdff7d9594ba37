//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

/// dcc - dependency-driven C/C++ compiler front end
///
/// Compiles the given source files, in parallel and only when out of date,
/// then links them into an executable, library or plugin. Compiler options
/// and libraries may follow the input files (`-I`, `-D`, `-l`, `-L`, ...).
#[derive(Parser, Debug)]
#[command(name = "dcc")]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").args(["compile_only", "lib", "dll", "plugin", "exe"])))]
pub struct Cli {
    /// Compile only, do not link
    #[arg(short = 'c')]
    pub compile_only: bool,

    /// Output file
    #[arg(short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Create a static library
    #[arg(long)]
    pub lib: bool,

    /// Create a shared library
    #[arg(long)]
    pub dll: bool,

    /// Create a loadable plugin
    #[arg(long)]
    pub plugin: bool,

    /// Link an executable (the default)
    #[arg(long)]
    pub exe: bool,

    /// Number of parallel compilations
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Rebuild everything, ignoring dependencies
    #[arg(long)]
    pub force: bool,

    /// Do not echo commands
    #[arg(long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Echo full command lines
    #[arg(long)]
    pub verbose: bool,

    /// Log dependency decisions and executed commands
    #[arg(long)]
    pub debug: bool,

    /// Directory for object files
    #[arg(long, value_name = "DIR")]
    pub objdir: Option<PathBuf>,

    /// The underlying compiler
    #[arg(long, env = "CC", value_name = "COMPILER")]
    pub cc: Option<String>,

    /// Compiler options file (default: CFLAGS or CXXFLAGS)
    #[arg(long, value_name = "FILE")]
    pub cflags_file: Option<PathBuf>,

    /// Linker options file (default: LDFLAGS)
    #[arg(long, value_name = "FILE")]
    pub ldflags_file: Option<PathBuf>,

    /// Libraries file (default: LIBS)
    #[arg(long, value_name = "FILE")]
    pub libs_file: Option<PathBuf>,

    /// Write compile_commands.json to the object directory
    #[arg(long)]
    pub write_compile_commands: bool,

    /// Merge entries into an existing compile_commands.json
    #[arg(long, conflicts_with = "write_compile_commands")]
    pub append_compile_commands: bool,

    /// Input files, followed by any compiler options and libraries
    #[arg(
        value_name = "FILES",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub inputs: Vec<String>,
}

/// What to do once everything is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    CompileOnly,
    Executable,
    StaticLibrary,
    SharedLibrary,
    Plugin,
}

impl Cli {
    pub fn mode(&self) -> RunMode {
        if self.compile_only {
            RunMode::CompileOnly
        } else if self.lib {
            RunMode::StaticLibrary
        } else if self.dll {
            RunMode::SharedLibrary
        } else if self.plugin {
            RunMode::Plugin
        } else {
            RunMode::Executable
        }
    }
}
