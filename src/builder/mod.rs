//! The build engine.
//!
//! Compiles translation units in parallel, skipping those whose object
//! files are newer than their sources, options and recorded header
//! dependencies, then links or archives the result.

pub mod compile_commands;
pub mod context;
pub mod errors;
pub mod link;
pub mod output_mux;
pub mod scheduler;
pub mod staleness;
pub mod stat;
pub mod toolchain;

pub use context::BuildContext;
pub use errors::{DepsError, ToolchainError};
pub use link::{Libraries, LibraryResolver, LinkInputs, LinkOutcome, Linker};
pub use output_mux::{MuxWriter, OutputMux};
pub use scheduler::{BatchSummary, Scheduler, UnitOutcome};
pub use staleness::{is_up_to_date, StaleReason, Staleness};
pub use stat::{FileStat, StatCache};
pub use toolchain::{select_toolchain, CompileUnit, DependencyRecord, GccToolchain, MsvcToolchain, Toolchain};
