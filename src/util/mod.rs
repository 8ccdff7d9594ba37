//! Shared utilities

pub mod config;
pub mod fs;
pub mod process;

pub use config::BuildConfig;
pub use process::{ProcessBuilder, ProcessError};
