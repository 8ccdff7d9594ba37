//! Build engine error types.

use std::io;

use thiserror::Error;

/// A dependency record could not be used.
#[derive(Debug, Error)]
pub enum DepsError {
    /// The record is empty.
    #[error("unexpected end of file")]
    UnexpectedEof,

    /// The first rule has no `:` after its target.
    #[error("expected a make-target on line 1 of dependency file, no ':' found")]
    NoColon,

    /// More than one rule target was found.
    #[error("multiple targets found in dependency file")]
    MultipleTargets,

    /// The toolchain has no way to read dependency records.
    #[error("reading dependencies is not implemented for `{toolchain}`")]
    NotImplemented { toolchain: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DepsError {
    /// True if the record simply does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DepsError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

/// No dependency protocol is known for a compiler.
#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("{name}: unsupported compiler")]
    Unsupported { name: String },
}
