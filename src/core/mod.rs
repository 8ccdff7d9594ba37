//! Core data types shared by the build engine and its callers.

pub mod classify;
pub mod options;
pub mod platform;

pub use options::Options;
pub use platform::{Platform, PlatformFamily};
