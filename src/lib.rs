//! dcc - a dependency-driven C/C++ compiler front end.
//!
//! dcc wraps an existing compiler to give incremental, parallel builds
//! without a makefile. Object files are rebuilt only when their source,
//! options, or any header recorded in the compiler's own dependency
//! output has changed.

pub mod builder;
pub mod core;
pub mod util;

pub use builder::{BuildContext, Linker, Scheduler};
pub use core::{Options, Platform};
pub use util::config::BuildConfig;
