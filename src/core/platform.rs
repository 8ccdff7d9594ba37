//! Host platform conventions.
//!
//! File name prefixes and suffixes, the standard library directories, and
//! the commands used to create static libraries, shared libraries and
//! plugins. These are the pieces of a build that differ per operating
//! system but not per compiler.

use std::path::{Path, PathBuf};

use crate::util::process::ProcessBuilder;

/// The object/library format family of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformFamily {
    /// Linux, FreeBSD and other ELF systems (`ar`, `cc -shared`)
    Elf,
    /// macOS (`libtool`, `.dylib`, `-bundle` plugins)
    Macos,
    /// Windows with Microsoft tools (`lib`, `link /DLL`)
    Windows,
}

/// Platform-specific naming and tool conventions.
#[derive(Debug, Clone)]
pub struct Platform {
    pub family: PlatformFamily,
    pub default_cc: &'static str,
    pub default_cxx: &'static str,
    pub object_suffix: &'static str,
    pub static_lib_prefix: &'static str,
    pub static_lib_suffix: &'static str,
    pub dynamic_lib_prefix: &'static str,
    pub dynamic_lib_suffix: &'static str,
    pub plugin_prefix: &'static str,
    pub plugin_suffix: &'static str,
    pub default_executable: &'static str,
    /// Directories searched for `-lname` libraries before any `-L` paths
    pub library_paths: Vec<PathBuf>,
}

impl Platform {
    /// Conventions for the host the tool was built for.
    pub fn host() -> Self {
        if cfg!(windows) {
            Platform::windows()
        } else if cfg!(target_os = "macos") {
            Platform::macos()
        } else {
            Platform::elf()
        }
    }

    pub fn elf() -> Self {
        let library_paths = if cfg!(target_pointer_width = "64") {
            vec![
                "/usr/local/lib",
                "/usr/lib",
                "/usr/lib64",
                "/usr/lib/x86_64-linux-gnu",
                "/lib/x86_64-linux-gnu",
                "/lib64",
                "/lib",
            ]
        } else {
            vec!["/usr/local/lib", "/usr/lib32", "/usr/lib", "/lib"]
        };
        Platform {
            family: PlatformFamily::Elf,
            default_cc: "cc",
            default_cxx: "c++",
            object_suffix: ".o",
            static_lib_prefix: "lib",
            static_lib_suffix: ".a",
            dynamic_lib_prefix: "lib",
            dynamic_lib_suffix: ".so",
            plugin_prefix: "",
            plugin_suffix: ".so",
            default_executable: "a.out",
            library_paths: library_paths.into_iter().map(PathBuf::from).collect(),
        }
    }

    pub fn macos() -> Self {
        Platform {
            family: PlatformFamily::Macos,
            default_cc: "cc",
            default_cxx: "c++",
            object_suffix: ".o",
            static_lib_prefix: "lib",
            static_lib_suffix: ".a",
            dynamic_lib_prefix: "lib",
            dynamic_lib_suffix: ".dylib",
            plugin_prefix: "",
            plugin_suffix: ".bundle",
            default_executable: "a.out",
            library_paths: vec![PathBuf::from("/usr/lib")],
        }
    }

    pub fn windows() -> Self {
        let library_paths = std::env::var_os("LIB")
            .map(|lib| std::env::split_paths(&lib).collect())
            .unwrap_or_default();
        Platform {
            family: PlatformFamily::Windows,
            default_cc: "cl",
            default_cxx: "cl",
            object_suffix: ".obj",
            static_lib_prefix: "",
            static_lib_suffix: ".lib",
            dynamic_lib_prefix: "",
            dynamic_lib_suffix: ".dll",
            plugin_prefix: "",
            plugin_suffix: ".dll",
            default_executable: "program.exe",
            library_paths,
        }
    }

    /// `foo` -> `libfoo.a`
    pub fn static_library(&self, name: &str) -> String {
        format!("{}{}{}", self.static_lib_prefix, name, self.static_lib_suffix)
    }

    /// `foo` -> `libfoo.so`
    pub fn dynamic_library(&self, name: &str) -> String {
        format!("{}{}{}", self.dynamic_lib_prefix, name, self.dynamic_lib_suffix)
    }

    /// Find a library by its short name, preferring the dynamic library,
    /// in each directory in turn.
    pub fn find_library(&self, dirs: &[PathBuf], name: &str) -> Option<PathBuf> {
        let candidates = [self.dynamic_library(name), self.static_library(name)];
        dirs.iter().find_map(|dir| {
            candidates
                .iter()
                .map(|file| dir.join(file))
                .find(|path| path.is_file())
        })
    }

    /// Rewrite library paths that live in a standard directory back into
    /// `-lname` form, leaving everything else alone.
    pub fn endash(&self, libs: &[String]) -> Vec<String> {
        libs.iter()
            .map(|lib| {
                let path = Path::new(lib);
                let in_standard_dir = path
                    .parent()
                    .is_some_and(|dir| self.library_paths.iter().any(|p| p == dir));
                if !in_standard_dir {
                    return lib.clone();
                }
                let Some(base) = path.file_name().map(|b| b.to_string_lossy()) else {
                    return lib.clone();
                };
                let stem = base
                    .strip_suffix(self.static_lib_suffix)
                    .or_else(|| base.strip_suffix(self.dynamic_lib_suffix))
                    .unwrap_or(&base);
                let name = stem
                    .strip_prefix(self.static_lib_prefix)
                    .or_else(|| stem.strip_prefix(self.dynamic_lib_prefix))
                    .unwrap_or(stem);
                format!("-l{}", name)
            })
            .collect()
    }

    /// Command creating a static library from object files.
    pub fn archive_command(&self, target: &Path, objects: &[PathBuf]) -> ProcessBuilder {
        match self.family {
            PlatformFamily::Elf => ProcessBuilder::new("ar")
                .arg("rcs")
                .arg(target)
                .args(objects),
            PlatformFamily::Macos => ProcessBuilder::new("libtool")
                .args(["-static", "-o"])
                .arg(target)
                .args(objects),
            PlatformFamily::Windows => ProcessBuilder::new("lib")
                .arg("/nologo")
                .arg(format!("/OUT:{}", target.display()))
                .args(objects),
        }
    }

    /// Command creating a shared library.
    pub fn shared_command(
        &self,
        compiler: &str,
        target: &Path,
        inputs: &[PathBuf],
        libs: &[String],
        options: &[String],
    ) -> ProcessBuilder {
        match self.family {
            PlatformFamily::Elf => ProcessBuilder::new(compiler)
                .arg("-shared")
                .args(options)
                .arg("-o")
                .arg(target)
                .args(inputs)
                .args(libs),
            PlatformFamily::Macos => ProcessBuilder::new(compiler)
                .arg("-dynamiclib")
                .args(options)
                .arg("-o")
                .arg(target)
                .args(inputs)
                .args(libs),
            PlatformFamily::Windows => ProcessBuilder::new("link")
                .args(["/nologo", "/DLL"])
                .arg(format!("/OUT:{}", target.display()))
                .args(inputs)
                .args(options)
                .args(libs),
        }
    }

    /// Command creating a loadable plugin. Only macOS distinguishes
    /// plugins (bundles) from shared libraries.
    pub fn plugin_command(
        &self,
        compiler: &str,
        target: &Path,
        inputs: &[PathBuf],
        libs: &[String],
        options: &[String],
    ) -> ProcessBuilder {
        match self.family {
            PlatformFamily::Macos => ProcessBuilder::new(compiler)
                .arg("-bundle")
                .args(options)
                .arg("-o")
                .arg(target)
                .args(inputs)
                .args(libs),
            _ => self.shared_command(compiler, target, inputs, libs, options),
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Platform::host()
    }
}
