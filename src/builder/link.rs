//! Linking executables, shared libraries, plugins and static archives.
//!
//! Each stage is a single command run only when the artifact is out of
//! date with respect to its objects, other inputs, options and library
//! files. Libraries named `-lname` are resolved to files first so their
//! timestamps can be compared too.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::context::BuildContext;
use crate::builder::staleness::{artifact_is_up_to_date, ArtifactInputs, Staleness};
use crate::core::options::most_recent_mod_time;
use crate::core::{Options, Platform};
use crate::util::process::ProcessBuilder;

/// Finds the file behind a short `-lname` library reference.
pub trait LibraryResolver {
    fn find_library(&self, dirs: &[PathBuf], name: &str) -> Option<PathBuf>;
}

impl LibraryResolver for Platform {
    fn find_library(&self, dirs: &[PathBuf], name: &str) -> Option<PathBuf> {
        Platform::find_library(self, dirs, name)
    }
}

/// A library list split into its parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Libraries {
    /// Library references: file paths and `-lname`
    pub libraries: Options,
    /// Directories from `-L`
    pub search_dirs: Vec<PathBuf>,
    /// `-F` directories followed by `-framework name` pairs
    pub frameworks: Vec<String>,
}

impl Libraries {
    /// Split a library option list into library references, `-L`
    /// directories and macOS framework arguments. Accepts both `-Ldir` and
    /// `-L dir`.
    pub fn from_options(options: &Options) -> Self {
        let mut libraries = Options::new();
        libraries.path = options.path.clone();
        libraries.set_mod_time(options.mod_time());

        let mut search_dirs = Vec::new();
        let mut framework_dirs = Vec::new();
        let mut frameworks = Vec::new();

        let mut iter = options.values.iter();
        while let Some(value) = iter.next() {
            match value.as_str() {
                "-L" => search_dirs.extend(iter.next().map(PathBuf::from)),
                "-F" => framework_dirs.extend(iter.next().map(|d| format!("-F{}", d))),
                "-framework" => {
                    if let Some(name) = iter.next() {
                        frameworks.push(value.clone());
                        frameworks.push(name.clone());
                    }
                }
                v if v.starts_with("-L") => search_dirs.push(PathBuf::from(&v[2..])),
                v if v.starts_with("-F") => framework_dirs.push(v.to_string()),
                _ => libraries.append(value.clone()),
            }
        }

        framework_dirs.extend(frameworks);
        Libraries {
            libraries,
            search_dirs,
            frameworks: framework_dirs,
        }
    }

    /// Replace each `-lname` with the file it refers to.
    ///
    /// `dirs` are searched in order. A library that cannot be found is left
    /// as `-lname` with a warning; the linker may still find it on paths
    /// we know nothing about.
    pub fn resolve(&mut self, resolver: &dyn LibraryResolver, dirs: &[PathBuf]) {
        for value in &mut self.libraries.values {
            let Some(name) = value.strip_prefix("-l") else {
                continue;
            };
            match resolver.find_library(dirs, name) {
                Some(path) => {
                    tracing::debug!("library `{}` -> {}", name, path.display());
                    *value = path.display().to_string();
                }
                None => {
                    tracing::warn!("{} library not found on path {:?}", value, dirs);
                }
            }
        }
    }
}

/// Everything a link step consumes.
#[derive(Debug, Clone, Copy)]
pub struct LinkInputs<'a> {
    pub objects: &'a [PathBuf],
    /// Inputs that are neither sources nor libraries, e.g. `.def` files
    pub others: &'a [PathBuf],
    pub libraries: &'a Libraries,
    pub options: &'a Options,
}

impl<'a> LinkInputs<'a> {
    fn staleness_inputs(&self) -> ArtifactInputs<'a> {
        ArtifactInputs {
            objects: self.objects,
            others: self.others,
            libraries: &self.libraries.libraries.values,
            options: most_recent_mod_time(self.options, &self.libraries.libraries),
        }
    }
}

/// Whether a link step ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    UpToDate,
}

/// Runs link and archive steps for a build context.
pub struct Linker<'a> {
    ctx: &'a BuildContext,
}

impl<'a> Linker<'a> {
    pub fn new(ctx: &'a BuildContext) -> Self {
        Linker { ctx }
    }

    /// Link an executable. Without a target the platform default name is used.
    pub fn link(&self, target: Option<&Path>, inputs: &LinkInputs<'_>) -> Result<LinkOutcome> {
        let target = target.unwrap_or(Path::new(self.ctx.platform.default_executable));
        let libs = self.ctx.platform.endash(&inputs.libraries.libraries.values);
        let cmd = ProcessBuilder::new(self.ctx.compiler())
            .args(&inputs.options.values)
            .args(inputs.objects)
            .args(libs)
            .args(&inputs.libraries.frameworks)
            .args(self.ctx.toolchain.executable_output_args(target));

        self.run_if_stale("ld", target, &inputs.staleness_inputs(), cmd)
    }

    /// Create a shared (dynamic) library.
    pub fn shared_library(&self, target: &Path, inputs: &LinkInputs<'_>) -> Result<LinkOutcome> {
        let (files, libs) = self.shared_args(inputs);
        let cmd = self.ctx.platform.shared_command(
            self.ctx.compiler(),
            target,
            &files,
            &libs,
            &inputs.options.values,
        );
        self.run_if_stale("ld", target, &inputs.staleness_inputs(), cmd)
    }

    /// Create a loadable plugin.
    pub fn plugin(&self, target: &Path, inputs: &LinkInputs<'_>) -> Result<LinkOutcome> {
        let (files, libs) = self.shared_args(inputs);
        let cmd = self.ctx.platform.plugin_command(
            self.ctx.compiler(),
            target,
            &files,
            &libs,
            &inputs.options.values,
        );
        self.run_if_stale("ld", target, &inputs.staleness_inputs(), cmd)
    }

    /// Create a static library from object files.
    pub fn archive(&self, target: &Path, objects: &[PathBuf]) -> Result<LinkOutcome> {
        let inputs = ArtifactInputs {
            objects,
            ..Default::default()
        };
        let cmd = self.ctx.platform.archive_command(target, objects);
        self.run_if_stale("ar", target, &inputs, cmd)
    }

    fn shared_args(&self, inputs: &LinkInputs<'_>) -> (Vec<PathBuf>, Vec<String>) {
        let files = inputs.objects.iter().chain(inputs.others).cloned().collect();
        let mut libs = inputs.libraries.libraries.values.clone();
        libs.extend(inputs.libraries.frameworks.iter().cloned());
        (files, libs)
    }

    fn run_if_stale(
        &self,
        tool: &str,
        target: &Path,
        inputs: &ArtifactInputs<'_>,
        cmd: ProcessBuilder,
    ) -> Result<LinkOutcome> {
        let ctx = self.ctx;
        if !ctx.config.force {
            if let Staleness::UpToDate = artifact_is_up_to_date(&ctx.stat, target, inputs)? {
                return Ok(LinkOutcome::UpToDate);
            }
        }

        if let Some(dir) = target.parent() {
            crate::util::fs::ensure_dir(dir)?;
        }
        ctx.stat.invalidate(target);

        if !ctx.config.quiet {
            if ctx.config.verbose {
                eprintln!("{}", cmd);
            } else {
                eprintln!("{} {}", tool, target.display());
            }
        }

        cmd.run()
            .with_context(|| format!("failed to create {}", target.display()))?;
        Ok(LinkOutcome::Linked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_library_options() {
        let options = Options::from_values(
            [
                "-L/opt/lib", "-L", "/usr/local/lib", "-lfoo", "libbar.a", "-F/Library/Frameworks",
                "-framework", "Cocoa", "-lm",
            ],
            None,
        );
        let libs = Libraries::from_options(&options);
        assert_eq!(libs.libraries.values, strings(&["-lfoo", "libbar.a", "-lm"]));
        assert_eq!(
            libs.search_dirs,
            vec![PathBuf::from("/opt/lib"), PathBuf::from("/usr/local/lib")]
        );
        assert_eq!(
            libs.frameworks,
            strings(&["-F/Library/Frameworks", "-framework", "Cocoa"])
        );
    }

    struct Known(HashMap<&'static str, PathBuf>);

    impl LibraryResolver for Known {
        fn find_library(&self, _dirs: &[PathBuf], name: &str) -> Option<PathBuf> {
            self.0.get(name).cloned()
        }
    }

    #[test]
    fn test_resolve_libraries() {
        let resolver = Known(HashMap::from([("foo", PathBuf::from("/opt/lib/libfoo.so"))]));
        let mut libs = Libraries::from_options(&Options::from_values(["-lfoo", "-lmissing", "x.a"], None));
        libs.resolve(&resolver, &[]);
        assert_eq!(
            libs.libraries.values,
            strings(&["/opt/lib/libfoo.so", "-lmissing", "x.a"])
        );
    }

    #[test]
    fn test_platform_resolver() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("libz.a"), "").unwrap();
        let platform = Platform::elf();
        let resolver: &dyn LibraryResolver = &platform;
        assert_eq!(
            resolver.find_library(&[tmp.path().to_path_buf()], "z"),
            Some(tmp.path().join("libz.a"))
        );
        assert_eq!(resolver.find_library(&[tmp.path().to_path_buf()], "y"), None);
    }

    #[cfg(unix)]
    mod fake_linker {
        use super::*;
        use crate::builder::toolchain::{GccToolchain, MsvcToolchain};
        use crate::util::config::BuildConfig;
        use crate::util::fs::set_modified;
        use std::os::unix::fs::PermissionsExt;
        use std::sync::Arc;
        use std::time::{Duration, SystemTime};
        use tempfile::TempDir;

        fn at(secs: u64) -> SystemTime {
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000 + secs)
        }

        fn touch(path: &Path, secs: u64) {
            std::fs::write(path, "").unwrap();
            set_modified(path, at(secs)).unwrap();
        }

        /// A "compiler" that creates its `-o` argument and logs its arguments.
        fn fake_cc(dir: &Path) -> PathBuf {
            let path = dir.join("fake-cc");
            let log = dir.join("cc.log");
            let script = format!(
                "#!/bin/sh\necho \"$@\" >> '{}'\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = -o ]; then shift; : > \"$1\"; fi\n  shift\ndone\n",
                log.display()
            );
            std::fs::write(&path, script).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn invocations(dir: &Path) -> Vec<String> {
            std::fs::read_to_string(dir.join("cc.log"))
                .map(|s| s.lines().map(str::to_string).collect())
                .unwrap_or_default()
        }

        fn context(dir: &Path, force: bool) -> BuildContext {
            let cc = fake_cc(dir);
            let config = BuildConfig {
                quiet: true,
                force,
                ..BuildConfig::default()
            };
            BuildContext::new(
                Arc::new(GccToolchain::new(cc.display().to_string())),
                Platform::elf(),
                config,
            )
        }

        #[test]
        fn test_link_when_stale_only() {
            let tmp = TempDir::new().unwrap();
            let ctx = context(tmp.path(), false);
            let a = tmp.path().join("a.o");
            let b = tmp.path().join("b.o");
            touch(&a, 0);
            touch(&b, 0);
            let objects = vec![a.clone(), b];
            let libraries = Libraries::from_options(&Options::from_values(["-lm"], None));
            let options = Options::from_values(["-g"], Some(at(0)));
            let inputs = LinkInputs {
                objects: &objects,
                others: &[],
                libraries: &libraries,
                options: &options,
            };
            let exe = tmp.path().join("bin").join("prog");

            let linker = Linker::new(&ctx);
            assert_eq!(linker.link(Some(&exe), &inputs).unwrap(), LinkOutcome::Linked);
            assert!(exe.exists());
            let log = invocations(tmp.path());
            assert_eq!(log.len(), 1);
            assert!(log[0].starts_with("-g "));
            assert!(log[0].contains("-lm -o"));

            assert_eq!(linker.link(Some(&exe), &inputs).unwrap(), LinkOutcome::UpToDate);
            assert_eq!(invocations(tmp.path()).len(), 1);

            // A newer object relinks; the stale cached target time was dropped.
            set_modified(&a, SystemTime::now() + Duration::from_secs(60)).unwrap();
            let ctx = context(tmp.path(), false);
            let linker = Linker::new(&ctx);
            assert_eq!(linker.link(Some(&exe), &inputs).unwrap(), LinkOutcome::Linked);
            assert_eq!(invocations(tmp.path()).len(), 2);
        }

        #[test]
        fn test_newer_library_file_relinks() {
            let tmp = TempDir::new().unwrap();
            let obj = tmp.path().join("a.o");
            let lib = tmp.path().join("libdep.a");
            let exe = tmp.path().join("prog");
            touch(&obj, 0);
            touch(&lib, 20);
            touch(&exe, 10);

            let objects = vec![obj];
            let libraries = Libraries::from_options(&Options::from_values([lib.display().to_string()], None));
            let options = Options::new();
            let inputs = LinkInputs {
                objects: &objects,
                others: &[],
                libraries: &libraries,
                options: &options,
            };

            let ctx = context(tmp.path(), false);
            assert_eq!(Linker::new(&ctx).link(Some(&exe), &inputs).unwrap(), LinkOutcome::Linked);

            let ctx = context(tmp.path(), false);
            assert_eq!(Linker::new(&ctx).link(Some(&exe), &inputs).unwrap(), LinkOutcome::UpToDate);
        }

        #[test]
        fn test_cl_names_executable_with_fe() {
            let tmp = TempDir::new().unwrap();
            let cc = fake_cc(tmp.path());
            let config = BuildConfig {
                quiet: true,
                ..BuildConfig::default()
            };
            let ctx = BuildContext::new(
                Arc::new(MsvcToolchain::new(cc.display().to_string(), "Note: including file:")),
                Platform::windows(),
                config,
            );
            let obj = tmp.path().join("a.obj");
            touch(&obj, 0);
            let objects = vec![obj];
            let libraries = Libraries::default();
            let options = Options::new();
            let inputs = LinkInputs {
                objects: &objects,
                others: &[],
                libraries: &libraries,
                options: &options,
            };
            let exe = tmp.path().join("prog.exe");

            Linker::new(&ctx).link(Some(&exe), &inputs).unwrap();
            let log = invocations(tmp.path());
            assert!(log[0].ends_with(&format!("/Fe{}", exe.display())));
            assert!(!log[0].contains("-o"));
        }

        #[test]
        fn test_shared_library_and_force() {
            let tmp = TempDir::new().unwrap();
            let obj = tmp.path().join("a.o");
            let def = tmp.path().join("exports.map");
            touch(&obj, 0);
            touch(&def, 0);
            let target = tmp.path().join("libx.so");

            let objects = vec![obj];
            let others = vec![def.clone()];
            let libraries = Libraries::default();
            let options = Options::new();
            let inputs = LinkInputs {
                objects: &objects,
                others: &others,
                libraries: &libraries,
                options: &options,
            };

            let ctx = context(tmp.path(), false);
            assert_eq!(Linker::new(&ctx).shared_library(&target, &inputs).unwrap(), LinkOutcome::Linked);
            let log = invocations(tmp.path());
            assert!(log[0].starts_with("-shared -o"));
            assert!(log[0].ends_with(&def.display().to_string()));

            assert_eq!(Linker::new(&ctx).plugin(&target, &inputs).unwrap(), LinkOutcome::UpToDate);

            let forced = context(tmp.path(), true);
            assert_eq!(Linker::new(&forced).plugin(&target, &inputs).unwrap(), LinkOutcome::Linked);
            assert_eq!(invocations(tmp.path()).len(), 2);
        }

        #[test]
        fn test_current_archive_is_left_alone() {
            let tmp = TempDir::new().unwrap();
            let obj = tmp.path().join("a.o");
            let archive = tmp.path().join("liba.a");
            touch(&obj, 0);
            touch(&archive, 10);

            let ctx = context(tmp.path(), false);
            let outcome = Linker::new(&ctx).archive(&archive, &[obj]).unwrap();
            assert_eq!(outcome, LinkOutcome::UpToDate);
        }

        #[test]
        fn test_failed_link_is_an_error() {
            let tmp = TempDir::new().unwrap();
            let ctx = BuildContext::new(
                Arc::new(GccToolchain::new("false")),
                Platform::elf(),
                BuildConfig {
                    quiet: true,
                    ..BuildConfig::default()
                },
            );
            let objects: Vec<PathBuf> = Vec::new();
            let libraries = Libraries::default();
            let options = Options::new();
            let inputs = LinkInputs {
                objects: &objects,
                others: &[],
                libraries: &libraries,
                options: &options,
            };
            let err = Linker::new(&ctx)
                .link(Some(&tmp.path().join("prog")), &inputs)
                .unwrap_err();
            assert!(format!("{:#}", err).contains("failed to create"));
        }
    }
}
