//! CLI integration tests for dcc.
//!
//! These drive the binary against a fake gcc-style compiler that writes
//! its outputs and logs every invocation.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get the dcc binary command, isolated from the caller's environment.
fn dcc(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("dcc").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env_remove("CC")
        .env_remove("NUMJOBS")
        .env_remove("DEPSDIR")
        .env_remove("DCC_LOG");
    cmd
}

#[test]
fn test_help() {
    let tmp = TempDir::new().unwrap();
    dcc(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dependency-driven"));
}

#[test]
fn test_requires_input_files() {
    let tmp = TempDir::new().unwrap();
    dcc(tmp.path()).arg("-c").assert().failure();
}

#[test]
fn test_unsupported_compiler() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.c"), "int a;\n").unwrap();

    dcc(tmp.path())
        .args(["--cc", "tcc", "-c", "a.c"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("tcc: unsupported compiler"));
}

#[cfg(unix)]
mod fake_compiler {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Writes `fake-gcc` into `dir`: creates `-o` and `-MF` outputs, fails
    /// for sources containing "broken", and logs its arguments to `cc.log`.
    fn fake_gcc(dir: &Path) -> PathBuf {
        let path = dir.join("fake-gcc");
        let script = format!(
            r#"#!/bin/sh
echo "$@" >> '{log}'
deps=; out=; src=
while [ $# -gt 0 ]; do
  case "$1" in
    -MF) shift; deps="$1";;
    -o) shift; out="$1";;
    -c) shift; src="$1";;
  esac
  shift
done
if [ -n "$src" ] && grep -q broken "$src"; then
  echo "$src:1: error: broken" >&2
  exit 1
fi
: > "$out"
if [ -n "$deps" ]; then echo "$out: $src" > "$deps"; fi
"#,
            log = dir.join("cc.log").display()
        );
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn invocations(dir: &Path) -> usize {
        fs::read_to_string(dir.join("cc.log"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    fn project() -> (TempDir, String) {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.c"), "int a;\n").unwrap();
        fs::write(tmp.path().join("b.c"), "int b;\n").unwrap();
        let cc = fake_gcc(tmp.path()).display().to_string();
        (tmp, cc)
    }

    #[test]
    fn test_compile_only_is_incremental() {
        let (tmp, cc) = project();

        dcc(tmp.path())
            .args(["--cc", &cc, "-c", "a.c", "b.c", "-O2"])
            .assert()
            .success()
            .stdout(predicate::str::contains("a.c"))
            .stdout(predicate::str::contains("b.c"));
        assert!(tmp.path().join("a.o").exists());
        assert!(tmp.path().join(".dcc.d").join("a.o.d").exists());
        assert_eq!(invocations(tmp.path()), 2);

        dcc(tmp.path())
            .args(["--cc", &cc, "-c", "a.c", "b.c", "-O2"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
        assert_eq!(invocations(tmp.path()), 2);

        dcc(tmp.path())
            .args(["--cc", &cc, "--force", "--quiet", "-c", "a.c", "b.c", "-O2"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
        assert_eq!(invocations(tmp.path()), 4);
    }

    #[test]
    fn test_compile_and_link() {
        let (tmp, cc) = project();

        dcc(tmp.path())
            .args(["--cc", &cc, "-o", "prog", "a.c", "b.c", "-lm"])
            .assert()
            .success()
            .stderr(predicate::str::contains("ld prog"));
        assert!(tmp.path().join("prog").exists());
        assert_eq!(invocations(tmp.path()), 3);

        dcc(tmp.path())
            .args(["--cc", &cc, "-o", "prog", "a.c", "b.c", "-lm"])
            .assert()
            .success();
        assert_eq!(invocations(tmp.path()), 3);
    }

    #[test]
    fn test_objdir() {
        let (tmp, cc) = project();

        dcc(tmp.path())
            .args(["--cc", &cc, "--quiet", "--objdir", "build", "-c", "a.c"])
            .assert()
            .success();
        assert!(tmp.path().join("build").join("a.o").exists());
        assert!(tmp.path().join("build").join(".dcc.d").join("a.o.d").exists());
    }

    #[test]
    fn test_one_failure_fails_the_build_but_not_the_batch() {
        let (tmp, cc) = project();
        fs::write(tmp.path().join("bad.c"), "broken\n").unwrap();

        dcc(tmp.path())
            .args(["--cc", &cc, "--quiet", "-j", "1", "-c", "a.c", "bad.c", "b.c"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("bad.c:1: error: broken"))
            .stderr(predicate::str::contains("not all files compiled"));

        assert!(tmp.path().join("a.o").exists());
        assert!(tmp.path().join("b.o").exists());
        assert!(!tmp.path().join("bad.o").exists());
        assert!(!tmp.path().join(".dcc.d").join("bad.o.d").exists());
    }

    #[test]
    fn test_cflags_file_change_rebuilds() {
        let (tmp, cc) = project();
        let cflags = tmp.path().join("CFLAGS");
        fs::write(&cflags, "-O2\n").unwrap();

        dcc(tmp.path())
            .args(["--cc", &cc, "--quiet", "-c", "a.c"])
            .assert()
            .success();
        assert_eq!(invocations(tmp.path()), 1);
        let log = fs::read_to_string(tmp.path().join("cc.log")).unwrap();
        assert!(log.starts_with("-O2 "));

        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
        fs::File::options()
            .write(true)
            .open(&cflags)
            .unwrap()
            .set_modified(later)
            .unwrap();

        dcc(tmp.path())
            .args(["--cc", &cc, "--quiet", "-c", "a.c"])
            .assert()
            .success();
        assert_eq!(invocations(tmp.path()), 2);
    }

    #[test]
    fn test_write_compile_commands() {
        let (tmp, cc) = project();

        dcc(tmp.path())
            .args(["--cc", &cc, "--quiet", "--write-compile-commands", "-c", "a.c", "-DX"])
            .assert()
            .success();

        let json = fs::read_to_string(tmp.path().join("compile_commands.json")).unwrap();
        let entries: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(entries[0]["file"], "a.c");
        assert_eq!(
            entries[0]["command"],
            format!("{} -DX -o a.o -c a.c", cc)
        );
    }

    #[test]
    fn test_lib_requires_output() {
        let (tmp, cc) = project();

        dcc(tmp.path())
            .args(["--cc", &cc, "--quiet", "--lib", "a.c"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--lib requires an output file"));
    }

    #[test]
    fn test_output_from_cflags_file() {
        let (tmp, cc) = project();
        fs::write(tmp.path().join("CFLAGS"), "-O2 -o app\n").unwrap();

        dcc(tmp.path())
            .args(["--cc", &cc, "--quiet", "a.c"])
            .assert()
            .success();
        assert!(tmp.path().join("app").exists());

        let log = fs::read_to_string(tmp.path().join("cc.log")).unwrap();
        let compile = log.lines().next().unwrap();
        assert_eq!(compile.matches("-o ").count(), 1);
        assert!(!compile.contains("app"));
    }

    #[test]
    fn test_ldflags_search_dir_resolves_libs() {
        let (tmp, cc) = project();
        fs::create_dir(tmp.path().join("lib")).unwrap();
        let libfoo = tmp.path().join("lib").join("libfoo.a");
        fs::write(&libfoo, "").unwrap();
        fs::write(tmp.path().join("LDFLAGS"), "-Llib\n").unwrap();
        fs::write(tmp.path().join("LIBS"), "-lfoo\n").unwrap();

        dcc(tmp.path())
            .args(["--cc", &cc, "--quiet", "-o", "prog", "a.c"])
            .assert()
            .success();
        assert_eq!(invocations(tmp.path()), 2);
        let log = fs::read_to_string(tmp.path().join("cc.log")).unwrap();
        assert!(log.lines().last().unwrap().contains("libfoo.a"));

        dcc(tmp.path())
            .args(["--cc", &cc, "--quiet", "-o", "prog", "a.c"])
            .assert()
            .success();
        assert_eq!(invocations(tmp.path()), 2);

        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
        fs::File::options()
            .write(true)
            .open(&libfoo)
            .unwrap()
            .set_modified(later)
            .unwrap();

        dcc(tmp.path())
            .args(["--cc", &cc, "--quiet", "-o", "prog", "a.c"])
            .assert()
            .success();
        assert_eq!(invocations(tmp.path()), 3);
    }
}
