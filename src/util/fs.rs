//! Filesystem utilities.

use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};

/// Ensure a directory exists, creating it and any parents if necessary.
///
/// Safe to race: several workers may create the same object directory.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

/// Remove a file, ignoring the case where it is already gone.
pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Set a file's modification time.
pub fn set_modified(path: &Path, time: SystemTime) -> io::Result<()> {
    fs::File::options().write(true).open(path)?.set_modified(time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_dir_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("obj/sub");

        ensure_dir(&dir).unwrap();
        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());

        ensure_dir(Path::new("")).unwrap();
    }

    #[test]
    fn test_remove_file_if_exists() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.d");
        fs::write(&file, "a.o: a.c").unwrap();

        remove_file_if_exists(&file).unwrap();
        assert!(!file.exists());
        remove_file_if_exists(&file).unwrap();
    }

    #[test]
    fn test_set_modified() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("a.c");
        fs::write(&file, "int x;").unwrap();

        let when = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        set_modified(&file, when).unwrap();
        assert_eq!(fs::metadata(&file).unwrap().modified().unwrap(), when);
    }
}
