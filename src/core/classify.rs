//! Input file classification and output file naming.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use crate::core::platform::Platform;

const CPLUSPLUS_EXTENSIONS: &[&str] = &["cc", "cpp", "cxx", "c++", "hh", "hpp", "hxx", "h++"];
const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "c++", "m", "mm"];
const HEADER_EXTENSIONS: &[&str] = &["h", "hh", "hpp", "hxx", "h++"];

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

fn has_extension(path: &Path, set: &[&str]) -> bool {
    lowercase_extension(path).is_some_and(|ext| set.contains(&ext.as_str()))
}

/// True for C++ sources and headers.
pub fn is_cplusplus_file(path: &Path) -> bool {
    has_extension(path, CPLUSPLUS_EXTENSIONS)
}

/// True for C, C++ and Objective-C sources.
pub fn is_source_file(path: &Path) -> bool {
    has_extension(path, SOURCE_EXTENSIONS)
}

pub fn is_header_file(path: &Path) -> bool {
    has_extension(path, HEADER_EXTENSIONS)
}

/// True if the file has the platform's static or dynamic library suffix.
pub fn is_library_file(path: &Path, platform: &Platform) -> bool {
    let name = path.to_string_lossy();
    name.ends_with(platform.static_lib_suffix) || name.ends_with(platform.dynamic_lib_suffix)
}

/// True for anything the compiler is asked to compile. Headers count so
/// they can be precompiled.
pub fn will_be_compiled(path: &Path) -> bool {
    is_source_file(path) || is_header_file(path)
}

/// Drop `.` components so `./src/a.o` and `src/a.o` name the same object.
fn clean(path: PathBuf) -> PathBuf {
    let cleaned: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();
    if cleaned.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cleaned
    }
}

/// The object file produced for a source file.
///
/// Leading `..` components are stripped so objects for sources outside the
/// current directory still land under `objdir`. Headers map to a `.gch`
/// precompiled header; anything else unknown gets `.o` appended rather
/// than overwriting its input.
pub fn object_filename(source: &Path, objdir: &Path, platform: &Platform) -> PathBuf {
    let relative: PathBuf = if source.is_absolute() {
        if objdir == Path::new(".") {
            source.to_path_buf()
        } else {
            source
                .components()
                .filter(|c| matches!(c, Component::Normal(_)))
                .collect()
        }
    } else {
        source
            .components()
            .skip_while(|c| matches!(c, Component::ParentDir | Component::CurDir))
            .collect()
    };

    let relative = if relative.as_os_str().is_empty() {
        PathBuf::from(source.file_name().unwrap_or_default())
    } else {
        relative
    };

    let object = if is_source_file(&relative) {
        relative.with_extension(platform.object_suffix.trim_start_matches('.'))
    } else {
        let suffix = if is_header_file(&relative) { ".gch" } else { ".o" };
        let mut name = OsString::from(relative.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    };

    if object.is_absolute() {
        clean(object)
    } else {
        clean(objdir.join(object))
    }
}

/// The dependency record for an object file: `<dir>/<deps_dir>/<object>.d`.
pub fn deps_filename(object: &Path, deps_dir: &Path) -> PathBuf {
    let dir = object.parent().unwrap_or(Path::new(""));
    let mut name = OsString::from(object.file_name().unwrap_or_default());
    name.push(".d");
    clean(dir.join(deps_dir).join(name))
}
