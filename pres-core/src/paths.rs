use crate::error::{PresError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// `<input><suffix>`, e.g. `photo.jpg` -> `photo.jpg.pres`.
pub fn archive_path(input: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = input.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Inverse of [`archive_path`]. The file name must end in `suffix` and keep
/// at least one character once it is stripped.
pub fn restored_path(archive: &Path, suffix: &str) -> Result<PathBuf> {
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PresError::NotAnArchive(archive.to_path_buf()))?;
    match name.strip_suffix(suffix) {
        Some(stem) if !stem.is_empty() && stem != "." && stem != ".." => {
            Ok(archive.with_file_name(stem))
        }
        _ => Err(PresError::NotAnArchive(archive.to_path_buf())),
    }
}

/// Directory temporaries for `path` are created in.
pub fn sibling_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}
