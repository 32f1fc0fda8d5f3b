//! Process and filesystem helpers shared by the adapters.

mod runner;

pub use runner::{format_command, ToolError, ToolOutput, ToolRunner};

use std::fs;
use std::io;
use std::path::Path;

/// Size of a file in bytes, or `None` when it does not exist.
pub fn file_len(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().filter(|m| m.is_file()).map(|m| m.len())
}

/// True when `path` is an existing regular file with content.
pub fn is_non_empty_file(path: &Path) -> bool {
    file_len(path).map(|len| len > 0).unwrap_or(false)
}

/// Create the parent directory of `path` if it has one.
pub fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn detects_empty_and_missing_files() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("empty.mp3");
        let full = dir.path().join("full.mp3");
        fs::write(&empty, b"").unwrap();
        fs::write(&full, b"ID3").unwrap();

        assert!(!is_non_empty_file(&empty));
        assert!(is_non_empty_file(&full));
        assert!(!is_non_empty_file(&dir.path().join("missing.mp3")));
        assert!(!is_non_empty_file(dir.path()));
    }

    #[test]
    fn ensure_parent_creates_nested_dirs() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a").join("b").join("out.mp4");
        ensure_parent(&target).unwrap();
        assert!(dir.path().join("a").join("b").is_dir());
    }
}
