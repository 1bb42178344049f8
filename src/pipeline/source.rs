//! Source tree collection for `packcfg build`.

use std::fs;
use std::io;
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

use super::{FileError, FileFailure, SourceFile};

/// Files read from a source tree, plus the ones that could not be read.
#[derive(Debug, Default)]
pub struct SourceSet {
    pub files: Vec<SourceFile>,
    pub unreadable: Vec<FileFailure>,
}

/// Read every regular file under `root`, in path order.
///
/// Hidden entries (dot files and dot directories) are skipped. Paths are
/// relative to `root` with `/` separators.
pub fn collect_sources(root: &Path) -> io::Result<SourceSet> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source root {} is not a directory", root.display()),
        ));
    }

    let mut set = SourceSet::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .and_then(|p| p.strip_prefix(root).ok())
                    .map(relative_string)
                    .unwrap_or_default();
                set.unreadable.push(FileFailure {
                    path,
                    error: FileError::Unreadable(e.to_string()),
                });
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(rel_path) = entry.path().strip_prefix(root) else {
            continue;
        };
        let path = relative_string(rel_path);

        match fs::read(entry.path()) {
            Ok(bytes) => set.files.push(SourceFile { path, bytes }),
            Err(e) => set.unreadable.push(FileFailure {
                path,
                error: FileError::Unreadable(e.to_string()),
            }),
        }
    }

    tracing::debug!(
        root = %root.display(),
        files = set.files.len(),
        unreadable = set.unreadable.len(),
        "collected sources"
    );
    Ok(set)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn relative_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_sorted_relative_paths() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/components")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("src/main.js"), "1").unwrap();
        fs::write(dir.path().join("src/components/Nav.vue"), "2").unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();
        fs::write(dir.path().join(".env"), "X=1").unwrap();

        let set = collect_sources(dir.path()).unwrap();
        let paths: Vec<_> = set.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/components/Nav.vue", "src/main.js"]);
        assert!(set.unreadable.is_empty());
        assert_eq!(set.files[1].bytes, b"1");
    }

    #[test]
    fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        let err = collect_sources(&dir.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
