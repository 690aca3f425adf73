//! Source file loader.
//!
//! Walks a checked-out repository and reads every file of the configured
//! [`Language`] into a [`Document`]. Paths are reported relative to the
//! repository root with `/` separators, and results are sorted by path so
//! repeated loads of the same tree produce the same chunk order.
//!
//! Directories that never hold project sources (`.git`, `node_modules`,
//! `target`, virtualenvs, bytecode caches) are always skipped. Files that
//! are not valid UTF-8 or are blank, and entries the walk cannot read, are
//! skipped with a warning rather than failing the whole load.

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::{DirEntry, WalkDir};

use crate::error::LoadError;
use crate::language::Language;
use crate::models::Document;

/// Directory names pruned from the walk wherever they appear.
const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "__pycache__",
    ".venv",
    "venv",
];

pub fn load_documents(root: &Path, language: Language) -> Result<Vec<Document>, LoadError> {
    if !root.is_dir() {
        return Err(LoadError::MissingRoot(root.to_path_buf()));
    }

    let include_set = build_globset(language.include_globs())?;

    let mut documents = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_excluded_dir(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            // Only the root itself failing is fatal.
            Err(source) if source.depth() == 0 => {
                return Err(LoadError::Walk {
                    path: root.to_path_buf(),
                    source,
                })
            }
            Err(e) => {
                let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                tracing::warn!(path = %path, error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if !include_set.is_match(&rel_str) {
            continue;
        }

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %rel_str, error = %e, "skipping unreadable file");
                continue;
            }
        };
        if text.trim().is_empty() {
            tracing::debug!(path = %rel_str, "skipping blank file");
            continue;
        }

        documents.push(Document {
            text,
            source_path: rel_str,
        });
    }

    documents.sort_by(|a, b| a.source_path.cmp(&b.source_path));

    tracing::info!(
        count = documents.len(),
        language = %language,
        root = %root.display(),
        "loaded documents"
    );

    Ok(documents)
}

fn is_excluded_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet, LoadError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_loads_only_language_files_sorted() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "z_last.py", b"print('z')\n");
        write(tmp.path(), "pkg/a.py", b"def a():\n    pass\n");
        write(tmp.path(), "README.md", b"# readme\n");
        write(tmp.path(), "setup.cfg", b"[metadata]\n");

        let docs = load_documents(tmp.path(), Language::Python).unwrap();
        let paths: Vec<&str> = docs.iter().map(|d| d.source_path.as_str()).collect();
        assert_eq!(paths, vec!["pkg/a.py", "z_last.py"]);
        assert_eq!(docs[0].text, "def a():\n    pass\n");
    }

    #[test]
    fn test_skips_excluded_directories() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "main.py", b"x = 1\n");
        write(tmp.path(), ".git/hooks/pre.py", b"x = 2\n");
        write(tmp.path(), ".venv/lib/site.py", b"x = 3\n");
        write(tmp.path(), "pkg/__pycache__/m.py", b"x = 4\n");

        let docs = load_documents(tmp.path(), Language::Python).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_path, "main.py");
    }

    #[test]
    fn test_skips_blank_and_binary_files() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "empty.py", b"   \n\n");
        write(tmp.path(), "binary.py", &[0xff, 0xfe, 0x00, 0x81]);
        write(tmp.path(), "ok.py", b"y = 2\n");

        let docs = load_documents(tmp.path(), Language::Python).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].source_path, "ok.py");
    }

    #[test]
    fn test_no_matching_files_is_empty_not_error() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "lib.rs", b"fn main() {}\n");
        let docs = load_documents(tmp.path(), Language::Python).unwrap();
        assert!(docs.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "main.py", b"x = 1\n");
        write(tmp.path(), "locked/hidden.py", b"x = 2\n");
        let locked = tmp.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        // Privileged users can read the directory regardless of its mode.
        let denied = fs::read_dir(&locked).is_err();

        let result = load_documents(tmp.path(), Language::Python);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let docs = result.unwrap();
        let paths: Vec<&str> = docs.iter().map(|d| d.source_path.as_str()).collect();
        if denied {
            assert_eq!(paths, vec!["main.py"]);
        } else {
            assert_eq!(paths, vec!["locked/hidden.py", "main.py"]);
        }
    }

    #[test]
    fn test_excluded_name_only_prunes_directories() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "build/target.py", b"x = 1\n");
        write(tmp.path(), "target/out.py", b"x = 2\n");
        write(tmp.path(), "src/target/gen.py", b"x = 3\n");

        let docs = load_documents(tmp.path(), Language::Python).unwrap();
        let paths: Vec<&str> = docs.iter().map(|d| d.source_path.as_str()).collect();
        assert_eq!(paths, vec!["build/target.py"]);
    }

    #[test]
    fn test_missing_root() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        let err = load_documents(&missing, Language::Python).unwrap_err();
        assert!(matches!(err, LoadError::MissingRoot(_)));
    }
}
