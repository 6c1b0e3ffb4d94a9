//! Filesystem walker: enumerates candidate `.py` files under a root,
//! honoring a fixed excluded-directory set plus a user-supplied skip list.
//!
//! Built on `ignore::WalkBuilder`, the same crate the teacher's
//! `discovery.rs` used for gitignore-aware discovery. This walker disables
//! gitignore/hidden-file handling entirely (the source system has no such
//! concept) and instead filters directories by basename.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use once_cell::sync::Lazy;

pub static EXCLUDED_DIRS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["__pycache__", ".git", ".venv", "env", "venv", "build", "dist"]
        .into_iter()
        .collect()
});

/// Walks `root`, returning every `.py` file not under an excluded directory,
/// sorted by path for deterministic downstream dispatch.
pub fn discover_python_files(root: &Path, skip_dirs: &[String]) -> Vec<PathBuf> {
    let skip: HashSet<&str> = skip_dirs.iter().map(String::as_str).collect();

    let mut builder = WalkBuilder::new(root);
    builder
        .git_ignore(false)
        .git_exclude(false)
        .git_global(false)
        .ignore(false)
        .parents(false)
        .hidden(false)
        .filter_entry(move |entry| {
            if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
                let name = entry.file_name().to_string_lossy();
                if EXCLUDED_DIRS.contains(name.as_ref()) || skip.contains(name.as_ref()) {
                    return false;
                }
            }
            true
        });

    let mut files: Vec<PathBuf> = builder
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().map(|ext| ext == "py").unwrap_or(false))
        .collect();

    files.sort();
    files
}
