use log::debug;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Read access to the directories holding backup files.
pub trait FileSystem {
    /// Files directly inside `dir`. A directory that is missing or cannot
    /// be read has no files.
    fn list_files(&self, dir: &Path) -> Vec<PathBuf>;

    /// Canonical spelling of `path`, used to recognise the same physical
    /// file reached through different roots.
    fn normalize(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn list_files(&self, dir: &Path) -> Vec<PathBuf> {
        WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!("Skipping unreadable entry under {dir:?}: {e}");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect()
    }

    fn normalize(&self, path: &Path) -> PathBuf {
        fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }
}

/// In-memory filesystem holding a fixed set of file paths.
///
/// Paths are compared case-insensitively with `\` and `/` treated alike,
/// the way backup shares on Windows volumes behave. Listed paths come back
/// in normalized (lowercase, `/`-separated) form.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: BTreeSet<String>,
}

impl MockFileSystem {
    pub fn new<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        Self {
            files: files.into_iter().map(|f| normalize_str(f.as_ref())).collect(),
        }
    }
}

impl FileSystem for MockFileSystem {
    fn list_files(&self, dir: &Path) -> Vec<PathBuf> {
        let dir = normalize_str(&dir.to_string_lossy());
        self.files
            .iter()
            .filter(|file| parent_of(file) == Some(dir.as_str()))
            .map(PathBuf::from)
            .collect()
    }

    fn normalize(&self, path: &Path) -> PathBuf {
        PathBuf::from(normalize_str(&path.to_string_lossy()))
    }
}

fn normalize_str(path: &str) -> String {
    let path = path.replace('\\', "/").to_lowercase();
    let absolute = path.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            part => parts.push(part),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

fn parent_of(path: &str) -> Option<&str> {
    match path.rsplit_once('/') {
        Some(("", _)) => Some("/"),
        Some((parent, _)) => Some(parent),
        None => None,
    }
}
