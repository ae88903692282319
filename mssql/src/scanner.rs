use log::debug;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::filesystem::FileSystem;

/// Enumerates candidate backup files under a set of root directories.
pub struct PathScanner<'a, F: FileSystem + ?Sized> {
    fs: &'a F,
}

impl<'a, F: FileSystem + ?Sized> PathScanner<'a, F> {
    pub fn new(fs: &'a F) -> Self {
        Self { fs }
    }

    /// Lists the files directly inside each root whose extension matches
    /// one of `extensions` (case-insensitive, leading dot optional).
    ///
    /// Roots are visited in order and each physical file is reported once,
    /// however many roots reach it.
    pub fn scan<P: AsRef<Path>>(&self, roots: &[P], extensions: &[String]) -> Vec<PathBuf> {
        let extensions: Vec<String> = extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        let mut seen = HashSet::new();
        let mut files = Vec::new();

        for root in roots {
            let root = root.as_ref();
            let mut matched = 0;
            for file in self.fs.list_files(root) {
                if !has_extension(&file, &extensions) {
                    continue;
                }
                if seen.insert(self.fs.normalize(&file)) {
                    files.push(file);
                    matched += 1;
                }
            }
            debug!("Found {matched} backup file(s) in {root:?}");
        }

        files
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| extensions.contains(&ext))
}
