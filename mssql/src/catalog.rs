use log::{debug, info, warn};
use serde::Serialize;
use std::path::PathBuf;

use crate::extractor::MetadataExtractor;
use crate::types::{BackupDatabaseFile, BackupHeader, BackupMediaHeader};
use crate::{Result, SqlBackupError};

/// Metadata extracted from one backup file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub path: PathBuf,
    pub headers: Vec<BackupHeader>,
    pub media: Vec<BackupMediaHeader>,
    pub files: Vec<BackupDatabaseFile>,
}

/// Every backup set and media label found in a list of files.
///
/// A catalog is a snapshot: it is never updated in place, a rescan builds
/// a new one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackupCatalog {
    entries: Vec<CatalogEntry>,
}

impl BackupCatalog {
    /// Extracts metadata from each file in order.
    ///
    /// Files the extractor cannot read, or that hold no backup sets, are
    /// skipped. A backup set that breaks a structural invariant fails the
    /// whole build.
    pub fn build<E>(files: &[PathBuf], extractor: &E) -> Result<Self>
    where
        E: MetadataExtractor + ?Sized,
    {
        let mut entries = Vec::with_capacity(files.len());

        for path in files {
            let mut headers = match extractor.backup_headers(path) {
                Ok(headers) if headers.is_empty() => {
                    debug!("No backup sets in {path:?}, skipping");
                    continue;
                }
                Ok(headers) => headers,
                Err(e) => {
                    warn!("Skipping {path:?}: {e}");
                    continue;
                }
            };

            for header in &mut headers {
                header.path = path.clone();
                header
                    .validate()
                    .map_err(|reason| SqlBackupError::MalformedRecord {
                        path: path.clone(),
                        position: header.position,
                        reason,
                    })?;
            }

            let media = extractor.media_headers(path).unwrap_or_else(|e| {
                warn!("Cannot read media label of {path:?}: {e}");
                Vec::new()
            });
            let files = extractor.database_files(path).unwrap_or_else(|e| {
                warn!("Cannot read file list of {path:?}: {e}");
                Vec::new()
            });

            debug!("{path:?}: {} backup set(s)", headers.len());
            entries.push(CatalogEntry {
                path: path.clone(),
                headers,
                media,
                files,
            });
        }

        info!(
            "Cataloged {} backup file(s) out of {} candidate(s)",
            entries.len(),
            files.len()
        );
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn backup_headers(&self) -> Vec<BackupHeader> {
        self.entries.iter().flat_map(|e| e.headers.iter().cloned()).collect()
    }

    pub fn media_headers(&self) -> Vec<BackupMediaHeader> {
        self.entries.iter().flat_map(|e| e.media.iter().cloned()).collect()
    }

    pub fn database_files(&self) -> Vec<BackupDatabaseFile> {
        self.entries.iter().flat_map(|e| e.files.iter().cloned()).collect()
    }
}
