use chrono::NaiveDateTime;
use common::config::BackupStoreSettings;
use log::info;
use serde::Serialize;
use std::path::PathBuf;

use crate::Result;
use crate::catalog::BackupCatalog;
use crate::chain::{ChainResolver, LsnGap};
use crate::extractor::MetadataExtractor;
use crate::filesystem::FileSystem;
use crate::scanner::PathScanner;
use crate::types::{BackupDatabaseFile, BackupHeader, BackupMediaHeader, BackupType};

/// One backup set to restore, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreStep {
    pub path: PathBuf,
    pub position: i32,
    pub backup_type: BackupType,
    pub header: BackupHeader,
}

/// Files and backup sets that restore a database, for restore tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestorePlan {
    pub server: String,
    pub database: String,
    pub until: Option<NaiveDateTime>,
    pub steps: Vec<RestoreStep>,
    pub gap: Option<LsnGap>,
}

/// Entry point for querying the backups under the configured paths.
///
/// Every query rescans the paths, so results always reflect the files
/// present at call time.
pub struct BackupStore<F: FileSystem, E: MetadataExtractor> {
    settings: BackupStoreSettings,
    fs: F,
    extractor: E,
}

impl<F: FileSystem, E: MetadataExtractor> BackupStore<F, E> {
    pub fn new(settings: BackupStoreSettings, fs: F, extractor: E) -> Self {
        Self {
            settings,
            fs,
            extractor,
        }
    }

    pub fn settings(&self) -> &BackupStoreSettings {
        &self.settings
    }

    /// Candidate backup files, without reading them.
    pub fn backup_files(&self) -> Vec<PathBuf> {
        PathScanner::new(&self.fs).scan(
            self.settings.backup_paths.as_slice(),
            &self.settings.normalized_extensions(),
        )
    }

    pub fn catalog(&self) -> Result<BackupCatalog> {
        BackupCatalog::build(&self.backup_files(), &self.extractor)
    }

    pub fn backup_headers(&self) -> Result<Vec<BackupHeader>> {
        Ok(self.catalog()?.backup_headers())
    }

    pub fn backup_media_headers(&self) -> Result<Vec<BackupMediaHeader>> {
        Ok(self.catalog()?.media_headers())
    }

    pub fn backup_database_files(&self) -> Result<Vec<BackupDatabaseFile>> {
        Ok(self.catalog()?.database_files())
    }

    pub fn get_latest_full(&self, server: &str, database: &str) -> Result<Option<BackupHeader>> {
        let headers = self.backup_headers()?;
        Ok(ChainResolver::new(&headers).latest_full(server, database))
    }

    pub fn get_latest_diff_with_full(
        &self,
        server: &str,
        database: &str,
    ) -> Result<Vec<BackupHeader>> {
        let headers = self.backup_headers()?;
        Ok(ChainResolver::new(&headers).latest_diff_with_full(server, database))
    }

    /// Resolves the restore chain of `database` and the file holding each
    /// step. `None` when the database has no usable full backup.
    pub fn restore_plan(
        &self,
        server: &str,
        database: &str,
        until: Option<NaiveDateTime>,
    ) -> Result<Option<RestorePlan>> {
        let headers = self.backup_headers()?;

        let chain = match ChainResolver::new(&headers).restore_chain(server, database, until) {
            Some(chain) => chain,
            None => {
                info!("No full backup of {database} found");
                return Ok(None);
            }
        };

        let steps: Vec<RestoreStep> = chain
            .backups()
            .map(|header| RestoreStep {
                path: header.path.clone(),
                position: header.position,
                backup_type: header.backup_type,
                header: header.clone(),
            })
            .collect();

        info!(
            "Restore plan for {database}: {} step(s) up to LSN {}",
            steps.len(),
            chain.last_lsn()
        );

        Ok(Some(RestorePlan {
            server: server.to_string(),
            database: database.to_string(),
            until,
            steps,
            gap: chain.gap,
        }))
    }
}
