//! Sources of backup metadata.
//!
//! Reading the on-disk backup format is left to SQL Server itself
//! ([`SqlCmdExtractor`]) or to a JSON export of its output kept next to
//! each backup file ([`ManifestExtractor`]).

use log::warn;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{BackupDatabaseFile, BackupHeader, BackupMediaHeader, Fields};
use crate::wrapper::sqlcmd::{quote_literal, SqlCmd};
use crate::{Result, SqlBackupError};

/// Reads the metadata stored in a backup file.
///
/// Implementations return an error, or nothing, for files that are not
/// backups; callers treat both as "skip this file".
#[cfg_attr(test, mockall::automock)]
pub trait MetadataExtractor {
    /// Backup sets in media order (`RESTORE HEADERONLY`).
    fn backup_headers(&self, path: &Path) -> Result<Vec<BackupHeader>>;

    /// Media set label (`RESTORE LABELONLY`).
    fn media_headers(&self, path: &Path) -> Result<Vec<BackupMediaHeader>>;

    /// Database files captured by the first backup set (`RESTORE FILELISTONLY`).
    fn database_files(&self, path: &Path) -> Result<Vec<BackupDatabaseFile>>;
}

impl<T: MetadataExtractor + ?Sized> MetadataExtractor for Box<T> {
    fn backup_headers(&self, path: &Path) -> Result<Vec<BackupHeader>> {
        (**self).backup_headers(path)
    }

    fn media_headers(&self, path: &Path) -> Result<Vec<BackupMediaHeader>> {
        (**self).media_headers(path)
    }

    fn database_files(&self, path: &Path) -> Result<Vec<BackupDatabaseFile>> {
        (**self).database_files(path)
    }
}

/// Converts raw header rows, dropping backup sets of kinds that take no
/// part in database restore chains (file and partial backups).
fn headers_from_rows(path: &Path, rows: Vec<Fields>) -> Result<Vec<BackupHeader>> {
    let mut headers = Vec::with_capacity(rows.len());
    for row in rows {
        match BackupHeader::from_fields(row) {
            Ok(header) => headers.push(header),
            Err(SqlBackupError::UnsupportedBackupType(kind)) => {
                warn!("Ignoring backup set of unsupported type {kind} in {path:?}");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(headers)
}

/// Sidecar document written next to a backup file.
#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    headers: Vec<BTreeMap<String, Value>>,
    #[serde(default)]
    media: Vec<BTreeMap<String, Value>>,
    #[serde(default)]
    files: Vec<BTreeMap<String, Value>>,
}

/// Reads metadata from `<backup file>.json`.
///
/// Each row maps result-set column names to values, as produced by
/// exporting `RESTORE HEADERONLY`, `LABELONLY` and `FILELISTONLY`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestExtractor;

impl ManifestExtractor {
    pub fn manifest_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(".json");
        PathBuf::from(name)
    }

    fn load(&self, path: &Path) -> Result<Manifest> {
        let manifest_path = Self::manifest_path(path);
        let contents = fs::read_to_string(&manifest_path).map_err(|e| {
            SqlBackupError::Extraction {
                path: path.to_path_buf(),
                message: format!("cannot read manifest {manifest_path:?}: {e}"),
            }
        })?;
        Ok(serde_json::from_str(&contents)?)
    }
}

fn to_fields(row: BTreeMap<String, Value>) -> Fields {
    row.into_iter()
        .filter_map(|(column, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((column, s)),
            other => Some((column, other.to_string())),
        })
        .collect()
}

impl MetadataExtractor for ManifestExtractor {
    fn backup_headers(&self, path: &Path) -> Result<Vec<BackupHeader>> {
        let rows = self.load(path)?.headers.into_iter().map(to_fields).collect();
        headers_from_rows(path, rows)
    }

    fn media_headers(&self, path: &Path) -> Result<Vec<BackupMediaHeader>> {
        self.load(path)?
            .media
            .into_iter()
            .map(|row| BackupMediaHeader::from_fields(to_fields(row)))
            .collect()
    }

    fn database_files(&self, path: &Path) -> Result<Vec<BackupDatabaseFile>> {
        self.load(path)?
            .files
            .into_iter()
            .map(|row| BackupDatabaseFile::from_fields(to_fields(row)))
            .collect()
    }
}

/// Asks a SQL Server instance to read the backup file.
///
/// The path must be visible to the server under the same name.
#[derive(Debug, Clone, Default)]
pub struct SqlCmdExtractor {
    sqlcmd: SqlCmd,
}

impl SqlCmdExtractor {
    pub fn new(sqlcmd: SqlCmd) -> Self {
        Self { sqlcmd }
    }

    fn restore_only(&self, statement: &str, path: &Path) -> Result<Vec<Fields>> {
        let query = format!(
            "RESTORE {statement} FROM DISK = {}",
            quote_literal(&path.to_string_lossy())
        );
        self.sqlcmd
            .query(&query)
            .map_err(|e| SqlBackupError::Extraction {
                path: path.to_path_buf(),
                message: format!("{} on {}: {e:#}", statement, self.sqlcmd.server()),
            })
    }
}

impl MetadataExtractor for SqlCmdExtractor {
    fn backup_headers(&self, path: &Path) -> Result<Vec<BackupHeader>> {
        let rows = self.restore_only("HEADERONLY", path)?;
        headers_from_rows(path, rows)
    }

    fn media_headers(&self, path: &Path) -> Result<Vec<BackupMediaHeader>> {
        self.restore_only("LABELONLY", path)?
            .into_iter()
            .map(BackupMediaHeader::from_fields)
            .collect()
    }

    fn database_files(&self, path: &Path) -> Result<Vec<BackupDatabaseFile>> {
        self.restore_only("FILELISTONLY", path)?
            .into_iter()
            .map(BackupDatabaseFile::from_fields)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BackupType, Lsn};
    use tempfile::tempdir;

    const MANIFEST: &str = r#"{
        "headers": [
            {
                "BackupName": "Test-Log Database Backup",
                "BackupType": 2,
                "DatabaseName": "Test",
                "Position": 1,
                "FirstLSN": 37000000120000001,
                "LastLSN": "37000000133600001",
                "BackupStartDate": "2020-08-03T14:30:58",
                "BackupFinishDate": "2020-08-03T14:30:58",
                "SoftwareVersionMajor": 15,
                "DifferentialBaseLSN": null
            },
            {
                "BackupName": "Test-File Backup",
                "BackupType": 4,
                "DatabaseName": "Test",
                "Position": 2,
                "FirstLSN": 1,
                "LastLSN": 2,
                "BackupStartDate": "2020-08-03T14:40:00",
                "BackupFinishDate": "2020-08-03T14:40:00",
                "SoftwareVersionMajor": 15
            }
        ],
        "media": [
            { "MediaSetId": "22288477-48c3-4ce2-a553-ce6390d82968", "MediaDate": "2020-08-03T14:30:58" }
        ],
        "files": [
            { "LogicalName": "Test", "PhysicalName": "C:\\Data\\Test.mdf", "Type": "D" },
            { "LogicalName": "Test_log", "PhysicalName": "C:\\Data\\Test_log.ldf", "Type": "L" }
        ]
    }"#;

    #[test]
    fn manifest_extractor_reads_sidecar() {
        let dir = tempdir().unwrap();
        let backup = dir.path().join("TestLog.bak");
        fs::write(&backup, b"backup").unwrap();
        fs::write(ManifestExtractor::manifest_path(&backup), MANIFEST).unwrap();

        let headers = ManifestExtractor.backup_headers(&backup).unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].backup_type, BackupType::Log);
        assert_eq!(headers[0].last_lsn.to_string(), "37000000133600001");
        assert!(!headers[0].fields.contains_key("DifferentialBaseLSN"));

        let media = ManifestExtractor.media_headers(&backup).unwrap();
        assert_eq!(media.len(), 1);

        let files = ManifestExtractor.database_files(&backup).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].logical_name, "Test_log");
        assert_eq!(files[1].file_type, "L");
    }

    #[test]
    fn manifest_extractor_fails_without_sidecar() {
        let dir = tempdir().unwrap();
        let backup = dir.path().join("orphan.bak");
        fs::write(&backup, b"backup").unwrap();

        assert!(matches!(
            ManifestExtractor.backup_headers(&backup),
            Err(SqlBackupError::Extraction { .. })
        ));
    }

    #[test]
    fn manifest_extractor_rejects_garbage() {
        let dir = tempdir().unwrap();
        let backup = dir.path().join("garbage.bak");
        fs::write(ManifestExtractor::manifest_path(&backup), "not json").unwrap();

        assert!(matches!(
            ManifestExtractor.media_headers(&backup),
            Err(SqlBackupError::Json(_))
        ));
    }

    #[test]
    fn manifest_extractor_keeps_lsns_beyond_u64() {
        let dir = tempdir().unwrap();
        let backup = dir.path().join("TestFullWide.bak");
        let manifest = r#"{
            "headers": [{
                "BackupName": "Test-Full Database Backup",
                "BackupType": 1,
                "DatabaseName": "Test",
                "Position": 1,
                "FirstLSN": 25000000000000000000001,
                "LastLSN": 25000000000000000300001,
                "BackupStartDate": "2020-08-03T16:15:53",
                "BackupFinishDate": "2020-08-03T16:15:53",
                "SoftwareVersionMajor": 15
            }]
        }"#;
        fs::write(ManifestExtractor::manifest_path(&backup), manifest).unwrap();

        let headers = ManifestExtractor.backup_headers(&backup).unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].first_lsn, Lsn(25_000_000_000_000_000_000_001));
        assert_eq!(headers[0].last_lsn, Lsn(25_000_000_000_000_000_300_001));
        assert_eq!(headers[0].fields["FirstLSN"], "25000000000000000000001");
    }
}
