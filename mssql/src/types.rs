use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::{Result, SqlBackupError};

/// Raw column values of one metadata row, keyed by column name.
pub type Fields = BTreeMap<String, String>;

/// Log sequence number.
///
/// SQL Server reports LSNs as `numeric(25,0)`, which always fits in 128 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lsn(pub u128);

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Lsn {
    type Err = SqlBackupError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SqlBackupError::InvalidField {
            field: "LSN".to_string(),
            value: s.to_string(),
        };

        let s = s.trim();
        let integral = match s.split_once('.') {
            Some((integral, fraction)) if fraction.chars().all(|c| c == '0') => integral,
            Some(_) => return Err(invalid()),
            None => s,
        };
        integral.parse::<u128>().map(Lsn).map_err(|_| invalid())
    }
}

impl From<u128> for Lsn {
    fn from(value: u128) -> Self {
        Lsn(value)
    }
}

/// Backup type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupType {
    Full,
    Differential,
    Log,
}

impl BackupType {
    /// Maps a `BackupType` column value of `RESTORE HEADERONLY`.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(BackupType::Full),
            2 => Some(BackupType::Log),
            5 => Some(BackupType::Differential),
            _ => None,
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupType::Full => write!(f, "Full"),
            BackupType::Differential => write!(f, "Differential"),
            BackupType::Log => write!(f, "Log"),
        }
    }
}

impl FromStr for BackupType {
    type Err = SqlBackupError;

    fn from_str(s: &str) -> Result<Self> {
        let value = s.trim();
        if let Ok(code) = value.parse::<u8>() {
            return BackupType::from_code(code)
                .ok_or_else(|| SqlBackupError::UnsupportedBackupType(value.to_string()));
        }

        match value.to_lowercase().as_str() {
            "full" | "database" => Ok(BackupType::Full),
            "differential" | "database differential" => Ok(BackupType::Differential),
            "log" | "transaction log" => Ok(BackupType::Log),
            _ => Err(SqlBackupError::UnsupportedBackupType(value.to_string())),
        }
    }
}

/// Structural invariant broken by a backup header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordViolation {
    #[error("position {0} is below 1")]
    PositionBelowOne(i32),

    #[error("start date {start} is after finish date {finish}")]
    StartAfterFinish {
        start: NaiveDateTime,
        finish: NaiveDateTime,
    },

    #[error("first LSN {first} is greater than last LSN {last}")]
    FirstLsnAfterLast { first: Lsn, last: Lsn },
}

/// One backup set within a media, as reported by `RESTORE HEADERONLY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupHeader {
    pub backup_type: BackupType,
    pub database_name: String,
    pub backup_name: String,
    pub start_date: NaiveDateTime,
    pub finish_date: NaiveDateTime,
    pub first_lsn: Lsn,
    pub last_lsn: Lsn,
    pub differential_base_lsn: Option<Lsn>,
    /// 1-based ordinal of the backup set within its media
    pub position: i32,
    pub software_version_major: i32,
    /// Backup file holding the set; together with `position` it identifies
    /// the set. Empty until the header is cataloged.
    pub path: PathBuf,
    pub fields: Fields,
}

impl BackupHeader {
    pub fn from_fields(fields: Fields) -> Result<Self> {
        let backup_type: BackupType = match fields.get("BackupType") {
            Some(value) => value.parse()?,
            None => required(&fields, "BackupTypeDescription")?.parse()?,
        };

        let position = required(&fields, "Position")?;
        let position = position.trim().parse::<i32>().map_err(|_| invalid("Position", position))?;

        let version = required(&fields, "SoftwareVersionMajor")?;
        let software_version_major = version
            .trim()
            .parse::<i32>()
            .map_err(|_| invalid("SoftwareVersionMajor", version))?;

        let differential_base_lsn = match optional(&fields, "DifferentialBaseLSN") {
            Some(value) => Some(parse_lsn("DifferentialBaseLSN", value)?),
            None => None,
        };

        Ok(Self {
            backup_type,
            database_name: required(&fields, "DatabaseName")?.to_string(),
            backup_name: optional(&fields, "BackupName").unwrap_or_default().to_string(),
            start_date: parse_date("BackupStartDate", required(&fields, "BackupStartDate")?)?,
            finish_date: parse_date("BackupFinishDate", required(&fields, "BackupFinishDate")?)?,
            first_lsn: parse_lsn("FirstLSN", required(&fields, "FirstLSN")?)?,
            last_lsn: parse_lsn("LastLSN", required(&fields, "LastLSN")?)?,
            differential_base_lsn,
            position,
            software_version_major,
            path: PathBuf::new(),
            fields,
        })
    }

    /// Checks the structural invariants; the error names the broken one.
    pub fn validate(&self) -> std::result::Result<(), RecordViolation> {
        if self.position < 1 {
            return Err(RecordViolation::PositionBelowOne(self.position));
        }
        if self.start_date > self.finish_date {
            return Err(RecordViolation::StartAfterFinish {
                start: self.start_date,
                finish: self.finish_date,
            });
        }
        if self.first_lsn > self.last_lsn {
            return Err(RecordViolation::FirstLsnAfterLast {
                first: self.first_lsn,
                last: self.last_lsn,
            });
        }
        Ok(())
    }

    /// LSN that ties a differential to the full backup it was taken against.
    pub fn base_lsn(&self) -> Lsn {
        self.differential_base_lsn.unwrap_or(self.first_lsn)
    }

    pub fn covers(&self, lsn: Lsn) -> bool {
        self.first_lsn <= lsn && lsn <= self.last_lsn
    }
}

/// Media set label, as reported by `RESTORE LABELONLY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupMediaHeader {
    pub media_set_id: Uuid,
    pub media_date: NaiveDateTime,
    pub fields: Fields,
}

impl BackupMediaHeader {
    pub fn from_fields(fields: Fields) -> Result<Self> {
        let id = required(&fields, "MediaSetId")?;
        let media_set_id = Uuid::parse_str(id.trim()).map_err(|_| invalid("MediaSetId", id))?;

        Ok(Self {
            media_set_id,
            media_date: parse_date("MediaDate", required(&fields, "MediaDate")?)?,
            fields,
        })
    }
}

/// A database file captured by a backup, as reported by `RESTORE FILELISTONLY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDatabaseFile {
    pub logical_name: String,
    pub physical_name: String,
    /// `D` data, `L` log, `F` full-text catalog, `S` filestream
    pub file_type: String,
    pub fields: Fields,
}

impl BackupDatabaseFile {
    pub fn from_fields(fields: Fields) -> Result<Self> {
        Ok(Self {
            logical_name: required(&fields, "LogicalName")?.to_string(),
            physical_name: required(&fields, "PhysicalName")?.to_string(),
            file_type: optional(&fields, "Type").unwrap_or("D").trim().to_string(),
            fields,
        })
    }
}

fn optional<'a>(fields: &'a Fields, name: &str) -> Option<&'a str> {
    fields
        .get(name)
        .map(String::as_str)
        .filter(|value| !value.is_empty() && *value != "NULL")
}

fn required<'a>(fields: &'a Fields, name: &str) -> Result<&'a str> {
    optional(fields, name).ok_or_else(|| SqlBackupError::MissingField(name.to_string()))
}

fn invalid(field: &str, value: &str) -> SqlBackupError {
    SqlBackupError::InvalidField {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn parse_lsn(field: &str, value: &str) -> Result<Lsn> {
    value.parse().map_err(|_| invalid(field, value))
}

pub fn parse_date(field: &str, value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .ok_or_else(|| invalid(field, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn header_fields() -> Fields {
        [
            ("BackupName", "Test-Full Database Backup"),
            ("BackupType", "1"),
            ("DatabaseName", "Test"),
            ("Position", "1"),
            ("FirstLSN", "37000000091400001"),
            ("LastLSN", "37000000091700001"),
            ("BackupStartDate", "2020-07-25 12:45:00.000"),
            ("BackupFinishDate", "2020-07-25T12:45:00"),
            ("SoftwareVersionMajor", "15"),
            ("DifferentialBaseLSN", "NULL"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn lsn_parses_numeric_text() {
        assert_eq!("37000000091400001".parse::<Lsn>().unwrap(), Lsn(37000000091400001));
        assert_eq!("42.000".parse::<Lsn>().unwrap(), Lsn(42));
        assert!("42.5".parse::<Lsn>().is_err());
        assert!("-1".parse::<Lsn>().is_err());
        // numeric(25,0) exceeds u64
        assert_eq!(
            "9999999999999999999999999".parse::<Lsn>().unwrap(),
            Lsn(9_999_999_999_999_999_999_999_999)
        );
    }

    #[test]
    fn backup_type_accepts_codes_and_descriptions() {
        assert_eq!("1".parse::<BackupType>().unwrap(), BackupType::Full);
        assert_eq!("5".parse::<BackupType>().unwrap(), BackupType::Differential);
        assert_eq!("2".parse::<BackupType>().unwrap(), BackupType::Log);
        assert_eq!("Transaction Log".parse::<BackupType>().unwrap(), BackupType::Log);
        assert_eq!(
            "Database Differential".parse::<BackupType>().unwrap(),
            BackupType::Differential
        );
        assert!(matches!(
            "4".parse::<BackupType>(),
            Err(SqlBackupError::UnsupportedBackupType(_))
        ));
    }

    #[test]
    fn header_from_fields_reads_typed_values() {
        let header = BackupHeader::from_fields(header_fields()).unwrap();
        let at = NaiveDate::from_ymd_opt(2020, 7, 25)
            .unwrap()
            .and_hms_opt(12, 45, 0)
            .unwrap();

        assert_eq!(header.backup_type, BackupType::Full);
        assert_eq!(header.database_name, "Test");
        assert_eq!(header.backup_name, "Test-Full Database Backup");
        assert_eq!(header.start_date, at);
        assert_eq!(header.finish_date, at);
        assert_eq!(header.first_lsn, Lsn(37000000091400001));
        assert_eq!(header.last_lsn, Lsn(37000000091700001));
        assert_eq!(header.differential_base_lsn, None);
        assert_eq!(header.position, 1);
        assert_eq!(header.software_version_major, 15);
        assert_eq!(header.fields.len(), 10);
        assert!(header.validate().is_ok());
    }

    #[test]
    fn header_from_fields_reports_missing_column() {
        let mut fields = header_fields();
        fields.remove("LastLSN");
        assert!(matches!(
            BackupHeader::from_fields(fields),
            Err(SqlBackupError::MissingField(name)) if name == "LastLSN"
        ));
    }

    #[test]
    fn validate_rejects_inverted_lsn_range() {
        let mut fields = header_fields();
        fields.insert("FirstLSN".to_string(), "37000000091800001".to_string());
        let header = BackupHeader::from_fields(fields).unwrap();
        assert_eq!(
            header.validate(),
            Err(RecordViolation::FirstLsnAfterLast {
                first: Lsn(37000000091800001),
                last: Lsn(37000000091700001),
            })
        );
    }

    #[test]
    fn validate_rejects_start_after_finish() {
        let mut fields = header_fields();
        fields.insert("BackupStartDate".to_string(), "2020-07-25 12:45:01".to_string());
        let header = BackupHeader::from_fields(fields).unwrap();

        assert!(matches!(
            header.validate(),
            Err(RecordViolation::StartAfterFinish { .. })
        ));
        assert!(header
            .validate()
            .unwrap_err()
            .to_string()
            .starts_with("start date 2020-07-25 12:45:01 is after"));
    }

    #[test]
    fn validate_rejects_position_zero() {
        let mut fields = header_fields();
        fields.insert("Position".to_string(), "0".to_string());
        let header = BackupHeader::from_fields(fields).unwrap();
        assert_eq!(header.validate(), Err(RecordViolation::PositionBelowOne(0)));
    }

    #[test]
    fn base_lsn_prefers_differential_base() {
        let mut fields = header_fields();
        fields.insert("BackupType".to_string(), "5".to_string());
        fields.insert("DifferentialBaseLSN".to_string(), "37000000091600001".to_string());
        let header = BackupHeader::from_fields(fields).unwrap();
        assert_eq!(header.base_lsn(), Lsn(37000000091600001));
    }

    #[test]
    fn media_header_from_fields() {
        let fields: Fields = [
            ("MediaSetId", "68727d35-8696-462f-a312-25d596dd0705"),
            ("MediaDate", "2020-07-27 09:32:05.000"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let media = BackupMediaHeader::from_fields(fields).unwrap();
        assert_eq!(
            media.media_set_id,
            Uuid::parse_str("68727d35-8696-462f-a312-25d596dd0705").unwrap()
        );
        assert_eq!(media.media_date.to_string(), "2020-07-27 09:32:05");
    }
}
