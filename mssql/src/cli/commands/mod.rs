use anyhow::{Context, Result};
use common::config::{ExtractorKind, SqlWardenConfig};
use log::info;
use serde::Serialize;
use std::io::Write;

use crate::cli::{BackupCommands, OutputFormat};
use crate::extractor::{ManifestExtractor, MetadataExtractor, SqlCmdExtractor};
use crate::filesystem::{FileSystem, OsFileSystem};
use crate::store::{BackupStore, RestorePlan};
use crate::types::{BackupDatabaseFile, BackupHeader, BackupMediaHeader};
use crate::wrapper::{SqlCmd, SqlCmdOptions};

/// Builds a store over the real filesystem with the configured extractor.
pub fn create_store(
    config: &SqlWardenConfig,
) -> Result<BackupStore<OsFileSystem, Box<dyn MetadataExtractor>>> {
    let extractor: Box<dyn MetadataExtractor> = match config.extractor {
        ExtractorKind::Manifest => Box::new(ManifestExtractor),
        ExtractorKind::Sqlcmd => {
            let sqlcmd = SqlCmd::new(SqlCmdOptions::from(&config.sql_server));
            sqlcmd.check_availability()?;
            Box::new(SqlCmdExtractor::new(sqlcmd))
        }
    };

    info!(
        "Scanning {} path(s) for {:?} files",
        config.backup_store.backup_paths.len(),
        config.backup_store.normalized_extensions()
    );
    Ok(BackupStore::new(
        config.backup_store.clone(),
        OsFileSystem,
        extractor,
    ))
}

/// Runs one command against `store`, writing the result to `out`.
pub fn execute<F, E, W>(
    command: BackupCommands,
    store: &BackupStore<F, E>,
    default_server: &str,
    format: OutputFormat,
    out: &mut W,
) -> Result<()>
where
    F: FileSystem,
    E: MetadataExtractor,
    W: Write,
{
    match command {
        BackupCommands::Files => {
            let files = store.backup_files();
            match format {
                OutputFormat::Json => write_json(out, &files)?,
                OutputFormat::Text => {
                    for file in &files {
                        writeln!(out, "{}", file.display())?;
                    }
                }
            }
        }
        BackupCommands::Headers { database } => {
            let headers: Vec<BackupHeader> = store
                .backup_headers()
                .context("Failed to read backup headers")?
                .into_iter()
                .filter(|h| database.as_ref().map_or(true, |db| &h.database_name == db))
                .collect();
            write_headers(out, &headers, format)?;
        }
        BackupCommands::Media => {
            let media = store
                .backup_media_headers()
                .context("Failed to read media headers")?;
            write_media(out, &media, format)?;
        }
        BackupCommands::DatabaseFiles => {
            let files = store
                .backup_database_files()
                .context("Failed to read database file lists")?;
            write_database_files(out, &files, format)?;
        }
        BackupCommands::LatestFull { server, database } => {
            let server = server.as_deref().unwrap_or(default_server);
            let full = store
                .get_latest_full(server, &database)
                .context("Failed to resolve latest full backup")?;
            match format {
                OutputFormat::Json => write_json(out, &full)?,
                OutputFormat::Text => match full {
                    Some(header) => write_headers(out, &[header], format)?,
                    None => writeln!(out, "No full backup of {database} found")?,
                },
            }
        }
        BackupCommands::LatestDiff { server, database } => {
            let server = server.as_deref().unwrap_or(default_server);
            let chain = store
                .get_latest_diff_with_full(server, &database)
                .context("Failed to resolve differential chain")?;
            match format {
                OutputFormat::Text if chain.is_empty() => {
                    writeln!(out, "No full backup of {database} found")?
                }
                _ => write_headers(out, &chain, format)?,
            }
        }
        BackupCommands::RestorePlan {
            server,
            database,
            until,
        } => {
            let server = server.as_deref().unwrap_or(default_server);
            let plan = store
                .restore_plan(server, &database, until)
                .context("Failed to resolve restore plan")?;
            match format {
                OutputFormat::Json => write_json(out, &plan)?,
                OutputFormat::Text => match plan {
                    Some(plan) => write_plan(out, &plan)?,
                    None => writeln!(out, "No full backup of {database} found")?,
                },
            }
        }
    }

    Ok(())
}

fn write_json<W: Write, T: Serialize + ?Sized>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

fn write_headers<W: Write>(out: &mut W, headers: &[BackupHeader], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return write_json(out, headers);
    }
    for h in headers {
        writeln!(
            out,
            "{:<12} {:<20} {:>3}  {}  {}  {}..{}  {}",
            h.backup_type.to_string(),
            h.database_name,
            h.position,
            h.start_date,
            h.finish_date,
            h.first_lsn,
            h.last_lsn,
            h.backup_name
        )?;
    }
    Ok(())
}

fn write_media<W: Write>(out: &mut W, media: &[BackupMediaHeader], format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        return write_json(out, media);
    }
    for m in media {
        writeln!(out, "{}  {}", m.media_set_id, m.media_date)?;
    }
    Ok(())
}

fn write_database_files<W: Write>(
    out: &mut W,
    files: &[BackupDatabaseFile],
    format: OutputFormat,
) -> Result<()> {
    if format == OutputFormat::Json {
        return write_json(out, files);
    }
    for f in files {
        writeln!(out, "{:<2} {:<24} {}", f.file_type, f.logical_name, f.physical_name)?;
    }
    Ok(())
}

fn write_plan<W: Write>(out: &mut W, plan: &RestorePlan) -> Result<()> {
    match plan.until {
        Some(until) => writeln!(out, "Restore {} on {} to {until}:", plan.database, plan.server)?,
        None => writeln!(out, "Restore {} on {} to latest:", plan.database, plan.server)?,
    }
    for (i, step) in plan.steps.iter().enumerate() {
        writeln!(
            out,
            "{:>3}. {:<12} {} (FILE = {})  finished {}  LSN {}..{}",
            i + 1,
            step.backup_type.to_string(),
            step.path.display(),
            step.position,
            step.header.finish_date,
            step.header.first_lsn,
            step.header.last_lsn
        )?;
    }
    if let Some(gap) = &plan.gap {
        writeln!(
            out,
            "Log chain broken after LSN {}; next log backup starts at LSN {}",
            gap.after, gap.next
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::MockMetadataExtractor;
    use crate::filesystem::MockFileSystem;
    use crate::types::{BackupType, Fields, Lsn};
    use chrono::NaiveDate;
    use common::config::BackupStoreSettings;
    use std::path::PathBuf;

    fn full() -> BackupHeader {
        let at = NaiveDate::from_ymd_opt(2020, 8, 3)
            .unwrap()
            .and_hms_opt(16, 15, 53)
            .unwrap();
        BackupHeader {
            backup_type: BackupType::Full,
            database_name: "Test".to_string(),
            backup_name: "Test-Full Database Backup".to_string(),
            start_date: at,
            finish_date: at,
            first_lsn: Lsn(37000000136800001),
            last_lsn: Lsn(37000000137100001),
            differential_base_lsn: None,
            position: 1,
            software_version_major: 15,
            path: PathBuf::new(),
            fields: Fields::new(),
        }
    }

    fn store() -> BackupStore<MockFileSystem, MockMetadataExtractor> {
        let mut extractor = MockMetadataExtractor::new();
        extractor.expect_backup_headers().returning(|_| Ok(vec![full()]));
        extractor.expect_media_headers().returning(|_| Ok(Vec::new()));
        extractor.expect_database_files().returning(|_| Ok(Vec::new()));

        BackupStore::new(
            BackupStoreSettings::new(["/backups"], ["bak"]),
            MockFileSystem::new(["/backups/TestFull2.bak", "/backups/notes.txt"]),
            extractor,
        )
    }

    fn run(command: BackupCommands, format: OutputFormat) -> String {
        let mut out = Vec::new();
        execute(command, &store(), "localhost", format, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn files_lists_backup_files_only() {
        assert_eq!(run(BackupCommands::Files, OutputFormat::Text), "/backups/testfull2.bak\n");
    }

    #[test]
    fn restore_plan_text_names_files_and_positions() {
        let output = run(
            BackupCommands::RestorePlan {
                server: None,
                database: "Test".to_string(),
                until: None,
            },
            OutputFormat::Text,
        );
        assert!(output.starts_with("Restore Test on localhost to latest:"));
        assert!(output.contains("/backups/testfull2.bak (FILE = 1)"));
    }

    #[test]
    fn latest_full_json_is_null_for_unknown_database() {
        let output = run(
            BackupCommands::LatestFull {
                server: Some("db01".to_string()),
                database: "Missing".to_string(),
            },
            OutputFormat::Json,
        );
        assert_eq!(output.trim(), "null");
    }

    #[test]
    fn latest_diff_json_lists_chain() {
        let output = run(
            BackupCommands::LatestDiff {
                server: None,
                database: "Test".to_string(),
            },
            OutputFormat::Json,
        );
        let chain: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(chain.as_array().map(Vec::len), Some(1));
        assert_eq!(chain[0]["backup_type"], "Full");
    }
}
