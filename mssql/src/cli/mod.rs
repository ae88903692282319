pub mod commands;

use chrono::NaiveDateTime;

use crate::types::parse_date;

#[derive(clap::Subcommand, Debug)]
pub enum BackupCommands {
    /// List the backup files under the configured paths
    Files,

    /// List the backup sets in the backup files
    Headers {
        /// Only show backup sets of this database
        #[clap(long)]
        database: Option<String>,
    },

    /// List the media set labels of the backup files
    Media,

    /// List the database files captured by each backup file
    DatabaseFiles,

    /// Show the most recent full backup of a database
    LatestFull {
        /// Server the backups were taken on (defaults to the configured server)
        #[clap(long)]
        server: Option<String>,

        /// Database name
        #[clap(long)]
        database: String,
    },

    /// Show the most recent differential backup with the full it is based on
    LatestDiff {
        /// Server the backups were taken on (defaults to the configured server)
        #[clap(long)]
        server: Option<String>,

        /// Database name
        #[clap(long)]
        database: String,
    },

    /// Resolve the files and backup sets that restore a database
    RestorePlan {
        /// Server the backups were taken on (defaults to the configured server)
        #[clap(long)]
        server: Option<String>,

        /// Database name
        #[clap(long)]
        database: String,

        /// Point in time to restore to, e.g. "2020-08-03 13:00:00"
        #[clap(long, value_parser = parse_until)]
        until: Option<NaiveDateTime>,
    },
}

fn parse_until(value: &str) -> Result<NaiveDateTime, String> {
    parse_date("until", value).map_err(|e| e.to_string())
}

/// Output format of the listing commands
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
