use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use common::config::{load_config, load_config_from, render_config, ExtractorKind};
use mssql::cli::{commands, BackupCommands, OutputFormat};
use std::io;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "sqlwarden",
    about = "Catalogs SQL Server backup files and resolves restore chains",
    version
)]
struct Cli {
    /// Configuration file (defaults to the standard locations)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Backup directory to scan, one level deep; replaces the configured paths
    #[clap(long = "path", global = true)]
    paths: Vec<PathBuf>,

    /// Backup file extension; replaces the configured extensions
    #[clap(long = "extension", global = true)]
    extensions: Vec<String>,

    /// Where backup metadata is read from
    #[clap(long, global = true, value_enum)]
    extractor: Option<ExtractorArg>,

    /// Output format
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,

    /// More logging (-v for debug, -vv for trace)
    #[clap(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[clap(flatten)]
    Backup(BackupCommands),

    /// Print the effective configuration
    Config,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ExtractorArg {
    /// JSON sidecar next to each backup file
    Manifest,
    /// RESTORE ... ONLY through sqlcmd
    Sqlcmd,
}

impl From<ExtractorArg> for ExtractorKind {
    fn from(arg: ExtractorArg) -> Self {
        match arg {
            ExtractorArg::Manifest => ExtractorKind::Manifest,
            ExtractorArg::Sqlcmd => ExtractorKind::Sqlcmd,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .format_timestamp(None)
        .format_level(true)
        .format_module_path(false)
        .format_indent(Some(4))
        .filter_level(level)
        .parse_default_env()
        .try_init()?;

    let mut config = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => load_config().context("Failed to load configuration")?,
    };
    if !cli.paths.is_empty() {
        config.backup_store.backup_paths = cli.paths;
    }
    if !cli.extensions.is_empty() {
        config.backup_store.backup_file_extensions = cli.extensions;
    }
    if let Some(extractor) = cli.extractor {
        config.extractor = extractor.into();
    }

    match cli.command {
        Commands::Config => {
            print!("{}", render_config(&config)?);
        }
        Commands::Backup(command) => {
            log::debug!("Running {command:?}");
            let store = commands::create_store(&config)?;
            let stdout = io::stdout();
            commands::execute(
                command,
                &store,
                &config.sql_server.server,
                cli.format,
                &mut stdout.lock(),
            )?;
        }
    }

    Ok(())
}
