use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_PATHS: [&str; 3] = [
    "/etc/sqlwarden/sqlwarden.toml",
    "~/.config/sqlwarden/sqlwarden.toml",
    "sqlwarden.toml",
];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqlWardenConfig {
    pub extractor: ExtractorKind,
    pub backup_store: BackupStoreSettings,
    pub sql_server: SqlServerConfig,
}

/// Where backup files live and which files count as backups.
///
/// Paths are scanned one level deep each; list every rotation directory
/// that should be covered. Extensions match case-insensitively and may be
/// given with or without the leading dot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackupStoreSettings {
    pub backup_paths: Vec<PathBuf>,
    pub backup_file_extensions: Vec<String>,
}

impl BackupStoreSettings {
    pub fn new<P, E>(backup_paths: P, backup_file_extensions: E) -> Self
    where
        P: IntoIterator,
        P::Item: Into<PathBuf>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            backup_paths: backup_paths.into_iter().map(Into::into).collect(),
            backup_file_extensions: backup_file_extensions.into_iter().map(Into::into).collect(),
        }
    }

    /// Extensions lowercased with the leading dot stripped, duplicates and
    /// blanks removed.
    pub fn normalized_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = Vec::new();
        for ext in &self.backup_file_extensions {
            let ext = ext.trim().trim_start_matches('.').to_lowercase();
            if !ext.is_empty() && !extensions.contains(&ext) {
                extensions.push(ext);
            }
        }
        extensions
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqlServerConfig {
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub sqlcmd_path: String,
}

/// Source of backup metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    /// JSON sidecar next to each backup file
    Manifest,
    /// `RESTORE ... ONLY` statements issued through sqlcmd
    Sqlcmd,
}

fn defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    Config::builder()
        .set_default("backup_store.backup_paths", Vec::<String>::new())?
        .set_default("backup_store.backup_file_extensions", vec!["bak", "trn"])?
        .set_default("sql_server.server", "localhost")?
        .set_default("sql_server.username", None::<String>)?
        .set_default("sql_server.password", None::<String>)?
        .set_default("sql_server.sqlcmd_path", "sqlcmd")?
        .set_default("extractor", "manifest")
}

fn environment() -> Environment {
    Environment::with_prefix("SQLWARDEN")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("backup_store.backup_paths")
        .with_list_parse_key("backup_store.backup_file_extensions")
}

/// Loads the configuration from the well-known locations, later files
/// overriding earlier ones, then `SQLWARDEN_*` environment variables.
pub fn load_config() -> Result<SqlWardenConfig, ConfigError> {
    let config_builder = CONFIG_PATHS.iter().try_fold(defaults()?, |builder, path| {
        let path = expand(path);
        if Path::new(&path).exists() {
            debug!("Loading configuration from {path}");
            Ok::<_, ConfigError>(builder.add_source(File::with_name(&path)))
        } else {
            Ok(builder)
        }
    })?;

    config_builder
        .add_source(environment())
        .build()?
        .try_deserialize()
}

/// Loads the configuration from a single, required file.
pub fn load_config_from(path: &Path) -> Result<SqlWardenConfig, ConfigError> {
    let path = expand(&path.to_string_lossy());
    debug!("Loading configuration from {path}");

    defaults()?
        .add_source(File::with_name(&path).required(true))
        .add_source(environment())
        .build()?
        .try_deserialize()
}

/// Renders the effective configuration as TOML.
pub fn render_config(config: &SqlWardenConfig) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(config)
}

fn expand(path: &str) -> String {
    shellexpand::full(path)
        .map(|expanded| expanded.into_owned())
        .unwrap_or_else(|_| path.to_string())
}
