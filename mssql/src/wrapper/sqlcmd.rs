use anyhow::{Context, Result};
use log::debug;
use std::process::{Command, Stdio};

use crate::types::Fields;

/// Column separator requested from sqlcmd
const SEPARATOR: char = '\t';

/// Options for sqlcmd invocations
#[derive(Debug, Clone)]
pub struct SqlCmdOptions {
    pub program: String,
    pub server: String,
    /// SQL login; a trusted connection is used when absent
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for SqlCmdOptions {
    fn default() -> Self {
        Self {
            program: "sqlcmd".to_string(),
            server: "localhost".to_string(),
            username: None,
            password: None,
        }
    }
}

impl From<&common::config::SqlServerConfig> for SqlCmdOptions {
    fn from(config: &common::config::SqlServerConfig) -> Self {
        Self {
            program: config.sqlcmd_path.clone(),
            server: config.server.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }
}

/// Wrapper for the sqlcmd utility
#[derive(Debug, Clone, Default)]
pub struct SqlCmd {
    options: SqlCmdOptions,
}

impl SqlCmd {
    pub fn new(options: SqlCmdOptions) -> Self {
        Self { options }
    }

    pub fn server(&self) -> &str {
        &self.options.server
    }

    /// Runs `query` and returns the rows of its first result set.
    pub fn query(&self, query: &str) -> Result<Vec<Fields>> {
        let mut cmd = Command::new(&self.options.program);

        cmd.arg("-S").arg(&self.options.server);
        match &self.options.username {
            Some(username) => {
                cmd.arg("-U").arg(username);
                // Keeps the password off the process list
                if let Some(password) = &self.options.password {
                    cmd.env("SQLCMDPASSWORD", password);
                }
            }
            None => {
                cmd.arg("-E");
            }
        }

        cmd.arg("-b")
            .arg("-W")
            .arg("-w")
            .arg("65535")
            .arg("-s")
            .arg(SEPARATOR.to_string())
            .arg("-Q")
            .arg(format!("SET NOCOUNT ON; {query}"));

        debug!("Running sqlcmd against {}: {query}", self.options.server);

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .context("Failed to execute sqlcmd")?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("sqlcmd failed: {} {}", stdout.trim(), stderr.trim());
        }

        Ok(parse_tabular(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Check if sqlcmd is available in the system
    pub fn check_availability(&self) -> Result<()> {
        let output = Command::new(&self.options.program)
            .arg("-?")
            .output()
            .context("Failed to execute sqlcmd")?;

        if !output.status.success() {
            anyhow::bail!("sqlcmd is not available");
        }

        Ok(())
    }
}

/// Escapes a value for use inside an `N'...'` T-SQL literal.
pub fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

/// Parses the separator-delimited output of `sqlcmd -W` into rows.
///
/// The first non-empty line holds the column names, an optional dashed
/// underline follows, then one line per row until a blank line or a
/// `(n rows affected)` trailer. `NULL` cells are left out of the row.
pub fn parse_tabular(output: &str) -> Vec<Fields> {
    let mut lines = output.lines().map(|line| line.trim_end_matches('\r'));

    let columns: Vec<&str> = match lines.by_ref().find(|line| !line.trim().is_empty()) {
        Some(line) => line.split(SEPARATOR).map(str::trim).collect(),
        None => return Vec::new(),
    };

    let mut rows = Vec::new();
    for line in lines {
        if line.trim().is_empty() || is_trailer(line) {
            break;
        }
        if line.chars().all(|c| c == '-' || c == SEPARATOR || c == ' ') {
            continue;
        }

        let row: Fields = columns
            .iter()
            .zip(line.split(SEPARATOR))
            .filter(|(_, value)| *value != "NULL")
            .map(|(column, value)| (column.to_string(), value.to_string()))
            .collect();
        rows.push(row);
    }
    rows
}

fn is_trailer(line: &str) -> bool {
    let line = line.trim();
    line.starts_with('(') && line.ends_with("affected)")
}
