pub mod sqlcmd;

// Re-export for convenience
pub use sqlcmd::{parse_tabular, SqlCmd, SqlCmdOptions};
