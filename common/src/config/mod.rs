mod file;

pub use file::{
    load_config, load_config_from, render_config, BackupStoreSettings, ExtractorKind,
    SqlServerConfig, SqlWardenConfig,
};
