//! CLI utilities for binaries

use std::path::PathBuf;

/// Overrides the client configuration path
pub const CONFIG_PATH_ENV: &str = "SERVICEMODEL_CONFIG_PATH";

/// Client endpoints and cache settings, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/servicemodel.yaml";

/// Path of the client configuration file
///
/// `SERVICEMODEL_CONFIG_PATH` wins over `config/servicemodel.yaml`.
pub fn load_config_from_env() -> PathBuf {
    config_path(std::env::var(CONFIG_PATH_ENV).ok())
}

fn config_path(from_env: Option<String>) -> PathBuf {
    from_env
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
        .into()
}

/// Command line arguments without the program name
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}
