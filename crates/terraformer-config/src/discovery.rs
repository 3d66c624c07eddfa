//! Config file loading.

use std::path::Path;

use crate::{ConfigError, Result, TerraformerConfig};

/// Load configuration, starting from defaults and layering an optional file.
pub fn load_config(path: Option<&Path>) -> Result<TerraformerConfig> {
    match path {
        Some(path) => load_config_file(path),
        None => Ok(TerraformerConfig::default()),
    }
}

/// Load config from a specific file path.
pub fn load_config_file(path: &Path) -> Result<TerraformerConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    TerraformerConfig::from_toml(&contents)
}
