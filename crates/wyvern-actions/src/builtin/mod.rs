pub mod command;
pub mod print;

use serde::de::DeserializeOwned;

use wyvern_core::error::{Result, WyvernError};

/// Deserialize a plugin block, mapping failures to `InvalidPluginConfig`.
pub(crate) fn parse_config<T: DeserializeOwned>(plugin: &str, config: &serde_json::Value) -> Result<T> {
    serde_json::from_value(config.clone()).map_err(|e| WyvernError::InvalidPluginConfig {
        plugin: plugin.to_string(),
        message: e.to_string(),
    })
}
