//! Configuration management for Emberchain

use crate::error::{ChainError, Result};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub mining: MiningConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_network_id")]
    pub network_id: u32,
    #[serde(default = "default_key_file")]
    pub key_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_bind")]
    pub bind: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MiningConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Hex-encoded address credited with block rewards. When empty, the
    /// node falls back to the address of its own key file.
    #[serde(default)]
    pub coinbase_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network_id: default_network_id(),
            key_file: default_key_file(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_api_bind(),
            port: default_api_port(),
        }
    }
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            coinbase_address: String::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            api: ApiConfig::default(),
            mining: MiningConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

/// Loads the configuration from `path`, falling back to defaults when the
/// file is absent. Values are validated before the config is returned.
pub fn load_config(path: &str) -> Result<Config> {
    let config_str = fs::read_to_string(path).unwrap_or_default();
    let config: Config = if config_str.is_empty() {
        Config::default()
    } else {
        toml::from_str(&config_str)
            .map_err(|e| ChainError::Config(format!("failed to parse {}: {}", path, e)))?
    };

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.database.path.is_empty() {
        return Err(ChainError::Config(
            "database.path must not be empty".to_string(),
        ));
    }

    if config.mining.enabled && !config.mining.coinbase_address.is_empty() {
        crate::crypto::address_from_hex(&config.mining.coinbase_address)
            .map_err(|e| ChainError::Config(format!("mining.coinbase_address: {}", e)))?;
    }

    Ok(())
}

fn default_network_id() -> u32 {
    1
}

fn default_key_file() -> String {
    "ember.key".to_string()
}

fn default_api_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "./data/emberchain.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_missing() {
        let config = load_config("does-not-exist.toml").unwrap();
        assert_eq!(config.node.network_id, 1);
        assert_eq!(config.api.port, 8080);
        assert!(!config.mining.enabled);
    }

    #[test]
    fn test_parse_partial_config() {
        let config: Config = toml::from_str(
            r#"
            [api]
            port = 9000

            [mining]
            enabled = true
            coinbase_address = "0000000000000000000000000000000000000000000000000000000000000001"
            "#,
        )
        .unwrap();

        assert_eq!(config.api.port, 9000);
        assert!(config.mining.enabled);
        assert_eq!(config.node.network_id, 1);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_bad_coinbase_address_rejected() {
        let config: Config = toml::from_str(
            r#"
            [mining]
            enabled = true
            coinbase_address = "not-hex"
            "#,
        )
        .unwrap();

        assert!(validate(&config).is_err());
    }
}
