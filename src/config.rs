use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub reload: ReloadConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Settings for the hot-reload engine. `enabled` is the development-profile
/// gate: the watcher and reload thread only start when it is set, so a
/// production deployment never hot-loads anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadConfig {
    pub enabled: bool,
    /// Compiled-output directories to watch, in registration order.
    pub roots: Vec<String>,
    /// Quiet period before a burst of filesystem events is processed.
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub properties: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3030,
        }
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            roots: vec!["target/modules".to_string()],
            debounce_ms: 150,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        config = config.add_source(config::File::with_name("config").required(false));

        // Add environment variables with prefix "HOTMOD_"
        config = config.add_source(
            config::Environment::with_prefix("HOTMOD")
                .separator("_")
                .prefix_separator("_"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
