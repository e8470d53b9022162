//! Configuration management

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::Error;

/// Gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Listen address
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port (default: 2525)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Name advertised in the banner and greeting replies
    #[serde(default = "default_server_name")]
    pub server_name: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            server_name: default_server_name(),
        }
    }
}

/// Full configuration file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    2525
}
fn default_server_name() -> String {
    "localhost".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Create default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl GatewayConfig {
    /// Get socket address to bind to
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port).parse()?;
        Ok(addr)
    }

    /// Check the values that end up on the wire
    pub fn validate(&self) -> crate::Result<()> {
        if self.server_name.is_empty() {
            return Err(Error::InvalidConfig("server_name must not be empty".into()));
        }
        if self.server_name.chars().any(char::is_whitespace) {
            return Err(Error::InvalidConfig(format!(
                "server_name must be a single token: {:?}",
                self.server_name
            )));
        }
        Ok(())
    }
}

/// Generate example configuration
pub fn generate_example_config() -> String {
    r#"# SMTP Gateway Configuration
# Copy this file and customize for your setup

gateway:
  # Listen address (0.0.0.0 for all interfaces)
  host: "0.0.0.0"

  # Plaintext submission port
  port: 2525

  # Name advertised in the 220 banner and HELO/EHLO replies
  server_name: "localhost"
"#
    .to_string()
}
