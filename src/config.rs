//! Configuration management

use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub geo: GeoConfig,
    pub waf: WafConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeoConfig {
    /// Base URL of the geolocation lookup service, e.g. "http://ip-api.com/json"
    pub endpoint: String,
    #[serde(default = "default_geo_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_geo_timeout_secs() -> u64 {
    3
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct WafConfig {
    /// Decision endpoint of the hosted WAF. Empty disables the engine
    /// (every request is allowed past the WAF stage).
    #[serde(default)]
    pub decision_url: String,
    #[serde(default = "default_waf_timeout_secs")]
    pub timeout_secs: u64,
    /// Operator policy for a WAF outage: allow traffic through (true) or
    /// block everything (false).
    #[serde(default = "default_true")]
    pub fail_open: bool,
}

fn default_waf_timeout_secs() -> u64 {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Verify endpoint of the hosted identity provider. Empty disables
    /// session verification (every privileged call is denied).
    #[serde(default)]
    pub verify_url: String,
    #[serde(default = "default_auth_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_auth_timeout_secs() -> u64 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";

        let builder = config::Config::builder()
            .add_source(config::File::with_name(config_path))
            .add_source(config::Environment::with_prefix("TWIN_SENTRY"));

        let settings = builder.build()?;
        let config: Config = settings.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.http_port == 0 {
            anyhow::bail!("Invalid http_port: 0 is not allowed");
        }
        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.geo.enabled && self.geo.endpoint.is_empty() {
            anyhow::bail!("Geo lookup is enabled but geo.endpoint is empty");
        }
        if self.geo.timeout_secs == 0 || self.geo.timeout_secs > 30 {
            anyhow::bail!(
                "Invalid geo.timeout_secs {}. Must be between 1 and 30",
                self.geo.timeout_secs
            );
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid logging level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        Ok(())
    }
}
