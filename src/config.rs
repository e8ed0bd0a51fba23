use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the migrator
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MigratorConfig {
    /// Backend connection settings
    pub backend: BackendConfig,
    /// Status polling settings
    pub polling: PollingConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Scheme, host and port of the backend
    pub base_url: String,
    /// Path prefix in front of every task endpoint
    pub api_prefix: String,
    /// Bearer token (can be set via env var)
    pub token: Option<String>,
    /// Rate limiting settings
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Steady-state requests per second
    pub requests_per_second: u32,
    /// Burst capacity
    pub burst_capacity: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between a non-terminal status response and the next fetch
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (overridden by RUST_LOG)
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_prefix: "/api".to_string(),
            token: None,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_capacity: 20,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl MigratorConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (job-migrator.toml, .job-migrator-rc, then `extra_file`)
    /// 3. Environment variables (prefixed with JOB_MIGRATOR__)
    pub fn load(extra_file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("job-migrator.toml").exists() {
            builder = builder.add_source(File::with_name("job-migrator"));
        }

        if Path::new(".job-migrator-rc").exists() {
            builder = builder.add_source(
                File::with_name(".job-migrator-rc").format(config::FileFormat::Toml),
            );
        }

        if let Some(path) = extra_file {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("JOB_MIGRATOR")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut migrator_config: MigratorConfig = builder.build()?.try_deserialize()?;

        if migrator_config.backend.token.is_none() {
            if let Ok(token) = std::env::var("JOB_MIGRATOR_TOKEN") {
                migrator_config.backend.token = Some(token);
            }
        }

        Ok(migrator_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}
