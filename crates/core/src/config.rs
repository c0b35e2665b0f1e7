use serde::{Deserialize, Serialize};

use crate::env::Environment;

// ─── Config ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    /// Seconds the launcher waits for in-flight requests before force-closing.
    pub shutdown_timeout: u64,

    // Identity reported in alerts, metrics and health checks
    pub project_name: String,
    pub env: Environment,

    // Optional endpoints and layers
    pub enable_pprof: bool,
    pub enable_swagger: bool,
    pub enable_metrics: bool,
    pub enable_cors: bool,

    // Admission gate
    pub rate_limit: RateLimitConfig,

    // Request body size limit (MB)
    pub body_limit_mb: usize,

    // Idle request contexts kept for reuse
    pub max_idle_contexts: usize,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,
    pub logging_to_file: bool,
    pub log_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9999,
            shutdown_timeout: 10,
            project_name: "ferrule".to_string(),
            env: Environment::default(),
            enable_pprof: false,
            enable_swagger: false,
            enable_metrics: false,
            enable_cors: false,
            rate_limit: RateLimitConfig::default(),
            body_limit_mb: 10,
            max_idle_contexts: 1024,
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            logging_to_file: false,
            log_dir: None,
        }
    }
}

impl Config {
    /// Load config from a YAML file, sanitize, and validate.
    pub fn load(path: &str) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, anyhow::Error> {
        let mut config: Config = serde_yaml_ng::from_str(contents)?;
        config.sanitize();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        anyhow::ensure!(!self.host.is_empty(), "host must not be empty");
        if self.rate_limit.enabled {
            anyhow::ensure!(
                self.rate_limit.max_requests_per_second > 0,
                "rate limit enabled but max-requests-per-second is 0"
            );
        }
        anyhow::ensure!(self.body_limit_mb > 0, "body-limit-mb must be positive");
        Ok(())
    }

    /// Sanitize and normalize configuration.
    fn sanitize(&mut self) {
        self.host = self.host.trim().to_string();
        self.project_name = self.project_name.trim().to_string();
        if self.project_name.is_empty() {
            self.project_name = Self::default().project_name;
        }
        if self.log_dir.as_deref().is_some_and(|d| d.trim().is_empty()) {
            self.log_dir = None;
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn body_limit_bytes(&self) -> usize {
        self.body_limit_mb.saturating_mul(1024 * 1024)
    }
}

// ─── Sub-configs ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests_per_second: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_requests_per_second: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
