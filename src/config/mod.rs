//! Typed configuration.
//!
//! Connection details come from environment variables, loaded once at
//! startup and failing fast if required vars are missing. Tunables for the
//! worker pool, monitor and audit writer come from an optional TOML file.

use crate::error::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

/// Runtime tunables. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub worker: WorkerSettings,
    pub monitor: MonitorSettings,
    pub audit: AuditSettings,
    pub queue: QueueSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub concurrency: usize,
    pub visibility_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub max_deliveries: u32,
    pub simulated_work_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            visibility_timeout_secs: 30,
            poll_interval_ms: 5000,
            max_deliveries: 5,
            simulated_work_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub interval_secs: u64,
    pub anomaly_threshold: f64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            anomaly_threshold: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    /// Events buffered between producers and the writer before drops start.
    pub buffer: usize,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self { buffer: 1024 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub name: String,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: "jobs".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read settings {}: {e}", path.display()))
        })?;
        let settings: Settings = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad settings {}: {e}", path.display())))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.worker.concurrency == 0 {
            return Err(Error::Config("worker.concurrency must be at least 1".into()));
        }
        if self.worker.visibility_timeout_secs == 0 {
            return Err(Error::Config(
                "worker.visibility_timeout_secs must be at least 1".into(),
            ));
        }
        if self.worker.max_deliveries == 0 {
            return Err(Error::Config("worker.max_deliveries must be at least 1".into()));
        }
        if self.monitor.interval_secs == 0 {
            return Err(Error::Config("monitor.interval_secs must be at least 1".into()));
        }
        if self.audit.buffer == 0 {
            return Err(Error::Config("audit.buffer must be at least 1".into()));
        }
        if self.queue.name.is_empty() {
            return Err(Error::Config("queue.name must not be empty".into()));
        }
        Ok(())
    }
}

impl WorkerSettings {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn simulated_work(&self) -> Duration {
        Duration::from_millis(self.simulated_work_ms)
    }
}

impl MonitorSettings {
    /// Never zero: a zero period makes `tokio::time::interval` panic.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}
