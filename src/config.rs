//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.taskdash.toml` files.

use crate::cli::{Args, OutputFormat};
use crate::client::PollPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".taskdash.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Backend settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Polling settings.
    #[serde(default)]
    pub poll: PollConfig,

    /// Chart settings.
    #[serde(default)]
    pub chart: ChartConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Default output format.
    #[serde(default)]
    pub format: OutputFormat,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            format: OutputFormat::default(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "charts.svg".to_string()
}

/// Task backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Backend base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for a single HTTP request in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// Task status polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay between status checks in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Maximum number of status checks; 0 disables the limit.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Give up after this many seconds.
    #[serde(default)]
    pub max_duration_seconds: Option<u64>,

    /// Consecutive request failures tolerated before giving up.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
            max_duration_seconds: None,
            max_consecutive_errors: default_max_consecutive_errors(),
        }
    }
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_max_attempts() -> u32 {
    150
}

fn default_max_consecutive_errors() -> u32 {
    3
}

/// Chart settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Field to group the bar chart by.
    #[serde(default)]
    pub group_field: Option<String>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.taskdash.toml` from `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(format) = args.format {
            self.general.format = format;
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(ref server) = args.server {
            self.server.base_url = server.clone();
        }
        if let Some(timeout) = args.request_timeout {
            self.server.request_timeout_seconds = timeout;
        }

        if let Some(interval) = args.poll_interval_ms {
            self.poll.interval_ms = interval;
        }
        if let Some(attempts) = args.max_attempts {
            self.poll.max_attempts = attempts;
        }
        if let Some(timeout) = args.timeout {
            self.poll.max_duration_seconds = Some(timeout);
        }

        if let Some(ref field) = args.group_field {
            self.chart.group_field = Some(field.clone());
        }
    }

    /// Log level for this run.
    ///
    /// `general.verbose` turns on debug output unless `--quiet` is given.
    pub fn log_level(&self, args: &Args) -> tracing::Level {
        if self.general.verbose && !args.quiet {
            tracing::Level::DEBUG
        } else {
            args.log_level()
        }
    }

    /// Poll loop bounds derived from the `[poll]` section.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll.interval_ms.max(1)),
            max_attempts: (self.poll.max_attempts > 0).then_some(self.poll.max_attempts),
            max_duration: self.poll.max_duration_seconds.map(Duration::from_secs),
            max_consecutive_errors: self.poll.max_consecutive_errors,
            ..PollPolicy::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds.max(1))
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
