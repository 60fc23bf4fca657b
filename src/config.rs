//! Configuration parsing and validation.
//!
//! Roster Harness is configured with a single TOML file (default
//! `./config/roster.toml`). Every section except `[db]` is optional and
//! falls back to the defaults below. See `config/roster.example.toml`.
//!
//! ```toml
//! [db]
//! path = "./data/roster.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:7400"
//!
//! [schedule]
//! time = "08:00"
//! timezone = "America/Chicago"
//! ```

use anyhow::{Context, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use roster_core::{Source, SourceRegistry};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Replaces the built-in sources wholesale when non-empty.
    #[serde(default)]
    pub sources: Vec<Source>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// When set, POST routes require a matching `x-api-key` header.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_key: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7400".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    /// Local wall-clock time, `HH:MM`.
    #[serde(default = "default_time")]
    pub time: String,
    /// IANA timezone name the time is interpreted in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub enable_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            time: default_time(),
            timezone: default_timezone(),
            enable_on_start: false,
        }
    }
}

fn default_time() -> String {
    "08:00".to_string()
}
fn default_timezone() -> String {
    "America/Chicago".to_string()
}

impl ScheduleConfig {
    pub fn daily_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.time.trim(), "%H:%M")
            .with_context(|| format!("schedule.time must be HH:MM, got '{}'", self.time))
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .trim()
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("schedule.timezone '{}': {}", self.timezone, e))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Delay after page load before querying the DOM.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,
    /// Required when running Chromium as root inside containers.
    #[serde(default)]
    pub no_sandbox: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            settle_ms: default_settle_ms(),
            user_agent: default_user_agent(),
            chrome_executable: None,
            no_sandbox: false,
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_settle_ms() -> u64 {
    1000
}
fn default_user_agent() -> String {
    format!("roster-harness/{}", env!("CARGO_PKG_VERSION"))
}

/// How a full refresh commits its results.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Delete everything, then fetch and write each source in turn. The
    /// first failure aborts the rest.
    #[default]
    Sequential,
    /// Prepare every source first; delete and write only if all succeeded.
    Staged,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RefreshConfig {
    #[serde(default)]
    pub mode: RefreshMode,
}

impl Config {
    /// The validated source registry: configured sources, or the built-ins.
    pub fn registry(&self) -> Result<SourceRegistry> {
        if self.sources.is_empty() {
            Ok(SourceRegistry::builtin())
        } else {
            SourceRegistry::new(self.sources.clone())
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }
    if let Some(key) = &config.server.api_key {
        if key.trim().is_empty() {
            anyhow::bail!("server.api_key must not be empty when set");
        }
    }

    config.schedule.daily_time()?;
    config.schedule.tz()?;

    if config.fetch.timeout_secs == 0 {
        anyhow::bail!("fetch.timeout_secs must be > 0");
    }

    config
        .registry()
        .with_context(|| "Invalid [[sources]] configuration")?;

    Ok(config)
}
