//! Per-call options (spec §6) plus the demo binary's file/CLI configuration,
//! following the same `clap` + `toml` loading shape as the teacher's own
//! `Config::load()`.

use std::fs::read_to_string;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};

/// The default round-trip budget for a `use_module` call that doesn't
/// specify one (spec §6).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options accepted by [`crate::create_module`].
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub namespace: String,
}

impl ServerOptions {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::new("default")
    }
}

/// Options accepted by [`crate::use_module`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub namespace: String,
    pub timeout: Duration,
}

impl ClientOptions {
    pub fn new(namespace: impl Into<String>, timeout: Duration) -> Self {
        Self {
            namespace: namespace.into(),
            timeout,
        }
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => return Err(format!("unknown log level: {value}")),
        })
    }
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

/// The demo binary's file-backed configuration: which namespace to expose,
/// which to consume, and at what timeout.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct DemoConfig {
    #[serde(default = "DemoConfig::namespace")]
    pub namespace: String,
    #[serde(default = "DemoConfig::timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub log: Log,
}

impl DemoConfig {
    fn namespace() -> String {
        "demo".to_string()
    }

    fn timeout_secs() -> u64 {
        DEFAULT_TIMEOUT.as_secs()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            namespace: Self::namespace(),
            timeout_secs: Self::timeout_secs(),
            log: Log::default(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    /// Path to a TOML configuration file. Falls back to defaults when unset.
    #[arg(long, short)]
    config: Option<String>,
}

impl DemoConfig {
    /// Load configuration from the `--config` file if one was passed,
    /// otherwise fall back to defaults.
    pub fn load() -> Result<Self> {
        match Cli::parse().config {
            Some(path) => Ok(toml::from_str(&read_to_string(path)?)?),
            None => Ok(Self::default()),
        }
    }
}
