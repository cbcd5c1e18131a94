use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::scraper::{AbledataConfig, GithubConfig, RavelryConfig, ThingiverseConfig};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub runlog: RunLogConfig,
    #[serde(default)]
    pub scrapers: ScrapersConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("magpie.db")
}

/// Scheduler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// When false, no recurring jobs are registered at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Run log configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunLogConfig {
    /// Actor recorded for unattended runs when the caller names none.
    #[serde(default)]
    pub system_actor: Option<String>,
}

/// Per-platform adapter configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScrapersConfig {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub ravelry: RavelryConfig,
    #[serde(default)]
    pub thingiverse: ThingiverseConfig,
    #[serde(default)]
    pub abledata: AbledataConfig,
}
