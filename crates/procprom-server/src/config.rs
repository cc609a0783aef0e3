use std::path::{Path, PathBuf};

use clap::Parser;
use procprom_common::error::Result;
use procprom_metrics::{DEFAULT_SYSTEM_PREFIX, MetricTuple};

#[derive(Debug, Clone, Parser)]
#[command(name = "procprom", about = "Process metrics exporter for Prometheus")]
pub struct Cli {
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, default_value = "9464")]
    pub port: u16,

    /// Prefix applied to every exported metric name.
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Prefix applied to the process metrics only.
    #[arg(long, default_value = DEFAULT_SYSTEM_PREFIX)]
    pub sys_prefix: String,

    #[arg(long, default_value_t = false)]
    pub no_sys_metrics: bool,

    /// JSON file with an array of `{kind, name, help, value}` tuples.
    #[arg(long)]
    pub static_metrics: Option<PathBuf>,
}

impl Cli {
    /// `PROCPROM_PREFIX` and `PROCPROM_SYS_PREFIX` take precedence over the flags.
    pub fn apply_env(mut self) -> Self {
        if let Some(prefix) = env_override("PROCPROM_PREFIX") {
            self.prefix = prefix;
        }
        if let Some(sys_prefix) = env_override("PROCPROM_SYS_PREFIX") {
            self.sys_prefix = sys_prefix;
        }
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub async fn load_static_metrics(path: &Path) -> Result<Vec<MetricTuple>> {
    let raw = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&raw)?)
}
