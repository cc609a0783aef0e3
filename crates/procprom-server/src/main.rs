mod config;
mod handlers;

use std::sync::Arc;

use clap::Parser;
use procprom_metrics::SystemMetrics;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    config::{Cli, load_static_metrics},
    handlers::{ExporterState, exporter_router},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::from_default_env().add_directive("procprom=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse().apply_env();
    let addr = cli.addr();

    let static_metrics = match cli.static_metrics.as_deref() {
        Some(path) => {
            let tuples = load_static_metrics(path).await?;
            info!(count = tuples.len(), path = %path.display(), "loaded static metrics");
            tuples
        }
        None => Vec::new(),
    };

    let state = Arc::new(ExporterState {
        prefix: cli.prefix,
        sys_prefix: cli.sys_prefix,
        sys_metrics: !cli.no_sys_metrics,
        static_metrics,
        system_metrics: Arc::new(SystemMetrics::new()),
    });
    if !state.sys_metrics {
        info!("process metrics disabled");
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("procprom exporter listening on {addr}");
    axum::serve(listener, exporter_router(state)).await?;

    Ok(())
}
