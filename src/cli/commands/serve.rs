//! Implementation of the `convergence-engine serve` command.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::http::{ConvergenceHttpConfig, ConvergenceHttpServer};
use crate::application::{resolve_collaborators, Engine};
use crate::cli::output::{output, CommandOutput};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::{LogConfig, LoggerImpl};
use crate::services::LoopStatus;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Override the configured bind address
    #[arg(short, long)]
    pub bind: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ServeOutput {
    pub bind: String,
    pub sessions: Vec<(String, LoopStatus)>,
}

impl CommandOutput for ServeOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("Stopped serving on {}", self.bind)];
        for (key, status) in &self.sessions {
            lines.push(format!(
                "  - {key}: {} ticks, {} refreshes, {} failed, {} timed out, {} events dropped",
                status.ticks,
                status.refreshes,
                status.refresh_failures,
                status.refresh_timeouts,
                status.dropped_events
            ));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ServeArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let mut config = ConfigLoader::load_optional(config_path)?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
        ConfigLoader::validate(&config)?;
    }
    let _logger = LoggerImpl::init(&LogConfig::from_settings(&config.logging)?)?;

    let bind: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;

    let resolved = resolve_collaborators(&config).await?;
    let engine = Engine::start(&config, &resolved)?;
    let server = ConvergenceHttpServer::new(engine.query_state(), ConvergenceHttpConfig { bind });

    let served = server.serve_with_shutdown(shutdown_signal()).await;

    let sessions = engine
        .handles()
        .iter()
        .map(|h| (h.key().to_string(), h.status()))
        .collect();
    engine.shutdown().await;
    served?;

    output(
        &ServeOutput {
            bind: bind.to_string(),
            sessions,
        },
        json_mode,
    );
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => warn!(error = %err, "failed to listen for shutdown signal"),
    }
}
