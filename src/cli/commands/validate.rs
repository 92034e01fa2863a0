//! Implementation of the `convergence-engine validate` command.

use std::path::Path;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::output::{detail_table, output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::{ConfigLoader, CONFIG_FILE};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Also print the fully merged configuration
    #[arg(long)]
    pub show: bool,
}

#[derive(Debug, Serialize)]
pub struct ValidateOutput {
    pub valid: bool,
    pub source: String,
    pub sessions: Vec<String>,
    pub phase_states: usize,
    pub alphabet_size: usize,
    pub tick_interval_ms: u64,
    pub refresh_interval_ms: u64,
    pub refresh_timeout_ms: u64,
    pub threshold: f64,
    pub bands: [f64; 4],
    pub collaborators: String,
    pub audit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Config>,
}

impl ValidateOutput {
    fn from_config(config: Config, source: String, show: bool) -> Self {
        let collaborators = match (
            &config.collaborators.base_url,
            &config.collaborators.scenario_path,
        ) {
            (Some(url), _) => format!("remote ({url})"),
            (None, Some(path)) => format!("scenario ({})", path.display()),
            (None, None) => "in-memory (empty)".to_string(),
        };
        Self {
            valid: true,
            source,
            sessions: config.sessions.clone(),
            phase_states: config.phase_model.states.len(),
            alphabet_size: config.phase_model.emission.first().map_or(0, Vec::len),
            tick_interval_ms: config.scoring_loop.tick_interval_ms,
            refresh_interval_ms: config.scoring_loop.refresh_interval_ms,
            refresh_timeout_ms: config.scoring_loop.refresh_timeout_ms,
            threshold: config.fusion.threshold,
            bands: config.fusion.bands,
            collaborators,
            audit: config.audit.path.as_ref().map(|p| p.display().to_string()),
            config: show.then_some(config),
        }
    }
}

impl CommandOutput for ValidateOutput {
    fn to_human(&self) -> String {
        let table = detail_table([
            ("source", self.source.clone()),
            ("sessions", self.sessions.join(", ")),
            (
                "phase model",
                format!("{} states, {} symbols", self.phase_states, self.alphabet_size),
            ),
            (
                "cadence",
                format!(
                    "tick {}ms, refresh {}ms (timeout {}ms)",
                    self.tick_interval_ms, self.refresh_interval_ms, self.refresh_timeout_ms
                ),
            ),
            ("threshold", format!("{}", self.threshold)),
            ("bands", format!("{:?}", self.bands)),
            ("collaborators", self.collaborators.clone()),
            ("audit", self.audit.clone().unwrap_or_else(|| "disabled".to_string())),
        ]);
        let mut text = format!("Configuration is valid.\n{table}");
        if let Some(config) = &self.config {
            text.push_str("\n\n");
            text.push_str(&serde_yaml::to_string(config).unwrap_or_default());
        }
        text
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(
    args: ValidateArgs,
    config_path: Option<&Path>,
    json_mode: bool,
) -> Result<()> {
    let config = ConfigLoader::load_optional(config_path)?;
    let source = config_path.map_or_else(
        || format!("{CONFIG_FILE} (+ local overrides, environment)"),
        |p| p.display().to_string(),
    );
    output(&ValidateOutput::from_config(config, source, args.show), json_mode);
    Ok(())
}
