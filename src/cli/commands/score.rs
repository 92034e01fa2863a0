//! Implementation of the `convergence-engine score` command.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;
use serde::Serialize;

use crate::application::{score_scenario, ScoreReport};
use crate::cli::output::{detail_table, output, score, CommandOutput};
use crate::infrastructure::collaborators::ScenarioFile;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::{LogConfig, LoggerImpl};

#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// JSON scenario file (one scenario or an array)
    #[arg(short, long)]
    pub scenario: PathBuf,

    /// Evaluation time in seconds (defaults to the last event time)
    #[arg(short, long)]
    pub at: Option<f64>,

    /// Only score the scenario with this key
    #[arg(short, long)]
    pub key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScoreOutput {
    pub reports: Vec<ScoreReport>,
}

impl CommandOutput for ScoreOutput {
    fn to_human(&self) -> String {
        self.reports
            .iter()
            .map(|report| {
                let payload = &report.payload;
                let decision = &report.decision;
                let table = detail_table([
                    ("at", format!("{}s", report.at)),
                    (
                        "intensity",
                        format!(
                            "{}{}",
                            score(report.intensity),
                            if report.bursting { " (bursting)" } else { "" }
                        ),
                    ),
                    ("h1", score(decision.h1)),
                    ("semantic score", score(payload.semantic_score)),
                    (
                        "rank",
                        format!(
                            "{} ({:+})",
                            payload.matroid_rank_current, payload.matroid_rank_delta
                        ),
                    ),
                    ("basis", report.basis.join(", ")),
                    ("phase", payload.estimated_adversary_phase.to_string()),
                    ("phase path", report.phase_path.join(" > ")),
                    ("likelihood", format!("{:.3e}", report.phase_likelihood)),
                    ("above line", decision.above_line.to_string()),
                    ("recommended", decision.recommended_phase.to_string()),
                    (
                        "escalation",
                        format!(
                            "{}{}",
                            decision.level,
                            if decision.escalate { " (escalated)" } else { "" }
                        ),
                    ),
                    ("hash", payload.secondary_hash.clone()),
                ]);
                format!("Session {}:\n{table}", report.key)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ScoreArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load_optional(config_path)?;
    let _logger = LoggerImpl::init(&LogConfig::from_settings(&config.logging)?.with_level("warn"))?;

    let scenarios = ScenarioFile::load(&args.scenario).await?;
    let selected: Vec<_> = scenarios
        .iter()
        .filter(|s| args.key.as_ref().is_none_or(|key| &s.key == key))
        .collect();
    if selected.is_empty() {
        bail!(
            "no scenario{} in {}",
            args.key.as_ref().map(|k| format!(" with key {k}")).unwrap_or_default(),
            args.scenario.display()
        );
    }

    let now = Utc::now();
    let reports = selected
        .into_iter()
        .map(|scenario| {
            score_scenario(&config, scenario, args.at, now)
                .with_context(|| format!("failed to score scenario {}", scenario.key))
        })
        .collect::<Result<Vec<_>>>()?;

    output(&ScoreOutput { reports }, json_mode);
    Ok(())
}
