//! Engine composition: collaborators, sinks and one scoring loop per session.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::adapters::http::QueryState;
use crate::domain::models::Config;
use crate::domain::ports::{EmbeddingProvider, ObservationSource, PayloadSink};
use crate::infrastructure::audit::{JsonlAuditSink, NullSink};
use crate::infrastructure::collaborators::{
    InMemoryCollaborator, RemoteCollaborator, RemoteCollaboratorConfig, Scenario, ScenarioFile,
};
use crate::services::{Collaborators, LoopHandle, RunningLoop, ScoringLoop};

/// Collaborators resolved from configuration, plus any scenario data loaded.
pub struct ResolvedCollaborators {
    pub collaborators: Collaborators,
    pub scenarios: Vec<Scenario>,
}

/// Resolve collaborators from configuration.
///
/// A `base_url` selects the remote HTTP collaborator; otherwise inputs come
/// from the scenario file, or start empty. The audit sink is enabled by
/// `audit.path`.
pub async fn resolve_collaborators(config: &Config) -> Result<ResolvedCollaborators> {
    let scenarios = match &config.collaborators.scenario_path {
        Some(path) => ScenarioFile::load(path).await?,
        None => Vec::new(),
    };

    let (embeddings, observations): (Arc<dyn EmbeddingProvider>, Arc<dyn ObservationSource>) =
        if let Some(remote) = RemoteCollaboratorConfig::from_settings(&config.collaborators) {
            info!(base_url = %remote.base_url, "using remote collaborators");
            let client = Arc::new(RemoteCollaborator::new(remote)?);
            (client.clone(), client)
        } else {
            info!(scenarios = scenarios.len(), "using in-memory collaborators");
            let memory = Arc::new(InMemoryCollaborator::from_scenarios(&scenarios));
            (memory.clone(), memory)
        };

    let sink: Arc<dyn PayloadSink> = match &config.audit.path {
        Some(path) => Arc::new(
            JsonlAuditSink::open(path)
                .await
                .context("failed to open payload audit trail")?,
        ),
        None => Arc::new(NullSink),
    };

    Ok(ResolvedCollaborators {
        collaborators: Collaborators {
            embeddings,
            observations,
            sink,
        },
        scenarios,
    })
}

/// Running scoring loops, one per configured session.
pub struct Engine {
    loops: Vec<RunningLoop>,
}

impl Engine {
    /// Spawn a loop for every session in `config.sessions`.
    ///
    /// Scenario events for a session are replayed onto its loop clock.
    /// Must be called within a tokio runtime.
    pub fn start(config: &Config, resolved: &ResolvedCollaborators) -> Result<Self> {
        let mut loops = Vec::with_capacity(config.sessions.len());
        for key in &config.sessions {
            let scoring_loop =
                ScoringLoop::new(key.as_str(), config, resolved.collaborators.clone())
                    .with_context(|| format!("failed to build scoring loop for {key}"))?;
            let running = scoring_loop.spawn();

            if let Some(scenario) = resolved.scenarios.iter().find(|s| &s.key == key) {
                let events = running.handle().events();
                let dropped = scenario
                    .events
                    .iter()
                    .filter(|&&time| !events.record(time))
                    .count();
                if dropped > 0 {
                    warn!(key = %key, dropped, "scenario events dropped on replay");
                }
            }
            loops.push(running);
        }

        info!(sessions = loops.len(), "convergence engine started");
        Ok(Self { loops })
    }

    pub fn handles(&self) -> Vec<LoopHandle> {
        self.loops.iter().map(|l| l.handle().clone()).collect()
    }

    pub fn handle(&self, key: &str) -> Option<&LoopHandle> {
        self.loops
            .iter()
            .map(RunningLoop::handle)
            .find(|h| h.key() == key)
    }

    pub fn query_state(&self) -> QueryState {
        QueryState::new(self.handles())
    }

    /// Stop every loop and wait for both paths of each to finish.
    pub async fn shutdown(self) {
        futures::future::join_all(self.loops.into_iter().map(RunningLoop::shutdown)).await;
        info!("convergence engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const SCENARIO: &str = r#"[
        {
            "key": "alpha",
            "fragments": [
                {"id": "f0", "vector": [1.0, 0.0, 0.0], "confidence": 0.9},
                {"id": "f1", "vector": [0.0, 1.0, 0.0], "confidence": 0.8},
                {"id": "f3", "vector": [0.0, 0.0, 1.0], "confidence": 0.95}
            ],
            "observations": [2, 2, 2],
            "events": [0.001, 0.002]
        }
    ]"#;

    fn config_in(dir: &TempDir) -> Config {
        let scenario_path = dir.path().join("scenario.json");
        std::fs::write(&scenario_path, SCENARIO).unwrap();

        let mut config = Config::default();
        config.sessions = vec!["alpha".to_string(), "beta".to_string()];
        config.collaborators.scenario_path = Some(scenario_path);
        config.audit.path = Some(dir.path().join("audit/payloads.jsonl"));
        config.scoring_loop.tick_interval_ms = 1;
        config
    }

    #[tokio::test]
    async fn test_resolve_defaults_to_empty_in_memory() {
        let resolved = resolve_collaborators(&Config::default()).await.unwrap();
        assert!(resolved.scenarios.is_empty());
        assert!(resolved
            .collaborators
            .embeddings
            .fragments("anything")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_resolve_missing_scenario_file_fails() {
        let mut config = Config::default();
        config.collaborators.scenario_path = Some("/nonexistent/scenario.json".into());
        assert!(resolve_collaborators(&config).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_engine_runs_one_loop_per_session() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let resolved = resolve_collaborators(&config).await.unwrap();
        assert_eq!(resolved.scenarios.len(), 1);

        let engine = Engine::start(&config, &resolved).unwrap();
        assert_eq!(engine.handles().len(), 2);
        assert_eq!(engine.query_state().len(), 2);
        assert!(engine.handle("gamma").is_none());

        let alpha = engine.handle("alpha").unwrap().clone();
        let mut rx = alpha.subscribe_semantic();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.generation >= 1))
            .await
            .expect("alpha never refreshed")
            .unwrap();
        assert_eq!(alpha.latest_payload().unwrap().matroid_rank_current, 3);

        // Persistence follows publication; wait for the audit line
        let audit_path = dir.path().join("audit/payloads.jsonl");
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let contents = tokio::fs::read_to_string(&audit_path).await.unwrap_or_default();
                if contents.contains("\"alpha\"") {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("payload never audited");

        engine.shutdown().await;
        assert!(!alpha.status().running);
    }
}
