//! JSON scenario files describing a session's inputs.
//!
//! ```json
//! {
//!   "key": "default",
//!   "fragments": [{"id": "f0", "vector": [1.0, 0.0], "confidence": 0.9}],
//!   "observations": [0, 1, 1],
//!   "events": [0.1, 0.25, 0.3]
//! }
//! ```
//!
//! A file may also hold an array of such objects, one per session.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::models::Fragment;

/// Inputs for one scoring session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default)]
    pub fragments: Vec<Fragment>,
    #[serde(default)]
    pub observations: Vec<usize>,
    /// Event arrival times, in seconds
    #[serde(default)]
    pub events: Vec<f64>,
}

fn default_key() -> String {
    "default".to_string()
}

/// Contents of a scenario file
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScenarioFile {
    Many(Vec<Scenario>),
    One(Scenario),
}

impl ScenarioFile {
    pub fn parse(contents: &str) -> Result<Vec<Scenario>> {
        let file: Self = serde_json::from_str(contents).context("invalid scenario JSON")?;
        Ok(file.into_scenarios())
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Vec<Scenario>> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read scenario file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("in {}", path.display()))
    }

    pub fn into_scenarios(self) -> Vec<Scenario> {
        match self {
            Self::Many(scenarios) => scenarios,
            Self::One(scenario) => vec![scenario],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_scenario() {
        let scenarios = ScenarioFile::parse(
            r#"{"fragments": [{"id": "f0", "vector": [1.0, 0.0], "confidence": 0.9}],
                "observations": [0, 1]}"#,
        )
        .unwrap();
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].key, "default");
        assert_eq!(scenarios[0].fragments[0].id, "f0");
        assert!(scenarios[0].events.is_empty());
    }

    #[test]
    fn test_parse_many_scenarios() {
        let scenarios =
            ScenarioFile::parse(r#"[{"key": "a"}, {"key": "b", "events": [0.5]}]"#).unwrap();
        assert_eq!(scenarios.len(), 2);
        assert_eq!(scenarios[1].key, "b");
        assert_eq!(scenarios[1].events, vec![0.5]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ScenarioFile::parse("not json").is_err());
    }
}
