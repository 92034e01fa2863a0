//! In-process collaborator backed by scenario data.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::scenario::Scenario;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::Fragment;
use crate::domain::ports::{EmbeddingProvider, ObservationSource};

#[derive(Debug, Clone, Default)]
struct SessionInputs {
    fragments: Vec<Fragment>,
    observations: Vec<usize>,
}

/// Serves fragments and observations from memory.
///
/// Unknown keys yield empty inputs unless the collaborator is strict.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCollaborator {
    sessions: Arc<RwLock<HashMap<String, SessionInputs>>>,
    strict: bool,
}

impl InMemoryCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with [`DomainError::SessionNotFound`] for unknown keys.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn from_scenarios(scenarios: &[Scenario]) -> Self {
        let sessions = scenarios
            .iter()
            .map(|scenario| {
                (
                    scenario.key.clone(),
                    SessionInputs {
                        fragments: scenario.fragments.clone(),
                        observations: scenario.observations.clone(),
                    },
                )
            })
            .collect();
        Self {
            sessions: Arc::new(RwLock::new(sessions)),
            strict: false,
        }
    }

    /// Replace the fragments for `key`.
    pub async fn set_fragments(&self, key: &str, fragments: Vec<Fragment>) {
        self.sessions
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .fragments = fragments;
    }

    /// Append one fragment for `key`.
    pub async fn push_fragment(&self, key: &str, fragment: Fragment) {
        self.sessions
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .fragments
            .push(fragment);
    }

    /// Append observation symbols for `key`.
    pub async fn push_observations(&self, key: &str, symbols: impl IntoIterator<Item = usize>) {
        self.sessions
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .observations
            .extend(symbols);
    }

    async fn lookup<T>(&self, key: &str, pick: impl FnOnce(&SessionInputs) -> T) -> DomainResult<T>
    where
        T: Default,
    {
        let sessions = self.sessions.read().await;
        match sessions.get(key) {
            Some(inputs) => Ok(pick(inputs)),
            None if self.strict => Err(DomainError::SessionNotFound(key.to_string())),
            None => Ok(T::default()),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for InMemoryCollaborator {
    async fn fragments(&self, key: &str) -> DomainResult<Vec<Fragment>> {
        self.lookup(key, |inputs| inputs.fragments.clone()).await
    }
}

#[async_trait]
impl ObservationSource for InMemoryCollaborator {
    async fn observations(&self, key: &str) -> DomainResult<Vec<usize>> {
        self.lookup(key, |inputs| inputs.observations.clone()).await
    }
}
