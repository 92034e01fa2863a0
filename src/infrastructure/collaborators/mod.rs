//! Collaborator adapters: where fragments and observations come from.

pub mod memory;
pub mod remote;
pub mod scenario;

pub use memory::InMemoryCollaborator;
pub use remote::{RemoteCollaborator, RemoteCollaboratorConfig};
pub use scenario::{Scenario, ScenarioFile};
