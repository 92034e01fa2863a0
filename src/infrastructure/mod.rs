//! Infrastructure layer module
//!
//! - Configuration management
//! - Logging infrastructure
//! - Collaborator adapters (in-memory, remote HTTP)
//! - Payload audit trail
//!
//! Infrastructure implementations satisfy the port traits defined in the domain layer.

pub mod audit;
pub mod collaborators;
pub mod config;
pub mod logging;
