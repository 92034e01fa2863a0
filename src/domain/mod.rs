//! Domain layer for the convergence scoring engine
//!
//! This module contains the core data model, the error taxonomy and the
//! collaborator ports consumed by the scoring services.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
