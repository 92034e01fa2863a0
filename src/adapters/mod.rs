//! Adapters exposing the engine to external systems.

pub mod http;
