//! HTTP query surface over running scoring loops.

pub mod convergence_http;

pub use convergence_http::{
    build_router, ConvergenceHttpConfig, ConvergenceHttpServer, QueryState,
};
