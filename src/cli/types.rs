//! CLI type definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::commands::{score::ScoreArgs, serve::ServeArgs, validate::ValidateArgs};

#[derive(Parser)]
#[command(name = "convergence-engine")]
#[command(about = "Cognitive convergence scoring engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to convergence.yaml + convergence.local.yaml)
    #[arg(short, long, global = true, env = "CONVERGENCE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scoring loops and serve the HTTP query surface
    Serve(ServeArgs),

    /// Score a JSON scenario once, offline
    Score(ScoreArgs),

    /// Load and validate configuration
    Validate(ValidateArgs),
}
