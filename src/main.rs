//! Convergence Engine CLI entry point.

use clap::Parser;

use convergence_engine::cli::{commands, handle_error, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::execute(args, config, cli.json).await,
        Commands::Score(args) => commands::score::execute(args, config, cli.json).await,
        Commands::Validate(args) => commands::validate::execute(args, config, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
