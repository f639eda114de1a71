mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use kitrun::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging
    logging::init();

    // Parse CLI arguments
    let cli = Cli::parse();

    if let Commands::Init(args) = &cli.command {
        return commands::init::run(args);
    }

    let config = commands::load_config(cli.config.as_deref())?;

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Eval(args) => commands::eval::run(&config, &args).await,
        Commands::Compile(args) => commands::compile::run(&config, &args),
        Commands::Scripts(args) => commands::scripts::run(&config, &args),
        Commands::Inspect(args) => commands::inspect::run(&config, &args),
        Commands::Clean(args) => commands::clean::run(&config, &args),
        Commands::Console => commands::console::run(&config).await,
        Commands::Init(args) => commands::init::run(&args),
    }
}
