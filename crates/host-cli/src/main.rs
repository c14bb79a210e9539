mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "host-cli")]
#[command(about = "Validate and inspect host.toml configuration files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a host.toml and run the validation rules, without starting a host.
    Validate {
        /// Path to the configuration file.
        #[arg(short, long, default_value = "host.toml")]
        config: PathBuf,
    },

    /// Print the parsed, defaulted configuration as JSON.
    Inspect {
        /// Path to the configuration file.
        #[arg(short, long, default_value = "host.toml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => commands::validate::execute(&config),
        Commands::Inspect { config } => commands::inspect::execute(&config),
    }
}
