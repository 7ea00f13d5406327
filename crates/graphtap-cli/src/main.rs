mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "graphtap",
    version,
    about = "Incremental Instagram Graph API extraction engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an extraction: records and state checkpoints on stdout
    Run {
        /// Path to tap config YAML file
        config: PathBuf,
        /// Path to the state file; loaded before the run, saved after
        #[arg(long)]
        state: Option<PathBuf>,
        /// Comma-separated stream names to extract (default: all)
        #[arg(long, value_delimiter = ',')]
        streams: Option<Vec<String>>,
    },
    /// Validate config and exchange a token for every configured account
    Check {
        /// Path to tap config YAML file
        config: PathBuf,
    },
    /// List the streams the tap can extract
    Streams,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            config,
            state,
            streams,
        } => commands::run::execute(&config, state.as_deref(), streams),
        Commands::Check { config } => commands::check::execute(&config),
        Commands::Streams => {
            commands::streams::execute();
            Ok(())
        }
    }
}
