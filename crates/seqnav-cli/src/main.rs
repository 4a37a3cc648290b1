mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "seqnav",
    about = "Course sequencing engine: validate activity trees and drive learners through them",
    version,
    propagate_version = true
)]
struct Cli {
    /// Engine config file (default: seqnav.yaml found upward from the current directory)
    #[arg(long, global = true, env = "SEQNAV_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log sequencing decisions
    #[arg(long, global = true, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the activity tree from a tree-shape JSON file and report problems
    Validate {
        /// Tree-shape JSON file
        tree: PathBuf,
    },

    /// Print the activity tree
    Outline {
        /// Tree-shape JSON file
        tree: PathBuf,
    },

    /// Run navigation and progress steps against a fresh or resumed session
    Run {
        /// Tree-shape JSON file
        tree: PathBuf,

        /// Steps, e.g. `start`, `continue`, `choice:intro`, `progress:intro:{"completed":true}`
        steps: Vec<String>,

        /// Read further steps from a file, one per line
        #[arg(long)]
        script: Option<PathBuf>,

        /// Resume from a saved snapshot instead of starting fresh
        #[arg(long)]
        resume: Option<PathBuf>,

        /// Save a snapshot of the session after the last step
        #[arg(long)]
        save: Option<PathBuf>,

        /// Exit non-zero when any step fails
        #[arg(long)]
        strict: bool,
    },

    /// Show the effective engine configuration and check it
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = root::resolve_config(cli.config.as_deref());

    let result = match cli.command {
        Commands::Validate { tree } => cmd::validate::run(config_path.as_deref(), &tree, cli.json),
        Commands::Outline { tree } => cmd::outline::run(config_path.as_deref(), &tree, cli.json),
        Commands::Run {
            tree,
            steps,
            script,
            resume,
            save,
            strict,
        } => cmd::run::run(
            config_path.as_deref(),
            &tree,
            cmd::run::RunOptions {
                steps,
                script,
                resume,
                save,
                strict,
            },
            cli.json,
        ),
        Commands::Config { init } => cmd::config::run(config_path.as_deref(), init, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
