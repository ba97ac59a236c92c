use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod common;

#[derive(Parser)]
#[command(name = "ascent-cli", version, about = "Ascent CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lifecycle status and active challenge overview
    Status,
    /// Generate the current month's challenge
    Generate {
        /// Target month (YYYY-MM), defaults to the current month
        #[arg(long)]
        month: Option<String>,
    },
    /// Challenge progress
    Progress {
        #[command(subcommand)]
        action: commands::progress::ProgressAction,
    },
    /// Run one lifecycle maintenance tick
    Tick {
        /// Bypass the hourly cadence guard
        #[arg(long)]
        force: bool,
    },
    /// Activity baseline
    Baseline {
        #[command(subcommand)]
        action: commands::baseline::BaselineAction,
    },
    /// Star ratings
    Stars {
        #[command(subcommand)]
        action: commands::stars::StarsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Status => commands::status::run(),
        Commands::Generate { month } => commands::generate::run(month),
        Commands::Progress { action } => commands::progress::run(action),
        Commands::Tick { force } => commands::tick::run(force),
        Commands::Baseline { action } => commands::baseline::run(action),
        Commands::Stars { action } => commands::stars::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
