//! Mech battle core - development tools

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "mech-tools")]
#[command(about = "Development tools for the mech battle core")]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate master data files
    Validate {
        /// Path to data directory
        #[arg(default_value = "data")]
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match cli.command {
        Commands::Validate { path } => {
            tracing::info!("Validating data files in: {}", path.display());
            match mech_tools::validate::validate_data_directory(&path) {
                Ok(report) if report.is_ok() => {
                    tracing::info!("Validation passed ({} files)", report.files_checked);
                    ExitCode::SUCCESS
                }
                Ok(report) => {
                    for problem in &report.problems {
                        eprintln!("{problem}");
                    }
                    tracing::error!(
                        "Validation failed: {} problems in {} files",
                        report.problems.len(),
                        report.files_checked
                    );
                    ExitCode::FAILURE
                }
                Err(e) => {
                    tracing::error!("Validation failed: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
