//! Patchline CLI - Command-line interface
//!
//! Queries the metadata API and downloads application packages with
//! chunk verification, mirror failover and resume.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use patchline::config::ConfigFile;
use patchline::logging::{init_logging, LoggingGuard};

use commands::config::ConfigCommands;
use commands::download::DownloadArgs;
use commands::summary::SummaryArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "patchline", version, about = "Resumable, mirror-aware package downloads")]
struct Cli {
    /// Also print log output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the latest published version id
    Latest,

    /// Show the package summary of a version
    Summary(SummaryArgs),

    /// Download a package
    Download(DownloadArgs),

    /// View or change configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();
    let _logging = setup_logging(cli.verbose);

    let result = match cli.command {
        Commands::Latest => commands::latest::run(),
        Commands::Summary(args) => commands::summary::run(args),
        Commands::Download(args) => commands::download::run(args),
        Commands::Config(command) => commands::config::run(command),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Command failed");
        e.exit();
    }
}

/// Install logging from the `[logging]` section. Failures only warn.
fn setup_logging(verbose: bool) -> Option<LoggingGuard> {
    let config = ConfigFile::load().unwrap_or_default();
    match init_logging(&config.logging.directory, &config.logging.level, verbose) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        }
    }
}
