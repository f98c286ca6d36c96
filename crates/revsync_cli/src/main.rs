//! revsync CLI
//!
//! Replays change-tracking scripts against an in-process reference store.
//!
//! # Commands
//!
//! - `replay` - Run a script and print every flush report
//! - `plan` - Print the bulk request the first flush would submit

mod commands;
mod script;

use clap::{Parser, Subcommand};
use commands::replay::ReplayOptions;
use revsync_protocol::ConflictPolicy;
use revsync_store::RevisionScheme;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// revsync command-line tools.
#[derive(Parser)]
#[command(name = "revsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script and print every flush report
    Replay {
        /// Path to the JSON script
        script: PathBuf,

        /// Conflict policy (fail, first-write-wins, last-write-wins, manual)
        #[arg(short, long)]
        policy: Option<ConflictPolicy>,

        /// Force every bulk write
        #[arg(long)]
        force: bool,

        /// Largest change set one flush may submit
        #[arg(long)]
        max_batch: Option<usize>,

        /// Revision scheme of the reference store (content-hash, counter)
        #[arg(long, default_value = "content-hash")]
        revisions: RevisionScheme,

        /// Exit with an error if conflicts or rejections remain
        #[arg(long)]
        strict: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the bulk request the first flush would submit
    Plan {
        /// Path to the JSON script
        script: PathBuf,

        /// Plan a forced bulk write
        #[arg(long)]
        force: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay {
            script,
            policy,
            force,
            max_batch,
            revisions,
            strict,
            format,
        } => {
            let options = ReplayOptions {
                policy,
                force,
                max_batch,
                revision_scheme: revisions,
                strict,
            };
            commands::replay::run(&script, &options, &format)?;
        }
        Commands::Plan {
            script,
            force,
            format,
        } => {
            commands::plan::run(&script, force, &format)?;
        }
        Commands::Version => {
            println!("revsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_replay_flags() {
        let cli = Cli::try_parse_from([
            "revsync",
            "replay",
            "script.json",
            "--policy",
            "last-write-wins",
            "--revisions",
            "counter",
            "--max-batch",
            "5",
        ])
        .unwrap();
        match cli.command {
            Commands::Replay {
                policy,
                revisions,
                max_batch,
                ..
            } => {
                assert_eq!(policy, Some(ConflictPolicy::LastWriteWins));
                assert_eq!(revisions, RevisionScheme::Counter);
                assert_eq!(max_batch, Some(5));
            }
            _ => panic!("expected replay"),
        }
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(Cli::try_parse_from(["revsync", "replay", "s.json", "--policy", "coin-flip"]).is_err());
    }
}
