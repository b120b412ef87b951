//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// archscan: static-analysis scanning of source archives
#[derive(Parser, Debug)]
#[command(name = "archscan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults apply when it does not exist)
    #[arg(short, long, global = true, default_value = "archscan.json")]
    pub config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan one or more archives and wait for the results
    Scan {
        /// Display name for the scans
        #[arg(short, long)]
        name: String,

        /// Rule set to scan with (see `archscan rulesets`)
        #[arg(short, long, default_value = "default")]
        ruleset: String,

        /// Archives to scan (.zip, .tar, .tar.gz, .tar.bz2)
        #[arg(required = true)]
        archives: Vec<PathBuf>,
    },

    /// List stored scans, newest first
    List,

    /// Show the findings of a finished scan
    Show {
        /// Scan ID
        id: String,
    },

    /// Print the stored scanner report of a finished scan
    Json {
        /// Scan ID
        id: String,
    },

    /// Delete a finished scan
    Delete {
        /// Scan ID
        id: String,
    },

    /// List the available rule sets
    Rulesets,
}
