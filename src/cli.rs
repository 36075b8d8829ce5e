//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// AdSense MCP server - cached, rate-limited access to the AdSense
/// Management API over stdio
#[derive(Parser, Debug)]
#[command(name = "adsense-mcp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "ADSENSE_MCP_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "ADSENSE_MCP_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "ADSENSE_MCP_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// AdSense account to use by default (overrides config)
    #[arg(long, env = "ADSENSE_MCP_ACCOUNT")]
    pub account: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the MCP server on stdio (default)
    Serve,

    /// Cache maintenance commands
    #[command(subcommand)]
    Cache(CacheCommand),
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show cache statistics
    Stats,

    /// Delete expired entries
    Sweep,

    /// Delete cached entries
    Clear {
        /// Only delete entries for this account
        #[arg(long, conflicts_with = "all")]
        account: Option<String>,

        /// Delete everything
        #[arg(long)]
        all: bool,
    },
}
