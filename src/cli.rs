//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CRM Gateway - cached access to CRM objects and OAuth tokens
#[derive(Parser, Debug)]
#[command(name = "crm-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "CRM_GATEWAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "CRM_GATEWAY_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "CRM_GATEWAY_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "CRM_GATEWAY_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "CRM_GATEWAY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the gateway server (default)
    Serve,

    /// Print the current access token, refreshing it when needed
    Token {
        /// Refresh even when a valid token is cached
        #[arg(long)]
        force: bool,
    },

    /// Fetch one page of a CRM resource through the list cache
    List {
        /// Resource type (contacts, deals, tickets)
        #[arg(required = true)]
        resource: String,

        /// Page number, from 1
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Records per page
        #[arg(long, default_value_t = 10)]
        page_size: u32,
    },
}
