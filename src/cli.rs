use clap::{Parser, Subcommand};

/// HITL gateway — human-in-the-loop requests for AI agents
#[derive(Parser)]
#[command(name = "hitl", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind (defaults to HITL_PORT or 4000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check a response URL against the WebSocket whitelist
    Validate {
        /// ws:// or wss:// URL (http/https are normalized)
        url: String,
    },

    /// Connect to a WebSocket endpoint and close again
    Probe {
        url: String,
    },
}
