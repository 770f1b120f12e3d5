use std::path::PathBuf;

use clap::Parser;

/// Print a live view of the Bluesky Jetstream firehose.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "rs_jetstream", version, about)]
pub struct Options {
    /// Configuration file (TOML). Defaults to ./config.toml when present.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Jetstream subscribe endpoint (ws:// or wss://)
    #[arg(short, long)]
    pub url: Option<String>,

    /// trace, debug, info, warn or error
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Only report newly created posts, not updates
    #[arg(long)]
    pub creates_only: bool,

    /// Disable the messages-per-second ticker
    #[arg(long)]
    pub no_rate: bool,
}
