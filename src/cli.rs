use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "ytm2lfm",
    version,
    about = "Scrobble YouTube Music history to Last.fm",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Dotenv file to seed the environment from, if it exists.
    #[arg(long, env = "YTM2LFM_ENV_FILE", default_value = ".env", global = true)]
    pub env_file: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scrobble new tracks from YouTube Music to Last.fm
    Scrobble,
    /// Record new tracks in the database without scrobbling
    Sync,
    /// Report what would be scrobbled without touching Last.fm or the database
    DryRun,
    /// Show the stored scrobble log, newest first
    List,
    /// Delete every stored scrobble
    Clear,
}
