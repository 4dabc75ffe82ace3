mod app;
mod cli;
mod config;
mod db;
mod http;
mod paths;

use anyhow::{Context, Result};
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    if cli.env_file.is_file() {
        dotenvy::from_path(&cli.env_file)
            .with_context(|| format!("failed to load {}", cli.env_file.display()))?;
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    app::run(cli)
}
