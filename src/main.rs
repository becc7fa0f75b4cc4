use std::path::PathBuf;

use anyhow::anyhow;
use clap::Parser;
use homedir::my_home;
use tracing_subscriber::EnvFilter;

mod app;
mod backup;
mod bookmarks;
mod cli;
mod config;
mod export;
mod render;
mod scrape;
mod search;
mod sources;
mod storage;
#[cfg(test)]
mod tests;

use config::Config;

fn init_tracing(verbose: u8) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(env) => EnvFilter::new(env),
        Err(_) => match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        },
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn base_path(arg: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = arg {
        return Ok(path);
    }

    if let Ok(path) = std::env::var("BMBASE_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()
        .map_err(|err| anyhow!("Could not determine home directory: {err:?}"))?
        .ok_or_else(|| anyhow!("Home directory path is empty"))?;
    Ok(home.join(".local/share/bmbase"))
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_tracing(args.verbose);

    let base_path = base_path(args.base_dir)?;
    let config = Config::load_with(&base_path)?;

    match args.command {
        cli::Command::Import {} => cli::handle_import(&config),
        cli::Command::Search { query, json, limit } => {
            cli::handle_search(&config, query, json, limit)
        }
        cli::Command::Config {} => cli::handle_config(&config),
    }
}
