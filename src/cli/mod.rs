use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod handlers;

pub use handlers::*;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory holding config.yaml and the archive.
    /// Defaults to $BMBASE_BASE_PATH or ~/.local/share/bmbase
    #[clap(long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch every bookmarked page and rebuild the archive
    Import {},

    /// Search the archive. Without a query, starts an interactive prompt
    /// (`:q` quits, `?` lists the modifier keywords).
    Search {
        query: Option<String>,

        /// Print results as json
        #[clap(long, default_value = "false")]
        json: bool,

        /// Show at most this many results
        #[clap(short, long)]
        limit: Option<usize>,
    },

    /// Print the effective configuration
    Config {},
}
