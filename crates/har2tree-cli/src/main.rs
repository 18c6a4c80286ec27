use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use har2tree_core::{config, logging, CrawledTree};

/// Reconstruct a browsing-session causality graph from one or more HAR
/// captures and print the stitched hostname tree as JSON.
#[derive(Parser, Debug)]
#[command(name = "har2tree", version, about)]
struct Cli {
    /// HAR files to load, in capture order. Colocated
    /// `<stem>.last_redirect.txt` / `.cookies.json` / `.html` side-cars are
    /// picked up automatically.
    #[arg(required = true)]
    hars: Vec<PathBuf>,
}

fn main() -> Result<()> {
    if logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    let cli = Cli::parse();
    let cfg = config::load_or_init().unwrap_or_default();

    tracing::info!(count = cli.hars.len(), "resolving HAR capture(s)");
    let tree = CrawledTree::load(&cli.hars, cfg.full_text_search)?;
    tracing::info!(root = tree.root_url(), "stitched tree resolved");
    println!("{}", serde_json::to_string_pretty(&tree.to_json())?);

    Ok(())
}
