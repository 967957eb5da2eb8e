//! CLI definitions using clap.

use std::path::PathBuf;

use clap::Parser;

/// drydock - discover the declared dependencies of Python packages
#[derive(Parser)]
#[command(name = "drydock")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Requirements to resolve, e.g. `requests[security]>=2.0`
    #[arg(value_name = "REQUIREMENT")]
    pub requirements: Vec<String>,

    /// Read additional requirements from a file (one per line)
    #[arg(short = 'r', long, value_name = "FILE")]
    pub requirements_file: Option<PathBuf>,

    /// Index listing URL
    #[arg(long, env = "DRYDOCK_INDEX_URL")]
    pub index_url: Option<String>,

    /// Only use artifacts already present in the local cache
    #[arg(long)]
    pub offline: bool,

    /// Interpreter version to filter artifacts against, e.g. 3.11
    #[arg(long, value_name = "VERSION")]
    pub python: Option<String>,

    /// Artifact cache directory override
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Emit JSON instead of the human-readable listing
    #[arg(long)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}
