//! CLI argument definitions for the sortview binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

/// Live sorted and filtered directory listings
#[derive(Parser, Debug)]
#[command(name = "sortview")]
#[command(about = "sortview: live sorted and filtered views over changing items")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "human", env = "SORTVIEW_FORMAT")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List one directory level through a live view
    List(ListArgs),
}

/// Arguments for the list command
#[derive(clap::Args, Debug, Clone)]
pub struct ListArgs {
    /// Directory to list
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Comma-separated sort keys: name, size, modified, kind; each optionally
    /// suffixed with :asc or :desc
    #[arg(short, long, default_value = "kind,name", env = "SORTVIEW_SORT")]
    pub sort: String,

    /// Hide entries smaller than this many bytes
    #[arg(long)]
    pub min_size: Option<u64>,

    /// Only show entries whose name contains this text (case-insensitive)
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Only show directories
    #[arg(long, conflicts_with = "files_only")]
    pub dirs_only: bool,

    /// Only show regular files
    #[arg(long)]
    pub files_only: bool,

    /// Print the change events the view emitted while sizes were computed
    #[arg(long)]
    pub events: bool,

    /// JSON file with view settings
    #[arg(short, long, env = "SORTVIEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the config's live sorting setting
    #[arg(long, env = "SORTVIEW_LIVE_SORTING")]
    pub live_sorting: Option<bool>,
}
