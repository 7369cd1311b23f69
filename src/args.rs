use std::path::PathBuf;

use clap::Parser;

use viewfinder::session::SortOrder;

/// Command line configuration.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// File to focus first; siblings are discovered around it
    pub focus: PathBuf,

    /// Directory to launch the session in (defaults to the focus file's
    /// parent)
    #[arg(long)]
    pub directory: Option<PathBuf>,

    /// Ordering applied to the navigation ring
    #[arg(long, value_enum, default_value_t = SortOrder::AFirst)]
    pub sort_order: SortOrder,

    /// Milliseconds to wait for the background sibling scan
    #[arg(long, default_value = "500")]
    pub scan_wait_ms: u64,
}
