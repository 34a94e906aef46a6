use std::path::PathBuf;

use clap::Parser;

/// Format an arcofs image and optionally pack host files into it
#[derive(Parser)]
pub struct Cli {
    /// Image file to format
    pub image: PathBuf,

    /// Create or resize the image to this many bytes first
    #[arg(long, short)]
    pub size: Option<u64>,

    /// Host file to copy into the root directory
    #[arg(long, short)]
    pub add: Vec<PathBuf>,
}
