use std::path::PathBuf;

use clap::Parser;

/// Interactive shell for a single-image block filesystem.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the disk image (created if missing).
    pub image: PathBuf,

    /// Number of blocks in the image.
    pub blocks: usize,
}
