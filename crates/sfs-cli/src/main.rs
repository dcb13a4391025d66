use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod shell;

use cli::Cli;
use shell::Shell;

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let disk = sfs_rs::disk::Disk::open(&cli.image, cli.blocks)
        .with_context(|| format!("failed to open image {}", cli.image.display()))?;

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    Shell::new(disk).run(&mut stdin.lock(), &mut stdout.lock())
}

fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();
}
