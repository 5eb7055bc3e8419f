//! Queue command - offline file queue inspection
//!
//! Reads the queue directories directly instead of opening a handle, so it
//! never triggers claimed-entry recovery under a live loader. Useful when
//! the loader is misbehaving and the first question is "is the backlog
//! growing?".

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use kaijs_config::Config;

/// Queue command arguments
#[derive(Args, Debug)]
pub struct QueueArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/loader.toml")]
    pub config: PathBuf,

    /// Queue directory (overrides the config)
    #[arg(long)]
    pub dir: Option<String>,
}

/// Show queue statistics
pub async fn run(args: QueueArgs) -> Result<()> {
    let dir = match args.dir {
        Some(dir) => dir,
        None => {
            let config = if args.config.exists() {
                Config::from_file(&args.config).context("failed to load configuration")?
            } else {
                Config::default()
            };
            config.filequeue.dir
        }
    };

    let root = Path::new(&dir);
    let visible = count_entries(&root.join("queue"))?;
    let claimed = count_entries(&root.join("claimed"))?;
    let in_flight = count_entries(&root.join("tmp"))?;

    println!("queue directory: {}", dir);
    println!("visible entries: {}", visible);
    println!("claimed entries: {}", claimed);
    println!("partial writes:  {}", in_flight);

    Ok(())
}

fn count_entries(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read '{}'", dir.display()))?;
    let mut count = 0;
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read '{}'", dir.display()))?;
        if entry.file_name().to_string_lossy().ends_with(".json") {
            count += 1;
        }
    }
    Ok(count)
}
