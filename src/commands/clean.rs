/// `kitrun clean` command implementation
use anyhow::{Context, Result};
use std::fs;

use kitrun::cli_utils::kitrun_prefix;
use kitrun::config::KitConfig;
use kitrun::script::imports::ImportCache;

use crate::cli::CleanArgs;

pub fn run(config: &KitConfig, args: &CleanArgs) -> Result<()> {
    let layout = config.layout();

    let removed = match &args.script {
        Some(id) => {
            let record = layout.cache_path(id);
            if record.is_file() {
                fs::remove_file(&record)
                    .with_context(|| format!("Failed to remove {}", record.display()))?;
                1
            } else {
                0
            }
        }
        None => {
            let mut removed = 0;
            if layout.build_dir.is_dir() {
                for entry in fs::read_dir(&layout.build_dir)
                    .with_context(|| format!("Failed to read {}", layout.build_dir.display()))?
                {
                    let path = entry?.path();
                    if path.is_file() && layout.is_artifact(&path) {
                        fs::remove_file(&path)
                            .with_context(|| format!("Failed to remove {}", path.display()))?;
                        removed += 1;
                    }
                }
            }
            removed
        }
    };

    eprintln!("{} Removed {} cache record(s)", kitrun_prefix(), removed);

    if args.imports {
        ImportCache::with_out_dir(config.out_dir())
            .clear()
            .context("Failed to clear import listings")?;
        eprintln!("{} Cleared import listings", kitrun_prefix());
    }
    Ok(())
}
