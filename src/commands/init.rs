/// `kitrun init` command implementation
use anyhow::{bail, Context, Result};

use kitrun::cli_utils::kitrun_prefix;
use kitrun::config::KitConfig;
use kitrun::config_discovery::CONFIG_FILE_NAME;

use crate::cli::InitArgs;

pub fn run(args: &InitArgs) -> Result<()> {
    let path = std::env::current_dir()
        .context("Failed to determine current directory")?
        .join(CONFIG_FILE_NAME);

    if path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    std::fs::write(&path, KitConfig::example()?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    eprintln!("{} Created {}", kitrun_prefix(), path.display());
    Ok(())
}
