/// `kitrun inspect` command implementation
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use kitrun::config::KitConfig;
use kitrun::script::artifact::{ArtifactError, CacheRecord};
use kitrun::script::discovery::ScriptLayout;

use super::{resolve_script, scripts::cache_status};
use crate::cli::InspectArgs;

pub fn run(config: &KitConfig, args: &InspectArgs) -> Result<()> {
    let layout = config.layout();
    let (record_path, source) = locate_record(&layout, &args.target)?;

    println!("Record: {}", record_path.display());

    let record = match CacheRecord::load(&record_path) {
        Ok(record) => record,
        Err(ArtifactError::UnsupportedVersion(version)) => {
            println!("Version: {} (unsupported, will be recompiled)", version);
            return Ok(());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", record_path.display()))
        }
    };

    println!("Version: {}", kitrun::script::FORMAT_VERSION);
    println!("Content digest: {}", record.content_digest);
    println!("Parameter digest: {}", record.parameter_digest);
    println!(
        "Parameters: {} ({})",
        record.parameter_count, record.parameter_description
    );
    println!("Artifact: {} bytes", record.artifact.len());

    if let Some(source) = source {
        let status = cache_status(&layout, &source, config.digest_algorithm()?);
        println!("Source: {} ({})", source.display(), status);
    }
    Ok(())
}

/// Find the record to show and, when known, the source it was compiled from
fn locate_record(layout: &ScriptLayout, target: &str) -> Result<(PathBuf, Option<PathBuf>)> {
    let path = Path::new(target);
    if path.is_file() && layout.is_artifact(path) {
        return Ok((path.to_path_buf(), None));
    }

    let script = resolve_script(layout, target)?;
    if layout.is_artifact(&script) {
        return Ok((script, None));
    }

    let record = layout.cache_path(&ScriptLayout::script_id(&script));
    if !record.is_file() {
        anyhow::bail!("{} has not been compiled yet", script.display());
    }
    Ok((record, Some(script)))
}
