/// `kitrun scripts` command implementation
///
/// Lists discoverable scripts and, with `--verbose`, whether their cache
/// record is current.
use anyhow::Result;
use std::path::Path;

use kitrun::config::KitConfig;
use kitrun::script::digest::{digest_file, Algorithm};
use kitrun::script::discovery::ScriptLayout;
use kitrun::script::CompiledScriptFile;

use crate::cli::ScriptsArgs;

pub fn run(config: &KitConfig, args: &ScriptsArgs) -> Result<()> {
    let layout = config.layout();
    let algorithm = config.digest_algorithm()?;

    let mut scripts: Vec<(&str, _)> = layout
        .find_scripts()
        .into_iter()
        .map(|p| ("", p))
        .collect();
    if args.lazy {
        scripts.extend(layout.lazy_scripts().into_iter().map(|p| ("lazy", p)));
    }

    if scripts.is_empty() {
        println!("No scripts under {}", layout.root.display());
        return Ok(());
    }

    for (kind, path) in &scripts {
        let shown = path.strip_prefix(&layout.root).unwrap_or(path);
        let id = ScriptLayout::script_id(path);
        let mut line = format!("{:<24} {}", id, shown.display());
        if !kind.is_empty() {
            line.push_str(&format!(" [{}]", kind));
        }
        if args.verbose {
            line.push_str(&format!("  {}", cache_status(&layout, path, algorithm)));
        }
        println!("{}", line);
    }

    println!();
    println!("{} script(s)", scripts.len());
    Ok(())
}

/// Human-readable state of the cache record for `path`
pub fn cache_status(layout: &ScriptLayout, path: &Path, algorithm: Algorithm) -> &'static str {
    if layout.is_artifact(path) {
        return "compiled";
    }

    let record = layout.cache_path(&ScriptLayout::script_id(path));
    if !record.is_file() {
        return "not compiled";
    }

    let file = match CompiledScriptFile::load_from_cache(&record) {
        Ok(file) => file,
        Err(_) => return "unreadable record",
    };
    match digest_file(path, algorithm) {
        Ok(digest) if digest == file.content_digest() => "cached",
        Ok(_) => "stale",
        Err(_) => "unreadable source",
    }
}
