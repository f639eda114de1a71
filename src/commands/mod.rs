pub mod clean;
pub mod compile;
pub mod console;
pub mod eval;
pub mod init;
pub mod inspect;
pub mod scripts;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use kitrun::config::KitConfig;
use kitrun::config_discovery::load_config_with_discovery;
use kitrun::script::discovery::ScriptLayout;
use kitrun::script::params::{ParamValue, ScriptParameters};
use kitrun::script::service::ReturnValue;

/// Load configuration for a command, honoring `--config`
pub fn load_config(explicit: Option<&str>) -> Result<KitConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let loaded = load_config_with_discovery(explicit.map(Path::new), &cwd)?;
    match &loaded.source {
        Some(path) => tracing::debug!("Using config: {}", path.display()),
        None => tracing::debug!("No configuration file found, using defaults"),
    }
    Ok(loaded.config)
}

/// Resolve a script argument: an existing path, else a name under the root
pub fn resolve_script(layout: &ScriptLayout, script: &str) -> Result<PathBuf> {
    let path = Path::new(script);
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    match layout.locate(script) {
        Some(found) => Ok(found),
        None => bail!(
            "Script not found: {} (searched {})",
            script,
            layout.root.display()
        ),
    }
}

pub fn parameters(params: &[(String, ParamValue)], run_args: &[String]) -> ScriptParameters {
    params
        .iter()
        .fold(ScriptParameters::new(), |acc, (name, value)| {
            acc.with(name.clone(), value.clone())
        })
        .with_run_args(run_args.to_vec())
}

/// Print a return value on stdout; unit prints nothing
pub fn print_return_value(value: &ReturnValue) {
    match value {
        ReturnValue::Unit => {}
        ReturnValue::Value { rendered, .. } => println!("{}", rendered),
        ReturnValue::Error { message } => println!("error: {}", message),
    }
}
