/// `kitrun compile` command implementation
use anyhow::Result;

use kitrun::backend::build_evaluator;
use kitrun::cli_utils::kitrun_prefix;
use kitrun::config::KitConfig;
use kitrun::script::notice::ConsoleSink;

use super::{parameters, resolve_script};
use crate::cli::CompileArgs;

pub fn run(config: &KitConfig, args: &CompileArgs) -> Result<()> {
    let evaluator = build_evaluator(config)?;
    let path = resolve_script(evaluator.layout(), &args.script)?;

    let compiled = evaluator.compile(&path, parameters(&args.params, &[]), &ConsoleSink)?;
    let script = &compiled.value;

    if config.scripts.cache {
        eprintln!(
            "{} Wrote {} ({} bytes)",
            kitrun_prefix(),
            evaluator.layout().cache_path(script.id()).display(),
            script.artifact().len()
        );
    }
    Ok(())
}
