/// `kitrun eval` command implementation
use anyhow::Result;
use std::sync::Arc;

use kitrun::backend::build_evaluator;
use kitrun::config::KitConfig;
use kitrun::script::notice::{ConsoleSink, TracingSink};
use kitrun::script::EvalRequest;

use super::{parameters, print_return_value, resolve_script};
use crate::cli::EvalArgs;

pub async fn run(config: &KitConfig, args: &EvalArgs) -> Result<()> {
    let evaluator = build_evaluator(config)?;
    let path = resolve_script(evaluator.layout(), &args.script)?;

    let request = EvalRequest::new(&path)
        .use_cache(!args.no_cache)
        .logging(!args.quiet)
        .parameters(parameters(&args.params, &args.run_args))
        .sink(Arc::new(ConsoleSink));

    let outcome = evaluator.eval(request).await;

    // One-shot: nothing outlives the process
    evaluator.shutdown(&TracingSink);

    let report = outcome?;
    tracing::debug!(
        script = %report.id,
        origin = ?report.origin,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "eval finished"
    );
    print_return_value(&report.result.return_value);
    Ok(())
}
