/// `kitrun console` command implementation
///
/// Loads every script, then reads one command per line from stdin until
/// `quit` or end of input. Every live script is released on the way out.
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use kitrun::backend::build_evaluator;
use kitrun::cli_utils::kitrun_prefix;
use kitrun::config::KitConfig;
use kitrun::script::notice::{ConsoleSink, NoticeSink};
use kitrun::script::{EvalError, EvalHandle, EvalRequest, Evaluator, ScriptParameters};

use super::{print_return_value, resolve_script};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Evaluate one script with run arguments, or every script
    Eval {
        name: Option<String>,
        run_args: Vec<String>,
    },
    Compile(Option<String>),
    Release(Option<String>),
    Reload(String),
    Info,
    Help,
    Quit,
}

const HELP: &str = "commands: eval [name [args...]], compile [name], release [id], reload <id>, info, help, quit";

/// Parse one console line; `Ok(None)` for blank lines
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<String> = words.map(str::to_string).collect();
    let first = rest.first().cloned();

    let parsed = match command {
        "eval" | "run" => ConsoleCommand::Eval {
            name: first,
            run_args: rest.into_iter().skip(1).collect(),
        },
        "compile" => ConsoleCommand::Compile(first),
        "release" | "stop" => ConsoleCommand::Release(first),
        "reload" => ConsoleCommand::Reload(first.ok_or("usage: reload <id>")?),
        "info" | "list" => ConsoleCommand::Info,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{}' ({})", other, HELP)),
    };
    Ok(Some(parsed))
}

pub async fn run(config: &KitConfig) -> Result<()> {
    let evaluator = build_evaluator(config)?;
    let sink: Arc<dyn NoticeSink> = Arc::new(ConsoleSink);

    load_all(&evaluator, &sink).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                eprintln!("{} {}", kitrun_prefix(), message);
                continue;
            }
        };

        if command == ConsoleCommand::Quit {
            break;
        }
        if let Err(e) = execute(&evaluator, &sink, command).await {
            let reported = e
                .downcast_ref::<EvalError>()
                .is_some_and(|e| e.is_expected() || e.diagnostics().is_some());
            if !reported {
                eprintln!("{} {:#}", kitrun_prefix(), e);
            }
        }
    }

    evaluator.shutdown(sink.as_ref());
    Ok(())
}

async fn load_all(evaluator: &Arc<Evaluator>, sink: &Arc<dyn NoticeSink>) -> Result<()> {
    let handles = evaluator
        .load_all(Arc::clone(sink))
        .context("Failed to prepare script directories")?;
    let total = handles.len();
    let mut loaded = 0;

    for (path, handle) in handles {
        match handle.await {
            Ok(_) => loaded += 1,
            Err(e) if e.is_expected() => {}
            Err(e) => report_failure(&path, &e),
        }
    }

    eprintln!("{} Loaded {}/{} script(s)", kitrun_prefix(), loaded, total);
    Ok(())
}

fn report_failure(path: &std::path::Path, error: &EvalError) {
    // Diagnostics were already delivered to the sink
    if error.diagnostics().is_none() {
        eprintln!("{} {}: {}", kitrun_prefix(), path.display(), error);
    }
}

fn request(path: PathBuf, run_args: Vec<String>, sink: &Arc<dyn NoticeSink>) -> EvalRequest {
    EvalRequest::new(path)
        .parameters(ScriptParameters::new().with_run_args(run_args))
        .sink(Arc::clone(sink))
}

async fn settle(handle: EvalHandle) -> Result<()> {
    let report = handle.await?;
    print_return_value(&report.result.return_value);
    Ok(())
}

async fn execute(
    evaluator: &Arc<Evaluator>,
    sink: &Arc<dyn NoticeSink>,
    command: ConsoleCommand,
) -> Result<()> {
    match command {
        ConsoleCommand::Eval {
            name: Some(name),
            run_args,
        } => {
            let path = resolve_script(evaluator.layout(), &name)?;
            settle(evaluator.eval(request(path, run_args, sink))).await
        }
        ConsoleCommand::Eval { name: None, .. } => load_all(evaluator, sink).await,
        ConsoleCommand::Compile(Some(name)) => {
            let path = resolve_script(evaluator.layout(), &name)?;
            evaluator.compile(&path, ScriptParameters::new(), sink.as_ref())?;
            Ok(())
        }
        ConsoleCommand::Compile(None) => {
            for path in evaluator.find_scripts() {
                if evaluator.layout().is_source(&path) {
                    if let Err(e) = evaluator.compile(&path, ScriptParameters::new(), sink.as_ref()) {
                        report_failure(&path, &e);
                    }
                }
            }
            Ok(())
        }
        ConsoleCommand::Release(Some(id)) => {
            evaluator.release(&id, sink.as_ref())?;
            Ok(())
        }
        ConsoleCommand::Release(None) => {
            evaluator.shutdown(sink.as_ref());
            Ok(())
        }
        ConsoleCommand::Reload(id) => {
            let path = resolve_script(evaluator.layout(), &id)?;
            settle(evaluator.reload(request(path, Vec::new(), sink))).await
        }
        ConsoleCommand::Info => {
            let containers = evaluator.registry().containers();
            if containers.is_empty() {
                println!("No scripts running");
            }
            for container in containers {
                println!(
                    "{:<24} {} resource(s)",
                    container.id(),
                    container.resource_count()
                );
            }
            Ok(())
        }
        ConsoleCommand::Help => {
            println!("{}", HELP);
            Ok(())
        }
        ConsoleCommand::Quit => Ok(()),
    }
}
