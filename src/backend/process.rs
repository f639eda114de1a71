//! External-command compiler and evaluator
//!
//! The compile command receives the source path and an output path and must
//! write the artifact there. The evaluate command receives the artifact path
//! and prints the return value on stdout, either as plain text or as a JSON
//! object (`{"kind": "value", "rendered": "...", "type_name": "..."}`).
//! Everything else travels through `KIT_*` environment variables.
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::script::configuration::{CompilationConfig, EvaluationConfig};
use crate::script::diagnostics::{Diagnostic, Diagnostics, Reported, Severity};
use crate::script::discovery::ScriptLayout;
use crate::script::params::{ScriptParameters, RUN_ARGS};
use crate::script::service::{
    CompiledArtifact, EvaluationResult, ReturnValue, ScriptCompiler, ScriptEvaluator, SourceScript,
};

/// Captured result of one external command
#[derive(Debug)]
struct ProcessOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    duration: Duration,
}

/// Spawns commands with an optional timeout
#[derive(Debug, Clone, Default)]
struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    fn run(&self, argv: &[String], env: &BTreeMap<String, OsString>) -> Result<ProcessOutput> {
        let start = Instant::now();
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("Empty command"))?;

        // Resolve program from PATH, falling back to the name as given
        let program_path = which::which(program).unwrap_or_else(|_| PathBuf::from(program));

        let mut cmd = Command::new(&program_path);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(command = ?cmd, "spawning");

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn {}", program))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match self.timeout {
            Some(timeout) => loop {
                if let Some(status) = child.try_wait()? {
                    break status;
                }
                if start.elapsed() >= timeout {
                    child.kill()?;
                    child.wait()?; // Reap zombie
                    anyhow::bail!("{} timed out after {}s", program, timeout.as_secs());
                }
                thread::sleep(Duration::from_millis(50));
            },
            None => child.wait().context("Failed to wait for child process")?,
        };

        Ok(ProcessOutput {
            status,
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
            duration: start.elapsed(),
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        buffer
    })
}

/// Replace `{name}` placeholders in every argument
fn substitute(argv: &[String], values: &[(&str, &Path)]) -> Vec<String> {
    argv.iter()
        .map(|arg| {
            values.iter().fold(arg.clone(), |acc, (name, path)| {
                acc.replace(&format!("{{{}}}", name), &path.to_string_lossy())
            })
        })
        .collect()
}

/// Parse compiler output lines like `hello.kts:3:5: warning: message`
pub fn parse_diagnostic_line(line: &str) -> Option<Diagnostic> {
    const MARKERS: [(&str, Severity); 5] = [
        ("fatal:", Severity::Fatal),
        ("error:", Severity::Error),
        ("warning:", Severity::Warning),
        ("info:", Severity::Info),
        ("debug:", Severity::Debug),
    ];

    let lower = line.to_ascii_lowercase();
    let (index, marker, severity) = MARKERS
        .iter()
        .filter_map(|(marker, severity)| lower.find(*marker).map(|i| (i, *marker, *severity)))
        .min_by_key(|(i, _, _)| *i)?;

    let location = line[..index].trim().trim_end_matches(':').trim();
    let message = line[index + marker.len()..].trim();
    let diagnostic = Diagnostic::new(severity, message);
    Some(if location.is_empty() {
        diagnostic
    } else {
        diagnostic.at(location)
    })
}

fn diagnostics_from(stderr: &[u8], fallback: Severity) -> Vec<Diagnostic> {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .map(|l| parse_diagnostic_line(l).unwrap_or_else(|| Diagnostic::new(fallback, l.trim())))
        .collect()
}

fn failure(what: &str, output: &ProcessOutput, location: &str) -> Diagnostics {
    let mut diagnostics = diagnostics_from(&output.stderr, Severity::Error);
    if !diagnostics.iter().any(|d| d.severity >= Severity::Error) {
        diagnostics.push(
            Diagnostic::error(format!("{} exited with {}", what, output.status)).at(location),
        );
    }
    diagnostics.into()
}

fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn parameter_env(id: &str, parameters: &ScriptParameters) -> BTreeMap<String, OsString> {
    let mut env = BTreeMap::new();
    env.insert("KIT_SCRIPT_ID".to_string(), OsString::from(id));
    for (name, value) in parameters.iter() {
        if name == RUN_ARGS {
            continue;
        }
        env.insert(format!("KIT_PARAM_{}", env_key(name)), OsString::from(value.to_string()));
    }
    let run_args = serde_json::to_string(parameters.run_args()).unwrap_or_else(|_| "[]".into());
    env.insert("KIT_RUN_ARGS".to_string(), OsString::from(run_args));
    env
}

fn join_paths(variable: &str, paths: &[PathBuf]) -> Result<OsString, Diagnostic> {
    std::env::join_paths(paths).map_err(|e| {
        Diagnostic::error(format!("Cannot pass {} to the compiler", variable)).caused_by(e)
    })
}

/// Compiles by running `backend.compile_command`
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    argv: Vec<String>,
    runner: ProcessRunner,
}

impl CommandCompiler {
    pub fn new(argv: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            argv,
            runner: ProcessRunner { timeout },
        }
    }

    fn environment(
        &self,
        source: &SourceScript,
        config: &CompilationConfig,
    ) -> Result<BTreeMap<String, OsString>, Diagnostics> {
        let id = ScriptLayout::script_id(&source.path);
        let classpath = join_paths("KIT_CLASSPATH", config.classpath());
        let includes = join_paths("KIT_INCLUDES", config.imported_sources());
        let (classpath, includes) = match (classpath, includes) {
            (Ok(classpath), Ok(includes)) => (classpath, includes),
            (classpath, includes) => {
                let location = source.location();
                let errors: Vec<Diagnostic> = [classpath.err(), includes.err()]
                    .into_iter()
                    .flatten()
                    .map(|d| d.at(&location))
                    .collect();
                return Err(errors.into());
            }
        };

        let mut env = parameter_env(&id, config.parameters());
        env.insert("KIT_CLASSPATH".into(), classpath);
        env.insert("KIT_INCLUDES".into(), includes);
        env.insert("KIT_IMPORTS".into(), config.default_imports().join(",").into());
        env.insert(
            "KIT_COMPILER_OPTIONS".into(),
            config.compiler_options().join(" ").into(),
        );
        env.insert(
            "KIT_PARAMETERS".into(),
            config.parameters().description().into(),
        );
        Ok(env)
    }
}

impl ScriptCompiler for CommandCompiler {
    fn compile(
        &self,
        source: &SourceScript,
        config: &CompilationConfig,
    ) -> Result<Reported<CompiledArtifact>, Diagnostics> {
        let location = source.location();
        if self.argv.is_empty() {
            return Err(Diagnostics::single(Diagnostic::error(
                "No compiler configured (backend.compile_command)",
            )));
        }

        let workdir = tempfile::tempdir().map_err(|e| {
            Diagnostics::single(Diagnostic::error("Failed to create work directory").caused_by(e))
        })?;
        let output_path = workdir.path().join("artifact.out");

        let env = self.environment(source, config)?;
        let argv = substitute(
            &self.argv,
            &[("source", &source.path), ("output", &output_path)],
        );
        let output = self
            .runner
            .run(&argv, &env)
            .map_err(|e| {
                Diagnostics::single(
                    Diagnostic::error("Compiler could not run")
                        .at(&location)
                        .caused_by(format!("{:#}", e)),
                )
            })?;

        if !output.status.success() {
            return Err(failure("compiler", &output, &location));
        }

        let bytes = std::fs::read(&output_path).map_err(|e| {
            Diagnostics::single(
                Diagnostic::error("Compiler produced no artifact")
                    .at(&location)
                    .caused_by(e),
            )
        })?;

        debug!(
            script = %location,
            size_bytes = bytes.len(),
            elapsed_ms = output.duration.as_millis() as u64,
            "external compiler finished"
        );

        Ok(Reported::with_reports(
            CompiledArtifact::new(bytes),
            diagnostics_from(&output.stderr, Severity::Info),
        ))
    }
}

/// Evaluates by running `backend.evaluate_command`
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    argv: Vec<String>,
    runner: ProcessRunner,
}

impl CommandEvaluator {
    pub fn new(argv: Vec<String>, timeout: Option<Duration>) -> Self {
        Self {
            argv,
            runner: ProcessRunner { timeout },
        }
    }
}

/// Interpret evaluator stdout as a return value
pub fn parse_return_value(stdout: &str) -> ReturnValue {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return ReturnValue::Unit;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| ReturnValue::Value {
        rendered: trimmed.to_string(),
        type_name: "String".to_string(),
    })
}

impl ScriptEvaluator for CommandEvaluator {
    fn evaluate(
        &self,
        artifact: &CompiledArtifact,
        config: &EvaluationConfig,
    ) -> Result<Reported<EvaluationResult>, Diagnostics> {
        let location = config.script_id.clone();
        if self.argv.is_empty() {
            return Err(Diagnostics::single(Diagnostic::error(
                "No evaluator configured (backend.evaluate_command)",
            )));
        }

        let workdir = tempfile::tempdir().map_err(|e| {
            Diagnostics::single(Diagnostic::error("Failed to create work directory").caused_by(e))
        })?;
        let artifact_path = workdir.path().join(format!("{}.bin", config.script_id));
        std::fs::write(&artifact_path, artifact.bytes()).map_err(|e| {
            Diagnostics::single(Diagnostic::error("Failed to stage artifact").caused_by(e))
        })?;

        let argv = substitute(&self.argv, &[("artifact", &artifact_path)]);
        let env = parameter_env(&config.script_id, &config.parameters);
        let output = self.runner.run(&argv, &env).map_err(|e| {
            Diagnostics::single(
                Diagnostic::error("Evaluator could not run")
                    .at(&location)
                    .caused_by(format!("{:#}", e)),
            )
        })?;

        if !output.status.success() {
            return Err(failure("evaluator", &output, &location));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Reported::with_reports(
            EvaluationResult {
                return_value: parse_return_value(&stdout),
            },
            diagnostics_from(&output.stderr, Severity::Info),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::params::ParamValue;
    use std::fs;
    use tempfile::TempDir;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_parse_diagnostic_line() {
        let d = parse_diagnostic_line("hello.kts:3:5: warning: Variable 'x' is never used").unwrap();
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.location.as_deref(), Some("hello.kts:3:5"));
        assert_eq!(d.message, "Variable 'x' is never used");

        let d = parse_diagnostic_line("ERROR: Unresolved reference: foo").unwrap();
        assert_eq!(d.severity, Severity::Error);
        assert!(d.location.is_none());

        assert!(parse_diagnostic_line("just some output").is_none());
    }

    #[test]
    fn test_parse_return_value() {
        assert_eq!(parse_return_value("\n"), ReturnValue::Unit);
        assert_eq!(
            parse_return_value("42\n"),
            ReturnValue::Value {
                rendered: "42".into(),
                type_name: "String".into()
            }
        );
        assert_eq!(
            parse_return_value(r#"{"kind":"value","rendered":"42","type_name":"Int"}"#),
            ReturnValue::Value {
                rendered: "42".into(),
                type_name: "Int".into()
            }
        );
        assert_eq!(
            parse_return_value(r#"{"kind":"error","message":"boom"}"#),
            ReturnValue::Error {
                message: "boom".into()
            }
        );
    }

    #[test]
    fn test_substitute_placeholders() {
        let argv = vec!["kitc".into(), "{source}".into(), "-o={output}".into()];
        let out = substitute(
            &argv,
            &[("source", Path::new("/s/a.kts")), ("output", Path::new("/t/a.out"))],
        );
        assert_eq!(out, vec!["kitc", "/s/a.kts", "-o=/t/a.out"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_compiler_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.kts");
        fs::write(&path, "println(1)").unwrap();
        let source = SourceScript::read(&path).unwrap();

        let compiler = CommandCompiler::new(
            sh(r#"cp "$0" "$1" && echo "$KIT_IMPORTS" >> "$1" && echo "hello.kts:1:1: warning: shadowed" >&2"#)
                .into_iter()
                .chain(["{source}".to_string(), "{output}".to_string()])
                .collect(),
            None,
        );
        let config = CompilationConfig::builder(ScriptParameters::new())
            .default_imports(vec!["kit.api.*".to_string()])
            .build();

        let compiled = compiler.compile(&source, &config).unwrap();
        assert_eq!(&compiled.value.bytes()[..], &b"println(1)kit.api.*\n"[..]);
        assert_eq!(compiled.reports.len(), 1);
        assert_eq!(compiled.reports[0].severity, Severity::Warning);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_compiler_failure() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.kts");
        fs::write(&path, "oops").unwrap();
        let source = SourceScript::read(&path).unwrap();

        let compiler = CommandCompiler::new(sh("echo 'bad.kts:1:1: error: Expecting an element' >&2; exit 1"), None);
        let config = CompilationConfig::builder(ScriptParameters::new()).build();

        let err = compiler.compile(&source, &config).unwrap_err();
        assert_eq!(err.0.len(), 1);
        assert_eq!(err.to_string(), "bad.kts:1:1: Expecting an element");
    }

    #[cfg(unix)]
    #[test]
    fn test_unjoinable_classpath_fails_before_spawning() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.kts");
        fs::write(&path, "println(1)").unwrap();
        let source = SourceScript::read(&path).unwrap();
        let marker = temp.path().join("ran");

        let compiler = CommandCompiler::new(
            sh(r#"touch "$0""#)
                .into_iter()
                .chain([marker.to_string_lossy().to_string()])
                .collect(),
            None,
        );
        let config = CompilationConfig::builder(ScriptParameters::new())
            .classpath(vec![PathBuf::from("/libs/a:b.jar")])
            .build();

        let err = compiler.compile(&source, &config).unwrap_err();
        assert_eq!(err.0.len(), 1);
        assert!(err.0[0].message.contains("KIT_CLASSPATH"));
        assert_eq!(err.0[0].location.as_deref(), Some(source.location().as_str()));
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_evaluator_passes_parameters() {
        let evaluator = CommandEvaluator::new(
            sh(r#"echo "$KIT_PARAM_DEBUG $KIT_RUN_ARGS""#),
            None,
        );
        let parameters = ScriptParameters::new()
            .with("debug", ParamValue::Bool(true))
            .with_run_args(vec!["a".into()]);
        let config = EvaluationConfig::new("hello", parameters);

        let result = evaluator
            .evaluate(&CompiledArtifact::new(b"blob".to_vec()), &config)
            .unwrap();
        assert_eq!(
            result.value.return_value,
            ReturnValue::Value {
                rendered: r#"true ["a"]"#.into(),
                type_name: "String".into()
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_process() {
        let evaluator = CommandEvaluator::new(sh("sleep 5"), Some(Duration::from_millis(200)));
        let config = EvaluationConfig::new("slow", ScriptParameters::new());

        let err = evaluator
            .evaluate(&CompiledArtifact::new(b"".to_vec()), &config)
            .unwrap_err();
        assert!(err.0[0].to_string().contains("timed out"));
    }

    #[test]
    fn test_missing_command_is_a_diagnostic() {
        let compiler = CommandCompiler::new(Vec::new(), None);
        let source = SourceScript {
            path: PathBuf::from("x.kts"),
            text: String::new(),
        };
        let config = CompilationConfig::builder(ScriptParameters::new()).build();
        assert!(compiler.compile(&source, &config).is_err());
    }
}
