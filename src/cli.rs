use clap::{Parser, Subcommand};

use kitrun::script::params::ParamValue;

/// kitrun - Compile, cache and run scripts
///
/// Scripts are compiled once through the configured compiler, cached under
/// the build directory and re-evaluated from the cache until their source
/// changes.
#[derive(Parser, Debug)]
#[command(name = "kitrun")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile, cache and run scripts", long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short = 'c', long, env = "KIT_CONFIG", global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate a script, compiling it when its cache record is stale
    Eval(EvalArgs),

    /// Compile a script and write its cache record without running it
    Compile(CompileArgs),

    /// List discovered scripts
    Scripts(ScriptsArgs),

    /// Show the contents of a cache record
    Inspect(InspectArgs),

    /// Delete cache records
    Clean(CleanArgs),

    /// Load every script and read commands from stdin
    Console,

    /// Write an example kit.toml
    Init(InitArgs),
}

#[derive(Parser, Debug)]
pub struct EvalArgs {
    /// Script name or path (source or compiled artifact)
    pub script: String,

    /// Arguments passed to the script as `run_args` (after --)
    #[arg(last = true)]
    pub run_args: Vec<String>,

    /// Parameter as name=value (repeatable); type is inferred, or use name:type=value
    #[arg(short, long = "param", value_parser = parse_param)]
    pub params: Vec<(String, ParamValue)>,

    /// Ignore the cache record and compile
    #[arg(long)]
    pub no_cache: bool,

    /// Suppress progress lines
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Parser, Debug)]
pub struct CompileArgs {
    /// Script name or path
    pub script: String,

    /// Parameter as name=value (repeatable)
    #[arg(short, long = "param", value_parser = parse_param)]
    pub params: Vec<(String, ParamValue)>,
}

#[derive(Parser, Debug)]
pub struct ScriptsArgs {
    /// Include lazy scripts
    #[arg(long)]
    pub lazy: bool,

    /// Show cache status per script
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Script name, source path or cache record path
    pub target: String,
}

#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Script id to clean (all records when omitted)
    pub script: Option<String>,

    /// Also wipe exported import listings
    #[arg(long)]
    pub imports: bool,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Overwrite an existing kit.toml
    #[arg(long)]
    pub force: bool,
}

/// Parse `name=value` or `name:type=value`
pub fn parse_param(raw: &str) -> Result<(String, ParamValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;

    let (name, kind) = match key.split_once(':') {
        Some((name, kind)) => (name.trim(), Some(kind.trim())),
        None => (key.trim(), None),
    };
    if name.is_empty() {
        return Err(format!("missing parameter name in '{}'", raw));
    }

    let value = match kind {
        None => infer_value(value),
        Some("bool") => ParamValue::Bool(
            value
                .parse()
                .map_err(|_| format!("'{}' is not a bool", value))?,
        ),
        Some("int") => ParamValue::Int(
            value
                .parse()
                .map_err(|_| format!("'{}' is not an int", value))?,
        ),
        Some("float") => ParamValue::Float(
            value
                .parse()
                .map_err(|_| format!("'{}' is not a float", value))?,
        ),
        Some("text") => ParamValue::Text(value.to_string()),
        Some("list") => ParamValue::List(
            value
                .split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        Some("json") => ParamValue::Json(
            serde_json::from_str(value).map_err(|e| format!("invalid json: {}", e))?,
        ),
        Some(other) => return Err(format!("unknown parameter type '{}'", other)),
    };

    Ok((name.to_string(), value))
}

fn infer_value(value: &str) -> ParamValue {
    if let Ok(b) = value.parse::<bool>() {
        ParamValue::Bool(b)
    } else if let Ok(i) = value.parse::<i64>() {
        ParamValue::Int(i)
    } else if let Ok(f) = value.parse::<f64>() {
        ParamValue::Float(f)
    } else {
        ParamValue::Text(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param_infers_types() {
        assert_eq!(
            parse_param("debug=true").unwrap(),
            ("debug".to_string(), ParamValue::Bool(true))
        );
        assert_eq!(
            parse_param("retries=3").unwrap(),
            ("retries".to_string(), ParamValue::Int(3))
        );
        assert_eq!(
            parse_param("name=world").unwrap(),
            ("name".to_string(), ParamValue::Text("world".into()))
        );
    }

    #[test]
    fn test_parse_param_explicit_types() {
        assert_eq!(
            parse_param("port:text=8080").unwrap(),
            ("port".to_string(), ParamValue::Text("8080".into()))
        );
        assert_eq!(
            parse_param("hosts:list=a,b").unwrap(),
            (
                "hosts".to_string(),
                ParamValue::List(vec!["a".into(), "b".into()])
            )
        );
        assert!(parse_param("x:int=abc").is_err());
        assert!(parse_param("x:blob=1").is_err());
        assert!(parse_param("novalue").is_err());
    }

    #[test]
    fn test_cli_parses_eval() {
        let cli = Cli::parse_from([
            "kitrun", "eval", "hello", "-p", "debug=true", "--no-cache", "--", "a", "b",
        ]);
        match cli.command {
            Commands::Eval(args) => {
                assert_eq!(args.script, "hello");
                assert!(args.no_cache);
                assert_eq!(args.run_args, vec!["a", "b"]);
                assert_eq!(args.params.len(), 1);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
