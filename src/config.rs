use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::script::diagnostics::{ReportFilter, Severity};
use crate::script::digest::Algorithm;
use crate::script::discovery::ScriptLayout;

/// Complete kitrun configuration (loaded from TOML file)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct KitConfig {
    #[serde(default)]
    pub scripts: ScriptsConfig,

    #[serde(default)]
    pub compiler: CompilerConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    /// Static import names and the namespaces they expand to
    #[serde(default)]
    pub imports: BTreeMap<String, Vec<String>>,
}

/// Script root layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptsConfig {
    /// Directory scanned for scripts
    #[serde(default = "default_root")]
    pub root: String,

    /// Cache records, relative to root
    #[serde(default = "default_build_dir")]
    pub build_dir: String,

    /// Scripts that are never loaded automatically, relative to root
    #[serde(default = "default_lazy_dir")]
    pub lazy_dir: String,

    /// Exported import listings, relative to root
    #[serde(default = "default_out_dir")]
    pub out_dir: String,

    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,

    /// Entries starting with this are skipped by discovery
    #[serde(default = "default_hidden_prefix")]
    pub hidden_prefix: String,

    /// Reuse cache records when digests match
    #[serde(default = "default_true")]
    pub cache: bool,
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            build_dir: default_build_dir(),
            lazy_dir: default_lazy_dir(),
            out_dir: default_out_dir(),
            source_extension: default_source_extension(),
            artifact_extension: default_artifact_extension(),
            hidden_prefix: default_hidden_prefix(),
            cache: true,
        }
    }
}

/// Settings every compilation starts from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompilerConfig {
    #[serde(default)]
    pub classpath: Vec<PathBuf>,

    #[serde(default)]
    pub compiler_options: Vec<String>,

    /// Imports added to every script
    #[serde(default)]
    pub default_imports: Vec<String>,

    /// File with more default imports, one per line
    #[serde(default)]
    pub default_imports_file: Option<PathBuf>,

    #[serde(default = "default_digest_algorithm")]
    pub digest_algorithm: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            classpath: Vec::new(),
            compiler_options: Vec::new(),
            default_imports: Vec::new(),
            default_imports_file: None,
            digest_algorithm: default_digest_algorithm(),
        }
    }
}

/// Which diagnostics reach the operator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportConfig {
    /// Least severe level that is reported
    #[serde(default = "default_min_severity")]
    pub min_severity: String,

    /// Message substrings that are never reported
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            min_severity: default_min_severity(),
            ignore: default_ignore(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Concurrent background compilations
    #[serde(default = "default_compile_workers")]
    pub compile_workers: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            compile_workers: default_compile_workers(),
        }
    }
}

/// External compiler and evaluator commands
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// argv; `{source}` and `{output}` are substituted
    #[serde(default)]
    pub compile_command: Vec<String>,

    /// argv; `{artifact}` is substituted
    #[serde(default)]
    pub evaluate_command: Vec<String>,

    /// Per-invocation timeout (e.g. "30s", "2m"), none when unset
    #[serde(default)]
    pub timeout: Option<String>,

    /// Local library repositories searched for `depends-on` coordinates
    #[serde(default = "default_repositories")]
    pub repositories: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            compile_command: Vec::new(),
            evaluate_command: Vec::new(),
            timeout: None,
            repositories: default_repositories(),
        }
    }
}

fn default_root() -> String {
    "scripts".to_string()
}

fn default_build_dir() -> String {
    ".build".to_string()
}

fn default_lazy_dir() -> String {
    ".lazy".to_string()
}

fn default_out_dir() -> String {
    "out".to_string()
}

fn default_source_extension() -> String {
    "kts".to_string()
}

fn default_artifact_extension() -> String {
    "kit".to_string()
}

fn default_hidden_prefix() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

fn default_digest_algorithm() -> String {
    "sha-256".to_string()
}

fn default_min_severity() -> String {
    "info".to_string()
}

fn default_ignore() -> Vec<String> {
    vec!["never used".to_string()]
}

fn default_compile_workers() -> usize {
    num_cpus::get()
}

fn default_repositories() -> Vec<String> {
    dirs::home_dir()
        .map(|home| vec![home.join(".m2/repository").to_string_lossy().to_string()])
        .unwrap_or_default()
}

impl KitConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: KitConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Generate example configuration as TOML string
    pub fn example() -> Result<String> {
        let mut imports = BTreeMap::new();
        imports.insert(
            "Economy".to_string(),
            vec!["org.economy.api".to_string(), "org.economy.events".to_string()],
        );

        let config = KitConfig {
            compiler: CompilerConfig {
                default_imports: vec!["kit.api.*".to_string()],
                ..Default::default()
            },
            backend: BackendConfig {
                compile_command: ["kitc", "{source}", "-o", "{output}"]
                    .map(String::from)
                    .to_vec(),
                evaluate_command: ["kitvm", "{artifact}"].map(String::from).to_vec(),
                timeout: Some("60s".to_string()),
                ..Default::default()
            },
            imports,
            ..Default::default()
        };

        toml::to_string_pretty(&config).context("Failed to render example config")
    }

    /// Resolve relative script paths against `base` (the config file's directory)
    pub fn rooted_at(mut self, base: &Path) -> Self {
        let root = Path::new(&self.scripts.root);
        if root.is_relative() {
            self.scripts.root = base.join(root).to_string_lossy().to_string();
        }
        if let Some(file) = &self.compiler.default_imports_file {
            if file.is_relative() {
                self.compiler.default_imports_file = Some(base.join(file));
            }
        }
        self
    }

    pub fn layout(&self) -> ScriptLayout {
        ScriptLayout::from_config(&self.scripts)
    }

    /// Where import listings are exported
    pub fn out_dir(&self) -> PathBuf {
        Path::new(&self.scripts.root).join(&self.scripts.out_dir)
    }

    pub fn digest_algorithm(&self) -> Result<Algorithm> {
        self.compiler
            .digest_algorithm
            .parse()
            .context("compiler.digest_algorithm is not supported")
    }

    pub fn report_filter(&self) -> Result<ReportFilter> {
        let min_severity: Severity = self
            .report
            .min_severity
            .parse()
            .map_err(|e: String| anyhow::anyhow!("report.min_severity is invalid: {}", e))?;
        Ok(ReportFilter {
            min_severity,
            ignore: self.report.ignore.clone(),
        })
    }

    pub fn timeout(&self) -> Result<Option<std::time::Duration>> {
        self.backend
            .timeout
            .as_deref()
            .map(parse_duration)
            .transpose()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.scripts.root.is_empty() {
            anyhow::bail!("scripts.root must be set");
        }

        if self.scripts.source_extension.is_empty() || self.scripts.artifact_extension.is_empty() {
            anyhow::bail!("scripts.source_extension and scripts.artifact_extension must be set");
        }

        if self.scripts.source_extension == self.scripts.artifact_extension {
            anyhow::bail!("scripts.source_extension and scripts.artifact_extension must differ");
        }

        if self.scripts.hidden_prefix.is_empty() {
            anyhow::bail!("scripts.hidden_prefix must be set");
        }

        self.digest_algorithm()?;
        self.report_filter()?;
        self.timeout()?;

        if self.runtime.compile_workers == 0 {
            anyhow::bail!("runtime.compile_workers must be at least 1");
        }

        Ok(())
    }
}

/// Parse durations like "500ms", "30s", "2m", "1h"
pub fn parse_duration(value: &str) -> Result<std::time::Duration> {
    use std::time::Duration;

    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: u64 = number
        .parse()
        .with_context(|| format!("Invalid duration: {}", value))?;

    match unit {
        "ms" => Ok(Duration::from_millis(number)),
        "" | "s" => Ok(Duration::from_secs(number)),
        "m" => Ok(Duration::from_secs(number * 60)),
        "h" => Ok(Duration::from_secs(number * 3600)),
        _ => anyhow::bail!("Invalid duration unit in {}: expected ms, s, m or h", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::diagnostics::Diagnostic;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = KitConfig::default();
        assert_eq!(config.scripts.root, "scripts");
        assert_eq!(config.scripts.build_dir, ".build");
        assert_eq!(config.scripts.source_extension, "kts");
        assert_eq!(config.scripts.artifact_extension, "kit");
        assert!(config.scripts.cache);
        assert_eq!(config.compiler.digest_algorithm, "sha-256");
        assert_eq!(config.report.ignore, vec!["never used"]);
    }

    #[test]
    fn test_validate_config() {
        let config = KitConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_digest_algorithm() {
        let mut config = KitConfig::default();
        config.compiler.digest_algorithm = "md5".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_equal_extensions_rejected() {
        let mut config = KitConfig::default();
        config.scripts.artifact_extension = "kts".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = KitConfig::default();
        config.runtime.compile_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_severity_rejected() {
        let mut config = KitConfig::default();
        config.report.min_severity = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("kit.toml");
        fs::write(
            &path,
            r#"
[scripts]
root = "plugins/scripts"
cache = false

[report]
min_severity = "warning"

[imports]
Economy = ["org.economy.api"]
"#,
        )
        .unwrap();

        let config = KitConfig::from_file(&path).unwrap();
        assert_eq!(config.scripts.root, "plugins/scripts");
        assert!(!config.scripts.cache);
        assert_eq!(config.scripts.lazy_dir, ".lazy");
        let filter = config.report_filter().unwrap();
        assert_eq!(filter.min_severity, Severity::Warning);
        assert!(filter.accepts(&Diagnostic::warning("Deprecated call")));
        assert!(!filter.accepts(&Diagnostic::new(Severity::Info, "Resolved 2 imports")));
        assert_eq!(config.imports["Economy"], vec!["org.economy.api"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rooted_at_resolves_relative_paths() {
        let mut config = KitConfig::default();
        config.compiler.default_imports_file = Some(PathBuf::from("imports.txt"));
        let config = config.rooted_at(Path::new("/srv/host"));

        assert_eq!(config.scripts.root, "/srv/host/scripts");
        assert_eq!(
            config.compiler.default_imports_file,
            Some(PathBuf::from("/srv/host/imports.txt"))
        );
        assert_eq!(config.out_dir(), PathBuf::from("/srv/host/scripts/out"));
    }

    #[test]
    fn test_example_parses_back() {
        let example = KitConfig::example().unwrap();
        let parsed: KitConfig = toml::from_str(&example).unwrap();
        assert_eq!(parsed.backend.evaluate_command, vec!["kitvm", "{artifact}"]);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("5d").is_err());
    }
}
