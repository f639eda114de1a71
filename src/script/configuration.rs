//! Immutable compilation and evaluation configurations
//!
//! A [`CompilationConfig`] is never changed after it is built. Refinement
//! (directive handling) starts from [`CompilationConfig::to_builder`] and
//! produces a new value, leaving the original untouched.
use std::path::PathBuf;

use super::digest::Algorithm;
use super::params::ScriptParameters;
use super::registry::ResourceScope;

#[derive(Debug, Clone, PartialEq)]
pub struct CompilationConfig {
    classpath: Vec<PathBuf>,
    imported_sources: Vec<PathBuf>,
    default_imports: Vec<String>,
    compiler_options: Vec<String>,
    parameters: ScriptParameters,
    digest_algorithm: Algorithm,
}

impl CompilationConfig {
    pub fn builder(parameters: ScriptParameters) -> CompilationConfigBuilder {
        CompilationConfigBuilder {
            config: CompilationConfig {
                classpath: Vec::new(),
                imported_sources: Vec::new(),
                default_imports: Vec::new(),
                compiler_options: Vec::new(),
                parameters,
                digest_algorithm: Algorithm::default(),
            },
        }
    }

    /// Start a new configuration from this one
    pub fn to_builder(&self) -> CompilationConfigBuilder {
        CompilationConfigBuilder {
            config: self.clone(),
        }
    }

    pub fn classpath(&self) -> &[PathBuf] {
        &self.classpath
    }

    /// Additional source fragments compiled alongside the script
    pub fn imported_sources(&self) -> &[PathBuf] {
        &self.imported_sources
    }

    pub fn default_imports(&self) -> &[String] {
        &self.default_imports
    }

    pub fn compiler_options(&self) -> &[String] {
        &self.compiler_options
    }

    pub fn parameters(&self) -> &ScriptParameters {
        &self.parameters
    }

    pub fn digest_algorithm(&self) -> Algorithm {
        self.digest_algorithm
    }

    pub fn parameter_signature(&self) -> String {
        self.parameters.signature(self.digest_algorithm)
    }
}

/// Builder for [`CompilationConfig`]; list additions keep order and skip duplicates
#[derive(Debug, Clone)]
pub struct CompilationConfigBuilder {
    config: CompilationConfig,
}

impl CompilationConfigBuilder {
    pub fn classpath(mut self, entries: impl IntoIterator<Item = PathBuf>) -> Self {
        append_unique(&mut self.config.classpath, entries);
        self
    }

    pub fn imported_sources(mut self, sources: impl IntoIterator<Item = PathBuf>) -> Self {
        append_unique(&mut self.config.imported_sources, sources);
        self
    }

    pub fn default_imports(mut self, imports: impl IntoIterator<Item = String>) -> Self {
        append_unique(&mut self.config.default_imports, imports);
        self
    }

    /// Options are appended as given: repeated flags can be meaningful
    pub fn compiler_options(mut self, options: impl IntoIterator<Item = String>) -> Self {
        self.config.compiler_options.extend(options);
        self
    }

    pub fn digest_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.config.digest_algorithm = algorithm;
        self
    }

    pub fn build(self) -> CompilationConfig {
        self.config
    }
}

fn append_unique<T: PartialEq>(target: &mut Vec<T>, items: impl IntoIterator<Item = T>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

/// Per-evaluation settings handed to the external evaluator
///
/// Dependencies were resolved at compile time, so the evaluator is told not to
/// load them again; script instances are shared between included fragments.
#[derive(Debug, Clone)]
pub struct EvaluationConfig {
    pub script_id: String,
    pub parameters: ScriptParameters,
    pub share_instances: bool,
    pub load_dependencies: bool,
    scope: ResourceScope,
}

impl EvaluationConfig {
    pub fn new(script_id: impl Into<String>, parameters: ScriptParameters) -> Self {
        Self {
            script_id: script_id.into(),
            parameters,
            share_instances: true,
            load_dependencies: false,
            scope: ResourceScope::new(),
        }
    }

    /// Where the script body registers cleanup for the resources it acquires
    pub fn scope(&self) -> &ResourceScope {
        &self.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::params::ParamValue;

    #[test]
    fn test_refinement_leaves_original_untouched() {
        let base = CompilationConfig::builder(ScriptParameters::new())
            .default_imports(vec!["kit.api.*".to_string()])
            .build();

        let refined = base
            .to_builder()
            .default_imports(vec!["kit.api.*".to_string(), "org.eco.*".to_string()])
            .classpath(vec![PathBuf::from("/repo/util.jar")])
            .compiler_options(vec!["-Xa".to_string(), "-Xa".to_string()])
            .build();

        assert_eq!(base.default_imports(), ["kit.api.*"]);
        assert!(base.classpath().is_empty());
        assert_eq!(refined.default_imports(), ["kit.api.*", "org.eco.*"]);
        assert_eq!(refined.classpath(), [PathBuf::from("/repo/util.jar")]);
        assert_eq!(refined.compiler_options().len(), 2);
    }

    #[test]
    fn test_parameter_signature_follows_parameters() {
        let a = CompilationConfig::builder(ScriptParameters::new()).build();
        let b = CompilationConfig::builder(
            ScriptParameters::new().with("debug", ParamValue::Bool(false)),
        )
        .build();
        assert_ne!(a.parameter_signature(), b.parameter_signature());
    }

    #[test]
    fn test_evaluation_defaults() {
        let config = EvaluationConfig::new("hello", ScriptParameters::new());
        assert!(config.share_instances);
        assert!(!config.load_dependencies);
        assert!(config.scope().is_empty());
    }
}
