//! Compiled scripts and the cache records they are loaded from
use std::path::{Path, PathBuf};
use tracing::warn;

use super::artifact::{ArtifactError, CacheRecord};
use super::configuration::EvaluationConfig;
use super::diagnostics::{Diagnostic, Diagnostics, Reported};
use super::params::ScriptParameters;
use super::registry::ResourceScope;
use super::service::{guarded, CompiledArtifact, EvaluationResult, ReturnValue, ScriptEvaluator};

/// A compiled script ready to be evaluated any number of times
#[derive(Debug, Clone)]
pub struct Script {
    id: String,
    artifact: CompiledArtifact,
}

/// Result of one evaluation plus the resources the script body acquired
#[derive(Debug)]
pub struct Evaluation {
    pub result: Reported<EvaluationResult>,
    pub scope: ResourceScope,
}

impl Script {
    pub fn new(id: impl Into<String>, artifact: CompiledArtifact) -> Self {
        Self {
            id: id.into(),
            artifact,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn artifact(&self) -> &CompiledArtifact {
        &self.artifact
    }

    /// Run the artifact with a fresh evaluation configuration
    ///
    /// A script that returns an error value counts as a failed evaluation.
    /// On failure, whatever the body already registered is released before
    /// returning.
    pub fn evaluate(
        &self,
        evaluator: &dyn ScriptEvaluator,
        parameters: &ScriptParameters,
    ) -> Result<Evaluation, Diagnostics> {
        let config = EvaluationConfig::new(&self.id, parameters.clone());
        let scope = config.scope().clone();

        let outcome = guarded("evaluator", || evaluator.evaluate(&self.artifact, &config))
            .and_then(|result| match &result.value.return_value {
                ReturnValue::Error { message } => Err(Diagnostics::single(
                    Diagnostic::error(message.clone()).at(&self.id),
                )),
                _ => Ok(result),
            });

        match outcome {
            Ok(result) => Ok(Evaluation { result, scope }),
            Err(diagnostics) => {
                if !scope.is_empty() {
                    let report = scope.release_all(&self.id);
                    warn!(
                        script = %self.id,
                        released = report.released,
                        "evaluation failed, released acquired resources"
                    );
                }
                Err(diagnostics)
            }
        }
    }
}

/// A [`Script`] loaded from a cache record, with the record's metadata
#[derive(Debug, Clone)]
pub struct CompiledScriptFile {
    path: PathBuf,
    content_digest: String,
    parameter_digest: String,
    parameter_count: u32,
    parameter_description: String,
    script: Script,
}

impl CompiledScriptFile {
    /// Read a cache record; unknown format versions are an error
    pub fn load_from_cache(path: &Path) -> Result<Self, ArtifactError> {
        let record = CacheRecord::load(path)?;
        let id = super::discovery::ScriptLayout::script_id(path);
        Ok(Self {
            path: path.to_path_buf(),
            content_digest: record.content_digest,
            parameter_digest: record.parameter_digest,
            parameter_count: record.parameter_count,
            parameter_description: record.parameter_description,
            script: Script::new(id, CompiledArtifact::new(record.artifact)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content_digest(&self) -> &str {
        &self.content_digest
    }

    pub fn parameter_digest(&self) -> &str {
        &self.parameter_digest
    }

    pub fn parameter_count(&self) -> u32 {
        self.parameter_count
    }

    pub fn parameter_description(&self) -> &str {
        &self.parameter_description
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn into_script(self) -> Script {
        self.script
    }
}
