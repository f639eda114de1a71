//! Seams to the external services the pipeline drives
//!
//! The compiler and evaluator are opaque capabilities: the pipeline hands them a
//! source or an artifact plus an immutable configuration and receives either a
//! value with its diagnostics or a batch of failure diagnostics.
use anyhow::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::configuration::{CompilationConfig, EvaluationConfig};
use super::diagnostics::{Diagnostics, Reported};

/// A script source read from disk
#[derive(Debug, Clone)]
pub struct SourceScript {
    pub path: PathBuf,
    pub text: String,
}

impl SourceScript {
    pub fn read(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            text: std::fs::read_to_string(path)?,
        })
    }

    pub fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Opaque compiled form of a script, cheap to clone and share
#[derive(Clone, PartialEq, Eq)]
pub struct CompiledArtifact(Bytes);

impl CompiledArtifact {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CompiledArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompiledArtifact({} bytes)", self.0.len())
    }
}

/// What a script body returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReturnValue {
    Unit,
    Value { rendered: String, type_name: String },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub return_value: ReturnValue,
}

impl EvaluationResult {
    pub fn unit() -> Self {
        Self {
            return_value: ReturnValue::Unit,
        }
    }

    pub fn value(rendered: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            return_value: ReturnValue::Value {
                rendered: rendered.into(),
                type_name: type_name.into(),
            },
        }
    }
}

/// External compiler: source + configuration to artifact
pub trait ScriptCompiler: Send + Sync {
    fn compile(
        &self,
        source: &SourceScript,
        config: &CompilationConfig,
    ) -> Result<Reported<CompiledArtifact>, Diagnostics>;
}

/// External evaluator: artifact + configuration to result
pub trait ScriptEvaluator: Send + Sync {
    fn evaluate(
        &self,
        artifact: &CompiledArtifact,
        config: &EvaluationConfig,
    ) -> Result<Reported<EvaluationResult>, Diagnostics>;
}

/// Resolves library coordinates to files to put on the classpath
pub trait CoordinateResolver: Send + Sync {
    /// `Ok(None)` means this resolver does not know the coordinates
    fn resolve(&self, coordinates: &str, repositories: &[String]) -> Result<Option<Vec<PathBuf>>>;
}

/// Supplies namespace wildcards for an import name (e.g. a plugin)
pub trait ImportSource: Send + Sync {
    /// `Ok(None)` means the name is unknown to this source
    fn namespaces(&self, name: &str) -> Result<Option<Vec<String>>>;
}

/// Call into an external service, turning a panic into a diagnostic
pub(crate) fn guarded<T>(
    service: &str,
    call: impl FnOnce() -> std::result::Result<T, Diagnostics>,
) -> std::result::Result<T, Diagnostics> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(Diagnostics::single(
            super::diagnostics::Diagnostic::error(format!("{} panicked", service)).caused_by(message),
        ))
    })
}
