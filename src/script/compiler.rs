//! Compilation driver
//!
//! Collects directives, refines the configuration, calls the external
//! compiler and, on success, writes the cache record before handing the
//! [`Script`] to the caller's continuation. A failed compilation never
//! touches the cache file.
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::artifact::CacheRecord;
use super::compiled::Script;
use super::configuration::CompilationConfig;
use super::dependencies::DependencyHandler;
use super::diagnostics::{Diagnostic, Diagnostics, Reported};
use super::directives::collect_directives;
use super::discovery::ScriptLayout;
use super::service::{guarded, ScriptCompiler, SourceScript};
use crate::logging::{operations, status};

#[derive(Error, Debug, Clone)]
pub enum CompileError {
    #[error("{id}: directive resolution failed: {diagnostics}")]
    Resolution { id: String, diagnostics: Diagnostics },

    #[error("{id}: compilation failed: {diagnostics}")]
    Compilation { id: String, diagnostics: Diagnostics },
}

impl CompileError {
    pub fn id(&self) -> &str {
        match self {
            CompileError::Resolution { id, .. } | CompileError::Compilation { id, .. } => id,
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        match self {
            CompileError::Resolution { diagnostics, .. }
            | CompileError::Compilation { diagnostics, .. } => diagnostics,
        }
    }
}

pub struct Compiler {
    service: Arc<dyn ScriptCompiler>,
    handler: Arc<DependencyHandler>,
}

impl Compiler {
    pub fn new(service: Arc<dyn ScriptCompiler>, handler: Arc<DependencyHandler>) -> Self {
        Self { service, handler }
    }

    pub fn handler(&self) -> &Arc<DependencyHandler> {
        &self.handler
    }

    /// Compile `source` and return the wrapped script
    pub fn compile(
        &self,
        base: &CompilationConfig,
        source: &SourceScript,
        cache_path: Option<&Path>,
        content_digest: &str,
    ) -> Result<Reported<Script>, CompileError> {
        self.compile_with(base, source, cache_path, content_digest, Ok)
    }

    /// Compile `source`, write the cache record when `cache_path` is given,
    /// then pass the script to `on_success`, whose result is returned
    pub fn compile_with<T, E, F>(
        &self,
        base: &CompilationConfig,
        source: &SourceScript,
        cache_path: Option<&Path>,
        content_digest: &str,
        on_success: F,
    ) -> Result<T, E>
    where
        F: FnOnce(Reported<Script>) -> Result<T, E>,
        E: From<CompileError>,
    {
        let id = ScriptLayout::script_id(&source.path);
        let start = Instant::now();

        let directives = collect_directives(&source.text).map_err(|e| CompileError::Resolution {
            id: id.clone(),
            diagnostics: Diagnostics::single(
                Diagnostic::error(e.to_string()).at(format!("{}:{}", source.location(), e.line())),
            ),
        })?;

        let config = self
            .handler
            .refine(base, &directives, source)
            .map_err(|diagnostics| CompileError::Resolution {
                id: id.clone(),
                diagnostics,
            })?;

        let compiled = guarded("compiler", || self.service.compile(source, &config)).map_err(
            |diagnostics| CompileError::Compilation {
                id: id.clone(),
                diagnostics,
            },
        )?;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            script = %id,
            operation = operations::COMPILE,
            status = status::SUCCESS,
            elapsed_ms,
            "compiled"
        );

        let Reported {
            value: artifact,
            mut reports,
        } = compiled;

        if let Some(path) = cache_path {
            let record = CacheRecord {
                content_digest: content_digest.to_string(),
                parameter_digest: config.parameter_signature(),
                parameter_count: config.parameters().count(),
                parameter_description: config.parameters().description(),
                artifact: artifact.bytes().clone(),
            };
            match record.save(path) {
                Ok(()) => debug!(
                    script = %id,
                    operation = operations::SAVE,
                    content_digest = %record.content_digest,
                    parameter_digest = %record.parameter_digest,
                    "cache record written"
                ),
                Err(e) => {
                    warn!(script = %id, error = %e, "failed to write cache record");
                    reports.push(Diagnostic::warning("Cache record not written").caused_by(e));
                }
            }
        }

        on_success(Reported::with_reports(Script::new(id, artifact), reports))
    }
}
