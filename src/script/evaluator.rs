//! Evaluation orchestrator
//!
//! Every request walks the same states:
//!
//! ```text
//! CheckRunning -> CheckCache -> (CacheHit | Compile) -> Register -> Done
//! ```
//!
//! The running check reserves the script id in the [`Registry`] before any
//! other work, so two requests for the same id can never both proceed. A cache
//! hit evaluates on the calling thread. Compilation runs on the bounded worker
//! pool unless the request asks for inline mode (bulk load at startup).
use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use super::artifact::ArtifactError;
use super::compiled::{CompiledScriptFile, Script};
use super::compiler::{CompileError, Compiler};
use super::configuration::CompilationConfig;
use super::dependencies::{CompoundResolver, DependencyHandler};
use super::diagnostics::{Diagnostic, Diagnostics, ReportFilter, Reported};
use super::digest::{digest_bytes, Algorithm};
use super::discovery::ScriptLayout;
use super::imports::ImportCache;
use super::notice::{Notice, NoticeSink, TracingSink};
use super::params::ScriptParameters;
use super::registry::{Container, Registry, RegistryError, ReleaseReport, Reservation};
use super::service::{
    CoordinateResolver, EvaluationResult, ImportSource, ScriptCompiler, ScriptEvaluator,
    SourceScript,
};
use crate::logging::{operations, status};

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("{id} is already running")]
    AlreadyRunning { id: String },

    #[error("{id} failed to compile: {diagnostics}")]
    CompileFailure { id: String, diagnostics: Diagnostics },

    #[error("{id} was compiled for {expected_count} parameter(s) ({description})")]
    ParameterSignatureMismatch {
        id: String,
        expected_count: u32,
        description: String,
    },

    #[error("unsupported artifact format version {0}")]
    UnsupportedArtifactVersion(u32),

    #[error("{id}: {diagnostics}")]
    ResolutionFailure { id: String, diagnostics: Diagnostics },

    #[error("script not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("{id} failed: {diagnostics}")]
    EvaluationFailure { id: String, diagnostics: Diagnostics },

    #[error("unreadable artifact: {0}")]
    Artifact(#[source] ArtifactError),

    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("script worker failed: {0}")]
    Worker(String),

    #[error("{0} is not running")]
    NotRunning(String),
}

impl EvalError {
    /// Outcomes the operator is expected to run into; not failures of the pipeline
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            EvalError::AlreadyRunning { .. } | EvalError::ParameterSignatureMismatch { .. }
        )
    }

    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            EvalError::CompileFailure { diagnostics, .. }
            | EvalError::ResolutionFailure { diagnostics, .. }
            | EvalError::EvaluationFailure { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }
}

impl From<ArtifactError> for EvalError {
    fn from(e: ArtifactError) -> Self {
        match e {
            ArtifactError::UnsupportedVersion(version) => {
                EvalError::UnsupportedArtifactVersion(version)
            }
            other => EvalError::Artifact(other),
        }
    }
}

impl From<CompileError> for EvalError {
    fn from(e: CompileError) -> Self {
        match e {
            CompileError::Resolution { id, diagnostics } => {
                EvalError::ResolutionFailure { id, diagnostics }
            }
            CompileError::Compilation { id, diagnostics } => {
                EvalError::CompileFailure { id, diagnostics }
            }
        }
    }
}

pub type EvalResult = Result<EvalReport, EvalError>;

/// Where the evaluated script came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    CacheHit,
    Compiled,
    /// A pre-compiled artifact file evaluated directly
    Artifact,
}

/// A successful evaluation
#[derive(Debug, Clone)]
pub struct EvalReport {
    pub id: String,
    pub origin: Origin,
    pub result: EvaluationResult,
    /// Every non-fatal diagnostic, before filtering
    pub reports: Vec<Diagnostic>,
    pub elapsed: Duration,
    pub container: Arc<Container>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileMode {
    /// Compile on the worker pool
    #[default]
    Background,
    /// Compile on the calling thread
    Inline,
}

/// One evaluation request
#[derive(Clone)]
pub struct EvalRequest {
    pub path: PathBuf,
    pub use_cache: bool,
    /// Progress notices (compiling, compiled, evaluated)
    pub logging: bool,
    /// Diagnostic reports
    pub report: bool,
    pub parameters: ScriptParameters,
    pub mode: CompileMode,
    pub sink: Arc<dyn NoticeSink>,
}

impl EvalRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            use_cache: true,
            logging: true,
            report: true,
            parameters: ScriptParameters::new(),
            mode: CompileMode::Background,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    pub fn report(mut self, report: bool) -> Self {
        self.report = report;
        self
    }

    pub fn parameters(mut self, parameters: ScriptParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn mode(mut self, mode: CompileMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn NoticeSink>) -> Self {
        self.sink = sink;
        self
    }

    fn progress(&self, notice: Notice) {
        if self.logging {
            self.sink.notify(notice);
        }
    }
}

impl fmt::Debug for EvalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalRequest")
            .field("path", &self.path)
            .field("use_cache", &self.use_cache)
            .field("logging", &self.logging)
            .field("report", &self.report)
            .field("parameters", &self.parameters)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Completes when the evaluation finishes, whichever thread did the work
pub struct EvalHandle {
    state: HandleState,
}

enum HandleState {
    Ready(Option<EvalResult>),
    Pending(JoinHandle<Result<EvalResult, JoinError>>),
}

impl EvalHandle {
    pub fn ready(result: EvalResult) -> Self {
        Self {
            state: HandleState::Ready(Some(result)),
        }
    }

    fn pending(handle: JoinHandle<Result<EvalResult, JoinError>>) -> Self {
        Self {
            state: HandleState::Pending(handle),
        }
    }

    /// True when the result is available without waiting
    pub fn is_ready(&self) -> bool {
        match &self.state {
            HandleState::Ready(_) => true,
            HandleState::Pending(handle) => handle.is_finished(),
        }
    }
}

impl Future for EvalHandle {
    type Output = EvalResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            HandleState::Ready(result) => Poll::Ready(
                result
                    .take()
                    .unwrap_or_else(|| Err(EvalError::Worker("result already taken".into()))),
            ),
            HandleState::Pending(handle) => match Pin::new(handle).poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Ok(Ok(result))) => Poll::Ready(result),
                Poll::Ready(Ok(Err(e)) | Err(e)) => {
                    Poll::Ready(Err(EvalError::Worker(e.to_string())))
                }
            },
        }
    }
}

/// Bounded pool for compile jobs
struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Run `job` on a blocking thread once a permit is free
    ///
    /// Outside a tokio runtime the job runs on the calling thread.
    fn spawn<F>(&self, job: F) -> EvalHandle
    where
        F: FnOnce() -> EvalResult + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no async runtime, compiling inline");
            return EvalHandle::ready(job());
        };

        let permits = Arc::clone(&self.permits);
        EvalHandle::pending(runtime.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            tokio::task::spawn_blocking(job).await
        }))
    }
}

enum CacheCheck {
    Hit(CompiledScriptFile),
    Mismatch { expected_count: u32, description: String },
    Stale,
}

struct EmptyImports;

impl ImportSource for EmptyImports {
    fn namespaces(&self, _name: &str) -> anyhow::Result<Option<Vec<String>>> {
        Ok(None)
    }
}

/// Settings shared by every compilation
#[derive(Debug, Clone)]
struct BaseSettings {
    classpath: Vec<PathBuf>,
    compiler_options: Vec<String>,
    digest_algorithm: Algorithm,
}

pub struct Evaluator {
    layout: ScriptLayout,
    registry: Registry,
    compiler: Compiler,
    evaluator: Arc<dyn ScriptEvaluator>,
    imports: Arc<ImportCache>,
    base: BaseSettings,
    filter: ReportFilter,
    cache_enabled: bool,
    pool: WorkerPool,
}

impl Evaluator {
    pub fn builder(
        layout: ScriptLayout,
        compiler: Arc<dyn ScriptCompiler>,
        evaluator: Arc<dyn ScriptEvaluator>,
    ) -> EvaluatorBuilder {
        EvaluatorBuilder {
            layout,
            compiler,
            evaluator,
            resolver: CompoundResolver::new(),
            import_source: Arc::new(EmptyImports),
            imports: Arc::new(ImportCache::in_memory()),
            registry: Registry::new(),
            repositories: Vec::new(),
            base: BaseSettings {
                classpath: Vec::new(),
                compiler_options: Vec::new(),
                digest_algorithm: Algorithm::default(),
            },
            filter: ReportFilter::default(),
            cache_enabled: true,
            compile_workers: num_cpus::get(),
        }
    }

    pub fn layout(&self) -> &ScriptLayout {
        &self.layout
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn imports(&self) -> &Arc<ImportCache> {
        &self.imports
    }

    pub fn find_scripts(&self) -> Vec<PathBuf> {
        self.layout.find_scripts().into_iter().collect()
    }

    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        self.layout.locate(name)
    }

    pub fn list_active(&self) -> Vec<String> {
        self.registry.list_active()
    }

    /// Configuration every compilation starts from
    pub fn base_config(&self, parameters: ScriptParameters) -> CompilationConfig {
        CompilationConfig::builder(parameters)
            .classpath(self.base.classpath.iter().cloned())
            .default_imports(self.imports.global())
            .compiler_options(self.base.compiler_options.iter().cloned())
            .digest_algorithm(self.base.digest_algorithm)
            .build()
    }

    /// Evaluate a source script or a pre-compiled artifact
    pub fn eval(self: &Arc<Self>, request: EvalRequest) -> EvalHandle {
        let id = ScriptLayout::script_id(&request.path);
        let start = Instant::now();

        let reservation = match self.registry.reserve(&id) {
            Ok(reservation) => reservation,
            Err(_) => {
                debug!(
                    script = %id,
                    operation = operations::EVAL,
                    status = status::REJECTED,
                    "already running"
                );
                request.sink.notify(Notice::AlreadyRunning { id: id.clone() });
                return EvalHandle::ready(Err(EvalError::AlreadyRunning { id }));
            }
        };

        let recognized =
            self.layout.is_source(&request.path) || self.layout.is_artifact(&request.path);
        if !recognized || !request.path.is_file() {
            return EvalHandle::ready(Err(EvalError::SourceNotFound(request.path)));
        }

        if self.layout.is_artifact(&request.path) {
            return EvalHandle::ready(self.eval_artifact(reservation, &request, start));
        }

        let source = match SourceScript::read(&request.path) {
            Ok(source) => source,
            Err(e) => {
                return EvalHandle::ready(Err(EvalError::Io {
                    action: "read",
                    path: request.path,
                    source: e,
                }))
            }
        };

        let base = self.base_config(request.parameters.clone());
        let content_digest = digest_bytes(source.text.as_bytes(), base.digest_algorithm());
        let cache_path = self.cache_enabled.then(|| self.layout.cache_path(&id));

        if let Some(path) = cache_path.as_deref().filter(|p| request.use_cache && p.is_file()) {
            match self.check_cache(&id, path, &content_digest, &base) {
                CacheCheck::Hit(file) => {
                    return EvalHandle::ready(self.finish(
                        reservation,
                        file.into_script(),
                        Origin::CacheHit,
                        Vec::new(),
                        &request,
                        start,
                    ));
                }
                CacheCheck::Mismatch {
                    expected_count,
                    description,
                } => {
                    return EvalHandle::ready(Err(self.parameter_mismatch(
                        id,
                        expected_count,
                        description,
                        &request,
                    )));
                }
                CacheCheck::Stale => {}
            }
        }

        let mode = request.mode;
        let this = Arc::clone(self);
        let job = move || {
            this.compile_and_evaluate(
                reservation,
                request,
                source,
                base,
                content_digest,
                cache_path,
                start,
            )
        };

        match mode {
            CompileMode::Inline => EvalHandle::ready(job()),
            CompileMode::Background => self.pool.spawn(job),
        }
    }

    /// Compile a source script and write its cache record without evaluating it
    pub fn compile(
        &self,
        path: &Path,
        parameters: ScriptParameters,
        sink: &dyn NoticeSink,
    ) -> Result<Reported<Script>, EvalError> {
        if !path.is_file() || !self.layout.is_source(path) {
            return Err(EvalError::SourceNotFound(path.to_path_buf()));
        }
        let source = SourceScript::read(path).map_err(|e| EvalError::Io {
            action: "read",
            path: path.to_path_buf(),
            source: e,
        })?;

        let id = ScriptLayout::script_id(path);
        let start = Instant::now();
        let base = self.base_config(parameters);
        let content_digest = digest_bytes(source.text.as_bytes(), base.digest_algorithm());
        let cache_path = self.cache_enabled.then(|| self.layout.cache_path(&id));

        sink.notify(Notice::Compiling { id: id.clone() });
        match self
            .compiler
            .compile(&base, &source, cache_path.as_deref(), &content_digest)
        {
            Ok(compiled) => {
                sink.notify(Notice::Compiled {
                    id: id.clone(),
                    elapsed: start.elapsed(),
                });
                self.report_to(sink, &id, &compiled.reports);
                Ok(compiled)
            }
            Err(e) => {
                self.report_to(sink, &id, &e.diagnostics().0);
                Err(e.into())
            }
        }
    }

    /// Recompile, then replace the live instance
    ///
    /// The running instance is only released once the new source compiled.
    /// Without a cache record to pick up, the freshly compiled script is
    /// evaluated directly.
    pub fn reload(self: &Arc<Self>, request: EvalRequest) -> EvalHandle {
        let id = ScriptLayout::script_id(&request.path);
        let start = Instant::now();

        let mut recompiled = None;
        if self.layout.is_source(&request.path) {
            match self.compile(
                &request.path,
                request.parameters.clone(),
                request.sink.as_ref(),
            ) {
                Ok(compiled) => recompiled = Some(compiled.value),
                Err(e) => return EvalHandle::ready(Err(e)),
            }
        }

        match self.release(&id, request.sink.as_ref()) {
            Ok(_) | Err(EvalError::NotRunning(_)) => {}
            Err(e) => return EvalHandle::ready(Err(e)),
        }

        match recompiled {
            Some(script) if !self.cache_enabled || !request.use_cache => {
                let reservation = match self.registry.reserve(&id) {
                    Ok(reservation) => reservation,
                    Err(_) => {
                        request.sink.notify(Notice::AlreadyRunning { id: id.clone() });
                        return EvalHandle::ready(Err(EvalError::AlreadyRunning { id }));
                    }
                };
                // Reports were already delivered by compile()
                EvalHandle::ready(self.finish(
                    reservation,
                    script,
                    Origin::Compiled,
                    Vec::new(),
                    &request,
                    start,
                ))
            }
            _ => self.eval(request),
        }
    }

    /// Release the live instance for `id`
    pub fn release(&self, id: &str, sink: &dyn NoticeSink) -> Result<ReleaseReport, EvalError> {
        match self.registry.release(id) {
            Ok(report) => {
                info!(
                    script = %id,
                    operation = operations::RELEASE,
                    status = if report.is_clean() { status::SUCCESS } else { status::ERROR },
                    released = report.released,
                    failures = report.failures.len(),
                    "released"
                );
                sink.notify(Notice::Released {
                    id: id.to_string(),
                    failures: report.failures.len(),
                });
                Ok(report)
            }
            Err(RegistryError::NotRunning(id)) | Err(RegistryError::Starting(id)) => {
                Err(EvalError::NotRunning(id))
            }
            Err(RegistryError::AlreadyRunning(id)) => Err(EvalError::AlreadyRunning { id }),
        }
    }

    /// Release every live instance
    pub fn shutdown(&self, sink: &dyn NoticeSink) -> Vec<ReleaseReport> {
        let reports = self.registry.shutdown();
        for report in &reports {
            sink.notify(Notice::Released {
                id: report.id.clone(),
                failures: report.failures.len(),
            });
        }
        info!(released = reports.len(), "all scripts released");
        reports
    }

    /// Evaluate every discoverable script, compiling inline
    ///
    /// Runs with progress notices off; diagnostics still reach `sink`.
    pub fn load_all(
        self: &Arc<Self>,
        sink: Arc<dyn NoticeSink>,
    ) -> io::Result<Vec<(PathBuf, EvalHandle)>> {
        self.layout.ensure()?;
        let scripts = self.find_scripts();
        info!(count = scripts.len(), root = %self.layout.root.display(), "loading scripts");

        Ok(scripts
            .into_iter()
            .map(|path| {
                let request = EvalRequest::new(&path)
                    .logging(false)
                    .mode(CompileMode::Inline)
                    .sink(Arc::clone(&sink));
                (path, self.eval(request))
            })
            .collect())
    }

    fn check_cache(
        &self,
        id: &str,
        path: &Path,
        content_digest: &str,
        base: &CompilationConfig,
    ) -> CacheCheck {
        let file = match CompiledScriptFile::load_from_cache(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(
                    script = %id,
                    operation = operations::LOAD,
                    status = status::ERROR,
                    error = %e,
                    "cache record unusable, recompiling"
                );
                return CacheCheck::Stale;
            }
        };

        if file.content_digest() != content_digest {
            debug!(
                script = %id,
                operation = operations::LOAD,
                status = status::STALE,
                content_digest = %content_digest,
                "source changed since last compile"
            );
            return CacheCheck::Stale;
        }

        if file.parameter_digest() != base.parameter_signature() {
            return CacheCheck::Mismatch {
                expected_count: file.parameter_count(),
                description: file.parameter_description().to_string(),
            };
        }

        debug!(
            script = %id,
            operation = operations::LOAD,
            status = status::HIT,
            content_digest = %content_digest,
            parameter_digest = %file.parameter_digest(),
            "cache hit"
        );
        CacheCheck::Hit(file)
    }

    fn eval_artifact(
        &self,
        reservation: Reservation,
        request: &EvalRequest,
        start: Instant,
    ) -> EvalResult {
        let file = CompiledScriptFile::load_from_cache(&request.path)?;
        let signature = self
            .base_config(request.parameters.clone())
            .parameter_signature();

        if file.parameter_digest() != signature {
            return Err(self.parameter_mismatch(
                reservation.id().to_string(),
                file.parameter_count(),
                file.parameter_description().to_string(),
                request,
            ));
        }

        self.finish(
            reservation,
            file.into_script(),
            Origin::Artifact,
            Vec::new(),
            request,
            start,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_and_evaluate(
        &self,
        reservation: Reservation,
        request: EvalRequest,
        source: SourceScript,
        base: CompilationConfig,
        content_digest: String,
        cache_path: Option<PathBuf>,
        start: Instant,
    ) -> EvalResult {
        let id = reservation.id().to_string();
        request.progress(Notice::Compiling { id: id.clone() });

        let result = self.compiler.compile_with(
            &base,
            &source,
            cache_path.as_deref(),
            &content_digest,
            |compiled| {
                request.progress(Notice::Compiled {
                    id: id.clone(),
                    elapsed: start.elapsed(),
                });
                self.finish(
                    reservation,
                    compiled.value,
                    Origin::Compiled,
                    compiled.reports,
                    &request,
                    start,
                )
            },
        );

        if let Err(e) = &result {
            if let EvalError::CompileFailure { diagnostics, .. }
            | EvalError::ResolutionFailure { diagnostics, .. } = e
            {
                warn!(
                    script = %id,
                    operation = operations::COMPILE,
                    status = status::ERROR,
                    "{}", e
                );
                self.report(&id, &diagnostics.0, &request);
            }
        }
        result
    }

    /// Evaluate `script` and register the resulting instance
    fn finish(
        &self,
        reservation: Reservation,
        script: Script,
        origin: Origin,
        mut reports: Vec<Diagnostic>,
        request: &EvalRequest,
        start: Instant,
    ) -> EvalResult {
        let id = reservation.id().to_string();

        let evaluation = match script.evaluate(self.evaluator.as_ref(), &request.parameters) {
            Ok(evaluation) => evaluation,
            Err(diagnostics) => {
                warn!(
                    script = %id,
                    operation = operations::EVAL,
                    status = status::ERROR,
                    "{}", diagnostics
                );
                self.report(&id, &reports, request);
                self.report(&id, &diagnostics.0, request);
                return Err(EvalError::EvaluationFailure { id, diagnostics });
            }
        };

        reports.extend(evaluation.result.reports);
        self.report(&id, &reports, request);

        let container = reservation.commit(Arc::new(script), evaluation.scope);
        request.progress(Notice::Evaluated { id: id.clone() });

        let elapsed = start.elapsed();
        info!(
            script = %id,
            operation = operations::EVAL,
            status = status::SUCCESS,
            origin = ?origin,
            elapsed_ms = elapsed.as_millis() as u64,
            "evaluated"
        );

        Ok(EvalReport {
            id,
            origin,
            result: evaluation.result.value,
            reports,
            elapsed,
            container,
        })
    }

    fn parameter_mismatch(
        &self,
        id: String,
        expected_count: u32,
        description: String,
        request: &EvalRequest,
    ) -> EvalError {
        warn!(
            script = %id,
            operation = operations::LOAD,
            status = status::MISMATCH,
            expected_count,
            description = %description,
            "parameter signature changed"
        );
        request.sink.notify(Notice::ParameterMismatch {
            id: id.clone(),
            expected_count,
            description: description.clone(),
        });
        EvalError::ParameterSignatureMismatch {
            id,
            expected_count,
            description,
        }
    }

    fn report(&self, id: &str, diagnostics: &[Diagnostic], request: &EvalRequest) {
        if request.report {
            self.report_to(request.sink.as_ref(), id, diagnostics);
        }
    }

    fn report_to(&self, sink: &dyn NoticeSink, id: &str, diagnostics: &[Diagnostic]) {
        for diagnostic in self.filter.apply(diagnostics) {
            sink.notify(Notice::Report {
                id: id.to_string(),
                message: diagnostic.to_string(),
            });
        }
    }
}

pub struct EvaluatorBuilder {
    layout: ScriptLayout,
    compiler: Arc<dyn ScriptCompiler>,
    evaluator: Arc<dyn ScriptEvaluator>,
    resolver: CompoundResolver,
    import_source: Arc<dyn ImportSource>,
    imports: Arc<ImportCache>,
    registry: Registry,
    repositories: Vec<String>,
    base: BaseSettings,
    filter: ReportFilter,
    cache_enabled: bool,
    compile_workers: usize,
}

impl EvaluatorBuilder {
    /// Add a coordinate resolver; resolvers are tried in the order added
    pub fn resolver(mut self, resolver: Arc<dyn CoordinateResolver>) -> Self {
        self.resolver = self.resolver.with(resolver);
        self
    }

    pub fn import_source(mut self, source: Arc<dyn ImportSource>) -> Self {
        self.import_source = source;
        self
    }

    pub fn imports(mut self, imports: Arc<ImportCache>) -> Self {
        self.imports = imports;
        self
    }

    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn repositories(mut self, repositories: Vec<String>) -> Self {
        self.repositories = repositories;
        self
    }

    pub fn classpath(mut self, classpath: Vec<PathBuf>) -> Self {
        self.base.classpath = classpath;
        self
    }

    pub fn compiler_options(mut self, options: Vec<String>) -> Self {
        self.base.compiler_options = options;
        self
    }

    pub fn digest_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.base.digest_algorithm = algorithm;
        self
    }

    pub fn report_filter(mut self, filter: ReportFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn compile_workers(mut self, workers: usize) -> Self {
        self.compile_workers = workers;
        self
    }

    pub fn build(self) -> Arc<Evaluator> {
        let handler = DependencyHandler::new(
            self.layout.clone(),
            Arc::new(self.resolver),
            Arc::clone(&self.imports),
            self.import_source,
        )
        .with_repositories(self.repositories);

        Arc::new(Evaluator {
            layout: self.layout,
            registry: self.registry,
            compiler: Compiler::new(self.compiler, Arc::new(handler)),
            evaluator: self.evaluator,
            imports: self.imports,
            base: self.base,
            filter: self.filter,
            cache_enabled: self.cache_enabled,
            pool: WorkerPool::new(self.compile_workers),
        })
    }
}
