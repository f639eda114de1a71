/// Script compile, cache and evaluate pipeline
///
/// Sources are compiled once through an external compiler service, cached as
/// versioned records under the build directory and re-evaluated from the cache
/// until the source text changes. Live instances are tracked by the
/// [`registry::Registry`] so they can be released deterministically.
pub mod artifact;
pub mod compiled;
pub mod compiler;
pub mod configuration;
pub mod dependencies;
pub mod diagnostics;
pub mod digest;
pub mod directives;
pub mod discovery;
pub mod evaluator;
pub mod imports;
pub mod notice;
pub mod params;
pub mod registry;
pub mod service;

pub use artifact::{ArtifactError, CacheRecord, FORMAT_VERSION};
pub use compiled::{CompiledScriptFile, Script};
pub use compiler::{CompileError, Compiler};
pub use configuration::{CompilationConfig, EvaluationConfig};
pub use diagnostics::{Diagnostic, Diagnostics, ReportFilter, Reported, Severity};
pub use discovery::ScriptLayout;
pub use evaluator::{
    CompileMode, EvalError, EvalHandle, EvalReport, EvalRequest, EvalResult, Evaluator, Origin,
};
pub use imports::ImportCache;
pub use notice::{CollectingSink, ConsoleSink, Notice, NoticeSink, TracingSink};
pub use params::{ParamValue, ScriptParameters};
pub use registry::{Container, Registry, ReleaseReport, ResourceScope};
pub use service::{
    CompiledArtifact, CoordinateResolver, EvaluationResult, ImportSource, ReturnValue,
    ScriptCompiler, ScriptEvaluator, SourceScript,
};
