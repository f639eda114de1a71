//! Concrete services backing the script pipeline
//!
//! The compiler and evaluator are external commands from `[backend]`,
//! library coordinates resolve against local repository layouts and import
//! names come from the `[imports]` table.
pub mod imports;
pub mod process;
pub mod resolver;

pub use imports::StaticImportSource;
pub use process::{CommandCompiler, CommandEvaluator};
pub use resolver::FileSystemResolver;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::KitConfig;
use crate::script::evaluator::Evaluator;
use crate::script::imports::ImportCache;

/// Wire an evaluator from configuration
///
/// Creates the script directories and exports the global import listing.
pub fn build_evaluator(config: &KitConfig) -> Result<Arc<Evaluator>> {
    let layout = config.layout();
    layout
        .ensure()
        .with_context(|| format!("Failed to prepare script root {}", layout.root.display()))?;

    let imports = ImportCache::with_out_dir(config.out_dir());
    imports.init(
        &config.compiler.default_imports,
        config.compiler.default_imports_file.as_deref(),
    )?;

    let timeout = config.timeout()?;
    let compiler = CommandCompiler::new(config.backend.compile_command.clone(), timeout);
    let evaluator = CommandEvaluator::new(config.backend.evaluate_command.clone(), timeout);

    Ok(Evaluator::builder(layout, Arc::new(compiler), Arc::new(evaluator))
        .resolver(Arc::new(FileSystemResolver::new()))
        .import_source(Arc::new(StaticImportSource::new(config.imports.clone())))
        .imports(Arc::new(imports))
        .repositories(config.backend.repositories.clone())
        .classpath(config.compiler.classpath.clone())
        .compiler_options(config.compiler.compiler_options.clone())
        .digest_algorithm(config.digest_algorithm()?)
        .report_filter(config.report_filter()?)
        .cache(config.scripts.cache)
        .compile_workers(config.runtime.compile_workers)
        .build())
}
