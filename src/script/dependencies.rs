/// Directive handling for script compilation
///
/// Folds the directives collected from a source into a refined
/// [`CompilationConfig`]: library coordinates become classpath entries,
/// includes become imported sources, imports become default imports and
/// compiler options are appended. Every failure is collected; one bad
/// directive does not hide the others.
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::configuration::CompilationConfig;
use super::diagnostics::{Diagnostic, Diagnostics};
use super::directives::{Directive, SourceDirective};
use super::discovery::ScriptLayout;
use super::imports::ImportCache;
use super::service::{CoordinateResolver, ImportSource, SourceScript};

/// Tries each resolver in order; the first that knows the coordinates wins
#[derive(Clone, Default)]
pub struct CompoundResolver {
    resolvers: Vec<Arc<dyn CoordinateResolver>>,
}

impl CompoundResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resolver: Arc<dyn CoordinateResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

impl CoordinateResolver for CompoundResolver {
    fn resolve(&self, coordinates: &str, repositories: &[String]) -> Result<Option<Vec<PathBuf>>> {
        for resolver in &self.resolvers {
            if let Some(files) = resolver.resolve(coordinates, repositories)? {
                return Ok(Some(files));
            }
        }
        Ok(None)
    }
}

/// Applies source directives to a base compilation configuration
pub struct DependencyHandler {
    layout: ScriptLayout,
    resolver: Arc<dyn CoordinateResolver>,
    imports: Arc<ImportCache>,
    import_source: Arc<dyn ImportSource>,
    repositories: Vec<String>,
}

impl DependencyHandler {
    pub fn new(
        layout: ScriptLayout,
        resolver: Arc<dyn CoordinateResolver>,
        imports: Arc<ImportCache>,
        import_source: Arc<dyn ImportSource>,
    ) -> Self {
        Self {
            layout,
            resolver,
            imports,
            import_source,
            repositories: Vec::new(),
        }
    }

    /// Repositories searched for every script, before its own `repository` directives
    pub fn with_repositories(mut self, repositories: Vec<String>) -> Self {
        self.repositories = repositories;
        self
    }

    pub fn layout(&self) -> &ScriptLayout {
        &self.layout
    }

    pub fn imports(&self) -> &Arc<ImportCache> {
        &self.imports
    }

    /// Produce a new configuration with every directive applied
    ///
    /// `base` is left untouched. Any failure yields the full diagnostic batch.
    pub fn refine(
        &self,
        base: &CompilationConfig,
        directives: &[SourceDirective],
        source: &SourceScript,
    ) -> Result<CompilationConfig, Diagnostics> {
        if directives.is_empty() {
            return Ok(base.clone());
        }

        let mut repositories = self.repositories.clone();
        for d in directives {
            if let Directive::Repository(repos) = &d.directive {
                repositories.extend(repos.iter().cloned());
            }
        }

        let mut classpath = Vec::new();
        let mut sources = Vec::new();
        let mut imports = Vec::new();
        let mut options = Vec::new();
        let mut failures = Vec::new();

        for d in directives {
            let location = format!("{}:{}", source.location(), d.line);
            match &d.directive {
                Directive::ExternalLibrary(coordinates) => {
                    for coordinate in coordinates {
                        match self.resolver.resolve(coordinate, &repositories) {
                            Ok(Some(files)) => classpath.extend(files),
                            Ok(None) => failures.push(unresolved(coordinate, &repositories, &location)),
                            Err(e) => failures.push(
                                Diagnostic::error(format!("Failed to resolve {}", coordinate))
                                    .at(&location)
                                    .caused_by(format!("{:#}", e)),
                            ),
                        }
                    }
                }
                Directive::Repository(_) => {}
                Directive::Include(references) => {
                    for reference in references {
                        let found: Vec<PathBuf> = self
                            .layout
                            .find_include(reference)
                            .into_iter()
                            .filter(|p| p != &source.path)
                            .collect();
                        if found.is_empty() {
                            failures.push(
                                Diagnostic::error(format!("Include not found: {}", reference))
                                    .at(&location),
                            );
                        }
                        sources.extend(found);
                    }
                }
                Directive::Import(references) => {
                    for reference in references {
                        match self.imports.lookup(reference, self.import_source.as_ref()) {
                            Ok(Some(wildcards)) => imports.extend(wildcards),
                            Ok(None) => failures.push(
                                Diagnostic::error(format!("Unknown import: {}", reference))
                                    .at(&location),
                            ),
                            Err(e) => failures.push(
                                Diagnostic::error(format!("Failed to import {}", reference))
                                    .at(&location)
                                    .caused_by(format!("{:#}", e)),
                            ),
                        }
                    }
                }
                Directive::CompilerOption(values) => options.extend(values.iter().cloned()),
            }
        }

        if !failures.is_empty() {
            return Err(failures.into());
        }

        debug!(
            script = %source.location(),
            classpath = classpath.len(),
            includes = sources.len(),
            imports = imports.len(),
            options = options.len(),
            "directives applied"
        );

        Ok(base
            .to_builder()
            .classpath(classpath)
            .imported_sources(sources)
            .default_imports(imports)
            .compiler_options(options)
            .build())
    }
}

/// Diagnostic for a coordinate no resolver produced files for
///
/// Lists the remote repositories that were configured, since none of the
/// registered resolvers fetched from them.
fn unresolved(coordinate: &str, repositories: &[String], location: &str) -> Diagnostic {
    let diagnostic =
        Diagnostic::error(format!("Unresolved dependency: {}", coordinate)).at(location);
    let remote: Vec<&str> = repositories
        .iter()
        .map(String::as_str)
        .filter(|r| r.starts_with("http://") || r.starts_with("https://"))
        .collect();
    if remote.is_empty() {
        diagnostic
    } else {
        diagnostic.caused_by(format!(
            "not found locally; remote repositories were not searched: {}",
            remote.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::directives::collect_directives;
    use crate::script::params::ScriptParameters;
    use std::fs;
    use tempfile::TempDir;

    struct MapResolver;

    impl CoordinateResolver for MapResolver {
        fn resolve(&self, coordinates: &str, repositories: &[String]) -> Result<Option<Vec<PathBuf>>> {
            match coordinates {
                "org.example:util:1.0" => Ok(Some(vec![PathBuf::from("/repo/util-1.0.jar")])),
                "org.example:remote:1.0" if repositories.iter().any(|r| r == "/extra") => {
                    Ok(Some(vec![PathBuf::from("/extra/remote-1.0.jar")]))
                }
                "org.example:broken:1.0" => anyhow::bail!("checksum mismatch"),
                _ => Ok(None),
            }
        }
    }

    struct StaticImports;

    impl ImportSource for StaticImports {
        fn namespaces(&self, name: &str) -> Result<Option<Vec<String>>> {
            Ok((name == "Economy").then(|| vec!["org.economy.api".to_string()]))
        }
    }

    fn handler(root: &std::path::Path) -> DependencyHandler {
        DependencyHandler::new(
            ScriptLayout::with_root(root),
            Arc::new(CompoundResolver::new().with(Arc::new(MapResolver))),
            Arc::new(ImportCache::in_memory()),
            Arc::new(StaticImports),
        )
    }

    fn source(root: &std::path::Path, text: &str) -> SourceScript {
        SourceScript {
            path: root.join("main.kts"),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_refine_applies_every_directive() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("lib")).unwrap();
        fs::write(temp.path().join("lib/common.kts"), "val x = 1").unwrap();

        let text = r#"//KIT depends-on "org.example:util:1.0" "org.example:remote:1.0"
//KIT repository "/extra"
//KIT include "common"
//KIT import "Economy:org.economy.events"
//KIT compiler-options "-Xopt"
"#;
        let src = source(temp.path(), text);
        let directives = collect_directives(text).unwrap();
        let base = CompilationConfig::builder(ScriptParameters::new())
            .default_imports(vec!["kit.api.*".to_string()])
            .build();

        let refined = handler(temp.path()).refine(&base, &directives, &src).unwrap();

        assert_eq!(
            refined.classpath(),
            [
                PathBuf::from("/repo/util-1.0.jar"),
                PathBuf::from("/extra/remote-1.0.jar")
            ]
        );
        assert_eq!(refined.imported_sources().len(), 1);
        assert_eq!(
            refined.default_imports(),
            ["kit.api.*", "org.economy.api.*", "org.economy.events.*"]
        );
        assert_eq!(refined.compiler_options(), ["-Xopt"]);
        assert!(base.classpath().is_empty());
    }

    #[test]
    fn test_failures_are_collected_not_dropped() {
        let temp = TempDir::new().unwrap();
        let text = r#"//KIT depends-on "org.example:missing:1.0" "org.example:broken:1.0"
//KIT include "nowhere"
//KIT import "Ghost"
"#;
        let src = source(temp.path(), text);
        let directives = collect_directives(text).unwrap();
        let base = CompilationConfig::builder(ScriptParameters::new()).build();

        let err = handler(temp.path()).refine(&base, &directives, &src).unwrap_err();
        let messages: Vec<String> = err.iter().map(|d| d.to_string()).collect();

        assert_eq!(messages.len(), 4);
        assert!(messages[0].contains("main.kts:1: Unresolved dependency: org.example:missing:1.0"));
        assert!(messages[1].contains("checksum mismatch"));
        assert!(messages[2].contains("main.kts:2: Include not found: nowhere"));
        assert!(messages[3].contains("Unknown import: Ghost"));
    }

    #[test]
    fn test_unresolved_names_unsearched_remote_repositories() {
        let temp = TempDir::new().unwrap();
        let text = r#"//KIT repository "https://repo.example.org/maven2"
//KIT depends-on "org.example:missing:1.0"
"#;
        let src = source(temp.path(), text);
        let directives = collect_directives(text).unwrap();
        let base = CompilationConfig::builder(ScriptParameters::new()).build();

        let err = handler(temp.path()).refine(&base, &directives, &src).unwrap_err();
        let messages: Vec<String> = err.iter().map(|d| d.to_string()).collect();

        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("main.kts:2: Unresolved dependency: org.example:missing:1.0"));
        assert!(messages[0].contains("remote repositories were not searched: https://repo.example.org/maven2"));
    }

    #[test]
    fn test_no_directives_returns_base() {
        let temp = TempDir::new().unwrap();
        let base = CompilationConfig::builder(ScriptParameters::new()).build();
        let refined = handler(temp.path())
            .refine(&base, &[], &source(temp.path(), "println(1)"))
            .unwrap();
        assert_eq!(refined, base);
    }

    #[test]
    fn test_compound_resolver_order() {
        struct Fixed(&'static str);
        impl CoordinateResolver for Fixed {
            fn resolve(&self, _: &str, _: &[String]) -> Result<Option<Vec<PathBuf>>> {
                Ok(Some(vec![PathBuf::from(self.0)]))
            }
        }

        let resolver = CompoundResolver::new()
            .with(Arc::new(MapResolver))
            .with(Arc::new(Fixed("/fallback.jar")))
            .with(Arc::new(Fixed("/never.jar")));

        assert_eq!(
            resolver.resolve("org.example:util:1.0", &[]).unwrap(),
            Some(vec![PathBuf::from("/repo/util-1.0.jar")])
        );
        assert_eq!(
            resolver.resolve("any:thing:1", &[]).unwrap(),
            Some(vec![PathBuf::from("/fallback.jar")])
        );
    }
}
