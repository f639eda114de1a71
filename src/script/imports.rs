//! Import namespace cache
//!
//! Import references resolve to namespace wildcards (`org.economy.api.*`).
//! Results are kept in memory and exported to `<out>/<name>.imports`, one
//! wildcard per line, so a later process can skip the import source entirely.
//! The global imports every script receives are exported to
//! `<out>/default.imports` by [`ImportCache::init`].
use anyhow::{Context, Result};
use dashmap::DashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

use super::service::ImportSource;

const DEFAULT_LISTING: &str = "default";
const LISTING_EXTENSION: &str = "imports";

/// A parsed import reference: `name` or `name:ns.a,ns.b`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReference {
    pub name: String,
    pub extra: Vec<String>,
}

impl ImportReference {
    pub fn parse(reference: &str) -> Self {
        match reference.split_once(':') {
            Some((name, rest)) => Self {
                name: name.trim().to_string(),
                extra: rest
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            },
            None => Self {
                name: reference.trim().to_string(),
                extra: Vec::new(),
            },
        }
    }
}

/// Turn a namespace into an import wildcard
pub fn wildcard(namespace: &str) -> String {
    if namespace.ends_with('*') {
        namespace.to_string()
    } else {
        format!("{}.*", namespace.trim_end_matches('.'))
    }
}

/// Shared cache of resolved imports plus the global import list
#[derive(Debug, Default)]
pub struct ImportCache {
    resolved: DashMap<String, Vec<String>>,
    global: RwLock<Vec<String>>,
    out_dir: Option<PathBuf>,
}

impl ImportCache {
    /// Cache that only lives in memory
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Cache exporting listings to `out_dir`
    pub fn with_out_dir(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: Some(out_dir.into()),
            ..Self::default()
        }
    }

    /// Reset the global imports from configured defaults and an optional file
    ///
    /// The file holds one import per line; blank lines and `#` comments are
    /// skipped.
    pub fn init(&self, defaults: &[String], file: Option<&Path>) -> Result<()> {
        let mut imports: Vec<String> = Vec::new();
        let from_file = match file {
            Some(path) => read_listing(path)
                .with_context(|| format!("Failed to read default imports: {}", path.display()))?,
            None => Vec::new(),
        };

        for import in defaults.iter().cloned().chain(from_file) {
            if !imports.contains(&import) {
                imports.push(import);
            }
        }

        self.export(DEFAULT_LISTING, &imports)?;
        debug!(count = imports.len(), "global imports initialized");
        *self.global.write().unwrap_or_else(|p| p.into_inner()) = imports;
        Ok(())
    }

    /// Snapshot of the global imports
    pub fn global(&self) -> Vec<String> {
        self.global.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Resolve an import reference to wildcards
    ///
    /// Looks in memory, then the exported listing, then asks `source`.
    /// `Ok(None)` means nobody knows the name.
    pub fn lookup(&self, reference: &str, source: &dyn ImportSource) -> Result<Option<Vec<String>>> {
        let parsed = ImportReference::parse(reference);
        if parsed.name.is_empty() {
            return Ok(None);
        }

        let Some(mut wildcards) = self.lookup_name(&parsed.name, source)? else {
            return Ok(None);
        };

        for extra in &parsed.extra {
            let extra = wildcard(extra);
            if !wildcards.contains(&extra) {
                wildcards.push(extra);
            }
        }
        Ok(Some(wildcards))
    }

    fn lookup_name(&self, name: &str, source: &dyn ImportSource) -> Result<Option<Vec<String>>> {
        if let Some(cached) = self.resolved.get(name) {
            debug!(import = %name, "import cache hit (memory)");
            return Ok(Some(cached.clone()));
        }

        if let Some(path) = self.listing_path(name) {
            if path.is_file() {
                match read_listing(&path) {
                    Ok(listed) if !listed.is_empty() => {
                        debug!(import = %name, "import cache hit (disk)");
                        self.resolved.insert(name.to_string(), listed.clone());
                        return Ok(Some(listed));
                    }
                    Ok(_) => {}
                    Err(e) => warn!(import = %name, error = %e, "unreadable import listing"),
                }
            }
        }

        let Some(namespaces) = source
            .namespaces(name)
            .with_context(|| format!("Import source failed for {}", name))?
        else {
            return Ok(None);
        };

        let wildcards: Vec<String> = namespaces.iter().map(|ns| wildcard(ns)).collect();
        if !wildcards.is_empty() {
            self.export(name, &wildcards)?;
            self.resolved.insert(name.to_string(), wildcards.clone());
        }
        Ok(Some(wildcards))
    }

    /// Forget every resolution and delete exported listings
    pub fn clear(&self) -> Result<()> {
        self.resolved.clear();
        self.global.write().unwrap_or_else(|p| p.into_inner()).clear();

        let Some(out_dir) = &self.out_dir else {
            return Ok(());
        };
        if !out_dir.is_dir() {
            return Ok(());
        }
        for entry in fs::read_dir(out_dir)
            .with_context(|| format!("Failed to list {}", out_dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(LISTING_EXTENSION) {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }

    fn listing_path(&self, name: &str) -> Option<PathBuf> {
        let safe: String = name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        self.out_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.{}", safe, LISTING_EXTENSION)))
    }

    fn export(&self, name: &str, imports: &[String]) -> Result<()> {
        let Some(path) = self.listing_path(name) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut body = imports.join("\n");
        body.push('\n');
        fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))
    }
}

fn read_listing(path: &Path) -> std::io::Result<Vec<String>> {
    Ok(fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingSource {
        calls: AtomicUsize,
    }

    impl ImportSource for CountingSource {
        fn namespaces(&self, name: &str) -> Result<Option<Vec<String>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match name {
                "Economy" => Some(vec!["org.economy.api".into()]),
                "Empty" => Some(vec![]),
                _ => None,
            })
        }
    }

    fn source() -> CountingSource {
        CountingSource {
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(
            ImportReference::parse("Economy:org.eco.events, org.eco.util"),
            ImportReference {
                name: "Economy".into(),
                extra: vec!["org.eco.events".into(), "org.eco.util".into()],
            }
        );
        assert!(ImportReference::parse("Plain").extra.is_empty());
    }

    #[test]
    fn test_lookup_caches_in_memory_and_appends_extras() {
        let cache = ImportCache::in_memory();
        let source = source();

        let first = cache.lookup("Economy", &source).unwrap().unwrap();
        assert_eq!(first, vec!["org.economy.api.*"]);

        let second = cache.lookup("Economy:org.economy.events", &source).unwrap().unwrap();
        assert_eq!(second, vec!["org.economy.api.*", "org.economy.events.*"]);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        assert!(cache.lookup("Unknown", &source).unwrap().is_none());
    }

    #[test]
    fn test_listing_survives_new_cache_until_cleared() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        let source = source();

        ImportCache::with_out_dir(&out).lookup("Economy", &source).unwrap();
        assert!(out.join("Economy.imports").is_file());

        let fresh = ImportCache::with_out_dir(&out);
        assert_eq!(
            fresh.lookup("Economy", &source).unwrap().unwrap(),
            vec!["org.economy.api.*"]
        );
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        fresh.clear().unwrap();
        assert!(!out.join("Economy.imports").exists());
    }

    #[test]
    fn test_empty_resolution_is_not_persisted() {
        let temp = TempDir::new().unwrap();
        let cache = ImportCache::with_out_dir(temp.path());
        let source = source();

        assert_eq!(cache.lookup("Empty", &source).unwrap(), Some(vec![]));
        assert!(!temp.path().join("Empty.imports").exists());
        cache.lookup("Empty", &source).unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_init_merges_defaults_and_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("defaults.txt");
        fs::write(&file, "# shared\nkit.api.*\n\nkit.util.*\n").unwrap();

        let cache = ImportCache::with_out_dir(temp.path().join("out"));
        cache.init(&["kit.api.*".to_string()], Some(&file)).unwrap();

        assert_eq!(cache.global(), vec!["kit.api.*", "kit.util.*"]);
        let exported = fs::read_to_string(temp.path().join("out/default.imports")).unwrap();
        assert_eq!(exported, "kit.api.*\nkit.util.*\n");

        cache.clear().unwrap();
        assert!(cache.global().is_empty());
    }

    #[test]
    fn test_init_fails_on_missing_file() {
        let cache = ImportCache::in_memory();
        assert!(cache.init(&[], Some(Path::new("/nonexistent/defaults"))).is_err());
    }
}
