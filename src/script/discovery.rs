//! Script root layout and discovery
//!
//! ```text
//! scripts/
//!   hello.kts          discovered and evaluated on bulk load
//!   tools/admin.kts    discovered (subdirectories are scanned)
//!   .lazy/manual.kts   never discovered, still addressable by name
//!   .build/hello.kit   cache record for `hello`
//! ```
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::config::ScriptsConfig;

/// Where scripts live and how they are recognized
#[derive(Debug, Clone)]
pub struct ScriptLayout {
    pub root: PathBuf,
    pub build_dir: PathBuf,
    pub lazy_dir: PathBuf,
    pub source_extension: String,
    pub artifact_extension: String,
    pub hidden_prefix: String,
}

impl ScriptLayout {
    pub fn from_config(config: &ScriptsConfig) -> Self {
        let root = PathBuf::from(&config.root);
        Self {
            build_dir: root.join(&config.build_dir),
            lazy_dir: root.join(&config.lazy_dir),
            root,
            source_extension: config.source_extension.clone(),
            artifact_extension: config.artifact_extension.clone(),
            hidden_prefix: config.hidden_prefix.clone(),
        }
    }

    /// Layout rooted at `root` with default names
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let config = ScriptsConfig {
            root: root.to_string_lossy().to_string(),
            ..Default::default()
        };
        Self::from_config(&config)
    }

    /// Create the root, lazy and build directories
    pub fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(&self.lazy_dir)?;
        fs::create_dir_all(&self.build_dir)?;
        Ok(())
    }

    /// Script identity: the file name without its extension
    pub fn script_id(path: &Path) -> String {
        path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Cache record location for a script id
    pub fn cache_path(&self, id: &str) -> PathBuf {
        self.build_dir
            .join(format!("{}.{}", id, self.artifact_extension))
    }

    pub fn is_artifact(&self, path: &Path) -> bool {
        has_extension(path, &self.artifact_extension)
    }

    pub fn is_source(&self, path: &Path) -> bool {
        has_extension(path, &self.source_extension)
    }

    fn is_hidden(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(&self.hidden_prefix))
                .unwrap_or(false)
    }

    fn relative_to_root(&self, reference: &str) -> Option<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(reference).components() {
            match component {
                Component::CurDir => {}
                Component::Normal(part) => {
                    if part.to_string_lossy().starts_with(&self.hidden_prefix) {
                        return None;
                    }
                    resolved.push(part);
                }
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        Some(resolved)
    }

    fn is_script(&self, path: &Path) -> bool {
        path.is_file() && (self.is_source(path) || self.is_artifact(path))
    }

    /// All scripts under `root` eligible for automatic loading
    ///
    /// Entries whose name starts with the hidden prefix are skipped together
    /// with everything below them.
    pub fn find_scripts(&self) -> BTreeSet<PathBuf> {
        WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| !self.is_hidden(e))
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| self.is_script(p))
            .collect()
    }

    /// Scripts under the lazy directory; only loaded on request
    pub fn lazy_scripts(&self) -> BTreeSet<PathBuf> {
        WalkDir::new(&self.lazy_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| self.is_script(p))
            .collect()
    }

    /// Find a script by file name or base name
    ///
    /// Discoverable scripts win; otherwise hidden (lazy) scripts are searched.
    /// The build directory is never searched.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        let matches = |p: &Path| {
            p.file_name().and_then(|n| n.to_str()) == Some(name) || Self::script_id(p) == name
        };

        if let Some(found) = self.find_scripts().into_iter().find(|p| matches(p)) {
            return Some(found);
        }

        WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.path() != self.build_dir)
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .find(|p| self.is_script(p) && matches(p))
    }

    /// Resolve an include reference to source files
    ///
    /// Matches the exact file name, or the base name with the source extension
    /// implied. Hidden entries are skipped. A reference containing a path
    /// separator is first tried relative to the root; it must stay inside the
    /// root and must not pass through a hidden directory.
    pub fn find_include(&self, reference: &str) -> Vec<PathBuf> {
        if reference.contains('/') {
            if let Some(direct) = self.relative_to_root(reference) {
                if direct.is_file() {
                    return vec![direct];
                }
            }
        }

        WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.is_hidden(e))
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| p.is_file())
            .filter(|p| {
                p.file_name().and_then(|n| n.to_str()) == Some(reference)
                    || (Self::script_id(p) == reference && self.is_source(p))
            })
            .collect()
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(extension)
}
