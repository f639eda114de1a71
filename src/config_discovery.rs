use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::KitConfig;

pub const CONFIG_FILE_NAME: &str = "kit.toml";

/// Discovers kitrun configuration by traversing up the directory tree
pub fn discover_config(start_dir: &Path) -> Result<Option<PathBuf>> {
    let mut current = start_dir.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Ok(Some(config_path));
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    // Fallback to global config
    let global_config = global_config_path();
    if global_config.exists() {
        return Ok(Some(global_config));
    }

    Ok(None)
}

/// `$XDG_CONFIG_HOME/kitrun/config.toml`, defaulting to `~/.config/kitrun/config.toml`
pub fn global_config_path() -> PathBuf {
    let base = match std::env::var("XDG_CONFIG_HOME") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .map(|home| home.join(".config"))
            .unwrap_or_else(|| PathBuf::from(".config")),
    };
    base.join("kitrun").join("config.toml")
}

/// A loaded configuration and the file it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: KitConfig,
    pub source: Option<PathBuf>,
}

/// Loads configuration with auto-discovery support
///
/// An explicit path wins; otherwise the nearest `kit.toml` above `cwd`, then
/// the global config, then defaults. Relative script paths in a project
/// `kit.toml` are resolved against its directory; everything else against
/// `cwd`.
pub fn load_config_with_discovery(explicit_path: Option<&Path>, cwd: &Path) -> Result<LoadedConfig> {
    let path = match explicit_path {
        Some(path) => Some(path.to_path_buf()),
        None => discover_config(cwd)?,
    };

    let Some(path) = path else {
        return Ok(LoadedConfig {
            config: KitConfig::default().rooted_at(cwd),
            source: None,
        });
    };

    let config = KitConfig::from_file(&path)?;
    let base = if path.file_name().and_then(|n| n.to_str()) == Some(CONFIG_FILE_NAME) {
        path.parent().map(Path::to_path_buf).unwrap_or_else(|| cwd.to_path_buf())
    } else {
        cwd.to_path_buf()
    };

    let config = config.rooted_at(&base);
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;

    Ok(LoadedConfig {
        config,
        source: Some(path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_discover_config_finds_nearest() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let project = root.join("project");
        let subdir = project.join("subdir");
        fs::create_dir_all(&subdir).unwrap();

        let config_path = project.join("kit.toml");
        fs::write(&config_path, "# test config").unwrap();

        let found = discover_config(&subdir).unwrap();
        assert_eq!(found, Some(config_path));
    }

    #[test]
    #[serial]
    fn test_global_config_respects_xdg() {
        let temp = TempDir::new().unwrap();
        std::env::set_var("XDG_CONFIG_HOME", temp.path());
        let path = global_config_path();
        std::env::remove_var("XDG_CONFIG_HOME");

        assert_eq!(path, temp.path().join("kitrun/config.toml"));
    }

    #[test]
    #[serial]
    fn test_project_config_roots_scripts_next_to_it() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("host");
        let nested = project.join("logs");
        fs::create_dir_all(&nested).unwrap();
        fs::write(project.join("kit.toml"), "[scripts]\nroot = \"plugins\"\n").unwrap();

        let loaded = load_config_with_discovery(None, &nested).unwrap();
        assert_eq!(loaded.source, Some(project.join("kit.toml")));
        assert_eq!(
            PathBuf::from(&loaded.config.scripts.root),
            project.join("plugins")
        );
    }

    #[test]
    #[serial]
    fn test_explicit_invalid_config_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        fs::write(&path, "[runtime]\ncompile_workers = 0\n").unwrap();

        let err = load_config_with_discovery(Some(&path), temp.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("compile_workers"));
    }
}
