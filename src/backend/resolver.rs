use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

use crate::script::service::CoordinateResolver;

/// Resolves `group:artifact:version` coordinates against local repository layouts
///
/// `org.example:util:1.2` maps to `<repo>/org/example/util/1.2/util-1.2.jar`.
/// Remote repositories (http/https) are skipped; a resolver that fetches from
/// them can be added after this one with `EvaluatorBuilder::resolver`. A
/// coordinate that is itself an existing `.jar` path resolves to that file.
#[derive(Debug, Clone, Default)]
pub struct FileSystemResolver {
    extension: String,
}

impl FileSystemResolver {
    pub fn new() -> Self {
        Self {
            extension: "jar".to_string(),
        }
    }

    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    fn relative_path(&self, coordinates: &str) -> Result<PathBuf> {
        let parts: Vec<&str> = coordinates.split(':').collect();
        let (group, artifact, version) = match parts.as_slice() {
            [group, artifact, version] => (*group, *artifact, *version),
            // group:artifact:packaging:version
            [group, artifact, _, version] => (*group, *artifact, *version),
            _ => bail!(
                "Invalid coordinates '{}', expected group:artifact:version",
                coordinates
            ),
        };
        if parts.iter().any(|p| p.trim().is_empty()) {
            bail!("Invalid coordinates '{}', empty component", coordinates);
        }

        let mut path: PathBuf = group.split('.').collect();
        path.push(artifact);
        path.push(version);
        path.push(format!("{}-{}.{}", artifact, version, self.extension));
        Ok(path)
    }
}

fn is_remote(repository: &str) -> bool {
    repository.starts_with("http://") || repository.starts_with("https://")
}

impl CoordinateResolver for FileSystemResolver {
    fn resolve(&self, coordinates: &str, repositories: &[String]) -> Result<Option<Vec<PathBuf>>> {
        let direct = Path::new(coordinates);
        if direct.extension().and_then(|e| e.to_str()) == Some(self.extension.as_str()) {
            return Ok(direct.is_file().then(|| vec![direct.to_path_buf()]));
        }

        let relative = self.relative_path(coordinates)?;
        Ok(repositories
            .iter()
            .filter(|repo| !is_remote(repo))
            .map(|repo| Path::new(repo).join(&relative))
            .find(|candidate| candidate.is_file())
            .map(|found| vec![found]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_resolves_from_first_repository_that_has_it() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let jar = second.path().join("org/example/util/1.2/util-1.2.jar");
        fs::create_dir_all(jar.parent().unwrap()).unwrap();
        fs::write(&jar, b"PK").unwrap();

        let repos = vec![
            "https://repo.example.org/maven2".to_string(),
            first.path().to_string_lossy().to_string(),
            second.path().to_string_lossy().to_string(),
        ];
        let found = FileSystemResolver::new()
            .resolve("org.example:util:1.2", &repos)
            .unwrap();
        assert_eq!(found, Some(vec![jar]));
    }

    #[test]
    fn test_unknown_coordinates_are_none() {
        let repo = TempDir::new().unwrap();
        let repos = vec![repo.path().to_string_lossy().to_string()];
        let found = FileSystemResolver::new()
            .resolve("org.example:missing:0.1", &repos)
            .unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn test_malformed_coordinates_fail() {
        let resolver = FileSystemResolver::new();
        assert!(resolver.resolve("just-a-name", &[]).is_err());
        assert!(resolver.resolve("org::1.0", &[]).is_err());
    }

    #[test]
    fn test_direct_jar_path() {
        let temp = TempDir::new().unwrap();
        let jar = temp.path().join("local.jar");
        fs::write(&jar, b"PK").unwrap();

        let found = FileSystemResolver::new()
            .resolve(&jar.to_string_lossy(), &[])
            .unwrap();
        assert_eq!(found, Some(vec![jar]));
    }
}
