use anyhow::Result;
use std::collections::BTreeMap;

use crate::script::service::ImportSource;

/// Import names declared in the `[imports]` table of the configuration
#[derive(Debug, Clone, Default)]
pub struct StaticImportSource {
    names: BTreeMap<String, Vec<String>>,
}

impl StaticImportSource {
    pub fn new(names: BTreeMap<String, Vec<String>>) -> Self {
        Self { names }
    }
}

impl ImportSource for StaticImportSource {
    fn namespaces(&self, name: &str) -> Result<Option<Vec<String>>> {
        Ok(self.names.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_and_unknown_names() {
        let mut names = BTreeMap::new();
        names.insert("http".to_string(), vec!["kit.http".to_string()]);
        let source = StaticImportSource::new(names);

        assert_eq!(
            source.namespaces("http").unwrap(),
            Some(vec!["kit.http".to_string()])
        );
        assert_eq!(source.namespaces("db").unwrap(), None);
    }
}
