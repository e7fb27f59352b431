//! Named mappings, looked up case-insensitively.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::error::RegistryError;
use crate::schema::Mapping;

#[derive(Debug, Default, Clone)]
pub struct Registry {
    mappings: HashMap<String, Arc<Mapping>>,
    default: Option<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name used by [`Registry::get_or_default`] when a lookup misses.
    pub fn with_default(mut self, name: &str) -> Self {
        self.default = Some(name.to_lowercase());
        self
    }

    /// Register under the mapping's own name, replacing any previous entry.
    pub fn register(&mut self, mapping: Mapping) -> Arc<Mapping> {
        let mapping = Arc::new(mapping);
        let key = mapping.name().to_lowercase();
        if self.mappings.insert(key, Arc::clone(&mapping)).is_some() {
            warn!(name = mapping.name(), "replacing registered mapping");
        }
        mapping
    }

    pub fn get(&self, name: &str) -> Result<Arc<Mapping>, RegistryError> {
        self.mappings
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn get_or_default(&self, name: &str) -> Result<Arc<Mapping>, RegistryError> {
        match (self.get(name), &self.default) {
            (Ok(mapping), _) => Ok(mapping),
            (Err(_), Some(default)) => self.get(default),
            (Err(e), None) => Err(e),
        }
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .mappings
            .values()
            .map(|m| m.name().to_string())
            .collect();
        names.sort_by_key(|n| n.to_lowercase());
        names
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Load every `.json` / `.toml` mapping in `dir`. Files that fail to load
    /// are logged and skipped; returns how many were registered.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, RegistryError> {
        let entries = std::fs::read_dir(dir).map_err(|source| RegistryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && matches!(
                        p.extension().and_then(|e| e.to_str()),
                        Some("json" | "toml")
                    )
            })
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            match Mapping::from_file(&path) {
                Ok(mapping) => {
                    self.register(mapping);
                    loaded += 1;
                }
                Err(e) => warn!("Skipping mapping {}: {}", path.display(), e),
            }
        }
        info!("Loaded {} mappings from {}", loaded, dir.display());
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;

    fn mapping(name: &str) -> Mapping {
        Mapping::builder(name)
            .field(Field::string("title", "h1"))
            .build()
            .unwrap()
    }

    #[test]
    fn lookup_ignores_case() {
        let mut registry = Registry::new();
        registry.register(mapping("Bakashi"));
        assert_eq!(registry.get("bakashi").unwrap().name(), "Bakashi");
        assert_eq!(registry.get("BAKASHI").unwrap().name(), "Bakashi");
        assert!(matches!(
            registry.get("animesonline"),
            Err(RegistryError::NotFound(name)) if name == "animesonline"
        ));
    }

    #[test]
    fn default_covers_unknown_names() {
        let mut registry = Registry::new().with_default("bakashi");
        registry.register(mapping("bakashi"));
        registry.register(mapping("goyabu"));
        assert_eq!(registry.get_or_default("goyabu").unwrap().name(), "goyabu");
        assert_eq!(registry.get_or_default("unknown").unwrap().name(), "bakashi");

        let bare = Registry::new();
        assert!(bare.get_or_default("unknown").is_err());
    }

    #[test]
    fn register_replaces_same_name() {
        let mut registry = Registry::new();
        registry.register(mapping("site"));
        registry.register(mapping("SITE"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["SITE"]);
    }

    #[test]
    fn load_dir_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::copy(
            "tests/fixtures/bakashi_latest.json",
            dir.path().join("bakashi_latest.json"),
        )
        .unwrap();
        std::fs::copy("tests/fixtures/product.toml", dir.path().join("product.toml")).unwrap();
        std::fs::write(
            dir.path().join("untitled.toml"),
            "[[fields]]\nname = \"title\"\nselector = \"h1\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.json"), "{\"fields\": [").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a mapping").unwrap();

        let mut registry = Registry::new();
        let loaded = registry.load_dir(dir.path()).unwrap();
        assert_eq!(loaded, 3);
        assert_eq!(registry.names(), vec!["bakashi-latest", "product", "untitled"]);
    }

    #[test]
    fn load_dir_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new();
        let err = registry.load_dir(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, RegistryError::Io { .. }));
    }
}
