//! Prototype files
//!
//! Every `*.toml` file in a configured directory holds one
//! [`TypeDefinition`]. Files are loaded eagerly and served by the URI they
//! declare. URIs of the `file:` scheme name a file relative to one of the
//! directories instead (`file:shop/order` reads `shop/order.toml`) and are
//! read on demand.

use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use dashmap::DashMap;

use crate::constants::PROTOTYPE_EXTENSION;
use crate::registry::{TypeFactory, TypeRegistry};
use crate::types::{Error, Result, TypeDefinition};
use crate::{log_debug, log_trace};

/// Factory serving definitions from prototype directories
#[derive(Debug)]
pub struct PrototypeTypeFactory {
    dirs: Vec<PathBuf>,
    definitions: DashMap<String, TypeDefinition>,
}

impl PrototypeTypeFactory {
    /// Scan `dirs` and load every prototype file in them
    pub fn load(dirs: &[PathBuf]) -> Result<Self> {
        let factory = Self {
            dirs: dirs.to_vec(),
            definitions: DashMap::new(),
        };
        for dir in dirs {
            if !dir.is_dir() {
                return Err(Error::config(format!(
                    "Prototype directory {} does not exist",
                    dir.display()
                )));
            }
            let entries = fs::read_dir(dir).map_err(|e| {
                Error::data(format!("Failed to read prototype directory {}", dir.display()), e)
            })?;
            for entry in entries {
                let path = entry?.path();
                if !path.is_file() || path.extension() != Some(OsStr::new(PROTOTYPE_EXTENSION)) {
                    continue;
                }
                let definition = read_definition(&path)?;
                if factory.definitions.contains_key(&definition.uri) {
                    return Err(Error::definition(format!(
                        "Type '{}' defined twice (again in {})",
                        definition.uri,
                        path.display()
                    )));
                }
                log_debug!("Loaded prototype {} from {}", definition.uri, path.display());
                factory.definitions.insert(definition.uri.clone(), definition);
            }
        }
        Ok(factory)
    }

    /// Number of eagerly loaded definitions
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether no definitions were loaded
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    fn find_file(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        let file = relative.with_extension(PROTOTYPE_EXTENSION);
        self.dirs.iter().map(|dir| dir.join(&file)).find(|path| path.is_file())
    }
}

fn read_definition(path: &Path) -> Result<TypeDefinition> {
    let contents = fs::read_to_string(path)
        .map_err(|e| Error::data(format!("Failed to read prototype {}", path.display()), e))?;
    TypeDefinition::from_toml(&contents)
}

impl TypeFactory for PrototypeTypeFactory {
    fn name(&self) -> &str {
        "prototype"
    }

    fn create(&self, _registry: &TypeRegistry, uri: &str) -> Result<Option<TypeDefinition>> {
        if let Some(definition) = self.definitions.get(uri) {
            return Ok(Some(definition.clone()));
        }
        let Some(relative) = uri.strip_prefix("file:") else {
            return Ok(None);
        };
        let Some(path) = self.find_file(relative) else {
            return Ok(None);
        };
        log_trace!("Reading prototype {} for {}", path.display(), uri);
        let mut definition = read_definition(&path)?;
        definition.uri = uri.to_string();
        Ok(Some(definition))
    }
}
