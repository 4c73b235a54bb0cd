//! Extension Loading - manifest → binding providers
//!
//! Custom binding kinds ship as providers compiled into the host and
//! registered in an [`ExtensionCatalog`] under a type name. A manifest
//! selects which of them to activate:
//!
//! ```json
//! { "extensions": [ { "name": "Pigeon", "typeName": "Acme.PigeonProvider", "hintPath": "bin/acme.dll" } ] }
//! ```
//!
//! Each concrete provider type is instantiated at most once, however many
//! times the manifest lists it.

use std::any::{type_name, TypeId};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, WeftError};

use super::provider::{BindingProvider, ProviderRegistry};

/// One manifest entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionReference {
    pub name: String,
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint_path: Option<String>,
}

/// Extension manifest document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionManifest {
    #[serde(default)]
    pub extensions: Vec<ExtensionReference>,
}

impl ExtensionManifest {
    pub fn from_json(json: &str, origin: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| WeftError::Manifest {
            path: origin.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let origin = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|e| WeftError::Manifest {
            path: origin.clone(),
            reason: format!("Failed to read manifest: {}", e),
        })?;
        Self::from_json(&content, &origin)
    }
}

type ProviderFactory = Arc<dyn Fn() -> Arc<dyn BindingProvider> + Send + Sync>;

#[derive(Clone)]
struct CatalogEntry {
    type_id: TypeId,
    rust_type: &'static str,
    factory: ProviderFactory,
}

/// Provider factories known to the host, keyed by manifest type name
#[derive(Clone, Default)]
pub struct ExtensionCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl ExtensionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a provider type available under `type_name`
    ///
    /// Several type names may map to the same provider type; it is still
    /// instantiated only once per loader.
    pub fn register<P, F>(&mut self, type_name_key: impl Into<String>, factory: F)
    where
        P: BindingProvider + 'static,
        F: Fn() -> P + Send + Sync + 'static,
    {
        let factory: ProviderFactory = Arc::new(move || Arc::new(factory()) as Arc<dyn BindingProvider>);
        self.entries.insert(
            type_name_key.into(),
            CatalogEntry {
                type_id: TypeId::of::<P>(),
                rust_type: type_name::<P>(),
                factory,
            },
        );
    }

    pub fn contains(&self, type_name_key: &str) -> bool {
        self.entries.contains_key(type_name_key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for ExtensionCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, e)| (k, e.rust_type)))
            .finish()
    }
}

/// Activates manifest-listed extensions into a registry
pub struct ExtensionLoader<'a> {
    catalog: &'a ExtensionCatalog,
    loaded: HashSet<TypeId>,
}

impl<'a> ExtensionLoader<'a> {
    pub fn new(catalog: &'a ExtensionCatalog) -> Self {
        Self {
            catalog,
            loaded: HashSet::new(),
        }
    }

    /// Read a manifest file and load its extensions
    pub fn load_manifest(&mut self, path: &Path, registry: &mut ProviderRegistry) -> Result<Vec<String>> {
        let manifest = ExtensionManifest::load(path)?;
        self.load(&manifest, registry)
    }

    /// Append each listed extension's provider to the registry
    ///
    /// Returns the names of the extensions actually instantiated. All
    /// entries are checked before anything is registered.
    pub fn load(&mut self, manifest: &ExtensionManifest, registry: &mut ProviderRegistry) -> Result<Vec<String>> {
        let catalog = self.catalog;
        let entries = manifest
            .extensions
            .iter()
            .map(|reference| {
                catalog
                    .entries
                    .get(&reference.type_name)
                    .map(|entry| (reference, entry))
                    .ok_or_else(|| WeftError::ExtensionNotFound {
                        name: reference.name.clone(),
                        type_name: reference.type_name.clone(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut loaded = Vec::new();
        for (reference, entry) in entries {
            if !self.loaded.insert(entry.type_id) {
                debug!(extension = %reference.name, rust_type = entry.rust_type, "extension already loaded, skipping");
                continue;
            }
            let provider = (entry.factory)();
            info!(extension = %reference.name, provider = provider.name(), "loaded binding extension");
            registry.register(provider);
            loaded.push(reference.name.clone());
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::declaration::BindingDeclaration;
    use crate::binding::function_binding::FunctionBinding;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[derive(Default)]
    struct PigeonProvider;

    impl BindingProvider for PigeonProvider {
        fn name(&self) -> &str {
            "pigeon"
        }
        fn try_create(&self, _d: &BindingDeclaration) -> Result<Option<Arc<dyn FunctionBinding>>> {
            Ok(None)
        }
        fn try_resolve_module(&self, module: &str) -> bool {
            module == "Acme.Pigeon"
        }
    }

    fn catalog() -> ExtensionCatalog {
        let mut catalog = ExtensionCatalog::new();
        catalog.register("Acme.PigeonProvider", PigeonProvider::default);
        catalog.register("Acme.PigeonProviderV2", PigeonProvider::default);
        catalog
    }

    #[test]
    fn loads_each_type_once() {
        let manifest = ExtensionManifest::from_json(
            r#"{"extensions": [
                {"name": "Pigeon", "typeName": "Acme.PigeonProvider"},
                {"name": "PigeonAgain", "typeName": "Acme.PigeonProviderV2", "hintPath": "x.dll"}
            ]}"#,
            "inline",
        )
        .unwrap();

        let catalog = catalog();
        let mut registry = ProviderRegistry::new();
        let mut loader = ExtensionLoader::new(&catalog);
        let loaded = loader.load(&manifest, &mut registry).unwrap();

        assert_eq!(loaded, vec!["Pigeon".to_string()]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.try_resolve_module("Acme.Pigeon"), Some("pigeon"));

        // second pass is a no-op
        assert!(loader.load(&manifest, &mut registry).unwrap().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_type_fails_before_registering() {
        let manifest = ExtensionManifest::from_json(
            r#"{"extensions": [
                {"name": "Pigeon", "typeName": "Acme.PigeonProvider"},
                {"name": "Owl", "typeName": "Acme.OwlProvider"}
            ]}"#,
            "inline",
        )
        .unwrap();

        let catalog = catalog();
        let mut registry = ProviderRegistry::new();
        let err = ExtensionLoader::new(&catalog)
            .load(&manifest, &mut registry)
            .unwrap_err();
        assert!(matches!(err, WeftError::ExtensionNotFound { ref name, .. } if name == "Owl"));
        assert!(registry.is_empty());
    }

    #[test]
    fn manifest_file_errors() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = ExtensionManifest::load(file.path()).unwrap_err();
        assert_eq!(err.code(), "WEFT-025");

        let err = ExtensionManifest::load(Path::new("/definitely/missing.json")).unwrap_err();
        assert_eq!(err.code(), "WEFT-025");
    }

    #[test]
    fn empty_manifest_loads_nothing() {
        let manifest = ExtensionManifest::from_json("{}", "inline").unwrap();
        let catalog = catalog();
        let mut registry = ProviderRegistry::new();
        let loaded = ExtensionLoader::new(&catalog).load(&manifest, &mut registry).unwrap();
        assert!(loaded.is_empty());
    }
}
