//! Provider dispatch, extensions and attribute resolution across modules

use std::fs;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use tempfile::TempDir;

use weft::binding::{
    default_registry, AttributeDescriptor, BindingContext, BindingData, BindingDeclaration, BindingProvider,
    BindingTemplate, Direction, DictionaryNameResolver, ExtensionCatalog, ExtensionLoader,
    FunctionBinding, MemoryBinder, ParameterType, ProviderRegistry,
};
use weft::error::{Result, WeftError};

fn declaration(value: Value) -> BindingDeclaration {
    BindingDeclaration::from_value(&value).unwrap()
}

fn registry() -> ProviderRegistry {
    default_registry(
        Arc::new(MemoryBinder::new()),
        Arc::new(DictionaryNameResolver::new(Default::default())),
    )
}

// ============================================================================
// Custom providers
// ============================================================================

struct PigeonBinding(BindingDeclaration);

#[async_trait]
impl FunctionBinding for PigeonBinding {
    fn declaration(&self) -> &BindingDeclaration {
        &self.0
    }

    fn can_bind(&self, parameter: ParameterType) -> bool {
        parameter == ParameterType::String
    }

    fn synthetic_attribute(&self, _parameter: ParameterType) -> Result<AttributeDescriptor> {
        Ok(AttributeDescriptor::new("PigeonAttribute"))
    }

    async fn bind(&self, context: &mut BindingContext) -> Result<()> {
        context.bound_value = context.input_value.take();
        Ok(())
    }
}

/// Claims a single binding type and counts how often it is asked
struct CountingProvider {
    name: &'static str,
    claims: Option<&'static str>,
    calls: Arc<AtomicU32>,
}

impl CountingProvider {
    fn new(name: &'static str, claims: Option<&'static str>) -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                name,
                claims,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl BindingProvider for CountingProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn try_create(&self, declaration: &BindingDeclaration) -> Result<Option<Arc<dyn FunctionBinding>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.claims {
            Some(binding_type) if declaration.binding_type.eq_ignore_ascii_case(binding_type) => {
                Ok(Some(Arc::new(PigeonBinding(declaration.clone()))))
            }
            _ => Ok(None),
        }
    }
}

#[derive(Default)]
struct PigeonProvider;

impl BindingProvider for PigeonProvider {
    fn name(&self) -> &str {
        "pigeon"
    }

    fn try_create(&self, declaration: &BindingDeclaration) -> Result<Option<Arc<dyn FunctionBinding>>> {
        if !declaration.binding_type.eq_ignore_ascii_case("carrierPigeon") {
            return Ok(None);
        }
        Ok(Some(Arc::new(PigeonBinding(declaration.clone()))))
    }

    fn try_resolve_module(&self, module: &str) -> bool {
        module.eq_ignore_ascii_case("Acme.Pigeon")
    }
}

#[test]
fn test_first_matching_provider_wins() {
    let (p1, p1_calls) = CountingProvider::new("p1", None);
    let (p2, p2_calls) = CountingProvider::new("p2", Some("foo"));
    let (p3, p3_calls) = CountingProvider::new("p3", Some("foo"));
    let registry = ProviderRegistry::builder().provider(p1).provider(p2).provider(p3).build();

    let decl = BindingDeclaration::new("x", "foo", Direction::In, Map::new()).unwrap();
    let binding = registry.try_create_binding(&decl).unwrap();

    assert_eq!(binding.name(), "x");
    assert_eq!(p1_calls.load(Ordering::SeqCst), 1);
    assert_eq!(p2_calls.load(Ordering::SeqCst), 1);
    assert_eq!(p3_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_custom_provider_ahead_of_builtins_shadows_queue() {
    let (custom, calls) = CountingProvider::new("custom", Some("queue"));
    let mut registry = ProviderRegistry::builder().provider(custom).build();
    for provider in self::registry().providers() {
        registry.register(Arc::clone(provider));
    }

    let decl = declaration(json!({"name": "out", "type": "queue", "direction": "out", "queueName": "q"}));
    let binding = registry.try_create_binding(&decl).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // the pigeon binding only accepts strings; the built-in queue accepts collectors
    assert!(!binding.can_bind(ParameterType::Collector));
}

#[test]
fn test_unknown_type_reports_name_and_type() {
    let decl = declaration(json!({"name": "thing", "type": "carrierPigeon", "direction": "out"}));
    let err = registry().try_create_binding(&decl).unwrap_err();

    match &err {
        WeftError::UnknownBindingType { binding, binding_type } => {
            assert_eq!(binding, "thing");
            assert_eq!(binding_type, "carrierPigeon");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_declaration_error());
}

#[test]
fn test_manifest_extension_extends_registry() {
    let temp_dir = TempDir::new().unwrap();
    let manifest = temp_dir.path().join("extensions.json");
    fs::write(
        &manifest,
        r#"{ "extensions": [
            { "name": "Pigeon", "typeName": "Acme.Pigeon.PigeonProvider" },
            { "name": "PigeonAgain", "typeName": "Acme.Pigeon.PigeonProvider" }
        ] }"#,
    )
    .unwrap();

    let mut catalog = ExtensionCatalog::new();
    catalog.register("Acme.Pigeon.PigeonProvider", PigeonProvider::default);

    let mut registry = registry();
    let before = registry.len();
    let loaded = ExtensionLoader::new(&catalog)
        .load_manifest(&manifest, &mut registry)
        .unwrap();

    assert_eq!(loaded, vec!["Pigeon".to_string()]);
    assert_eq!(registry.len(), before + 1);
    assert_eq!(registry.try_resolve_module("acme.pigeon"), Some("pigeon"));

    let decl = declaration(json!({"name": "bird", "type": "carrierPigeon", "direction": "out"}));
    assert_eq!(registry.try_create_binding(&decl).unwrap().name(), "bird");
}

// ============================================================================
// Attribute resolution through the built-in provider
// ============================================================================

#[test]
fn test_longest_constructor_selected_for_table() {
    let registry = registry();
    let cases = [
        (json!({"tableName": "t"}), vec!["tableName"]),
        (json!({"tableName": "t", "partitionKey": "p"}), vec!["tableName", "partitionKey"]),
        (
            json!({"tableName": "t", "partitionKey": "p", "rowKey": "r"}),
            vec!["tableName", "partitionKey", "rowKey"],
        ),
        (json!({"tableName": "t", "partitionKey": null, "rowKey": "r"}), vec!["tableName"]),
    ];

    for (properties, expected) in cases {
        let mut value = properties.clone();
        value["name"] = json!("row");
        value["type"] = json!("table");
        value["direction"] = json!("in");

        let binding = registry.try_create_binding(&declaration(value)).unwrap();
        let attribute = binding.synthetic_attribute(ParameterType::Json).unwrap();
        let args: Vec<&str> = attribute.constructor_args.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(args, expected, "properties: {properties}");
    }
}

#[test]
fn test_no_viable_constructor_is_declaration_error() {
    let decl = declaration(json!({"name": "row", "type": "table", "direction": "in"}));
    let err = registry().try_create_binding(&decl).unwrap_err();
    assert_eq!(err.code(), "WEFT-021");
    assert!(err.is_declaration_error());
}

#[test]
fn test_malformed_path_fails_at_load_time() {
    let decl = declaration(json!({"name": "out", "type": "queue", "direction": "out", "queueName": "out-{id"}));
    let err = registry().try_create_binding(&decl).unwrap_err();
    assert_eq!(err.code(), "WEFT-001");
}

#[test]
fn test_template_reports_missing_parameter() {
    let template = BindingTemplate::parse("{container}/{blob}").unwrap();
    let mut data = BindingData::new();
    data.insert("container", "photos");
    let err = template.bind(Some(&data)).unwrap_err();
    match err {
        WeftError::MissingBindingData { parameter, .. } => assert_eq!(parameter, "blob"),
        other => panic!("unexpected error: {other}"),
    }
}
