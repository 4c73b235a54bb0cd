//! Binding Module - declarations → runtime bindings
//!
//! - `declaration`: function.json types (FunctionMetadata, BindingDeclaration)
//! - `template`: `{parameter}` templates and their cache
//! - `attribute`: shape-driven attribute resolution (longest constructor)
//! - `provider`: ordered provider chain, first match wins
//! - `builtin` / `http`: the bindings shipped with the engine
//! - `extension`: manifest-driven extension providers
//! - `binder`: capability boundary to external services
//!
//! Data flow:
//! ```text
//! function.json → BindingDeclaration
//!                      ↓  %setting% resolution
//!              ProviderRegistry (first match)
//!                      ↓  AttributeShape → AttributeDescriptor
//!                FunctionBinding (templates compiled)
//!                      ↓  per invocation: BindingData
//!               bound AttributeDescriptor → Binder
//! ```

pub mod attribute;
pub mod binder;
pub mod builtin;
pub mod data;
pub mod declaration;
pub mod extension;
pub mod function_binding;
pub mod http;
pub mod names;
pub mod properties;
pub mod provider;
pub mod shapes;
pub mod template;

use std::sync::Arc;

pub use attribute::{resolve_attribute, AttributeDescriptor, AttributeShape, PropertySpec, SinkKind};
pub use binder::{AsyncCollector, Binder, MemoryBinder};
pub use builtin::{AttributeBinding, BuiltinBindingProvider};
pub use data::{binding_data_parameters, extract_binding_data, BindingData};
pub use declaration::{
    is_trigger_type, load_function_metadata, BindingDeclaration, Direction, FunctionMetadata,
    LoadedFunction, FUNCTION_METADATA_FILE,
};
pub use extension::{ExtensionCatalog, ExtensionLoader, ExtensionManifest, ExtensionReference};
pub use function_binding::{BindingContext, FunctionBinding, ParameterType};
pub use http::{HttpBindingProvider, HttpRequestData, HttpResponseData, RouteTemplate};
pub use names::{ConnectionStringProvider, DictionaryNameResolver, EnvNameResolver, NameResolver};
pub use properties::{value_kind, BindingProperties};
pub use provider::{BindingProvider, ProviderRegistry, ProviderRegistryBuilder};
pub use shapes::ShapeRegistry;
pub use template::{BindingTemplate, Segment, TemplateCache};

/// Registry with the HTTP provider followed by the shape-driven built-ins
pub fn default_registry(binder: Arc<dyn Binder>, names: Arc<dyn NameResolver>) -> ProviderRegistry {
    ProviderRegistry::builder()
        .provider(HttpBindingProvider::new(Arc::clone(&names)))
        .provider(BuiltinBindingProvider::new(binder, names))
        .build()
}
