//! Binding Provider Registry - first match wins
//!
//! Providers are asked in registration order whether they recognise a
//! declaration's `type`. The first one returning a binding wins; later
//! providers are never consulted for that declaration.
//!
//! ```text
//! declaration ─► P1.try_create → None
//!             ─► P2.try_create → Some(binding)   ◄── returned
//!                P3                               (never called)
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::{Result, WeftError};

use super::declaration::BindingDeclaration;
use super::function_binding::FunctionBinding;

/// Produces bindings for the declaration types it recognises
pub trait BindingProvider: Send + Sync {
    /// Provider name for diagnostics
    fn name(&self) -> &str;

    /// `Ok(None)` when the declaration's type is not handled here.
    /// `Err` when the type is handled but the declaration is invalid.
    fn try_create(&self, declaration: &BindingDeclaration)
        -> Result<Option<Arc<dyn FunctionBinding>>>;

    /// Whether this provider supplies the named runtime module
    fn try_resolve_module(&self, _module: &str) -> bool {
        false
    }
}

/// Ordered provider chain
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn BindingProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Append a provider to the end of the chain
    pub fn register(&mut self, provider: Arc<dyn BindingProvider>) {
        debug!(provider = provider.name(), position = self.providers.len(), "registered binding provider");
        self.providers.push(provider);
    }

    pub fn providers(&self) -> &[Arc<dyn BindingProvider>] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Resolve a declaration to a binding
    ///
    /// Fails with `UnknownBindingType` when no provider recognises the type.
    #[instrument(skip(self, declaration), fields(binding = %declaration.name, binding_type = %declaration.binding_type))]
    pub fn try_create_binding(
        &self,
        declaration: &BindingDeclaration,
    ) -> Result<Arc<dyn FunctionBinding>> {
        for provider in &self.providers {
            if let Some(binding) = provider.try_create(declaration)? {
                debug!(provider = provider.name(), "binding resolved");
                return Ok(binding);
            }
        }

        Err(WeftError::UnknownBindingType {
            binding: declaration.name.clone(),
            binding_type: declaration.binding_type.clone(),
        })
    }

    /// Name of the first provider claiming `module`
    pub fn try_resolve_module(&self, module: &str) -> Option<&str> {
        self.providers
            .iter()
            .find(|p| p.try_resolve_module(module))
            .map(|p| p.name())
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| p.name()))
            .finish()
    }
}

/// Explicit, ordered registry assembly
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    providers: Vec<Arc<dyn BindingProvider>>,
}

impl ProviderRegistryBuilder {
    pub fn provider(mut self, provider: impl BindingProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn provider_arc(mut self, provider: Arc<dyn BindingProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn build(self) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for provider in self.providers {
            registry.register(provider);
        }
        registry
    }
}
