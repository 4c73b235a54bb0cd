//! Weft - function binding resolution and invocation dispatch
//!
//! ## Module Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DOMAIN MODEL                          │
//! │  binding/   function.json → declarations → FunctionBinding   │
//! │  convert    DomainValue conversions (string/bytes/stream)    │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      APPLICATION LAYER                       │
//! │  runtime/   indexing, filters, invocation pipeline           │
//! │  singleton/ lease-based locks (invocation + listener)        │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                      │
//! │  event/     invocation audit trail (InvocationLog)           │
//! │  util/      constants                                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`binding`] | Templates, attribute shapes, providers, built-in + HTTP bindings, extensions |
//! | [`convert`] | Value conversion and collector normalisation |
//! | [`runtime`] | `FunctionIndexer`, `FunctionExecutor`, filter chain |
//! | [`singleton`] | `SingletonManager`, `LeaseStore`, `SingletonListener` |
//! | [`event`] | Append-only invocation events |
//! | [`config`] | `HostConfig` from TOML + environment |
//! | [`error`] | Error types with codes and fix suggestions |

// ═══════════════════════════════════════════════════════════════
// DOMAIN MODEL - declarations, values
// ═══════════════════════════════════════════════════════════════
pub mod binding;
pub mod convert;

// ═══════════════════════════════════════════════════════════════
// APPLICATION LAYER - Indexing and invocation
// ═══════════════════════════════════════════════════════════════
pub mod runtime;
pub mod singleton;

// ═══════════════════════════════════════════════════════════════
// INFRASTRUCTURE LAYER - Events, utilities
// ═══════════════════════════════════════════════════════════════
pub mod event;
pub mod util;

// ═══════════════════════════════════════════════════════════════
// CROSS-CUTTING - Error handling, configuration
// ═══════════════════════════════════════════════════════════════
pub mod config;
pub mod error;

// ═══════════════════════════════════════════════════════════════
// PUBLIC API RE-EXPORTS
// ═══════════════════════════════════════════════════════════════

// Error types
pub use error::{BoxError, FixSuggestion, Result, WeftError};

// Config types
pub use config::{HostConfig, SingletonConfig};

// Binding types
pub use binding::{
    default_registry, load_function_metadata, Binder, BindingData, BindingDeclaration,
    BindingProvider, BindingTemplate, FunctionBinding, FunctionMetadata, MemoryBinder,
    NameResolver, ProviderRegistry,
};

// Conversion types
pub use convert::{DataKind, DomainValue, ElementKind};

// Runtime types
pub use runtime::{
    body_fn, FunctionBody, FunctionCall, FunctionDescriptor, FunctionExecutor, FunctionFilter,
    FunctionIndexer, FunctionOutcome, FunctionOutputs, InvocationContext, InvocationRequest,
    InvocationResult,
};

// Singleton types
pub use singleton::{InMemoryLeaseStore, LeaseStore, SingletonAttribute, SingletonManager};

// Event types
pub use event::{EventEmitter, EventKind, InvocationEvent, InvocationLog, NoopEmitter};
