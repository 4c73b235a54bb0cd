//! Runtime Module - indexing and invocation
//!
//! - `indexer`: function metadata → `FunctionDescriptor` via the provider registry
//! - `function`: descriptors and the body trait
//! - `filter`: executing / executed hooks around the body
//! - `context`: per-invocation state shared by filters and the body
//! - `executor`: the invocation pipeline (locks, filters, timeout, outputs)

mod context;
mod executor;
mod filter;
mod function;
mod indexer;

pub use context::{InvocationContext, InvocationState, Properties};
pub use executor::{FunctionExecutor, InvocationRequest, InvocationResult};
pub use filter::{FilterChain, FunctionFilter, FunctionOutcome};
pub use function::{
    body_fn, FnBody, FunctionBody, FunctionCall, FunctionDescriptor, FunctionDescriptorBuilder,
    FunctionOutputs,
};
pub use indexer::{FunctionIndexer, IndexReport};
