//! Binder - the capability boundary to external services
//!
//! The engine never talks to a storage account or message broker itself.
//! It hands a bound [`AttributeDescriptor`] to an injected [`Binder`] and
//! gets back a value (inputs), a write acknowledgement (single outputs) or
//! an [`AsyncCollector`] (batch outputs).
//!
//! [`MemoryBinder`] is an in-process implementation keyed by the
//! descriptor's destination (first string constructor argument).

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::convert::{self, DataKind, DomainValue, ElementKind};
use crate::error::BoxError;

use super::attribute::AttributeDescriptor;

/// External data source / sink capability
#[async_trait]
pub trait Binder: Send + Sync {
    /// Read an input value
    async fn read(
        &self,
        attribute: &AttributeDescriptor,
        kind: DataKind,
    ) -> Result<DomainValue, BoxError>;

    /// Write one value to a single-value sink
    async fn write(&self, attribute: &AttributeDescriptor, value: DomainValue)
        -> Result<(), BoxError>;

    /// Open a collector for a batch sink
    async fn collector(
        &self,
        attribute: &AttributeDescriptor,
        element: ElementKind,
    ) -> Result<Box<dyn AsyncCollector>, BoxError>;
}

/// Output sink accepting many items per invocation
#[async_trait]
pub trait AsyncCollector: Send {
    async fn add(&mut self, item: DomainValue) -> Result<(), BoxError>;

    /// Push buffered items to the sink
    async fn flush(&mut self) -> Result<(), BoxError>;
}

// ═══════════════════════════════════════════════════════════════
// IN-MEMORY BINDER
// ═══════════════════════════════════════════════════════════════

/// In-process binder: inputs are seeded, outputs are recorded
#[derive(Debug, Clone, Default)]
pub struct MemoryBinder {
    inputs: Arc<DashMap<String, Vec<u8>>>,
    outputs: Arc<DashMap<String, Vec<DomainValue>>>,
}

impl MemoryBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `bytes` readable at `destination`
    pub fn seed(&self, destination: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.inputs.insert(destination.into(), bytes.into());
    }

    /// Number of items recorded at `destination`
    pub fn count(&self, destination: &str) -> usize {
        self.outputs.get(destination).map_or(0, |items| items.len())
    }

    /// JSON snapshot of everything recorded at `destination`
    pub fn values(&self, destination: &str) -> Vec<Value> {
        self.outputs
            .get(destination)
            .map(|items| items.iter().map(DomainValue::to_json_lossy).collect())
            .unwrap_or_default()
    }

    /// Destinations with recorded output, sorted
    pub fn destinations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.outputs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    fn record(&self, destination: &str, items: Vec<DomainValue>) {
        self.outputs
            .entry(destination.to_string())
            .or_default()
            .extend(items);
    }
}

#[async_trait]
impl Binder for MemoryBinder {
    async fn read(
        &self,
        attribute: &AttributeDescriptor,
        kind: DataKind,
    ) -> Result<DomainValue, BoxError> {
        let Some(bytes) = self
            .inputs
            .get(attribute.destination())
            .map(|b| b.value().clone())
        else {
            return Ok(DomainValue::Json(Value::Null));
        };
        let value = convert::from_stream(Box::new(Cursor::new(bytes)), kind).await?;
        Ok(value)
    }

    async fn write(
        &self,
        attribute: &AttributeDescriptor,
        value: DomainValue,
    ) -> Result<(), BoxError> {
        let value = match value {
            DomainValue::Stream(_) => DomainValue::Bytes(convert::into_bytes(value).await?),
            other => other,
        };
        self.record(attribute.destination(), vec![value]);
        Ok(())
    }

    async fn collector(
        &self,
        attribute: &AttributeDescriptor,
        _element: ElementKind,
    ) -> Result<Box<dyn AsyncCollector>, BoxError> {
        Ok(Box::new(MemoryCollector {
            destination: attribute.destination().to_string(),
            binder: self.clone(),
            pending: Vec::new(),
        }))
    }
}

struct MemoryCollector {
    destination: String,
    binder: MemoryBinder,
    pending: Vec<DomainValue>,
}

#[async_trait]
impl AsyncCollector for MemoryCollector {
    async fn add(&mut self, item: DomainValue) -> Result<(), BoxError> {
        self.pending.push(item);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), BoxError> {
        let items = std::mem::take(&mut self.pending);
        if !items.is_empty() {
            self.binder.record(&self.destination, items);
        }
        Ok(())
    }
}
