//! Built-in bindings driven by attribute shapes
//!
//! One generic [`AttributeBinding`] serves every shape in the
//! [`ShapeRegistry`]: it resolves the attribute at load time, compiles its
//! `{parameter}` strings once, and per invocation binds them and talks to
//! the injected [`Binder`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::convert::{self, DataKind, DomainValue, ElementKind};
use crate::error::{BoxError, Result, WeftError};

use super::attribute::{resolve_attribute, AttributeDescriptor, AttributeShape};
use super::binder::Binder;
use super::data::{binding_data_parameters, extract_binding_data, BindingData};
use super::declaration::BindingDeclaration;
use super::function_binding::{unsupported_parameter, BindingContext, FunctionBinding, ParameterType};
use super::names::NameResolver;
use super::properties::BindingProperties;
use super::provider::BindingProvider;
use super::shapes::ShapeRegistry;
use super::template::{BindingTemplate, TemplateCache};

/// Triggers whose path pattern feeds binding data
const PATH_TRIGGERS: &[&str] = &["blobTrigger", "apiHubFileTrigger"];

/// Replace `%setting%` tokens in every string property
pub(crate) fn resolve_setting_names(
    declaration: &BindingDeclaration,
    names: &dyn NameResolver,
) -> Result<BindingProperties> {
    let mut raw = declaration.raw_properties.as_map().clone();
    for value in raw.values_mut() {
        if let Value::String(text) = value {
            *text = names.resolve_whole_string(text).map_err(|e| match e {
                WeftError::InvalidDeclaration { reason, .. } => WeftError::InvalidDeclaration {
                    binding: declaration.name.clone(),
                    reason,
                },
                other => other,
            })?;
        }
    }
    Ok(BindingProperties::new(raw))
}

/// Generic shape-driven binding
pub struct AttributeBinding {
    declaration: BindingDeclaration,
    shape: AttributeShape,
    descriptor: AttributeDescriptor,
    /// Parameterized string values, compiled at load time
    templates: Vec<(String, Arc<BindingTemplate>)>,
    binder: Arc<dyn Binder>,
}

impl AttributeBinding {
    pub fn new(
        declaration: &BindingDeclaration,
        shape: &AttributeShape,
        names: &dyn NameResolver,
        cache: &TemplateCache,
        binder: Arc<dyn Binder>,
    ) -> Result<Self> {
        let mut properties = resolve_setting_names(declaration, names)?.into_map();

        let takes_access = shape
            .constructors()
            .iter()
            .any(|params| params.iter().any(|p| p == "access"));
        if takes_access && !properties.keys().any(|k| k.eq_ignore_ascii_case("access")) {
            properties.insert(
                "access".to_string(),
                Value::String(declaration.direction.access().to_string()),
            );
        }

        let descriptor = resolve_attribute(shape, &BindingProperties::new(properties))?;

        // Trigger paths and routes are match patterns, never bound
        let mut templates = Vec::new();
        if !declaration.is_trigger() {
            for (key, value) in descriptor.string_values() {
                let template = cache.get_or_parse(value)?;
                if template.is_parameterized() {
                    templates.push((key.to_string(), template));
                }
            }
        }

        Ok(Self {
            declaration: declaration.clone(),
            shape: shape.clone(),
            descriptor,
            templates,
            binder,
        })
    }

    pub fn descriptor(&self) -> &AttributeDescriptor {
        &self.descriptor
    }

    pub fn shape(&self) -> &AttributeShape {
        &self.shape
    }

    /// Descriptor with every template bound against `data`
    pub fn bound_descriptor(&self, data: &BindingData) -> Result<AttributeDescriptor> {
        let mut bound = self.descriptor.clone();
        for (key, template) in &self.templates {
            let value = template.bind(Some(data))?.into_owned();
            bound.set(key, Value::String(value));
        }
        Ok(bound)
    }

    fn element_kind(&self) -> ElementKind {
        ElementKind::for_data_kind(self.declaration.data_kind, self.shape.element_kind)
    }

    fn read_kind(&self) -> DataKind {
        self.declaration
            .data_kind
            .unwrap_or(match self.shape.element_kind {
                ElementKind::Bytes => DataKind::Binary,
                ElementKind::String | ElementKind::Json => DataKind::String,
            })
    }

    fn binder_error(attribute: &AttributeDescriptor) -> impl Fn(BoxError) -> WeftError + '_ {
        move |source| WeftError::Binder {
            target: attribute.destination().to_string(),
            source,
        }
    }

    async fn bind_trigger(&self, context: &mut BindingContext) -> Result<()> {
        let value = match (context.input_value.take(), self.declaration.data_kind) {
            (Some(value), Some(kind)) => Some(convert::convert(value, kind).await?),
            (value, _) => value,
        };
        context.bound_value = value;
        Ok(())
    }

    async fn bind_input(&self, context: &mut BindingContext, attribute: &AttributeDescriptor) -> Result<()> {
        let value = self
            .binder
            .read(attribute, self.read_kind())
            .await
            .map_err(Self::binder_error(attribute))?;

        let value = match value {
            DomainValue::String(text)
                if self.declaration.data_kind.is_none()
                    && self.shape.element_kind == ElementKind::Json =>
            {
                DomainValue::Json(serde_json::from_str(&text).map_err(|e| {
                    WeftError::data_format(format!("input '{}' is not JSON: {}", self.declaration.name, e))
                })?)
            }
            other => other,
        };
        context.bound_value = Some(value);
        Ok(())
    }

    async fn bind_collector(&self, context: &mut BindingContext, attribute: &AttributeDescriptor) -> Result<()> {
        let Some(value) = context.input_value.take() else {
            return Ok(());
        };
        let element = self.element_kind();
        let to_binder_error = Self::binder_error(attribute);

        let mut collector = self
            .binder
            .collector(attribute, element)
            .await
            .map_err(&to_binder_error)?;

        let items = convert::normalize_to_many(value).await?;
        let count = items.len();
        for item in items {
            if context.cancellation.is_cancelled() {
                return Err(WeftError::Cancelled {
                    function: self.declaration.name.clone(),
                });
            }
            let item = convert::convert_item(item, element)?;
            collector.add(item).await.map_err(&to_binder_error)?;
        }
        collector.flush().await.map_err(&to_binder_error)?;

        debug!(destination = attribute.destination(), items = count, "collector flushed");
        Ok(())
    }

    async fn bind_single(&self, context: &mut BindingContext, attribute: &AttributeDescriptor) -> Result<()> {
        let Some(value) = context.input_value.take() else {
            return Ok(());
        };
        let value = match self.declaration.data_kind {
            Some(kind) => convert::convert(value, kind).await?,
            None => value,
        };
        self.binder
            .write(attribute, value)
            .await
            .map_err(Self::binder_error(attribute))
    }
}

#[async_trait]
impl FunctionBinding for AttributeBinding {
    fn declaration(&self) -> &BindingDeclaration {
        &self.declaration
    }

    fn can_bind(&self, parameter: ParameterType) -> bool {
        if let Some(kind) = self.declaration.data_kind {
            if !parameter.accepts(kind) {
                return false;
            }
        }
        match parameter {
            ParameterType::Collector => {
                self.declaration.direction.is_output() && self.shape.is_collector()
            }
            ParameterType::Stream => !self.shape.is_collector() || self.declaration.direction.is_input(),
            ParameterType::String | ParameterType::Binary | ParameterType::Json => true,
        }
    }

    fn synthetic_attribute(&self, parameter: ParameterType) -> Result<AttributeDescriptor> {
        if !self.can_bind(parameter) {
            return Err(unsupported_parameter(&self.declaration, parameter));
        }
        Ok(self.descriptor.clone())
    }

    fn populate_binding_data(
        &self,
        trigger_value: Option<&DomainValue>,
        data: &mut BindingData,
    ) -> Result<()> {
        if !self.declaration.is_trigger() {
            return Ok(());
        }

        let binding_type = &self.declaration.binding_type;
        if PATH_TRIGGERS.iter().any(|t| t.eq_ignore_ascii_case(binding_type)) {
            let Some(pattern) = self.descriptor.get_str("path") else {
                return Ok(());
            };
            let actual = data
                .get(binding_type)
                .map(str::to_string)
                .or_else(|| trigger_value.and_then(|v| v.as_str()).map(str::to_string));
            if let Some(actual) = actual {
                let extracted = extract_binding_data(pattern, &actual).ok_or_else(|| {
                    WeftError::data_format(format!(
                        "path '{}' does not match pattern '{}'",
                        actual, pattern
                    ))
                })?;
                data.insert(binding_type.as_str(), actual);
                data.merge(extracted);
            }
            return Ok(());
        }

        // JSON payload properties become parameters unless supplied explicitly
        let payload = match trigger_value {
            Some(DomainValue::Json(Value::Object(map))) => Some(map.clone()),
            Some(DomainValue::String(text)) if text.trim_start().starts_with('{') => {
                match serde_json::from_str::<Value>(text) {
                    Ok(Value::Object(map)) => Some(map),
                    _ => None,
                }
            }
            _ => None,
        };
        if let Some(payload) = payload {
            data.merge_missing(binding_data_parameters(&payload));
        }
        Ok(())
    }

    #[instrument(skip(self, context), fields(binding = %self.declaration.name, binding_type = %self.declaration.binding_type))]
    async fn bind(&self, context: &mut BindingContext) -> Result<()> {
        if self.declaration.is_trigger() {
            context.attributes.push(self.descriptor.clone());
            return self.bind_trigger(context).await;
        }

        let attribute = self.bound_descriptor(&context.binding_data)?;
        if self.declaration.direction.is_output() && context.input_value.is_some() {
            if self.shape.is_collector() {
                self.bind_collector(context, &attribute).await?;
            } else {
                self.bind_single(context, &attribute).await?;
            }
        } else if self.declaration.direction.is_input() {
            self.bind_input(context, &attribute).await?;
        }
        context.attributes.push(attribute);
        Ok(())
    }
}

/// Provider for every shape in a [`ShapeRegistry`]
pub struct BuiltinBindingProvider {
    shapes: ShapeRegistry,
    names: Arc<dyn NameResolver>,
    templates: Arc<TemplateCache>,
    binder: Arc<dyn Binder>,
}

impl BuiltinBindingProvider {
    pub fn new(binder: Arc<dyn Binder>, names: Arc<dyn NameResolver>) -> Self {
        Self {
            shapes: ShapeRegistry::builtin(),
            names,
            templates: Arc::new(TemplateCache::new()),
            binder,
        }
    }

    pub fn with_shapes(mut self, shapes: ShapeRegistry) -> Self {
        self.shapes = shapes;
        self
    }

    pub fn with_template_cache(mut self, templates: Arc<TemplateCache>) -> Self {
        self.templates = templates;
        self
    }

    pub fn shapes(&self) -> &ShapeRegistry {
        &self.shapes
    }
}

impl BindingProvider for BuiltinBindingProvider {
    fn name(&self) -> &str {
        "builtin"
    }

    fn try_create(
        &self,
        declaration: &BindingDeclaration,
    ) -> Result<Option<Arc<dyn FunctionBinding>>> {
        let Some(shape) = self.shapes.get(&declaration.binding_type) else {
            return Ok(None);
        };
        let binding = AttributeBinding::new(
            declaration,
            shape,
            self.names.as_ref(),
            &self.templates,
            Arc::clone(&self.binder),
        )?;
        Ok(Some(Arc::new(binding)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::binder::MemoryBinder;
    use crate::binding::declaration::Direction;
    use crate::binding::names::DictionaryNameResolver;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn declaration(binding_type: &str, direction: Direction, props: Value) -> BindingDeclaration {
        let Value::Object(map) = props else {
            panic!("props must be an object");
        };
        BindingDeclaration::new("b", binding_type, direction, map).unwrap()
    }

    fn provider(binder: &MemoryBinder) -> BuiltinBindingProvider {
        let mut names = DictionaryNameResolver::default();
        names.insert("OUT_QUEUE", "out");
        BuiltinBindingProvider::new(Arc::new(binder.clone()), Arc::new(names))
    }

    fn data(pairs: &[(&str, &str)]) -> BindingData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn queue_output_binds_template_and_collects() {
        let binder = MemoryBinder::new();
        let decl = declaration("queue", Direction::Out, json!({"queueName": "%OUT_QUEUE%-{id}"}));
        let binding = provider(&binder).try_create(&decl).unwrap().unwrap();

        let mut context = BindingContext::new(data(&[("id", "42")]), CancellationToken::new())
            .with_input(Some(DomainValue::from("[\"a\", \"b\"]")));
        binding.bind(&mut context).await.unwrap();

        assert_eq!(binder.values("out-42"), vec![json!("a"), json!("b")]);
        assert_eq!(context.attributes[0].destination(), "out-42");
    }

    #[tokio::test]
    async fn missing_parameter_is_binding_error() {
        let binder = MemoryBinder::new();
        let decl = declaration("queue", Direction::Out, json!({"queueName": "out-{id}"}));
        let binding = provider(&binder).try_create(&decl).unwrap().unwrap();

        let mut context = BindingContext::new(BindingData::new(), CancellationToken::new())
            .with_input(Some(DomainValue::from("x")));
        let err = binding.bind(&mut context).await.unwrap_err();
        assert_eq!(err.code(), "WEFT-002");
    }

    #[test]
    fn malformed_template_fails_at_load() {
        let binder = MemoryBinder::new();
        let decl = declaration("queue", Direction::Out, json!({"queueName": "out-{id"}));
        let err = provider(&binder).try_create(&decl).err().unwrap();
        assert!(err.is_declaration_error());
    }

    #[test]
    fn unknown_setting_fails_at_load() {
        let binder = MemoryBinder::new();
        let decl = declaration("queue", Direction::Out, json!({"queueName": "%MISSING%"}));
        let err = provider(&binder).try_create(&decl).err().unwrap();
        assert!(matches!(err, WeftError::InvalidDeclaration { ref binding, .. } if binding == "b"));
    }

    #[test]
    fn other_types_are_declined() {
        let binder = MemoryBinder::new();
        let decl = declaration("carrierPigeon", Direction::Out, json!({}));
        assert!(provider(&binder).try_create(&decl).unwrap().is_none());
    }

    #[test]
    fn blob_access_follows_direction() {
        let binder = MemoryBinder::new();
        let decl = declaration("blob", Direction::In, json!({"path": "in/a.txt"}));
        let binding = provider(&binder).try_create(&decl).unwrap().unwrap();
        let attribute = binding.synthetic_attribute(ParameterType::Stream).unwrap();
        assert_eq!(attribute.get_str("access"), Some("read"));
        assert_eq!(attribute.constructor_args.len(), 2);
    }

    #[tokio::test]
    async fn blob_input_reads_bound_path() {
        let binder = MemoryBinder::new();
        binder.seed("in/7.txt", "contents");
        let decl = declaration("blob", Direction::In, json!({"path": "in/{id}.txt", "dataType": "string"}));
        let binding = provider(&binder).try_create(&decl).unwrap().unwrap();

        let mut context = BindingContext::new(data(&[("id", "7")]), CancellationToken::new());
        binding.bind(&mut context).await.unwrap();
        assert_eq!(context.bound_value.unwrap().as_str(), Some("contents"));
    }

    #[test]
    fn blob_trigger_extracts_path_parameters() {
        let binder = MemoryBinder::new();
        let decl = declaration("blobTrigger", Direction::In, json!({"path": "input/{name}.{ext}"}));
        let binding = provider(&binder).try_create(&decl).unwrap().unwrap();

        let mut data = BindingData::new();
        let trigger = DomainValue::from("input/photo.png");
        binding.populate_binding_data(Some(&trigger), &mut data).unwrap();
        assert_eq!(data.get("name"), Some("photo"));
        assert_eq!(data.get("ext"), Some("png"));
        assert_eq!(data.get("blobTrigger"), Some("input/photo.png"));

        let mismatch = DomainValue::from("other/photo.png");
        let err = binding
            .populate_binding_data(Some(&mismatch), &mut BindingData::new())
            .unwrap_err();
        assert_eq!(err.code(), "WEFT-010");
    }

    #[test]
    fn queue_trigger_payload_feeds_binding_data() {
        let binder = MemoryBinder::new();
        let decl = declaration("queueTrigger", Direction::In, json!({"queueName": "orders"}));
        let binding = provider(&binder).try_create(&decl).unwrap().unwrap();

        let mut data = data(&[("id", "explicit")]);
        let payload = DomainValue::Json(json!({"id": 1, "customer": "ada", "total": 9.5}));
        binding.populate_binding_data(Some(&payload), &mut data).unwrap();
        assert_eq!(data.get("id"), Some("explicit"));
        assert_eq!(data.get("customer"), Some("ada"));
        assert!(!data.contains("total"));
    }

    #[test]
    fn collector_parameter_only_for_batch_outputs() {
        let binder = MemoryBinder::new();
        let queue = provider(&binder)
            .try_create(&declaration("queue", Direction::Out, json!({"queueName": "q"})))
            .unwrap()
            .unwrap();
        assert!(queue.can_bind(ParameterType::Collector));
        assert!(!queue.can_bind(ParameterType::Stream));

        let blob = provider(&binder)
            .try_create(&declaration("blob", Direction::Out, json!({"path": "p"})))
            .unwrap()
            .unwrap();
        assert!(!blob.can_bind(ParameterType::Collector));
        let err = blob.synthetic_attribute(ParameterType::Collector).unwrap_err();
        assert_eq!(err.code(), "WEFT-023");
    }

    #[tokio::test]
    async fn table_rejects_non_json_items() {
        let binder = MemoryBinder::new();
        let decl = declaration("table", Direction::Out, json!({"tableName": "t"}));
        let binding = provider(&binder).try_create(&decl).unwrap().unwrap();

        let mut context = BindingContext::new(BindingData::new(), CancellationToken::new())
            .with_input(Some(DomainValue::from("not json")));
        let err = binding.bind(&mut context).await.unwrap_err();
        assert_eq!(err.code(), "WEFT-010");
        assert_eq!(binder.count("t"), 0);
    }
}
