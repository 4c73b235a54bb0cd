//! HTTP bindings
//!
//! - `httpTrigger`: the request is the trigger value. Route parameters
//!   (`route` template matched against the request path) and query-string
//!   parameters become binding data.
//! - `http` output: whatever the function returns is normalised into an
//!   [`HttpResponseData`].
//!
//! Route syntax: `products/{category}/{id:int?}/{*rest}`. Constraints after
//! `:` are accepted and ignored, `?` marks an optional trailing segment and
//! `*` captures the remainder of the path.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::instrument;
use url::Url;

use crate::convert::{self, DomainValue};
use crate::error::{Result, WeftError};

use super::attribute::{resolve_attribute, AttributeDescriptor, AttributeShape};
use super::data::{binding_data_parameters, BindingData};
use super::declaration::BindingDeclaration;
use super::function_binding::{unsupported_parameter, BindingContext, FunctionBinding, ParameterType};
use super::names::NameResolver;
use super::provider::BindingProvider;
use super::shapes::ShapeRegistry;
use super::builtin::resolve_setting_names;

/// Prefix stripped from request paths before route matching
pub const ROUTE_PREFIX: &str = "api";

const TRIGGER_TYPE: &str = "httpTrigger";
const OUTPUT_TYPE: &str = "http";

/// Incoming request as handed to an `httpTrigger` function
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestData {
    #[serde(default = "default_method")]
    pub method: String,
    /// Absolute URL or path with query string
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Value,
}

fn default_method() -> String {
    "GET".to_string()
}

impl HttpRequestData {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: default_method(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn into_value(self) -> DomainValue {
        match serde_json::to_value(self) {
            Ok(value) => DomainValue::Json(value),
            Err(e) => DomainValue::String(e.to_string()),
        }
    }

    fn from_domain(value: &DomainValue) -> Result<Self> {
        match value {
            DomainValue::Json(json) => Ok(serde_json::from_value(json.clone())
                .map_err(|e| WeftError::data_format(format!("invalid HTTP request: {}", e)))?),
            DomainValue::String(text) => Ok(serde_json::from_str(text)
                .map_err(|e| WeftError::data_format(format!("invalid HTTP request: {}", e)))?),
            other => Err(WeftError::unsupported(other.kind_name(), "http request")),
        }
    }

    fn parsed_url(&self) -> Result<Url> {
        let base = Url::parse("http://localhost/").map_err(|e| WeftError::data_format(e.to_string()))?;
        base.join(&self.url)
            .map_err(|e| WeftError::data_format(format!("invalid request url '{}': {}", self.url, e)))
    }
}

/// Normalised HTTP output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponseData {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
    pub is_raw: bool,
}

impl Default for HttpResponseData {
    fn default() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: Value::Null,
            is_raw: false,
        }
    }
}

impl HttpResponseData {
    /// Interpret a function's return value
    ///
    /// An object with a `body` key is a response object; anything else is
    /// the body of a 200 response.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Ok(Self {
                body: value,
                ..Default::default()
            });
        };
        if find(&map, "body").is_none() {
            return Ok(Self {
                body: Value::Object(map),
                ..Default::default()
            });
        }

        let mut response = Self {
            body: find(&map, "body").cloned().unwrap_or(Value::Null),
            ..Default::default()
        };

        if let Some(status) = find(&map, "status").or_else(|| find(&map, "statusCode")) {
            response.status = parse_status(status)?;
        }
        if let Some(headers) = find(&map, "headers") {
            let Value::Object(headers) = headers else {
                return Err(WeftError::data_format("response 'headers' must be an object"));
            };
            for (name, value) in headers {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                response.headers.insert(name.clone(), rendered);
            }
        }
        if let Some(is_raw) = find(&map, "isRaw") {
            response.is_raw = is_raw
                .as_bool()
                .ok_or_else(|| WeftError::data_format("response 'isRaw' must be a bool"))?;
        }
        Ok(response)
    }

    pub async fn from_domain(value: DomainValue) -> Result<Self> {
        match value {
            DomainValue::Json(json) => Self::from_value(json),
            DomainValue::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(json @ Value::Object(_)) => Self::from_value(json),
                _ => Ok(Self {
                    body: Value::String(text),
                    ..Default::default()
                }),
            },
            scalar @ (DomainValue::Int32(_) | DomainValue::Bool(_) | DomainValue::Float64(_)) => {
                Ok(Self {
                    body: scalar.to_json_lossy(),
                    ..Default::default()
                })
            }
            other => {
                let bytes = convert::into_bytes(other).await?;
                Ok(Self {
                    body: Value::String(String::from_utf8_lossy(&bytes).into_owned()),
                    ..Default::default()
                })
            }
        }
    }
}

fn find<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

fn parse_status(value: &Value) -> Result<u16> {
    let status = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    status
        .and_then(|s| u16::try_from(s).ok())
        .filter(|s| (100..=999).contains(s))
        .ok_or_else(|| WeftError::data_format(format!("invalid response status {}", value)))
}

// ═══════════════════════════════════════════════════════════════
// ROUTES
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
enum RouteSegment {
    Literal(String),
    Parameter { name: String, optional: bool },
    CatchAll(String),
}

/// Compiled route template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplate {
    route: String,
    segments: Vec<RouteSegment>,
}

impl RouteTemplate {
    pub fn parse(route: &str) -> Result<Self> {
        let malformed = |reason: String| WeftError::MalformedTemplate {
            template: route.to_string(),
            position: 0,
            reason,
        };

        let mut segments = Vec::new();
        for part in route.trim_matches('/').split('/').filter(|p| !p.is_empty()) {
            let Some(inner) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) else {
                if part.contains('{') || part.contains('}') {
                    return Err(malformed(format!("segment '{}' mixes literal text and parameters", part)));
                }
                segments.push(RouteSegment::Literal(part.to_string()));
                continue;
            };

            let (inner, catch_all) = match inner.strip_prefix('*') {
                Some(rest) => (rest, true),
                None => (inner, false),
            };
            let (inner, optional) = match inner.strip_suffix('?') {
                Some(rest) => (rest, true),
                None => (inner, false),
            };
            let name = inner.split(':').next().unwrap_or_default().trim();
            if name.is_empty() {
                return Err(malformed("empty route parameter name".to_string()));
            }

            if catch_all {
                segments.push(RouteSegment::CatchAll(name.to_string()));
            } else {
                segments.push(RouteSegment::Parameter {
                    name: name.to_string(),
                    optional,
                });
            }
        }

        Ok(Self {
            route: route.to_string(),
            segments,
        })
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// Match a request path, returning captured parameters
    pub fn match_path(&self, path: &str) -> Option<BindingData> {
        let mut parts: Vec<&str> = path.trim_matches('/').split('/').filter(|p| !p.is_empty()).collect();
        if parts
            .first()
            .is_some_and(|first| first.eq_ignore_ascii_case(ROUTE_PREFIX))
        {
            parts.remove(0);
        }

        let mut data = BindingData::new();
        let mut index = 0;
        for segment in &self.segments {
            match segment {
                RouteSegment::Literal(text) => {
                    if !parts.get(index)?.eq_ignore_ascii_case(text) {
                        return None;
                    }
                    index += 1;
                }
                RouteSegment::Parameter { name, optional } => match parts.get(index) {
                    Some(value) => {
                        data.insert(name.as_str(), *value);
                        index += 1;
                    }
                    None if *optional => {}
                    None => return None,
                },
                RouteSegment::CatchAll(name) => {
                    data.insert(name.as_str(), parts[index.min(parts.len())..].join("/"));
                    index = parts.len();
                }
            }
        }

        (index == parts.len()).then_some(data)
    }
}

// ═══════════════════════════════════════════════════════════════
// BINDINGS
// ═══════════════════════════════════════════════════════════════

/// `httpTrigger` binding
pub struct HttpTriggerBinding {
    declaration: BindingDeclaration,
    descriptor: AttributeDescriptor,
    route: Option<RouteTemplate>,
}

impl HttpTriggerBinding {
    pub fn new(declaration: &BindingDeclaration, shape: &AttributeShape, names: &dyn NameResolver) -> Result<Self> {
        let properties = resolve_setting_names(declaration, names)?;
        let descriptor = resolve_attribute(shape, &properties)?;
        let route = descriptor.get_str("route").map(RouteTemplate::parse).transpose()?;
        Ok(Self {
            declaration: declaration.clone(),
            descriptor,
            route,
        })
    }

    /// Allowed methods, uppercase; empty means any
    pub fn methods(&self) -> Vec<String> {
        self.descriptor
            .get("methods")
            .and_then(Value::as_array)
            .map(|methods| {
                methods
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_ascii_uppercase)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl FunctionBinding for HttpTriggerBinding {
    fn declaration(&self) -> &BindingDeclaration {
        &self.declaration
    }

    fn can_bind(&self, parameter: ParameterType) -> bool {
        matches!(parameter, ParameterType::Json | ParameterType::String)
    }

    fn synthetic_attribute(&self, parameter: ParameterType) -> Result<AttributeDescriptor> {
        if !self.can_bind(parameter) {
            return Err(unsupported_parameter(&self.declaration, parameter));
        }
        Ok(self.descriptor.clone())
    }

    fn populate_binding_data(&self, trigger_value: Option<&DomainValue>, data: &mut BindingData) -> Result<()> {
        let Some(value) = trigger_value else {
            return Ok(());
        };
        let request = HttpRequestData::from_domain(value)?;
        let url = request.parsed_url()?;

        let methods = self.methods();
        if !methods.is_empty() && !methods.contains(&request.method.to_ascii_uppercase()) {
            return Err(WeftError::data_format(format!(
                "method {} not allowed (expected one of {})",
                request.method,
                methods.join(", ")
            )));
        }

        // route beats query beats body; the caller's own data beats all three
        let mut derived = BindingData::new();
        if let Value::Object(body) = &request.body {
            derived.merge(binding_data_parameters(body));
        }
        for (key, value) in url.query_pairs() {
            derived.insert(key.into_owned(), value.into_owned());
        }
        if let Some(route) = &self.route {
            let params = route.match_path(url.path()).ok_or_else(|| {
                WeftError::data_format(format!(
                    "request path '{}' does not match route '{}'",
                    url.path(),
                    route.route()
                ))
            })?;
            derived.merge(params);
        }
        data.merge_missing(derived);
        Ok(())
    }

    async fn bind(&self, context: &mut BindingContext) -> Result<()> {
        context.attributes.push(self.descriptor.clone());
        context.bound_value = context.input_value.take();
        Ok(())
    }
}

/// `http` output binding
pub struct HttpOutputBinding {
    declaration: BindingDeclaration,
    descriptor: AttributeDescriptor,
}

#[async_trait]
impl FunctionBinding for HttpOutputBinding {
    fn declaration(&self) -> &BindingDeclaration {
        &self.declaration
    }

    fn can_bind(&self, parameter: ParameterType) -> bool {
        matches!(parameter, ParameterType::Json | ParameterType::String)
    }

    fn synthetic_attribute(&self, parameter: ParameterType) -> Result<AttributeDescriptor> {
        if !self.can_bind(parameter) {
            return Err(unsupported_parameter(&self.declaration, parameter));
        }
        Ok(self.descriptor.clone())
    }

    #[instrument(skip(self, context), fields(binding = %self.declaration.name))]
    async fn bind(&self, context: &mut BindingContext) -> Result<()> {
        context.attributes.push(self.descriptor.clone());
        let Some(value) = context.input_value.take() else {
            return Ok(());
        };
        let response = HttpResponseData::from_domain(value).await?;
        context.bound_value = Some(DomainValue::Json(serde_json::to_value(&response)?));
        Ok(())
    }
}

/// Provider for `httpTrigger` and `http`
pub struct HttpBindingProvider {
    shapes: ShapeRegistry,
    names: Arc<dyn NameResolver>,
}

impl HttpBindingProvider {
    pub fn new(names: Arc<dyn NameResolver>) -> Self {
        Self {
            shapes: ShapeRegistry::builtin(),
            names,
        }
    }
}

impl BindingProvider for HttpBindingProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn try_create(&self, declaration: &BindingDeclaration) -> Result<Option<Arc<dyn FunctionBinding>>> {
        let binding_type = declaration.binding_type.as_str();
        let Some(shape) = self.shapes.get(binding_type) else {
            return Ok(None);
        };

        if binding_type.eq_ignore_ascii_case(TRIGGER_TYPE) {
            let binding = HttpTriggerBinding::new(declaration, shape, self.names.as_ref())?;
            return Ok(Some(Arc::new(binding)));
        }
        if binding_type.eq_ignore_ascii_case(OUTPUT_TYPE) {
            let properties = resolve_setting_names(declaration, self.names.as_ref())?;
            let binding = HttpOutputBinding {
                declaration: declaration.clone(),
                descriptor: resolve_attribute(shape, &properties)?,
            };
            return Ok(Some(Arc::new(binding)));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::declaration::Direction;
    use crate::binding::names::EnvNameResolver;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn trigger(props: Value) -> Arc<dyn FunctionBinding> {
        let Value::Object(map) = props else {
            panic!("props must be an object");
        };
        let decl = BindingDeclaration::new("req", "httpTrigger", Direction::In, map).unwrap();
        HttpBindingProvider::new(Arc::new(EnvNameResolver))
            .try_create(&decl)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn route_and_query_parameters() {
        let binding = trigger(json!({"route": "products/{category}/{id:int?}"}));
        let request = HttpRequestData::get("/api/products/books/12?sort=asc&id=query").into_value();

        let mut data = BindingData::new();
        binding.populate_binding_data(Some(&request), &mut data).unwrap();
        assert_eq!(data.get("category"), Some("books"));
        // route wins over query
        assert_eq!(data.get("id"), Some("12"));
        assert_eq!(data.get("sort"), Some("asc"));
    }

    #[test]
    fn caller_binding_data_is_not_overridden() {
        let binding = trigger(json!({"route": "products/{category}"}));
        let mut request = HttpRequestData::get("/api/products/books?sort=asc&region=eu");
        request.body = json!({"sku": "b-1", "Region": "us"});

        let mut data = BindingData::new();
        data.insert("category", "explicit");
        data.insert("SORT", "desc");
        binding.populate_binding_data(Some(&request.into_value()), &mut data).unwrap();

        assert_eq!(data.get("category"), Some("explicit"));
        assert_eq!(data.get("sort"), Some("desc"));
        // query wins over body
        assert_eq!(data.get("region"), Some("eu"));
        assert_eq!(data.get("sku"), Some("b-1"));
    }

    #[test]
    fn optional_and_catch_all_segments() {
        let route = RouteTemplate::parse("files/{id?}").unwrap();
        assert!(route.match_path("/files").is_some());
        assert_eq!(route.match_path("/files/9").unwrap().get("id"), Some("9"));
        assert!(route.match_path("/files/9/extra").is_none());

        let route = RouteTemplate::parse("static/{*rest}").unwrap();
        assert_eq!(
            route.match_path("api/static/css/site.css").unwrap().get("rest"),
            Some("css/site.css")
        );
    }

    #[test]
    fn route_mismatch_and_method_filter() {
        let binding = trigger(json!({"route": "orders/{id}", "methods": ["post"]}));

        let wrong_path = HttpRequestData {
            method: "POST".into(),
            url: "/api/customers/1".into(),
            ..Default::default()
        };
        assert!(binding
            .populate_binding_data(Some(&wrong_path.into_value()), &mut BindingData::new())
            .is_err());

        let wrong_method = HttpRequestData::get("/api/orders/1").into_value();
        let err = binding
            .populate_binding_data(Some(&wrong_method), &mut BindingData::new())
            .unwrap_err();
        assert!(err.to_string().contains("not allowed"));
    }

    #[test]
    fn response_object_with_body() {
        let response = HttpResponseData::from_value(json!({
            "status": "201",
            "headers": {"content-type": "text/plain", "x-count": 3},
            "body": "created",
            "isRaw": true
        }))
        .unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.headers["x-count"], "3");
        assert_eq!(response.body, json!("created"));
        assert!(response.is_raw);
    }

    #[test]
    fn plain_value_is_200_body() {
        let response = HttpResponseData::from_value(json!({"name": "ada"})).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({"name": "ada"}));

        let err = HttpResponseData::from_value(json!({"body": 1, "statusCode": "abc"})).unwrap_err();
        assert_eq!(err.code(), "WEFT-010");
    }

    #[tokio::test]
    async fn output_binding_produces_response() {
        let decl = BindingDeclaration::new("res", "http", Direction::Out, Map::new()).unwrap();
        let binding = HttpBindingProvider::new(Arc::new(EnvNameResolver))
            .try_create(&decl)
            .unwrap()
            .unwrap();

        let mut context = BindingContext::new(BindingData::new(), CancellationToken::new())
            .with_input(Some(DomainValue::from("hello")));
        binding.bind(&mut context).await.unwrap();

        let response = context.bound_value.unwrap();
        assert_eq!(response.as_json().unwrap()["status"], json!(200));
        assert_eq!(response.as_json().unwrap()["body"], json!("hello"));
    }
}
