//! End-to-end: function.json on disk → index → invoke → binder side effects

use std::fs;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use weft::binding::{
    default_registry, load_function_metadata, DictionaryNameResolver, HttpRequestData, MemoryBinder,
};
use weft::config::HostConfig;
use weft::convert::DomainValue;
use weft::runtime::{body_fn, FunctionExecutor, FunctionIndexer, FunctionOutputs, IndexReport, InvocationRequest};

fn write_function(root: &std::path::Path, name: &str, json: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("function.json"), json).unwrap();
}

fn index(root: &std::path::Path, binder: &MemoryBinder, indexer: impl FnOnce(FunctionIndexer) -> FunctionIndexer) -> IndexReport {
    let mut settings = std::collections::HashMap::new();
    settings.insert("ImagesContainer".to_string(), "images".to_string());
    let registry = default_registry(
        Arc::new(binder.clone()),
        Arc::new(DictionaryNameResolver::new(settings)),
    );
    let loaded = load_function_metadata(root).unwrap();
    let report = indexer(FunctionIndexer::new(registry)).index_loaded(&loaded);
    assert!(report.is_ok(), "{:?}", report.errors);
    report
}

#[tokio::test]
async fn test_queue_output_goes_to_templated_destination() {
    let temp_dir = TempDir::new().unwrap();
    write_function(
        temp_dir.path(),
        "Forward",
        r#"{
            "bindings": [
                { "name": "msg", "type": "queueTrigger", "queueName": "incoming" },
                { "name": "out", "type": "queue", "direction": "out", "queueName": "out-{id}" }
            ]
        }"#,
    );

    let binder = MemoryBinder::new();
    let report = index(temp_dir.path(), &binder, |indexer| {
        indexer.body(
            "Forward",
            body_fn(|mut call| async move {
                let message = call.take_input("msg").unwrap_or_else(|| DomainValue::from(""));
                Ok(FunctionOutputs::from([("out".to_string(), message)]))
            }),
        )
    });
    let function = report.get("Forward").unwrap();

    FunctionExecutor::new(&HostConfig::default())
        .invoke(function, InvocationRequest::new("hello").with_data("id", "42"))
        .await
        .unwrap();

    assert_eq!(binder.destinations(), vec!["out-42".to_string()]);
    assert_eq!(binder.values("out-42"), vec![json!("hello")]);
}

#[tokio::test]
async fn test_json_array_output_fans_out_and_payload_feeds_binding_data() {
    let temp_dir = TempDir::new().unwrap();
    write_function(
        temp_dir.path(),
        "Split",
        r#"{
            "bindings": [
                { "name": "order", "type": "queueTrigger", "queueName": "orders" },
                { "name": "$return", "type": "queue", "direction": "out", "queueName": "lines-{customer}" }
            ]
        }"#,
    );

    let binder = MemoryBinder::new();
    let report = index(temp_dir.path(), &binder, |indexer| {
        indexer.body(
            "Split",
            body_fn(|_call| async move {
                Ok(FunctionOutputs::from([(
                    "$return".to_string(),
                    DomainValue::from(json!([{"sku": "a"}, {"sku": "b"}])),
                )]))
            }),
        )
    });

    FunctionExecutor::new(&HostConfig::default())
        .invoke(
            report.get("Split").unwrap(),
            InvocationRequest::new(r#"{"customer":"contoso","total":12}"#),
        )
        .await
        .unwrap();

    assert_eq!(binder.count("lines-contoso"), 2);
    assert_eq!(
        binder.values("lines-contoso"),
        vec![json!(r#"{"sku":"a"}"#), json!(r#"{"sku":"b"}"#)]
    );
}

#[tokio::test]
async fn test_blob_trigger_path_drives_input_binding() {
    let temp_dir = TempDir::new().unwrap();
    write_function(
        temp_dir.path(),
        "Thumbnail",
        r#"{
            "bindings": [
                { "name": "image", "type": "blobTrigger", "path": "%ImagesContainer%/{name}.{ext}" },
                { "name": "meta", "type": "blob", "direction": "in", "path": "metadata/{name}.json", "dataType": "string" },
                { "name": "thumb", "type": "blob", "direction": "out", "path": "thumbs/{name}-small.{ext}" }
            ]
        }"#,
    );

    let binder = MemoryBinder::new();
    binder.seed("metadata/cat.json", r#"{"width":640}"#);
    let report = index(temp_dir.path(), &binder, |indexer| {
        indexer.body(
            "Thumbnail",
            body_fn(|call| async move {
                let meta = call.input("meta").and_then(DomainValue::as_str).unwrap_or_default().to_string();
                assert_eq!(call.context.binding_data().get("name"), Some("cat"));
                Ok(FunctionOutputs::from([("thumb".to_string(), DomainValue::from(meta))]))
            }),
        )
    });

    FunctionExecutor::new(&HostConfig::default())
        .invoke(
            report.get("Thumbnail").unwrap(),
            InvocationRequest::new(b"\x89PNG".to_vec()).with_data("blobTrigger", "images/cat.png"),
        )
        .await
        .unwrap();

    assert_eq!(binder.values("thumbs/cat-small.png"), vec![json!(r#"{"width":640}"#)]);
}

#[tokio::test]
async fn test_http_route_and_response() {
    let temp_dir = TempDir::new().unwrap();
    write_function(
        temp_dir.path(),
        "Products",
        r#"{
            "bindings": [
                { "name": "req", "type": "httpTrigger", "route": "products/{category}/{id?}", "methods": ["get"] },
                { "name": "$return", "type": "http", "direction": "out" }
            ]
        }"#,
    );

    let binder = MemoryBinder::new();
    let report = index(temp_dir.path(), &binder, |indexer| {
        indexer.body(
            "Products",
            body_fn(|call| async move {
                let data = call.context.binding_data();
                let response = json!({
                    "status": "201",
                    "headers": { "content-type": "application/json" },
                    "body": {
                        "category": data.get("category"),
                        "id": data.get("id"),
                        "sort": data.get("sort"),
                    }
                });
                Ok(FunctionOutputs::from([("$return".to_string(), DomainValue::from(response))]))
            }),
        )
    });

    let request = HttpRequestData::get("http://localhost/api/products/garden/7?sort=asc").into_value();
    let result = FunctionExecutor::new(&HostConfig::default())
        .invoke(report.get("Products").unwrap(), InvocationRequest::new(request))
        .await
        .unwrap();

    let response = result.outputs.get("$return").and_then(DomainValue::as_json).cloned().unwrap();
    assert_eq!(response["status"], json!(201));
    assert_eq!(response["headers"]["content-type"], json!("application/json"));
    assert_eq!(
        response["body"],
        json!({ "category": "garden", "id": "7", "sort": "asc" })
    );
}

#[tokio::test]
async fn test_http_method_not_allowed_fails_before_body() {
    let temp_dir = TempDir::new().unwrap();
    write_function(
        temp_dir.path(),
        "ReadOnly",
        r#"{
            "bindings": [
                { "name": "req", "type": "httpTrigger", "methods": ["get"] }
            ]
        }"#,
    );

    let binder = MemoryBinder::new();
    let report = index(temp_dir.path(), &binder, |indexer| indexer);

    let mut request = HttpRequestData::get("/api/ReadOnly");
    request.method = "DELETE".to_string();
    let err = FunctionExecutor::new(&HostConfig::default())
        .invoke(report.get("ReadOnly").unwrap(), InvocationRequest::new(request.into_value()))
        .await
        .unwrap_err();
    assert_eq!(err.root().code(), "WEFT-010");
}
