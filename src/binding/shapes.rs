//! Built-in attribute shapes
//!
//! Schema registry for the binding kinds shipped with the engine. Extension
//! providers register their own shapes the same way.

use crate::convert::ElementKind;

use super::attribute::AttributeShape;

/// Ordered set of shapes, looked up by binding type (case-insensitive)
#[derive(Debug, Clone, Default)]
pub struct ShapeRegistry {
    shapes: Vec<AttributeShape>,
}

impl ShapeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in binding kind
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for shape in builtin_shapes() {
            registry.register(shape);
        }
        registry
    }

    /// Register a shape; a later shape for the same type replaces the earlier one
    pub fn register(&mut self, shape: AttributeShape) {
        self.shapes
            .retain(|s| !s.binding_type.eq_ignore_ascii_case(&shape.binding_type));
        self.shapes.push(shape);
    }

    pub fn get(&self, binding_type: &str) -> Option<&AttributeShape> {
        self.shapes
            .iter()
            .find(|s| s.binding_type.eq_ignore_ascii_case(binding_type))
    }

    pub fn contains(&self, binding_type: &str) -> bool {
        self.get(binding_type).is_some()
    }

    pub fn binding_types(&self) -> impl Iterator<Item = &str> {
        self.shapes.iter().map(|s| s.binding_type.as_str())
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

fn builtin_shapes() -> Vec<AttributeShape> {
    vec![
        // ═══════════════════════════════════════════
        // STORAGE
        // ═══════════════════════════════════════════
        AttributeShape::new("blob", "BlobAttribute")
            .constructor(&["path"])
            .constructor(&["path", "access"])
            .property("connection")
            .element(ElementKind::Bytes),
        AttributeShape::new("blobTrigger", "BlobTriggerAttribute")
            .constructor(&["path"])
            .property("connection")
            .element(ElementKind::Bytes),
        AttributeShape::new("queue", "QueueAttribute")
            .constructor(&["queueName"])
            .property("connection")
            .collector(),
        AttributeShape::new("queueTrigger", "QueueTriggerAttribute")
            .constructor(&["queueName"])
            .property("connection"),
        AttributeShape::new("table", "TableAttribute")
            .constructor(&["tableName"])
            .constructor(&["tableName", "partitionKey"])
            .constructor(&["tableName", "partitionKey", "rowKey"])
            .property("filter")
            .property("take")
            .property("connection")
            .element(ElementKind::Json)
            .collector(),
        AttributeShape::new("timerTrigger", "TimerTriggerAttribute")
            .constructor(&["schedule"])
            .property("runOnStartup")
            .property("useMonitor"),
        // ═══════════════════════════════════════════
        // MESSAGING
        // ═══════════════════════════════════════════
        AttributeShape::new("eventHub", "EventHubAttribute")
            .constructor(&["path"])
            .property("connection")
            .collector(),
        AttributeShape::new("eventHubTrigger", "EventHubTriggerAttribute")
            .constructor(&["path"])
            .property("consumerGroup")
            .property("connection"),
        AttributeShape::new("serviceBus", "ServiceBusAttribute")
            .constructor(&["queueName"])
            .constructor(&["topicName"])
            .property("accessRights")
            .property("connection")
            .collector(),
        AttributeShape::new("serviceBusTrigger", "ServiceBusTriggerAttribute")
            .constructor(&["queueName"])
            .constructor(&["topicName", "subscriptionName"])
            .property("accessRights")
            .property("connection"),
        // ═══════════════════════════════════════════
        // DOCUMENTS
        // ═══════════════════════════════════════════
        AttributeShape::new("documentDB", "DocumentDBAttribute")
            .constructor(&["databaseName", "collectionName"])
            .property("id")
            .property("sqlQuery")
            .property("partitionKey")
            .property("createIfNotExists")
            .property("connection")
            .element(ElementKind::Json)
            .collector(),
        AttributeShape::new("cosmosDBTrigger", "CosmosDBTriggerAttribute")
            .constructor(&["databaseName", "collectionName"])
            .property("connectionStringSetting")
            .property("leaseCollectionName")
            .property("createLeaseCollectionIfNotExists")
            .nullable_property("maxItemsPerInvocation")
            .element(ElementKind::Json),
        AttributeShape::new("mobileTable", "MobileTableAttribute")
            .constructor(&[])
            .constructor(&["tableName"])
            .property("id")
            .property("connection")
            .property("apiKey")
            .element(ElementKind::Json)
            .collector(),
        // ═══════════════════════════════════════════
        // NOTIFICATIONS
        // ═══════════════════════════════════════════
        AttributeShape::new("notificationHub", "NotificationHubAttribute")
            .constructor(&[])
            .property("hubName")
            .property("tagExpression")
            .property("platform")
            .property("connection")
            .element(ElementKind::Json)
            .collector(),
        AttributeShape::new("sendGrid", "SendGridAttribute")
            .constructor(&[])
            .property("to")
            .property("from")
            .property("subject")
            .property("text")
            .property("apiKey")
            .element(ElementKind::Json)
            .collector(),
        AttributeShape::new("twilioSms", "TwilioSmsAttribute")
            .constructor(&[])
            .property("to")
            .property("from")
            .property("body")
            .property("accountSid")
            .property("authToken")
            .element(ElementKind::Json)
            .collector(),
        // ═══════════════════════════════════════════
        // API HUB
        // ═══════════════════════════════════════════
        AttributeShape::new("apiHubFile", "ApiHubFileAttribute")
            .constructor(&["connection", "path"])
            .constructor(&["connection", "path", "access"])
            .element(ElementKind::Bytes),
        AttributeShape::new("apiHubFileTrigger", "ApiHubFileTriggerAttribute")
            .constructor(&["connection", "path"])
            .property("pollIntervalInSeconds")
            .element(ElementKind::Bytes),
        AttributeShape::new("apiHubTable", "ApiHubTableAttribute")
            .constructor(&["connection"])
            .property("dataSetName")
            .property("tableName")
            .property("entityId")
            .element(ElementKind::Json),
        // ═══════════════════════════════════════════
        // HTTP
        // ═══════════════════════════════════════════
        AttributeShape::new("http", "HttpResponseAttribute")
            .constructor(&[])
            .element(ElementKind::Json),
        AttributeShape::new("httpTrigger", "HttpTriggerAttribute")
            .constructor(&[])
            .property("route")
            .property("methods")
            .property("authLevel")
            .property("webHookType")
            .element(ElementKind::Json),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_all_kinds() {
        let registry = ShapeRegistry::builtin();
        for kind in [
            "blob",
            "blobTrigger",
            "queue",
            "queueTrigger",
            "table",
            "timerTrigger",
            "eventHub",
            "eventHubTrigger",
            "serviceBus",
            "serviceBusTrigger",
            "documentDB",
            "cosmosDBTrigger",
            "mobileTable",
            "notificationHub",
            "sendGrid",
            "twilioSms",
            "apiHubFile",
            "apiHubFileTrigger",
            "apiHubTable",
            "http",
            "httpTrigger",
        ] {
            assert!(registry.contains(kind), "missing shape for {}", kind);
        }
        assert_eq!(registry.len(), 21);
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = ShapeRegistry::builtin();
        let shape = registry.get("QUEUE").unwrap();
        assert_eq!(shape.attribute, "QueueAttribute");
        assert!(shape.is_collector());
        assert!(!registry.get("blob").unwrap().is_collector());
    }

    #[test]
    fn register_replaces_same_type() {
        let mut registry = ShapeRegistry::builtin();
        registry.register(AttributeShape::new("Queue", "CustomQueue").constructor(&["name"]));
        assert_eq!(registry.len(), 21);
        assert_eq!(registry.get("queue").unwrap().attribute, "CustomQueue");
    }
}
