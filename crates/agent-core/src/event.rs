use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A logical origin: the uri prefix its resources share and the name its settings live under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceId {
    pub name: String,
    pub resource_uri_prefix: String,
}

impl SourceId {
    pub fn new(name: impl Into<String>, resource_uri_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_uri_prefix: resource_uri_prefix.into(),
        }
    }
}

/// One pollable unit of work under a source prefix (a table, a queue, a stream...).
///
/// The engine only cares about `uri`; everything else is carried through to the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub uri: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_in_days: Option<u32>,

    /// Lister specific extras
    #[serde(default, flatten)]
    pub attributes: Map<String, Value>,
}

impl Resource {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            unit: None,
            timezone: None,
            span_in_days: None,
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// A state change found on a resource, forwarded downstream as part of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub uuid: Uuid,
    pub resource_uri: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_unit: Option<String>,

    pub resource_time: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_timezone: Option<String>,

    #[serde(default)]
    pub payload: Value,
}

impl Event {
    pub fn new(resource: &Resource, resource_time: DateTime<Utc>, payload: Value) -> Self {
        Self {
            uuid: Uuid::now_v7(),
            resource_uri: resource.uri.clone(),
            resource_unit: resource.unit.clone(),
            resource_time,
            resource_timezone: resource.timezone.clone(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_keeps_unknown_fields() {
        let resource: Resource = serde_json::from_value(json!({
            "uri": "redis://localhost:6379/0/orders",
            "unit": "daily",
            "key": "orders",
        }))
        .unwrap();

        assert_eq!(resource.uri, "redis://localhost:6379/0/orders");
        assert_eq!(resource.unit.as_deref(), Some("daily"));
        assert_eq!(resource.timezone, None);
        assert_eq!(resource.attribute("key"), Some(&json!("orders")));
    }

    #[test]
    fn test_event_copies_resource_metadata() {
        let mut resource = Resource::new("redis://localhost/0/orders");
        resource.unit = Some("hourly".into());
        resource.timezone = Some("+09:00".into());

        let event = Event::new(&resource, Utc::now(), json!({"length": 3}));

        assert_eq!(event.resource_uri, resource.uri);
        assert_eq!(event.resource_unit.as_deref(), Some("hourly"));
        assert_eq!(event.resource_timezone.as_deref(), Some("+09:00"));
        assert_eq!(event.payload["length"], 3);
    }
}
