use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message on the wire, in either direction.
///
/// Outgoing: `eventType` is the method name and `eventData` its parameters.
/// Incoming: `eventType` is the event name and `eventData` its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMessage {
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(rename = "eventData", default, skip_serializing_if = "Value::is_null")]
    pub event_data: Value,
}

impl HostMessage {
    pub fn new<S: Into<String>>(event_type: S, event_data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            event_data,
        }
    }
}
