use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Broker-assigned sequence number of a delivery on its channel
pub type DeliveryTag = u64;

/// A task message as handed to the on-message callback.
///
/// The body is left opaque; decoding it is the job of whichever handler
/// is registered for `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub id: Uuid,

    /// Task name used to route the message to a handler (e.g. "send_email")
    pub name: String,

    pub delivery_tag: DeliveryTag,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    pub body: Bytes,
}

impl TaskMessage {
    pub fn new(name: impl Into<String>, body: impl Into<Bytes>) -> Self {
        TaskMessage {
            id: Uuid::new_v4(),
            name: name.into(),
            delivery_tag: 0,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Decode the body as JSON
    pub fn json_body(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message() {
        let msg = TaskMessage::new("echo", &b"hello"[..]).with_header("retries", "0");
        assert_eq!(msg.name, "echo");
        assert_eq!(msg.delivery_tag, 0);
        assert_eq!(msg.body.as_ref(), b"hello");
        assert_eq!(msg.headers.get("retries").map(String::as_str), Some("0"));
    }

    #[test]
    fn test_json_body() {
        let msg = TaskMessage::new("add", &br#"{"x": 1, "y": 2}"#[..]);
        let value = msg.json_body().unwrap();
        assert_eq!(value["x"], 1);

        let bad = TaskMessage::new("add", &b"not json"[..]);
        assert!(bad.json_body().is_err());
    }
}
