//! Typed JSON encoding of queue message bodies.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::QueueError;
use crate::transport::Delivery;

/// Decode a message body into `T`.
pub fn decode<T: DeserializeOwned>(msg: &Delivery) -> Result<T, QueueError> {
    serde_json::from_str(&msg.body)
        .map_err(|e| QueueError::Parse(format!("Invalid message {}: {}", msg.message_id, e)))
}

pub fn encode<T: Serialize>(value: &T) -> Result<String, QueueError> {
    serde_json::to_string(value).map_err(|e| QueueError::Parse(format!("encode failed: {e}")))
}
