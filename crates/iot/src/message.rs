//! Alink JSON envelopes for outbound property reports and events.

use serde::Serialize;
use serde_json::{Map, Value};

use super::{error::TransferError, queue::PropertyMessage};

/// Protocol version carried in every envelope.
pub const ALINK_VERSION: &str = "1.0";

/// Request id used for every event post.
pub const EVENT_REQUEST_ID: &str = "123";

/// `{"id": "<millis>", "version": "1.0", "params": {key: value}}`
#[derive(Debug, Serialize)]
pub struct PropertyEnvelope<'a> {
    pub id: String,
    pub version: &'a str,
    pub params: Map<String, Value>,
}

impl<'a> PropertyEnvelope<'a> {
    /// Wraps one queued update, using `id` as the request id.
    pub fn new(id: impl Into<String>, message: &PropertyMessage) -> Self {
        let mut params = Map::new();
        params.insert(message.key.clone(), Value::String(message.value.clone()));
        Self {
            id: id.into(),
            version: ALINK_VERSION,
            params,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TransferError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Encoded size of a QoS 0 PUBLISH: fixed header, topic length field, topic
/// and payload. This is the size the client checks against its packet limit.
pub fn publish_packet_size(topic: &str, payload_len: usize) -> usize {
    let remaining = 2 + topic.len() + payload_len;
    let length_bytes = match remaining {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    };
    1 + length_bytes + remaining
}

/// Event ids end up inside a JSON string and a topic level.
fn validate_event_id(event_id: &str) -> Result<(), TransferError> {
    let bad = event_id
        .chars()
        .find(|c| matches!(*c, '"' | '\\' | '/' | '+' | '#') || c.is_control());
    match (event_id.is_empty(), bad) {
        (true, _) => Err(TransferError::InvalidPayload(
            "event id must not be empty".into(),
        )),
        (_, Some(c)) => Err(TransferError::InvalidPayload(format!(
            "event id '{}' contains forbidden character {:?}",
            event_id, c
        ))),
        _ => Ok(()),
    }
}

/// Builds the event post body with `params` embedded verbatim.
///
/// # Errors
/// `TransferError::InvalidPayload` if `event_id` is empty or holds a quote,
/// backslash, control character or topic separator/wildcard, or if `params`
/// is not valid JSON.
pub fn event_payload(event_id: &str, params: &str) -> Result<String, TransferError> {
    validate_event_id(event_id)?;
    serde_json::from_str::<Value>(params)
        .map_err(|e| TransferError::InvalidPayload(format!("event params: {}", e)))?;

    Ok(format!(
        "{{\"id\": \"{}\", \"version\": \"{}\", \"params\": {}, \"method\": \"thing.event.{}.post\"}}",
        EVENT_REQUEST_ID, ALINK_VERSION, params, event_id
    ))
}
