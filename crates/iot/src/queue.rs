//! Pending property updates awaiting the next drain tick.
//!
//! `send_property` only appends here; nothing is published until the manager
//! drains the queue. Delivery is at-most-once: an entry leaves the queue when
//! it is drained, whether or not its publish succeeds.

use std::{collections::VecDeque, fmt};

use tracing::warn;

/// Property value accepted by `send_property`.
///
/// Every variant is reported as its textual form (a JSON string on the wire).
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Bool(bool),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Text(s) => f.write_str(s),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::UInt(v) => write!(f, "{}", v),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::Double(v) => write!(f, "{}", v),
            PropertyValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Text(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Text(v.to_string())
    }
}

impl From<&String> for PropertyValue {
    fn from(v: &String) -> Self {
        PropertyValue::Text(v.clone())
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v as i64)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        PropertyValue::UInt(v as u64)
    }
}

impl From<u64> for PropertyValue {
    fn from(v: u64) -> Self {
        PropertyValue::UInt(v)
    }
}

impl From<f32> for PropertyValue {
    fn from(v: f32) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

/// A queued `{key, value}` update, value already in textual form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMessage {
    pub key: String,
    pub value: String,
}

impl PropertyMessage {
    pub fn new(key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into().to_string(),
        }
    }
}

/// FIFO of property updates bounded by `capacity`.
///
/// When full, the oldest entry is discarded to make room.
#[derive(Debug)]
pub struct OutboundQueue {
    entries: VecDeque<PropertyMessage>,
    capacity: usize,
}

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Appends a message, returning the entry evicted to make room, if any.
    pub fn push(&mut self, message: PropertyMessage) -> Option<PropertyMessage> {
        let evicted = if self.entries.len() >= self.capacity {
            let dropped = self.entries.pop_front();
            if let Some(ref d) = dropped {
                warn!(
                    "Outbound queue full ({} entries), dropping oldest update for '{}'",
                    self.capacity, d.key
                );
            }
            dropped
        } else {
            None
        };
        self.entries.push_back(message);
        evicted
    }

    /// Removes and returns every queued entry in insertion order.
    pub fn take_all(&mut self) -> Vec<PropertyMessage> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyMessage> {
        self.entries.iter()
    }
}
