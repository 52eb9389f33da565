//! Routing-key to handler bindings.
//!
//! A routing key is either a property identifier (matched against the keys of
//! an inbound property-set `params` object) or a full topic string (matched
//! exactly). Duplicate keys are allowed; every matching entry is invoked in
//! insertion order. Lookups are linear scans.

use std::fmt;

use serde_json::Value;

use super::error::TransferError;

/// Callback invoked with the routed JSON value.
///
/// For property-set routing this is the value under the matched key; for
/// topic routing it is the whole parsed payload.
pub type Handler = Box<dyn FnMut(&Value) + Send>;

/// One registry slot. An empty `handler` marks the slot as reusable.
pub struct CallbackEntry {
    pub key: String,
    handler: Option<Handler>,
}

impl CallbackEntry {
    /// Invokes the handler if the slot is occupied. Returns whether it ran.
    pub fn invoke(&mut self, value: &Value) -> bool {
        match self.handler.as_mut() {
            Some(handler) => {
                handler(value);
                true
            }
            None => false,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.handler.is_some()
    }
}

impl fmt::Debug for CallbackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackEntry")
            .field("key", &self.key)
            .field("bound", &self.is_bound())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct CallbackRegistry {
    entries: Vec<CallbackEntry>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `key`.
    ///
    /// The first slot whose handler was detached is reused (its key is
    /// overwritten); otherwise a new entry is appended.
    ///
    /// # Errors
    /// `TransferError::InvalidBinding` for an empty key.
    pub fn bind(&mut self, key: &str, handler: Handler) -> Result<(), TransferError> {
        if key.is_empty() {
            return Err(TransferError::InvalidBinding(
                "routing key must not be empty".into(),
            ));
        }

        match self.entries.iter_mut().find(|e| !e.is_bound()) {
            Some(slot) => {
                slot.key = key.to_string();
                slot.handler = Some(handler);
            }
            None => self.entries.push(CallbackEntry {
                key: key.to_string(),
                handler: Some(handler),
            }),
        }
        Ok(())
    }

    /// Removes the first entry whose key equals `key`. Later duplicates stay.
    pub fn unbind(&mut self, key: &str) -> bool {
        match self.entries.iter().position(|e| e.key == key) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Empties the handler of the first bound entry with `key`, keeping the slot
    /// for reuse by a later `bind`.
    pub fn detach(&mut self, key: &str) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| e.key == key && e.is_bound())
        {
            Some(entry) => {
                entry.handler = None;
                true
            }
            None => false,
        }
    }

    /// Number of slots, bound or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries with `key` that currently hold a handler.
    pub fn count_bound(&self, key: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.key == key && e.is_bound())
            .count()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CallbackEntry> {
        self.entries.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use serde_json::json;

    use super::*;

    fn counting(counter: &Arc<AtomicUsize>) -> Handler {
        let counter = counter.clone();
        Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_bind_rejects_empty_key() {
        let mut registry = CallbackRegistry::new();
        let result = registry.bind("", Box::new(|_| {}));
        assert!(matches!(result, Err(TransferError::InvalidBinding(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_bind_then_unbind() {
        let mut registry = CallbackRegistry::new();
        registry.bind("LightSwitch", Box::new(|_| {})).unwrap();
        assert_eq!(registry.count_bound("LightSwitch"), 1);

        assert!(registry.unbind("LightSwitch"));
        assert_eq!(registry.count_bound("LightSwitch"), 0);
        assert!(!registry.unbind("LightSwitch"));
    }

    #[test]
    fn test_duplicate_keys_all_kept() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = CallbackRegistry::new();
        registry.bind("k", counting(&hits)).unwrap();
        registry.bind("k", counting(&hits)).unwrap();
        assert_eq!(registry.count_bound("k"), 2);

        for entry in registry.iter_mut().filter(|e| e.key == "k") {
            entry.invoke(&json!(1));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unbind_removes_only_first_duplicate() {
        let mut registry = CallbackRegistry::new();
        registry.bind("k", Box::new(|_| {})).unwrap();
        registry.bind("k", Box::new(|_| {})).unwrap();

        assert!(registry.unbind("k"));
        assert_eq!(registry.count_bound("k"), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_detached_slot_is_reused() {
        let mut registry = CallbackRegistry::new();
        registry.bind("a", Box::new(|_| {})).unwrap();
        registry.bind("b", Box::new(|_| {})).unwrap();

        assert!(registry.detach("a"));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.count_bound("a"), 0);

        registry.bind("c", Box::new(|_| {})).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.count_bound("c"), 1);
    }

    #[test]
    fn test_detached_entry_is_not_invoked() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = CallbackRegistry::new();
        registry.bind("k", counting(&hits)).unwrap();
        registry.detach("k");

        let ran = registry.iter_mut().map(|e| e.invoke(&json!(null))).any(|r| r);
        assert!(!ran);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
