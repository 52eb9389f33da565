//! Dispatch of inbound broker messages to registered handlers.
//!
//! Three branches, checked in order against the inbound topic:
//!
//! 1. topic contains the property-set topic: every entry whose key appears in
//!    the payload's `params` object is invoked with that value
//! 2. topic contains the user base: entries whose key equals the topic are
//!    invoked with the whole payload
//! 3. anything else: same exact-topic dispatch as (2)
//!
//! Matching on the topic is by substring, so a property-set topic with a
//! trailing suffix still takes branch (1).

use serde_json::Value;
use tracing::{debug, trace, warn};

use super::{error::TransferError, registry::CallbackRegistry, topic::TopicSet};

#[derive(Debug, Clone)]
pub struct MessageRouter {
    property_set: String,
    user_base: String,
    max_payload: usize,
}

impl MessageRouter {
    pub fn new(topics: &TopicSet, max_payload: usize) -> Self {
        Self {
            property_set: topics.property_set.clone(),
            user_base: topics.user_base.clone(),
            max_payload,
        }
    }

    /// Routes one inbound message and returns how many handlers ran.
    ///
    /// Oversized or malformed payloads are logged and dropped (returns 0).
    pub fn route(&self, registry: &mut CallbackRegistry, topic: &str, payload: &[u8]) -> usize {
        match self.dispatch(registry, topic, payload) {
            Ok(invoked) => {
                trace!("Routed message on '{}' to {} handler(s)", topic, invoked);
                invoked
            }
            Err(e) => {
                warn!("Dropping inbound message on '{}': {}", topic, e);
                0
            }
        }
    }

    fn dispatch(
        &self,
        registry: &mut CallbackRegistry,
        topic: &str,
        payload: &[u8],
    ) -> Result<usize, TransferError> {
        if payload.len() > self.max_payload {
            return Err(TransferError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
        }

        let doc: Value = serde_json::from_slice(payload)?;

        if topic.contains(&self.property_set) {
            return Ok(Self::dispatch_params(registry, &doc));
        }
        if !topic.contains(&self.user_base) {
            debug!("Generic topic dispatch for '{}'", topic);
        }
        Ok(Self::dispatch_topic(registry, topic, &doc))
    }

    fn dispatch_params(registry: &mut CallbackRegistry, doc: &Value) -> usize {
        let Some(params) = doc.get("params").and_then(Value::as_object) else {
            debug!("Property-set message without a params object");
            return 0;
        };

        let mut invoked = 0;
        for entry in registry.iter_mut() {
            if let Some(value) = params.get(&entry.key) {
                if entry.invoke(value) {
                    invoked += 1;
                }
            }
        }
        invoked
    }

    fn dispatch_topic(registry: &mut CallbackRegistry, topic: &str, doc: &Value) -> usize {
        registry
            .iter_mut()
            .filter(|entry| entry.key == topic)
            .map(|entry| entry.invoke(doc))
            .filter(|ran| *ran)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use tracing_test::traced_test;

    use super::*;
    use crate::registry::Handler;

    type Seen = Arc<Mutex<Vec<Value>>>;

    fn recorder(seen: &Seen) -> Handler {
        let seen = seen.clone();
        Box::new(move |v| seen.lock().unwrap().push(v.clone()))
    }

    fn setup() -> (TopicSet, MessageRouter, CallbackRegistry) {
        let topics = TopicSet::new("PK1", "DN1");
        let router = MessageRouter::new(&topics, 1024);
        (topics, router, CallbackRegistry::new())
    }

    #[test]
    fn test_property_set_invokes_only_present_keys() {
        let (topics, router, mut registry) = setup();
        let light: Seen = Default::default();
        let fan: Seen = Default::default();
        registry.bind("LightSwitch", recorder(&light)).unwrap();
        registry.bind("Fan", recorder(&fan)).unwrap();

        let n = router.route(
            &mut registry,
            &topics.property_set,
            br#"{"params":{"LightSwitch":1}}"#,
        );

        assert_eq!(n, 1);
        assert_eq!(*light.lock().unwrap(), vec![json!(1)]);
        assert!(fan.lock().unwrap().is_empty());
    }

    #[test]
    fn test_property_set_matches_by_substring() {
        let (topics, router, mut registry) = setup();
        let seen: Seen = Default::default();
        registry.bind("LightSwitch", recorder(&seen)).unwrap();

        let topic = format!("{}_reply", topics.property_set);
        let n = router.route(&mut registry, &topic, br#"{"params":{"LightSwitch":0}}"#);
        assert_eq!(n, 1);
    }

    #[test]
    fn test_property_set_duplicates_all_invoked() {
        let (topics, router, mut registry) = setup();
        let seen: Seen = Default::default();
        registry.bind("LightSwitch", recorder(&seen)).unwrap();
        registry.bind("LightSwitch", recorder(&seen)).unwrap();

        let n = router.route(
            &mut registry,
            &topics.property_set,
            br#"{"params":{"LightSwitch":1}}"#,
        );
        assert_eq!(n, 2);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_property_set_without_params_invokes_nothing() {
        let (topics, router, mut registry) = setup();
        let seen: Seen = Default::default();
        registry.bind("LightSwitch", recorder(&seen)).unwrap();

        let n = router.route(&mut registry, &topics.property_set, br#"{"LightSwitch":1}"#);
        assert_eq!(n, 0);
    }

    #[test]
    fn test_user_topic_exact_match_gets_full_payload() {
        let (topics, router, mut registry) = setup();
        let status = topics.user_topic("status");
        let seen: Seen = Default::default();
        let other: Seen = Default::default();
        registry.bind(&status, recorder(&seen)).unwrap();
        registry.bind(&topics.user_topic("other"), recorder(&other)).unwrap();

        let n = router.route(&mut registry, &status, br#"{"on":true}"#);

        assert_eq!(n, 1);
        assert_eq!(*seen.lock().unwrap(), vec![json!({"on": true})]);
        assert!(other.lock().unwrap().is_empty());
    }

    #[test]
    fn test_generic_topic_exact_match() {
        let (_, router, mut registry) = setup();
        let seen: Seen = Default::default();
        registry.bind("/custom/topic", recorder(&seen)).unwrap();

        assert_eq!(router.route(&mut registry, "/custom/topic", b"[1,2]"), 1);
        assert_eq!(router.route(&mut registry, "/custom/topic/x", b"[1,2]"), 0);
        assert_eq!(*seen.lock().unwrap(), vec![json!([1, 2])]);
    }

    #[test]
    #[traced_test]
    fn test_malformed_payload_is_dropped() {
        let (topics, router, mut registry) = setup();
        let seen: Seen = Default::default();
        registry.bind("LightSwitch", recorder(&seen)).unwrap();

        let n = router.route(&mut registry, &topics.property_set, b"{not json");
        assert_eq!(n, 0);
        assert!(seen.lock().unwrap().is_empty());
        assert!(logs_contain("Dropping inbound message"));
    }

    #[test]
    #[traced_test]
    fn test_oversized_payload_is_dropped() {
        let topics = TopicSet::new("PK1", "DN1");
        let router = MessageRouter::new(&topics, 16);
        let mut registry = CallbackRegistry::new();
        let seen: Seen = Default::default();
        registry.bind("k", recorder(&seen)).unwrap();

        let payload = br#"{"params":{"k":"0123456789abcdef"}}"#;
        assert_eq!(router.route(&mut registry, &topics.property_set, payload), 0);
        assert!(logs_contain("Payload too large"));
    }

    #[test]
    fn test_unbound_key_is_not_invoked() {
        let (topics, router, mut registry) = setup();
        let seen: Seen = Default::default();
        registry.bind("LightSwitch", recorder(&seen)).unwrap();
        registry.unbind("LightSwitch");

        let n = router.route(
            &mut registry,
            &topics.property_set,
            br#"{"params":{"LightSwitch":1}}"#,
        );
        assert_eq!(n, 0);
        assert!(seen.lock().unwrap().is_empty());
    }
}
