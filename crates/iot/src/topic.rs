//! Canonical Alink topic strings for one device.
//!
//! Computed once from `(product_key, device_name)` and owned by the manager
//! for the life of the process.

/// The four canonical topics plus helpers for derived ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    /// Outbound property reports.
    pub property_post: String,
    /// Inbound property-set commands from the cloud.
    pub property_set: String,
    /// Prefix for event posts.
    pub event_base: String,
    /// Prefix for user-defined topics.
    pub user_base: String,
}

impl TopicSet {
    pub fn new(product_key: &str, device_name: &str) -> Self {
        let root = format!("/sys/{}/{}/thing", product_key, device_name);
        Self {
            property_post: format!("{}/event/property/post", root),
            property_set: format!("{}/service/property/set", root),
            event_base: format!("{}/event", root),
            user_base: format!("{}/event/user", root),
        }
    }

    /// `"{event_base}/{event_id}/post"`.
    pub fn event_post(&self, event_id: &str) -> String {
        format!("{}/{}/post", self.event_base, event_id)
    }

    /// Joins a suffix under the user base, tolerating a leading `/`.
    ///
    /// ```ignore
    /// topics.user_topic("status") == topics.user_topic("/status")
    /// ```
    pub fn user_topic(&self, suffix: &str) -> String {
        format!(
            "{}/{}",
            self.user_base.trim_end_matches('/'),
            suffix.trim_start_matches('/')
        )
    }
}
