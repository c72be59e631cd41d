use std::sync::Arc;

use dashmap::DashMap;

use crate::realtime::channel::DeliveryChannel;

/// In-memory map from an authenticated user id to its single live delivery
/// channel. The whole structure is process-lifetime state: nothing here is
/// persisted, and a restart starts empty.
///
/// Registration is last-writer-wins; the replaced channel is neither closed
/// nor notified. Unregistration is identity-checked so a slow disconnect of
/// an old connection can never evict a newer registration for the same user.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<dyn DeliveryChannel>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Install `channel` as the live session for `user_id`, replacing any
    /// prior mapping.
    pub fn register(&self, user_id: &str, channel: Arc<dyn DeliveryChannel>) {
        self.sessions.insert(user_id.to_owned(), channel);
    }

    /// Drop the mapping whose installed channel is exactly `channel`.
    /// Returns false when the channel was not installed anywhere, which is
    /// the normal outcome for a stale disconnect racing a reconnect.
    pub fn unregister(&self, channel: &dyn DeliveryChannel) -> bool {
        let connection_id = channel.connection_id();
        let mut removed = false;

        self.sessions.retain(|_, installed| {
            if installed.connection_id() == connection_id {
                removed = true;
                false
            } else {
                true
            }
        });

        removed
    }

    pub fn lookup(&self, user_id: &str) -> Option<Arc<dyn DeliveryChannel>> {
        self.sessions
            .get(user_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::channel::QueueChannel;

    #[test]
    fn register_replaces_prior_channel() {
        let registry = SessionRegistry::new();
        let (first, _rx_first) = QueueChannel::open();
        let (second, _rx_second) = QueueChannel::open();

        registry.register("u1", first);
        registry.register("u1", second.clone());

        let installed = registry.lookup("u1").expect("session installed");
        assert_eq!(installed.connection_id(), second.connection_id());
        assert_eq!(registry.connected_count(), 1);
    }

    #[test]
    fn stale_disconnect_does_not_evict_newer_session() {
        let registry = SessionRegistry::new();
        let (old, _rx_old) = QueueChannel::open();
        let (new, _rx_new) = QueueChannel::open();

        registry.register("u1", old.clone());
        registry.register("u1", new.clone());

        // The old connection's disconnect arrives after the reconnect.
        assert!(!registry.unregister(old.as_ref()));

        let installed = registry.lookup("u1").expect("session still installed");
        assert_eq!(installed.connection_id(), new.connection_id());
    }

    #[test]
    fn unregister_removes_matching_session() {
        let registry = SessionRegistry::new();
        let (channel, _rx) = QueueChannel::open();

        registry.register("u1", channel.clone());
        assert!(registry.unregister(channel.as_ref()));
        assert!(registry.lookup("u1").is_none());
        assert_eq!(registry.connected_count(), 0);
    }

    #[test]
    fn lookup_misses_for_offline_user() {
        let registry = SessionRegistry::new();
        assert!(registry.lookup("ghost").is_none());
    }
}
