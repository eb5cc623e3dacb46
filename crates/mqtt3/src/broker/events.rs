//! Activity notification hook.
//!
//! Deployments that want to signal client activity (status LEDs, metrics
//! shippers, audit logs) implement [`ActivityListener`] and attach it via
//! [`crate::broker::BrokerConfig::with_activity_listener`]. Callbacks are
//! fire-and-forget from the broker's perspective: implementations must not
//! block, and nothing in protocol processing depends on them.

use std::net::SocketAddr;

#[allow(unused_variables)]
pub trait ActivityListener: Send + Sync {
    /// A client completed its CONNECT handshake.
    fn on_client_connected(&self, client_id: &str, addr: SocketAddr) {}

    /// A client's session ended (graceful or abrupt).
    fn on_client_disconnected(&self, client_id: &str, addr: SocketAddr) {}

    /// A PUBLISH was accepted for routing.
    fn on_publish(&self, topic: &str, payload_len: usize) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingListener {
        connects: AtomicUsize,
        publishes: AtomicUsize,
    }

    impl ActivityListener for CountingListener {
        fn on_client_connected(&self, _client_id: &str, _addr: SocketAddr) {
            self.connects.fetch_add(1, Ordering::Relaxed);
        }

        fn on_publish(&self, _topic: &str, _payload_len: usize) {
            self.publishes.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_default_methods_are_no_ops() {
        struct Silent;
        impl ActivityListener for Silent {}

        let listener = Silent;
        let addr = "127.0.0.1:1".parse().unwrap();
        listener.on_client_connected("c1", addr);
        listener.on_client_disconnected("c1", addr);
        listener.on_publish("a/b", 3);
    }

    #[test]
    fn test_partial_override() {
        let listener = CountingListener::default();
        let addr = "127.0.0.1:1".parse().unwrap();
        listener.on_client_connected("c1", addr);
        listener.on_client_disconnected("c1", addr);
        listener.on_publish("a/b", 3);
        assert_eq!(listener.connects.load(Ordering::Relaxed), 1);
        assert_eq!(listener.publishes.load(Ordering::Relaxed), 1);
    }
}
