//! Message routing: the shared topic-subscription table and publish fan-out.

use crate::broker::sessions::SessionRegistry;
use mqtt3_protocol::packet::PublishPacket;
use mqtt3_protocol::{topic_matches_filter, QoS};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

/// One registered subscription: a topic filter owned by a session.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Connection identity of the subscribing session.
    pub identity: SocketAddr,
    /// Client id at subscribe time, kept for logging.
    pub client_id: String,
    /// Granted QoS; deliveries are downgraded to min(publish, granted).
    pub qos: QoS,
}

/// The topic registry.
///
/// Filters without wildcards live in `exact_subscriptions` for O(1) lookup
/// on the publish path; wildcard filters are scanned and matched. Both maps
/// are process-wide and mutated by every connection handler, serialized
/// behind their locks.
pub struct MessageRouter {
    exact_subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    wildcard_subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    sessions: Arc<SessionRegistry>,
}

impl MessageRouter {
    #[must_use]
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self {
            exact_subscriptions: RwLock::new(HashMap::new()),
            wildcard_subscriptions: RwLock::new(HashMap::new()),
            sessions,
        }
    }

    fn has_wildcards(topic_filter: &str) -> bool {
        topic_filter.contains('+') || topic_filter.contains('#')
    }

    /// Registers a subscription. Re-subscribing the same filter from the
    /// same session replaces the stored entry (updating the granted QoS)
    /// rather than appending a duplicate, so a publish is never delivered
    /// twice through one filter.
    ///
    /// Returns true when the subscription is new.
    pub async fn subscribe(
        &self,
        identity: SocketAddr,
        client_id: &str,
        topic_filter: &str,
        qos: QoS,
    ) -> bool {
        let subscription = Subscription {
            identity,
            client_id: client_id.to_string(),
            qos,
        };

        let subscriptions = if Self::has_wildcards(topic_filter) {
            &self.wildcard_subscriptions
        } else {
            &self.exact_subscriptions
        };

        let mut subs_map = subscriptions.write().await;
        let subs = subs_map.entry(topic_filter.to_string()).or_default();
        if let Some(pos) = subs.iter().position(|s| s.identity == identity) {
            subs[pos] = subscription;
            debug!(client_id, topic_filter, "Subscription updated");
            false
        } else {
            subs.push(subscription);
            debug!(client_id, topic_filter, "Subscribed");
            true
        }
    }

    /// Removes one subscription. Returns false if it was not present.
    pub async fn unsubscribe(&self, identity: SocketAddr, topic_filter: &str) -> bool {
        let subscriptions = if Self::has_wildcards(topic_filter) {
            &self.wildcard_subscriptions
        } else {
            &self.exact_subscriptions
        };

        let mut subs_map = subscriptions.write().await;
        let Some(subs) = subs_map.get_mut(topic_filter) else {
            return false;
        };

        let initial_len = subs.len();
        subs.retain(|sub| sub.identity != identity);
        let removed = subs.len() != initial_len;
        if subs.is_empty() {
            subs_map.remove(topic_filter);
        }
        if removed {
            debug!(addr = %identity, topic_filter, "Unsubscribed");
        }
        removed
    }

    /// Drops every subscription owned by a session. Called on disconnect
    /// and on abrupt close; a second call is a no-op.
    pub async fn remove_session(&self, identity: SocketAddr) {
        {
            let mut exact = self.exact_subscriptions.write().await;
            for subs in exact.values_mut() {
                subs.retain(|sub| sub.identity != identity);
            }
            exact.retain(|_, subs| !subs.is_empty());
        }
        {
            let mut wildcard = self.wildcard_subscriptions.write().await;
            for subs in wildcard.values_mut() {
                subs.retain(|sub| sub.identity != identity);
            }
            wildcard.retain(|_, subs| !subs.is_empty());
        }
        debug!(addr = %identity, "Removed all subscriptions for session");
    }

    /// Fans a publish out to every session with a matching filter, in
    /// registry iteration order (order across subscribers is not a
    /// guarantee of the protocol).
    ///
    /// A per-subscriber delivery failure removes that one subscription and
    /// the fan-out continues; the publisher's call never fails.
    ///
    /// Returns the number of deliveries handed off.
    pub async fn route_message(&self, publish: &PublishPacket) -> usize {
        trace!(topic = %publish.topic_name, "Routing message");

        let mut delivered = 0;
        let mut failed: Vec<(String, SocketAddr)> = Vec::new();

        {
            let exact = self.exact_subscriptions.read().await;
            let wildcard = self.wildcard_subscriptions.read().await;

            if let Some(subs) = exact.get(&publish.topic_name) {
                for sub in subs {
                    if self.deliver_to_subscriber(sub, publish).await {
                        delivered += 1;
                    } else {
                        failed.push((publish.topic_name.clone(), sub.identity));
                    }
                }
            }

            for (topic_filter, subs) in wildcard.iter() {
                if topic_matches_filter(&publish.topic_name, topic_filter) {
                    for sub in subs {
                        if self.deliver_to_subscriber(sub, publish).await {
                            delivered += 1;
                        } else {
                            failed.push((topic_filter.clone(), sub.identity));
                        }
                    }
                }
            }
        }

        for (topic_filter, identity) in failed {
            warn!(addr = %identity, topic_filter, "Dropping subscription after delivery failure");
            self.unsubscribe(identity, &topic_filter).await;
        }

        delivered
    }

    async fn deliver_to_subscriber(&self, sub: &Subscription, publish: &PublishPacket) -> bool {
        let Some(session) = self.sessions.get(sub.identity).await else {
            return false;
        };

        let mut message = publish.clone();
        message.qos = publish.qos.min_with(sub.qos);
        message.dup = false;
        // the receiving connection task assigns its own packet id
        message.packet_id = None;

        if session.deliver(message) {
            true
        } else {
            warn!(
                client_id = %sub.client_id,
                topic = %publish.topic_name,
                "Delivery channel failed"
            );
            false
        }
    }

    /// Number of distinct filters with at least one subscriber.
    pub async fn topic_count(&self) -> usize {
        let exact = self.exact_subscriptions.read().await;
        let wildcard = self.wildcard_subscriptions.read().await;
        exact.len() + wildcard.len()
    }

    /// Number of subscriptions held by one session.
    pub async fn subscription_count_for(&self, identity: SocketAddr) -> usize {
        let exact = self.exact_subscriptions.read().await;
        let wildcard = self.wildcard_subscriptions.read().await;
        exact
            .values()
            .chain(wildcard.values())
            .flat_map(|subs| subs.iter())
            .filter(|sub| sub.identity == identity)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqtt3_protocol::packet::PublishPacket;
    use tokio::sync::oneshot;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    async fn register(
        sessions: &SessionRegistry,
        port: u16,
    ) -> (SocketAddr, flume::Receiver<PublishPacket>) {
        let identity = addr(port);
        let (tx, rx) = flume::bounded(64);
        let (dtx, _drx) = oneshot::channel();
        sessions.get_or_create(identity, tx, dtx).await;
        (identity, rx)
    }

    #[tokio::test]
    async fn test_exact_and_wildcard_fan_out() {
        let sessions = Arc::new(SessionRegistry::new());
        let router = MessageRouter::new(Arc::clone(&sessions));

        let (id1, rx1) = register(&sessions, 2001).await;
        let (id2, rx2) = register(&sessions, 2002).await;

        router.subscribe(id1, "c1", "a/b", QoS::AtMostOnce).await;
        router.subscribe(id2, "c2", "a/#", QoS::AtMostOnce).await;

        let publish = PublishPacket::new("a/b", &b"hello"[..], QoS::AtMostOnce);
        assert_eq!(router.route_message(&publish).await, 2);
        assert_eq!(rx1.try_recv().unwrap().topic_name, "a/b");
        assert_eq!(rx2.try_recv().unwrap().topic_name, "a/b");

        // a/c only reaches the wildcard subscriber
        let publish = PublishPacket::new("a/c", &b"x"[..], QoS::AtMostOnce);
        assert_eq!(router.route_message(&publish).await, 1);
        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap().topic_name, "a/c");
    }

    #[tokio::test]
    async fn test_resubscribe_replaces_instead_of_duplicating() {
        let sessions = Arc::new(SessionRegistry::new());
        let router = MessageRouter::new(Arc::clone(&sessions));

        let (id1, rx1) = register(&sessions, 2003).await;

        assert!(router.subscribe(id1, "c1", "a/b", QoS::AtMostOnce).await);
        assert!(!router.subscribe(id1, "c1", "a/b", QoS::AtLeastOnce).await);

        let publish = PublishPacket::new("a/b", &b"once"[..], QoS::AtLeastOnce);
        assert_eq!(router.route_message(&publish).await, 1);
        assert!(rx1.try_recv().is_ok());
        assert!(rx1.try_recv().is_err(), "duplicate delivery");
    }

    #[tokio::test]
    async fn test_delivery_qos_downgrade() {
        let sessions = Arc::new(SessionRegistry::new());
        let router = MessageRouter::new(Arc::clone(&sessions));

        let (id1, rx1) = register(&sessions, 2004).await;
        router.subscribe(id1, "c1", "a/b", QoS::AtMostOnce).await;

        let publish =
            PublishPacket::new("a/b", &b"x"[..], QoS::AtLeastOnce).with_packet_id(9);
        router.route_message(&publish).await;

        let delivered = rx1.try_recv().unwrap();
        assert_eq!(delivered.qos, QoS::AtMostOnce);
        assert_eq!(delivered.packet_id, None);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let sessions = Arc::new(SessionRegistry::new());
        let router = MessageRouter::new(Arc::clone(&sessions));

        let (id1, _rx1) = register(&sessions, 2005).await;
        router.subscribe(id1, "c1", "a/+", QoS::AtMostOnce).await;
        assert_eq!(router.topic_count().await, 1);

        assert!(router.unsubscribe(id1, "a/+").await);
        assert!(!router.unsubscribe(id1, "a/+").await);
        assert_eq!(router.topic_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_session_releases_all_subscriptions() {
        let sessions = Arc::new(SessionRegistry::new());
        let router = MessageRouter::new(Arc::clone(&sessions));

        let (id1, _rx1) = register(&sessions, 2006).await;
        router.subscribe(id1, "c1", "a/b", QoS::AtMostOnce).await;
        router.subscribe(id1, "c1", "a/#", QoS::AtMostOnce).await;
        assert_eq!(router.subscription_count_for(id1).await, 2);

        router.remove_session(id1).await;
        assert_eq!(router.subscription_count_for(id1).await, 0);
        assert_eq!(router.topic_count().await, 0);

        let publish = PublishPacket::new("a/b", &b"x"[..], QoS::AtMostOnce);
        assert_eq!(router.route_message(&publish).await, 0);
    }

    #[tokio::test]
    async fn test_failed_delivery_removes_subscription() {
        let sessions = Arc::new(SessionRegistry::new());
        let router = MessageRouter::new(Arc::clone(&sessions));

        let (dead, dead_rx) = register(&sessions, 2007).await;
        let (live, live_rx) = register(&sessions, 2008).await;

        router.subscribe(dead, "dead", "a/b", QoS::AtMostOnce).await;
        router.subscribe(live, "live", "a/b", QoS::AtMostOnce).await;
        drop(dead_rx);

        let publish = PublishPacket::new("a/b", &b"x"[..], QoS::AtMostOnce);
        assert_eq!(router.route_message(&publish).await, 1);
        assert!(live_rx.try_recv().is_ok());

        // the dead subscription is gone; the next publish is clean
        assert_eq!(router.subscription_count_for(dead).await, 0);
        assert_eq!(router.route_message(&publish).await, 1);
    }

    #[tokio::test]
    async fn test_same_session_two_filters_two_deliveries() {
        // dedupe applies per (filter, session) pair, not across filters
        let sessions = Arc::new(SessionRegistry::new());
        let router = MessageRouter::new(Arc::clone(&sessions));

        let (id1, rx1) = register(&sessions, 2009).await;
        router.subscribe(id1, "c1", "a/b", QoS::AtMostOnce).await;
        router.subscribe(id1, "c1", "a/#", QoS::AtMostOnce).await;

        let publish = PublishPacket::new("a/b", &b"x"[..], QoS::AtMostOnce);
        assert_eq!(router.route_message(&publish).await, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx1.try_recv().is_ok());
    }
}
