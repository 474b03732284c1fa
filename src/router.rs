//! Message routing: resolve the sender, normalize the target, then deliver
//! live or persist.
//!
//! Every send is independently authenticated from the token it carries; the
//! connection's bound identity is a presence fact, not a routing input. A
//! failed route drops exactly one message and never tears down a connection.

use crate::error::RouteError;
use crate::identity::{Identity, IdentityResolver};
use crate::metrics;
use crate::presence::PresenceRegistry;
use crate::protocol::ServerEvent;
use crate::store::{MessageStore, NewMessage};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Terminal outcome of a successful route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Forwarded to the recipient's live connection.
    Delivered,
    /// Recipient offline; stored with `delivered = false`.
    Persisted,
}

pub struct MessageRouter {
    resolver: IdentityResolver,
    presence: Arc<PresenceRegistry>,
    store: Arc<dyn MessageStore>,
}

impl MessageRouter {
    pub fn new(
        resolver: IdentityResolver,
        presence: Arc<PresenceRegistry>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            resolver,
            presence,
            store,
        }
    }

    /// Route one message: authenticate `token`, normalize `target`, then
    /// forward to a live connection or persist for later retrieval.
    pub async fn route(
        &self,
        token: &str,
        target: &str,
        payload: &str,
    ) -> Result<Outcome, RouteError> {
        let sender = match self.resolver.resolve(token) {
            Ok(identity) => identity,
            Err(e) => {
                metrics::record_auth_failure();
                return Err(self.fail(e.into()));
            }
        };

        let recipient = match normalize_target(target) {
            Some(identity) => identity,
            None => {
                metrics::record_malformed_target();
                return Err(self.fail(RouteError::MalformedTarget(target.to_string())));
            }
        };

        if let Some(handle) = self.presence.lookup(&recipient) {
            let delivered = handle.forward(ServerEvent::ReceiveMessage {
                sender: sender.to_string(),
                payload: payload.to_string(),
            });
            if delivered {
                metrics::record_delivered();
                debug!(sender = %sender, recipient = %recipient, "message delivered live");
            } else {
                // The entry points at a connection that is gone or wedged.
                // The message is dropped, not redirected to storage; cleanup
                // of the entry belongs to the connection that owns it.
                metrics::record_stale_forward();
                warn!(sender = %sender, recipient = %recipient, conn_id = %handle.conn_id(),
                      "stale presence entry, message dropped");
            }
            return Ok(Outcome::Delivered);
        }

        let result = self
            .store
            .insert(NewMessage {
                sender_id: sender.to_string(),
                recipient_id: recipient.to_string(),
                body: payload.to_string(),
                created_at: Utc::now(),
            })
            .await;

        match result {
            Ok(()) => {
                metrics::record_persisted();
                debug!(sender = %sender, recipient = %recipient, "message persisted");
                Ok(Outcome::Persisted)
            }
            Err(e) => {
                metrics::record_store_failure();
                Err(self.fail(RouteError::Store(e)))
            }
        }
    }

    fn fail(&self, err: RouteError) -> RouteError {
        metrics::record_route_error(err.error_code());
        warn!(code = err.error_code(), error = %err, "route failed");
        err
    }
}

/// Normalize a raw target id into an identity.
///
/// Accepts the suffixed wire form (`"42c"`, `"7v"`) and, as a compatibility
/// policy for clients that predate role suffixes, treats a bare all-digit id
/// as a vendor. Everything else is rejected.
pub fn normalize_target(raw: &str) -> Option<Identity> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(identity) = Identity::parse_wire(raw) {
        return Some(identity);
    }
    if raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw.parse().ok().map(Identity::vendor);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::tests::{make_token, resolver};
    use crate::presence::{ConnIdGenerator, ConnectionHandle};
    use crate::store::memory::MemoryStore;
    use tokio::sync::mpsc;

    fn router_with(
        presence: Arc<PresenceRegistry>,
        store: Arc<MemoryStore>,
    ) -> MessageRouter {
        MessageRouter::new(resolver(), presence, store)
    }

    #[test]
    fn test_normalize_suffixed_target() {
        assert_eq!(normalize_target("42c"), Some(Identity::customer(42)));
        assert_eq!(normalize_target("7v"), Some(Identity::vendor(7)));
        assert_eq!(normalize_target("  7v "), Some(Identity::vendor(7)));
    }

    #[test]
    fn test_normalize_bare_digits_default_to_vendor() {
        assert_eq!(normalize_target("7"), Some(Identity::vendor(7)));
        assert_eq!(normalize_target("123"), Some(Identity::vendor(123)));
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert_eq!(normalize_target(""), None);
        assert_eq!(normalize_target("   "), None);
        assert_eq!(normalize_target("abc"), None);
        assert_eq!(normalize_target("42x"), None);
        assert_eq!(normalize_target("4 2c"), None);
        assert_eq!(normalize_target("-7"), None);
    }

    #[test]
    fn test_normalize_rejects_multibyte_target() {
        assert_eq!(normalize_target("42\u{e9}"), None);
        assert_eq!(normalize_target("四十二"), None);
    }

    #[tokio::test]
    async fn test_offline_recipient_persists_undelivered() {
        let presence = Arc::new(PresenceRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let router = router_with(presence, Arc::clone(&store));

        let outcome = router
            .route(&make_token(Some(42), None), "7", "need this by friday")
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Persisted);
        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sender_id, "42c");
        assert_eq!(rows[0].recipient_id, "7v");
        assert_eq!(rows[0].body, "need this by friday");
        assert!(!rows[0].delivered);
    }

    #[tokio::test]
    async fn test_online_recipient_gets_live_delivery() {
        let presence = Arc::new(PresenceRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let gen = ConnIdGenerator::new();
        let (tx, mut rx) = mpsc::channel(8);
        presence.register(Identity::vendor(7), ConnectionHandle::new(gen.next(), tx));

        let router = router_with(Arc::clone(&presence), Arc::clone(&store));
        let outcome = router
            .route(&make_token(Some(42), None), "7v", "hello")
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Delivered);
        assert!(store.rows().is_empty());

        let ev = rx.recv().await.unwrap();
        match ev {
            ServerEvent::ReceiveMessage { sender, payload } => {
                assert_eq!(sender, "42c");
                assert_eq!(payload, "hello");
            }
        }
    }

    #[tokio::test]
    async fn test_bad_credential_routes_nothing() {
        let presence = Arc::new(PresenceRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let router = router_with(presence, Arc::clone(&store));

        let err = router.route("not-a-token", "7v", "hi").await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_credential");
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_target_routes_nothing() {
        let presence = Arc::new(PresenceRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let router = router_with(presence, Arc::clone(&store));

        let err = router
            .route(&make_token(Some(42), None), "bogus", "hi")
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "malformed_target");
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_stale_entry_drops_without_persisting() {
        let presence = Arc::new(PresenceRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let gen = ConnIdGenerator::new();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        presence.register(Identity::vendor(7), ConnectionHandle::new(gen.next(), tx));

        let router = router_with(Arc::clone(&presence), Arc::clone(&store));
        let outcome = router
            .route(&make_token(Some(42), None), "7v", "into the void")
            .await
            .unwrap();

        // The presence entry won, so the outcome is live delivery even though
        // the forward itself was dropped. Nothing reaches the store.
        assert_eq!(outcome, Outcome::Delivered);
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_surfaced() {
        let presence = Arc::new(PresenceRegistry::new());
        let store = Arc::new(MemoryStore::new());
        store.fail_inserts();

        let router = router_with(presence, Arc::clone(&store));
        let err = router
            .route(&make_token(Some(42), None), "7", "lost")
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "store_error");
        assert!(store.rows().is_empty());
    }

    #[tokio::test]
    async fn test_vendor_can_message_customer() {
        let presence = Arc::new(PresenceRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let router = router_with(presence, Arc::clone(&store));

        let outcome = router
            .route(&make_token(None, Some(7)), "42c", "back in stock")
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Persisted);
        let rows = store.rows();
        assert_eq!(rows[0].sender_id, "7v");
        assert_eq!(rows[0].recipient_id, "42c");
    }
}
