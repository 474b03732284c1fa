//! Per-connection task: one WebSocket, one session state machine, one
//! outgoing queue.
//!
//! The task owns the socket and the receive end of its outgoing channel.
//! Everything another task wants delivered here goes through the
//! [`ConnectionHandle`] clones held by the presence registry. When the loop
//! exits, for any reason, cleanup runs exactly once.

use crate::identity::IdentityResolver;
use crate::metrics;
use crate::presence::{ConnId, ConnectionHandle, PresenceRegistry};
use crate::protocol::{ClientEvent, ServerEvent};
use crate::router::MessageRouter;
use crate::session::SessionState;
use crate::telemetry;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn, Instrument};

pub struct Connection {
    conn_id: ConnId,
    addr: SocketAddr,
    resolver: IdentityResolver,
    presence: Arc<PresenceRegistry>,
    router: Arc<MessageRouter>,
}

impl Connection {
    pub fn new(
        conn_id: ConnId,
        addr: SocketAddr,
        resolver: IdentityResolver,
        presence: Arc<PresenceRegistry>,
        router: Arc<MessageRouter>,
    ) -> Self {
        Self {
            conn_id,
            addr,
            resolver,
            presence,
            router,
        }
    }

    /// Drive the connection until the peer disconnects or the socket fails.
    pub async fn run(self, stream: WebSocketStream<TcpStream>) {
        let span = telemetry::spans::connection(&self.conn_id.to_string(), &self.addr.to_string());
        self.run_inner(stream).instrument(span).await;
    }

    async fn run_inner(self, stream: WebSocketStream<TcpStream>) {
        let (mut ws_tx, mut ws_rx) = stream.split();

        // Outgoing queue. The registry holds clones of the sender inside
        // ConnectionHandles; only this task drains the receiver.
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<ServerEvent>(32);

        let mut state = SessionState::new();
        info!("connection accepted");

        loop {
            tokio::select! {
                incoming = ws_rx.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(&text, &mut state, &outgoing_tx).await;
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            if ws_tx.send(Message::Pong(payload)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!(error = %e, "websocket read failed");
                            break;
                        }
                    }
                }
                Some(event) = outgoing_rx.recv() => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(error = %e, "failed to encode outgoing event");
                            continue;
                        }
                    };
                    if ws_tx.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
            }
        }

        self.cleanup(&mut state);
    }

    /// Close the session and release everything this connection owns.
    /// Runs at most once; close() reports whether this call performed the
    /// transition. Returns true when the connected-users gauge was
    /// decremented.
    ///
    /// The gauge follows the session's bound flag, not the registry removal
    /// count: another connection joining as the same identity overwrites our
    /// entry, so removal can find nothing even though our join incremented
    /// the gauge.
    fn cleanup(&self, state: &mut SessionState) -> bool {
        let was_bound = state.is_bound();
        if !state.close() {
            return false;
        }
        self.presence.remove_by_handle(self.conn_id);
        if was_bound {
            metrics::connected_dec();
        }
        info!(was_bound, "connection closed");
        was_bound
    }

    async fn handle_text(
        &self,
        text: &str,
        state: &mut SessionState,
        outgoing_tx: &mpsc::Sender<ServerEvent>,
    ) {
        let event: ClientEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "unparseable client event dropped");
                return;
            }
        };
        self.handle_event(event, state, outgoing_tx).await;
    }

    async fn handle_event(
        &self,
        event: ClientEvent,
        state: &mut SessionState,
        outgoing_tx: &mpsc::Sender<ServerEvent>,
    ) {
        match event {
            ClientEvent::Join { token } => match self.resolver.resolve(&token) {
                Ok(identity) => {
                    let newly_bound = !state.is_bound();
                    if !state.bind(identity.clone()) {
                        return;
                    }
                    self.presence.register(
                        identity.clone(),
                        ConnectionHandle::new(self.conn_id, outgoing_tx.clone()),
                    );
                    if newly_bound {
                        metrics::connected_inc();
                    }
                    info!(identity = %identity, "session bound");
                }
                Err(e) => {
                    // The connection stays open and unbound; the client may
                    // retry with a fresh token.
                    metrics::record_auth_failure();
                    warn!(error = %e, "join rejected");
                }
            },
            ClientEvent::SendMessage {
                token,
                target_id,
                payload,
            } => {
                if !state.is_bound() {
                    warn!("send before join dropped");
                    return;
                }
                match self.router.route(&token, &target_id, &payload).await {
                    Ok(outcome) => debug!(?outcome, "message routed"),
                    Err(e) => debug!(code = e.error_code(), "message dropped"),
                }
            }
        }
    }
}
