//! Gateway: WebSocket listener that accepts incoming connections and spawns
//! a [`Connection`] task for each.

use crate::identity::IdentityResolver;
use crate::network::Connection;
use crate::presence::{ConnIdGenerator, PresenceRegistry};
use crate::router::MessageRouter;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tracing::{error, info, instrument, warn};

pub struct Gateway {
    listener: TcpListener,
    conn_ids: ConnIdGenerator,
    resolver: IdentityResolver,
    presence: Arc<PresenceRegistry>,
    router: Arc<MessageRouter>,
}

impl Gateway {
    /// Bind the gateway to the specified address.
    pub async fn bind(
        addr: SocketAddr,
        resolver: IdentityResolver,
        presence: Arc<PresenceRegistry>,
        router: Arc<MessageRouter>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "WebSocket listener bound");
        Ok(Self {
            listener,
            conn_ids: ConnIdGenerator::new(),
            resolver,
            presence,
            router,
        })
    }

    /// Run the gateway, accepting connections forever.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let conn_id = self.conn_ids.next();
                    info!(%addr, %conn_id, "connection accepted");

                    let connection = Connection::new(
                        conn_id,
                        addr,
                        self.resolver.clone(),
                        Arc::clone(&self.presence),
                        Arc::clone(&self.router),
                    );
                    tokio::spawn(async move {
                        match accept_async(stream).await {
                            Ok(ws) => connection.run(ws).await,
                            Err(e) => {
                                warn!(%addr, error = %e, "websocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                }
            }
        }
    }
}
