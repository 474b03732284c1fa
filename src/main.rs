//! bazaar-chatd - presence-aware message router for customer/vendor chat.
//!
//! Customers and vendors connect over WebSocket, bind an identity with a
//! signed token, and exchange messages. Online recipients get live delivery;
//! offline recipients get their messages stored for later retrieval over HTTP.

mod config;
mod error;
mod http;
mod identity;
mod metrics;
mod network;
mod presence;
mod protocol;
mod router;
mod session;
mod store;
mod telemetry;

use crate::config::Config;
use crate::identity::IdentityResolver;
use crate::network::Gateway;
use crate::presence::PresenceRegistry;
use crate::router::MessageRouter;
use crate::store::{MessageStore, SqliteStore};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(server = %config.server.name, "Starting bazaar-chatd");

    // SECURITY: Refuse to start with a default/weak token secret
    if config::is_default_secret(&config.auth.jwt_secret) {
        if std::env::var("BAZAARD_ALLOW_INSECURE_SECRET").is_ok() {
            tracing::warn!(
                "INSECURE: Running with weak jwt_secret (allowed via BAZAARD_ALLOW_INSECURE_SECRET)"
            );
        } else {
            error!("FATAL: Insecure jwt_secret detected!");
            error!("  The jwt_secret verifies client credentials; a weak secret lets");
            error!("  anyone forge an identity.");
            error!("  To fix, set a strong secret in config.toml:");
            error!("    [auth]");
            error!("    jwt_secret = \"<random-32-char-string>\"");
            error!("  Generate one with: openssl rand -hex 32");
            error!("  For testing only, set BAZAARD_ALLOW_INSECURE_SECRET=1 to bypass.");
            return Err(anyhow::anyhow!(
                "Refusing to start with insecure jwt_secret. See error messages above."
            ));
        }
    }

    // Initialize the message store
    let db_path = config
        .database
        .as_ref()
        .map(|d| d.path.as_str())
        .unwrap_or("bazaar-chatd.db");
    let store: Arc<dyn MessageStore> = Arc::new(SqliteStore::connect(db_path).await?);

    let resolver = IdentityResolver::new(&config.auth.jwt_secret);
    let presence = Arc::new(PresenceRegistry::new());
    let router = Arc::new(MessageRouter::new(
        resolver.clone(),
        Arc::clone(&presence),
        Arc::clone(&store),
    ));

    // Convention: http_port = 0 disables the HTTP surface (used by tests).
    let http_port = config.server.http_port.unwrap_or(9090);
    if http_port == 0 {
        info!("HTTP surface disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");

        let http_state = http::HttpState {
            resolver: resolver.clone(),
            store: Arc::clone(&store),
        };
        tokio::spawn(async move {
            http::run_http_server(http_port, http_state).await;
        });
        info!(port = http_port, "HTTP server started");
    }

    let gateway = Gateway::bind(config.listen.ws, resolver, presence, router).await?;
    info!("bazaar-chatd ready");
    gateway.run().await
}
