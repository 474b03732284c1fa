//! Telemetry utilities: standardized span constructors for observability.

pub mod spans {
    use tracing::{info_span, Span};

    /// Span covering one accepted connection's lifetime.
    pub fn connection(conn_id: &str, addr: &str) -> Span {
        info_span!("connection", conn_id = %conn_id, addr = %addr)
    }
}
