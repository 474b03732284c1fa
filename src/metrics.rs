//! Prometheus metrics for bazaar-chatd.
//!
//! Exposed on the HTTP endpoint at `/metrics`. Tracks routing outcomes,
//! failure counts, and connected-participant population.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Messages forwarded to a live connection.
pub static MESSAGES_DELIVERED: OnceLock<IntCounter> = OnceLock::new();

/// Messages handed to the store because the recipient was offline.
pub static MESSAGES_PERSISTED: OnceLock<IntCounter> = OnceLock::new();

/// Persistence handoffs that failed. These messages are lost.
pub static STORE_FAILURES: OnceLock<IntCounter> = OnceLock::new();

/// Forwards attempted against a presence entry whose connection was gone.
pub static STALE_FORWARDS: OnceLock<IntCounter> = OnceLock::new();

/// Events dropped because their credential failed verification.
pub static AUTH_FAILURES: OnceLock<IntCounter> = OnceLock::new();

/// Events dropped because the target id could not be normalized.
pub static MALFORMED_TARGETS: OnceLock<IntCounter> = OnceLock::new();

/// Routing errors by static error code.
pub static ROUTE_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Currently connected, identity-bound participants.
pub static CONNECTED_USERS: OnceLock<IntGauge> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(MESSAGES_DELIVERED, IntCounter::new("chat_messages_delivered_total", "Messages forwarded to a live connection"));
    register!(MESSAGES_PERSISTED, IntCounter::new("chat_messages_persisted_total", "Messages stored for offline recipients"));
    register!(STORE_FAILURES, IntCounter::new("chat_store_failures_total", "Failed persistence handoffs"));
    register!(STALE_FORWARDS, IntCounter::new("chat_stale_forwards_total", "Forwards dropped on stale presence entries"));
    register!(AUTH_FAILURES, IntCounter::new("chat_auth_failures_total", "Events dropped for invalid credentials"));
    register!(MALFORMED_TARGETS, IntCounter::new("chat_malformed_targets_total", "Events dropped for unusable target ids"));
    register!(ROUTE_ERRORS, IntCounterVec::new(Opts::new("chat_route_errors_total", "Routing errors by code"), &["code"]));
    register!(CONNECTED_USERS, IntGauge::new("chat_connected_users", "Currently bound participants"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

#[inline]
fn inc(metric: &OnceLock<IntCounter>) {
    if let Some(c) = metric.get() {
        c.inc();
    }
}

#[inline]
pub fn record_delivered() {
    inc(&MESSAGES_DELIVERED);
}

#[inline]
pub fn record_persisted() {
    inc(&MESSAGES_PERSISTED);
}

#[inline]
pub fn record_store_failure() {
    inc(&STORE_FAILURES);
}

#[inline]
pub fn record_stale_forward() {
    inc(&STALE_FORWARDS);
}

#[inline]
pub fn record_auth_failure() {
    inc(&AUTH_FAILURES);
}

#[inline]
pub fn record_malformed_target() {
    inc(&MALFORMED_TARGETS);
}

/// Record a routing error under its static code label.
#[inline]
pub fn record_route_error(code: &str) {
    if let Some(c) = ROUTE_ERRORS.get() {
        c.with_label_values(&[code]).inc();
    }
}

#[inline]
pub fn connected_inc() {
    if let Some(g) = CONNECTED_USERS.get() {
        g.inc();
    }
}

#[inline]
pub fn connected_dec() {
    if let Some(g) = CONNECTED_USERS.get() {
        g.dec();
    }
}
