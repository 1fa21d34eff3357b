//! Connection and message traffic metrics.

use once_cell::sync::Lazy;
use prometheus::{Counter, CounterVec, Gauge, Registry};

// Connections
pub static NET_CONNECTIONS_OPEN: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("ringmine_net_connections_open", "Currently open connections")
        .expect("metric can be created")
});

pub static NET_CONNECTION_ERRORS: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "ringmine_net_connection_errors_total",
        "Total connection errors",
    )
    .expect("metric can be created")
});

// Message traffic
pub static NET_MESSAGES_SENT: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        prometheus::opts!("ringmine_net_messages_sent_total", "Total messages sent"),
        &["message_type"],
    )
    .expect("metric can be created")
});

pub static NET_MESSAGES_RECEIVED: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        prometheus::opts!(
            "ringmine_net_messages_received_total",
            "Total messages received"
        ),
        &["message_type"],
    )
    .expect("metric can be created")
});

pub static NET_BYTES_SENT: Lazy<Counter> = Lazy::new(|| {
    Counter::new("ringmine_net_bytes_sent_total", "Total bytes sent")
        .expect("metric can be created")
});

pub static NET_BYTES_RECEIVED: Lazy<Counter> = Lazy::new(|| {
    Counter::new("ringmine_net_bytes_received_total", "Total bytes received")
        .expect("metric can be created")
});

pub static NET_DECODE_ERRORS: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "ringmine_net_decode_errors_total",
        "Total frame decode errors",
    )
    .expect("metric can be created")
});

/// Register all network metrics with the given registry.
pub fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(NET_CONNECTIONS_OPEN.clone()))
        .ok();
    registry
        .register(Box::new(NET_CONNECTION_ERRORS.clone()))
        .ok();
    registry.register(Box::new(NET_MESSAGES_SENT.clone())).ok();
    registry
        .register(Box::new(NET_MESSAGES_RECEIVED.clone()))
        .ok();
    registry.register(Box::new(NET_BYTES_SENT.clone())).ok();
    registry.register(Box::new(NET_BYTES_RECEIVED.clone())).ok();
    registry.register(Box::new(NET_DECODE_ERRORS.clone())).ok();
}
