//! Ringmine Prometheus metrics infrastructure.
//!
//! Centralized metric definitions for all ringmine subsystems, organized by
//! area: network, balancing, worker pool.

pub mod balance;
pub mod network;
pub mod pool;
pub mod server;

pub use server::{spawn_metrics_server, start_metrics_server};

use once_cell::sync::Lazy;
use prometheus::Registry;

/// Global Prometheus registry for all ringmine metrics.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();

    network::register_metrics(&registry);
    balance::register_metrics(&registry);
    pool::register_metrics(&registry);

    registry
});

/// Initialize all metrics. Call once at startup.
pub fn init() {
    Lazy::force(&REGISTRY);
    tracing::info!("ringmine metrics initialized");
}
