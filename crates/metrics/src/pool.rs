//! Worker pool metrics.

use once_cell::sync::Lazy;
use prometheus::{Counter, Gauge, Histogram, Registry};

pub static POOL_TASKS_EXECUTED: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "ringmine_pool_tasks_executed_total",
        "Proof-of-work tasks executed",
    )
    .expect("metric can be created")
});

pub static POOL_QUEUE_DEPTH: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("ringmine_pool_queue_depth", "Tasks waiting in the pool queue")
        .expect("metric can be created")
});

pub static POOL_WORKERS: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new("ringmine_pool_workers", "Worker threads in the pool")
        .expect("metric can be created")
});

pub static POOL_TASK_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(prometheus::histogram_opts!(
        "ringmine_pool_task_seconds",
        "Proof-of-work duration per task",
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    ))
    .expect("metric can be created")
});

/// Register all pool metrics with the given registry.
pub fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(POOL_TASKS_EXECUTED.clone()))
        .ok();
    registry.register(Box::new(POOL_QUEUE_DEPTH.clone())).ok();
    registry.register(Box::new(POOL_WORKERS.clone())).ok();
    registry.register(Box::new(POOL_TASK_SECONDS.clone())).ok();
}
