//! Load-balancing protocol metrics.

use once_cell::sync::Lazy;
use prometheus::{Counter, CounterVec, Gauge, Registry};

pub static BALANCE_ROUNDS_STARTED: Lazy<Counter> = Lazy::new(|| {
    Counter::new("ringmine_balance_rounds_started_total", "Rounds started")
        .expect("metric can be created")
});

pub static BALANCE_ROUNDS_COMPLETED: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "ringmine_balance_rounds_completed_total",
        "Rounds completed",
    )
    .expect("metric can be created")
});

/// Tasks migrated, labelled by direction: "pushed" (sent) or "pulled" (received).
pub static BALANCE_TASKS_MIGRATED: Lazy<CounterVec> = Lazy::new(|| {
    CounterVec::new(
        prometheus::opts!(
            "ringmine_balance_tasks_migrated_total",
            "Tasks migrated between neighbors"
        ),
        &["direction"],
    )
    .expect("metric can be created")
});

pub static BALANCE_MEAN_ESTIMATE: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new(
        "ringmine_balance_mean_estimate",
        "Fair-share task count estimated for the current round",
    )
    .expect("metric can be created")
});

pub static BALANCE_LOCAL_TASKS: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new(
        "ringmine_balance_local_tasks",
        "Local task count (generated plus migrated) during balancing",
    )
    .expect("metric can be created")
});

/// Register all balancing metrics with the given registry.
pub fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(BALANCE_ROUNDS_STARTED.clone()))
        .ok();
    registry
        .register(Box::new(BALANCE_ROUNDS_COMPLETED.clone()))
        .ok();
    registry
        .register(Box::new(BALANCE_TASKS_MIGRATED.clone()))
        .ok();
    registry
        .register(Box::new(BALANCE_MEAN_ESTIMATE.clone()))
        .ok();
    registry
        .register(Box::new(BALANCE_LOCAL_TASKS.clone()))
        .ok();
}
