//! Compute node round controller.
//!
//! The node is a state machine driven by one event channel: every connection
//! (registry and ring neighbors) delivers decoded messages into the channel,
//! and [`ComputeNode::run`] dispatches them one at a time, so message handlers
//! never race each other. A round driver task spawned per `TaskInitiate`
//! shares the node state through the same locks.
//!
//! One round moves through generate, announce, estimate, balance, execute,
//! report, then back to idle:
//!
//! - **generate**: draw a task count, create that many proof-of-work tasks
//! - **announce**: send the count on the outgoing ring edge; counts are
//!   forwarded hop by hop and dropped when they circle back to their origin
//! - **estimate**: wait until every other node's count is known, then take
//!   the ceiling mean as the fair share
//! - **balance**: push/pull batches against the two ring neighbors until the
//!   ring looks flat (see [`crate::balance`])
//! - **execute**: hand everything to the worker pool and wait for the drain
//! - **report**: tell the registry, clear the per-round view

use crate::balance::{self, BalanceAction};
use crate::config::NodeConfig;
use crate::connection::{spawn_listener, Connection, NodeEvent};
use crate::miner::Miner;
use crate::pool::WorkerPool;
use crate::stats::TaskStatistics;
use anyhow::Context;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rand::Rng;
use ringmine_metrics::balance::{
    BALANCE_LOCAL_TASKS, BALANCE_MEAN_ESTIMATE, BALANCE_ROUNDS_COMPLETED, BALANCE_ROUNDS_STARTED,
    BALANCE_TASKS_MIGRATED,
};
use ringmine_types::{PeerAddr, StatsSnapshot, Task};
use ringmine_wire::Message;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, trace, warn};

const EVENT_CHANNEL_SIZE: usize = 1024;

/// Overlay parameters handed down by the registry, fixed after setup.
#[derive(Debug, Clone, Copy)]
struct OverlayInfo {
    overlay_size: usize,
    pool_size: usize,
}

/// The node's two ring edges.
#[derive(Default)]
struct RingEdges {
    /// Successor: where counts are announced and forwarded.
    outgoing: Option<(PeerAddr, Connection)>,
    /// Predecessor: learned from its `Register` on the inbound connection.
    incoming: Option<(PeerAddr, Connection)>,
}

/// Per-round mutable state. Handlers and the round driver take the state
/// lock for every step that touches it, giving monitor semantics.
#[derive(Default)]
struct RoundState {
    round: u32,
    /// Tasks owned by this node this round. Batches migrated in are merged
    /// here so they can flow onward: flattening a heavy skew needs tasks to
    /// relay across nodes that are themselves near the mean.
    generated: Vec<Task>,
    balanced_count: usize,
    /// One outbound migration in flight at a time.
    is_migrating: bool,
    /// Set when balancing converged; migrations are no longer served.
    ready_to_execute: bool,
}

impl RoundState {
    fn fresh(round: u32, generated: Vec<Task>) -> Self {
        Self {
            round,
            generated,
            ..Default::default()
        }
    }

    fn total(&self) -> usize {
        self.generated.len()
    }
}

struct NodeShared {
    self_addr: PeerAddr,
    config: NodeConfig,
    registry: Connection,
    /// For wiring new outbound connections into the event loop.
    events: mpsc::Sender<NodeEvent>,
    /// Latest count reported by each other node. Never contains self.
    counts: Mutex<HashMap<PeerAddr, u64>>,
    /// Woken on every count arrival; the estimator waits on it.
    counts_notify: Notify,
    round: Mutex<RoundState>,
    ring: Mutex<RingEdges>,
    overlay: OnceCell<OverlayInfo>,
    pool: OnceCell<WorkerPool>,
    stats: Arc<TaskStatistics>,
    round_active: AtomicBool,
}

/// Inspection handle onto a running node, for the registry-facing binary and
/// for tests. Cheap to clone.
#[derive(Clone)]
pub struct NodeHandle {
    shared: Arc<NodeShared>,
}

impl NodeHandle {
    pub fn self_addr(&self) -> PeerAddr {
        self.shared.self_addr.clone()
    }

    /// Snapshot of the overlay count view.
    pub fn overlay_counts(&self) -> HashMap<PeerAddr, u64> {
        self.shared.counts.lock().clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn round_active(&self) -> bool {
        self.shared.round_active.load(Ordering::Acquire)
    }
}

/// A compute node: overlay member, balancer, executor.
pub struct ComputeNode {
    shared: Arc<NodeShared>,
    events_rx: mpsc::Receiver<NodeEvent>,
}

impl ComputeNode {
    /// Bind an ephemeral listener on all interfaces, identify as the local
    /// hostname, and register with the configured registry.
    pub async fn bind(config: NodeConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", 0))
            .await
            .context("failed to bind node listener")?;
        let port = listener
            .local_addr()
            .context("listener has no local address")?
            .port();
        let host = hostname::get()
            .context("failed to resolve local hostname")?
            .to_string_lossy()
            .into_owned();
        Self::with_listener(config, PeerAddr::new(host, port), listener).await
    }

    /// Run on a pre-bound listener under an explicit identity. The identity
    /// must be the address peers can reach the listener on.
    pub async fn with_listener(
        config: NodeConfig,
        self_addr: PeerAddr,
        listener: TcpListener,
    ) -> anyhow::Result<Self> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        spawn_listener(listener, events_tx.clone());

        let registry_stream = TcpStream::connect(&config.registry_addr)
            .await
            .with_context(|| format!("failed to connect to registry at {}", config.registry_addr))?;
        let registry = Connection::spawn(registry_stream, events_tx.clone());

        registry.send(Message::Register {
            host: self_addr.host().to_string(),
            port: self_addr.port(),
        });
        info!(addr = %self_addr, registry = %config.registry_addr, "registering with registry");

        let shared = Arc::new(NodeShared {
            self_addr,
            config,
            registry,
            events: events_tx,
            counts: Mutex::new(HashMap::new()),
            counts_notify: Notify::new(),
            round: Mutex::new(RoundState::default()),
            ring: Mutex::new(RingEdges::default()),
            overlay: OnceCell::new(),
            pool: OnceCell::new(),
            stats: Arc::new(TaskStatistics::new()),
            round_active: AtomicBool::new(false),
        });

        Ok(Self { shared, events_rx })
    }

    /// Inspection handle, usable while (and after) the node runs.
    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Drive the event loop until every connection and the listener are gone.
    pub async fn run(mut self) {
        info!(addr = %self.shared.self_addr, "compute node running");
        while let Some(NodeEvent { conn, message }) = self.events_rx.recv().await {
            let shared = &self.shared;
            match message {
                Message::Register { host, port } => {
                    shared.handle_register(PeerAddr::new(host, port), conn);
                }
                Message::RegisterResponse { status, info } => {
                    info!(status, info = %info, "registration acknowledged");
                }
                Message::NodeList {
                    peers,
                    pool_size,
                    overlay_size,
                } => {
                    shared.handle_node_list(peers, pool_size, overlay_size).await;
                }
                Message::TaskInitiate { round } => Arc::clone(shared).handle_task_initiate(round),
                Message::TasksCount { origin, count } => shared.handle_tasks_count(origin, count),
                Message::CheckStatus { deficit } => shared.handle_check_status(deficit, &conn),
                Message::PushRequest { total } => shared.handle_push_request(total, &conn),
                Message::MigrateTasks { tasks } => shared.handle_migrate_tasks(tasks, &conn),
                Message::MigrateResponse => shared.handle_migrate_response(),
                Message::StatusResponse => {
                    debug!(peer = conn.peer(), "legacy status response ignored");
                }
                Message::PullTrafficSummary => shared.handle_pull_traffic_summary(),
                other => {
                    warn!(
                        kind = other.type_name(),
                        peer = conn.peer(),
                        "unexpected message kind dropped"
                    );
                }
            }
        }
        info!("event channel closed, node stopping");
    }
}

impl NodeShared {
    /// Inbound `Register`: the ring predecessor announcing itself on the
    /// connection it just opened to us.
    fn handle_register(&self, peer: PeerAddr, conn: Connection) {
        debug!(%peer, "incoming ring edge registered");
        self.ring.lock().incoming = Some((peer, conn));
    }

    /// Registry's overlay setup: connect to the listed successor(s), announce
    /// ourselves on each new connection, and stand up the worker pool.
    async fn handle_node_list(&self, peers: Vec<PeerAddr>, pool_size: usize, overlay_size: usize) {
        if self
            .overlay
            .set(OverlayInfo {
                overlay_size,
                pool_size,
            })
            .is_err()
        {
            warn!("overlay already configured, ignoring node list");
            return;
        }

        for peer in &peers {
            match Connection::connect((peer.host(), peer.port()), self.events.clone()).await {
                Ok(conn) => {
                    conn.send(Message::Register {
                        host: self.self_addr.host().to_string(),
                        port: self.self_addr.port(),
                    });
                    self.ring.lock().outgoing = Some((peer.clone(), conn));
                    info!(%peer, "connected to ring successor");
                }
                Err(e) => {
                    error!(%peer, error = %e, "failed to connect to ring successor");
                    return;
                }
            }
        }

        let miner = Miner::new(self.config.pow_difficulty_bits);
        let pool = WorkerPool::new(pool_size, miner, Arc::clone(&self.stats));
        pool.start();
        if self.pool.set(pool).is_err() {
            warn!("worker pool already created");
        }
        info!(overlay_size, pool_size, peers = peers.len(), "overlay configured");
    }

    /// Registry's round kick-off: spawn the round driver.
    fn handle_task_initiate(self: Arc<Self>, round: u32) {
        if self.overlay.get().is_none() || self.pool.get().is_none() {
            warn!(round, "task initiate before overlay setup, dropping");
            return;
        }
        if self.round_active.swap(true, Ordering::AcqRel) {
            warn!(round, "task initiate while a round is active, dropping");
            return;
        }
        tokio::spawn(async move { self.run_round(round).await });
    }

    /// One full round: the controller side of the state machine.
    async fn run_round(self: Arc<Self>, round: u32) {
        BALANCE_ROUNDS_STARTED.inc();
        let overlay = match self.overlay.get() {
            Some(overlay) => *overlay,
            None => return,
        };

        // Generating
        let count = rand::thread_rng().gen_range(self.config.tasks_per_round.clone());
        let tasks: Vec<Task> = {
            let mut rng = rand::thread_rng();
            (0..count)
                .map(|_| Task::new(self.self_addr.clone(), round, rng.gen()))
                .collect()
        };
        *self.round.lock() = RoundState::fresh(round, tasks);
        self.stats.add_generated(count);
        info!(round, generated = count, "round started");

        // Announcing
        self.broadcast_count(count);

        // Estimating: wait for every other node's count, then take the mean.
        loop {
            if self.counts.lock().len() >= overlay.overlay_size.saturating_sub(1) {
                break;
            }
            self.counts_notify.notified().await;
        }
        let balanced = {
            let counts = self.counts.lock();
            let state = self.round.lock();
            balance::balanced_count(state.total(), &counts, overlay.overlay_size)
        };
        self.round.lock().balanced_count = balanced;
        BALANCE_MEAN_ESTIMATE.set(balanced as f64);
        debug!(round, balanced, "mean estimated");

        // Balancing
        loop {
            let counts = self.counts.lock().clone();
            let (total, action) = {
                let state = self.round.lock();
                (state.total(), balance::classify(state.total(), state.balanced_count))
            };
            BALANCE_LOCAL_TASKS.set(total as f64);
            if balance::is_globally_balanced(&counts, total, balanced) {
                break;
            }

            let edges = {
                let ring = self.ring.lock();
                [ring.outgoing.clone(), ring.incoming.clone()]
            };
            for (addr, conn) in edges.into_iter().flatten() {
                let Some(&neighbor_count) = counts.get(&addr) else {
                    continue;
                };
                match action {
                    BalanceAction::Push { total } if neighbor_count <= balanced as u64 => {
                        trace!(round, %addr, neighbor_count, "offering tasks");
                        conn.send(Message::PushRequest { total });
                    }
                    BalanceAction::Pull { deficit } if neighbor_count >= balanced as u64 => {
                        trace!(round, %addr, neighbor_count, deficit, "requesting tasks");
                        conn.send(Message::CheckStatus { deficit });
                    }
                    _ => {}
                }
            }

            tokio::time::sleep(self.config.balance_interval).await;
        }

        // Executing
        let tasks = {
            let mut state = self.round.lock();
            state.ready_to_execute = true;
            std::mem::take(&mut state.generated)
        };
        let pool = match self.pool.get() {
            Some(pool) => pool,
            None => return,
        };
        info!(round, executing = tasks.len(), "balancing converged");
        if tasks.is_empty() {
            debug!(round, "no local tasks this round");
        } else {
            pool.latch().arm();
            pool.queue().push_all(tasks);
            pool.latch().wait().await;
        }

        // Reporting. The per-round view is cleared before the registry
        // learns we are done: the next round's first count or initiate can
        // arrive the moment the registry sees our completion, and must not
        // land in state about to be wiped.
        self.counts.lock().clear();
        self.round_active.store(false, Ordering::Release);
        self.registry.send(Message::TaskComplete {
            host: self.self_addr.host().to_string(),
            port: self.self_addr.port(),
        });
        BALANCE_ROUNDS_COMPLETED.inc();
        info!(round, completed = self.stats.completed(), "round complete");
    }

    /// Announce a count on the outgoing ring edge.
    fn broadcast_count(&self, count: u64) {
        let outgoing = self.ring.lock().outgoing.clone();
        match outgoing {
            Some((_, conn)) => {
                conn.send(Message::TasksCount {
                    origin: self.self_addr.clone(),
                    count,
                });
            }
            None => warn!("no outgoing ring edge, count not announced"),
        }
    }

    /// Ring count dissemination: drop our own circled message, record the
    /// latest value for anyone else, and forward along the ring.
    fn handle_tasks_count(&self, origin: PeerAddr, count: u64) {
        if origin == self.self_addr {
            trace!(count, "own count circled the ring");
            return;
        }

        self.counts.lock().insert(origin.clone(), count);
        self.counts_notify.notify_one();

        let outgoing = self.ring.lock().outgoing.clone();
        match outgoing {
            Some((_, conn)) => {
                conn.send(Message::TasksCount { origin, count });
            }
            None => debug!(%origin, "no outgoing edge to forward count"),
        }
    }

    /// A neighbor short `deficit` tasks asks us to migrate. Serve at most one
    /// batch at a time, never after execution began, and never more than the
    /// requester is missing.
    fn handle_check_status(&self, deficit: u64, conn: &Connection) {
        let batch = {
            let mut state = self.round.lock();
            if state.ready_to_execute || state.is_migrating {
                return;
            }
            let quota = balance::migration_quota(state.generated.len(), deficit);
            if quota == 0 {
                return;
            }
            state.is_migrating = true;
            balance::extract_batch(&mut state.generated, quota)
        };

        let n = batch.len() as u64;
        if !conn.send(Message::MigrateTasks {
            tasks: batch.clone(),
        }) {
            // connection died under us: put the tasks back where they were
            let mut state = self.round.lock();
            state.generated.splice(0..0, batch);
            state.is_migrating = false;
            return;
        }
        self.stats.add_pushed(n);
        BALANCE_TASKS_MIGRATED
            .with_label_values(&["pushed"])
            .inc_by(n as f64);
        debug!(migrated = n, peer = conn.peer(), "tasks migrated out");

        let total = self.round.lock().total() as u64;
        self.broadcast_count(total);
    }

    /// An overloaded neighbor offers tasks: answer with how short we are.
    /// Zero means "we need nothing" and the sender will not migrate.
    fn handle_push_request(&self, total: u64, conn: &Connection) {
        let deficit = {
            let state = self.round.lock();
            if state.ready_to_execute {
                return;
            }
            (state.balanced_count as u64).saturating_sub(state.total() as u64)
        };
        trace!(neighbor_total = total, deficit, "answering push request");
        conn.send(Message::CheckStatus { deficit });
    }

    /// A migration batch arrives: merge it into our sequence (or straight
    /// into the pool when execution already began, so no task is lost),
    /// acknowledge, and announce the new total.
    fn handle_migrate_tasks(&self, mut tasks: Vec<Task>, conn: &Connection) {
        let n = tasks.len() as u64;

        let merged_total = {
            let mut state = self.round.lock();
            if state.ready_to_execute {
                None
            } else {
                state.generated.extend(tasks.drain(..));
                Some(state.total() as u64)
            }
        };
        if merged_total.is_none() {
            match self.pool.get() {
                Some(pool) => {
                    debug!(count = n, "migration batch arrived mid-execution, enqueueing directly");
                    pool.queue().push_all(tasks);
                }
                None => warn!(count = n, "migration batch with no worker pool, dropping"),
            }
        }

        self.stats.add_pulled(n);
        BALANCE_TASKS_MIGRATED
            .with_label_values(&["pulled"])
            .inc_by(n as f64);
        conn.send(Message::MigrateResponse);

        // announce the new total only while still balancing: once executing,
        // the sequence has been handed to the pool and its length says
        // nothing about this node's share anymore
        if let Some(total) = merged_total {
            self.broadcast_count(total);
        }
    }

    /// Our outbound batch was accepted; allow the next migration.
    /// Duplicate acknowledgements only ever re-clear the flag.
    fn handle_migrate_response(&self) {
        let mut state = self.round.lock();
        if state.is_migrating {
            state.is_migrating = false;
            trace!("outbound migration acknowledged");
        }
    }

    /// Registry wants the final counters: upload and reset.
    fn handle_pull_traffic_summary(&self) {
        let snapshot = self.stats.snapshot();
        self.registry.send(Message::TrafficSummary {
            host: self.self_addr.host().to_string(),
            port: self.self_addr.port(),
            stats: snapshot,
        });
        self.stats.reset();
        info!(
            generated = snapshot.generated,
            pushed = snapshot.pushed,
            pulled = snapshot.pulled,
            completed = snapshot.completed,
            "traffic summary uploaded"
        );
    }
}
