//! Shared harness for ring integration tests: a stub registry speaking the
//! wire protocol over real loopback sockets, plus framed-stream helpers.
#![allow(dead_code)]

use bytes::BytesMut;
use ringmine_node::{ComputeNode, NodeConfig, NodeHandle};
use ringmine_types::{PeerAddr, StatsSnapshot};
use ringmine_wire::{encode_frame, try_parse_frame, Message};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

pub const RING_TIMEOUT: Duration = Duration::from_secs(120);

/// One framed TCP stream, as the registry (or an injected peer) sees it.
pub struct FramedPeer {
    stream: TcpStream,
    buf: BytesMut,
}

impl FramedPeer {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(4096),
        }
    }

    pub async fn connect(addr: &PeerAddr) -> Self {
        let stream = TcpStream::connect((addr.host(), addr.port()))
            .await
            .expect("connect to node");
        Self::new(stream)
    }

    pub async fn send(&mut self, message: &Message) {
        let frame = encode_frame(message).expect("encode frame");
        self.stream.write_all(&frame).await.expect("write frame");
    }

    pub async fn recv(&mut self) -> Message {
        loop {
            if let Some(message) = try_parse_frame(&mut self.buf).expect("parse frame") {
                return message;
            }
            let n = self
                .stream
                .read_buf(&mut self.buf)
                .await
                .expect("read frame");
            assert!(n > 0, "connection closed while waiting for a message");
        }
    }
}

/// A ring of in-process nodes wired through a stub registry.
pub struct TestRing {
    pub handles: Vec<NodeHandle>,
    pub node_addrs: Vec<PeerAddr>,
    pub registry_conns: Vec<FramedPeer>,
}

/// Stand up one node per config, assign successors in config order, and
/// return the registry-side connections for driving rounds.
pub async fn setup_ring(configs: Vec<NodeConfig>, pool_size: usize) -> TestRing {
    let registry = TcpListener::bind("127.0.0.1:0").await.expect("bind registry");
    let registry_addr = registry.local_addr().expect("registry addr");

    let n = configs.len();
    let mut handles = Vec::with_capacity(n);
    let mut node_addrs = Vec::with_capacity(n);

    for mut config in configs {
        config.registry_addr = registry_addr.to_string();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind node");
        let port = listener.local_addr().expect("node addr").port();
        let addr = PeerAddr::new("127.0.0.1", port);

        let node = ComputeNode::with_listener(config, addr.clone(), listener)
            .await
            .expect("start node");
        handles.push(node.handle());
        node_addrs.push(addr);
        tokio::spawn(node.run());
    }

    // accept each node's registry connection and match it to its identity
    let mut pending: Vec<(PeerAddr, FramedPeer)> = Vec::with_capacity(n);
    for _ in 0..n {
        let (stream, _) = registry.accept().await.expect("accept node");
        let mut peer = FramedPeer::new(stream);
        match peer.recv().await {
            Message::Register { host, port } => pending.push((PeerAddr::new(host, port), peer)),
            other => panic!("expected Register, got {:?}", other),
        }
    }
    let mut registry_conns = Vec::with_capacity(n);
    for addr in &node_addrs {
        let idx = pending
            .iter()
            .position(|(a, _)| a == addr)
            .expect("every node registered");
        let (_, mut peer) = pending.remove(idx);
        peer.send(&Message::RegisterResponse {
            status: 1,
            info: "registered".to_string(),
        })
        .await;
        registry_conns.push(peer);
    }

    // hand out the ring: node i's successor is node i+1
    for i in 0..n {
        let successor = node_addrs[(i + 1) % n].clone();
        registry_conns[i]
            .send(&Message::NodeList {
                peers: vec![successor],
                pool_size,
                overlay_size: n,
            })
            .await;
    }

    // let the overlay connections establish before any round starts
    tokio::time::sleep(Duration::from_millis(300)).await;

    TestRing {
        handles,
        node_addrs,
        registry_conns,
    }
}

impl TestRing {
    /// Kick off a round on every node.
    pub async fn initiate_round(&mut self, round: u32) {
        for conn in &mut self.registry_conns {
            conn.send(&Message::TaskInitiate { round }).await;
        }
    }

    /// Wait for every node's `TaskComplete`.
    pub async fn await_round_complete(&mut self) {
        for conn in &mut self.registry_conns {
            let message = timeout(RING_TIMEOUT, conn.recv())
                .await
                .expect("round completed in time");
            assert!(
                matches!(message, Message::TaskComplete { .. }),
                "expected TaskComplete, got {:?}",
                message
            );
        }
    }

    /// Pull every node's traffic summary, in ring order.
    pub async fn collect_summaries(&mut self) -> Vec<StatsSnapshot> {
        // a migration batch can land after a node reported completion; give
        // stragglers a moment to finish executing before counters are read
        tokio::time::sleep(Duration::from_millis(500)).await;

        let mut summaries = Vec::with_capacity(self.registry_conns.len());
        for conn in &mut self.registry_conns {
            conn.send(&Message::PullTrafficSummary).await;
            let message = timeout(RING_TIMEOUT, conn.recv())
                .await
                .expect("summary arrived in time");
            match message {
                Message::TrafficSummary { stats, .. } => summaries.push(stats),
                other => panic!("expected TrafficSummary, got {:?}", other),
            }
        }
        summaries
    }
}

/// Poll until `predicate` holds or the timeout elapses.
pub async fn wait_until(what: &str, limit: Duration, mut predicate: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + limit;
    while !predicate() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
