//! Count dissemination over a three-node ring.
//!
//! Counts are injected at each origin's successor, exactly where that
//! origin's own announcement would enter the ring, and must travel all the
//! way around: every node ends up knowing both other counts, nobody records
//! itself, and later announcements overwrite earlier ones.

mod common;

use common::{setup_ring, wait_until, FramedPeer};
use ringmine_node::NodeConfig;
use ringmine_wire::Message;
use std::time::Duration;

const SETTLE: Duration = Duration::from_secs(10);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn counts_circle_the_ring_once() {
    let configs = (0..3)
        .map(|_| NodeConfig::new("placeholder").with_pow_difficulty_bits(0))
        .collect();
    let ring = setup_ring(configs, 2).await;

    let seeds = [5u64, 7, 9];

    // deliver each node's announcement at its successor, as the ring would
    for (i, &count) in seeds.iter().enumerate() {
        let origin = ring.node_addrs[i].clone();
        let successor = &ring.node_addrs[(i + 1) % 3];
        let mut injector = FramedPeer::connect(successor).await;
        injector
            .send(&Message::TasksCount { origin, count })
            .await;
    }

    wait_until("all nodes to learn both peer counts", SETTLE, || {
        ring.handles.iter().all(|h| h.overlay_counts().len() == 2)
    })
    .await;

    for (i, handle) in ring.handles.iter().enumerate() {
        let counts = handle.overlay_counts();
        // own address never appears, even after the message circled back
        assert!(
            !counts.contains_key(&ring.node_addrs[i]),
            "node {} recorded its own count",
            i
        );
        for j in 0..3 {
            if j == i {
                continue;
            }
            assert_eq!(
                counts.get(&ring.node_addrs[j]),
                Some(&seeds[j]),
                "node {} has a wrong count for node {}",
                i,
                j
            );
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn later_counts_overwrite_earlier_ones() {
    let configs = (0..3)
        .map(|_| NodeConfig::new("placeholder").with_pow_difficulty_bits(0))
        .collect();
    let ring = setup_ring(configs, 2).await;

    let origin = ring.node_addrs[0].clone();
    let successor = &ring.node_addrs[1];
    let mut injector = FramedPeer::connect(successor).await;

    injector
        .send(&Message::TasksCount {
            origin: origin.clone(),
            count: 5,
        })
        .await;
    wait_until("first count to spread", SETTLE, || {
        (1..3).all(|i| ring.handles[i].overlay_counts().get(&origin) == Some(&5))
    })
    .await;

    injector
        .send(&Message::TasksCount {
            origin: origin.clone(),
            count: 50,
        })
        .await;
    wait_until("updated count to spread", SETTLE, || {
        (1..3).all(|i| ring.handles[i].overlay_counts().get(&origin) == Some(&50))
    })
    .await;

    // overwritten, not accumulated: still exactly one entry for the origin
    for i in 1..3 {
        assert_eq!(ring.handles[i].overlay_counts().len(), 1);
    }
}
