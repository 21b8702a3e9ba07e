// Cluster Tests
// End-to-end dissemination over running node tasks

use epimesh::network::{Cluster, ClusterError, Topology};
use epimesh::replica::{ConcurrentPolicy, NodeId};
use epimesh::sync::GossipConfig;
use std::time::Duration;

fn start(size: usize, topology: Topology) -> Cluster<i64> {
    Cluster::start(size, topology, GossipConfig::default()).unwrap()
}

// ============================================================================
// CONVERGENCE
// ============================================================================

#[tokio::test]
async fn test_single_update_converges_on_complete_graph() {
    let cluster = start(5, Topology::Complete);
    cluster.disseminate(NodeId::new(0), "temperature", 27).unwrap();

    cluster.settle().await.unwrap();

    let snapshots = cluster.snapshots().unwrap();
    let reference = snapshots[0].get("temperature").unwrap().clock().clone();
    assert_eq!(reference.get(0), 1);
    for snapshot in &snapshots {
        let entry = snapshot.get("temperature").unwrap();
        assert_eq!(entry.value(), Some(&27));
        assert_eq!(entry.clock(), &reference);
    }
    assert_eq!(cluster.in_flight(), 0);
    cluster.shutdown().await;
}

#[tokio::test]
async fn test_full_fanout_converges_by_gossip_alone() {
    // Fanout covers every neighbor, so the epidemic phase reaches all nodes
    let config = GossipConfig::new().with_fanout(4);
    let cluster: Cluster<i64> = Cluster::start(5, Topology::Complete, config).unwrap();
    cluster.disseminate(NodeId::new(0), "temperature", 27).unwrap();

    cluster.wait_for_quiescence().await;

    for snapshot in cluster.snapshots().unwrap() {
        let entry = snapshot.get("temperature").unwrap();
        assert_eq!(entry.value(), Some(&27));
        assert_eq!(entry.clock().as_slice(), &[1, 0, 0, 0, 0]);
    }
    let stats = cluster.stats();
    assert_eq!(stats.rumors_applied, 4);
    assert_eq!(stats.rumors_sent, 4 + 4 * 4);

    let report = cluster.settle().await.unwrap();
    assert_eq!(report.rounds, 1);
    assert_eq!(report.rumors_applied, 0);
    cluster.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_converges_on_multi_thread_runtime() {
    let cluster = start(12, Topology::Complete);
    for i in 0..12 {
        cluster.disseminate(NodeId::new(i), &format!("key-{}", i), i as i64).unwrap();
    }

    cluster.settle_timeout(Duration::from_secs(10)).await.unwrap();

    for snapshot in cluster.snapshots().unwrap() {
        assert_eq!(snapshot.len(), 12);
        for i in 0..12 {
            let entry = snapshot.get(&format!("key-{}", i)).unwrap();
            assert_eq!(entry.value(), Some(&(i as i64)));
            assert_eq!(entry.clock().get(i), 1);
            assert_eq!(entry.clock().total(), 1);
        }
    }
    cluster.shutdown().await;
}

#[tokio::test]
async fn test_ring_converges_through_settle_rounds() {
    let cluster = start(8, Topology::Ring);
    cluster.disseminate(NodeId::new(3), "k", 11).unwrap();

    let report = cluster.settle().await.unwrap();
    assert!(report.rounds >= 1);

    for snapshot in cluster.snapshots().unwrap() {
        let entry = snapshot.get("k").unwrap();
        assert_eq!(entry.value(), Some(&11));
        assert_eq!(entry.clock().as_slice(), &[0, 0, 0, 1, 0, 0, 0, 0]);
    }
    cluster.shutdown().await;
}

#[tokio::test]
async fn test_repeated_updates_from_origin() {
    let cluster = start(5, Topology::Complete);
    cluster.disseminate(NodeId::new(0), "temperature", 25).unwrap();
    cluster.settle().await.unwrap();
    cluster.disseminate(NodeId::new(0), "temperature", 27).unwrap();
    cluster.settle().await.unwrap();

    for snapshot in cluster.snapshots().unwrap() {
        let entry = snapshot.get("temperature").unwrap();
        assert_eq!(entry.value(), Some(&27));
        assert_eq!(entry.clock().as_slice(), &[2, 0, 0, 0, 0]);
    }
    cluster.shutdown().await;
}

#[tokio::test]
async fn test_disconnected_components_stay_apart() {
    let topology = Topology::Custom(vec![(0, 1), (2, 3)]);
    let cluster = start(4, topology);
    cluster.disseminate(NodeId::new(0), "k", 1).unwrap();

    cluster.settle().await.unwrap();

    assert!(cluster.snapshot(NodeId::new(1)).unwrap().get("k").is_some());
    assert!(cluster.snapshot(NodeId::new(2)).unwrap().get("k").is_none());
    assert!(cluster.snapshot(NodeId::new(3)).unwrap().get("k").is_none());
    cluster.shutdown().await;
}

// ============================================================================
// CONCURRENT UPDATES
// ============================================================================

#[tokio::test]
async fn test_concurrent_updates_converge_clocks() {
    let cluster = start(5, Topology::Complete);
    // Current-thread runtime: no node task runs before the first await
    cluster.disseminate(NodeId::new(0), "x", 1).unwrap();
    cluster.disseminate(NodeId::new(1), "x", 2).unwrap();

    cluster.settle().await.unwrap();

    for snapshot in cluster.snapshots().unwrap() {
        let entry = snapshot.get("x").unwrap();
        assert_eq!(entry.clock().as_slice(), &[1, 1, 0, 0, 0]);
        // Last received wins on concurrent clocks
        assert!(matches!(entry.value(), Some(&1) | Some(&2)));
    }
    assert!(cluster.stats().concurrent_merges >= 1);
    cluster.shutdown().await;
}

#[tokio::test]
async fn test_accept_incoming_swaps_concurrent_values() {
    let cluster = start(2, Topology::Complete);
    cluster.disseminate(NodeId::new(0), "x", 1).unwrap();
    cluster.disseminate(NodeId::new(1), "x", 2).unwrap();

    cluster.wait_for_quiescence().await;

    // Each node's first rumor is the other's concurrent write, and it wins
    let zero = cluster.snapshot(NodeId::new(0)).unwrap();
    let one = cluster.snapshot(NodeId::new(1)).unwrap();
    assert_eq!(zero.get("x").unwrap().value(), Some(&2));
    assert_eq!(one.get("x").unwrap().value(), Some(&1));
    assert_eq!(zero.get("x").unwrap().clock().as_slice(), &[1, 1]);
    assert_eq!(one.get("x").unwrap().clock().as_slice(), &[1, 1]);

    let report = cluster.settle().await.unwrap();
    assert_eq!(report.rumors_applied, 0);
    cluster.shutdown().await;
}

#[tokio::test]
async fn test_keep_local_policy_preserves_origin_values() {
    let config = GossipConfig::new().with_concurrent_policy(ConcurrentPolicy::KeepLocal);
    let cluster: Cluster<i64> = Cluster::start(2, Topology::Complete, config).unwrap();
    cluster.disseminate(NodeId::new(0), "x", 1).unwrap();
    cluster.disseminate(NodeId::new(1), "x", 2).unwrap();

    cluster.settle().await.unwrap();

    let zero = cluster.snapshot(NodeId::new(0)).unwrap();
    let one = cluster.snapshot(NodeId::new(1)).unwrap();
    assert_eq!(zero.get("x").unwrap().value(), Some(&1));
    assert_eq!(one.get("x").unwrap().value(), Some(&2));
    assert_eq!(zero.get("x").unwrap().clock(), one.get("x").unwrap().clock());
    cluster.shutdown().await;
}

// ============================================================================
// STATISTICS & ERRORS
// ============================================================================

#[tokio::test]
async fn test_stats_totals() {
    let cluster = start(4, Topology::Star { hub: 0 });
    cluster.disseminate(NodeId::new(2), "k", 5).unwrap();
    cluster.settle().await.unwrap();

    let stats = cluster.stats();
    assert_eq!(stats.nodes, 4);
    assert_eq!(stats.updates_originated, 1);
    assert_eq!(stats.rumors_applied, 3);
    assert_eq!(stats.rumors_sent, stats.rumors_received);
    cluster.shutdown().await;
}

#[tokio::test]
async fn test_invalid_topology_rejected() {
    let result = Cluster::<i64>::start(3, Topology::Custom(vec![(0, 5)]), GossipConfig::default());
    assert!(matches!(result, Err(ClusterError::Topology(_))));
}

#[tokio::test]
async fn test_invalid_fanout_rejected() {
    let config = GossipConfig::new().with_fanout(0);
    let result = Cluster::<i64>::start(3, Topology::Complete, config);
    assert!(matches!(result, Err(ClusterError::Gossip(_))));
}
