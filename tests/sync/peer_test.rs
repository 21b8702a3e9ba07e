// Peer Tests
// Tests for neighbor sets and random fan-out selection

use epimesh::replica::NodeId;
use epimesh::sync::{PeerError, PeerSet};
use std::collections::HashSet;

fn full_peer_set(me: usize, size: usize) -> PeerSet {
    let mut peers = PeerSet::new(NodeId::new(me), size);
    for i in (0..size).filter(|&i| i != me) {
        peers.add_peer(NodeId::new(i)).unwrap();
    }
    peers
}

#[test]
fn test_peer_set_rejects_out_of_range() {
    let mut peers = PeerSet::new(NodeId::new(0), 3);
    let result = peers.add_peer(NodeId::new(3));
    assert_eq!(
        result,
        Err(PeerError::PeerOutOfRange {
            peer: NodeId::new(3),
            mesh_size: 3
        })
    );
}

#[test]
fn test_select_from_empty_set() {
    let peers = PeerSet::new(NodeId::new(0), 1);
    assert!(peers.select_random_peers(3).is_empty());
}

#[test]
fn test_select_fewer_peers_than_count() {
    let peers = full_peer_set(0, 3);
    let chosen: HashSet<NodeId> = peers.select_random_peers(3).into_iter().collect();

    assert_eq!(chosen.len(), 2);
    assert!(chosen.contains(&NodeId::new(1)));
    assert!(chosen.contains(&NodeId::new(2)));
}

#[test]
fn test_select_never_returns_self() {
    let peers = full_peer_set(4, 8);
    for _ in 0..100 {
        assert!(!peers.select_random_peers(3).contains(&NodeId::new(4)));
    }
}

#[test]
fn test_select_reaches_every_peer_eventually() {
    let peers = full_peer_set(0, 6);
    let mut seen = HashSet::new();
    for _ in 0..200 {
        seen.extend(peers.select_random_peers(3));
    }
    assert_eq!(seen.len(), 5);
}
