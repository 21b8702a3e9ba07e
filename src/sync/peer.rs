// Peer Management - A node's neighbor set
//
// Neighbors are plain node ids (indices into the cluster), never
// references into another node's state. The set is filled during
// topology setup and only read while gossiping.

use crate::replica::NodeId;
use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

/// Peer-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeerError {
    #[error("Cannot add self as a peer")]
    CannotAddSelf,

    #[error("Peer {peer} out of range for a mesh of {mesh_size} nodes")]
    PeerOutOfRange { peer: NodeId, mesh_size: usize },
}

/// Neighbor set of a single node
#[derive(Clone, Debug)]
pub struct PeerSet {
    /// Our own node ID
    my_node_id: NodeId,
    /// Total node count; valid peers are `0..mesh_size`
    mesh_size: usize,
    /// Kept in insertion order, duplicates rejected
    peers: Vec<NodeId>,
}

impl PeerSet {
    /// Create an empty neighbor set
    pub fn new(my_node_id: NodeId, mesh_size: usize) -> Self {
        Self {
            my_node_id,
            mesh_size,
            peers: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.peers.contains(node_id)
    }

    pub fn as_slice(&self) -> &[NodeId] {
        &self.peers
    }

    /// Add a neighbor
    ///
    /// Returns false if it was already present.
    pub fn add_peer(&mut self, node_id: NodeId) -> Result<bool, PeerError> {
        if node_id == self.my_node_id {
            return Err(PeerError::CannotAddSelf);
        }
        if node_id.index() >= self.mesh_size {
            return Err(PeerError::PeerOutOfRange {
                peer: node_id,
                mesh_size: self.mesh_size,
            });
        }
        if self.peers.contains(&node_id) {
            return Ok(false);
        }

        self.peers.push(node_id);
        Ok(true)
    }

    /// Pick up to `count` distinct neighbors uniformly at random
    pub fn select_random_peers(&self, count: usize) -> Vec<NodeId> {
        self.select_random_peers_with(count, &mut rand::thread_rng())
    }

    /// Same as `select_random_peers` with a caller-supplied RNG
    pub fn select_random_peers_with<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<NodeId> {
        let amount = count.min(self.peers.len());
        self.peers.choose_multiple(rng, amount).copied().collect()
    }
}
