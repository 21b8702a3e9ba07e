// Gossip Node - The heart of epidemic dissemination
//
// Push-only rumor spreading:
// - Disseminate: apply a local write, then gossip it
// - Gossip: send the current entry to a random subset of neighbors
// - Receive: merge a rumor, and gossip onward only if it changed something
//
// Each step returns the envelopes to deliver instead of calling neighbors
// directly, so the caller decides how rumors travel.

use crate::replica::{
    ClockOrdering, ConcurrentPolicy, Entry, NodeId, Replica, ReplicaError, ReplicaStatistics,
    Snapshot,
};
use crate::sync::peer::{PeerError, PeerSet};
use crate::sync::protocol::{Envelope, Rumor};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};

/// Gossip-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GossipError {
    #[error("Replica error: {0}")]
    Replica(#[from] ReplicaError),

    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Replica lock poisoned")]
    LockPoisoned,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Node {node} outside mesh of {mesh_size}")]
    NodeOutOfRange { node: NodeId, mesh_size: usize },
}

/// Configuration for gossip nodes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GossipConfig {
    /// Maximum number of neighbors contacted per gossip step
    pub fanout: usize,
    /// Value adoption on concurrent clocks
    pub concurrent_policy: ConcurrentPolicy,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            fanout: 3,
            concurrent_policy: ConcurrentPolicy::AcceptIncoming,
        }
    }
}

impl GossipConfig {
    /// Create a new config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set fanout
    pub fn with_fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout;
        self
    }

    /// Set the concurrent-update policy
    pub fn with_concurrent_policy(mut self, policy: ConcurrentPolicy) -> Self {
        self.concurrent_policy = policy;
        self
    }

    pub fn validate(&self) -> Result<(), GossipError> {
        if self.fanout == 0 {
            return Err(GossipError::InvalidConfig("fanout must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Statistics about a gossip node
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GossipStats {
    pub updates_originated: u64,
    pub rumors_sent: u64,
    pub rumors_received: u64,
    /// Received rumors that changed the replica
    pub rumors_applied: u64,
    /// Received rumors whose clock was concurrent with ours
    pub concurrent_merges: u64,
}

#[derive(Debug, Default)]
struct Counters {
    updates_originated: AtomicU64,
    rumors_sent: AtomicU64,
    rumors_received: AtomicU64,
    rumors_applied: AtomicU64,
    concurrent_merges: AtomicU64,
}

/// A gossip agent: one replica plus its neighbor set
///
/// All protocol methods take `&self`; the replica sits behind a mutex so
/// rumors from several senders can be processed concurrently. The lock is
/// held only for the read-compare-merge-write step, never while selecting
/// or addressing neighbors.
#[derive(Debug)]
pub struct GossipNode<V> {
    id: NodeId,
    config: GossipConfig,
    replica: Mutex<Replica<V>>,
    peers: PeerSet,
    counters: Counters,
}

impl<V: Clone> GossipNode<V> {
    /// Create a node for a mesh of `mesh_size` nodes
    pub fn new(id: NodeId, mesh_size: usize, config: GossipConfig) -> Result<Self, GossipError> {
        if id.index() >= mesh_size {
            return Err(GossipError::NodeOutOfRange { node: id, mesh_size });
        }

        let replica = Replica::with_policy(mesh_size, config.concurrent_policy);
        Ok(Self {
            id,
            config,
            replica: Mutex::new(replica),
            peers: PeerSet::new(id, mesh_size),
            counters: Counters::default(),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    /// Link a neighbor (setup only)
    pub fn add_peer(&mut self, peer: NodeId) -> Result<bool, PeerError> {
        self.peers.add_peer(peer)
    }

    // ========================================================================
    // PROTOCOL
    // ========================================================================

    /// Originate an update for `key` and gossip it
    pub fn disseminate(&self, key: &str, value: V) -> Result<Vec<Envelope<V>>, GossipError> {
        let mut replica = self.lock_replica()?;
        let entry = replica.local_update(key, value, self.id)?;
        drop(replica);

        self.counters.updates_originated.fetch_add(1, Ordering::Relaxed);
        info!(node = %self.id, key, clock = %entry.clock(), "disseminating local update");

        self.gossip(key)
    }

    /// Send the current entry for `key` to a random subset of neighbors
    pub fn gossip(&self, key: &str) -> Result<Vec<Envelope<V>>, GossipError> {
        self.gossip_with(key, &mut rand::thread_rng())
    }

    /// Same as `gossip` with a caller-supplied RNG
    pub fn gossip_with<R: Rng + ?Sized>(
        &self,
        key: &str,
        rng: &mut R,
    ) -> Result<Vec<Envelope<V>>, GossipError> {
        if self.peers.is_empty() {
            return Ok(Vec::new());
        }

        let entry = self
            .entry(key)?
            .ok_or_else(|| GossipError::UnknownKey(key.to_string()))?;

        let targets = self.peers.select_random_peers_with(self.config.fanout, rng);
        debug!(node = %self.id, key, ?targets, "gossiping");

        self.counters
            .rumors_sent
            .fetch_add(targets.len() as u64, Ordering::Relaxed);

        Ok(targets
            .into_iter()
            .map(|to| Envelope::new(to, Rumor::new(self.id, key, entry.clone())))
            .collect())
    }

    /// Merge a rumor; keep spreading it only if it taught us something
    pub fn receive(&self, rumor: Rumor<V>) -> Result<Vec<Envelope<V>>, GossipError> {
        self.counters.rumors_received.fetch_add(1, Ordering::Relaxed);

        let mut replica = self.lock_replica()?;
        let outcome = replica.merge(rumor.key(), rumor.entry())?;
        drop(replica);

        if outcome.ordering == ClockOrdering::Concurrent {
            self.counters.concurrent_merges.fetch_add(1, Ordering::Relaxed);
        }

        if !outcome.changed {
            return Ok(Vec::new());
        }

        self.counters.rumors_applied.fetch_add(1, Ordering::Relaxed);
        debug!(
            node = %self.id,
            from = %rumor.sender(),
            key = rumor.key(),
            clock = %outcome.entry.clock(),
            "received update"
        );

        self.gossip(rumor.key())
    }

    /// Push every known entry to every neighbor
    ///
    /// Used for settle rounds, not bound by the fanout. Once a full push
    /// changes nothing anywhere, neighboring replicas hold equal clocks.
    pub fn push_all(&self) -> Result<Vec<Envelope<V>>, GossipError> {
        let snapshot = self.snapshot()?;

        let mut out = Vec::with_capacity(snapshot.len() * self.peers.len());
        for (key, entry) in snapshot.iter() {
            for &to in self.peers.as_slice() {
                out.push(Envelope::new(to, Rumor::new(self.id, key.as_str(), entry.clone())));
            }
        }

        self.counters
            .rumors_sent
            .fetch_add(out.len() as u64, Ordering::Relaxed);
        Ok(out)
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Current entry for a key
    pub fn entry(&self, key: &str) -> Result<Option<Entry<V>>, GossipError> {
        Ok(self.lock_replica()?.get(key).cloned())
    }

    /// Point-in-time copy of the replica
    pub fn snapshot(&self) -> Result<Snapshot<V>, GossipError> {
        Ok(self.lock_replica()?.snapshot())
    }

    pub fn replica_statistics(&self) -> Result<ReplicaStatistics, GossipError> {
        Ok(self.lock_replica()?.statistics())
    }

    pub fn stats(&self) -> GossipStats {
        GossipStats {
            updates_originated: self.counters.updates_originated.load(Ordering::Relaxed),
            rumors_sent: self.counters.rumors_sent.load(Ordering::Relaxed),
            rumors_received: self.counters.rumors_received.load(Ordering::Relaxed),
            rumors_applied: self.counters.rumors_applied.load(Ordering::Relaxed),
            concurrent_merges: self.counters.concurrent_merges.load(Ordering::Relaxed),
        }
    }

    fn lock_replica(&self) -> Result<MutexGuard<'_, Replica<V>>, GossipError> {
        self.replica.lock().map_err(|_| GossipError::LockPoisoned)
    }
}
