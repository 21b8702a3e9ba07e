// Replica - A node's local copy of the replicated key-value data
//
// Every key carries its own vector clock. Entries are created lazily, on
// the first local update or the first rumor for an unseen key, and are
// never removed.

use crate::replica::clock::{ClockError, ClockOrdering, VectorClock};
use crate::replica::conflict::ConcurrentPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Identity of a node in the mesh: its slot in every vector clock
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    /// Create from a slot index
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Slot index of this node
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

/// Errors that can occur during replica operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplicaError {
    #[error("Clock error: {0}")]
    Clock(#[from] ClockError),
}

/// A single versioned value
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry<V> {
    /// `None` until a merge fills in a receive-created placeholder
    value: Option<V>,
    clock: VectorClock,
}

impl<V> Entry<V> {
    /// Create an entry with an explicit clock
    pub fn new(value: V, clock: VectorClock) -> Self {
        Self {
            value: Some(value),
            clock,
        }
    }

    /// Zero-clock entry with no value yet
    pub fn placeholder(width: usize) -> Self {
        Self {
            value: None,
            clock: VectorClock::new(width),
        }
    }

    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    pub fn is_placeholder(&self) -> bool {
        self.value.is_none()
    }
}

/// Result of merging an incoming entry
#[derive(Clone, Debug)]
pub struct MergeOutcome<V> {
    /// How the local clock related to the incoming one before the merge
    pub ordering: ClockOrdering,
    /// Whether the stored entry changed (drives re-gossip)
    pub changed: bool,
    /// The stored entry after the merge
    pub entry: Entry<V>,
}

/// Read-only point-in-time copy of a replica, ordered by key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot<V> {
    entries: BTreeMap<String, Entry<V>>,
}

impl<V> Snapshot<V> {
    pub fn get(&self, key: &str) -> Option<&Entry<V>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Entry<V>)> {
        self.entries.iter()
    }
}

/// Statistics about a replica
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicaStatistics {
    pub keys: usize,
    pub placeholders: usize,
    /// Sum of every counter of every clock (grows with each accepted update)
    pub clock_total: u64,
}

/// Per-node key-value store with vector-clocked entries
#[derive(Clone, Debug)]
pub struct Replica<V> {
    /// Clock width (total node count)
    width: usize,
    policy: ConcurrentPolicy,
    entries: HashMap<String, Entry<V>>,
}

impl<V: Clone> Replica<V> {
    /// Create an empty replica for a mesh of `width` nodes
    pub fn new(width: usize) -> Self {
        Self::with_policy(width, ConcurrentPolicy::default())
    }

    /// Create with an explicit concurrent-update policy
    pub fn with_policy(width: usize, policy: ConcurrentPolicy) -> Self {
        Self {
            width,
            policy,
            entries: HashMap::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn policy(&self) -> ConcurrentPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Entry<V>> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Apply a local write: bump the owner's slot and set the value
    ///
    /// Returns a copy of the updated entry, ready to be gossiped.
    pub fn local_update(
        &mut self,
        key: &str,
        value: V,
        owner: NodeId,
    ) -> Result<Entry<V>, ReplicaError> {
        if owner.index() >= self.width {
            return Err(ClockError::SlotOutOfRange {
                slot: owner.index(),
                width: self.width,
            }
            .into());
        }

        let width = self.width;
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::placeholder(width));

        entry.clock.increment(owner.index())?;
        entry.value = Some(value);

        Ok(entry.clone())
    }

    /// Merge an entry received from a peer
    ///
    /// The clock is merged whenever the incoming one carries news. The
    /// value is adopted when the incoming clock is strictly newer, and on
    /// a concurrent clock when the policy says so. Equal or older
    /// incoming entries leave the replica untouched.
    pub fn merge(&mut self, key: &str, incoming: &Entry<V>) -> Result<MergeOutcome<V>, ReplicaError> {
        if incoming.clock.width() != self.width {
            return Err(ClockError::WidthMismatch {
                expected: self.width,
                actual: incoming.clock.width(),
            }
            .into());
        }

        let width = self.width;
        let policy = self.policy;
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::placeholder(width));

        let ordering = entry.clock.compare(&incoming.clock)?;
        let changed = match ordering {
            ClockOrdering::Before => {
                entry.value = incoming.value.clone();
                entry.clock.merge(&incoming.clock)?
            }
            ClockOrdering::Concurrent => {
                if policy.adopts_incoming() {
                    entry.value = incoming.value.clone();
                }
                entry.clock.merge(&incoming.clock)?
            }
            ClockOrdering::Equal | ClockOrdering::After => false,
        };

        debug!(key, ?ordering, changed, clock = %entry.clock, "merged entry");

        Ok(MergeOutcome {
            ordering,
            changed,
            entry: entry.clone(),
        })
    }

    /// Copy of the full key → entry mapping
    pub fn snapshot(&self) -> Snapshot<V> {
        Snapshot {
            entries: self
                .entries
                .iter()
                .map(|(k, e)| (k.clone(), e.clone()))
                .collect(),
        }
    }

    pub fn statistics(&self) -> ReplicaStatistics {
        ReplicaStatistics {
            keys: self.entries.len(),
            placeholders: self.entries.values().filter(|e| e.is_placeholder()).count(),
            clock_total: self.entries.values().map(|e| e.clock.total()).sum(),
        }
    }
}
