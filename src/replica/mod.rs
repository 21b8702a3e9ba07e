// Replica module - THE LOCAL COPY
// Handles vector clocks, versioned entries, and concurrent-update policy

mod clock;
mod conflict;
mod state;

pub use clock::{ClockError, ClockOrdering, VectorClock};
pub use conflict::ConcurrentPolicy;
pub use state::{
    Entry, MergeOutcome, NodeId, Replica, ReplicaError, ReplicaStatistics, Snapshot,
};
