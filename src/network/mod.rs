// Network module - THE MESH (in-process)
// Handles rumor delivery, neighbor-graph construction, and the node runtime

mod cluster;
mod topology;
mod transport;

pub use cluster::{Cluster, ClusterError, ClusterStats, SettleReport, DEFAULT_MAX_SETTLE_ROUNDS};
pub use topology::{Topology, TopologyError};
pub use transport::{InFlight, InProcessTransport, Transport, TransportError};
