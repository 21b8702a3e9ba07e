// Cluster - Builds the mesh and runs every node as a tokio task
//
// Each node drains its own inbox. Receiving a rumor may produce more
// envelopes, which go straight back through the transport. The driver
// injects updates, waits for the mesh to go quiet, and reads snapshots.

use crate::network::topology::{Topology, TopologyError};
use crate::network::transport::{InProcessTransport, Transport, TransportError};
use crate::replica::{NodeId, Snapshot};
use crate::sync::{Envelope, GossipConfig, GossipError, GossipNode, GossipStats, PeerError, Rumor};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Upper bound on settle rounds before giving up
pub const DEFAULT_MAX_SETTLE_ROUNDS: usize = 64;

/// Cluster errors
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Cluster needs at least one node")]
    InvalidSize,

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Peer error: {0}")]
    Peer(#[from] PeerError),

    #[error("Gossip error: {0}")]
    Gossip(#[from] GossipError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("No tokio runtime available")]
    NoRuntime,

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Mesh did not converge within {rounds} settle rounds")]
    NotConverged { rounds: usize },

    #[error("Timed out waiting for convergence")]
    Timeout,
}

/// Totals across every node
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ClusterStats {
    pub nodes: usize,
    pub updates_originated: u64,
    pub rumors_sent: u64,
    pub rumors_received: u64,
    pub rumors_applied: u64,
    pub concurrent_merges: u64,
}

/// Outcome of `Cluster::settle`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettleReport {
    /// Settle rounds run, including the final quiet one
    pub rounds: usize,
    /// Rumors that changed some replica during the settle rounds
    pub rumors_applied: u64,
}

/// A running mesh of gossip nodes
pub struct Cluster<V> {
    nodes: Vec<Arc<GossipNode<V>>>,
    transport: Arc<InProcessTransport<V>>,
    handles: Vec<JoinHandle<()>>,
    topology: Topology,
}

impl<V> Cluster<V>
where
    V: Clone + Send + 'static,
{
    /// Build `size` nodes, link them per `topology`, and spawn their tasks
    ///
    /// Must be called from inside a tokio runtime.
    pub fn start(size: usize, topology: Topology, config: GossipConfig) -> Result<Self, ClusterError> {
        if size == 0 {
            return Err(ClusterError::InvalidSize);
        }
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| ClusterError::NoRuntime)?;

        let mut nodes = (0..size)
            .map(|i| GossipNode::new(NodeId::new(i), size, config.clone()))
            .collect::<Result<Vec<GossipNode<V>>, _>>()?;

        for (a, b) in topology.edges(size)? {
            nodes[a.index()].add_peer(b)?;
            nodes[b.index()].add_peer(a)?;
        }

        let (transport, inboxes) = InProcessTransport::new(size);
        let transport = Arc::new(transport);
        let nodes: Vec<Arc<GossipNode<V>>> = nodes.into_iter().map(Arc::new).collect();

        let handles = nodes
            .iter()
            .zip(inboxes)
            .map(|(node, inbox)| runtime.spawn(run_node(node.clone(), inbox, transport.clone())))
            .collect();

        info!(size, %topology, fanout = config.fanout, "cluster started");

        Ok(Self {
            nodes,
            transport,
            handles,
            topology,
        })
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn node(&self, id: NodeId) -> Result<&Arc<GossipNode<V>>, ClusterError> {
        self.nodes.get(id.index()).ok_or(ClusterError::UnknownNode(id))
    }

    pub fn nodes(&self) -> &[Arc<GossipNode<V>>] {
        &self.nodes
    }

    /// Rumors enqueued but not yet processed
    pub fn in_flight(&self) -> usize {
        self.transport.in_flight().current()
    }

    /// Inject a local update at `node`
    pub fn disseminate(&self, node: NodeId, key: &str, value: V) -> Result<(), ClusterError> {
        let envelopes = self.node(node)?.disseminate(key, value)?;
        deliver(self.transport.as_ref(), envelopes);
        Ok(())
    }

    pub fn snapshot(&self, node: NodeId) -> Result<Snapshot<V>, ClusterError> {
        Ok(self.node(node)?.snapshot()?)
    }

    /// Snapshots of every node, in node order
    pub fn snapshots(&self) -> Result<Vec<Snapshot<V>>, ClusterError> {
        self.nodes
            .iter()
            .map(|node| node.snapshot().map_err(ClusterError::from))
            .collect()
    }

    pub fn stats(&self) -> ClusterStats {
        self.nodes.iter().map(|node| node.stats()).fold(
            ClusterStats {
                nodes: self.nodes.len(),
                ..ClusterStats::default()
            },
            |mut total, s: GossipStats| {
                total.updates_originated += s.updates_originated;
                total.rumors_sent += s.rumors_sent;
                total.rumors_received += s.rumors_received;
                total.rumors_applied += s.rumors_applied;
                total.concurrent_merges += s.concurrent_merges;
                total
            },
        )
    }

    /// Wait until no rumor is in flight
    ///
    /// Epidemic spreading has stopped at this point, but a node may still
    /// have been skipped by every random fan-out. Use `settle` for full
    /// convergence.
    pub async fn wait_for_quiescence(&self) {
        self.transport.in_flight().wait_idle().await;
    }

    /// Run settle rounds until one changes nothing
    pub async fn settle(&self) -> Result<SettleReport, ClusterError> {
        self.settle_with_limit(DEFAULT_MAX_SETTLE_ROUNDS).await
    }

    /// `settle` with an explicit round limit
    pub async fn settle_with_limit(&self, max_rounds: usize) -> Result<SettleReport, ClusterError> {
        self.wait_for_quiescence().await;
        let start = self.stats().rumors_applied;

        for round in 1..=max_rounds {
            let before = self.stats().rumors_applied;

            for node in &self.nodes {
                let envelopes = node.push_all()?;
                deliver(self.transport.as_ref(), envelopes);
            }
            self.wait_for_quiescence().await;

            let after = self.stats().rumors_applied;
            debug!(round, applied = after - before, "settle round finished");

            if after == before {
                info!(rounds = round, "mesh converged");
                return Ok(SettleReport {
                    rounds: round,
                    rumors_applied: after - start,
                });
            }
        }

        Err(ClusterError::NotConverged { rounds: max_rounds })
    }

    /// `settle` bounded by wall-clock time
    pub async fn settle_timeout(&self, timeout: Duration) -> Result<SettleReport, ClusterError> {
        tokio::time::timeout(timeout, self.settle())
            .await
            .map_err(|_| ClusterError::Timeout)?
    }

    /// Stop every node task
    pub async fn shutdown(mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
            let _ = handle.await;
        }
        info!("cluster stopped");
    }
}

impl<V> Drop for Cluster<V> {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Send envelopes, dropping any that cannot be delivered
fn deliver<V, T>(transport: &T, envelopes: Vec<Envelope<V>>) -> usize
where
    T: Transport<V> + ?Sized,
{
    let mut delivered = 0;
    for envelope in envelopes {
        let to = envelope.to;
        match transport.send(envelope) {
            Ok(()) => delivered += 1,
            Err(e) => warn!(%to, error = %e, "dropping rumor"),
        }
    }
    delivered
}

async fn run_node<V>(
    node: Arc<GossipNode<V>>,
    mut inbox: mpsc::UnboundedReceiver<Rumor<V>>,
    transport: Arc<InProcessTransport<V>>,
) where
    V: Clone + Send + 'static,
{
    while let Some(rumor) = inbox.recv().await {
        let from = rumor.sender();
        match node.receive(rumor) {
            Ok(envelopes) => {
                deliver(transport.as_ref(), envelopes);
            }
            Err(e) => warn!(node = %node.id(), %from, error = %e, "dropping rumor"),
        }
        // Only after onward rumors are enqueued, so in-flight never dips to zero early
        transport.in_flight().finish();
    }
}
