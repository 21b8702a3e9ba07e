// Topology - Neighbor graph shapes
//
// Every shape expands to a list of undirected edges; the cluster links
// both endpoints of each edge.

use crate::replica::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Topology errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Node {node} out of range for a mesh of {size} nodes")]
    NodeOutOfRange { node: usize, size: usize },

    #[error("Self-loop on node {0}")]
    SelfLoop(usize),

    #[error("Unknown topology: {0}")]
    Unknown(String),
}

/// Shape of the neighbor graph
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topology {
    /// Every node linked to every other node
    #[default]
    Complete,
    /// Node i linked to i+1, last linked back to first
    Ring,
    /// Every node linked to the hub only
    Star { hub: usize },
    /// Explicit undirected edges
    Custom(Vec<(usize, usize)>),
}

impl Topology {
    /// Expand into undirected edges for a mesh of `size` nodes
    pub fn edges(&self, size: usize) -> Result<Vec<(NodeId, NodeId)>, TopologyError> {
        let pairs: Vec<(usize, usize)> = match self {
            Topology::Complete => (0..size)
                .flat_map(|i| (i + 1..size).map(move |j| (i, j)))
                .collect(),
            Topology::Ring => match size {
                0 | 1 => Vec::new(),
                2 => vec![(0, 1)],
                _ => (0..size).map(|i| (i, (i + 1) % size)).collect(),
            },
            Topology::Star { hub } => {
                if *hub >= size {
                    return Err(TopologyError::NodeOutOfRange { node: *hub, size });
                }
                (0..size).filter(|i| i != hub).map(|i| (*hub, i)).collect()
            }
            Topology::Custom(edges) => {
                for &(a, b) in edges {
                    if a == b {
                        return Err(TopologyError::SelfLoop(a));
                    }
                    if let Some(node) = [a, b].into_iter().find(|&n| n >= size) {
                        return Err(TopologyError::NodeOutOfRange { node, size });
                    }
                }
                edges.clone()
            }
        };

        Ok(pairs
            .into_iter()
            .map(|(a, b)| (NodeId::new(a), NodeId::new(b)))
            .collect())
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Complete => write!(f, "complete"),
            Topology::Ring => write!(f, "ring"),
            Topology::Star { hub } => write!(f, "star:{}", hub),
            Topology::Custom(edges) => write!(f, "custom({} edges)", edges.len()),
        }
    }
}

impl FromStr for Topology {
    type Err = TopologyError;

    /// Accepts `complete`, `ring`, `star` (hub 0) or `star:<hub>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complete" => Ok(Topology::Complete),
            "ring" => Ok(Topology::Ring),
            "star" => Ok(Topology::Star { hub: 0 }),
            other => other
                .strip_prefix("star:")
                .and_then(|hub| hub.parse().ok())
                .map(|hub| Topology::Star { hub })
                .ok_or_else(|| TopologyError::Unknown(other.to_string())),
        }
    }
}
