// Protocol - Messages exchanged between nodes
//
// A rumor is the Receive call contract turned into a value: who sent it,
// which key, and the sender's entry at the time of sending. An envelope
// pairs a rumor with its recipient.

use crate::replica::{Entry, NodeId};
use serde::{Deserialize, Serialize};

/// One pushed update for one key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rumor<V> {
    sender: NodeId,
    key: String,
    entry: Entry<V>,
}

impl<V> Rumor<V> {
    pub fn new(sender: NodeId, key: impl Into<String>, entry: Entry<V>) -> Self {
        Self {
            sender,
            key: key.into(),
            entry,
        }
    }

    pub fn sender(&self) -> NodeId {
        self.sender
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn entry(&self) -> &Entry<V> {
        &self.entry
    }
}

/// A rumor addressed to a neighbor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope<V> {
    pub to: NodeId,
    pub rumor: Rumor<V>,
}

impl<V> Envelope<V> {
    pub fn new(to: NodeId, rumor: Rumor<V>) -> Self {
        Self { to, rumor }
    }
}
