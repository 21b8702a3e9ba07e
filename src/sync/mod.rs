// Sync module - HOW NODES TALK
// Handles the gossip protocol, neighbor sets, and rumor messages

mod gossip;
mod peer;
mod protocol;

pub use gossip::{GossipConfig, GossipError, GossipNode, GossipStats};
pub use peer::{PeerError, PeerSet};
pub use protocol::{Envelope, Rumor};
