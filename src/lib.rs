// epimesh - Epidemic key-value dissemination with vector clocks
//
// - replica: vector clocks, versioned entries, per-node store
// - sync: gossip protocol, neighbor sets, rumors
// - network: in-process delivery, topologies, cluster runtime

pub mod network;
pub mod replica;
pub mod sync;
