// Conflict Resolution - Value adoption when clocks are concurrent
//
// Clocks always merge by element-wise max. The value has no merge, so when
// two updates are concurrent one of them has to win locally.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do with the value when the incoming clock is concurrent with ours
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConcurrentPolicy {
    /// Last received wins: overwrite the local value
    #[default]
    AcceptIncoming,
    /// First seen wins: keep the local value, still merge the clock
    KeepLocal,
}

impl ConcurrentPolicy {
    /// Whether a concurrent incoming value replaces the local one
    pub fn adopts_incoming(&self) -> bool {
        matches!(self, ConcurrentPolicy::AcceptIncoming)
    }
}

impl fmt::Display for ConcurrentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrentPolicy::AcceptIncoming => write!(f, "accept-incoming"),
            ConcurrentPolicy::KeepLocal => write!(f, "keep-local"),
        }
    }
}

impl FromStr for ConcurrentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept-incoming" => Ok(ConcurrentPolicy::AcceptIncoming),
            "keep-local" => Ok(ConcurrentPolicy::KeepLocal),
            other => Err(format!("unknown concurrent policy: {}", other)),
        }
    }
}
