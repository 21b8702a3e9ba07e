// Vector Clock - Causality tracking for replicated entries
//
// One counter per node identity. The width is fixed for the lifetime of
// the mesh, so clocks from different nodes always line up slot by slot.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Vector clock errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("Clock width mismatch: expected {expected}, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("Slot {slot} out of range for clock of width {width}")]
    SlotOutOfRange { slot: usize, width: usize },
}

/// Causal relation of one clock (`a`) to another (`b`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockOrdering {
    /// `a` has an older slot and no newer one: `b` is newer
    Before,
    /// `b` has an older slot and no newer one: `a` is newer
    After,
    /// Each side has at least one slot the other lacks
    Concurrent,
    /// Every slot is identical
    Equal,
}

impl ClockOrdering {
    /// True for the ambiguous class (concurrent or equal)
    pub fn is_concurrent_or_equal(&self) -> bool {
        matches!(self, ClockOrdering::Concurrent | ClockOrdering::Equal)
    }
}

/// Fixed-width vector clock
///
/// Merge properties:
/// - Commutative: merge(A, B) == merge(B, A)
/// - Associative: merge(merge(A, B), C) == merge(A, merge(B, C))
/// - Idempotent: merge(A, A) == A
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorClock {
    slots: Vec<u64>,
}

impl VectorClock {
    /// Create an all-zero clock with one slot per node
    pub fn new(width: usize) -> Self {
        Self {
            slots: vec![0; width],
        }
    }

    /// Create from raw counters
    pub fn from_slots(slots: Vec<u64>) -> Self {
        Self { slots }
    }

    /// Number of slots
    pub fn width(&self) -> usize {
        self.slots.len()
    }

    /// Counter for a slot (0 if out of range)
    pub fn get(&self, slot: usize) -> u64 {
        self.slots.get(slot).copied().unwrap_or(0)
    }

    /// Raw counters
    pub fn as_slice(&self) -> &[u64] {
        &self.slots
    }

    /// Whether every counter is still zero
    pub fn is_zero(&self) -> bool {
        self.slots.iter().all(|&c| c == 0)
    }

    /// Sum of all counters
    pub fn total(&self) -> u64 {
        self.slots.iter().sum()
    }

    /// Bump the owner's slot by one
    pub fn increment(&mut self, owner: usize) -> Result<u64, ClockError> {
        let width = self.width();
        let slot = self
            .slots
            .get_mut(owner)
            .ok_or(ClockError::SlotOutOfRange { slot: owner, width })?;
        *slot += 1;
        Ok(*slot)
    }

    /// Element-wise max, in place
    ///
    /// Returns true if any slot grew.
    pub fn merge(&mut self, other: &VectorClock) -> Result<bool, ClockError> {
        self.check_width(other)?;

        let mut grew = false;
        for (mine, &theirs) in self.slots.iter_mut().zip(&other.slots) {
            if theirs > *mine {
                *mine = theirs;
                grew = true;
            }
        }
        Ok(grew)
    }

    /// Compare this clock (`a`) against `other` (`b`)
    pub fn compare(&self, other: &VectorClock) -> Result<ClockOrdering, ClockError> {
        self.check_width(other)?;

        let mut a_has_older_slot = false;
        let mut b_has_older_slot = false;
        for (&a, &b) in self.slots.iter().zip(&other.slots) {
            if a < b {
                a_has_older_slot = true;
            }
            if b < a {
                b_has_older_slot = true;
            }
        }

        Ok(match (a_has_older_slot, b_has_older_slot) {
            (true, false) => ClockOrdering::Before,
            (false, true) => ClockOrdering::After,
            (true, true) => ClockOrdering::Concurrent,
            (false, false) => ClockOrdering::Equal,
        })
    }

    /// Every slot of self is >= the matching slot of other
    pub fn dominates(&self, other: &VectorClock) -> bool {
        self.width() == other.width()
            && self.slots.iter().zip(&other.slots).all(|(a, b)| a >= b)
    }

    fn check_width(&self, other: &VectorClock) -> Result<(), ClockError> {
        if self.width() != other.width() {
            return Err(ClockError::WidthMismatch {
                expected: self.width(),
                actual: other.width(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.slots.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "]")
    }
}
