//! Physical time values
//!
//! Lease expiry is a pure comparison between a stored deadline and the
//! timestamp captured when an operation starts. There are no timers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wall-clock timestamp in milliseconds since the Unix epoch
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct PhysicalTime {
    /// Milliseconds since the Unix epoch
    pub ts_ms: u64,
}

impl PhysicalTime {
    /// Create from milliseconds
    pub fn from_ms(ts_ms: u64) -> Self {
        Self { ts_ms }
    }

    /// Create from whole seconds
    pub fn from_secs(secs: u64) -> Self {
        Self {
            ts_ms: secs.saturating_mul(1000),
        }
    }

    /// This instant shifted forward by `secs` seconds, saturating
    pub fn plus_secs(&self, secs: u64) -> Self {
        Self {
            ts_ms: self.ts_ms.saturating_add(secs.saturating_mul(1000)),
        }
    }

    /// True once `self` has reached or passed `deadline`
    pub fn has_reached(&self, deadline: PhysicalTime) -> bool {
        self.ts_ms >= deadline.ts_ms
    }
}

impl fmt::Display for PhysicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.ts_ms)
    }
}
