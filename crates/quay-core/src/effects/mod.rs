//! Effect interfaces
//!
//! The ledger is otherwise pure; the only ambient input it needs from the host
//! is the current time.

pub mod time;

pub use time::{PhysicalTimeEffects, SystemTimeHandler, TimeError};
