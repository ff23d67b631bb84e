//! Deterministic participants
//!
//! Addresses are derived from labels, so the same fixture always yields the
//! same bytes across runs.

use quay_core::{Address, Credential, PublisherIndex};

/// Publisher ordinal used by the standard fixtures
pub const PUBLISHER_INDEX: PublisherIndex = PublisherIndex(10);

/// Lease duration used by the standard consumer group
pub const LEASE_SECS: u64 = 2;

/// Delivery limit used by the standard consumer group
pub const NUM_OF_RETRY: u32 = 2;

/// Scan window used by the standard scenarios
pub const MAX_SCAN: u64 = 5;

/// The `n`th publisher
pub fn publisher(n: u32) -> Address {
    Address::from_label(&format!("publisher-{n}"))
}

/// The `n`th subscriber
pub fn subscriber(n: u32) -> Address {
    Address::from_label(&format!("subscriber-{n}"))
}

/// An address that never joins anything
pub fn outsider() -> Address {
    Address::from_label("outsider")
}

/// Credential for group `n`
pub fn credential(n: u32) -> Credential {
    Credential::new(format!("xpub-group-{n}").into_bytes(), n)
}

/// Channel metadata blob
pub fn metadata() -> Vec<u8> {
    b"metadata".to_vec()
}

/// Payload for the `n`th message
pub fn payload(n: u64) -> Vec<u8> {
    format!("message-{n}").into_bytes()
}
