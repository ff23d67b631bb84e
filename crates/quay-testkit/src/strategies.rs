//! Proptest strategies for ledger types and operation sequences

use proptest::prelude::*;

pub use proptest;

use quay_core::{Address, Credential};

/// Addresses drawn from a small pool so operations collide often
pub fn arb_address() -> impl Strategy<Value = Address> {
    (0u8..4).prop_map(|n| Address::from_label(&format!("actor-{n}")))
}

/// Credentials drawn from a small pool so groups are shared
pub fn arb_credential() -> impl Strategy<Value = Credential> {
    (0u32..3).prop_map(|n| Credential::new(format!("xpub-{n}").into_bytes(), n))
}

/// Short opaque payloads
pub fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..16)
}

/// One step of a random ledger workload
#[derive(Debug, Clone)]
pub enum LedgerStep {
    /// Create a channel
    Create { caller: Address },
    /// Join the first channel as a publisher
    Join { caller: Address },
    /// Publish to the first channel
    Publish { caller: Address, payload: Vec<u8> },
    /// Subscribe to the first channel
    Subscribe {
        caller: Address,
        credential: Credential,
    },
    /// Ask for the next message
    GetNext { caller: Address, max_scan: u64 },
    /// Confirm whatever the caller believes it holds
    Confirm { caller: Address, message: u64 },
    /// Skip whatever the caller believes it holds
    Skip { caller: Address, message: u64 },
    /// Let time pass
    Advance { secs: u64 },
}

/// A single workload step
pub fn arb_step() -> impl Strategy<Value = LedgerStep> {
    prop_oneof![
        1 => arb_address().prop_map(|caller| LedgerStep::Create { caller }),
        1 => arb_address().prop_map(|caller| LedgerStep::Join { caller }),
        4 => (arb_address(), arb_payload())
            .prop_map(|(caller, payload)| LedgerStep::Publish { caller, payload }),
        2 => (arb_address(), arb_credential())
            .prop_map(|(caller, credential)| LedgerStep::Subscribe { caller, credential }),
        4 => (arb_address(), 0u64..8).prop_map(|(caller, max_scan)| LedgerStep::GetNext { caller, max_scan }),
        2 => (arb_address(), 0u64..8).prop_map(|(caller, message)| LedgerStep::Confirm { caller, message }),
        1 => (arb_address(), 0u64..8).prop_map(|(caller, message)| LedgerStep::Skip { caller, message }),
        2 => (0u64..4).prop_map(|secs| LedgerStep::Advance { secs }),
    ]
}

/// A workload of up to `max_len` steps
pub fn arb_workload(max_len: usize) -> impl Strategy<Value = Vec<LedgerStep>> {
    prop::collection::vec(arb_step(), 1..max_len)
}
