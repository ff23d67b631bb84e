//! Ledger state
//!
//! The three partitioned stores the service composes. Every field is plain
//! data so the whole ledger can be exported and reloaded with serde.

use crate::lease::LeaseManager;
use crate::log::MessageLog;
use crate::registry::IdentityRegistry;
use serde::{Deserialize, Serialize};

/// Registry, message log and group state of one ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub(crate) registry: IdentityRegistry,
    pub(crate) log: MessageLog,
    pub(crate) leases: LeaseManager,
}

impl LedgerState {
    /// Create an empty ledger state
    pub fn new() -> Self {
        Self::default()
    }

    /// Channel and membership registry
    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Message logs
    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Consumer group state
    pub fn leases(&self) -> &LeaseManager {
        &self.leases
    }
}
