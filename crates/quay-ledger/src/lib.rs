//! Quay channel ledger
//!
//! A multi-tenant publish/subscribe ledger. Publishers append opaque payloads
//! to per-channel logs; subscribers join consumer groups keyed by a credential
//! digest, and each group consumes the log with at-least-once delivery under
//! time-bounded leases.
//!
//! # Layout
//!
//! - [`registry`]: channels and publisher/subscriber membership
//! - [`log`]: append-only per-channel message logs
//! - [`lease`]: per-group cursor, lease and retry state machine
//! - [`journal`]: committed event stream
//! - [`transaction`]: undo-logged mutation scope giving per-operation atomicity
//! - [`service`]: the operation surface, [`ChannelService`]
//!
//! Nothing here runs on its own schedule. Expiry is decided by comparing the
//! stored deadline with the timestamp the service reads from its clock effect
//! at the start of each operation.

pub mod journal;
pub mod lease;
pub mod log;
pub mod registry;
pub mod service;
pub mod state;
pub mod transaction;

pub use journal::EventJournal;
pub use lease::{
    ConsumerGroup, Delivery, GroupConfig, GroupView, Lease, LeaseManager, ScanMeter,
    ALL_MESSAGES_READ, NOT_LEASE_HOLDER, NO_ACTIVE_LEASE,
};
pub use log::{Message, MessageLog};
pub use registry::{
    ChannelMembers, ChannelRecord, IdentityRegistry, CHANNEL_NOT_FOUND, ONLY_PUBLISHERS,
    ONLY_SUBSCRIBERS,
};
pub use service::{ChannelService, LedgerSnapshot, Receipt};
pub use state::LedgerState;
pub use transaction::Transaction;
