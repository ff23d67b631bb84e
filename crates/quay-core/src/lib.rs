//! Core types for the Quay channel ledger
//!
//! This crate holds everything the ledger and its tooling share:
//!
//! - **Identifiers**: channel/message ordinals, caller addresses, group keys
//! - **Errors**: the single `QuayError` taxonomy
//! - **Events**: the append-only `LedgerEvent` stream
//! - **Effects**: the physical clock interface
//! - **Config**: `LedgerConfig` with TOML and environment loading

pub mod config;
pub mod effects;
pub mod errors;
pub mod events;
pub mod hash;
pub mod identifiers;
pub mod time;

pub use config::{LedgerConfig, SkipPolicy};
pub use effects::{PhysicalTimeEffects, SystemTimeHandler, TimeError};
pub use errors::{QuayError, Result};
pub use events::{EventRecord, LedgerEvent};
pub use identifiers::{Address, ChannelId, Credential, GroupKey, MessageId, PublisherIndex};
pub use time::PhysicalTime;
