//! Identity registry
//!
//! Tracks channels and, per channel, which addresses are publishers and which
//! consumer group each subscriber belongs to. Membership is unrestricted:
//! anyone may join as a publisher or subscribe to any group.

use quay_core::{
    Address, ChannelId, Credential, GroupKey, PhysicalTime, PublisherIndex, QuayError, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Error message for operations on an unknown channel
pub const CHANNEL_NOT_FOUND: &str = "Channel does not exist.";
/// Error message for publish attempts by non-publishers
pub const ONLY_PUBLISHERS: &str = "Only publishers are allowed to make this transaction.";
/// Error message for consumer operations by non-subscribers
pub const ONLY_SUBSCRIBERS: &str = "Only subscriber is allowed to make this transaction.";

/// Immutable channel record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Channel id
    pub id: ChannelId,
    /// Opaque metadata, set once at creation
    #[serde(with = "serde_bytes")]
    pub metadata: Vec<u8>,
    /// Address that created the channel
    pub creator: Address,
    /// Creation time
    pub created_at: PhysicalTime,
}

/// Membership tables of one channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMembers {
    /// Publisher address -> opaque ordinal supplied on join
    pub publishers: BTreeMap<Address, PublisherIndex>,
    /// Subscriber address -> consumer group
    pub subscribers: BTreeMap<Address, GroupKey>,
}

/// Registry of channels and their publisher/subscriber membership
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRegistry {
    next_channel_id: ChannelId,
    channels: BTreeMap<ChannelId, ChannelRecord>,
    members: BTreeMap<ChannelId, ChannelMembers>,
}

impl IdentityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new channel with `creator` as its first publisher.
    ///
    /// Ids are handed out sequentially and never reused.
    pub fn create_channel(
        &mut self,
        creator: Address,
        index: PublisherIndex,
        metadata: Vec<u8>,
        now: PhysicalTime,
    ) -> ChannelId {
        let id = self.next_channel_id;
        self.next_channel_id = id.next();
        self.channels.insert(
            id,
            ChannelRecord {
                id,
                metadata,
                creator,
                created_at: now,
            },
        );
        self.members
            .entry(id)
            .or_default()
            .publishers
            .insert(creator, index);
        id
    }

    /// Undo the most recent `create_channel`
    pub(crate) fn remove_last_channel(&mut self, id: ChannelId) {
        if self.next_channel_id == id.next() {
            self.next_channel_id = id;
        }
        self.channels.remove(&id);
        self.members.remove(&id);
    }

    /// Number of channels ever created
    pub fn channel_count(&self) -> u64 {
        self.next_channel_id.value()
    }

    /// Look up a channel
    pub fn channel(&self, id: ChannelId) -> Result<&ChannelRecord> {
        self.channels
            .get(&id)
            .ok_or_else(|| QuayError::not_found(CHANNEL_NOT_FOUND))
    }

    /// Fail with `NotFound` unless the channel exists
    pub fn ensure_channel(&self, id: ChannelId) -> Result<()> {
        self.channel(id).map(|_| ())
    }

    /// Register `address` as a publisher, returning the previous ordinal if it
    /// was already one
    pub fn add_publisher(
        &mut self,
        id: ChannelId,
        address: Address,
        index: PublisherIndex,
    ) -> Result<Option<PublisherIndex>> {
        self.ensure_channel(id)?;
        Ok(self
            .members
            .entry(id)
            .or_default()
            .publishers
            .insert(address, index))
    }

    pub(crate) fn restore_publisher(
        &mut self,
        id: ChannelId,
        address: Address,
        previous: Option<PublisherIndex>,
    ) {
        if let Some(members) = self.members.get_mut(&id) {
            match previous {
                Some(index) => members.publishers.insert(address, index),
                None => members.publishers.remove(&address),
            };
        }
    }

    /// Whether `address` may publish to the channel
    pub fn is_publisher(&self, id: ChannelId, address: &Address) -> bool {
        self.members
            .get(&id)
            .is_some_and(|m| m.publishers.contains_key(address))
    }

    /// Fail unless the channel exists and `address` publishes to it
    pub fn require_publisher(&self, id: ChannelId, address: &Address) -> Result<()> {
        self.ensure_channel(id)?;
        if self.is_publisher(id, address) {
            Ok(())
        } else {
            Err(QuayError::unauthorized(ONLY_PUBLISHERS))
        }
    }

    /// Group key a credential maps to on this channel
    pub fn group_key_for(&self, id: ChannelId, credential: &Credential) -> GroupKey {
        GroupKey::derive(id, credential)
    }

    /// Put `address` into consumer group `group`.
    ///
    /// Subscribing again with the same group is a no-op; moving to a different
    /// group of the same channel is rejected.
    pub fn add_subscriber(&mut self, id: ChannelId, address: Address, group: GroupKey) -> Result<bool> {
        self.ensure_channel(id)?;
        let members = self.members.entry(id).or_default();
        match members.subscribers.get(&address) {
            Some(existing) if *existing == group => Ok(false),
            Some(existing) => Err(QuayError::invalid_state(format!(
                "Subscriber already belongs to consumer group {existing}."
            ))),
            None => {
                members.subscribers.insert(address, group);
                Ok(true)
            }
        }
    }

    pub(crate) fn remove_subscriber(&mut self, id: ChannelId, address: &Address) {
        if let Some(members) = self.members.get_mut(&id) {
            members.subscribers.remove(address);
        }
    }

    /// Consumer group of `address`, if it subscribed
    pub fn group_of(&self, id: ChannelId, address: &Address) -> Option<GroupKey> {
        self.members
            .get(&id)
            .and_then(|m| m.subscribers.get(address))
            .copied()
    }

    /// Whether `address` belongs to any consumer group of the channel
    pub fn is_subscriber(&self, id: ChannelId, address: &Address) -> bool {
        self.group_of(id, address).is_some()
    }

    /// Fail unless the channel exists and `address` subscribed to it
    pub fn require_subscriber(&self, id: ChannelId, address: &Address) -> Result<GroupKey> {
        self.ensure_channel(id)?;
        self.group_of(id, address)
            .ok_or_else(|| QuayError::unauthorized(ONLY_SUBSCRIBERS))
    }

    /// Number of addresses in a consumer group
    pub fn member_count(&self, id: ChannelId, group: &GroupKey) -> usize {
        self.members
            .get(&id)
            .map(|m| m.subscribers.values().filter(|g| *g == group).count())
            .unwrap_or(0)
    }
}
