//! Append-only message log
//!
//! One ordered vector per channel. A message's id is its position, so ids are
//! gapless and strictly increasing, and nothing is ever rewritten.

use quay_core::{Address, ChannelId, MessageId, PhysicalTime, QuayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A published message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Position in the channel log
    pub id: MessageId,
    /// Publishing address
    pub publisher: Address,
    /// Opaque payload
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
    /// Publish time
    pub published_at: PhysicalTime,
}

/// Per-channel append-only logs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLog {
    channels: BTreeMap<ChannelId, Vec<Message>>,
}

impl MessageLog {
    /// Create an empty log set
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an empty log for a new channel
    pub fn open_channel(&mut self, channel: ChannelId) {
        self.channels.entry(channel).or_default();
    }

    pub(crate) fn drop_channel(&mut self, channel: ChannelId) {
        self.channels.remove(&channel);
    }

    /// Append a message; its id is the channel's message count before the append
    pub fn append(
        &mut self,
        channel: ChannelId,
        publisher: Address,
        payload: Vec<u8>,
        now: PhysicalTime,
    ) -> Result<MessageId> {
        let entries = self
            .channels
            .get_mut(&channel)
            .ok_or_else(|| QuayError::not_found(format!("No log for {channel}")))?;
        let id = MessageId(entries.len() as u64);
        entries.push(Message {
            id,
            publisher,
            payload,
            published_at: now,
        });
        Ok(id)
    }

    /// Remove the most recent append
    pub(crate) fn truncate_last(&mut self, channel: ChannelId, id: MessageId) {
        if let Some(entries) = self.channels.get_mut(&channel) {
            if entries.last().is_some_and(|m| m.id == id) {
                entries.pop();
            }
        }
    }

    /// Number of messages in a channel (0 for unknown channels)
    pub fn len(&self, channel: ChannelId) -> u64 {
        self.channels
            .get(&channel)
            .map(|entries| entries.len() as u64)
            .unwrap_or(0)
    }

    /// True when the channel holds no messages
    pub fn is_empty(&self, channel: ChannelId) -> bool {
        self.len(channel) == 0
    }

    /// Fetch one message
    pub fn get(&self, channel: ChannelId, id: MessageId) -> Option<&Message> {
        let index = usize::try_from(id.value()).ok()?;
        self.channels.get(&channel)?.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_gapless_per_channel() {
        let mut log = MessageLog::new();
        let publisher = Address::from_label("p");
        let now = PhysicalTime::from_secs(5);
        log.open_channel(ChannelId(0));
        log.open_channel(ChannelId(1));

        assert_eq!(
            log.append(ChannelId(0), publisher, b"a".to_vec(), now).unwrap(),
            MessageId(0)
        );
        assert_eq!(
            log.append(ChannelId(0), publisher, b"b".to_vec(), now).unwrap(),
            MessageId(1)
        );
        assert_eq!(
            log.append(ChannelId(1), publisher, b"c".to_vec(), now).unwrap(),
            MessageId(0)
        );
        assert_eq!(log.len(ChannelId(0)), 2);
        assert_eq!(log.get(ChannelId(0), MessageId(1)).unwrap().payload, b"b");
        assert!(log.get(ChannelId(0), MessageId(2)).is_none());
    }

    #[test]
    fn test_append_to_unopened_channel_fails() {
        let mut log = MessageLog::new();
        let result = log.append(
            ChannelId(9),
            Address::from_label("p"),
            Vec::new(),
            PhysicalTime::default(),
        );
        assert!(matches!(result, Err(QuayError::NotFound { .. })));
    }

    #[test]
    fn test_truncate_only_removes_matching_tail() {
        let mut log = MessageLog::new();
        let publisher = Address::from_label("p");
        log.open_channel(ChannelId(0));
        log.append(ChannelId(0), publisher, Vec::new(), PhysicalTime::default())
            .unwrap();
        log.truncate_last(ChannelId(0), MessageId(5));
        assert_eq!(log.len(ChannelId(0)), 1);
        log.truncate_last(ChannelId(0), MessageId(0));
        assert!(log.is_empty(ChannelId(0)));
    }
}
