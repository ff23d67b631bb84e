//! Ledger events
//!
//! Events are the only way external observers learn about state changes. They
//! are append-only and ordered identically to operation commit order; the
//! journal in `quay-ledger` assigns each one a sequence number.

use crate::identifiers::{Address, ChannelId, GroupKey, MessageId};
use crate::time::PhysicalTime;
use serde::{Deserialize, Serialize};

/// A state change committed by a ledger operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "PascalCase")]
pub enum LedgerEvent {
    /// A channel was created; the creator is its first publisher
    ChannelCreated {
        /// New channel id
        channel_id: ChannelId,
        /// Creator address
        publisher: Address,
    },
    /// An additional publisher joined a channel
    PublisherJoined {
        /// Channel joined
        channel_id: ChannelId,
        /// Joining address
        publisher: Address,
    },
    /// A message was appended to a channel's log
    MessagePublished {
        /// Target channel
        channel_id: ChannelId,
        /// Publishing address
        publisher: Address,
        /// Assigned message id
        message_id: MessageId,
    },
    /// An address joined a consumer group
    ConsumerJoined {
        /// Subscribed channel
        channel_id: ChannelId,
        /// Subscribing address
        subscriber: Address,
        /// Group the address belongs to
        consumer_group_id: GroupKey,
    },
    /// A message was leased (or re-delivered) to a group member
    MessagePopped {
        /// Channel of the message
        channel_id: ChannelId,
        /// Member that received it
        subscriber: Address,
        /// Delivered message
        message_id: MessageId,
        /// Group holding the lease
        consumer_group_id: GroupKey,
    },
    /// A lease holder confirmed processing
    MessageRead {
        /// Channel of the message
        channel_id: ChannelId,
        /// Confirming member
        subscriber: Address,
        /// Confirmed message
        message_id: MessageId,
        /// Group of the member
        consumer_group_id: GroupKey,
    },
    /// A message was skipped, manually or by retry exhaustion
    MessageSkipped {
        /// Channel of the message
        channel_id: ChannelId,
        /// Member whose call triggered the skip
        subscriber: Address,
        /// Skipped message
        message_id: MessageId,
        /// Group of the member
        consumer_group_id: GroupKey,
    },
}

impl LedgerEvent {
    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChannelCreated { .. } => "ChannelCreated",
            Self::PublisherJoined { .. } => "PublisherJoined",
            Self::MessagePublished { .. } => "MessagePublished",
            Self::ConsumerJoined { .. } => "ConsumerJoined",
            Self::MessagePopped { .. } => "MessagePopped",
            Self::MessageRead { .. } => "MessageRead",
            Self::MessageSkipped { .. } => "MessageSkipped",
        }
    }

    /// Channel the event belongs to
    pub fn channel_id(&self) -> ChannelId {
        match self {
            Self::ChannelCreated { channel_id, .. }
            | Self::PublisherJoined { channel_id, .. }
            | Self::MessagePublished { channel_id, .. }
            | Self::ConsumerJoined { channel_id, .. }
            | Self::MessagePopped { channel_id, .. }
            | Self::MessageRead { channel_id, .. }
            | Self::MessageSkipped { channel_id, .. } => *channel_id,
        }
    }

    /// Message the event refers to, if any
    pub fn message_id(&self) -> Option<MessageId> {
        match self {
            Self::MessagePublished { message_id, .. }
            | Self::MessagePopped { message_id, .. }
            | Self::MessageRead { message_id, .. }
            | Self::MessageSkipped { message_id, .. } => Some(*message_id),
            _ => None,
        }
    }
}

/// An event together with its journal position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the journal, starting at 0
    pub seq: u64,
    /// Timestamp of the operation that emitted it
    pub at: PhysicalTime,
    /// The event itself
    #[serde(flatten)]
    pub event: LedgerEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = LedgerEvent::MessagePublished {
            channel_id: ChannelId(0),
            publisher: Address::from_bytes([0xab; 20]),
            message_id: MessageId(4),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "MessagePublished");
        assert_eq!(json["channel_id"], 0);
        assert_eq!(json["message_id"], 4);
        assert_eq!(event.name(), "MessagePublished");
        assert_eq!(event.message_id(), Some(MessageId(4)));
    }
}
