//! Atomic operation scope
//!
//! Every service operation mutates the ledger through a `Transaction`. Each
//! mutation records how to undo itself, and a touched consumer group is
//! snapshotted before its first change, so only the partitions an operation
//! actually touches are copied. Events are staged alongside.
//!
//! `commit` hands back the staged events. Dropping the transaction without
//! committing replays the undo log in reverse and discards the events, leaving
//! the state exactly as it was.

use crate::lease::{ConsumerGroup, GroupConfig};
use crate::state::LedgerState;
use quay_core::{
    Address, ChannelId, GroupKey, LedgerEvent, MessageId, PhysicalTime, PublisherIndex, Result,
};
use std::collections::BTreeSet;

#[derive(Debug)]
enum Undo {
    ChannelCreated(ChannelId),
    PublisherAdded {
        channel: ChannelId,
        address: Address,
        previous: Option<PublisherIndex>,
    },
    SubscriberAdded {
        channel: ChannelId,
        address: Address,
    },
    GroupCreated {
        channel: ChannelId,
        key: GroupKey,
    },
    MessageAppended {
        channel: ChannelId,
        message_id: MessageId,
    },
    GroupTouched {
        channel: ChannelId,
        before: Box<ConsumerGroup>,
    },
}

/// Mutation scope for one operation
#[derive(Debug)]
pub struct Transaction<'a> {
    state: &'a mut LedgerState,
    caller: Address,
    now: PhysicalTime,
    undo: Vec<Undo>,
    touched: BTreeSet<(ChannelId, GroupKey)>,
    staged: Vec<LedgerEvent>,
    committed: bool,
}

impl<'a> Transaction<'a> {
    /// Open a transaction for `caller` at `now`
    pub fn begin(state: &'a mut LedgerState, caller: Address, now: PhysicalTime) -> Self {
        Self {
            state,
            caller,
            now,
            undo: Vec::new(),
            touched: BTreeSet::new(),
            staged: Vec::new(),
            committed: false,
        }
    }

    /// Caller identity from the envelope
    pub fn caller(&self) -> Address {
        self.caller
    }

    /// Timestamp captured when the operation started
    pub fn now(&self) -> PhysicalTime {
        self.now
    }

    /// Read access to the state as mutated so far
    pub fn state(&self) -> &LedgerState {
        &*self.state
    }

    /// Stage an event for commit
    pub fn emit(&mut self, event: LedgerEvent) {
        self.staged.push(event);
    }

    /// Create a channel owned by the caller
    pub fn create_channel(&mut self, index: PublisherIndex, metadata: Vec<u8>) -> ChannelId {
        let id = self
            .state
            .registry
            .create_channel(self.caller, index, metadata, self.now);
        self.state.log.open_channel(id);
        self.undo.push(Undo::ChannelCreated(id));
        id
    }

    /// Register the caller as a publisher of `channel`
    pub fn add_publisher(&mut self, channel: ChannelId, index: PublisherIndex) -> Result<()> {
        let previous = self
            .state
            .registry
            .add_publisher(channel, self.caller, index)?;
        self.undo.push(Undo::PublisherAdded {
            channel,
            address: self.caller,
            previous,
        });
        Ok(())
    }

    /// Append the caller's payload to `channel`
    pub fn append_message(&mut self, channel: ChannelId, payload: Vec<u8>) -> Result<MessageId> {
        let message_id = self
            .state
            .log
            .append(channel, self.caller, payload, self.now)?;
        self.undo.push(Undo::MessageAppended {
            channel,
            message_id,
        });
        Ok(message_id)
    }

    /// Put the caller into group `key` of `channel`
    pub fn add_subscriber(&mut self, channel: ChannelId, key: GroupKey) -> Result<()> {
        if self
            .state
            .registry
            .add_subscriber(channel, self.caller, key)?
        {
            self.undo.push(Undo::SubscriberAdded {
                channel,
                address: self.caller,
            });
        }
        Ok(())
    }

    /// Create group `key` unless it already exists
    pub fn ensure_group(&mut self, channel: ChannelId, key: GroupKey, config: GroupConfig) -> bool {
        let created = self.state.leases.ensure_group(channel, key, config);
        if created {
            self.undo.push(Undo::GroupCreated { channel, key });
            self.touched.insert((channel, key));
        }
        created
    }

    /// Mutable access to a group, snapshotting it on first touch
    pub fn group_mut(&mut self, channel: ChannelId, key: &GroupKey) -> Result<&mut ConsumerGroup> {
        if !self.touched.contains(&(channel, *key)) {
            let before = self.state.leases.group_mut(channel, key)?.clone();
            self.undo.push(Undo::GroupTouched {
                channel,
                before: Box::new(before),
            });
            self.touched.insert((channel, *key));
        }
        self.state.leases.group_mut(channel, key)
    }

    /// Keep every mutation and return the staged events
    pub fn commit(mut self) -> Vec<LedgerEvent> {
        self.committed = true;
        self.undo.clear();
        std::mem::take(&mut self.staged)
    }

    fn rollback(&mut self) {
        while let Some(step) = self.undo.pop() {
            match step {
                Undo::ChannelCreated(id) => {
                    self.state.registry.remove_last_channel(id);
                    self.state.log.drop_channel(id);
                }
                Undo::PublisherAdded {
                    channel,
                    address,
                    previous,
                } => self
                    .state
                    .registry
                    .restore_publisher(channel, address, previous),
                Undo::SubscriberAdded { channel, address } => {
                    self.state.registry.remove_subscriber(channel, &address);
                }
                Undo::GroupCreated { channel, key } => {
                    self.state.leases.remove_group(channel, &key);
                }
                Undo::MessageAppended {
                    channel,
                    message_id,
                } => self.state.log.truncate_last(channel, message_id),
                Undo::GroupTouched { channel, before } => {
                    self.state.leases.restore_group(channel, *before);
                }
            }
        }
        self.staged.clear();
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_core::Credential;

    #[test]
    fn test_dropped_transaction_restores_state() {
        let mut state = LedgerState::new();
        let caller = Address::from_label("p");
        let now = PhysicalTime::from_secs(1);

        {
            let mut tx = Transaction::begin(&mut state, caller, now);
            let channel = tx.create_channel(PublisherIndex(1), b"meta".to_vec());
            tx.commit();
            assert_eq!(channel, ChannelId(0));
        }
        let before = state.clone();

        {
            let mut tx = Transaction::begin(&mut state, caller, now);
            tx.create_channel(PublisherIndex(1), Vec::new());
            tx.append_message(ChannelId(0), b"m0".to_vec()).unwrap();
            let key = GroupKey::derive(ChannelId(0), &Credential::new(b"k".to_vec(), 0));
            tx.ensure_group(
                ChannelId(0),
                key,
                GroupConfig {
                    lease_duration_secs: 2,
                    num_of_retry: 2,
                },
            );
            tx.add_subscriber(ChannelId(0), key).unwrap();
            tx.emit(LedgerEvent::ChannelCreated {
                channel_id: ChannelId(1),
                publisher: caller,
            });
        }

        assert_eq!(state, before);
    }

    #[test]
    fn test_touched_group_is_restored() {
        let mut state = LedgerState::new();
        let caller = Address::from_label("s");
        let now = PhysicalTime::from_secs(1);
        let key = GroupKey::derive(ChannelId(0), &Credential::new(b"k".to_vec(), 0));
        let config = GroupConfig {
            lease_duration_secs: 2,
            num_of_retry: 2,
        };

        {
            let mut tx = Transaction::begin(&mut state, caller, now);
            let channel = tx.create_channel(PublisherIndex(0), Vec::new());
            tx.append_message(channel, b"m0".to_vec()).unwrap();
            tx.ensure_group(channel, key, config);
            tx.commit();
        }
        let before = state.clone();

        {
            let mut tx = Transaction::begin(&mut state, caller, now);
            let mut meter = crate::lease::ScanMeter::new(8);
            tx.group_mut(ChannelId(0), &key)
                .unwrap()
                .next_delivery(caller, now, 1, 1, &mut meter, quay_core::SkipPolicy::Permanent)
                .unwrap();
        }

        assert_eq!(state, before);
    }
}
