//! Channel service - the public ledger surface
//!
//! Composes the identity registry, the message log and the lease manager,
//! enforcing authorization and atomicity. Each state-changing method:
//!
//! 1. reads the current time from the clock effect once,
//! 2. runs inside a [`Transaction`], so a failure leaves no trace,
//! 3. appends the staged events to the journal on success and returns them in
//!    a [`Receipt`].
//!
//! Methods take `&mut self`, which is what totally orders operations; no
//! further locking is needed.

use crate::journal::EventJournal;
use crate::lease::{Delivery, GroupConfig, GroupView, ScanMeter};
use crate::log::Message;
use crate::registry::ChannelRecord;
use crate::state::LedgerState;
use crate::transaction::Transaction;
use quay_core::{
    Address, ChannelId, Credential, EventRecord, GroupKey, LedgerConfig, LedgerEvent, MessageId,
    PhysicalTimeEffects, PublisherIndex, QuayError, Result,
};
use serde::{Deserialize, Serialize};

/// Output of a committed operation plus the events it emitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt<T> {
    /// Operation result
    pub output: T,
    /// Journal records committed by the operation, in order
    pub events: Vec<EventRecord>,
}

impl<T> Receipt<T> {
    /// Names of the emitted events, in order
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.iter().map(|r| r.event.name()).collect()
    }
}

/// Exported ledger: state plus journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Registry, logs and groups
    pub state: LedgerState,
    /// Every committed event
    pub journal: EventJournal,
}

/// Multi-tenant channel ledger
///
/// # Example
///
/// ```ignore
/// let mut service = ChannelService::new(SystemTimeHandler::new(), LedgerConfig::default());
/// let channel = service.create_channel(publisher, PublisherIndex(10), b"meta".to_vec()).await?.output;
/// service.publish(publisher, channel, b"hello".to_vec()).await?;
/// service.subscribe(subscriber, channel, credential, 30, 3).await?;
/// let delivery = service.get_next(subscriber, channel, 16).await?.output;
/// service.confirm(subscriber, channel, delivery.message_id).await?;
/// ```
#[derive(Debug)]
pub struct ChannelService<C> {
    state: LedgerState,
    journal: EventJournal,
    clock: C,
    config: LedgerConfig,
}

impl<C: PhysicalTimeEffects> ChannelService<C> {
    /// Empty ledger driven by `clock`
    pub fn new(clock: C, config: LedgerConfig) -> Self {
        Self {
            state: LedgerState::new(),
            journal: EventJournal::new(),
            clock,
            config,
        }
    }

    /// Resume a previously exported ledger
    pub fn from_snapshot(snapshot: LedgerSnapshot, clock: C, config: LedgerConfig) -> Self {
        Self {
            state: snapshot.state,
            journal: snapshot.journal,
            clock,
            config,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    async fn execute<T, F>(&mut self, operation: &'static str, caller: Address, op: F) -> Result<Receipt<T>>
    where
        F: FnOnce(&mut Transaction<'_>, &LedgerConfig) -> Result<T>,
    {
        let now = self.clock.physical_time().await?;
        let mut tx = Transaction::begin(&mut self.state, caller, now);

        match op(&mut tx, &self.config) {
            Ok(output) => {
                let events = tx.commit();
                let events = self.journal.append(now, events);
                tracing::debug!(
                    operation,
                    caller = %caller,
                    events = events.len(),
                    "operation committed"
                );
                Ok(Receipt { output, events })
            }
            Err(err) => {
                drop(tx);
                match err {
                    QuayError::BudgetExceeded { .. } | QuayError::Internal { .. } => {
                        tracing::warn!(operation, caller = %caller, error = %err, "operation rolled back");
                    }
                    _ => {
                        tracing::debug!(operation, caller = %caller, error = %err, "operation rejected");
                    }
                }
                Err(err)
            }
        }
    }

    /// Create a channel; the caller becomes its first publisher
    pub async fn create_channel(
        &mut self,
        caller: Address,
        index: PublisherIndex,
        metadata: Vec<u8>,
    ) -> Result<Receipt<ChannelId>> {
        self.execute("create_channel", caller, |tx, _| {
            let channel_id = tx.create_channel(index, metadata);
            tx.emit(LedgerEvent::ChannelCreated {
                channel_id,
                publisher: tx.caller(),
            });
            Ok(channel_id)
        })
        .await
    }

    /// Join an existing channel as an additional publisher
    pub async fn join(
        &mut self,
        caller: Address,
        channel_id: ChannelId,
        index: PublisherIndex,
    ) -> Result<Receipt<()>> {
        self.execute("join", caller, |tx, _| {
            tx.add_publisher(channel_id, index)?;
            tx.emit(LedgerEvent::PublisherJoined {
                channel_id,
                publisher: tx.caller(),
            });
            Ok(())
        })
        .await
    }

    /// Append a message; only publishers of the channel may do this
    pub async fn publish(
        &mut self,
        caller: Address,
        channel_id: ChannelId,
        payload: Vec<u8>,
    ) -> Result<Receipt<MessageId>> {
        self.execute("publish", caller, |tx, _| {
            tx.state()
                .registry()
                .require_publisher(channel_id, &tx.caller())?;
            let message_id = tx.append_message(channel_id, payload)?;
            tracing::debug!(channel_id = %channel_id, message_id = %message_id, "message appended");
            tx.emit(LedgerEvent::MessagePublished {
                channel_id,
                publisher: tx.caller(),
                message_id,
            });
            Ok(message_id)
        })
        .await
    }

    /// Join the consumer group identified by `credential`, creating it with
    /// the given lease settings if it does not exist yet
    pub async fn subscribe(
        &mut self,
        caller: Address,
        channel_id: ChannelId,
        credential: Credential,
        lease_duration_secs: u64,
        num_of_retry: u32,
    ) -> Result<Receipt<GroupKey>> {
        self.execute("subscribe", caller, |tx, config| {
            let registry = tx.state().registry();
            registry.ensure_channel(channel_id)?;
            let key = registry.group_key_for(channel_id, &credential);

            if tx.state().leases().group(channel_id, &key).is_none() {
                validate_lease_duration(lease_duration_secs, config)?;
                tx.ensure_group(
                    channel_id,
                    key,
                    GroupConfig {
                        lease_duration_secs,
                        num_of_retry,
                    },
                );
                tracing::debug!(
                    channel_id = %channel_id,
                    group = %key.short(),
                    lease_duration_secs,
                    num_of_retry,
                    "consumer group created"
                );
            }
            tx.add_subscriber(channel_id, key)?;
            tx.emit(LedgerEvent::ConsumerJoined {
                channel_id,
                subscriber: tx.caller(),
                consumer_group_id: key,
            });
            Ok(key)
        })
        .await
    }

    /// Lease the next message for the caller's group, examining at most
    /// `max_scan` log entries
    pub async fn get_next(
        &mut self,
        caller: Address,
        channel_id: ChannelId,
        max_scan: u64,
    ) -> Result<Receipt<Delivery>> {
        self.execute("get_next", caller, |tx, config| {
            let key = tx
                .state()
                .registry()
                .require_subscriber(channel_id, &tx.caller())?;
            let log_len = tx.state().log().len(channel_id);
            let (caller, now) = (tx.caller(), tx.now());
            let mut meter = ScanMeter::new(config.max_scan_cap);

            let delivery = tx.group_mut(channel_id, &key)?.next_delivery(
                caller,
                now,
                log_len,
                max_scan,
                &mut meter,
                config.skip_policy,
            )?;

            if let Some(skipped) = delivery.skipped {
                tracing::debug!(
                    channel_id = %channel_id,
                    message_id = %skipped,
                    group = %key.short(),
                    "retries exhausted, message skipped"
                );
                tx.emit(LedgerEvent::MessageSkipped {
                    channel_id,
                    subscriber: caller,
                    message_id: skipped,
                    consumer_group_id: key,
                });
            }
            tracing::debug!(
                channel_id = %channel_id,
                message_id = %delivery.message_id,
                group = %key.short(),
                redelivered = delivery.redelivered,
                scanned = meter.used(),
                "message popped"
            );
            tx.emit(LedgerEvent::MessagePopped {
                channel_id,
                subscriber: caller,
                message_id: delivery.message_id,
                consumer_group_id: key,
            });
            Ok(delivery)
        })
        .await
    }

    /// Acknowledge the message the caller holds the lease on
    pub async fn confirm(
        &mut self,
        caller: Address,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<Receipt<()>> {
        self.execute("confirm", caller, |tx, config| {
            let key = tx
                .state()
                .registry()
                .require_subscriber(channel_id, &tx.caller())?;
            let caller = tx.caller();
            let mut meter = ScanMeter::new(config.max_scan_cap);
            tx.group_mut(channel_id, &key)?
                .confirm(caller, message_id, &mut meter)?;
            tx.emit(LedgerEvent::MessageRead {
                channel_id,
                subscriber: caller,
                message_id,
                consumer_group_id: key,
            });
            Ok(())
        })
        .await
    }

    /// Give up on the message the caller holds the lease on
    pub async fn skip(
        &mut self,
        caller: Address,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<Receipt<()>> {
        self.execute("skip", caller, |tx, config| {
            let key = tx
                .state()
                .registry()
                .require_subscriber(channel_id, &tx.caller())?;
            let (caller, now) = (tx.caller(), tx.now());
            let mut meter = ScanMeter::new(config.max_scan_cap);
            tx.group_mut(channel_id, &key)?.skip(
                caller,
                message_id,
                now,
                config.skip_policy,
                &mut meter,
            )?;
            tx.emit(LedgerEvent::MessageSkipped {
                channel_id,
                subscriber: caller,
                message_id,
                consumer_group_id: key,
            });
            Ok(())
        })
        .await
    }
}

impl<C> ChannelService<C> {
    /// Metadata stored when the channel was created
    pub fn channel_metadata(&self, channel_id: ChannelId) -> Result<&[u8]> {
        Ok(self.state.registry().channel(channel_id)?.metadata.as_slice())
    }

    /// Full channel record
    pub fn channel(&self, channel_id: ChannelId) -> Result<&ChannelRecord> {
        self.state.registry().channel(channel_id)
    }

    /// Number of channels ever created
    pub fn channel_count(&self) -> u64 {
        self.state.registry().channel_count()
    }

    /// Whether `address` may publish to the channel
    pub fn is_publisher(&self, channel_id: ChannelId, address: &Address) -> bool {
        self.state.registry().is_publisher(channel_id, address)
    }

    /// Whether `address` belongs to a consumer group of the channel
    pub fn is_subscriber(&self, channel_id: ChannelId, address: &Address) -> bool {
        self.state.registry().is_subscriber(channel_id, address)
    }

    /// Consumer group of `address` on the channel
    pub fn group_of(&self, channel_id: ChannelId, address: &Address) -> Option<GroupKey> {
        self.state.registry().group_of(channel_id, address)
    }

    /// Number of messages published to the channel
    pub fn message_count(&self, channel_id: ChannelId) -> Result<u64> {
        self.state.registry().ensure_channel(channel_id)?;
        Ok(self.state.log().len(channel_id))
    }

    /// Read a message; publishers and subscribers of the channel only
    pub fn get_message(
        &self,
        caller: &Address,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<&Message> {
        let registry = self.state.registry();
        registry.ensure_channel(channel_id)?;
        if !registry.is_publisher(channel_id, caller) && !registry.is_subscriber(channel_id, caller)
        {
            return Err(QuayError::unauthorized(
                "Only publishers and subscribers may read channel messages.",
            ));
        }
        self.state
            .log()
            .get(channel_id, message_id)
            .ok_or_else(|| QuayError::not_found(format!("{message_id} not found in {channel_id}")))
    }

    /// Read-only view of one consumer group
    pub fn group_view(&self, channel_id: ChannelId, key: &GroupKey) -> Result<GroupView> {
        self.state.registry().ensure_channel(channel_id)?;
        let group = self
            .state
            .leases()
            .group(channel_id, key)
            .ok_or_else(|| QuayError::not_found(format!("Consumer group {key} not found")))?;
        Ok(GroupView {
            channel_id,
            key: *key,
            config: group.config(),
            read_cursor: group.read_cursor(),
            lease: group.lease(),
            retry_count: group.retry_count(),
            resolved_count: group.resolved_count(),
            member_count: self.state.registry().member_count(channel_id, key),
        })
    }

    /// Every committed event
    pub fn events(&self) -> &[EventRecord] {
        self.journal.records()
    }

    /// Committed events with `seq >= from`
    pub fn events_since(&self, from: u64) -> &[EventRecord] {
        self.journal.since(from)
    }

    /// Current ledger state
    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// Export state and journal
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            state: self.state.clone(),
            journal: self.journal.clone(),
        }
    }

    /// Export state and journal as pretty JSON
    pub fn snapshot_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| QuayError::serialization(format!("Failed to serialize ledger: {e}")))
    }
}

fn validate_lease_duration(lease_duration_secs: u64, config: &LedgerConfig) -> Result<()> {
    if lease_duration_secs == 0 {
        return Err(QuayError::invalid("lease duration must be greater than zero"));
    }
    if lease_duration_secs > config.max_lease_duration_secs {
        return Err(QuayError::invalid(format!(
            "lease duration {lease_duration_secs}s exceeds the {}s maximum",
            config.max_lease_duration_secs
        )));
    }
    Ok(())
}
