//! Consumer-group lease state machine
//!
//! Each (channel, group) pair owns a read cursor, a single optional lease, a
//! retry counter and the set of ids the group has finished with. Per message
//! the group moves through:
//!
//! ```text
//! Unseen -> Leased(holder, expires_at) -> Confirmed
//!                 |                    -> Skipped
//!                 +-> Leased(new holder)   (lazily, once expired)
//! ```
//!
//! `Confirmed` and `Skipped` are terminal for the group only; every other
//! group of the channel still sees the message.
//!
//! Expiry is never scheduled. A lease is expired when the timestamp of the
//! call inspecting it has reached `expires_at`.

use quay_core::{
    Address, ChannelId, GroupKey, MessageId, PhysicalTime, QuayError, Result, SkipPolicy,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Error message when the scan window holds nothing deliverable
pub const ALL_MESSAGES_READ: &str = "All messages are read for the moment.";
/// Error message for confirm/skip by someone other than the lease holder
pub const NOT_LEASE_HOLDER: &str = "Subscriber not allowed to confirm this message.";
/// Error message for confirm/skip while the group holds no lease
pub const NO_ACTIVE_LEASE: &str = "No message is currently leased to this consumer group.";

/// Meter charged once per examined log entry.
///
/// The ceiling stands in for the host's per-operation cost cap: exceeding it
/// aborts the whole operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanMeter {
    ceiling: u64,
    used: u64,
}

impl ScanMeter {
    /// Meter with the given hard ceiling
    pub fn new(ceiling: u64) -> Self {
        Self { ceiling, used: 0 }
    }

    /// Charge `units`, failing once the ceiling would be passed
    pub fn charge(&mut self, units: u64) -> Result<()> {
        let next = self.used.saturating_add(units);
        if next > self.ceiling {
            return Err(QuayError::budget_exceeded(format!(
                "scan ceiling of {} entries reached",
                self.ceiling
            )));
        }
        self.used = next;
        Ok(())
    }

    /// Units charged so far
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Units left before the ceiling
    pub fn remaining(&self) -> u64 {
        self.ceiling - self.used
    }
}

/// Lease configuration, fixed when the group is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Visibility timeout of a lease
    pub lease_duration_secs: u64,
    /// Maximum deliveries of one message under a single lease
    pub num_of_retry: u32,
}

/// Exclusive claim by one member on one message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Leased message
    pub message_id: MessageId,
    /// Member that may confirm or skip it
    pub holder: Address,
    /// First instant at which the lease counts as expired
    pub expires_at: PhysicalTime,
}

impl Lease {
    /// Whether the lease is still live at `now`
    pub fn is_live(&self, now: PhysicalTime) -> bool {
        !now.has_reached(self.expires_at)
    }
}

/// Result of a successful `next_delivery`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Message handed to the caller
    pub message_id: MessageId,
    /// Message given up on because its retries ran out, if any
    pub skipped: Option<MessageId>,
    /// True when this is a repeat delivery under an existing lease
    pub redelivered: bool,
}

/// Delivery state of one consumer group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerGroup {
    key: GroupKey,
    config: GroupConfig,
    read_cursor: MessageId,
    /// Resolved ids at or above the cursor; everything below is resolved too
    resolved: BTreeSet<MessageId>,
    /// Skipped ids parked until the given time (deferred skip policy only)
    deferred: BTreeMap<MessageId, PhysicalTime>,
    lease: Option<Lease>,
    retry_count: u32,
}

impl ConsumerGroup {
    /// Fresh group with its cursor at the start of the log
    pub fn new(key: GroupKey, config: GroupConfig) -> Self {
        Self {
            key,
            config,
            read_cursor: MessageId(0),
            resolved: BTreeSet::new(),
            deferred: BTreeMap::new(),
            lease: None,
            retry_count: 0,
        }
    }

    /// Group key
    pub fn key(&self) -> GroupKey {
        self.key
    }

    /// Fixed configuration
    pub fn config(&self) -> GroupConfig {
        self.config
    }

    /// Next unexamined message id
    pub fn read_cursor(&self) -> MessageId {
        self.read_cursor
    }

    /// Current lease, live or expired
    pub fn lease(&self) -> Option<Lease> {
        self.lease
    }

    /// Repeat deliveries under the current lease
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Whether the group is permanently done with `id`
    pub fn is_resolved(&self, id: MessageId) -> bool {
        id < self.read_cursor || self.resolved.contains(&id)
    }

    /// Number of resolved ids
    pub fn resolved_count(&self) -> u64 {
        self.read_cursor.value() + self.resolved.len() as u64
    }

    /// Ids currently parked by a deferred skip
    pub fn deferred(&self) -> impl Iterator<Item = (MessageId, PhysicalTime)> + '_ {
        self.deferred.iter().map(|(id, until)| (*id, *until))
    }

    fn is_eligible(&self, id: MessageId, now: PhysicalTime) -> bool {
        !self.is_resolved(id)
            && self
                .deferred
                .get(&id)
                .map_or(true, |until| now.has_reached(*until))
    }

    /// Hand the caller a message.
    ///
    /// A live lease is redelivered until its deliveries reach `num_of_retry`;
    /// the call after that skips it and leases the next eligible id instead.
    /// Without a live lease the log is scanned from the cursor, examining at
    /// most `max_scan` entries, each charged to `meter`.
    pub fn next_delivery(
        &mut self,
        caller: Address,
        now: PhysicalTime,
        log_len: u64,
        max_scan: u64,
        meter: &mut ScanMeter,
        policy: SkipPolicy,
    ) -> Result<Delivery> {
        let mut skipped = None;

        if let Some(lease) = self.lease.filter(|lease| lease.is_live(now)) {
            if self.retry_count.saturating_add(1) < self.config.num_of_retry {
                self.retry_count += 1;
                return Ok(Delivery {
                    message_id: lease.message_id,
                    skipped: None,
                    redelivered: true,
                });
            }
            self.lease = None;
            self.settle_skip(lease.message_id, now, policy);
            skipped = Some(lease.message_id);
        }

        let message_id = self
            .scan(now, log_len, max_scan, meter)?
            .ok_or_else(|| QuayError::exhausted_scan(ALL_MESSAGES_READ))?;

        self.deferred.remove(&message_id);
        self.lease = Some(Lease {
            message_id,
            holder: caller,
            expires_at: now.plus_secs(self.config.lease_duration_secs),
        });
        self.retry_count = 0;

        Ok(Delivery {
            message_id,
            skipped,
            redelivered: false,
        })
    }

    /// Walk forward from the cursor for the first eligible id, folding the
    /// resolved prefix into the cursor on the way.
    fn scan(
        &mut self,
        now: PhysicalTime,
        log_len: u64,
        max_scan: u64,
        meter: &mut ScanMeter,
    ) -> Result<Option<MessageId>> {
        let mut id = self.read_cursor;
        let mut examined = 0u64;

        while examined < max_scan && id.value() < log_len {
            meter.charge(1)?;
            examined += 1;

            if self.is_eligible(id, now) {
                return Ok(Some(id));
            }
            if id == self.read_cursor && self.resolved.remove(&id) {
                self.read_cursor = id.next();
            }
            id = id.next();
        }
        Ok(None)
    }

    /// Confirm the leased message; only the lease holder may do this
    pub fn confirm(
        &mut self,
        caller: Address,
        message_id: MessageId,
        meter: &mut ScanMeter,
    ) -> Result<()> {
        self.release(caller, message_id)?;
        self.resolve(message_id);
        self.advance_cursor(meter);
        Ok(())
    }

    /// Skip the leased message; only the lease holder may do this
    pub fn skip(
        &mut self,
        caller: Address,
        message_id: MessageId,
        now: PhysicalTime,
        policy: SkipPolicy,
        meter: &mut ScanMeter,
    ) -> Result<()> {
        self.release(caller, message_id)?;
        self.settle_skip(message_id, now, policy);
        self.advance_cursor(meter);
        Ok(())
    }

    /// Drop the lease after checking the caller holds it for `message_id`.
    ///
    /// An expired lease that nobody re-leased still belongs to its holder.
    fn release(&mut self, caller: Address, message_id: MessageId) -> Result<()> {
        let lease = self
            .lease
            .ok_or_else(|| QuayError::invalid_state(NO_ACTIVE_LEASE))?;
        if lease.holder != caller || lease.message_id != message_id {
            return Err(QuayError::unauthorized(NOT_LEASE_HOLDER));
        }
        self.lease = None;
        Ok(())
    }

    fn settle_skip(&mut self, message_id: MessageId, now: PhysicalTime, policy: SkipPolicy) {
        match policy {
            SkipPolicy::Permanent => self.resolve(message_id),
            SkipPolicy::Deferred => {
                let until = now.plus_secs(self.config.lease_duration_secs);
                self.deferred.insert(message_id, until);
            }
        }
    }

    fn resolve(&mut self, message_id: MessageId) {
        self.deferred.remove(&message_id);
        if message_id >= self.read_cursor {
            self.resolved.insert(message_id);
        }
    }

    /// Fold the contiguous resolved prefix into the cursor, one metered step
    /// per id. Whatever the meter does not cover is folded by later scans.
    fn advance_cursor(&mut self, meter: &mut ScanMeter) {
        while self.resolved.contains(&self.read_cursor) && meter.remaining() > 0 {
            if meter.charge(1).is_err() {
                break;
            }
            self.resolved.remove(&self.read_cursor);
            self.read_cursor = self.read_cursor.next();
        }
    }
}

/// Read-only view of a group for queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupView {
    /// Channel of the group
    pub channel_id: ChannelId,
    /// Group key
    pub key: GroupKey,
    /// Fixed configuration
    pub config: GroupConfig,
    /// Next unexamined message id
    pub read_cursor: MessageId,
    /// Current lease, live or expired
    pub lease: Option<Lease>,
    /// Repeat deliveries under the current lease
    pub retry_count: u32,
    /// Number of resolved ids
    pub resolved_count: u64,
    /// Number of member addresses
    pub member_count: usize,
}

/// All consumer groups, partitioned by channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseManager {
    groups: BTreeMap<ChannelId, BTreeMap<GroupKey, ConsumerGroup>>,
}

impl LeaseManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the group if it does not exist yet; an existing group keeps its
    /// original configuration. Returns true when a group was created.
    pub fn ensure_group(&mut self, channel: ChannelId, key: GroupKey, config: GroupConfig) -> bool {
        let groups = self.groups.entry(channel).or_default();
        if groups.contains_key(&key) {
            return false;
        }
        groups.insert(key, ConsumerGroup::new(key, config));
        true
    }

    /// Look up a group
    pub fn group(&self, channel: ChannelId, key: &GroupKey) -> Option<&ConsumerGroup> {
        self.groups.get(&channel)?.get(key)
    }

    /// Mutable group lookup
    pub fn group_mut(&mut self, channel: ChannelId, key: &GroupKey) -> Result<&mut ConsumerGroup> {
        self.groups
            .get_mut(&channel)
            .and_then(|groups| groups.get_mut(key))
            .ok_or_else(|| QuayError::not_found(format!("Consumer group {key} not found")))
    }

    /// Put a group back exactly as it was
    pub(crate) fn restore_group(&mut self, channel: ChannelId, group: ConsumerGroup) {
        self.groups
            .entry(channel)
            .or_default()
            .insert(group.key(), group);
    }

    pub(crate) fn remove_group(&mut self, channel: ChannelId, key: &GroupKey) {
        if let Some(groups) = self.groups.get_mut(&channel) {
            groups.remove(key);
            if groups.is_empty() {
                self.groups.remove(&channel);
            }
        }
    }

    /// Number of groups on a channel
    pub fn group_count(&self, channel: ChannelId) -> usize {
        self.groups.get(&channel).map_or(0, BTreeMap::len)
    }

    /// Keys of every group on a channel, in key order
    pub fn group_keys(&self, channel: ChannelId) -> Vec<GroupKey> {
        self.groups
            .get(&channel)
            .map(|groups| groups.keys().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quay_core::Credential;

    const LEASE: u64 = 2;
    const RETRIES: u32 = 2;

    fn group() -> ConsumerGroup {
        let key = GroupKey::derive(ChannelId(0), &Credential::new(b"xpub".to_vec(), 10));
        ConsumerGroup::new(
            key,
            GroupConfig {
                lease_duration_secs: LEASE,
                num_of_retry: RETRIES,
            },
        )
    }

    fn at(secs: u64) -> PhysicalTime {
        PhysicalTime::from_secs(secs)
    }

    fn next(g: &mut ConsumerGroup, who: Address, now: PhysicalTime, log_len: u64) -> Result<Delivery> {
        g.next_delivery(who, now, log_len, 5, &mut ScanMeter::new(1024), SkipPolicy::Permanent)
    }

    #[test]
    fn test_redelivers_live_lease_until_retries_run_out() {
        let a = Address::from_label("a");
        let mut g = group();

        let first = next(&mut g, a, at(0), 2).unwrap();
        assert_eq!(first.message_id, MessageId(0));
        assert!(!first.redelivered);

        let second = next(&mut g, a, at(0), 2).unwrap();
        assert_eq!(second.message_id, MessageId(0));
        assert!(second.redelivered);
        assert_eq!(g.retry_count(), 1);

        let third = next(&mut g, a, at(0), 2).unwrap();
        assert_eq!(third.skipped, Some(MessageId(0)));
        assert_eq!(third.message_id, MessageId(1));
        assert_eq!(g.retry_count(), 0);
        assert!(g.is_resolved(MessageId(0)));
        assert_eq!(g.read_cursor(), MessageId(1));
    }

    #[test]
    fn test_expired_lease_moves_to_new_holder() {
        let a = Address::from_label("a");
        let b = Address::from_label("b");
        let mut g = group();

        next(&mut g, a, at(0), 2).unwrap();
        let again = next(&mut g, b, at(LEASE), 2).unwrap();
        assert_eq!(again.message_id, MessageId(0));
        assert!(!again.redelivered);
        assert_eq!(g.lease().unwrap().holder, b);

        let mut meter = ScanMeter::new(16);
        assert_eq!(
            g.confirm(a, MessageId(0), &mut meter),
            Err(QuayError::unauthorized(NOT_LEASE_HOLDER))
        );
        g.confirm(b, MessageId(0), &mut meter).unwrap();
        assert!(g.lease().is_none());
    }

    #[test]
    fn test_confirm_then_window_is_exhausted() {
        let a = Address::from_label("a");
        let mut g = group();
        next(&mut g, a, at(0), 1).unwrap();
        g.confirm(a, MessageId(0), &mut ScanMeter::new(4)).unwrap();
        assert_eq!(
            next(&mut g, a, at(LEASE + 10), 1),
            Err(QuayError::exhausted_scan(ALL_MESSAGES_READ))
        );
    }

    #[test]
    fn test_confirm_without_lease_is_invalid_state() {
        let mut g = group();
        let err = g
            .confirm(Address::from_label("a"), MessageId(0), &mut ScanMeter::new(4))
            .unwrap_err();
        assert!(matches!(err, QuayError::InvalidState { .. }));
    }

    #[test]
    fn test_scan_window_bounds_the_search() {
        let a = Address::from_label("a");
        let mut g = group();
        let mut meter = ScanMeter::new(1024);

        g.resolved.extend((0..4).map(MessageId));

        let err = g
            .next_delivery(a, at(0), 20, 4, &mut meter, SkipPolicy::Permanent)
            .unwrap_err();
        assert!(matches!(err, QuayError::ExhaustedScan { .. }));
        assert_eq!(meter.used(), 4);
        // The examined resolved prefix was folded into the cursor.
        assert_eq!(g.read_cursor(), MessageId(4));

        let delivery = g
            .next_delivery(a, at(0), 20, 4, &mut meter, SkipPolicy::Permanent)
            .unwrap();
        assert_eq!(delivery.message_id, MessageId(4));
    }

    #[test]
    fn test_zero_scan_window_finds_nothing() {
        let mut g = group();
        let mut meter = ScanMeter::new(8);
        let err = g
            .next_delivery(Address::from_label("a"), at(0), 3, 0, &mut meter, SkipPolicy::Permanent)
            .unwrap_err();
        assert!(matches!(err, QuayError::ExhaustedScan { .. }));
        assert_eq!(meter.used(), 0);
    }

    #[test]
    fn test_meter_ceiling_aborts_scan() {
        let mut g = group();
        g.resolved.extend((0..10).map(MessageId));
        let mut meter = ScanMeter::new(3);
        let err = g
            .next_delivery(Address::from_label("a"), at(0), 20, 10, &mut meter, SkipPolicy::Permanent)
            .unwrap_err();
        assert!(matches!(err, QuayError::BudgetExceeded { .. }));
    }

    #[test]
    fn test_deferred_skip_returns_after_lease_duration() {
        let a = Address::from_label("a");
        let mut g = group();
        let mut meter = ScanMeter::new(1024);

        g.next_delivery(a, at(0), 2, 5, &mut meter, SkipPolicy::Deferred)
            .unwrap();
        g.skip(a, MessageId(0), at(0), SkipPolicy::Deferred, &mut meter)
            .unwrap();
        assert!(!g.is_resolved(MessageId(0)));

        let d = g
            .next_delivery(a, at(1), 2, 5, &mut meter, SkipPolicy::Deferred)
            .unwrap();
        assert_eq!(d.message_id, MessageId(1));
        g.skip(a, MessageId(1), at(1), SkipPolicy::Deferred, &mut meter)
            .unwrap();

        let d = g
            .next_delivery(a, at(LEASE), 2, 5, &mut meter, SkipPolicy::Deferred)
            .unwrap();
        assert_eq!(d.message_id, MessageId(0));
        assert_eq!(g.deferred().count(), 1);
    }

    #[test]
    fn test_ensure_group_keeps_first_config() {
        let mut manager = LeaseManager::new();
        let key = GroupKey::derive(ChannelId(0), &Credential::new(b"k".to_vec(), 0));
        let first = GroupConfig {
            lease_duration_secs: 2,
            num_of_retry: 2,
        };
        let second = GroupConfig {
            lease_duration_secs: 60,
            num_of_retry: 9,
        };
        assert!(manager.ensure_group(ChannelId(0), key, first));
        assert!(!manager.ensure_group(ChannelId(0), key, second));
        assert_eq!(manager.group(ChannelId(0), &key).unwrap().config(), first);
    }
}
