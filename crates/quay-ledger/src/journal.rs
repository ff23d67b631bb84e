//! Append-only event journal
//!
//! Committed operations append their events here in commit order. Observers
//! page through it by sequence number; nothing is ever removed.

use quay_core::{EventRecord, LedgerEvent, PhysicalTime};
use serde::{Deserialize, Serialize};

/// Ordered record of every committed event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventJournal {
    records: Vec<EventRecord>,
}

impl EventJournal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the events of one committed operation, returning their records
    pub fn append(&mut self, at: PhysicalTime, events: Vec<LedgerEvent>) -> Vec<EventRecord> {
        let first = self.records.len();
        for event in events {
            let seq = self.records.len() as u64;
            self.records.push(EventRecord { seq, at, event });
        }
        self.records[first..].to_vec()
    }

    /// Every record so far
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records with `seq >= from`
    pub fn since(&self, from: u64) -> &[EventRecord] {
        let start = usize::try_from(from)
            .unwrap_or(usize::MAX)
            .min(self.records.len());
        &self.records[start..]
    }

    /// Sequence number the next event will get
    pub fn next_seq(&self) -> u64 {
        self.records.len() as u64
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing has been committed yet
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
