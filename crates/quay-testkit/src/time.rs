//! Controllable clock for deterministic tests

use async_trait::async_trait;
use quay_core::{PhysicalTime, PhysicalTimeEffects, TimeError};
use std::sync::{Arc, Mutex};

/// Clock that only moves when a test moves it.
///
/// Clones share the same underlying time, so a test can keep one handle while
/// the service owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    current_ms: Arc<Mutex<u64>>,
}

impl ManualClock {
    /// Clock starting at `ts_ms` milliseconds
    pub fn at_ms(ts_ms: u64) -> Self {
        Self {
            current_ms: Arc::new(Mutex::new(ts_ms)),
        }
    }

    /// Clock starting at `secs` seconds
    pub fn at_secs(secs: u64) -> Self {
        Self::at_ms(secs * 1000)
    }

    /// Move forward by whole seconds
    pub fn advance_secs(&self, secs: u64) {
        self.advance_ms(secs * 1000);
    }

    /// Move forward by milliseconds
    pub fn advance_ms(&self, ms: u64) {
        let mut current = self.current_ms.lock().unwrap();
        *current += ms;
    }

    /// Jump to an absolute time
    pub fn set(&self, time: PhysicalTime) {
        *self.current_ms.lock().unwrap() = time.ts_ms;
    }

    /// Current reading
    pub fn now(&self) -> PhysicalTime {
        PhysicalTime::from_ms(*self.current_ms.lock().unwrap())
    }
}

#[async_trait]
impl PhysicalTimeEffects for ManualClock {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        let current = self
            .current_ms
            .lock()
            .map_err(|e| TimeError::ClockUnavailable {
                reason: e.to_string(),
            })?;
        Ok(PhysicalTime::from_ms(*current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_time() {
        let clock = ManualClock::at_secs(10);
        let handle = clock.clone();
        handle.advance_secs(2);
        assert_eq!(
            clock.physical_time().await.unwrap(),
            PhysicalTime::from_secs(12)
        );
        clock.set(PhysicalTime::from_ms(5));
        assert_eq!(handle.now().ts_ms, 5);
    }
}
