//! Keeper-local watch-set state. Entries are created when a position is
//! first observed open, back off on failed attempts, and are retired when
//! the position is observed closed or fails permanently. A retired identity
//! is never re-added.

use std::collections::{HashMap, HashSet};
use std::time::Duration;
use synth_keeper_core::{Position, PositionKey};

/// Bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial: Duration,
    cap: Duration,
}

impl BackoffPolicy {
    #[must_use]
    pub const fn new(initial_ms: u64, cap_ms: u64) -> Self {
        Self {
            initial: Duration::from_millis(initial_ms),
            cap: Duration::from_millis(cap_ms),
        }
    }

    /// Delay before the next attempt after `consecutive_failures` failures.
    /// Non-decreasing in the failure count, capped.
    #[must_use]
    pub fn delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let exp = consecutive_failures.saturating_sub(1).min(16);
        let millis = self.initial.as_millis().saturating_mul(1u128 << exp);
        Duration::from_millis(millis.min(self.cap.as_millis()).min(u128::from(u64::MAX)) as u64)
    }
}

#[derive(Debug, Clone)]
pub struct WatchEntry {
    pub position: Position,
    pub next_eligible_at_ms: u64,
    pub consecutive_failures: u32,
}

#[derive(Debug, Default)]
pub struct WatchSet {
    entries: HashMap<PositionKey, WatchEntry>,
    retired: HashSet<PositionKey>,
}

impl WatchSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_retired(&self, key: &PositionKey) -> bool {
        self.retired.contains(key)
    }

    /// Reconciles the watch set for one (trader, instrument) scope against a
    /// freshly-read open-position list. New positions are added unless their
    /// identity was already retired; existing entries get the fresh position
    /// record; entries in this scope missing from the list are retired
    /// (closed is terminal).
    ///
    /// Returns the number of entries added and the keys retired.
    pub fn sync(
        &mut self,
        trader: &str,
        instrument: &str,
        open: Vec<Position>,
        now_ms: u64,
    ) -> (usize, Vec<PositionKey>) {
        let mut seen: HashSet<PositionKey> = HashSet::new();
        let mut added = 0;
        for position in open {
            if !position.is_open {
                continue;
            }
            let key = position.key();
            seen.insert(key.clone());
            if self.retired.contains(&key) {
                continue;
            }
            match self.entries.entry(key) {
                std::collections::hash_map::Entry::Occupied(mut entry) => {
                    entry.get_mut().position = position;
                }
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(WatchEntry {
                        position,
                        next_eligible_at_ms: now_ms,
                        consecutive_failures: 0,
                    });
                    added += 1;
                }
            }
        }

        let removed: Vec<PositionKey> = self
            .entries
            .keys()
            .filter(|key| {
                key.trader == trader && key.instrument == instrument && !seen.contains(*key)
            })
            .cloned()
            .collect();
        for key in &removed {
            self.entries.remove(key);
            self.retired.insert(key.clone());
        }
        (added, removed)
    }

    /// Positions whose backoff window has elapsed.
    #[must_use]
    pub fn eligible(&self, now_ms: u64) -> Vec<Position> {
        self.entries
            .values()
            .filter(|entry| entry.next_eligible_at_ms <= now_ms)
            .map(|entry| entry.position.clone())
            .collect()
    }

    /// Number of entries currently inside a backoff window.
    #[must_use]
    pub fn backing_off(&self, now_ms: u64) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.next_eligible_at_ms > now_ms)
            .count()
    }

    pub fn record_failure(&mut self, key: &PositionKey, policy: &BackoffPolicy, now_ms: u64) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.consecutive_failures += 1;
            let delay = policy.delay(entry.consecutive_failures);
            entry.next_eligible_at_ms = now_ms.saturating_add(delay.as_millis() as u64);
        }
    }

    /// Removes the entry and bars the identity from ever being re-added.
    pub fn retire(&mut self, key: &PositionKey) {
        self.entries.remove(key);
        self.retired.insert(key.clone());
    }
}
