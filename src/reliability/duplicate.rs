//! Duplicate Guard
//!
//! Tracks transfers this side has already retired (delivered or abandoned) and counts
//! fragments that keep arriving for them, along with unexpected echoes of transfers
//! this side is still sending. Counters are scoped to `(peer, transfer_id)` so two
//! peers that happen to pick the same transfer id never share a counter.
//!
//! Re-deliveries are absorbed silently (no re-acknowledgment) until the count passes
//! the threshold; at that point the caller sends one give-up NACK and every later
//! fragment for the pair is ignored.
//!
//! Entries expire after a TTL and the table is bounded; the oldest entries are evicted
//! first when it is full.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::reliability::PeerTransfer;

#[derive(Debug, Clone)]
struct GuardEntry {
    added_at: Instant,
    duplicates: u32,
    retired: bool,
}

/// What to do with a fragment that was recognised as a duplicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateVerdict {
    /// Drop it quietly
    Suppress,
    /// The threshold was just crossed: send one give-up NACK to the peer
    GiveUp,
    /// Already gave up on this pair: drop without any further processing
    Ignore,
}

/// TTL-bounded duplicate counters with FIFO eviction
#[derive(Debug)]
pub struct DuplicateGuard {
    entries: HashMap<PeerTransfer, GuardEntry>,
    insertion_order: VecDeque<PeerTransfer>,
    threshold: u32,
    ttl: Duration,
    max_entries: usize,
}

impl DuplicateGuard {
    pub fn new(threshold: u32, ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            threshold,
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Remember that `key` is finished on this side
    pub fn retire(&mut self, key: PeerTransfer) {
        self.cleanup_expired();
        match self.entries.get_mut(&key) {
            Some(entry) => entry.retired = true,
            None => {
                self.insert(
                    key,
                    GuardEntry {
                        added_at: Instant::now(),
                        duplicates: 0,
                        retired: true,
                    },
                );
            }
        }
    }

    /// Whether `key` was retired and has not yet expired
    pub fn is_retired(&self, key: &PeerTransfer) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.retired && e.added_at.elapsed() < self.ttl)
    }

    /// Count one more duplicate for `key` and decide what to do with it
    pub fn record(&mut self, key: PeerTransfer) -> DuplicateVerdict {
        self.cleanup_expired();

        let duplicates = match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.duplicates = entry.duplicates.saturating_add(1);
                entry.duplicates
            }
            None => {
                self.insert(
                    key,
                    GuardEntry {
                        added_at: Instant::now(),
                        duplicates: 1,
                        retired: false,
                    },
                );
                1
            }
        };

        if duplicates == self.threshold.saturating_add(1) {
            warn!(
                peer = %key.peer,
                transfer_id = key.transfer_id,
                duplicates,
                "Duplicate threshold exceeded, giving up on transfer"
            );
            DuplicateVerdict::GiveUp
        } else if duplicates > self.threshold {
            DuplicateVerdict::Ignore
        } else {
            debug!(
                peer = %key.peer,
                transfer_id = key.transfer_id,
                duplicates,
                "Duplicate fragment suppressed"
            );
            DuplicateVerdict::Suppress
        }
    }

    /// Whether the threshold for `key` has already been crossed
    pub fn gave_up(&self, key: &PeerTransfer) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.duplicates > self.threshold)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }

    fn insert(&mut self, key: PeerTransfer, entry: GuardEntry) {
        if self.entries.len() >= self.max_entries {
            let to_remove = self.entries.len() - self.max_entries + 1;
            self.remove_oldest_entries(to_remove);
        }
        self.entries.insert(key, entry);
        self.insertion_order.push_back(key);
    }

    fn cleanup_expired(&mut self) {
        let now = Instant::now();
        let initial_count = self.entries.len();

        self.entries
            .retain(|_, entry| now.duration_since(entry.added_at) < self.ttl);

        while let Some(key) = self.insertion_order.front() {
            if !self.entries.contains_key(key) {
                self.insertion_order.pop_front();
            } else {
                break;
            }
        }

        let removed = initial_count - self.entries.len();
        if removed > 0 {
            debug!("Expired {} duplicate guard entries", removed);
        }
    }

    fn remove_oldest_entries(&mut self, count: usize) {
        let mut removed = 0;
        while removed < count {
            match self.insertion_order.pop_front() {
                Some(key) => {
                    if self.entries.remove(&key).is_some() {
                        removed += 1;
                    }
                }
                None => break,
            }
        }
    }
}
