//! Loader counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for envelope processing
#[derive(Debug, Default)]
pub struct LoaderMetrics {
    /// Envelopes popped and fully settled
    pub processed: AtomicU64,
    /// Envelopes that produced a document write
    pub updated: AtomicU64,
    /// Envelopes whose update set was empty
    pub unchanged: AtomicU64,
    /// Envelopes recorded to the invalid store
    pub invalid: AtomicU64,
    /// Envelopes recorded to the unknown-topic store
    pub unknown_topic: AtomicU64,
    /// Envelopes rolled back for redelivery
    pub rollbacks: AtomicU64,
    /// CAS misses retried within an envelope
    pub cas_retries: AtomicU64,
    /// Bulk flushes performed
    pub bulk_flushes: AtomicU64,
}

impl LoaderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> LoaderSnapshot {
        LoaderSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            unknown_topic: self.unknown_topic.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            cas_retries: self.cas_retries.load(Ordering::Relaxed),
            bulk_flushes: self.bulk_flushes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of loader counters
#[derive(Debug, Clone, Copy)]
pub struct LoaderSnapshot {
    pub processed: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub invalid: u64,
    pub unknown_topic: u64,
    pub rollbacks: u64,
    pub cas_retries: u64,
    pub bulk_flushes: u64,
}
