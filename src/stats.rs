use std::sync::atomic::{AtomicU64, Ordering};

/// Per-endpoint transport counters.
///
/// These are the numbers a game's netcode dashboard wants: how often the
/// reliable channel had to retransmit, how many gaps were given up on, and
/// what the peer is sending that we throw away.
#[derive(Default)]
pub struct TransportStats {
    reliable_sent: AtomicU64,
    unreliable_sent: AtomicU64,
    retransmits: AtomicU64,
    retry_exhausted: AtomicU64,
    sacks_sent: AtomicU64,
    reliable_delivered: AtomicU64,
    unreliable_delivered: AtomicU64,
    skips: AtomicU64,
    duplicates_dropped: AtomicU64,
    malformed_frames: AtomicU64,
}

impl TransportStats {
    pub(crate) fn count_reliable_sent(&self) {
        self.reliable_sent.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn count_unreliable_sent(&self) {
        self.unreliable_sent.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn count_retransmit(&self) {
        self.retransmits.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn count_retry_exhausted(&self) {
        self.retry_exhausted.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn count_sack_sent(&self) {
        self.sacks_sent.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn count_reliable_delivered(&self) {
        self.reliable_delivered.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn count_unreliable_delivered(&self) {
        self.unreliable_delivered.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn count_skip(&self) {
        self.skips.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn count_duplicate_dropped(&self) {
        self.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
    }
    pub(crate) fn count_malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reliable_sent: self.reliable_sent.load(Ordering::Relaxed),
            unreliable_sent: self.unreliable_sent.load(Ordering::Relaxed),
            retransmits: self.retransmits.load(Ordering::Relaxed),
            retry_exhausted: self.retry_exhausted.load(Ordering::Relaxed),
            sacks_sent: self.sacks_sent.load(Ordering::Relaxed),
            reliable_delivered: self.reliable_delivered.load(Ordering::Relaxed),
            unreliable_delivered: self.unreliable_delivered.load(Ordering::Relaxed),
            skips: self.skips.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct StatsSnapshot {
    pub reliable_sent: u64,
    pub unreliable_sent: u64,
    pub retransmits: u64,
    pub retry_exhausted: u64,
    pub sacks_sent: u64,
    pub reliable_delivered: u64,
    pub unreliable_delivered: u64,
    pub skips: u64,
    pub duplicates_dropped: u64,
    pub malformed_frames: u64,
}
