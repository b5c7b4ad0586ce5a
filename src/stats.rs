//! The ring's stats page (§3, §6): the only state producer and consumer
//! share across the publication boundary.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Wire layout: `head:u32, tail:u32, n_evts:u64, n_drops_buffer:u64,
/// n_drops_pf:u64, n_preemptions:u64, n_context_switches:u64`.
///
/// Producer (the owning CPU) reads `tail`, writes `head`. Consumer (user
/// space) reads `head`, writes `tail`. All other counters are
/// producer-owned; the consumer only ever reads them.
#[repr(C)]
#[derive(Debug)]
pub struct StatsPage {
    pub(crate) head: AtomicU32,
    pub(crate) tail: AtomicU32,
    pub n_evts: AtomicU64,
    pub n_drops_buffer: AtomicU64,
    pub n_drops_pf: AtomicU64,
    pub n_preemptions: AtomicU64,
    pub n_context_switches: AtomicU64,
}

impl StatsPage {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
            n_evts: AtomicU64::new(0),
            n_drops_buffer: AtomicU64::new(0),
            n_drops_pf: AtomicU64::new(0),
            n_preemptions: AtomicU64::new(0),
            n_context_switches: AtomicU64::new(0),
        }
    }

    /// Consumer-side: load the published head (§4.1 publication discipline).
    #[must_use]
    pub fn load_head(&self) -> u32 {
        self.head.load(Ordering::Acquire)
    }

    /// Producer-side: load tail to compute free space. Acquire is not
    /// required here (the producer only needs to see *a* recent tail, and
    /// the store-release on `head` is what actually publishes data), but
    /// using Acquire costs nothing extra on the producer's own CPU and
    /// keeps the ordering story uniform.
    #[must_use]
    pub fn load_tail(&self) -> u32 {
        self.tail.load(Ordering::Acquire)
    }

    /// Producer-side publish: store-release so a consumer that observes
    /// the new `head` also observes every byte the producer just wrote
    /// (P2, no torn records).
    pub fn store_head(&self, value: u32) {
        self.head.store(value, Ordering::Release);
    }

    /// Consumer-side: publish that bytes up to `value` have been consumed.
    pub fn store_tail(&self, value: u32) {
        self.tail.store(value, Ordering::Release);
    }

    pub fn reset(&self) {
        self.head.store(0, Ordering::Relaxed);
        self.tail.store(0, Ordering::Relaxed);
        self.n_evts.store(0, Ordering::Relaxed);
        self.n_drops_buffer.store(0, Ordering::Relaxed);
        self.n_drops_pf.store(0, Ordering::Relaxed);
        self.n_preemptions.store(0, Ordering::Relaxed);
        self.n_context_switches.store(0, Ordering::Relaxed);
    }

    /// Percentage of the ring currently in use, as logged by the periodic
    /// summary (§4.3 supplement).
    #[must_use]
    pub fn used_space_pct(&self, ring_buf_size: u32) -> u64 {
        let head = self.load_head() as u64;
        let tail = self.load_tail() as u64;
        let used = if head >= tail { head - tail } else { ring_buf_size as u64 + head - tail };
        used.saturating_mul(100) / u64::from(ring_buf_size)
    }
}

impl Default for StatsPage {
    fn default() -> Self {
        Self::new()
    }
}
