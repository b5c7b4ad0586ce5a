//! Per-CPU ring buffer (C1): allocation layout, head/tail discipline,
//! wraparound via the overflow cushion, and the preemption gate.

use std::cell::RefCell;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Instant;

use crate::align::CacheAligned;
use crate::config::Config;
use crate::error::Result;
use crate::invariants::{debug_assert_in_bounds, debug_assert_one_free_byte, debug_assert_preempt_gate_held};
use crate::shm::create_anon_fd;
use crate::stats::StatsPage;

/// One per-CPU, per-consumer ring. Holds the data buffer (page-aligned,
/// with the two-page overflow cushion), the stats page producer and
/// consumer share, a scratch page private to the writing CPU, and the
/// control flags the registry/control-plane flip.
pub struct Ring {
    data_fd: OwnedFd,
    data_map: RefCell<memmap2::MmapMut>,
    stats_fd: OwnedFd,
    stats_map: memmap2::MmapMut,
    /// Scratch page used exclusively by the filler running on this ring's
    /// CPU while the preempt gate is held — never touched by the consumer.
    str_storage: RefCell<Box<[u8]>>,
    config: Config,
    open: AtomicBool,
    capture_enabled: AtomicBool,
    /// Atomic mutual-exclusion counter. Increment returns the prior value;
    /// deliberately never reset by open/close (§5, §9) — an in-flight
    /// record that raced a close must still be able to decrement it to
    /// zero.
    preempt_count: CacheAligned<AtomicU32>,
    last_print: std::sync::Mutex<Option<Instant>>,
}

// SAFETY: `Ring` is shared across the owning CPU (sole writer, serialized
// by the preempt gate) and user space (sole reader, via the stats page
// protocol). Interior mutability is confined to the data/str_storage
// buffers, which only the preempt-gate holder touches.
unsafe impl Sync for Ring {}

impl Ring {
    /// Allocates a fresh ring: a memfd-backed data buffer of
    /// `config.alloc_size()` bytes and a one-page memfd-backed stats page,
    /// both zero-initialized, `open=false`, `capture_enabled=false`.
    /// `preempt_count` starts at 0 only because this is a brand-new ring —
    /// a *reopened* ring must not go through this path (see
    /// [`Ring::reset_for_reopen`]).
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let alloc_size = config.alloc_size();
        let data_fd = create_anon_fd("ringcap-ring-data", alloc_size)?;
        // SAFETY: `data_fd` is a valid, sized, shared memfd.
        let data_map = unsafe { memmap2::MmapOptions::new().len(alloc_size).map_mut(&data_fd)? };

        let stats_size = std::mem::size_of::<StatsPage>().max(config.page_size());
        let stats_fd = create_anon_fd("ringcap-ring-stats", stats_size)?;
        // SAFETY: `stats_fd` is valid and sized to hold a `StatsPage`.
        let mut stats_map = unsafe { memmap2::MmapOptions::new().len(stats_size).map_mut(&stats_fd)? };
        // SAFETY: the mapping is exclusively owned at construction time and
        // large enough for one `StatsPage`; no other view exists yet.
        unsafe {
            std::ptr::write(stats_map.as_mut_ptr().cast::<StatsPage>(), StatsPage::new());
        }

        Ok(Self {
            data_fd,
            data_map: RefCell::new(data_map),
            stats_fd,
            stats_map,
            str_storage: RefCell::new(vec![0u8; config.page_size()].into_boxed_slice()),
            config,
            open: AtomicBool::new(false),
            capture_enabled: AtomicBool::new(false),
            preempt_count: CacheAligned::new(AtomicU32::new(0)),
            last_print: std::sync::Mutex::new(None),
        })
    }

    #[must_use]
    pub fn data_fd(&self) -> BorrowedFd<'_> {
        self.data_fd.as_fd()
    }

    #[must_use]
    pub fn stats_fd(&self) -> BorrowedFd<'_> {
        self.stats_fd.as_fd()
    }

    #[must_use]
    pub fn stats(&self) -> &StatsPage {
        // SAFETY: written in `new` before any other reference exists and
        // never moved or freed for the lifetime of `self.stats_map`.
        unsafe { &*self.stats_map.as_ptr().cast::<StatsPage>() }
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn ring_buf_size(&self) -> u32 {
        self.config.ring_buf_size() as u32
    }

    #[must_use]
    pub const fn alloc_size(&self) -> u32 {
        self.config.alloc_size() as u32
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn capture_enabled(&self) -> bool {
        self.capture_enabled.load(Ordering::Acquire)
    }

    pub fn set_capture_enabled(&self, enabled: bool) {
        self.capture_enabled.store(enabled, Ordering::Release);
    }

    /// Open-path reset (§4.2 step 3): resets `head=tail=0` and counters,
    /// sets `open=true`, `capture_enabled=false`. Does **not** touch
    /// `preempt_count`.
    pub fn reset_for_open(&self) {
        self.stats().reset();
        self.capture_enabled.store(false, Ordering::Release);
        self.open.store(true, Ordering::Release);
    }

    /// Close-path (§4.2): `capture_enabled=false`, `open=false`.
    pub fn close(&self) {
        self.capture_enabled.store(false, Ordering::Release);
        self.open.store(false, Ordering::Release);
    }

    /// Preempt gate enter (§4.3 step 5, §5, P4). Returns `true` if this
    /// call acquired exclusive access; `false` if a nested record call was
    /// already in progress on this ring (the counter is restored to its
    /// prior value before returning).
    pub(crate) fn preempt_enter(&self) -> bool {
        let prior = self.preempt_count.fetch_add(1, Ordering::AcqRel);
        if prior != 0 {
            self.preempt_count.fetch_sub(1, Ordering::AcqRel);
            false
        } else {
            debug_assert_preempt_gate_held!(prior);
            true
        }
    }

    pub(crate) fn preempt_exit(&self) {
        self.preempt_count.fetch_sub(1, Ordering::Release);
    }

    /// Space computation (§4.1): `free` bytes available before the
    /// producer would catch up to `tail`, and the usable contiguous write
    /// window bounded by the overflow cushion.
    #[must_use]
    pub(crate) fn compute_space(&self, head: u32) -> (u32, u32) {
        let tail = self.stats().load_tail();
        let rbs = self.ring_buf_size();
        debug_assert_in_bounds!(head, rbs as usize);
        debug_assert_in_bounds!(tail, rbs as usize);
        let free = if tail > head { tail - head - 1 } else { rbs + tail - head - 1 };
        debug_assert_one_free_byte!(rbs - free - 1, free, rbs);
        let window = free.min(self.alloc_size() - head - 1);
        (free, window)
    }

    /// Raw pointer to `offset` within the allocation (including the
    /// overflow cushion). Callers must stay within `alloc_size()`.
    ///
    /// # Safety
    /// The caller must hold the preempt gate (single-writer discipline)
    /// and must not read/write past `alloc_size()`.
    pub(crate) unsafe fn data_ptr_at(&self, offset: u32) -> *mut u8 {
        self.data_map.borrow_mut().as_mut_ptr().add(offset as usize)
    }

    /// Commits `len` bytes written starting at `head` (§4.3 step 10):
    /// copies any overflow-cushion bytes back to the start and wraps
    /// `head`, then publishes via a store-release on the stats page.
    /// Returns the new (wrapped) head.
    pub(crate) fn commit(&self, head: u32, len: u32) -> u32 {
        let rbs = self.ring_buf_size();
        let mut new_head = head + len;
        if new_head > rbs {
            let overflow_len = (new_head - rbs) as usize;
            let mut map = self.data_map.borrow_mut();
            let ptr = map.as_mut_ptr();
            // SAFETY: `[rbs, rbs+overflow_len)` and `[0, overflow_len)` are
            // both within `alloc_size` by construction (overflow_len <
            // 2*page_size <= alloc_size - rbs), and the ranges cannot
            // overlap since rbs >= 2*page_size >= overflow_len.
            unsafe {
                std::ptr::copy_nonoverlapping(ptr.add(rbs as usize), ptr, overflow_len);
            }
        }
        if new_head >= rbs {
            new_head -= rbs;
        }
        debug_assert_in_bounds!(new_head, rbs as usize);
        self.stats().store_head(new_head);
        new_head
    }

    #[must_use]
    pub(crate) fn str_storage(&self) -> std::cell::RefMut<'_, Box<[u8]>> {
        self.str_storage.borrow_mut()
    }

    /// At most once per second per ring (§4.3, §7), logs the usage summary
    /// the original driver prints via `vpr_info` when `verbose` is set.
    pub(crate) fn maybe_log_summary(&self) {
        if !self.config.verbose() {
            return;
        }
        let mut last = self.last_print.lock().expect("last_print mutex poisoned");
        let now = Instant::now();
        if last.is_some_and(|t| now.duration_since(t).as_secs() < 1) {
            return;
        }
        *last = Some(now);
        let stats = self.stats();
        log::debug!(
            "ring usage={}% n_evts={} n_drops_buffer={} n_drops_pf={} n_preemptions={} n_context_switches={}",
            stats.used_space_pct(self.ring_buf_size()),
            stats.n_evts.load(Ordering::Relaxed),
            stats.n_drops_buffer.load(Ordering::Relaxed),
            stats.n_drops_pf.load(Ordering::Relaxed),
            stats.n_preemptions.load(Ordering::Relaxed),
            stats.n_context_switches.load(Ordering::Relaxed),
        );
    }
}
