//! Consumer (§3): owns one [`Ring`] per online CPU and the per-consumer
//! control-plane state (§4.5).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use crate::config::{Config, RW_SNAPLEN};
use crate::error::{Error, Result};
use crate::ring::Ring;

/// Opaque identity of the user-space task that opened a device (§3, §4.2).
/// A real kernel driver keys this off the `struct file`/task pointer; this
/// crate leaves the concrete identity to the caller (pid, fd number,
/// connection id — whatever uniquely names an owner) and only requires it
/// be `Copy + Eq + Hash`.
pub type OwnerId = u64;

/// One nanosecond-granularity sampling interval: `10^9 / ratio`, reset to
/// `10^9` (ratio 1) symmetrically on `DISABLE_DROPPING_MODE` (§4.5, §9).
const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Per-consumer mode state (§3, §4.5). Lives behind a `Mutex` because
/// control-plane operations are explicitly allowed to block (§5) — the
/// record path reads a consistent snapshot via [`Consumer::mode`] without
/// holding the lock across the hot path.
#[derive(Debug, Clone, Copy)]
pub struct Mode {
    pub dropping_mode: bool,
    pub sampling_ratio: u32,
    pub sampling_interval_ns: u64,
    pub snaplen: usize,
    pub do_dynamic_snaplen: bool,
    pub signal_deliver_enabled: bool,
}

impl Default for Mode {
    fn default() -> Self {
        Self {
            dropping_mode: false,
            sampling_ratio: 1,
            sampling_interval_ns: NANOS_PER_SEC,
            snaplen: RW_SNAPLEN,
            do_dynamic_snaplen: false,
            signal_deliver_enabled: false,
        }
    }
}

/// Deferred drop-marker state the sampling policy tracks per consumer
/// (§4.3 step 2, §4.5, P5).
#[derive(Debug, Default)]
pub(crate) struct DropMarkerState {
    pub is_dropping: AtomicBool,
    pub need_drop_e: AtomicBool,
    pub need_drop_x: AtomicBool,
}

pub struct Consumer {
    pub owner_id: OwnerId,
    rings: Vec<Ring>,
    mode: Mutex<Mode>,
    pub(crate) drop_state: DropMarkerState,
    /// Count of rings with `open=true`; a consumer is garbage-collected
    /// only once this reaches zero (§4.2 close path, P7).
    open_rings: AtomicU32,
}

impl Consumer {
    pub fn new(owner_id: OwnerId, config: Config) -> Result<Self> {
        let mut rings = Vec::with_capacity(config.num_cpus());
        for _ in 0..config.num_cpus() {
            rings.push(Ring::new(config)?);
        }
        Ok(Self {
            owner_id,
            rings,
            mode: Mutex::new(Mode::default()),
            drop_state: DropMarkerState::default(),
            open_rings: AtomicU32::new(0),
        })
    }

    #[must_use]
    pub fn ring(&self, cpu: usize) -> Option<&Ring> {
        self.rings.get(cpu)
    }

    #[must_use]
    pub fn rings(&self) -> &[Ring] {
        &self.rings
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        *self.mode.lock().expect("mode mutex poisoned")
    }

    /// Open-path reset (§4.2 step 3): resets consumer defaults and ring
    /// `cpu`'s head/tail/counters; returns `Busy` if that ring is already
    /// open.
    pub fn open_ring(&self, cpu: usize) -> Result<()> {
        let ring = self.ring(cpu).ok_or(Error::NotFound("no such ring"))?;
        if ring.is_open() {
            return Err(Error::Busy("ring already open"));
        }
        *self.mode.lock().expect("mode mutex poisoned") = Mode::default();
        ring.reset_for_open();
        self.open_rings.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Close-path (§4.2): marks the ring closed. Returns the number of
    /// still-open rings so the registry can decide whether to garbage
    /// collect this consumer.
    pub fn close_ring(&self, cpu: usize) -> Result<u32> {
        let ring = self.ring(cpu).ok_or(Error::NotFound("no such ring"))?;
        ring.close();
        Ok(self.open_rings.fetch_sub(1, Ordering::AcqRel) - 1)
    }

    #[must_use]
    pub fn open_ring_count(&self) -> u32 {
        self.open_rings.load(Ordering::Acquire)
    }

    pub fn enable_capture(&self, cpu: usize) -> Result<()> {
        self.ring(cpu).ok_or(Error::NotFound("no such ring"))?.set_capture_enabled(true);
        Ok(())
    }

    pub fn disable_capture(&self, cpu: usize) -> Result<()> {
        self.ring(cpu).ok_or(Error::NotFound("no such ring"))?.set_capture_enabled(false);
        Ok(())
    }

    /// `ENABLE_DROPPING_MODE` (§4.5): ratio must be one of 1,2,4,...,128.
    pub fn enable_dropping_mode(&self, ratio: u32) -> Result<()> {
        if !is_valid_sampling_ratio(ratio) {
            return Err(Error::InvalidArgument("sampling ratio must be a power of two <= 128"));
        }
        let mut mode = self.mode.lock().expect("mode mutex poisoned");
        mode.dropping_mode = true;
        mode.sampling_ratio = ratio;
        mode.sampling_interval_ns = NANOS_PER_SEC / u64::from(ratio);
        Ok(())
    }

    /// `DISABLE_DROPPING_MODE` (§4.5, §9): resets `sampling_interval` to
    /// `10^9` for parity with the original even though it is inert while
    /// dropping mode is off.
    pub fn disable_dropping_mode(&self) {
        let mut mode = self.mode.lock().expect("mode mutex poisoned");
        mode.dropping_mode = false;
        mode.sampling_interval_ns = NANOS_PER_SEC;
    }

    pub fn set_snaplen(&self, snaplen: usize) -> Result<()> {
        if snaplen > crate::config::RW_MAX_SNAPLEN {
            return Err(Error::InvalidArgument("snaplen exceeds RW_MAX_SNAPLEN"));
        }
        self.mode.lock().expect("mode mutex poisoned").snaplen = snaplen;
        Ok(())
    }

    pub fn set_dynamic_snaplen(&self, enabled: bool) {
        self.mode.lock().expect("mode mutex poisoned").do_dynamic_snaplen = enabled;
    }

    pub fn set_signal_deliver(&self, enabled: bool) {
        self.mode.lock().expect("mode mutex poisoned").signal_deliver_enabled = enabled;
    }
}

#[must_use]
pub const fn is_valid_sampling_ratio(ratio: u32) -> bool {
    matches!(ratio, 1 | 2 | 4 | 8 | 16 | 32 | 64 | 128)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SMALL_RING_CONFIG;

    #[test]
    fn open_close_tracks_ring_count() {
        let consumer = Consumer::new(1, SMALL_RING_CONFIG).unwrap();
        consumer.open_ring(0).unwrap();
        assert_eq!(consumer.open_ring_count(), 1);
        assert_eq!(consumer.close_ring(0).unwrap(), 0);
    }

    #[test]
    fn reopen_same_ring_is_busy() {
        let consumer = Consumer::new(1, SMALL_RING_CONFIG).unwrap();
        consumer.open_ring(0).unwrap();
        assert!(matches!(consumer.open_ring(0), Err(Error::Busy(_))));
    }

    #[test]
    fn invalid_sampling_ratio_rejected() {
        let consumer = Consumer::new(1, SMALL_RING_CONFIG).unwrap();
        assert!(consumer.enable_dropping_mode(3).is_err());
        assert!(consumer.enable_dropping_mode(4).is_ok());
        assert_eq!(consumer.mode().sampling_interval_ns, NANOS_PER_SEC / 4);
    }

    #[test]
    fn disable_dropping_resets_interval() {
        let consumer = Consumer::new(1, SMALL_RING_CONFIG).unwrap();
        consumer.enable_dropping_mode(8).unwrap();
        consumer.disable_dropping_mode();
        assert_eq!(consumer.mode().sampling_interval_ns, NANOS_PER_SEC);
        assert!(!consumer.mode().dropping_mode);
    }

    #[test]
    fn snaplen_over_max_rejected() {
        let consumer = Consumer::new(1, SMALL_RING_CONFIG).unwrap();
        assert!(consumer.set_snaplen(crate::config::RW_MAX_SNAPLEN + 1).is_err());
        assert!(consumer.set_snaplen(100).is_ok());
    }
}
