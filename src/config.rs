//! Capture engine configuration.

use crate::error::{Error, Result};

/// Default page size assumed by the ring layout. Real platforms may differ;
/// callers that need the platform's actual page size should override it
/// before constructing rings (see [`Config::with_page_size`]).
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// `RW_SNAPLEN` from the original driver: default payload cap per parameter.
pub const RW_SNAPLEN: usize = 80;

/// `RW_MAX_SNAPLEN`: the largest snaplen a consumer may request.
pub const RW_MAX_SNAPLEN: usize = 4096;

/// Default cap on simultaneously open consumers.
pub const DEFAULT_MAX_CONSUMERS: usize = 5;

/// Typed, validated configuration for a capture engine instance.
///
/// Mirrors the teacher's `Config`: a `const fn` constructor that asserts its
/// own invariants, a `Default`, and named presets.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Page size used to lay out rings. Must divide `ring_buf_size`.
    page_size: usize,
    /// Logical ring size in bytes, excluding the overflow cushion.
    /// Must be a multiple of `page_size` and at least `2 * page_size`.
    ring_buf_size: usize,
    /// Number of CPUs to provision per-consumer rings for.
    num_cpus: usize,
    /// Maximum number of simultaneously open consumers.
    max_consumers: usize,
    /// Emit periodic per-ring summaries via `log::debug!`.
    verbose: bool,
}

impl Config {
    /// Builds a configuration, panicking (via `assert!`) if the layout is
    /// invalid. Intended for const/startup-time construction, matching the
    /// teacher's `Config::new`.
    #[must_use]
    pub const fn new(ring_buf_size: usize, num_cpus: usize, max_consumers: usize) -> Self {
        assert!(ring_buf_size % DEFAULT_PAGE_SIZE == 0, "ring_buf_size must be page-aligned");
        assert!(ring_buf_size >= 2 * DEFAULT_PAGE_SIZE, "ring_buf_size must be >= 2 pages");
        assert!(num_cpus > 0, "num_cpus must be nonzero");
        assert!(max_consumers > 0, "max_consumers must be nonzero");
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            ring_buf_size,
            num_cpus,
            max_consumers,
            verbose: false,
        }
    }

    /// Overrides the page size used for layout validation. Re-validates.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Result<Self> {
        self.page_size = page_size;
        self.validate()?;
        Ok(self)
    }

    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    #[must_use]
    pub const fn with_max_consumers(mut self, max_consumers: usize) -> Self {
        self.max_consumers = max_consumers;
        self
    }

    /// Re-checks the page-alignment invariants this crate also enforces at
    /// mmap time (§4.6): the original validates at mmap, not allocation,
    /// time, so a `Config` built before the platform page size is known can
    /// still be caught when it matters.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 || self.ring_buf_size % self.page_size != 0 {
            return Err(Error::InvalidArgument("ring_buf_size is not page-aligned"));
        }
        if self.ring_buf_size < 2 * self.page_size {
            return Err(Error::InvalidArgument("ring_buf_size must be >= 2 pages"));
        }
        Ok(())
    }

    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub const fn ring_buf_size(&self) -> usize {
        self.ring_buf_size
    }

    /// Size of the physical allocation backing one ring: the logical ring
    /// plus the two-page overflow cushion (§4.1).
    #[must_use]
    pub const fn alloc_size(&self) -> usize {
        self.ring_buf_size + 2 * self.page_size
    }

    #[must_use]
    pub const fn num_cpus(&self) -> usize {
        self.num_cpus
    }

    #[must_use]
    pub const fn max_consumers(&self) -> usize {
        self.max_consumers
    }

    #[must_use]
    pub const fn verbose(&self) -> bool {
        self.verbose
    }
}

impl Default for Config {
    /// 8 MiB rings, one per CPU reported by the platform, 5 max consumers —
    /// the original driver's defaults.
    fn default() -> Self {
        Self::new(8 * 1024 * 1024, num_cpus_or_one(), DEFAULT_MAX_CONSUMERS)
    }
}

fn num_cpus_or_one() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// A single-CPU, small-ring preset sized for the buffer-full scenario in
/// the end-to-end test suite (§8 scenario 2): `RING_BUF_SIZE = 8 KiB`.
pub const SMALL_RING_CONFIG: Config = Config::new(8 * 1024, 1, DEFAULT_MAX_CONSUMERS);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn small_ring_preset_validates() {
        assert!(SMALL_RING_CONFIG.validate().is_ok());
        assert_eq!(SMALL_RING_CONFIG.alloc_size(), 8 * 1024 + 2 * DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn rejects_unaligned_ring_size() {
        let cfg = Config::new(8 * 1024, 1, 1);
        let bad = cfg.with_page_size(4097);
        assert!(bad.is_err());
    }
}
