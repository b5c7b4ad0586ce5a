//! Shared-memory exposure (C6): mirrored double-mapping of a ring's data
//! buffer and a single-page mapping of its stats page.
//!
//! Grounded on the original driver's `remap_pfn_range` called twice (once
//! per half of the mirror) and, on the Rust side, on the raw `libc::mmap`
//! technique used by `anp-perf_events`'s sample ring buffer and the
//! `MmapRaw`-based reader in `jimblandy-perf-event`'s sampler. `memmap2`
//! cannot express the "two mappings of one fd at adjacent, caller-chosen
//! addresses" trick (it has no `MAP_FIXED` control), so the mirror itself
//! is built directly on `libc::mmap`/`munmap` while the single-page stats
//! mapping uses plain `memmap2`.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::ptr::NonNull;

use crate::error::{Error, Result};
use crate::stats::StatsPage;

/// Creates an anonymous, shared, resizable memory object backing one
/// ring's data buffer or stats page. Linux-only (`memfd_create`), matching
/// the teacher's choice to lean on the host `libc` rather than hand-roll a
/// portability shim for a kernel-facing crate.
pub fn create_anon_fd(name: &str, size: usize) -> Result<OwnedFd> {
    let cname = std::ffi::CString::new(name).map_err(|_| Error::InvalidArgument("fd name"))?;
    // SAFETY: `cname` is a valid, NUL-terminated C string for the duration
    // of this call.
    let raw: RawFd = unsafe { libc::memfd_create(cname.as_ptr(), libc::MFD_CLOEXEC) };
    if raw < 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    // SAFETY: `raw` is a valid, just-created, uniquely-owned fd.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };
    // SAFETY: `fd` is valid and open for writing.
    let ret = unsafe { libc::ftruncate(fd.as_raw_fd(), size as libc::off_t) };
    if ret != 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }
    Ok(fd)
}

/// A mirrored double-mapping of `ring_len` bytes: two consecutive virtual
/// ranges backed by the same physical pages, so any contiguous window of
/// length `<= ring_len` starting at an offset `<= ring_len` reads as
/// linear memory (P6).
pub struct MirroredMapping {
    base: NonNull<u8>,
    ring_len: usize,
}

// SAFETY: the mapping is page-backed shared memory; concurrent access is
// synchronized by the stats-page head/tail protocol (§4.1), not by any
// Rust-level aliasing rule this type could enforce itself.
unsafe impl Send for MirroredMapping {}
unsafe impl Sync for MirroredMapping {}

impl MirroredMapping {
    /// Maps `fd` twice, back to back, so `[0, ring_len)` and
    /// `[ring_len, 2*ring_len)` alias the same bytes.
    pub fn map(fd: BorrowedFd<'_>, ring_len: usize) -> Result<Self> {
        let total = ring_len
            .checked_mul(2)
            .ok_or(Error::InvalidArgument("ring_len overflow"))?;

        // Reserve an address range large enough for both halves, so the
        // two MAP_FIXED calls below cannot collide with another mapping.
        // SAFETY: requesting an anonymous, inaccessible reservation.
        let reservation = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                total,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if reservation == libc::MAP_FAILED {
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        let first = unsafe {
            libc::mmap(
                reservation,
                ring_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_FIXED,
                fd.as_raw_fd(),
                0,
            )
        };
        if first == libc::MAP_FAILED {
            unsafe { libc::munmap(reservation, total) };
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        let second_addr = reservation.cast::<u8>().wrapping_add(ring_len).cast::<libc::c_void>();
        let second = unsafe {
            libc::mmap(
                second_addr,
                ring_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_FIXED,
                fd.as_raw_fd(),
                0,
            )
        };
        if second == libc::MAP_FAILED {
            unsafe { libc::munmap(reservation, total) };
            return Err(Error::Io(std::io::Error::last_os_error()));
        }

        let base = NonNull::new(reservation.cast::<u8>()).ok_or(Error::Io(
            std::io::Error::other("mmap returned null"),
        ))?;
        Ok(Self { base, ring_len })
    }

    /// Reads a contiguous window `[offset, offset+len)` of the *logical*
    /// (non-mirrored) ring as a linear byte slice, eliminating wrap (P6).
    /// `offset < ring_len` and `len <= ring_len` are required.
    #[must_use]
    pub fn read_window(&self, offset: usize, len: usize) -> &[u8] {
        debug_assert!(offset < self.ring_len && len <= self.ring_len);
        // SAFETY: the mirror guarantees `[offset, offset+len)` is mapped
        // and backed by live shared memory for any `offset < ring_len`,
        // `len <= ring_len`.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr().add(offset), len) }
    }

    #[must_use]
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    #[must_use]
    pub const fn ring_len(&self) -> usize {
        self.ring_len
    }
}

impl Drop for MirroredMapping {
    fn drop(&mut self) {
        // SAFETY: `base` was obtained from the matching `mmap` reservation
        // of `2 * ring_len` bytes in `map`.
        unsafe {
            libc::munmap(self.base.as_ptr().cast(), self.ring_len * 2);
        }
    }
}

/// Validated kinds of mmap request accepted at the data-device interface
/// (§4.6). Any combination outside these two is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmapKind {
    Stats,
    MirroredData,
}

/// `offset=0, length <= page_size` maps the stats page; `offset=0, length
/// == 2*ring_buf_size` maps the mirrored data buffer and must not request
/// write permission.
pub fn validate_mmap_request(
    offset: usize,
    length: usize,
    writable: bool,
    ring_buf_size: usize,
    page_size: usize,
) -> Result<MmapKind> {
    if offset != 0 {
        return Err(Error::InvalidArgument("mmap offset must be 0"));
    }
    if length <= page_size {
        return Ok(MmapKind::Stats);
    }
    if length == 2 * ring_buf_size {
        if writable {
            return Err(Error::InvalidArgument("data mapping must be read-only"));
        }
        return Ok(MmapKind::MirroredData);
    }
    Err(Error::InvalidArgument("unsupported mmap length"))
}

/// Maps one page containing a [`StatsPage`] for read-write access,
/// re-mappable independently of the mirrored data buffer.
pub struct StatsMapping {
    mmap: memmap2::MmapMut,
}

impl StatsMapping {
    pub fn map(fd: BorrowedFd<'_>, page_size: usize) -> Result<Self> {
        // SAFETY: `fd` is a valid, sized memfd shared-memory object.
        let mmap = unsafe {
            memmap2::MmapOptions::new()
                .len(page_size)
                .map_mut(fd.as_raw_fd())?
        };
        Ok(Self { mmap })
    }

    /// # Safety
    /// The caller must ensure the mapped page was initialized with a
    /// [`StatsPage`] at offset 0 (true for any page created through
    /// [`Ring::new`](crate::ring::Ring::new), which places it there).
    #[must_use]
    pub unsafe fn stats(&self) -> &StatsPage {
        &*self.mmap.as_ptr().cast::<StatsPage>()
    }
}


mod page_size {
    pub fn get() -> usize {
        // SAFETY: `sysconf` with `_SC_PAGESIZE` never fails on a sane host.
        let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if n <= 0 { 4096 } else { n as usize }
    }
}
