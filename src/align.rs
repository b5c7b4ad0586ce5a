//! Cache-line padding to keep producer- and consumer-owned atomics from
//! false-sharing a cache line, matching the teacher's `CacheAligned<T>`.

use std::ops::Deref;

/// Most x86_64/ARM64 server parts use 64-byte lines but some Intel parts
/// prefetch in 128-byte pairs; 128 is the conservative choice the teacher
/// also settled on.
#[repr(align(128))]
#[derive(Debug, Default)]
pub struct CacheAligned<T>(pub T);

impl<T> Deref for CacheAligned<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> CacheAligned<T> {
    pub const fn new(value: T) -> Self {
        Self(value)
    }
}
