//! Anonymous zero-initialized word arena.
//!
//! Large tables are backed by an anonymous private mapping rather than the
//! allocator: the kernel hands back zero pages, and the pages are touched in
//! parallel (page-striped across the rayon pool) before the counters start,
//! so no worker pays first-touch faults in the middle of counting.

use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
use rayon::prelude::*;

use crate::error::{Error, Result};

/// A fixed-size array of `u64` words over an anonymous mapping.
///
/// The words are exposed as `&[AtomicU64]`; all concurrent access goes
/// through atomic operations on individual words.
pub struct WordArena {
    ptr: NonNull<libc::c_void>,
    words: usize,
    map_len: usize,
}

// The arena is a plain word array; &AtomicU64 access is safe from any thread.
unsafe impl Send for WordArena {}
unsafe impl Sync for WordArena {}

impl WordArena {
    /// Map an arena of at least `words` zeroed 64-bit words and warm its
    /// pages in parallel.
    pub fn new(words: usize) -> Result<Self> {
        let words = words.max(1);
        let page = page_size();
        let map_len = (words * 8).div_ceil(page) * page;
        let length = NonZeroUsize::new(map_len).expect("map length is nonzero");
        let ptr = unsafe {
            mmap_anonymous(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_PRIVATE,
            )
        }
        .map_err(|e| Error::Capacity(format!("cannot map {map_len} bytes: {e}")))?;

        let arena = WordArena {
            ptr: ptr.cast(),
            words,
            map_len,
        };
        arena.warm(page);
        Ok(arena)
    }

    /// Touch one word per page, striped across the rayon pool, to commit
    /// the zero pages before first concurrent use.
    fn warm(&self, page: usize) {
        let page_words = page / 8;
        let words = self.words();
        (0..words.len().div_ceil(page_words))
            .into_par_iter()
            .for_each(|p| {
                words[p * page_words].store(0, Ordering::Relaxed);
            });
    }

    /// Number of words in the arena.
    #[inline]
    pub fn len(&self) -> usize {
        self.words
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words == 0
    }

    /// The backing words as atomics.
    #[inline]
    pub fn words(&self) -> &[AtomicU64] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const AtomicU64, self.words) }
    }
}

impl Drop for WordArena {
    fn drop(&mut self) {
        // Failure here leaks the mapping; nothing useful can be done.
        let _ = unsafe { munmap(self.ptr, self.map_len) };
    }
}

fn page_size() -> usize {
    let p = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if p > 0 {
        p as usize
    } else {
        4096
    }
}
