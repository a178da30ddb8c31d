//! Backing storage untuk ring buffer
//!
//! Satu alokasi per buffer, dimiliki secara eksklusif:
//! - Heap: `Box<[u8]>`, alokasi gagal dilaporkan (bukan abort)
//! - Anonymous mmap: langsung dari kernel, tidak lewat global allocator
//! - Opsional `mlock` supaya consumer real-time tidak kena page fault

use std::io;

use memmap2::MmapMut;

use super::config::{Backing, BufferConfig};
use super::error::{RingError, RingResult};

enum Region {
    Heap(Box<[u8]>),
    Mapped(MmapMut),
}

/// Fixed-size byte storage. Ukuran tidak pernah berubah setelah dialokasikan.
pub struct Storage {
    region: Region,
    locked: bool,
}

impl Storage {
    /// Mengalokasikan storage berukuran tepat `capacity` bytes.
    ///
    /// Kapasitas nol selalu menjadi slice heap kosong (tidak di-map, tidak di-lock).
    pub fn allocate(capacity: usize, config: &BufferConfig) -> RingResult<Self> {
        if capacity == 0 {
            return Ok(Self {
                region: Region::Heap(Box::default()),
                locked: false,
            });
        }

        let region = match config.backing {
            Backing::Heap => Region::Heap(heap_region(capacity)?),
            Backing::Anonymous => Region::Mapped(
                MmapMut::map_anon(capacity)
                    .map_err(|source| RingError::Allocation { capacity, source })?,
            ),
        };

        let mut storage = Self {
            region,
            locked: false,
        };

        if config.lock_pages {
            let slice = storage.as_mut_slice();
            lock_region(slice.as_ptr(), slice.len())
                .map_err(|source| RingError::PageLock { capacity, source })?;
            storage.locked = true;
        }

        Ok(storage)
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        match &self.region {
            Region::Heap(bytes) => &bytes[..],
            Region::Mapped(mmap) => &mmap[..],
        }
    }

    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.region {
            Region::Heap(bytes) => &mut bytes[..],
            Region::Mapped(mmap) => &mut mmap[..],
        }
    }

    /// Base pointer storage. Stabil sampai storage di-drop.
    #[inline(always)]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.as_mut_slice().as_mut_ptr()
    }

    pub fn backing(&self) -> Backing {
        match self.region {
            Region::Heap(_) => Backing::Heap,
            Region::Mapped(_) => Backing::Anonymous,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if self.locked {
            let slice = self.as_slice();
            unlock_region(slice.as_ptr(), slice.len());
        }
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("len", &self.len())
            .field("backing", &self.backing())
            .field("locked", &self.locked)
            .finish()
    }
}

fn heap_region(capacity: usize) -> RingResult<Box<[u8]>> {
    let mut bytes = Vec::new();
    bytes.try_reserve_exact(capacity).map_err(|err| RingError::Allocation {
        capacity,
        source: io::Error::new(io::ErrorKind::OutOfMemory, err),
    })?;
    bytes.resize(capacity, 0);
    Ok(bytes.into_boxed_slice())
}

#[cfg(unix)]
fn lock_region(ptr: *const u8, len: usize) -> io::Result<()> {
    // SAFETY: ptr..ptr+len adalah region milik Storage yang masih hidup
    let rc = unsafe { libc::mlock(ptr as *const libc::c_void, len) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn lock_region(_ptr: *const u8, _len: usize) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "page locking is only available on unix",
    ))
}

#[cfg(unix)]
fn unlock_region(ptr: *const u8, len: usize) {
    // SAFETY: region yang sama dengan yang sebelumnya di-mlock
    unsafe {
        libc::munlock(ptr as *const libc::c_void, len);
    }
}

#[cfg(not(unix))]
fn unlock_region(_ptr: *const u8, _len: usize) {}
