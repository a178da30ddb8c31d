//! Konfigurasi alokasi storage buffer

use std::fmt;
use std::str::FromStr;

/// Jenis memori yang menampung storage buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backing {
    /// `Box<[u8]>` dari global allocator
    #[default]
    Heap,
    /// Anonymous mmap, di luar heap allocator (cocok untuk buffer besar)
    Anonymous,
}

impl fmt::Display for Backing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backing::Heap => f.write_str("heap"),
            Backing::Anonymous => f.write_str("mmap"),
        }
    }
}

impl FromStr for Backing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "heap" => Ok(Backing::Heap),
            "mmap" | "anonymous" => Ok(Backing::Anonymous),
            other => Err(format!("unknown backing '{other}' (expected heap or mmap)")),
        }
    }
}

/// Cara sebuah [`CircularByteBuffer`](super::CircularByteBuffer) mengalokasikan storage.
///
/// Dipakai untuk `create()` eksplisit maupun alokasi otomatis saat
/// buffer kosong menerima transfer dari buffer lain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferConfig {
    pub backing: Backing,
    /// `mlock` storage supaya thread real-time tidak kena page fault
    pub lock_pages: bool,
}

impl BufferConfig {
    pub const fn new() -> Self {
        Self {
            backing: Backing::Heap,
            lock_pages: false,
        }
    }

    pub const fn with_backing(mut self, backing: Backing) -> Self {
        self.backing = backing;
        self
    }

    pub const fn with_locked_pages(mut self, lock_pages: bool) -> Self {
        self.lock_pages = lock_pages;
        self
    }
}
