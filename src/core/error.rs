//! Error taxonomy untuk ring buffer
//!
//! Dua jenis kegagalan saja: kapasitas/data tidak cukup, dan alokasi gagal.
//! Semua operasi all-or-nothing: kalau `Err`, state buffer tidak berubah.

use std::io;

use thiserror::Error;

/// Result type yang dipakai oleh seluruh operasi buffer.
pub type RingResult<T> = Result<T, RingError>;

/// Errors produced by [`CircularByteBuffer`](super::CircularByteBuffer) and its storage.
#[derive(Debug, Error)]
pub enum RingError {
    #[error("insufficient space: requested {requested} bytes, {available} free")]
    InsufficientSpace { requested: usize, available: usize },

    #[error("insufficient data: requested {requested} bytes, {available} readable")]
    InsufficientData { requested: usize, available: usize },

    #[error("cannot skip a negative byte count ({0})")]
    NegativeSkip(isize),

    #[error("source and destination are the same buffer")]
    SameBuffer,

    #[error("failed to allocate {capacity} bytes of storage: {source}")]
    Allocation {
        capacity: usize,
        #[source]
        source: io::Error,
    },

    #[error("failed to lock {capacity} bytes of storage in memory: {source}")]
    PageLock {
        capacity: usize,
        #[source]
        source: io::Error,
    },
}

impl RingError {
    /// `true` untuk kegagalan yang hilang sendiri setelah sisi lain membaca/menulis.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RingError::InsufficientSpace { .. } | RingError::InsufficientData { .. }
        )
    }
}

impl From<RingError> for io::Error {
    fn from(err: RingError) -> Self {
        let kind = match &err {
            RingError::InsufficientSpace { .. } | RingError::InsufficientData { .. } => {
                io::ErrorKind::WouldBlock
            }
            RingError::NegativeSkip(_) | RingError::SameBuffer => io::ErrorKind::InvalidInput,
            RingError::Allocation { .. } | RingError::PageLock { .. } => {
                io::ErrorKind::OutOfMemory
            }
        };
        io::Error::new(kind, err)
    }
}
