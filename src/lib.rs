//! stagebuf - Bounded circular byte buffer untuk pipeline media
//!
//! Arsitektur:
//! - `core`: `CircularByteBuffer`, storage (heap / anonymous mmap), error
//! - `network`: TCP relay berbasis mio, satu pasang ring buffer per sesi

pub mod core;
pub mod network;

pub use crate::core::{Backing, BufferConfig, CircularByteBuffer, RingError, RingResult};
