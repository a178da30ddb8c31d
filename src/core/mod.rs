//! Core module: Bounded Circular Byte Buffer
//!
//! Prinsip desain:
//! - Bounded: kapasitas tetap, tidak pernah grow sendiri
//! - All-or-nothing: tidak ada partial read/write
//! - No-Allocation: storage dialokasikan sekali saat `create`

mod config;
mod error;
mod ring_buffer;
mod storage;

pub use config::{Backing, BufferConfig};
pub use error::{RingError, RingResult};
pub use ring_buffer::CircularByteBuffer;
pub use storage::Storage;
