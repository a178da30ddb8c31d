//! Network Layer: TCP relay di atas ring buffer
//!
//! Menggunakan mio untuk non-blocking I/O (epoll/kqueue/IOCP).
//! Setiap sesi punya dua `CircularByteBuffer` (satu per arah), sehingga
//! client yang lambat hanya menahan arahnya sendiri.

mod relay;
mod session;

pub use relay::{Relay, RelayConfig, RelayHandle, RelayStats};
pub use session::{PumpReport, Session};
