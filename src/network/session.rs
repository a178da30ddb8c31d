//! Satu sesi relay: client <-> upstream lewat dua ring buffer
//!
//! Setiap arah punya `CircularByteBuffer` sendiri, jadi sisi yang lambat
//! hanya menahan arahnya sendiri. Buffer dialokasikan sekali saat sesi dibuka.

use std::io;
use std::net::Shutdown;

use mio::net::TcpStream;
use mio::{Interest, Registry, Token};

use crate::core::{BufferConfig, CircularByteBuffer};

/// Satu arah aliran data beserta buffer-nya.
#[derive(Debug)]
struct Flow {
    buffer: CircularByteBuffer,
    /// Sumber sudah EOF
    eof: bool,
    /// Write half tujuan sudah ditutup
    shut: bool,
}

impl Flow {
    fn new(capacity: usize, config: BufferConfig) -> io::Result<Self> {
        let buffer = CircularByteBuffer::with_config(config);
        buffer.create(capacity)?;
        Ok(Self {
            buffer,
            eof: false,
            shut: false,
        })
    }

    /// Pindahkan byte dari `from` ke `to` sampai tidak ada progress.
    ///
    /// Edge-triggered: harus terus baca/tulis sampai `WouldBlock`, kalau tidak
    /// event berikutnya tidak akan datang.
    fn pump(&mut self, from: &mut TcpStream, to: &mut TcpStream) -> io::Result<u64> {
        let mut forwarded = 0u64;

        loop {
            let mut progress = false;

            while !self.eof && self.buffer.max_write_size() > 0 {
                match self.buffer.fill_from(from) {
                    Ok(0) => self.eof = true,
                    Ok(_) => progress = true,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(ref e) if would_block(e) => break,
                    Err(e) => return Err(e),
                }
            }

            while self.buffer.max_read_size() > 0 {
                match self.buffer.drain_to(to) {
                    Ok(n) => {
                        forwarded += n as u64;
                        progress = true;
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(ref e) if would_block(e) => break,
                    Err(e) => return Err(e),
                }
            }

            if self.eof && !self.shut && self.buffer.max_read_size() == 0 {
                match to.shutdown(Shutdown::Write) {
                    Ok(()) => {}
                    Err(ref e) if e.kind() == io::ErrorKind::NotConnected => {}
                    Err(e) => return Err(e),
                }
                self.shut = true;
            }

            if !progress {
                return Ok(forwarded);
            }
        }
    }
}

/// Hasil satu putaran pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpReport {
    pub forwarded: u64,
    pub closed: bool,
}

/// Sesi relay: client dan upstream socket plus buffer per arah.
#[derive(Debug)]
pub struct Session {
    client: TcpStream,
    upstream: TcpStream,
    /// client -> upstream
    outbound: Flow,
    /// upstream -> client
    inbound: Flow,
}

impl Session {
    pub fn new(
        client: TcpStream,
        upstream: TcpStream,
        capacity: usize,
        config: BufferConfig,
    ) -> io::Result<Self> {
        Ok(Self {
            client,
            upstream,
            outbound: Flow::new(capacity, config)?,
            inbound: Flow::new(capacity, config)?,
        })
    }

    /// Register kedua socket dengan token masing-masing
    pub fn register(
        &mut self,
        registry: &Registry,
        client_token: Token,
        upstream_token: Token,
    ) -> io::Result<()> {
        let interest = Interest::READABLE | Interest::WRITABLE;
        registry.register(&mut self.client, client_token, interest)?;
        registry.register(&mut self.upstream, upstream_token, interest)
    }

    pub fn deregister(&mut self, registry: &Registry) {
        let _ = registry.deregister(&mut self.client);
        let _ = registry.deregister(&mut self.upstream);
    }

    /// Pump kedua arah. `closed` true setelah kedua arah selesai.
    pub fn pump(&mut self) -> io::Result<PumpReport> {
        let out = self.outbound.pump(&mut self.client, &mut self.upstream)?;
        let back = self.inbound.pump(&mut self.upstream, &mut self.client)?;

        Ok(PumpReport {
            forwarded: out + back,
            closed: self.outbound.shut && self.inbound.shut,
        })
    }

    /// Bytes yang sedang tertahan di kedua buffer
    pub fn buffered(&self) -> usize {
        self.outbound.buffer.max_read_size() + self.inbound.buffer.max_read_size()
    }

    pub fn client(&self) -> &TcpStream {
        &self.client
    }

    pub fn upstream(&self) -> &TcpStream {
        &self.upstream
    }
}

/// Socket belum siap: non-blocking penuh, atau connect belum selesai
#[inline]
fn would_block(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::NotConnected
    )
}
