//! Relay dengan event-driven I/O
//!
//! Menggunakan mio untuk non-blocking I/O multiplexing. Setiap client yang
//! masuk dihubungkan ke satu upstream; data mengalir lewat dua
//! `CircularByteBuffer` per sesi (lihat `session.rs`).

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, info, warn};

use super::session::Session;
use crate::core::BufferConfig;

const LISTENER_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);
const FIRST_SESSION_TOKEN: usize = 2;
const EVENTS_CAPACITY: usize = 1024;

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen: SocketAddr,
    pub upstream: SocketAddr,
    /// Kapasitas ring buffer per arah, per sesi
    pub buffer_capacity: usize,
    pub buffer: BufferConfig,
    /// SO_SNDBUF / SO_RCVBUF, `None` = default OS
    pub socket_buffer_size: Option<usize>,
    pub connect_timeout: Duration,
    pub max_sessions: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 7700)),
            upstream: SocketAddr::from(([127, 0, 0, 1], 7701)),
            buffer_capacity: 64 * 1024,
            buffer: BufferConfig::default(),
            socket_buffer_size: None,
            connect_timeout: Duration::from_secs(3),
            max_sessions: 1024,
        }
    }
}

/// Relay statistics
#[derive(Debug, Default)]
pub struct RelayStats {
    pub sessions_total: AtomicU64,
    pub sessions_active: AtomicU64,
    pub sessions_rejected: AtomicU64,
    pub bytes_forwarded: AtomicU64,
    pub errors: AtomicU64,
}

impl RelayStats {
    pub fn log_summary(&self, uptime: Duration) {
        let bytes = self.bytes_forwarded.load(Ordering::Relaxed);
        let rate = bytes as f64 / uptime.as_secs_f64().max(f64::EPSILON);

        info!(
            uptime_s = uptime.as_secs_f64(),
            sessions_total = self.sessions_total.load(Ordering::Relaxed),
            sessions_active = self.sessions_active.load(Ordering::Relaxed),
            sessions_rejected = self.sessions_rejected.load(Ordering::Relaxed),
            bytes_forwarded = bytes,
            kib_per_sec = rate / 1024.0,
            errors = self.errors.load(Ordering::Relaxed),
            "relay stats"
        );
    }
}

/// Handle untuk menghentikan relay dan membaca statistik dari thread lain.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    waker: Arc<Waker>,
    stop: Arc<AtomicBool>,
    stats: Arc<RelayStats>,
}

impl RelayHandle {
    /// Minta event loop berhenti. `run()` kembali setelah putaran berikutnya.
    pub fn shutdown(&self) -> io::Result<()> {
        self.stop.store(true, Ordering::Release);
        self.waker.wake()
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }
}

/// TCP relay: client -> ring buffer -> upstream, dan sebaliknya.
pub struct Relay {
    poll: Poll,
    listener: TcpListener,
    waker: Arc<Waker>,
    stop: Arc<AtomicBool>,
    stats: Arc<RelayStats>,
    sessions: HashMap<usize, Session>,
    next_session: usize,
    /// Jumlah sesi saat accept berhenti karena fd/memori habis
    accept_paused_at: Option<usize>,
    config: RelayConfig,
}

/// Apa yang dilakukan accept loop setelah `accept()` gagal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptAction {
    /// Backlog kosong
    Drained,
    /// Gagal untuk satu koneksi saja, lanjut accept berikutnya
    Retry,
    /// Resource habis, tunggu sampai ada sesi yang ditutup
    Pause,
    Fatal,
}

fn accept_action(e: &io::Error) -> AcceptAction {
    match e.kind() {
        io::ErrorKind::WouldBlock => AcceptAction::Drained,
        io::ErrorKind::Interrupted
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset => AcceptAction::Retry,
        io::ErrorKind::OutOfMemory => AcceptAction::Pause,
        _ if is_resource_exhausted(e) => AcceptAction::Pause,
        _ => AcceptAction::Fatal,
    }
}

#[cfg(unix)]
fn is_resource_exhausted(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
    )
}

#[cfg(not(unix))]
fn is_resource_exhausted(_e: &io::Error) -> bool {
    false
}

impl Relay {
    /// Bind listener dan siapkan poll
    pub fn bind(config: RelayConfig) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(config.listen)?;

        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);

        Ok(Self {
            poll,
            listener,
            waker,
            stop: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(RelayStats::default()),
            sessions: HashMap::new(),
            next_session: 0,
            accept_paused_at: None,
            config,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            waker: Arc::clone(&self.waker),
            stop: Arc::clone(&self.stop),
            stats: Arc::clone(&self.stats),
        }
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Run relay event loop sampai `RelayHandle::shutdown` dipanggil
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        let started = Instant::now();

        info!(
            listen = %self.local_addr()?,
            upstream = %self.config.upstream,
            buffer_capacity = self.config.buffer_capacity,
            backing = %self.config.buffer.backing,
            "relay listening"
        );

        while !self.stop.load(Ordering::Acquire) {
            match self.poll.poll(&mut events, None) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER_TOKEN => self.accept_sessions()?,
                    WAKER_TOKEN => {}
                    token => self.service(session_id(token)),
                }
            }

            // Listener edge-triggered: backlog yang tertahan tidak memicu
            // event baru, jadi coba lagi begitu ada fd yang dilepas
            if let Some(paused_at) = self.accept_paused_at {
                if self.sessions.len() < paused_at {
                    self.accept_paused_at = None;
                    self.accept_sessions()?;
                }
            }
        }

        let ids: Vec<usize> = self.sessions.keys().copied().collect();
        for id in ids {
            self.close_session(id, None);
        }

        info!("relay stopped");
        self.stats.log_summary(started.elapsed());
        Ok(())
    }

    /// Accept semua koneksi yang pending
    fn accept_sessions(&mut self) -> io::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((client, addr)) => {
                    if self.sessions.len() >= self.config.max_sessions {
                        self.stats.sessions_rejected.fetch_add(1, Ordering::Relaxed);
                        warn!(%addr, max = self.config.max_sessions, "session limit reached, rejecting");
                        continue;
                    }

                    match self.open_session(client) {
                        Ok(id) => debug!(%addr, session = id, "session opened"),
                        Err(e) => {
                            self.stats.errors.fetch_add(1, Ordering::Relaxed);
                            warn!(%addr, error = %e, "failed to open session");
                        }
                    }
                }
                Err(e) => match accept_action(&e) {
                    AcceptAction::Drained => break,
                    AcceptAction::Retry => {
                        if e.kind() != io::ErrorKind::Interrupted {
                            self.stats.errors.fetch_add(1, Ordering::Relaxed);
                            debug!(error = %e, "accept failed, retrying");
                        }
                    }
                    AcceptAction::Pause => {
                        self.stats.errors.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            error = %e,
                            sessions = self.sessions.len(),
                            "accept paused until a session closes"
                        );
                        self.accept_paused_at = Some(self.sessions.len());
                        break;
                    }
                    AcceptAction::Fatal => return Err(e),
                },
            }
        }
        Ok(())
    }

    fn open_session(&mut self, client: TcpStream) -> io::Result<usize> {
        // Connect blocking dengan timeout, lalu non-blocking untuk event loop
        let upstream =
            std::net::TcpStream::connect_timeout(&self.config.upstream, self.config.connect_timeout)?;
        upstream.set_nonblocking(true)?;
        let upstream = TcpStream::from_std(upstream);

        client.set_nodelay(true)?;
        upstream.set_nodelay(true)?;

        let mut session = Session::new(
            client,
            upstream,
            self.config.buffer_capacity,
            self.config.buffer,
        )?;

        if let Some(size) = self.config.socket_buffer_size {
            tune_socket_buffers(session.client(), size);
            tune_socket_buffers(session.upstream(), size);
        }

        let id = self.next_session;
        self.next_session += 1;
        let (client_token, upstream_token) = session_tokens(id);
        session.register(self.poll.registry(), client_token, upstream_token)?;

        self.sessions.insert(id, session);
        self.stats.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.stats.sessions_active.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    /// Handle readable/writable event untuk satu sesi
    fn service(&mut self, id: usize) {
        let session = match self.sessions.get_mut(&id) {
            Some(s) => s,
            None => return,
        };

        match session.pump() {
            Ok(report) => {
                self.stats
                    .bytes_forwarded
                    .fetch_add(report.forwarded, Ordering::Relaxed);
                if report.closed {
                    self.close_session(id, None);
                }
            }
            Err(e) => self.close_session(id, Some(e)),
        }
    }

    fn close_session(&mut self, id: usize, error: Option<io::Error>) {
        let Some(mut session) = self.sessions.remove(&id) else {
            return;
        };
        session.deregister(self.poll.registry());
        self.stats.sessions_active.fetch_sub(1, Ordering::Relaxed);

        match error {
            Some(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(session = id, error = %e, buffered = session.buffered(), "session aborted");
            }
            None => debug!(session = id, "session closed"),
        }
    }
}

/// Token client = 2 + 2*id, upstream = 3 + 2*id
#[inline]
fn session_tokens(id: usize) -> (Token, Token) {
    let base = FIRST_SESSION_TOKEN + 2 * id;
    (Token(base), Token(base + 1))
}

#[inline]
fn session_id(token: Token) -> usize {
    (token.0 - FIRST_SESSION_TOKEN) / 2
}

/// Set socket buffer sizes untuk throughput.
/// Ignore errors - not all platforms support this.
#[cfg(unix)]
fn tune_socket_buffers(stream: &TcpStream, size: usize) {
    use std::os::unix::io::AsRawFd;

    let fd = stream.as_raw_fd();
    let optval = libc::c_int::try_from(size).unwrap_or(libc::c_int::MAX);
    for opt in [libc::SO_SNDBUF, libc::SO_RCVBUF] {
        // SAFETY: fd valid selama stream hidup, optval berukuran c_int
        unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                opt,
                &optval as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            );
        }
    }
}

#[cfg(not(unix))]
fn tune_socket_buffers(_stream: &TcpStream, _size: usize) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_tokens_round_trip() {
        for id in [0usize, 1, 7, 1000] {
            let (client, upstream) = session_tokens(id);
            assert_eq!(session_id(client), id);
            assert_eq!(session_id(upstream), id);
            assert!(client != LISTENER_TOKEN && client != WAKER_TOKEN);
        }
    }

    #[test]
    fn test_accept_action() {
        let kind = |k: io::ErrorKind| accept_action(&io::Error::from(k));
        assert_eq!(kind(io::ErrorKind::WouldBlock), AcceptAction::Drained);
        assert_eq!(kind(io::ErrorKind::Interrupted), AcceptAction::Retry);
        assert_eq!(kind(io::ErrorKind::ConnectionAborted), AcceptAction::Retry);
        assert_eq!(kind(io::ErrorKind::InvalidInput), AcceptAction::Fatal);
    }

    #[cfg(unix)]
    #[test]
    fn test_fd_exhaustion_pauses_accept() {
        for errno in [libc::EMFILE, libc::ENFILE, libc::ENOBUFS, libc::ENOMEM] {
            let e = io::Error::from_raw_os_error(errno);
            assert_eq!(accept_action(&e), AcceptAction::Pause, "errno {}", errno);
        }
        let e = io::Error::from_raw_os_error(libc::EBADF);
        assert_eq!(accept_action(&e), AcceptAction::Fatal);
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.buffer_capacity, 64 * 1024);
        assert_eq!(config.max_sessions, 1024);
        assert!(config.socket_buffer_size.is_none());
    }

    #[test]
    fn test_shutdown_before_run() {
        let config = RelayConfig {
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..RelayConfig::default()
        };
        let mut relay = Relay::bind(config).unwrap();
        relay.handle().shutdown().unwrap();
        relay.run().unwrap();
        assert_eq!(relay.stats().sessions_total.load(Ordering::Relaxed), 0);
    }
}
