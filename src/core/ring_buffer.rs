//! Bounded Circular Byte Buffer
//!
//! FIFO byte dengan kapasitas tetap, read/write cursor terpisah.
//! Dipakai untuk memisahkan thread producer (decoder, network receiver)
//! dari thread consumer (renderer, audio output).
//!
//! Prinsip desain:
//! - All-or-nothing: operasi sukses penuh atau `Err` tanpa perubahan state
//! - Non-blocking: tidak pernah menunggu ruang/data, langsung `Err`
//! - Satu mutex per instance, dipegang selama satu operasi publik
//! - Tidak pernah grow sendiri: kapasitas hanya berubah lewat `create`

use std::io::{self, IoSlice, IoSliceMut, Read, Write};
use std::ptr;

use parking_lot::Mutex;

use super::config::BufferConfig;
use super::error::{RingError, RingResult};
use super::storage::Storage;

/// State yang dilindungi mutex. Semua aritmatika cursor ada di sini.
#[derive(Debug, Default)]
struct RingState {
    storage: Option<Storage>,
    read_pos: usize,
    write_pos: usize,
    filled: usize,
}

impl RingState {
    #[inline(always)]
    fn capacity(&self) -> usize {
        self.storage.as_ref().map_or(0, Storage::len)
    }

    #[inline(always)]
    fn free(&self) -> usize {
        self.capacity() - self.filled
    }

    fn reset(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.filled = 0;
    }

    fn write_slice(&mut self, src: &[u8]) -> RingResult<()> {
        let available = self.free();
        if src.len() > available {
            return Err(RingError::InsufficientSpace {
                requested: src.len(),
                available,
            });
        }
        if src.is_empty() {
            return Ok(());
        }

        let write_pos = self.write_pos;
        let Some(storage) = self.storage.as_mut() else {
            return Err(RingError::InsufficientSpace {
                requested: src.len(),
                available: 0,
            });
        };
        let buf = storage.as_mut_slice();
        let capacity = buf.len();

        // Handle wraparound: [write_pos, capacity) lalu [0, sisa)
        let first = (capacity - write_pos).min(src.len());
        buf[write_pos..write_pos + first].copy_from_slice(&src[..first]);
        if first < src.len() {
            buf[..src.len() - first].copy_from_slice(&src[first..]);
        }

        self.write_pos = (write_pos + src.len()) % capacity;
        self.filled += src.len();
        Ok(())
    }

    fn read_slice(&mut self, dst: &mut [u8]) -> RingResult<()> {
        self.check_readable(dst.len())?;
        let (first, second) = self.readable(dst.len());
        dst[..first.len()].copy_from_slice(first);
        dst[first.len()..].copy_from_slice(second);
        self.consume(dst.len());
        Ok(())
    }

    fn check_readable(&self, requested: usize) -> RingResult<()> {
        if requested > self.filled {
            return Err(RingError::InsufficientData {
                requested,
                available: self.filled,
            });
        }
        Ok(())
    }

    /// `len` byte pertama dari region unread, sebagai maksimal dua slice.
    /// Caller wajib memastikan `len <= filled`.
    fn readable(&self, len: usize) -> (&[u8], &[u8]) {
        let Some(storage) = self.storage.as_ref() else {
            return (&[], &[]);
        };
        if len == 0 {
            return (&[], &[]);
        }
        let buf = storage.as_slice();
        let first = (buf.len() - self.read_pos).min(len);
        (
            &buf[self.read_pos..self.read_pos + first],
            &buf[..len - first],
        )
    }

    /// Seluruh region kosong, mulai dari `write_pos`.
    fn writable(&mut self) -> (&mut [u8], &mut [u8]) {
        let free = self.free();
        let write_pos = self.write_pos;
        let Some(storage) = self.storage.as_mut() else {
            return (&mut [], &mut []);
        };
        if free == 0 {
            return (&mut [], &mut []);
        }
        let buf = storage.as_mut_slice();
        let first = (buf.len() - write_pos).min(free);
        let (head, tail) = buf.split_at_mut(write_pos);
        (&mut tail[..first], &mut head[..free - first])
    }

    /// Majukan read cursor. Caller wajib memastikan `len <= filled`.
    fn consume(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        self.read_pos = (self.read_pos + len) % self.capacity();
        self.filled -= len;
    }

    /// Majukan write cursor. Caller wajib memastikan `len <= free`.
    fn commit(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        self.write_pos = (self.write_pos + len) % self.capacity();
        self.filled += len;
    }
}

/// Bounded circular byte buffer, aman dipakai bersama oleh beberapa thread.
///
/// Setiap method publik mengambil mutex internal selama durasi penuh
/// operasi, jadi satu panggilan atomic terhadap panggilan lain pada
/// instance yang sama. Tidak ada blocking: ruang atau data yang kurang
/// langsung dilaporkan sebagai `Err`, caller yang memutuskan retry.
///
/// # Cross-buffer transfers
///
/// `write_from`, `read_into`, `append` dan `copy_from` mengunci buffer
/// sumber lalu buffer tujuan. Tidak ada lock ordering global: transfer
/// `A -> B` dan `B -> A` secara bersamaan dari thread berbeda bisa deadlock.
/// Hindari pola itu di sisi caller.
///
/// ```
/// use stagebuf::CircularByteBuffer;
///
/// let rb = CircularByteBuffer::with_capacity(8).unwrap();
/// rb.write(b"ABCDEF").unwrap();
///
/// let mut out = [0u8; 4];
/// rb.read(&mut out).unwrap();
/// assert_eq!(&out, b"ABCD");
/// assert_eq!(rb.max_read_size(), 2);
/// ```
#[derive(Debug, Default)]
pub struct CircularByteBuffer {
    state: Mutex<RingState>,
    config: BufferConfig,
}

impl CircularByteBuffer {
    /// Buffer kosong tanpa storage (`capacity() == 0`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer kosong yang akan mengalokasikan storage sesuai `config`.
    pub fn with_config(config: BufferConfig) -> Self {
        Self {
            state: Mutex::new(RingState::default()),
            config,
        }
    }

    /// Shortcut untuk `new()` + `create(capacity)`.
    pub fn with_capacity(capacity: usize) -> RingResult<Self> {
        let rb = Self::new();
        rb.create(capacity)?;
        Ok(rb)
    }

    pub fn config(&self) -> BufferConfig {
        self.config
    }

    /// Mengalokasikan storage baru berukuran tepat `capacity` bytes.
    ///
    /// Storage lama (kalau ada) diganti dan semua cursor di-reset.
    /// Kalau alokasi gagal, state sebelumnya tetap utuh.
    pub fn create(&self, capacity: usize) -> RingResult<()> {
        let mut state = self.state.lock();
        let storage = Storage::allocate(capacity, &self.config)?;
        state.storage = Some(storage);
        state.reset();
        Ok(())
    }

    /// Melepas storage dan kembali ke state awal. Idempotent.
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        state.storage = None;
        state.reset();
    }

    /// Reset cursor tanpa realokasi. Isi lama tidak dihapus secara fisik.
    pub fn clear(&self) {
        self.state.lock().reset();
    }

    /// `true` setelah `create` (termasuk `create(0)`), `false` setelah `destroy`.
    pub fn is_allocated(&self) -> bool {
        self.state.lock().storage.is_some()
    }

    /// Menulis seluruh `data` atau tidak sama sekali.
    #[inline]
    pub fn write(&self, data: &[u8]) -> RingResult<()> {
        self.state.lock().write_slice(data)
    }

    /// Mengisi seluruh `out` dari data unread atau tidak sama sekali.
    #[inline]
    pub fn read(&self, out: &mut [u8]) -> RingResult<()> {
        self.state.lock().read_slice(out)
    }

    /// Membuang `size` byte unread. Nilai negatif selalu ditolak.
    pub fn skip(&self, size: isize) -> RingResult<()> {
        let size = usize::try_from(size).map_err(|_| RingError::NegativeSkip(size))?;
        let mut state = self.state.lock();
        state.check_readable(size)?;
        state.consume(size);
        Ok(())
    }

    /// Memindahkan `size` byte dari region unread `source` ke buffer ini.
    ///
    /// Kalau buffer ini belum punya storage, dialokasikan dulu tepat
    /// `size` bytes. Byte yang dipindah dikonsumsi dari `source`.
    ///
    /// Data `source` dicek sebelum alokasi: kalau `source` tidak punya
    /// `size` byte, transfer gagal dan buffer ini tetap tanpa storage.
    pub fn write_from(&self, source: &CircularByteBuffer, size: usize) -> RingResult<()> {
        if ptr::eq(self, source) {
            return Err(RingError::SameBuffer);
        }

        let mut src = source.state.lock();
        src.check_readable(size)?;

        let mut dst = self.state.lock();
        if dst.storage.is_none() {
            dst.storage = Some(Storage::allocate(size, &self.config)?);
            dst.reset();
        }

        let available = dst.free();
        if size > available {
            return Err(RingError::InsufficientSpace {
                requested: size,
                available,
            });
        }

        // Maksimal dua segmen, split di titik wraparound sumber
        let (first, second) = src.readable(size);
        dst.write_slice(first)?;
        dst.write_slice(second)?;
        src.consume(size);
        Ok(())
    }

    /// Kebalikan `write_from`: memindahkan `size` byte dari buffer ini ke `dest`.
    #[inline]
    pub fn read_into(&self, dest: &CircularByteBuffer, size: usize) -> RingResult<()> {
        dest.write_from(self, size)
    }

    /// Memindahkan semua byte unread `source` ke buffer ini.
    ///
    /// Returns jumlah byte yang dipindah; `Ok(0)` kalau `source` kosong.
    pub fn append(&self, source: &CircularByteBuffer) -> RingResult<usize> {
        let size = source.max_read_size();
        self.write_from(source, size)?;
        Ok(size)
    }

    /// `clear()` lalu `append(source)`: buffer ini berisi tepat isi unread
    /// `source`, dan `source` terkuras.
    pub fn copy_from(&self, source: &CircularByteBuffer) -> RingResult<usize> {
        if ptr::eq(self, source) {
            return Err(RingError::SameBuffer);
        }
        self.clear();
        self.append(source)
    }

    /// Kapasitas storage dalam bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity()
    }

    #[inline]
    pub fn read_pos(&self) -> usize {
        self.state.lock().read_pos
    }

    #[inline]
    pub fn write_pos(&self) -> usize {
        self.state.lock().write_pos
    }

    /// Jumlah byte yang bisa dibaca
    #[inline]
    pub fn max_read_size(&self) -> usize {
        self.state.lock().filled
    }

    /// Jumlah byte yang bisa ditulis
    #[inline]
    pub fn max_write_size(&self) -> usize {
        self.state.lock().free()
    }

    /// Akses zero-copy ke data unread tanpa mengkonsumsi.
    ///
    /// `f` menerima region unread dalam urutan logis sebagai dua slice;
    /// slice kedua kosong kalau data tidak wraparound.
    ///
    /// `f` berjalan sambil memegang mutex buffer ini: operasi lain pada
    /// buffer yang sama menunggu sampai `f` selesai, dan memanggil method
    /// buffer ini dari dalam `f` akan deadlock.
    pub fn with_readable<R>(&self, f: impl FnOnce(&[u8], &[u8]) -> R) -> R {
        let state = self.state.lock();
        let (first, second) = state.readable(state.filled);
        f(first, second)
    }

    /// Seperti `with_readable`, lalu mengkonsumsi jumlah byte yang
    /// dikembalikan `f`.
    ///
    /// Sama seperti `with_readable`, `f` berjalan di bawah mutex; jangan
    /// memanggil method buffer ini dari dalam `f` (deadlock).
    pub fn consume_with(&self, f: impl FnOnce(&[u8], &[u8]) -> usize) -> RingResult<usize> {
        let mut state = self.state.lock();
        let used = {
            let (first, second) = state.readable(state.filled);
            f(first, second)
        };
        state.check_readable(used)?;
        state.consume(used);
        Ok(used)
    }

    /// Producer zero-copy: `f` menulis langsung ke region kosong dan
    /// mengembalikan jumlah byte yang diisi, yang lalu di-commit.
    ///
    /// `f` berjalan di bawah mutex; jangan memanggil method buffer ini dari
    /// dalam `f` (deadlock), dan jaga `f` tetap singkat.
    pub fn produce_with(
        &self,
        f: impl FnOnce(&mut [u8], &mut [u8]) -> usize,
    ) -> RingResult<usize> {
        let mut state = self.state.lock();
        let available = state.free();
        let produced = {
            let (first, second) = state.writable();
            f(first, second)
        };
        if produced > available {
            return Err(RingError::InsufficientSpace {
                requested: produced,
                available,
            });
        }
        state.commit(produced);
        Ok(produced)
    }

    /// Satu vectored read dari `reader` ke region kosong.
    ///
    /// `Ok(0)` berarti EOF atau buffer penuh; cek `max_write_size()` untuk
    /// membedakan keduanya.
    ///
    /// `reader` dipanggil sambil memegang mutex, jadi harus non-blocking
    /// (socket mio, `set_nonblocking(true)`, atau slice in-memory).
    /// Reader yang blocking menahan semua operasi lain pada buffer ini,
    /// termasuk consumer yang membaca data yang sudah ada. `WouldBlock`
    /// dari reader diteruskan tanpa mengubah state.
    pub fn fill_from<R: Read + ?Sized>(&self, reader: &mut R) -> io::Result<usize> {
        let mut state = self.state.lock();
        let read = {
            let (first, second) = state.writable();
            if first.is_empty() {
                return Ok(0);
            }
            let mut bufs = [IoSliceMut::new(first), IoSliceMut::new(second)];
            reader.read_vectored(&mut bufs)?
        };
        state.commit(read);
        Ok(read)
    }

    /// Satu vectored write dari data unread ke `writer`, mengkonsumsi
    /// byte yang berhasil ditulis.
    ///
    /// Seperti `fill_from`, `writer` dipanggil di bawah mutex dan harus
    /// non-blocking. `WouldBlock` diteruskan tanpa mengkonsumsi apa pun.
    pub fn drain_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<usize> {
        let mut state = self.state.lock();
        let filled = state.filled;
        if filled == 0 {
            return Ok(0);
        }
        let written = {
            let (first, second) = state.readable(filled);
            let bufs = [IoSlice::new(first), IoSlice::new(second)];
            writer.write_vectored(&bufs)?
        };
        if written == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "writer accepted no bytes",
            ));
        }
        state.consume(written.min(filled));
        Ok(written)
    }

    /// Raw base pointer storage, **tidak** di-offset oleh cursor dan
    /// **tidak** dilindungi mutex. Null kalau belum ada storage.
    ///
    /// Escape hatch untuk akses chunked tanpa copy. Dereference pointer ini
    /// adalah tanggung jawab caller (`unsafe`): caller harus menghitung
    /// wraparound sendiri dengan `read_pos()`/`write_pos()`, melakukan
    /// sinkronisasi sendiri, dan pointer invalid setelah `create`/`destroy`.
    /// Gunakan `with_readable`/`produce_with` kalau memungkinkan.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.state
            .lock()
            .storage
            .as_mut()
            .map_or(ptr::null_mut(), Storage::as_mut_ptr)
    }
}
