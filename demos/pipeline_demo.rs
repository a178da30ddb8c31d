//! Pipeline Demo - Decoder -> Staging -> Output
//!
//! Simulasi tiga tahap pipeline audio:
//! 1. Decoder thread menghasilkan "frame" PCM ke ring buffer decoder
//! 2. Glue thread memindahkan frame ke ring buffer output (`write_from`)
//! 3. Output thread mengkonsumsi dengan ukuran period tetap
//!
//! Di akhir, ring buffer output di-resize dengan pola destroy + create +
//! `copy_from` lewat buffer sementara.
//!
//! Usage:
//!   cargo run --release --example pipeline_demo -- --frames 4000 --mmap

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use stagebuf::{Backing, BufferConfig, CircularByteBuffer, RingResult};

#[derive(Parser, Debug)]
#[command(name = "pipeline_demo", about = "Decoder -> staging -> output over ring buffers")]
struct DemoConfig {
    /// Number of decoder frames
    #[arg(long, default_value_t = 2000)]
    frames: usize,

    /// Frame size in bytes
    #[arg(long = "frame", default_value_t = 1152)]
    frame_size: usize,

    /// Output period size in bytes
    #[arg(long, default_value_t = 512)]
    period: usize,

    /// Back the output buffer with an anonymous mapping
    #[arg(long)]
    mmap: bool,
}

fn main() -> RingResult<()> {
    let config = DemoConfig::parse();
    let backing = if config.mmap {
        Backing::Anonymous
    } else {
        Backing::Heap
    };

    println!("🎵 Stagebuf Pipeline Demo");
    println!("=========================\n");
    println!(
        "  frames: {}  frame: {} B  period: {} B  backing: {}",
        config.frames, config.frame_size, config.period, backing
    );

    let decoded = Arc::new(CircularByteBuffer::with_capacity(config.frame_size * 8)?);
    let output = Arc::new(CircularByteBuffer::with_config(
        BufferConfig::new().with_backing(backing),
    ));
    output.create(config.frame_size * 4)?;

    let total = (config.frames * config.frame_size) as u64;
    let decoder_done = Arc::new(AtomicBool::new(false));
    let moved = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    // 1. Decoder
    let decoder = {
        let decoded = Arc::clone(&decoded);
        let done = Arc::clone(&decoder_done);
        let frame_size = config.frame_size;
        let frames = config.frames;
        thread::spawn(move || {
            let mut frame = vec![0u8; frame_size];
            for n in 0..frames {
                frame.fill((n % 251) as u8);
                while decoded.write(&frame).is_err() {
                    thread::yield_now();
                }
            }
            done.store(true, Ordering::Release);
        })
    };

    // 2. Glue: pindahkan sebanyak yang muat
    let glue = {
        let decoded = Arc::clone(&decoded);
        let output = Arc::clone(&output);
        let done = Arc::clone(&decoder_done);
        let moved = Arc::clone(&moved);
        thread::spawn(move || loop {
            let n = decoded.max_read_size().min(output.max_write_size());
            if n > 0 && output.write_from(&decoded, n).is_ok() {
                moved.fetch_add(n as u64, Ordering::Relaxed);
                continue;
            }
            if done.load(Ordering::Acquire) && decoded.max_read_size() == 0 {
                break;
            }
            thread::yield_now();
        })
    };

    // 3. Output: konsumsi per period, sisa terakhir boleh lebih kecil
    let period_size = config.period.min(output.capacity()).max(1);
    let mut period = vec![0u8; period_size];
    let mut played = 0u64;
    let mut underruns = 0u64;
    while played < total {
        let len = (period_size as u64).min(total - played) as usize;
        match output.read(&mut period[..len]) {
            Ok(()) => played += len as u64,
            Err(e) if e.is_transient() => {
                underruns += 1;
                thread::sleep(Duration::from_micros(50));
            }
            Err(e) => return Err(e),
        }
    }

    decoder.join().ok();
    glue.join().ok();
    let elapsed = start.elapsed();

    println!("\n📊 Result");
    println!("  Played:    {} KB in {:.2?}", played / 1024, elapsed);
    println!("  Moved:     {} KB", moved.load(Ordering::Relaxed) / 1024);
    println!("  Underruns: {}", underruns);
    println!(
        "  Rate:      {:.1} MB/s",
        played as f64 / elapsed.as_secs_f64() / (1024.0 * 1024.0)
    );

    // Resize: tidak ada grow otomatis, pindahkan isi lewat buffer sementara
    let tail = b"tail-of-stream";
    output.write(&tail[..tail.len().min(output.max_write_size())])?;
    let parked = CircularByteBuffer::new();
    parked.copy_from(&output)?;
    output.destroy();
    output.create(config.frame_size * 16)?;
    output.append(&parked)?;
    println!(
        "\n🔁 Output resized to {} B, carried {} B",
        output.capacity(),
        output.max_read_size()
    );

    println!("\n✅ Demo complete!");
    Ok(())
}
