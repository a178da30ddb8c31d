//! Skenario deterministik untuk CircularByteBuffer
//!
//! Boundary, wraparound, dan transfer antar buffer.

use rstest::*;
use stagebuf::{Backing, BufferConfig, CircularByteBuffer, RingError};

fn buffer_at(capacity: usize, cursor: usize) -> CircularByteBuffer {
    let rb = CircularByteBuffer::with_capacity(capacity).unwrap();
    if cursor > 0 {
        rb.write(&vec![0u8; cursor]).unwrap();
        rb.skip(cursor as isize).unwrap();
    }
    rb
}

#[test]
fn wraparound_scenario_from_decoder_feed() {
    let rb = CircularByteBuffer::new();
    rb.create(8).unwrap();

    rb.write(b"ABCDEF").unwrap();
    assert_eq!(rb.max_read_size(), 6);

    let mut out = [0u8; 4];
    rb.read(&mut out).unwrap();
    assert_eq!(&out, b"ABCD");
    assert_eq!(rb.max_read_size(), 2);

    let before = (rb.read_pos(), rb.write_pos(), rb.max_read_size());
    assert!(matches!(
        rb.write(b"GHIJKL"),
        Err(RingError::InsufficientSpace { requested: 6, .. })
    ));
    assert_eq!(before, (rb.read_pos(), rb.write_pos(), rb.max_read_size()));

    rb.write(b"GH").unwrap();
    rb.read(&mut out).unwrap();
    assert_eq!(&out, b"EFGH");
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(8)]
#[case(4096)]
fn create_reports_empty_buffer(#[case] capacity: usize) {
    let rb = CircularByteBuffer::with_capacity(capacity).unwrap();
    assert_eq!(rb.capacity(), capacity);
    assert_eq!(rb.max_read_size(), 0);
    assert_eq!(rb.max_write_size(), capacity);
}

#[rstest]
#[case(8, 0)]
#[case(8, 3)]
#[case(8, 7)]
#[case(13, 12)]
fn exact_fill_then_one_more_fails(#[case] capacity: usize, #[case] cursor: usize) {
    let rb = buffer_at(capacity, cursor);
    let data = vec![0x5Au8; rb.max_write_size()];
    rb.write(&data).unwrap();
    assert_eq!(rb.max_write_size(), 0);

    let state = (rb.read_pos(), rb.write_pos(), rb.max_read_size());
    assert!(rb.write(&[1]).is_err());
    assert_eq!(state, (rb.read_pos(), rb.write_pos(), rb.max_read_size()));
}

#[rstest]
#[case::read(false)]
#[case::skip(true)]
fn exact_drain_then_one_more_fails(#[case] use_skip: bool) {
    let rb = buffer_at(8, 5);
    rb.write(b"123456").unwrap();

    if use_skip {
        rb.skip(6).unwrap();
    } else {
        let mut out = [0u8; 6];
        rb.read(&mut out).unwrap();
        assert_eq!(&out, b"123456");
    }
    assert_eq!(rb.max_read_size(), 0);

    let read_pos = rb.read_pos();
    assert!(rb.skip(1).is_err());
    assert!(rb.read(&mut [0u8; 1]).is_err());
    assert_eq!(rb.read_pos(), read_pos);
}

#[rstest]
#[case(-1)]
#[case(-4096)]
#[case(isize::MIN)]
fn negative_skip_is_rejected(#[case] size: isize) {
    let rb = CircularByteBuffer::with_capacity(16).unwrap();
    rb.write(b"keep me").unwrap();

    assert!(matches!(rb.skip(size), Err(RingError::NegativeSkip(n)) if n == size));
    assert_eq!(rb.max_read_size(), 7);
}

#[test]
fn clear_is_idempotent() {
    let rb = buffer_at(8, 6);
    rb.write(b"data").unwrap();

    rb.clear();
    let once = (rb.read_pos(), rb.write_pos(), rb.max_read_size(), rb.capacity());
    rb.clear();
    let twice = (rb.read_pos(), rb.write_pos(), rb.max_read_size(), rb.capacity());

    assert_eq!(once, twice);
    assert_eq!(rb.max_read_size(), 0);
    assert_eq!(rb.max_write_size(), rb.capacity());
}

#[test]
fn append_into_unallocated_drains_source() {
    let a = buffer_at(16, 12);
    a.write(b"wrapped-payload").unwrap();
    let n = a.max_read_size();

    let b = CircularByteBuffer::new();
    assert_eq!(b.append(&a).unwrap(), n);
    assert_eq!(b.capacity(), n);
    assert_eq!(b.max_read_size(), n);
    assert_eq!(a.max_read_size(), 0);

    let mut out = vec![0u8; n];
    b.read(&mut out).unwrap();
    assert_eq!(out, b"wrapped-payload");
}

#[test]
fn copy_then_append_of_drained_source_is_noop() {
    let src = CircularByteBuffer::with_capacity(32).unwrap();
    src.write(b"stage one").unwrap();

    let dst = CircularByteBuffer::with_capacity(32).unwrap();
    dst.write(b"stale").unwrap();

    assert_eq!(dst.copy_from(&src).unwrap(), 9);
    let snapshot = dst.with_readable(|a, b| [a, b].concat());
    assert_eq!(snapshot, b"stage one");

    assert_eq!(dst.append(&src).unwrap(), 0);
    assert_eq!(dst.with_readable(|a, b| [a, b].concat()), snapshot);
}

#[test]
fn create_failure_keeps_previous_contents() {
    let rb = CircularByteBuffer::new();
    rb.create(16).unwrap();
    rb.write(b"survivor").unwrap();

    assert!(matches!(rb.create(usize::MAX), Err(RingError::Allocation { .. })));
    assert_eq!(rb.capacity(), 16);

    let mut out = [0u8; 8];
    rb.read(&mut out).unwrap();
    assert_eq!(&out, b"survivor");
}

#[rstest]
#[case::tiny(4)]
#[case::roomy(64)]
fn resize_through_parked_buffer_carries_clamped_tail(#[case] capacity: usize) {
    let output = CircularByteBuffer::with_capacity(capacity).unwrap();
    let tail = b"tail-of-stream";
    let len = tail.len().min(output.max_write_size());
    output.write(&tail[..len]).unwrap();

    let parked = CircularByteBuffer::new();
    assert_eq!(parked.copy_from(&output).unwrap(), len);
    output.destroy();
    output.create(capacity * 16).unwrap();
    assert_eq!(output.append(&parked).unwrap(), len);

    let mut out = vec![0u8; len];
    output.read(&mut out).unwrap();
    assert_eq!(out.as_slice(), &tail[..len]);
}

#[test]
fn transfer_chain_between_backings() {
    let heap = CircularByteBuffer::with_capacity(8).unwrap();
    let mapped = CircularByteBuffer::with_config(BufferConfig::new().with_backing(Backing::Anonymous));
    mapped.create(8).unwrap();

    heap.write(b"xyzw").unwrap();
    heap.skip(3).unwrap();
    heap.write(b"abcdefg").unwrap(); // wrap di sumber

    mapped.write_from(&heap, 5).unwrap();
    heap.read_into(&mapped, 3).unwrap();
    assert_eq!(heap.max_read_size(), 0);

    let mut out = [0u8; 8];
    mapped.read(&mut out).unwrap();
    assert_eq!(&out, b"wabcdefg");
}

#[test]
fn raw_pointer_sees_written_bytes() {
    let rb = buffer_at(8, 6);
    rb.write(b"ring").unwrap();

    let base = rb.as_mut_ptr();
    assert!(!base.is_null());

    // SAFETY: tidak ada thread lain yang menyentuh buffer, capacity 8
    let raw = unsafe { std::slice::from_raw_parts(base, rb.capacity()) };
    assert_eq!(&raw[6..8], b"ri");
    assert_eq!(&raw[0..2], b"ng");
}
