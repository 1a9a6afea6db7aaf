//! Write-buffer watermark hysteresis.
//!
//! Exercised directly against `OutboundBuffer` (not over a live socket):
//! the hysteresis math is independent of what ultimately drains the
//! buffer, and driving it through a real TCP peer would make the exact
//! 4-writes/9-writes thresholds the scenario specifies dependent on
//! kernel socket buffer sizes.

mod util;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use corvid::channel::outbound_buffer::OutboundBuffer;
use corvid::options::WriteBufferWaterMark;
use corvid::promise::{ImmediateExecutor, Promise};

fn kib(n: usize) -> Vec<u8> {
    vec![0u8; n * 1024]
}

#[test]
fn watermark_flips_false_then_true_at_the_documented_thresholds() {
    util::init();
    let mut buf = OutboundBuffer::new(WriteBufferWaterMark::new(4096, 8192));

    let mut flips_to_unwritable = 0usize;
    for _ in 0..4 {
        let flipped = buf.push(kib(1), Promise::new(Arc::new(ImmediateExecutor)));
        assert!(!flipped, "no transition expected before the high watermark");
    }
    assert!(buf.is_writable(), "4096 pending bytes must not yet exceed the 8192 high mark");

    for _ in 0..5 {
        if buf.push(kib(1), Promise::new(Arc::new(ImmediateExecutor))) {
            flips_to_unwritable += 1;
        }
    }
    assert_eq!(buf.pending_bytes(), 9 * 1024);
    assert!(!buf.is_writable(), "9216 pending bytes must exceed the 8192 high mark");
    assert_eq!(flips_to_unwritable, 1, "channelWritabilityChanged must fire exactly once");

    // Drain 6 KiB's worth of writes (down to 3072 pending, under the 4096 low
    // mark), simulating a peer that's now reading.
    let written = Arc::new(AtomicUsize::new(0));
    let budget = 6 * 1024;
    let (_, flipped_to_writable, error) = buf.flush(u32::MAX, |chunk| {
        let already = written.load(Ordering::SeqCst);
        if already >= budget {
            return Ok(0);
        }
        let take = chunk.len().min(budget - already);
        written.fetch_add(take, Ordering::SeqCst);
        Ok(take)
    });

    assert!(error.is_none());
    assert_eq!(buf.pending_bytes(), 3 * 1024);
    assert!(flipped_to_writable, "channelWritabilityChanged must fire once more, going writable");
    assert!(buf.is_writable());
}

#[test]
fn empty_buffer_starts_writable() {
    let buf = OutboundBuffer::new(WriteBufferWaterMark::default());
    assert!(buf.is_writable());
    assert!(buf.is_empty());
    assert_eq!(buf.pending_bytes(), 0);
}
