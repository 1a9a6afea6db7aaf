//! The per-channel outbound FIFO and writability hysteresis.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::CoreError;
use crate::options::WriteBufferWaterMark;
use crate::promise::Promise;

struct Entry {
    bytes: Vec<u8>,
    written: usize,
    promise: Promise<(), Arc<CoreError>>,
}

/// A FIFO of pending writes plus the running pending-byte count that drives
/// `Channel::is_writable`.
pub struct OutboundBuffer {
    entries: std::collections::VecDeque<Entry>,
    pending_bytes: usize,
    writable: Arc<AtomicBool>,
    water_mark: WriteBufferWaterMark,
}

impl OutboundBuffer {
    pub fn new(water_mark: WriteBufferWaterMark) -> OutboundBuffer {
        OutboundBuffer {
            entries: std::collections::VecDeque::new(),
            pending_bytes: 0,
            writable: Arc::new(AtomicBool::new(true)),
            water_mark,
        }
    }

    pub fn set_water_mark(&mut self, water_mark: WriteBufferWaterMark) {
        self.water_mark = water_mark;
    }

    pub fn is_writable(&self) -> bool {
        self.writable.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Appends a message without flushing. Returns `true` if this push
    /// caused writability to flip from true to false (caller should fire
    /// `channelWritabilityChanged`).
    pub fn push(&mut self, bytes: Vec<u8>, promise: Promise<(), Arc<CoreError>>) -> bool {
        self.pending_bytes += bytes.len();
        self.entries.push_back(Entry { bytes, written: 0, promise });
        self.update_writability_on_grow()
    }

    fn update_writability_on_grow(&self) -> bool {
        if self.pending_bytes >= self.water_mark.high as usize && self.writable.load(Ordering::Acquire) {
            self.writable.store(false, Ordering::Release);
            return true;
        }
        false
    }

    fn update_writability_on_shrink(&self) -> bool {
        if self.pending_bytes <= self.water_mark.low as usize && !self.writable.load(Ordering::Acquire) {
            self.writable.store(true, Ordering::Release);
            return true;
        }
        false
    }

    /// Writes as much of the head-of-line entries as `write_one` accepts in
    /// one non-blocking call, up to `spin_count` attempts. `write_one`
    /// returns `Ok(n)` bytes actually written (`0` means "would block").
    /// Returns `(bytes_flushed, writability_flipped_to_true, first_io_error)`.
    /// On an I/O error the failing entry's promise is already resolved with
    /// it; the caller decides whether the error warrants closing the
    /// channel (per `ChannelOption::AutoClose`).
    pub fn flush(
        &mut self,
        spin_count: u32,
        mut write_one: impl FnMut(&[u8]) -> std::io::Result<usize>,
    ) -> (usize, bool, Option<Arc<CoreError>>) {
        let mut flushed = 0usize;
        let mut spins = 0u32;
        let mut error = None;

        while spins < spin_count.max(1) {
            let Some(entry) = self.entries.front_mut() else { break };
            match write_one(&entry.bytes[entry.written..]) {
                Ok(0) => break,
                Ok(n) => {
                    entry.written += n;
                    flushed += n;
                    self.pending_bytes -= n;
                    if entry.written == entry.bytes.len() {
                        let entry = self.entries.pop_front().unwrap();
                        let _ = entry.promise.set_success(());
                    }
                    spins += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    let err = Arc::new(CoreError::Io(e));
                    let entry = self.entries.pop_front().unwrap();
                    let _ = entry.promise.set_failure(err.clone());
                    error = Some(err);
                    break;
                }
            }
        }
        let flipped = self.update_writability_on_shrink();
        (flushed, flipped, error)
    }

    /// Fails every pending entry (channel closing with unflushed writes).
    pub fn fail_all(&mut self, error: Arc<CoreError>) {
        while let Some(entry) = self.entries.pop_front() {
            let _ = entry.promise.set_failure(error.clone());
        }
        self.pending_bytes = 0;
    }
}
