//! In-process capture device.
//!
//! [`MemoryDevice`] accepts any advertised encoding and appends every written
//! byte to an internal buffer instead of playing it. It is useful for headless
//! runs and lets callers inject the failures a real driver can produce.

use super::{AudioDevice, BackendInfo};
use crate::format::{Encoding, EncodingSet};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Counters of primitive invocations on a [`MemoryDevice`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Calls to `open`, successful or not.
    pub opens: usize,
    /// Calls to `write`.
    pub writes: usize,
    /// Calls to `flush`.
    pub flushes: usize,
    /// Calls to `close`.
    pub closes: usize,
}

#[derive(Debug, Default)]
struct Recorder {
    stats: MemoryStats,
    written: Vec<u8>,
    write_sizes: Vec<usize>,
    last_open: Option<(u16, u32, Encoding)>,
    failing_opens: usize,
}

/// Handle to an output opened on a [`MemoryDevice`].
#[derive(Debug)]
pub struct MemoryHandle {
    channels: u16,
    sample_rate: u32,
    encoding: Encoding,
}

impl MemoryHandle {
    /// Channel count the output was opened with
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Sample rate the output was opened with
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Encoding the output was opened with
    pub const fn encoding(&self) -> Encoding {
        self.encoding
    }
}

/// A device that records audio in memory.
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    supported: EncodingSet,
    latency: Duration,
    open_error: i32,
    short_write_at: Option<usize>,
    flush_error: Option<i32>,
    close_error: Option<i32>,
    recorder: Arc<Mutex<Recorder>>,
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDevice {
    /// A device advertising every encoding and never failing.
    pub fn new() -> Self {
        Self {
            supported: EncodingSet::all(),
            latency: Duration::ZERO,
            open_error: 0,
            short_write_at: None,
            flush_error: None,
            close_error: None,
            recorder: Arc::new(Mutex::new(Recorder::default())),
        }
    }

    /// Restrict the advertised encodings.
    pub fn with_supported(mut self, supported: EncodingSet) -> Self {
        self.supported = supported;
        self
    }

    /// Delay every write, flush and close by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next `count` opens with `code`.
    pub fn failing_opens(self, count: usize, code: i32) -> Self {
        self.recorder.lock().failing_opens = count;
        Self {
            open_error: code,
            ..self
        }
    }

    /// Accept only half of the slice on the write with this zero-based index.
    pub fn short_write_at(mut self, index: usize) -> Self {
        self.short_write_at = Some(index);
        self
    }

    /// Report `code` from every flush.
    pub fn failing_flush(mut self, code: i32) -> Self {
        self.flush_error = Some(code);
        self
    }

    /// Report `code` from every close.
    pub fn failing_close(mut self, code: i32) -> Self {
        self.close_error = Some(code);
        self
    }

    /// Every byte accepted so far, in order.
    pub fn written(&self) -> Vec<u8> {
        self.recorder.lock().written.clone()
    }

    /// Size of each slice handed to `write`, in order.
    pub fn write_sizes(&self) -> Vec<usize> {
        self.recorder.lock().write_sizes.clone()
    }

    /// Primitive call counters.
    pub fn stats(&self) -> MemoryStats {
        self.recorder.lock().stats
    }

    /// Parameters of the most recent open call.
    pub fn last_open(&self) -> Option<(u16, u32, Encoding)> {
        self.recorder.lock().last_open
    }

    async fn settle(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

impl AudioDevice for MemoryDevice {
    type Handle = MemoryHandle;

    fn backend(&self) -> BackendInfo {
        BackendInfo::new("memory", "In-process capture output", 2, "0")
    }

    fn supported_encodings(&self) -> EncodingSet {
        self.supported
    }

    async fn open(
        &self,
        channels: u16,
        sample_rate: u32,
        encoding: Encoding,
    ) -> Result<Self::Handle, i32> {
        let mut recorder = self.recorder.lock();
        recorder.stats.opens += 1;
        recorder.last_open = Some((channels, sample_rate, encoding));
        if recorder.failing_opens > 0 {
            recorder.failing_opens -= 1;
            return Err(self.open_error);
        }
        Ok(MemoryHandle {
            channels,
            sample_rate,
            encoding,
        })
    }

    async fn write(&self, _handle: &mut Self::Handle, bytes: &[u8]) -> usize {
        self.settle().await;

        let mut recorder = self.recorder.lock();
        let index = recorder.stats.writes;
        recorder.stats.writes += 1;
        recorder.write_sizes.push(bytes.len());

        let accepted = if self.short_write_at == Some(index) {
            bytes.len() / 2
        } else {
            bytes.len()
        };
        recorder.written.extend_from_slice(&bytes[..accepted]);
        accepted
    }

    async fn flush(&self, _handle: &mut Self::Handle) -> Result<(), i32> {
        self.settle().await;
        self.recorder.lock().stats.flushes += 1;
        self.flush_error.map_or(Ok(()), Err)
    }

    async fn close(&self, _handle: Self::Handle) -> Result<(), i32> {
        self.settle().await;
        self.recorder.lock().stats.closes += 1;
        self.close_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_writes_in_order() {
        let device = MemoryDevice::new();
        let mut handle = device.open(2, 48000, Encoding::Float32).await.unwrap();
        assert_eq!(handle.encoding(), Encoding::Float32);

        assert_eq!(device.write(&mut handle, &[1, 2]).await, 2);
        assert_eq!(device.write(&mut handle, &[3]).await, 1);

        assert_eq!(device.written(), vec![1, 2, 3]);
        assert_eq!(device.write_sizes(), vec![2, 1]);
        assert_eq!(device.last_open(), Some((2, 48000, Encoding::Float32)));
    }

    #[tokio::test]
    async fn test_clones_share_recording() {
        let device = MemoryDevice::new();
        let observer = device.clone();
        let mut handle = device.open(1, 8000, Encoding::Unsigned8).await.unwrap();
        device.write(&mut handle, &[7; 3]).await;
        device.close(handle).await.unwrap();

        assert_eq!(observer.written(), vec![7; 3]);
        assert_eq!(observer.stats().closes, 1);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let device = MemoryDevice::new()
            .failing_opens(1, -2)
            .short_write_at(1)
            .failing_flush(3);

        assert_eq!(device.open(2, 44100, Encoding::Signed16).await.err(), Some(-2));
        let mut handle = device.open(2, 44100, Encoding::Signed16).await.unwrap();

        assert_eq!(device.write(&mut handle, &[0; 8]).await, 8);
        assert_eq!(device.write(&mut handle, &[0; 8]).await, 4);
        assert_eq!(device.flush(&mut handle).await, Err(3));
        assert_eq!(device.stats().opens, 2);
    }
}
