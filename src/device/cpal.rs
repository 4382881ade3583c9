//! Output through the host's default audio device using CPAL.
//!
//! CPAL pulls samples from a callback, so each open output owns a byte ring
//! that `write` fills and the callback drains. The stream itself lives on a
//! dedicated thread because CPAL streams are not `Send` on every platform.

use super::{AudioDevice, BackendInfo};
use crate::format::{Encoding, EncodingSet};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, warn};

/// No default output device is available.
pub const ERR_NO_DEVICE: i32 = -1;
/// The stream could not be built for the requested format.
pub const ERR_BUILD_STREAM: i32 = -2;
/// The stream could not be started.
pub const ERR_PLAY_STREAM: i32 = -3;
/// The stream thread could not be started or joined.
pub const ERR_THREAD: i32 = -4;
/// The stream reported an error after it started.
pub const ERR_STREAM: i32 = -5;

/// Minimum ring capacity, in bytes.
const MIN_RING_BYTES: usize = 16 * 1024;

/// Byte queue between `write` and the output callback.
///
/// The callback only ever takes whole frames, so an underrun never shifts the
/// stream by a partial frame.
struct Ring {
    bytes: Mutex<VecDeque<u8>>,
    capacity: usize,
    frame: usize,
    consumed: Notify,
    failed: AtomicBool,
}

impl Ring {
    /// `capacity` is rounded down to whole frames, but holds at least one.
    fn new(capacity: usize, frame: usize) -> Self {
        let frame = frame.max(1);
        let capacity = (capacity / frame).max(1) * frame;
        Self {
            bytes: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            frame,
            consumed: Notify::new(),
            failed: AtomicBool::new(false),
        }
    }

    /// Move as many whole frames as fit into `out`. Returns the bytes moved.
    fn drain_into(&self, out: &mut [u8]) -> usize {
        let mut queue = self.bytes.lock();
        let available = queue.len().min(out.len());
        let whole = available - available % self.frame;
        for (dst, src) in out.iter_mut().zip(queue.drain(..whole)) {
            *dst = src;
        }
        whole
    }

    /// Nothing playable is left; a trailing partial frame never plays.
    fn is_drained(&self) -> bool {
        self.bytes.lock().len() < self.frame
    }

    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}

/// Handle to a running CPAL output stream.
pub struct CpalHandle {
    ring: Arc<Ring>,
    stop: std_mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

/// The host's default output device.
#[derive(Debug, Clone)]
pub struct CpalDevice {
    supported: EncodingSet,
}

impl Default for CpalDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalDevice {
    /// Probe the default output device for the sample formats it accepts.
    ///
    /// When no device is present the advertised set is empty and every open
    /// fails with an invalid format.
    pub fn new() -> Self {
        let supported = cpal::default_host()
            .default_output_device()
            .and_then(|device| device.supported_output_configs().ok())
            .map(|configs| {
                configs
                    .filter_map(|config| encoding_for(config.sample_format()))
                    .collect()
            })
            .unwrap_or(EncodingSet::EMPTY);

        debug!(encodings = ?supported.iter().collect::<Vec<_>>(), "probed cpal output");
        Self { supported }
    }
}

const fn encoding_for(format: SampleFormat) -> Option<Encoding> {
    match format {
        SampleFormat::I8 => Some(Encoding::Signed8),
        SampleFormat::U8 => Some(Encoding::Unsigned8),
        SampleFormat::I16 => Some(Encoding::Signed16),
        SampleFormat::U16 => Some(Encoding::Unsigned16),
        SampleFormat::I32 => Some(Encoding::Signed32),
        SampleFormat::U32 => Some(Encoding::Unsigned32),
        SampleFormat::F32 => Some(Encoding::Float32),
        SampleFormat::F64 => Some(Encoding::Float64),
        _ => None,
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    ring: Arc<Ring>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample + bytemuck::Pod + Send + 'static,
{
    let error_ring = Arc::clone(&ring);
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            data.fill(T::EQUILIBRIUM);
            ring.drain_into(bytemuck::cast_slice_mut(data));
            ring.consumed.notify_one();
        },
        move |err| {
            warn!(%err, "cpal output stream error");
            error_ring.failed.store(true, Ordering::Release);
            error_ring.consumed.notify_one();
        },
        None,
    )
}

fn start_stream(
    channels: u16,
    sample_rate: u32,
    encoding: Encoding,
    ring: Arc<Ring>,
) -> Result<cpal::Stream, i32> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or(ERR_NO_DEVICE)?;
    let config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match encoding {
        Encoding::Signed8 => build_stream::<i8>(&device, &config, ring),
        Encoding::Unsigned8 => build_stream::<u8>(&device, &config, ring),
        Encoding::Signed16 => build_stream::<i16>(&device, &config, ring),
        Encoding::Unsigned16 => build_stream::<u16>(&device, &config, ring),
        Encoding::Signed32 => build_stream::<i32>(&device, &config, ring),
        Encoding::Unsigned32 => build_stream::<u32>(&device, &config, ring),
        Encoding::Float32 => build_stream::<f32>(&device, &config, ring),
        Encoding::Float64 => build_stream::<f64>(&device, &config, ring),
        Encoding::Signed24 | Encoding::Unsigned24 => return Err(ERR_BUILD_STREAM),
    }
    .map_err(|err| {
        warn!(%err, "failed to build cpal output stream");
        ERR_BUILD_STREAM
    })?;

    stream.play().map_err(|err| {
        warn!(%err, "failed to start cpal output stream");
        ERR_PLAY_STREAM
    })?;
    Ok(stream)
}

impl AudioDevice for CpalDevice {
    type Handle = CpalHandle;

    fn backend(&self) -> BackendInfo {
        BackendInfo::new("cpal", "Host default output device", 1, "15")
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
        let frame = channels as usize * encoding.sample_bytes();
        let quarter_second = frame * sample_rate as usize / 4;
        let ring = Arc::new(Ring::new(quarter_second.max(MIN_RING_BYTES), frame));

        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), i32>>();
        let (stop, stop_rx) = std_mpsc::channel::<()>();
        let stream_ring = Arc::clone(&ring);

        let thread = std::thread::Builder::new()
            .name("pcm-speaker-cpal".to_string())
            .spawn(move || {
                let stream = match start_stream(channels, sample_rate, encoding, stream_ring) {
                    Ok(stream) => stream,
                    Err(code) => {
                        let _ = ready_tx.send(Err(code));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Keep the stream alive until close() or the handle is dropped.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|_| ERR_THREAD)?;

        ready_rx.await.map_err(|_| ERR_THREAD)??;
        Ok(CpalHandle {
            ring,
            stop,
            thread: Some(thread),
        })
    }

    async fn write(&self, handle: &mut Self::Handle, bytes: &[u8]) -> usize {
        let ring = &handle.ring;
        let mut written = 0;

        while written < bytes.len() && !ring.has_failed() {
            let accepted = {
                let mut queue = ring.bytes.lock();
                let free = ring.capacity.saturating_sub(queue.len());
                let accepted = free.min(bytes.len() - written);
                queue.extend(&bytes[written..written + accepted]);
                accepted
            };
            written += accepted;

            if written < bytes.len() {
                ring.consumed.notified().await;
            }
        }
        written
    }

    async fn flush(&self, handle: &mut Self::Handle) -> Result<(), i32> {
        let ring = &handle.ring;
        loop {
            if ring.has_failed() {
                return Err(ERR_STREAM);
            }
            if ring.is_drained() {
                return Ok(());
            }
            ring.consumed.notified().await;
        }
    }

    async fn close(&self, mut handle: Self::Handle) -> Result<(), i32> {
        let _ = handle.stop.send(());
        let Some(thread) = handle.thread.take() else {
            return Ok(());
        };
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => Ok(()),
            _ => Err(ERR_THREAD),
        }
    }
}
