//! The public speaker handle.

use crate::config::{Settings, SpeakerOptions};
use crate::device::{AudioDevice, BackendInfo, DeviceSession, SessionState};
use crate::error::{SpeakerError, SpeakerResult};
use crate::events::{EventBus, Subscription};
use crate::format::{self, EncodingSet, FormatSpec};
use crate::lifecycle::{Command, PlaybackLifecycle, Reply, Shared};
use crate::sink::SpeakerSink;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

fn lifecycle_gone() -> SpeakerError {
    SpeakerError::runtime("speaker lifecycle task has stopped")
}

/// A streaming PCM output.
///
/// Cloning a `Speaker` gives another handle to the same output. Bytes written
/// through any handle reach the device in submission order. The device is
/// opened lazily on the first write (or by [`open`](Self::open)) and closed
/// exactly once: by [`close`](Self::close), [`end`](Self::end),
/// [`flush`](Self::flush), or when the last handle is dropped.
///
/// Constructing a speaker requires a running Tokio runtime.
///
/// ```rust,ignore
/// use pcm_speaker::{MemoryDevice, Speaker, SpeakerOptions};
///
/// let speaker = Speaker::new(MemoryDevice::new(), SpeakerOptions::new())?;
/// speaker.write(vec![0u8; 4096]).await?;
/// speaker.end().await?;
/// ```
#[derive(Clone)]
pub struct Speaker {
    commands: mpsc::UnboundedSender<Command>,
    events: Arc<EventBus>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    backend: Arc<BackendInfo>,
    supported: EncodingSet,
    runtime: Handle,
}

impl Speaker {
    /// Create a speaker on `device`, resolving `options` over the defaults.
    ///
    /// Fails with [`SpeakerError::UnsupportedEndianness`] when a non-native
    /// byte order is requested. Unsupported sample formats are reported when
    /// the device is opened.
    pub fn new<D: AudioDevice>(device: D, options: SpeakerOptions) -> SpeakerResult<Self> {
        let runtime = Handle::try_current().map_err(|err| SpeakerError::runtime(err.to_string()))?;
        let settings = Settings::from_options(&options)?;

        let backend = Arc::new(device.backend());
        let supported = device.supported_encodings();
        let (commands, mailbox) = mpsc::unbounded_channel();
        let events = EventBus::new();
        let shared = Shared::new(settings);
        let cancel = CancellationToken::new();

        let lifecycle = PlaybackLifecycle::new(
            DeviceSession::new(Arc::new(device)),
            options,
            settings,
            Arc::clone(&events),
            Arc::clone(&shared),
            cancel.clone(),
            mailbox,
        );
        runtime.spawn(lifecycle.run());
        debug!(backend = %backend.name, "speaker created");

        Ok(Self {
            commands,
            events,
            shared,
            cancel,
            backend,
            supported,
            runtime,
        })
    }

    /// Create a speaker with default options: signed 16-bit stereo at 44100 Hz.
    pub fn with_defaults<D: AudioDevice>(device: D) -> SpeakerResult<Self> {
        Self::new(device, SpeakerOptions::default())
    }

    fn send<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> oneshot::Receiver<SpeakerResult<T>> {
        let (reply, ack) = oneshot::channel();
        // A closed mailbox drops the reply sender, which the receiver reports.
        let _ = self.commands.send(command(reply));
        ack
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> SpeakerResult<T> {
        self.send(command).await.unwrap_or_else(|_| Err(lifecycle_gone()))
    }

    /// Open the device now instead of on the first write.
    pub async fn open(&self) -> SpeakerResult<()> {
        self.request(|reply| Command::Open { reply }).await
    }

    /// Queue bytes for playback, resolving once they were handed to the device.
    ///
    /// Bytes must already be interleaved in the configured format. A write
    /// superseded by an immediate close resolves successfully without being
    /// played.
    pub async fn write(&self, bytes: impl Into<Vec<u8>>) -> SpeakerResult<()> {
        let bytes = bytes.into();
        self.request(|reply| Command::Write { bytes, reply }).await
    }

    pub(crate) fn send_write(&self, bytes: Vec<u8>) -> oneshot::Receiver<SpeakerResult<()>> {
        self.send(|reply| Command::Write { bytes, reply })
    }

    /// Let the device play out what it holds, then close it.
    pub async fn flush(&self) -> SpeakerResult<()> {
        self.close(false).await
    }

    /// Signal end of stream: play out queued audio, flush and close.
    pub async fn end(&self) -> SpeakerResult<()> {
        self.close(false).await
    }

    /// Close the device.
    ///
    /// With `immediate` the flush is skipped and bytes not yet handed to the
    /// device are discarded. Concurrent calls share a single teardown; calls
    /// after it finished resolve immediately.
    pub async fn close(&self, immediate: bool) -> SpeakerResult<()> {
        if immediate {
            self.cancel.cancel();
        }
        self.request(|reply| Command::Close { immediate, reply }).await
    }

    /// Merge `options` over the current configuration.
    ///
    /// Only allowed before the device is opened; the format is fixed at open.
    pub async fn format(&self, options: SpeakerOptions) -> SpeakerResult<Settings> {
        self.request(|reply| Command::Format { options, reply }).await
    }

    /// Attach an upstream producer that may announce its format once.
    ///
    /// The announced options are applied as by [`format`](Self::format).
    /// Dropping or [`unpipe`](PipeHandle::unpipe)-ing the returned handle stops
    /// listening; neither closes the speaker.
    pub fn pipe(&self, announcement: oneshot::Receiver<SpeakerOptions>) -> PipeHandle {
        debug!("pipe()");
        let speaker = self.clone();
        let task = self.runtime.spawn(async move {
            let options = announcement.await.ok()?;
            debug!("upstream announced its format");
            Some(speaker.format(options).await)
        });
        PipeHandle { task: Some(task) }
    }

    /// Register for lifecycle notifications.
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// Currently resolved settings.
    pub fn settings(&self) -> Settings {
        self.shared.settings()
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Information about the device backend.
    pub fn backend(&self) -> &BackendInfo {
        &self.backend
    }

    /// Encodings the device advertises.
    pub const fn supported_encodings(&self) -> EncodingSet {
        self.supported
    }

    /// Check whether `spec` resolves to an encoding the device advertises.
    pub fn is_supported(&self, spec: &FormatSpec) -> bool {
        format::is_supported(spec, self.supported)
    }

    /// A [`futures::Sink`] feeding this speaker, with backpressure governed by
    /// the configured water marks.
    pub fn sink(&self) -> SpeakerSink {
        SpeakerSink::new(self.clone())
    }
}

impl fmt::Debug for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Speaker")
            .field("backend", &self.backend.name)
            .field("state", &self.state())
            .field("settings", &self.settings())
            .finish()
    }
}

/// Attachment of an upstream producer to a [`Speaker`].
#[derive(Debug)]
pub struct PipeHandle {
    task: Option<JoinHandle<Option<SpeakerResult<Settings>>>>,
}

impl PipeHandle {
    /// Stop listening for the upstream format announcement.
    pub fn unpipe(mut self) {
        debug!("unpipe()");
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Check if the announcement is still awaited.
    pub fn is_attached(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Wait for the announcement to be applied.
    ///
    /// `None` if the producer went away without announcing a format.
    pub async fn negotiated(mut self) -> Option<SpeakerResult<Settings>> {
        let task = self.task.take()?;
        task.await.ok().flatten()
    }
}

impl Drop for PipeHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
