//! Output device abstraction and the session that owns a device handle.
//!
//! The native driver is an external collaborator: anything implementing
//! [`AudioDevice`] can be driven. [`DeviceSession`] wraps the four device
//! primitives behind a state-checked facade and is the only owner of the
//! handle.

use crate::error::{SpeakerError, SpeakerResult};
use crate::format::{self, Encoding, EncodingSet, FormatSpec};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub mod memory;

#[cfg(feature = "playback")]
pub mod cpal;

pub use memory::MemoryDevice;

#[cfg(feature = "playback")]
pub use self::cpal::CpalDevice;

/// Descriptive information about an output backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    /// Short backend name, e.g. `"coreaudio"`.
    pub name: String,
    /// Human readable description.
    pub description: String,
    /// Version of the backend's module API.
    pub api_version: u32,
    /// Backend revision.
    pub revision: String,
}

impl BackendInfo {
    /// Create backend information.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        api_version: u32,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            api_version,
            revision: revision.into(),
        }
    }

    /// `"<api_version>.<revision>"`.
    pub fn version(&self) -> String {
        format!("{}.{}", self.api_version, self.revision)
    }
}

/// An audio output driver.
///
/// Every primitive completes asynchronously. The session never issues a second
/// call on a handle before the previous one has completed, so implementations
/// need no internal ordering of their own.
pub trait AudioDevice: Send + Sync + 'static {
    /// Native handle for one open output.
    type Handle: Send + 'static;

    /// Information about this backend.
    fn backend(&self) -> BackendInfo;

    /// Encodings this device can play.
    fn supported_encodings(&self) -> EncodingSet;

    /// Open an output. Failures carry the native error code.
    fn open(
        &self,
        channels: u16,
        sample_rate: u32,
        encoding: Encoding,
    ) -> impl Future<Output = Result<Self::Handle, i32>> + Send;

    /// Hand bytes to the device, returning how many it accepted.
    fn write(
        &self,
        handle: &mut Self::Handle,
        bytes: &[u8],
    ) -> impl Future<Output = usize> + Send;

    /// Wait for the device to play out its internal buffer.
    fn flush(&self, handle: &mut Self::Handle) -> impl Future<Output = Result<(), i32>> + Send;

    /// Release the output.
    fn close(&self, handle: Self::Handle) -> impl Future<Output = Result<(), i32>> + Send;
}

/// Lifecycle state of a playback session.
///
/// The only forward path is `Unopened -> Open -> Flushing -> Closed`, with
/// `Closed` reachable from any state and never left again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No device handle has been acquired yet.
    Unopened,
    /// The device is open and accepting writes.
    Open,
    /// The device is playing out its buffer before close.
    Flushing,
    /// The device has been released.
    Closed,
}

impl SessionState {
    /// Check if writes are accepted
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if the session has been torn down
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unopened => "unopened",
            Self::Open => "open",
            Self::Flushing => "flushing",
            Self::Closed => "closed",
        })
    }
}

/// State-checked owner of a single device handle.
pub struct DeviceSession<D: AudioDevice> {
    device: Arc<D>,
    handle: Option<D::Handle>,
    state: SessionState,
    encoding: Option<Encoding>,
}

impl<D: AudioDevice> DeviceSession<D> {
    /// Create an unopened session on a device.
    pub const fn new(device: Arc<D>) -> Self {
        Self {
            device,
            handle: None,
            state: SessionState::Unopened,
            encoding: None,
        }
    }

    /// Current state
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Check if a handle is held
    pub const fn has_handle(&self) -> bool {
        self.handle.is_some()
    }

    /// Encoding the device was opened with
    pub const fn encoding(&self) -> Option<Encoding> {
        self.encoding
    }

    /// The driven device
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Open the device for `format`.
    ///
    /// A failed native open leaves the session unopened so it can be retried.
    pub async fn open(&mut self, format: &FormatSpec) -> SpeakerResult<()> {
        if self.state != SessionState::Unopened {
            return Err(SpeakerError::AlreadyOpen);
        }

        let encoding = format::resolve(format)
            .filter(|encoding| self.device.supported_encodings().contains(*encoding))
            .ok_or(SpeakerError::InvalidFormat)?;
        if format.channels == 0 || format.sample_rate == 0 {
            return Err(SpeakerError::InvalidFormat);
        }

        debug!(
            channels = format.channels,
            sample_rate = format.sample_rate,
            %encoding,
            "opening device"
        );
        let handle = self
            .device
            .open(format.channels, format.sample_rate, encoding)
            .await
            .map_err(|code| SpeakerError::DeviceOpen { code })?;

        self.handle = Some(handle);
        self.encoding = Some(encoding);
        self.state = SessionState::Open;
        Ok(())
    }

    /// Hand one slice to the device.
    ///
    /// A short write is reported as an error and not retried.
    pub async fn write(&mut self, bytes: &[u8]) -> SpeakerResult<usize> {
        if self.state != SessionState::Open {
            return Err(SpeakerError::SessionClosed);
        }
        let handle = self.handle.as_mut().ok_or(SpeakerError::SessionClosed)?;

        let written = self.device.write(handle, bytes).await;
        trace!(requested = bytes.len(), written, "device write");
        if written < bytes.len() {
            return Err(SpeakerError::short_write(bytes.len(), written));
        }
        Ok(written)
    }

    /// Ask the device to play out its buffer, moving the session to `Flushing`.
    ///
    /// Without a handle there is nothing to drain and this succeeds trivially.
    pub async fn flush(&mut self) -> SpeakerResult<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };
        if self.state != SessionState::Open {
            return Err(SpeakerError::SessionClosed);
        }

        self.state = SessionState::Flushing;
        debug!("flushing device");
        self.device
            .flush(handle)
            .await
            .map_err(|code| SpeakerError::device("flush", code))
    }

    /// Release the device. Calling this again after it completed is a no-op.
    ///
    /// The handle is dropped and the session closed even if the native close
    /// reports a failure.
    pub async fn close(&mut self) -> SpeakerResult<()> {
        if self.state == SessionState::Closed {
            trace!("already closed");
            return Ok(());
        }

        let Some(handle) = self.handle.take() else {
            debug!("closing session without a device handle");
            self.state = SessionState::Closed;
            return Ok(());
        };

        debug!("closing device");
        let result = self.device.close(handle).await;
        self.state = SessionState::Closed;
        result.map_err(|code| {
            warn!(code, "device close reported a failure");
            SpeakerError::device("close", code)
        })
    }
}

impl<D: AudioDevice> fmt::Debug for DeviceSession<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("state", &self.state)
            .field("has_handle", &self.handle.is_some())
            .field("encoding", &self.encoding)
            .finish()
    }
}
