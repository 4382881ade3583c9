//! Error types and result utilities for speaker operations.

use crate::format::Endianness;
use thiserror::Error;

/// Convenience type alias for results that may contain a [`SpeakerError`].
pub type SpeakerResult<T> = Result<T, SpeakerError>;

/// Error types that can occur while driving an output device.
///
/// Errors are `Clone` because a single failure is delivered both to the
/// caller whose operation failed and to every event subscriber.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpeakerError {
    /// The requested sample format does not resolve to a device encoding,
    /// or the device does not advertise it.
    #[error("invalid PCM format specified")]
    InvalidFormat,

    /// `open()` (or a format renegotiation) was attempted after the device
    /// was already opened.
    #[error("open() called more than once!")]
    AlreadyOpen,

    /// The native open primitive failed.
    ///
    /// The session stays unopened so the open can be retried.
    #[error("open() failed: {code}")]
    DeviceOpen {
        /// Native error code reported by the device.
        code: i32,
    },

    /// The device accepted fewer bytes than were handed to it.
    #[error("write() failed: {written} of {requested} bytes written")]
    ShortWrite {
        /// Size of the slice passed to the device.
        requested: usize,
        /// Bytes the device reported as written.
        written: usize,
    },

    /// An operation was attempted on a session that can no longer accept it.
    #[error("speaker session is closed")]
    SessionClosed,

    /// The requested byte order differs from the host byte order.
    #[error("native endianness is {native}, but {requested} was requested")]
    UnsupportedEndianness {
        /// Host byte order.
        native: Endianness,
        /// Byte order asked for in the options.
        requested: Endianness,
    },

    /// A flush or close primitive reported a native failure.
    #[error("{operation}() failed: {code}")]
    Device {
        /// Name of the device primitive.
        operation: &'static str,
        /// Native error code reported by the device.
        code: i32,
    },

    /// The lifecycle task could not be started or is no longer running.
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Coarse classification carried by the `error` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`SpeakerError::InvalidFormat`].
    InvalidFormat,
    /// See [`SpeakerError::AlreadyOpen`].
    AlreadyOpen,
    /// See [`SpeakerError::DeviceOpen`].
    DeviceOpen,
    /// See [`SpeakerError::ShortWrite`].
    ShortWrite,
    /// See [`SpeakerError::SessionClosed`].
    SessionClosed,
    /// See [`SpeakerError::UnsupportedEndianness`].
    UnsupportedEndianness,
    /// See [`SpeakerError::Device`].
    Device,
    /// See [`SpeakerError::Runtime`].
    Runtime,
}

impl SpeakerError {
    /// Create a short write error
    pub const fn short_write(requested: usize, written: usize) -> Self {
        Self::ShortWrite { requested, written }
    }

    /// Create a device primitive error
    pub const fn device(operation: &'static str, code: i32) -> Self {
        Self::Device { operation, code }
    }

    /// Create a runtime error
    pub fn runtime(details: impl Into<String>) -> Self {
        Self::Runtime(details.into())
    }

    /// The kind reported alongside this error in the `error` notification.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFormat => ErrorKind::InvalidFormat,
            Self::AlreadyOpen => ErrorKind::AlreadyOpen,
            Self::DeviceOpen { .. } => ErrorKind::DeviceOpen,
            Self::ShortWrite { .. } => ErrorKind::ShortWrite,
            Self::SessionClosed => ErrorKind::SessionClosed,
            Self::UnsupportedEndianness { .. } => ErrorKind::UnsupportedEndianness,
            Self::Device { .. } => ErrorKind::Device,
            Self::Runtime(_) => ErrorKind::Runtime,
        }
    }

    /// Check if the session survives this error.
    ///
    /// Short writes reject only the in-flight chunk, device open failures can
    /// be retried, and protocol misuse leaves state untouched.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ShortWrite { .. } | Self::DeviceOpen { .. } | Self::AlreadyOpen
        )
    }

    /// Check if this error leaves close as the only way forward.
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Check if this error was reported by the device collaborator.
    pub const fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceOpen { .. } | Self::ShortWrite { .. } | Self::Device { .. }
        )
    }

    /// Check if this error is a format or configuration problem.
    pub const fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat | Self::UnsupportedEndianness { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_match_device_wording() {
        assert_eq!(
            SpeakerError::InvalidFormat.to_string(),
            "invalid PCM format specified"
        );
        assert_eq!(
            SpeakerError::DeviceOpen { code: -3 }.to_string(),
            "open() failed: -3"
        );
        assert!(SpeakerError::short_write(4096, 100)
            .to_string()
            .contains("100 of 4096"));
    }

    #[test]
    fn test_error_classification() {
        assert!(SpeakerError::short_write(8, 4).is_recoverable());
        assert!(SpeakerError::DeviceOpen { code: 1 }.is_recoverable());
        assert!(SpeakerError::AlreadyOpen.is_recoverable());

        assert!(SpeakerError::InvalidFormat.is_fatal());
        assert!(SpeakerError::SessionClosed.is_fatal());

        assert!(SpeakerError::device("flush", 1).is_device_error());
        assert!(!SpeakerError::InvalidFormat.is_device_error());

        let endian = SpeakerError::UnsupportedEndianness {
            native: Endianness::Little,
            requested: Endianness::Big,
        };
        assert!(endian.is_format_error());
        assert_eq!(endian.kind(), ErrorKind::UnsupportedEndianness);
        assert_eq!(
            endian.to_string(),
            "native endianness is LE, but BE was requested"
        );
    }

    #[test]
    fn test_error_clone_is_equal() {
        let original = SpeakerError::device("close", 7);
        let cloned = original.clone();
        assert_eq!(original, cloned);
        assert_eq!(cloned.kind(), ErrorKind::Device);
    }
}
