//! Splitting inbound buffers into device-sized writes.
//!
//! Audio backends want to be fed in steady increments: a single huge write
//! can leave the device callback with nothing queued when it next fires. The
//! [`FrameChunker`] slices each inbound buffer into writes of at most
//! `block_align * samples_per_frame` bytes and drives them through the
//! [`DeviceSession`] strictly one at a time.

use crate::config::Settings;
use crate::device::{AudioDevice, DeviceSession};
use crate::error::SpeakerResult;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// How a pushed buffer left the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    /// Every byte was handed to the device.
    Complete {
        /// Bytes written.
        written: usize,
    },
    /// A close superseded the buffer; the unwritten tail was dropped.
    Abandoned {
        /// Bytes written before the close was observed.
        written: usize,
        /// Bytes that were never handed to the device.
        dropped: usize,
    },
}

impl Drain {
    /// Bytes that reached the device.
    pub const fn written(&self) -> usize {
        match self {
            Self::Complete { written } | Self::Abandoned { written, .. } => *written,
        }
    }
}

/// Slices buffers into device-aligned writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameChunker {
    chunk_size: usize,
}

impl FrameChunker {
    /// Chunker issuing writes of at most `chunk_size` bytes.
    ///
    /// A zero size is treated as one byte so draining always progresses.
    pub const fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: if chunk_size == 0 { 1 } else { chunk_size },
        }
    }

    /// Chunker sized for resolved speaker settings.
    pub const fn for_settings(settings: &Settings) -> Self {
        Self::new(settings.chunk_size())
    }

    /// Largest write this chunker issues.
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Drain `bytes` into the session in order, one write in flight at a time.
    ///
    /// Before each slice the chunker checks for a close: once `cancel` fires
    /// or the session is closed, the remainder is dropped and the push still
    /// completes successfully. A short write aborts the remainder and is
    /// returned as the error; the failed slice is not retried.
    pub async fn push<D: AudioDevice>(
        &self,
        session: &mut DeviceSession<D>,
        bytes: Vec<u8>,
        cancel: &CancellationToken,
    ) -> SpeakerResult<Drain> {
        let mut remaining = bytes.as_slice();
        let mut written = 0;

        while !remaining.is_empty() {
            if cancel.is_cancelled() || session.state().is_closed() {
                debug!(
                    written,
                    dropped = remaining.len(),
                    "aborting write, speaker is closing"
                );
                return Ok(Drain::Abandoned {
                    written,
                    dropped: remaining.len(),
                });
            }

            let (slice, rest) = remaining.split_at(remaining.len().min(self.chunk_size));
            written += session.write(slice).await?;
            remaining = rest;
        }

        trace!(bytes = written, "completed chunk");
        Ok(Drain::Complete { written })
    }
}
