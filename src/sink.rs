//! A [`futures::Sink`] adapter over a [`Speaker`].
//!
//! Producers that think in streams can `send_all` into a speaker instead of
//! awaiting every write. The sink keeps track of bytes submitted but not yet
//! handed to the device and stops accepting items once that exceeds the high
//! water mark, resuming when it drains to the low water mark.

use crate::error::{SpeakerError, SpeakerResult};
use crate::speaker::Speaker;
use futures::future::BoxFuture;
use futures::{Sink, ready};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::trace;

type Ack = oneshot::Receiver<SpeakerResult<()>>;

/// Byte-buffer sink feeding a speaker.
///
/// Closing the sink ends the stream: queued audio is played out and the
/// device is flushed and closed.
pub struct SpeakerSink {
    speaker: Speaker,
    in_flight: VecDeque<(usize, Ack)>,
    buffered: usize,
    backpressured: bool,
    closing: Option<BoxFuture<'static, SpeakerResult<()>>>,
}

impl SpeakerSink {
    pub(crate) fn new(speaker: Speaker) -> Self {
        Self {
            speaker,
            in_flight: VecDeque::new(),
            buffered: 0,
            backpressured: false,
            closing: None,
        }
    }

    /// Bytes submitted that the device has not accepted yet.
    pub const fn buffered(&self) -> usize {
        self.buffered
    }

    /// The speaker this sink feeds.
    pub const fn speaker(&self) -> &Speaker {
        &self.speaker
    }

    fn water_marks(&self) -> (usize, usize) {
        let settings = self.speaker.settings();
        let high = settings.high_water_mark;
        (high, settings.low_water_mark.min(high))
    }

    /// Retire completed writes in submission order.
    ///
    /// Leaves a waker registered on the oldest pending write, if any.
    fn poll_acks(&mut self, cx: &mut Context<'_>) -> SpeakerResult<()> {
        while let Some((len, ack)) = self.in_flight.front_mut() {
            let len = *len;
            let result = match Pin::new(ack).poll(cx) {
                Poll::Pending => return Ok(()),
                Poll::Ready(result) => result,
            };
            self.in_flight.pop_front();
            self.buffered -= len;
            trace!(bytes = len, buffered = self.buffered, "write acknowledged");

            result.map_err(|_| SpeakerError::runtime("speaker lifecycle task has stopped"))??;
        }
        Ok(())
    }
}

impl Sink<Vec<u8>> for SpeakerSink {
    type Error = SpeakerError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<SpeakerResult<()>> {
        let this = self.get_mut();
        this.poll_acks(cx)?;

        let (high, low) = this.water_marks();
        if this.buffered > high {
            this.backpressured = true;
        }
        if this.backpressured {
            if this.buffered > low {
                return Poll::Pending;
            }
            this.backpressured = false;
        }
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Vec<u8>) -> SpeakerResult<()> {
        let this = self.get_mut();
        let len = item.len();
        let ack = this.speaker.send_write(item);
        this.buffered += len;
        this.in_flight.push_back((len, ack));
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<SpeakerResult<()>> {
        let this = self.get_mut();
        this.poll_acks(cx)?;
        if this.in_flight.is_empty() {
            Poll::Ready(Ok(()))
        } else {
            Poll::Pending
        }
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<SpeakerResult<()>> {
        ready!(self.as_mut().poll_flush(cx))?;

        let this = self.get_mut();
        if this.closing.is_none() {
            let speaker = this.speaker.clone();
            this.closing = Some(Box::pin(async move { speaker.end().await }));
        }
        match this.closing.as_mut() {
            Some(closing) => closing.as_mut().poll(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl std::fmt::Debug for SpeakerSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeakerSink")
            .field("in_flight", &self.in_flight.len())
            .field("buffered", &self.buffered)
            .field("backpressured", &self.backpressured)
            .finish()
    }
}
