//! Tests for the sink adapter and its water-mark backpressure.

use super::{pattern, speaker_on};
use crate::{MemoryDevice, SpeakerError, SpeakerEvent, SpeakerOptions};
use futures::task::noop_waker_ref;
use futures::{Sink, SinkExt, stream};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

fn poll_ready_once<S: Sink<Vec<u8>> + Unpin>(sink: &mut S) -> Poll<Result<(), S::Error>> {
    let mut cx = Context::from_waker(noop_waker_ref());
    Pin::new(sink).poll_ready(&mut cx)
}

#[tokio::test]
async fn test_send_all_then_close_plays_everything() {
    let device = MemoryDevice::new();
    let (speaker, mut events) = speaker_on(&device, SpeakerOptions::new());
    let mut sink = speaker.sink();

    let chunks: Vec<Vec<u8>> = (0..5).map(|i| vec![i as u8; 300]).collect();
    let expected: Vec<u8> = chunks.concat();
    let mut source = stream::iter(chunks.into_iter().map(Ok::<_, SpeakerError>));

    sink.send_all(&mut source).await.unwrap();
    sink.close().await.unwrap();

    assert_eq!(device.written(), expected);
    assert_eq!(sink.buffered(), 0);
    assert_eq!(
        events.drain(),
        vec![SpeakerEvent::Opened, SpeakerEvent::Flushed, SpeakerEvent::Closed]
    );
}

#[tokio::test(start_paused = true)]
async fn test_backpressure_above_high_water_mark() {
    let device = MemoryDevice::new().with_latency(Duration::from_millis(10));
    let options = SpeakerOptions::new().with_water_marks(100, 10);
    let (speaker, _events) = speaker_on(&device, options);
    let mut sink = speaker.sink();

    assert!(matches!(poll_ready_once(&mut sink), Poll::Ready(Ok(()))));
    Pin::new(&mut sink).start_send(pattern(60)).unwrap();
    assert!(matches!(poll_ready_once(&mut sink), Poll::Ready(Ok(()))));
    Pin::new(&mut sink).start_send(pattern(60)).unwrap();
    assert_eq!(sink.buffered(), 120);

    assert!(poll_ready_once(&mut sink).is_pending());

    sink.flush().await.unwrap();
    assert_eq!(sink.buffered(), 0);
    assert!(matches!(poll_ready_once(&mut sink), Poll::Ready(Ok(()))));
    assert_eq!(device.written().len(), 120);
}

#[tokio::test(start_paused = true)]
async fn test_backpressure_releases_at_low_water_mark() {
    let device = MemoryDevice::new().with_latency(Duration::from_millis(10));
    let options = SpeakerOptions::new().with_water_marks(100, 50);
    let (speaker, _events) = speaker_on(&device, options);
    let mut sink = speaker.sink();

    for _ in 0..3 {
        Pin::new(&mut sink).start_send(pattern(40)).unwrap();
    }
    assert!(poll_ready_once(&mut sink).is_pending());

    // Acknowledgements arrive one write at a time; the sink reopens once
    // no more than 50 bytes are outstanding.
    futures::future::poll_fn(|cx| Pin::new(&mut sink).poll_ready(cx))
        .await
        .unwrap();
    assert!(sink.buffered() <= 50);
}

#[tokio::test]
async fn test_write_error_surfaces_through_sink() {
    let device = MemoryDevice::new().short_write_at(0);
    let (speaker, _events) = speaker_on(&device, SpeakerOptions::new());
    let mut sink = speaker.sink();

    let err = sink.send(pattern(100)).await.unwrap_err();

    assert_eq!(err, SpeakerError::short_write(100, 50));
    sink.send(pattern(10)).await.unwrap();
}
