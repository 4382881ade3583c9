//! Tests for flush and close: coalescing, immediate close, failures and
//! end of stream on drop.

use super::{count, pattern, speaker_on};
use crate::{MemoryDevice, SessionState, SpeakerError, SpeakerEvent, SpeakerOptions};
use futures::future::join_all;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_concurrent_closes_share_one_teardown() {
    let device = MemoryDevice::new().with_latency(Duration::from_millis(5));
    let (speaker, mut events) = speaker_on(&device, SpeakerOptions::new());
    speaker.write(pattern(64)).await.unwrap();

    let closes = (0..8).map(|i| {
        let speaker = speaker.clone();
        async move { speaker.close(i % 2 == 0).await }
    });
    let results = join_all(closes).await;

    assert_eq!(results.len(), 8);
    assert!(results.iter().all(Result::is_ok));
    assert_eq!(device.stats().closes, 1);

    let events = events.drain();
    assert_eq!(count(&events, |e| *e == SpeakerEvent::Closed), 1);
    assert_eq!(events.last(), Some(&SpeakerEvent::Closed));
}

#[tokio::test]
async fn test_close_after_close_resolves_immediately() {
    let device = MemoryDevice::new();
    let (speaker, mut events) = speaker_on(&device, SpeakerOptions::new());
    speaker.open().await.unwrap();

    speaker.close(false).await.unwrap();
    speaker.close(true).await.unwrap();
    speaker.end().await.unwrap();

    assert_eq!(device.stats().closes, 1);
    assert_eq!(count(&events.drain(), |e| *e == SpeakerEvent::Closed), 1);
}

#[tokio::test]
async fn test_close_before_open() {
    let device = MemoryDevice::new();
    let (speaker, mut events) = speaker_on(&device, SpeakerOptions::new());

    speaker.close(false).await.unwrap();

    let stats = device.stats();
    assert_eq!(stats.opens, 0);
    assert_eq!(stats.flushes, 0);
    assert_eq!(stats.closes, 0);
    assert_eq!(events.drain(), vec![SpeakerEvent::Closed]);
    assert_eq!(speaker.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_flush_closes_the_speaker() {
    let device = MemoryDevice::new();
    let (speaker, mut events) = speaker_on(&device, SpeakerOptions::new());
    speaker.write(pattern(32)).await.unwrap();

    speaker.flush().await.unwrap();

    assert_eq!(
        events.drain(),
        vec![SpeakerEvent::Opened, SpeakerEvent::Flushed, SpeakerEvent::Closed]
    );
    assert_eq!(device.stats().flushes, 1);
}

#[tokio::test(start_paused = true)]
async fn test_immediate_close_skips_flush_and_drops_queued_bytes() {
    let device = MemoryDevice::new().with_latency(Duration::from_millis(10));
    let (speaker, mut events) = speaker_on(&device, SpeakerOptions::new());
    let chunk = speaker.settings().chunk_size();

    let writer = speaker.clone();
    let write = tokio::spawn(async move { writer.write(pattern(10 * chunk)).await });
    tokio::time::sleep(Duration::from_millis(25)).await;

    speaker.close(true).await.unwrap();

    // The write is superseded rather than failed.
    write.await.unwrap().unwrap();

    let stats = device.stats();
    assert_eq!(stats.writes, 3);
    assert_eq!(stats.flushes, 0);
    assert_eq!(stats.closes, 1);
    assert_eq!(device.written().len(), 3 * chunk);
    assert_eq!(events.drain(), vec![SpeakerEvent::Opened, SpeakerEvent::Closed]);
}

#[tokio::test(start_paused = true)]
async fn test_graceful_close_waits_for_queued_writes() {
    let device = MemoryDevice::new().with_latency(Duration::from_millis(10));
    let (speaker, _events) = speaker_on(&device, SpeakerOptions::new());
    let chunk = speaker.settings().chunk_size();

    let write = speaker.send_write(pattern(4 * chunk));
    speaker.end().await.unwrap();
    write.await.unwrap().unwrap();

    assert_eq!(device.written(), pattern(4 * chunk));
    assert_eq!(device.stats().flushes, 1);
}

#[tokio::test]
async fn test_flush_failure_still_closes() {
    let device = MemoryDevice::new().failing_flush(-7);
    let (speaker, mut events) = speaker_on(&device, SpeakerOptions::new());
    speaker.write(pattern(8)).await.unwrap();

    speaker.end().await.unwrap();

    assert_eq!(
        events.drain(),
        vec![
            SpeakerEvent::Opened,
            SpeakerEvent::Error(SpeakerError::device("flush", -7)),
            SpeakerEvent::Closed
        ]
    );
    assert_eq!(device.stats().closes, 1);
    assert_eq!(speaker.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_close_failure_is_reported_once_to_the_caller() {
    let device = MemoryDevice::new().failing_close(-3);
    let (speaker, mut events) = speaker_on(&device, SpeakerOptions::new());
    speaker.open().await.unwrap();

    let err = speaker.close(true).await.unwrap_err();
    assert_eq!(err, SpeakerError::device("close", -3));
    assert_eq!(err.to_string(), "close() failed: -3");

    // The session is released regardless.
    assert_eq!(speaker.state(), SessionState::Closed);
    speaker.close(false).await.unwrap();
    assert_eq!(
        events.drain(),
        vec![
            SpeakerEvent::Opened,
            SpeakerEvent::Error(SpeakerError::device("close", -3)),
            SpeakerEvent::Closed
        ]
    );
}

#[tokio::test]
async fn test_operations_after_close_are_rejected() {
    let device = MemoryDevice::new();
    let (speaker, _events) = speaker_on(&device, SpeakerOptions::new());
    speaker.write(pattern(8)).await.unwrap();
    speaker.end().await.unwrap();

    assert_eq!(speaker.write(pattern(8)).await, Err(SpeakerError::SessionClosed));
    assert_eq!(
        speaker.format(SpeakerOptions::new()).await,
        Err(SpeakerError::SessionClosed)
    );
    assert_eq!(speaker.open().await, Err(SpeakerError::AlreadyOpen));
    assert_eq!(device.written(), pattern(8));
}

#[tokio::test]
async fn test_dropping_every_handle_ends_the_stream() {
    let device = MemoryDevice::new();
    let (speaker, mut events) = speaker_on(&device, SpeakerOptions::new());
    let other = speaker.clone();

    speaker.write(pattern(8)).await.unwrap();
    drop(speaker);
    assert_eq!(device.stats().closes, 0);
    drop(other);

    let mut received = Vec::new();
    while let Some(event) = events.recv().await {
        received.push(event);
    }

    assert_eq!(
        received,
        vec![SpeakerEvent::Opened, SpeakerEvent::Flushed, SpeakerEvent::Closed]
    );
    assert_eq!(device.stats().closes, 1);
}

#[tokio::test]
async fn test_unsubscribed_listener_receives_nothing() {
    let device = MemoryDevice::new();
    let (speaker, events) = speaker_on(&device, SpeakerOptions::new());
    let mut kept = speaker.subscribe();

    events.unsubscribe();
    speaker.open().await.unwrap();

    assert_eq!(kept.drain(), vec![SpeakerEvent::Opened]);
}

#[tokio::test]
async fn test_oversized_frame_count_rejected_and_close_still_clean() {
    let device = MemoryDevice::new();
    let options = SpeakerOptions::new().with_samples_per_frame(usize::MAX);
    let (speaker, mut events) = speaker_on(&device, options);

    assert_eq!(speaker.write(pattern(8)).await, Err(SpeakerError::InvalidFormat));
    assert_eq!(speaker.state(), SessionState::Unopened);

    speaker.close(false).await.unwrap();

    let stats = device.stats();
    assert_eq!(stats.opens, 0);
    assert_eq!(stats.writes, 0);
    assert_eq!(
        events.drain(),
        vec![
            SpeakerEvent::Error(SpeakerError::InvalidFormat),
            SpeakerEvent::Closed
        ]
    );
}
