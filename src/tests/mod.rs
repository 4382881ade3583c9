//! Tests for the speaker lifecycle driven through its public handle.
//!
//! Each file exercises one surface against a [`MemoryDevice`]: the speaker
//! operations, lifecycle edge cases around close, and the sink adapter.

use crate::{MemoryDevice, Speaker, SpeakerEvent, SpeakerOptions, Subscription};

mod lifecycle_tests;
mod sink_tests;

/// Speaker on `device` plus a subscription taken before any operation.
pub(crate) fn speaker_on(device: &MemoryDevice, options: SpeakerOptions) -> (Speaker, Subscription) {
    let speaker = Speaker::new(device.clone(), options).expect("speaker construction failed");
    let events = speaker.subscribe();
    (speaker, events)
}

/// Deterministic byte pattern so ordering mistakes show up in comparisons.
pub(crate) fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}

/// Count events matching `predicate`.
pub(crate) fn count(events: &[SpeakerEvent], predicate: impl Fn(&SpeakerEvent) -> bool) -> usize {
    events.iter().filter(|event| predicate(event)).count()
}
