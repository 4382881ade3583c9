// Correctness and logic
#![warn(clippy::unit_cmp)] // Detects comparing unit types
#![warn(clippy::match_same_arms)]
// Duplicate match arms

// Performance-focused
#![warn(clippy::inefficient_to_string)] // `format!("{}", x)` vs `x.to_string()`
#![warn(clippy::map_clone)] // Cloning inside `map()` unnecessarily
#![warn(clippy::unnecessary_to_owned)] // Detects redundant `.to_owned()` or `.clone()`
#![warn(clippy::large_stack_arrays)] // Helps avoid stack overflows
#![warn(clippy::box_collection)] // Warns on boxed `Vec`, `String`, etc.
#![warn(clippy::vec_box)] // Avoids using `Vec<Box<T>>` when unnecessary
#![warn(clippy::needless_collect)] // Avoids `.collect().iter()` chains

// Style and idiomatic Rust
#![warn(clippy::redundant_clone)] // Detects unnecessary `.clone()`
#![warn(clippy::identity_op)] // e.g., `x + 0`, `x * 1`
#![warn(clippy::needless_return)] // Avoids `return` at the end of functions
#![warn(clippy::let_unit_value)] // Avoids binding `()` to variables
#![warn(clippy::manual_map)] // Use `.map()` instead of manual `match`
#![warn(clippy::unwrap_used)] // Avoids using `unwrap()`

// Maintainability
#![warn(clippy::missing_panics_doc)] // Docs for functions that might panic
#![warn(clippy::missing_safety_doc)] // Docs for `unsafe` functions
#![warn(clippy::missing_const_for_fn)] // Suggests making eligible functions `const`
#![allow(clippy::too_many_arguments)]
// Allow functions with many parameters (very few and far between)
#![deny(missing_docs)] // Documentation is a must for release

//! # pcm_speaker
//!
//! Streaming PCM playback: write raw, interleaved audio bytes and hear them on
//! an output device.
//!
//! ## Installation
//!
//! ```toml
//! [dependencies]
//! pcm_speaker = "0.1.0"
//! ```
//!
//! To play through the host's default output device, enable `playback`:
//!
//! ```toml
//! [dependencies]
//! pcm_speaker = { version = "*", features = ["playback"] }
//! ```
//!
//! ## Features
//!
//! - `playback`: the `CpalDevice` backend (adds `cpal` and `bytemuck`)
//!
//! Without it the crate ships [`MemoryDevice`], which records everything it is
//! handed and can inject device failures for testing.
//!
//! ## Overview
//!
//! A [`Speaker`] owns one device session. The device is opened lazily on the
//! first write with the format resolved from [`SpeakerOptions`]; the format is
//! fixed from then on. Inbound buffers are cut into writes of
//! `block_align * samples_per_frame` bytes and handed to the device strictly
//! one at a time, in submission order.
//!
//! Ending the stream (or dropping the last handle) flushes the device and
//! closes it. An immediate close skips the flush and drops whatever has not
//! reached the device yet. However many close requests arrive, the device is
//! closed once and a single [`SpeakerEvent::Closed`] is emitted.
//!
//! ```rust,ignore
//! use pcm_speaker::{MemoryDevice, Speaker, SpeakerEvent, SpeakerOptions};
//!
//! let speaker = Speaker::new(
//!     MemoryDevice::new(),
//!     SpeakerOptions::new().with_channels(1).with_sample_rate(48000),
//! )?;
//! let mut events = speaker.subscribe();
//!
//! speaker.write(vec![0u8; 9600]).await?;
//! speaker.end().await?;
//!
//! assert_eq!(events.drain().last(), Some(SpeakerEvent::Closed));
//! ```
//!
//! ## Error Handling
//!
//! Every failure is a [`SpeakerError`]. It is returned to the caller whose
//! operation failed and also published to subscribers as
//! [`SpeakerEvent::Error`]:
//!
//! ```rust
//! use pcm_speaker::{ErrorKind, SpeakerError};
//!
//! let err = SpeakerError::DeviceOpen { code: -2 };
//! assert_eq!(err.to_string(), "open() failed: -2");
//! assert_eq!(err.kind(), ErrorKind::DeviceOpen);
//! assert!(err.is_recoverable());
//! ```
//!
//! ## License
//!
//! MIT License

pub mod chunker;
pub mod config;
pub mod device;
mod error;
pub mod events;
pub mod format;
mod lifecycle;
pub mod sink;
pub mod speaker;

#[cfg(test)]
mod tests;

pub use crate::chunker::{Drain, FrameChunker};
pub use crate::config::{Settings, SpeakerOptions};
pub use crate::device::{AudioDevice, BackendInfo, DeviceSession, MemoryDevice, SessionState};
pub use crate::error::{ErrorKind, SpeakerError, SpeakerResult};
pub use crate::events::{EventBus, SpeakerEvent, SubscriberId, Subscription};
pub use crate::format::{Encoding, EncodingSet, Endianness, FormatSpec};
pub use crate::sink::SpeakerSink;
pub use crate::speaker::{PipeHandle, Speaker};

#[cfg(feature = "playback")]
pub use crate::device::CpalDevice;
