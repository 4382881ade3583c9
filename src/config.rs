//! Speaker options and their layered resolution into [`Settings`].
//!
//! Options arrive from several places: the constructor, later calls to
//! `format()`, and upstream producers announcing their format. Each source is
//! a partial [`SpeakerOptions`]; resolution walks an explicit precedence list
//! and takes the first value that is present, falling back to the defaults
//! below.

use crate::error::{SpeakerError, SpeakerResult};
use crate::format::{Endianness, FormatSpec};
use serde::Deserialize;
use tracing::debug;

/// Default bit depth for integer samples.
pub const DEFAULT_BIT_DEPTH: u16 = 16;
/// Default bit depth when `float` is requested without a bit depth.
pub const DEFAULT_FLOAT_BIT_DEPTH: u16 = 32;
/// Default channel count.
pub const DEFAULT_CHANNELS: u16 = 2;
/// Default sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
/// Default number of frames per device write.
pub const DEFAULT_SAMPLES_PER_FRAME: usize = 1024;
/// Default high and low water marks, in bytes.
pub const DEFAULT_WATER_MARK: usize = 0;

/// Partial speaker configuration. Absent fields defer to lower layers.
///
/// Deserializes from the camelCase option names (`bitDepth`, `sampleRate`,
/// `samplesPerFrame`, ...). Unrecognized keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpeakerOptions {
    /// Bits per sample.
    pub bit_depth: Option<u16>,
    /// Interleaved channel count.
    pub channels: Option<u16>,
    /// Frames per second.
    pub sample_rate: Option<u32>,
    /// Integer samples are signed.
    pub signed: Option<bool>,
    /// Samples are IEEE floats.
    pub float: Option<bool>,
    /// Byte order of samples; must match the host.
    pub endianness: Option<Endianness>,
    /// Frames per device write.
    pub samples_per_frame: Option<usize>,
    /// Unacknowledged bytes the sink accepts before applying backpressure.
    pub high_water_mark: Option<usize>,
    /// Unacknowledged bytes the sink drains down to before releasing backpressure.
    pub low_water_mark: Option<usize>,
}

impl SpeakerOptions {
    /// Empty options: every value comes from defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options describing an existing format.
    pub const fn from_format(format: &FormatSpec) -> Self {
        Self {
            bit_depth: Some(format.bit_depth),
            channels: Some(format.channels),
            sample_rate: Some(format.sample_rate),
            signed: Some(format.signed),
            float: Some(format.float),
            endianness: Some(format.endianness),
            samples_per_frame: None,
            high_water_mark: None,
            low_water_mark: None,
        }
    }

    /// Set bit depth
    pub const fn with_bit_depth(mut self, bit_depth: u16) -> Self {
        self.bit_depth = Some(bit_depth);
        self
    }

    /// Set channel count
    pub const fn with_channels(mut self, channels: u16) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Set sample rate
    pub const fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    /// Set signedness
    pub const fn with_signed(mut self, signed: bool) -> Self {
        self.signed = Some(signed);
        self
    }

    /// Set float samples
    pub const fn with_float(mut self, float: bool) -> Self {
        self.float = Some(float);
        self
    }

    /// Set byte order
    pub const fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = Some(endianness);
        self
    }

    /// Set frames per device write
    pub const fn with_samples_per_frame(mut self, samples_per_frame: usize) -> Self {
        self.samples_per_frame = Some(samples_per_frame);
        self
    }

    /// Set both water marks
    pub const fn with_water_marks(mut self, high: usize, low: usize) -> Self {
        self.high_water_mark = Some(high);
        self.low_water_mark = Some(low);
        self
    }

    /// Layer `newer` over `self`, keeping values `newer` leaves absent.
    pub fn merged(&self, newer: &SpeakerOptions) -> SpeakerOptions {
        let layers = [newer, self];
        SpeakerOptions {
            bit_depth: first_present(&layers, |o| o.bit_depth),
            channels: first_present(&layers, |o| o.channels),
            sample_rate: first_present(&layers, |o| o.sample_rate),
            signed: first_present(&layers, |o| o.signed),
            float: first_present(&layers, |o| o.float),
            endianness: first_present(&layers, |o| o.endianness),
            samples_per_frame: first_present(&layers, |o| o.samples_per_frame),
            high_water_mark: first_present(&layers, |o| o.high_water_mark),
            low_water_mark: first_present(&layers, |o| o.low_water_mark),
        }
    }
}

/// Take the value from the first layer that has one.
///
/// Layers are ordered from highest to lowest precedence.
pub fn first_present<T, F>(layers: &[&SpeakerOptions], field: F) -> Option<T>
where
    F: Fn(&SpeakerOptions) -> Option<T>,
{
    layers.iter().find_map(|layer| field(*layer))
}

/// Fully resolved speaker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Format handed to the device.
    pub format: FormatSpec,
    /// Frames per device write.
    pub samples_per_frame: usize,
    /// Sink backpressure threshold, in bytes.
    pub high_water_mark: usize,
    /// Sink backpressure release level, in bytes.
    pub low_water_mark: usize,
}

impl Settings {
    /// Resolve options layered from highest to lowest precedence.
    ///
    /// Fails only when a non-native byte order is requested; unsupported
    /// formats are reported when the device is opened.
    pub fn resolve(layers: &[&SpeakerOptions]) -> SpeakerResult<Self> {
        let float = first_present(layers, |o| o.float).unwrap_or(false);
        let bit_depth = first_present(layers, |o| o.bit_depth).unwrap_or(if float {
            DEFAULT_FLOAT_BIT_DEPTH
        } else {
            DEFAULT_BIT_DEPTH
        });
        let signed = first_present(layers, |o| o.signed).unwrap_or(bit_depth != 8);

        let endianness = match first_present(layers, |o| o.endianness) {
            Some(requested) if !requested.is_native() => {
                return Err(SpeakerError::UnsupportedEndianness {
                    native: Endianness::NATIVE,
                    requested,
                });
            }
            _ => Endianness::NATIVE,
        };

        let format = FormatSpec {
            bit_depth,
            float,
            signed,
            channels: first_present(layers, |o| o.channels).unwrap_or(DEFAULT_CHANNELS),
            sample_rate: first_present(layers, |o| o.sample_rate).unwrap_or(DEFAULT_SAMPLE_RATE),
            endianness,
        };

        let settings = Self {
            format,
            samples_per_frame: first_present(layers, |o| o.samples_per_frame)
                .unwrap_or(DEFAULT_SAMPLES_PER_FRAME),
            high_water_mark: first_present(layers, |o| o.high_water_mark)
                .unwrap_or(DEFAULT_WATER_MARK),
            low_water_mark: first_present(layers, |o| o.low_water_mark)
                .unwrap_or(DEFAULT_WATER_MARK),
        };

        debug!(
            bit_depth,
            float,
            signed,
            channels = settings.format.channels,
            sample_rate = settings.format.sample_rate,
            block_align = settings.block_align(),
            samples_per_frame = settings.samples_per_frame,
            "resolved speaker settings"
        );

        Ok(settings)
    }

    /// Resolve a single set of options over the defaults.
    pub fn from_options(options: &SpeakerOptions) -> SpeakerResult<Self> {
        Self::resolve(&[options])
    }

    /// Bytes per frame.
    pub const fn block_align(&self) -> usize {
        self.format.block_align()
    }

    /// Largest slice handed to the device in one write.
    ///
    /// Saturates instead of overflowing; see [`checked_chunk_size`](Self::checked_chunk_size).
    pub const fn chunk_size(&self) -> usize {
        self.block_align().saturating_mul(self.samples_per_frame)
    }

    /// Chunk size, or `None` if it is zero or does not fit in `usize`.
    pub const fn checked_chunk_size(&self) -> Option<usize> {
        match self.block_align().checked_mul(self.samples_per_frame) {
            Some(0) | None => None,
            size => size,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            format: FormatSpec::cd_quality(),
            samples_per_frame: DEFAULT_SAMPLES_PER_FRAME,
            high_water_mark: DEFAULT_WATER_MARK,
            low_water_mark: DEFAULT_WATER_MARK,
        }
    }
}
