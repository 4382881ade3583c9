//! Sample format description and resolution to device encodings.
//!
//! A [`FormatSpec`] describes interleaved PCM in the layout the caller will
//! write. [`resolve`] maps it to the [`Encoding`] tag the device understands,
//! and [`is_supported`] further checks that tag against the device's
//! advertised [`EncodingSet`].

use serde::Deserialize;
use std::fmt;

/// Byte order of multi-byte samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Endianness {
    /// Little endian.
    #[serde(rename = "LE", alias = "little", alias = "le")]
    Little,
    /// Big endian.
    #[serde(rename = "BE", alias = "big", alias = "be")]
    Big,
}

impl Endianness {
    /// Byte order of the host this crate was compiled for.
    pub const NATIVE: Self = if cfg!(target_endian = "big") {
        Self::Big
    } else {
        Self::Little
    };

    /// The other byte order.
    pub const fn opposite(self) -> Self {
        match self {
            Self::Little => Self::Big,
            Self::Big => Self::Little,
        }
    }

    /// Check if this is the host byte order.
    pub const fn is_native(self) -> bool {
        matches!(
            (self, Self::NATIVE),
            (Self::Little, Self::Little) | (Self::Big, Self::Big)
        )
    }
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Little => "LE",
            Self::Big => "BE",
        })
    }
}

/// Fully resolved description of the PCM stream handed to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatSpec {
    /// Bits per sample. Only 8, 16, 24, 32 and 64 resolve.
    pub bit_depth: u16,
    /// Samples are IEEE floats.
    pub float: bool,
    /// Integer samples are signed.
    pub signed: bool,
    /// Interleaved channel count.
    pub channels: u16,
    /// Frames per second.
    pub sample_rate: u32,
    /// Byte order of samples, always the host order once validated.
    pub endianness: Endianness,
}

impl FormatSpec {
    /// CD quality: signed 16-bit, stereo, 44100 Hz.
    pub const fn cd_quality() -> Self {
        Self {
            bit_depth: 16,
            float: false,
            signed: true,
            channels: 2,
            sample_rate: 44100,
            endianness: Endianness::NATIVE,
        }
    }

    /// Bytes per frame: `bit_depth / 8 * channels`.
    pub const fn block_align(&self) -> usize {
        (self.bit_depth as usize / 8) * self.channels as usize
    }
}

impl Default for FormatSpec {
    fn default() -> Self {
        Self::cd_quality()
    }
}

/// A device encoding tag.
///
/// Tag values follow the mpg123 output module constants so they can be passed
/// straight through to native backends built on that convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Unsigned 8-bit integer.
    Unsigned8,
    /// Signed 8-bit integer.
    Signed8,
    /// Unsigned 16-bit integer.
    Unsigned16,
    /// Signed 16-bit integer.
    Signed16,
    /// Unsigned 24-bit integer, packed in three bytes.
    Unsigned24,
    /// Signed 24-bit integer, packed in three bytes.
    Signed24,
    /// Unsigned 32-bit integer.
    Unsigned32,
    /// Signed 32-bit integer.
    Signed32,
    /// 32-bit IEEE float.
    Float32,
    /// 64-bit IEEE float.
    Float64,
}

impl Encoding {
    /// Every encoding a device may advertise.
    pub const ALL: [Self; 10] = [
        Self::Unsigned8,
        Self::Signed8,
        Self::Unsigned16,
        Self::Signed16,
        Self::Unsigned24,
        Self::Signed24,
        Self::Unsigned32,
        Self::Signed32,
        Self::Float32,
        Self::Float64,
    ];

    /// Native tag value of this encoding.
    pub const fn tag(self) -> u32 {
        match self {
            Self::Unsigned8 => 0x0001,
            Self::Signed8 => 0x0082,
            Self::Unsigned16 => 0x0060,
            Self::Signed16 => 0x00d0,
            Self::Unsigned24 => 0x6000,
            Self::Signed24 => 0x5080,
            Self::Unsigned32 => 0x2100,
            Self::Signed32 => 0x1180,
            Self::Float32 => 0x0200,
            Self::Float64 => 0x0400,
        }
    }

    /// Look up the encoding carrying exactly this native tag.
    pub fn from_tag(tag: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|encoding| encoding.tag() == tag)
    }

    /// Bytes occupied by one sample of one channel.
    pub const fn sample_bytes(self) -> usize {
        match self {
            Self::Unsigned8 | Self::Signed8 => 1,
            Self::Unsigned16 | Self::Signed16 => 2,
            Self::Unsigned24 | Self::Signed24 => 3,
            Self::Unsigned32 | Self::Signed32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// Check if this is a floating point encoding.
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unsigned8 => "u8",
            Self::Signed8 => "s8",
            Self::Unsigned16 => "u16",
            Self::Signed16 => "s16",
            Self::Unsigned24 => "u24",
            Self::Signed24 => "s24",
            Self::Unsigned32 => "u32",
            Self::Signed32 => "s32",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
        };
        f.write_str(name)
    }
}

/// Bitmask of encodings a device advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EncodingSet(u32);

impl EncodingSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Wrap a raw mask as reported by the device.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw mask value.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Set containing every [`Encoding`].
    pub fn all() -> Self {
        Encoding::ALL.into_iter().collect()
    }

    /// Add an encoding.
    pub const fn with(self, encoding: Encoding) -> Self {
        Self(self.0 | encoding.tag())
    }

    /// Check if every bit of the encoding's tag is advertised.
    pub const fn contains(self, encoding: Encoding) -> bool {
        self.contains_tag(encoding.tag())
    }

    /// Check a raw tag against the mask.
    pub const fn contains_tag(self, tag: u32) -> bool {
        tag != 0 && self.0 & tag == tag
    }

    /// Encodings fully covered by this mask.
    pub fn iter(self) -> impl Iterator<Item = Encoding> {
        Encoding::ALL
            .into_iter()
            .filter(move |encoding| self.contains(*encoding))
    }
}

impl FromIterator<Encoding> for EncodingSet {
    fn from_iter<I: IntoIterator<Item = Encoding>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

/// Map a format to the device encoding tag, or `None` if it is unsupported.
///
/// Floats resolve only at 32 or 64 bits; integers at 8, 16, 24 or 32 bits.
pub const fn resolve(spec: &FormatSpec) -> Option<Encoding> {
    if spec.float {
        return match spec.bit_depth {
            32 => Some(Encoding::Float32),
            64 => Some(Encoding::Float64),
            _ => None,
        };
    }

    match (spec.bit_depth, spec.signed) {
        (8, true) => Some(Encoding::Signed8),
        (8, false) => Some(Encoding::Unsigned8),
        (16, true) => Some(Encoding::Signed16),
        (16, false) => Some(Encoding::Unsigned16),
        (24, true) => Some(Encoding::Signed24),
        (24, false) => Some(Encoding::Unsigned24),
        (32, true) => Some(Encoding::Signed32),
        (32, false) => Some(Encoding::Unsigned32),
        _ => None,
    }
}

/// Resolve the format and require the device to advertise the result.
pub fn is_supported(spec: &FormatSpec, supported: EncodingSet) -> bool {
    resolve(spec).is_some_and(|encoding| supported.contains(encoding))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(bit_depth: u16, float: bool, signed: bool) -> FormatSpec {
        FormatSpec {
            bit_depth,
            float,
            signed,
            ..FormatSpec::cd_quality()
        }
    }

    #[test]
    fn test_resolve_known_formats() {
        assert_eq!(resolve(&spec(16, false, true)), Some(Encoding::Signed16));
        assert_eq!(resolve(&spec(16, false, false)), Some(Encoding::Unsigned16));
        assert_eq!(resolve(&spec(8, false, false)), Some(Encoding::Unsigned8));
        assert_eq!(resolve(&spec(24, false, true)), Some(Encoding::Signed24));
        assert_eq!(resolve(&spec(32, false, true)), Some(Encoding::Signed32));
        assert_eq!(resolve(&spec(32, true, true)), Some(Encoding::Float32));
        assert_eq!(resolve(&spec(64, true, false)), Some(Encoding::Float64));
    }

    #[test]
    fn test_resolve_rejects_unknown_depths() {
        assert_eq!(resolve(&spec(31, false, true)), None);
        assert_eq!(resolve(&spec(64, false, true)), None);
        assert_eq!(resolve(&spec(0, false, true)), None);
        // Floats only exist at 32 and 64 bits.
        assert_eq!(resolve(&spec(16, true, true)), None);
        assert_eq!(resolve(&spec(24, true, false)), None);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        for bit_depth in [8, 16, 24, 31, 32, 64] {
            for float in [false, true] {
                for signed in [false, true] {
                    let format = spec(bit_depth, float, signed);
                    assert_eq!(resolve(&format), resolve(&format));
                }
            }
        }
    }

    #[test]
    fn test_tags_round_trip_through_lookup() {
        for encoding in Encoding::ALL {
            assert_eq!(Encoding::from_tag(encoding.tag()), Some(encoding));
        }
        assert_eq!(Encoding::from_tag(0x0d0), Some(Encoding::Signed16));
        assert_eq!(Encoding::from_tag(0x1234), None);
    }

    #[test]
    fn test_is_supported_intersects_mask() {
        let mask = EncodingSet::EMPTY
            .with(Encoding::Signed16)
            .with(Encoding::Float32);

        assert!(is_supported(&spec(16, false, true), mask));
        assert!(is_supported(&spec(32, true, true), mask));
        // Resolvable but not advertised.
        assert!(!is_supported(&spec(16, false, false), mask));
        assert!(!is_supported(&spec(8, false, false), mask));
        // Not resolvable at all.
        assert!(!is_supported(&spec(31, false, true), EncodingSet::all()));
    }

    #[test]
    fn test_mask_requires_every_tag_bit() {
        // Signed16 (0xd0) shares bits with Signed8 (0x82) but is not covered by it.
        let mask = EncodingSet::EMPTY.with(Encoding::Signed8);
        assert!(mask.contains(Encoding::Signed8));
        assert!(!mask.contains(Encoding::Signed16));
        assert!(!mask.contains_tag(0));
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![Encoding::Signed8]);
    }

    #[test]
    fn test_block_align() {
        assert_eq!(FormatSpec::cd_quality().block_align(), 4);
        assert_eq!(spec(24, false, true).block_align(), 6);
        assert_eq!(
            FormatSpec {
                channels: 6,
                ..spec(64, true, true)
            }
            .block_align(),
            48
        );
    }

    #[test]
    fn test_endianness() {
        assert!(Endianness::NATIVE.is_native());
        assert!(!Endianness::NATIVE.opposite().is_native());
        assert_eq!(Endianness::Little.to_string(), "LE");
    }
}
