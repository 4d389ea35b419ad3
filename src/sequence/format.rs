//! Format definitions for PLYS sequence files.

use std::fmt;

/// Opening marker of the sequence header.
pub const SEQUENCE_MAGIC: &str = "plys";

/// Closing marker of the sequence header.
pub const SEQUENCE_HEADER_END: &str = "end_sequence_header";

/// Opening marker of every frame header.
pub const FRAME_MAGIC: &str = "ply";

/// Closing marker of every frame header.
pub const FRAME_HEADER_END: &str = "end_header";

/// The only record format version understood.
pub const FORMAT_VERSION: &str = "1.0";

/// Frame terminator written after each frame body.
pub const FRAME_TERMINATOR: &[u8; 2] = b"\r\n";

/// Byte order of binary records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

/// Encoding of a frame's point records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFormat {
    /// One line of six whitespace-separated numbers per point.
    #[default]
    Ascii,
    /// Fixed-size little-endian records.
    BinaryLittleEndian,
    /// Fixed-size big-endian records.
    BinaryBigEndian,
}

impl RecordFormat {
    /// Name used in the `format` declaration.
    pub fn name(self) -> &'static str {
        match self {
            RecordFormat::Ascii => "ascii",
            RecordFormat::BinaryLittleEndian => "binary_little_endian",
            RecordFormat::BinaryBigEndian => "binary_big_endian",
        }
    }

    /// Look up a format by its declaration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ascii" => Some(RecordFormat::Ascii),
            "binary_little_endian" => Some(RecordFormat::BinaryLittleEndian),
            "binary_big_endian" => Some(RecordFormat::BinaryBigEndian),
            _ => None,
        }
    }

    /// Byte order, or `None` for text records.
    pub fn endianness(self) -> Option<Endianness> {
        match self {
            RecordFormat::Ascii => None,
            RecordFormat::BinaryLittleEndian => Some(Endianness::Little),
            RecordFormat::BinaryBigEndian => Some(Endianness::Big),
        }
    }

    pub fn is_binary(self) -> bool {
        self.endianness().is_some()
    }
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name(), FORMAT_VERSION)
    }
}

/// Scalar type of the color channels in binary records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorType {
    /// One unsigned byte per channel.
    #[default]
    Uchar,
    /// One 32-bit float per channel.
    Float,
}

impl ColorType {
    /// PLY property type name.
    pub fn name(self) -> &'static str {
        match self {
            ColorType::Uchar => "uchar",
            ColorType::Float => "float",
        }
    }

    /// Accepts the PLY type names and their sized aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "uchar" | "uint8" => Some(ColorType::Uchar),
            "float" | "float32" => Some(ColorType::Float),
            _ => None,
        }
    }

    /// Size of one channel in bytes.
    pub fn size(self) -> usize {
        match self {
            ColorType::Uchar => 1,
            ColorType::Float => 4,
        }
    }
}

/// Layout of one binary point record.
///
/// ```text
/// x y z    : 3 x f32
/// r g b    : 3 x u8 (uchar) or 3 x f32 (float)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryLayout {
    pub endianness: Endianness,
    pub color: ColorType,
}

impl BinaryLayout {
    /// Size of one record in bytes.
    pub fn record_size(&self) -> usize {
        3 * 4 + 3 * self.color.size()
    }
}
