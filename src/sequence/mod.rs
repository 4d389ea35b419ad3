//! PLYS point cloud sequence decoding and writing.
//!
//! A sequence is a stream of PLY frames preceded by a one-time header that
//! carries the playback framerate.
//!
//! # File Format
//!
//! ```text
//! Sequence header:
//!   plys
//!   framerate <positive float>
//!   [extra declarations...]
//!   end_sequence_header
//!
//! Frame (repeated):
//!   ply
//!   format <ascii | binary_little_endian | binary_big_endian> 1.0
//!   element vertex <N>
//!   [property / comment lines...]
//!   end_header
//!   N records
//!   [blank terminator line]
//! ```
//!
//! ASCII records are one line of `x y z r g b`. Binary records are three
//! `float` coordinates followed by three `uchar` or `float` color channels.
//! Colors are divided by 255 on decode.
//!
//! Sequences may be gzip-compressed as a whole when the `gzip` feature is
//! enabled.

mod cursor;
mod error;
mod format;
mod frame;
mod header;
mod record;
mod source;
mod writer;

pub use cursor::LineCursor;
pub use error::{Location, Result, SequenceError};
pub use format::{
    BinaryLayout, ColorType, Endianness, FORMAT_VERSION, FRAME_HEADER_END, FRAME_MAGIC,
    FRAME_TERMINATOR, RecordFormat, SEQUENCE_HEADER_END, SEQUENCE_MAGIC,
};
pub use frame::{COLOR_SCALE, Frame, PointRecord};
pub use header::{
    Declaration, FORMAT_KEY, FRAMERATE_KEY, FrameHeader, HeaderBlock, SequenceHeader,
    VERTEX_COUNT_KEY,
};
pub use record::{
    RecordDecoder, RecordLine, decode_ascii_record, encode_ascii_record, encode_binary_record,
};
pub use source::{DynReader, FrameSource, GZIP_MAGIC};
pub use writer::{
    Compression, PLY_EXTENSION, SequenceWriter, WriterStats, generate_from_dir, ply_files_in,
};
