//! Header block parsing.
//!
//! A header block is a run of declaration lines between an opening marker
//! (`plys` or `ply`) and a closing marker (`end_sequence_header` or
//! `end_header`). Declarations are matched by keyword on whitespace token
//! boundaries; the value tokens follow the keyword. Declarations nobody asks
//! for are kept verbatim so unknown extensions survive a parse.

use std::io::BufRead;

use log::warn;

use super::cursor::LineCursor;
use super::error::{Result, SequenceError};
use super::format::{
    BinaryLayout, ColorType, FORMAT_VERSION, FRAME_HEADER_END, FRAME_MAGIC, RecordFormat,
    SEQUENCE_HEADER_END, SEQUENCE_MAGIC,
};
use crate::schema::DuplicatePolicy;

/// Sequence header keyword carrying the playback rate.
pub const FRAMERATE_KEY: &str = "framerate";
/// Frame header keyword carrying the record encoding.
pub const FORMAT_KEY: &str = "format";
/// Frame header keyword carrying the point count.
pub const VERTEX_COUNT_KEY: &str = "element vertex";

const ELEMENT_KEY: &str = "element";
const PROPERTY_KEY: &str = "property";

/// One raw declaration line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    /// 1-based line number in the stream.
    pub line: u64,
    /// Line text without terminator.
    pub text: String,
}

impl Declaration {
    /// Value tokens following `keyword`, if this declaration starts with it.
    ///
    /// `keyword` may span several tokens (`"element vertex"`).
    pub fn values(&self, keyword: &str) -> Option<Vec<&str>> {
        let mut tokens = self.text.split_whitespace();
        for expected in keyword.split_whitespace() {
            if tokens.next()? != expected {
                return None;
            }
        }
        Some(tokens.collect())
    }
}

/// A parsed header block.
#[derive(Debug, Clone)]
pub struct HeaderBlock {
    /// Line of the opening marker.
    pub open_line: u64,
    /// Line of the closing marker.
    pub close_line: u64,
    /// Declarations between the markers, in stream order.
    pub declarations: Vec<Declaration>,
}

impl HeaderBlock {
    /// Read a block delimited by `open` and `close`.
    ///
    /// Returns `Ok(None)` when the stream ends before the opening marker.
    /// Blank lines before the opening marker are skipped when `skip_blank`
    /// is set and rejected otherwise.
    pub fn read<R: BufRead>(
        cursor: &mut LineCursor<R>,
        open: &'static str,
        close: &'static str,
        skip_blank: bool,
    ) -> Result<Option<Self>> {
        let open_line = loop {
            let Some(line) = cursor.read_line()? else {
                return Ok(None);
            };
            if line == open {
                break cursor.line();
            }
            if skip_blank && line.trim().is_empty() {
                continue;
            }
            return Err(SequenceError::format(
                cursor.line(),
                format!("expected `{}`, found `{}`", open, line),
            ));
        };

        let mut declarations = Vec::new();
        loop {
            let Some(line) = cursor.read_line()? else {
                return Err(SequenceError::MissingMarker { marker: close });
            };
            if line == close {
                return Ok(Some(Self {
                    open_line,
                    close_line: cursor.line(),
                    declarations,
                }));
            }
            declarations.push(Declaration {
                line: cursor.line(),
                text: line,
            });
        }
    }

    /// Look up `keyword` under the given duplicate policy.
    ///
    /// Repeats with identical values are always accepted.
    pub fn lookup(
        &self,
        keyword: &'static str,
        policy: DuplicatePolicy,
    ) -> Result<Option<(&Declaration, Vec<&str>)>> {
        let mut matches = self
            .declarations
            .iter()
            .filter_map(|d| d.values(keyword).map(|v| (d, v)));

        let Some(first) = matches.next() else {
            return Ok(None);
        };

        for (decl, values) in matches {
            if values == first.1 {
                continue;
            }
            match policy {
                DuplicatePolicy::FirstWins => {
                    warn!(
                        "Ignoring duplicate `{}` at line {} (first declared at line {})",
                        keyword, decl.line, first.0.line
                    );
                }
                DuplicatePolicy::Reject => {
                    return Err(SequenceError::DuplicateDeclaration {
                        key: keyword,
                        line: decl.line,
                    });
                }
            }
        }

        Ok(Some(first))
    }

    /// Like [`lookup`](Self::lookup), but fails if the key is absent.
    pub fn require(
        &self,
        keyword: &'static str,
        policy: DuplicatePolicy,
    ) -> Result<(&Declaration, Vec<&str>)> {
        self.lookup(keyword, policy)?
            .ok_or(SequenceError::MissingDeclaration {
                key: keyword,
                line: self.close_line,
            })
    }

    /// The `n`th value token after `keyword`; fails if the key is absent.
    pub fn require_value(
        &self,
        keyword: &'static str,
        n: usize,
        policy: DuplicatePolicy,
    ) -> Result<(&str, u64)> {
        let (decl, values) = self.require(keyword, policy)?;
        let value = nth_value(decl, &values, keyword, n)?;
        Ok((value, decl.line))
    }
}

fn nth_value<'a>(
    decl: &Declaration,
    values: &[&'a str],
    keyword: &str,
    n: usize,
) -> Result<&'a str> {
    values.get(n).copied().ok_or_else(|| {
        SequenceError::format(decl.line, format!("`{}` declaration has no value", keyword))
    })
}

/// Header read once at the start of a sequence.
#[derive(Debug, Clone)]
pub struct SequenceHeader {
    /// Playback rate in frames per second.
    pub framerate: f32,
    /// All declarations, including `framerate`.
    pub declarations: Vec<Declaration>,
}

impl SequenceHeader {
    /// Read the sequence header block from the cursor.
    pub fn read<R: BufRead>(cursor: &mut LineCursor<R>, policy: DuplicatePolicy) -> Result<Self> {
        let block = HeaderBlock::read(cursor, SEQUENCE_MAGIC, SEQUENCE_HEADER_END, false)?
            .ok_or_else(|| SequenceError::format(0, "empty stream, no sequence header"))?;
        Self::from_block(block, policy)
    }

    pub fn from_block(block: HeaderBlock, policy: DuplicatePolicy) -> Result<Self> {
        let (value, line) = block.require_value(FRAMERATE_KEY, 0, policy)?;
        let framerate = match value.parse::<f32>() {
            Ok(rate) if rate.is_finite() && rate > 0.0 => rate,
            _ => {
                return Err(SequenceError::format(
                    line,
                    format!("framerate must be a positive number, got `{}`", value),
                ));
            }
        };

        Ok(Self {
            framerate,
            declarations: block.declarations,
        })
    }
}

/// Header read before every frame body.
#[derive(Debug, Clone)]
pub struct FrameHeader {
    /// Number of point records in the body, at most `u32::MAX` so every
    /// point has a `u32` draw index.
    pub vertex_count: usize,
    /// Encoding of the body.
    pub format: RecordFormat,
    /// Color channel type (binary records only).
    pub color: ColorType,
    /// All declarations, in order.
    pub declarations: Vec<Declaration>,
}

impl FrameHeader {
    /// Read the next frame header, or `None` at end of stream.
    pub fn read<R: BufRead>(
        cursor: &mut LineCursor<R>,
        policy: DuplicatePolicy,
        skip_blank: bool,
    ) -> Result<Option<Self>> {
        match HeaderBlock::read(cursor, FRAME_MAGIC, FRAME_HEADER_END, skip_blank)? {
            Some(block) => Self::from_block(block, policy).map(Some),
            None => Ok(None),
        }
    }

    pub fn from_block(block: HeaderBlock, policy: DuplicatePolicy) -> Result<Self> {
        let (decl, values) = block.require(FORMAT_KEY, policy)?;
        let name = nth_value(decl, &values, FORMAT_KEY, 0)?;
        let format = RecordFormat::from_name(name).ok_or_else(|| {
            SequenceError::format(decl.line, format!("unknown format `{}`", name))
        })?;
        let version = nth_value(decl, &values, FORMAT_KEY, 1)?;
        if version != FORMAT_VERSION {
            return Err(SequenceError::UnsupportedFormat(format!(
                "{} version {}",
                name, version
            )));
        }

        let (count, line) = block.require_value(VERTEX_COUNT_KEY, 0, policy)?;
        let vertex_count = count
            .parse::<u32>()
            .map_err(|_| SequenceError::format(line, format!("invalid vertex count `{}`", count)))?
            as usize;

        let color = vertex_color_type(&block, format)?;

        Ok(Self {
            vertex_count,
            format,
            color,
            declarations: block.declarations,
        })
    }

    /// Binary record layout, or `None` for ASCII frames.
    pub fn binary_layout(&self) -> Option<BinaryLayout> {
        self.format.endianness().map(|endianness| BinaryLayout {
            endianness,
            color: self.color,
        })
    }
}

/// Check the element/property schema and resolve the color channel type.
///
/// Only points are supported: any non-vertex element must be empty, and the
/// vertex properties (if declared) must be `x y z` followed by three color
/// channels of one type.
fn vertex_color_type(block: &HeaderBlock, format: RecordFormat) -> Result<ColorType> {
    let mut in_vertex = false;
    let mut properties: Vec<(&str, &str)> = Vec::new();

    for decl in &block.declarations {
        if let Some(values) = decl.values(ELEMENT_KEY) {
            in_vertex = values.first() == Some(&"vertex");
            if !in_vertex {
                let count = values.get(1).and_then(|c| c.parse::<usize>().ok());
                if count != Some(0) {
                    return Err(SequenceError::UnsupportedFormat(format!(
                        "element `{}` at line {} (only points are supported)",
                        values.first().unwrap_or(&""),
                        decl.line
                    )));
                }
            }
        } else if let Some(values) = decl.values(PROPERTY_KEY) {
            if in_vertex {
                match values.as_slice() {
                    [ty, name] => properties.push((*ty, *name)),
                    _ => {
                        return Err(SequenceError::UnsupportedFormat(format!(
                            "vertex property `{}` at line {}",
                            decl.text, decl.line
                        )));
                    }
                }
            }
        }
    }

    if properties.is_empty() {
        return Ok(ColorType::default());
    }

    let unsupported = || {
        let names: Vec<String> = properties
            .iter()
            .map(|(ty, name)| format!("{} {}", ty, name))
            .collect();
        SequenceError::UnsupportedFormat(format!("vertex properties [{}]", names.join(", ")))
    };

    if properties.len() != 6 {
        return Err(unsupported());
    }
    let names: Vec<&str> = properties.iter().map(|(_, name)| *name).collect();
    let color_names_ok = names[3..] == ["red", "green", "blue"] || names[3..] == ["r", "g", "b"];
    if names[..3] != ["x", "y", "z"] || !color_names_ok {
        return Err(unsupported());
    }

    let color = ColorType::from_name(properties[3].0);
    if !format.is_binary() {
        return Ok(color.unwrap_or_default());
    }

    let position_is_float = properties[..3]
        .iter()
        .all(|(ty, _)| ColorType::from_name(ty) == Some(ColorType::Float));
    let color_uniform = properties[3..]
        .iter()
        .all(|(ty, _)| ColorType::from_name(ty) == color);
    match color {
        Some(color) if position_is_float && color_uniform => Ok(color),
        _ => Err(unsupported()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn cursor(text: &str) -> LineCursor<Cursor<Vec<u8>>> {
        LineCursor::new(Cursor::new(text.as_bytes().to_vec()))
    }

    fn frame_block(lines: &[&str]) -> HeaderBlock {
        HeaderBlock {
            open_line: 1,
            close_line: lines.len() as u64 + 2,
            declarations: lines
                .iter()
                .enumerate()
                .map(|(i, text)| Declaration {
                    line: i as u64 + 2,
                    text: text.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_declaration_values() {
        let decl = Declaration {
            line: 3,
            text: "element  vertex 2048".to_string(),
        };
        assert_eq!(decl.values("element vertex"), Some(vec!["2048"]));
        assert_eq!(decl.values("element"), Some(vec!["vertex", "2048"]));
        assert_eq!(decl.values("element face"), None);

        let decl = Declaration {
            line: 1,
            text: "framerates 30".to_string(),
        };
        assert_eq!(decl.values("framerate"), None);
    }

    #[test]
    fn test_read_sequence_header() {
        let mut c = cursor("plys\nframerate 30\nauthor someone\nend_sequence_header\n");
        let header = SequenceHeader::read(&mut c, DuplicatePolicy::FirstWins).unwrap();
        assert_eq!(header.framerate, 30.0);
        assert_eq!(header.declarations.len(), 2);
        assert_eq!(header.declarations[1].text, "author someone");
        assert_eq!(header.declarations[1].line, 3);
    }

    #[test]
    fn test_framerate_independent_of_extra_declarations() {
        for extra in ["", "comment hello\n", "x 1\ny 2\nframerate_hint 99\n"] {
            let text = format!("plys\n{}framerate 12.5\n{}end_sequence_header\n", extra, extra);
            let header =
                SequenceHeader::read(&mut cursor(&text), DuplicatePolicy::Reject).unwrap();
            assert_eq!(header.framerate, 12.5);
        }
    }

    #[test]
    fn test_wrong_opening_marker() {
        let mut c = cursor("PLYS\nframerate 30\nend_sequence_header\n");
        let err = SequenceHeader::read(&mut c, DuplicatePolicy::FirstWins).unwrap_err();
        assert!(matches!(err, SequenceError::Format { line: 1, .. }));

        // No whitespace tolerance on markers.
        let mut c = cursor("plys \nframerate 30\nend_sequence_header\n");
        assert!(SequenceHeader::read(&mut c, DuplicatePolicy::FirstWins).is_err());
    }

    #[test]
    fn test_missing_closing_marker() {
        let mut c = cursor("plys\nframerate 30\n");
        let err = SequenceHeader::read(&mut c, DuplicatePolicy::FirstWins).unwrap_err();
        assert!(matches!(
            err,
            SequenceError::MissingMarker {
                marker: SEQUENCE_HEADER_END
            }
        ));
    }

    #[test]
    fn test_missing_framerate() {
        let mut c = cursor("plys\ncomment nothing\nend_sequence_header\n");
        let err = SequenceHeader::read(&mut c, DuplicatePolicy::FirstWins).unwrap_err();
        assert!(matches!(
            err,
            SequenceError::MissingDeclaration {
                key: FRAMERATE_KEY,
                line: 3
            }
        ));
    }

    #[test]
    fn test_invalid_framerate() {
        for value in ["abc", "0", "-30", "inf", ""] {
            let text = format!("plys\nframerate {}\nend_sequence_header\n", value);
            let err =
                SequenceHeader::read(&mut cursor(&text), DuplicatePolicy::FirstWins).unwrap_err();
            assert!(matches!(err, SequenceError::Format { line: 2, .. }), "{}", value);
        }
    }

    #[test]
    fn test_empty_stream() {
        let err = SequenceHeader::read(&mut cursor(""), DuplicatePolicy::FirstWins).unwrap_err();
        assert!(matches!(err, SequenceError::Format { .. }));
    }

    #[test]
    fn test_duplicate_first_wins() {
        let block = frame_block(&["framerate 30", "framerate 60"]);
        let header = SequenceHeader::from_block(block, DuplicatePolicy::FirstWins).unwrap();
        assert_eq!(header.framerate, 30.0);
    }

    #[test]
    fn test_duplicate_reject() {
        let block = frame_block(&["framerate 30", "framerate 60"]);
        let err = SequenceHeader::from_block(block, DuplicatePolicy::Reject).unwrap_err();
        assert!(matches!(
            err,
            SequenceError::DuplicateDeclaration {
                key: FRAMERATE_KEY,
                line: 3
            }
        ));

        // Identical repeats are harmless.
        let block = frame_block(&["framerate 30", "framerate  30"]);
        assert!(SequenceHeader::from_block(block, DuplicatePolicy::Reject).is_ok());
    }

    #[test]
    fn test_frame_header_duplicate_reject() {
        let block = frame_block(&[
            "format ascii 1.0",
            "format binary_little_endian 1.0",
            "element vertex 2",
        ]);
        let err = FrameHeader::from_block(block, DuplicatePolicy::Reject).unwrap_err();
        assert!(matches!(
            err,
            SequenceError::DuplicateDeclaration {
                key: FORMAT_KEY,
                line: 3
            }
        ));

        let block = frame_block(&["format ascii 1.0", "element vertex 2", "element vertex 3"]);
        let err = FrameHeader::from_block(block, DuplicatePolicy::Reject).unwrap_err();
        assert!(matches!(
            err,
            SequenceError::DuplicateDeclaration {
                key: VERTEX_COUNT_KEY,
                line: 4
            }
        ));

        let block = frame_block(&["format ascii 1.0", "element vertex 2", "element vertex 3"]);
        let header = FrameHeader::from_block(block, DuplicatePolicy::FirstWins).unwrap();
        assert_eq!(header.vertex_count, 2);
    }

    #[test]
    fn test_frame_header_format_missing_version() {
        let block = frame_block(&["format ascii", "element vertex 2"]);
        let err = FrameHeader::from_block(block, DuplicatePolicy::FirstWins).unwrap_err();
        assert!(matches!(err, SequenceError::Format { line: 2, .. }));
    }

    #[test]
    fn test_frame_header_count_exceeds_index_range() {
        let block = frame_block(&["format ascii 1.0", "element vertex 4294967296"]);
        let err = FrameHeader::from_block(block, DuplicatePolicy::FirstWins).unwrap_err();
        assert!(matches!(err, SequenceError::Format { line: 3, .. }));

        let block = frame_block(&["format ascii 1.0", "element vertex 4294967295"]);
        let header = FrameHeader::from_block(block, DuplicatePolicy::FirstWins).unwrap();
        assert_eq!(header.vertex_count, u32::MAX as usize);
    }

    #[test]
    fn test_frame_header_ascii() {
        let block = frame_block(&[
            "format ascii 1.0",
            "comment generated",
            "element vertex 2",
            "property float x",
            "property float y",
            "property float z",
            "property uchar red",
            "property uchar green",
            "property uchar blue",
        ]);
        let header = FrameHeader::from_block(block, DuplicatePolicy::Reject).unwrap();
        assert_eq!(header.vertex_count, 2);
        assert_eq!(header.format, RecordFormat::Ascii);
        assert_eq!(header.declarations.len(), 9);
        assert_eq!(header.declarations[1].text, "comment generated");
        assert!(header.binary_layout().is_none());
    }

    #[test]
    fn test_frame_header_without_properties() {
        let block = frame_block(&["format binary_big_endian 1.0", "element vertex 10"]);
        let header = FrameHeader::from_block(block, DuplicatePolicy::FirstWins).unwrap();
        let layout = header.binary_layout().unwrap();
        assert_eq!(layout.color, ColorType::Uchar);
        assert_eq!(layout.record_size(), 15);
    }

    #[test]
    fn test_frame_header_float_colors() {
        let block = frame_block(&[
            "format binary_little_endian 1.0",
            "element vertex 1",
            "property float x",
            "property float y",
            "property float z",
            "property float r",
            "property float g",
            "property float b",
        ]);
        let header = FrameHeader::from_block(block, DuplicatePolicy::FirstWins).unwrap();
        assert_eq!(header.color, ColorType::Float);
    }

    #[test]
    fn test_frame_header_missing_declarations() {
        let block = frame_block(&["element vertex 2"]);
        let err = FrameHeader::from_block(block, DuplicatePolicy::FirstWins).unwrap_err();
        assert!(matches!(
            err,
            SequenceError::MissingDeclaration {
                key: FORMAT_KEY,
                ..
            }
        ));

        let block = frame_block(&["format ascii 1.0"]);
        let err = FrameHeader::from_block(block, DuplicatePolicy::FirstWins).unwrap_err();
        assert!(matches!(
            err,
            SequenceError::MissingDeclaration {
                key: VERTEX_COUNT_KEY,
                ..
            }
        ));
    }

    #[test]
    fn test_frame_header_unknown_format() {
        let block = frame_block(&["format utf16 1.0", "element vertex 2"]);
        let err = FrameHeader::from_block(block, DuplicatePolicy::FirstWins).unwrap_err();
        assert!(matches!(err, SequenceError::Format { line: 2, .. }));
    }

    #[test]
    fn test_frame_header_unsupported_version() {
        let block = frame_block(&["format binary_little_endian 2.0", "element vertex 2"]);
        let err = FrameHeader::from_block(block, DuplicatePolicy::FirstWins).unwrap_err();
        assert!(matches!(err, SequenceError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_frame_header_negative_count() {
        let block = frame_block(&["format ascii 1.0", "element vertex -1"]);
        let err = FrameHeader::from_block(block, DuplicatePolicy::FirstWins).unwrap_err();
        assert!(matches!(err, SequenceError::Format { line: 3, .. }));
    }

    #[test]
    fn test_frame_header_faces_rejected() {
        let block = frame_block(&[
            "format ascii 1.0",
            "element vertex 3",
            "element face 1",
            "property list uchar int vertex_indices",
        ]);
        let err = FrameHeader::from_block(block, DuplicatePolicy::FirstWins).unwrap_err();
        assert!(matches!(err, SequenceError::UnsupportedFormat(_)));

        // Empty face elements are harmless.
        let block = frame_block(&[
            "format ascii 1.0",
            "element vertex 3",
            "element face 0",
            "property list uchar int vertex_indices",
        ]);
        assert!(FrameHeader::from_block(block, DuplicatePolicy::FirstWins).is_ok());
    }

    #[test]
    fn test_frame_header_extra_properties_rejected() {
        let block = frame_block(&[
            "format binary_little_endian 1.0",
            "element vertex 1",
            "property float x",
            "property float y",
            "property float z",
            "property uchar red",
            "property uchar green",
            "property uchar blue",
            "property uchar alpha",
        ]);
        let err = FrameHeader::from_block(block, DuplicatePolicy::FirstWins).unwrap_err();
        assert!(matches!(err, SequenceError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_frame_header_mixed_color_types_rejected() {
        let block = frame_block(&[
            "format binary_little_endian 1.0",
            "element vertex 1",
            "property float x",
            "property float y",
            "property float z",
            "property uchar red",
            "property float green",
            "property uchar blue",
        ]);
        let err = FrameHeader::from_block(block, DuplicatePolicy::FirstWins).unwrap_err();
        assert!(matches!(err, SequenceError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_skip_blank_before_frame() {
        let mut c = cursor("\r\n\nply\nformat ascii 1.0\nelement vertex 0\nend_header\n");
        let header = FrameHeader::read(&mut c, DuplicatePolicy::FirstWins, true)
            .unwrap()
            .unwrap();
        assert_eq!(header.vertex_count, 0);

        let mut c = cursor("\nply\nformat ascii 1.0\nelement vertex 0\nend_header\n");
        let err = FrameHeader::read(&mut c, DuplicatePolicy::FirstWins, false).unwrap_err();
        assert!(matches!(err, SequenceError::Format { line: 1, .. }));
    }

    #[test]
    fn test_end_of_stream_before_frame() {
        let mut c = cursor("\n\n");
        assert!(
            FrameHeader::read(&mut c, DuplicatePolicy::FirstWins, true)
                .unwrap()
                .is_none()
        );
        let mut c = cursor("");
        assert!(
            FrameHeader::read(&mut c, DuplicatePolicy::FirstWins, false)
                .unwrap()
                .is_none()
        );
    }
}
