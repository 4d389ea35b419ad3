//! Point record decoding and encoding.
//!
//! Records within a frame are independent, so large frames are decoded on
//! the rayon pool. Parallel and sequential decoding produce identical
//! output, and both report the first malformed record in input order.

#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;

use super::error::{Location, Result, SequenceError};
use super::format::{BinaryLayout, ColorType, Endianness};
use super::frame::{COLOR_SCALE, PointRecord};
use crate::schema::DecoderConfig;

/// Number of values in an ASCII record: `x y z r g b`.
pub const ASCII_FIELDS: usize = 6;

/// One text record together with its line number.
#[derive(Debug, Clone)]
pub struct RecordLine {
    pub line: u64,
    pub text: String,
}

/// Decode one ASCII record line.
///
/// Colors are divided by 255 and never clamped.
pub fn decode_ascii_record(text: &str) -> std::result::Result<PointRecord, String> {
    let mut values = [0.0f32; ASCII_FIELDS];
    let mut count = 0;
    for token in text.split_whitespace() {
        if count < ASCII_FIELDS {
            values[count] = token
                .parse::<f32>()
                .map_err(|_| format!("invalid number `{}`", token))?;
        }
        count += 1;
    }
    if count != ASCII_FIELDS {
        return Err(format!(
            "expected {} values, found {}",
            ASCII_FIELDS, count
        ));
    }

    Ok(PointRecord::from_raw(
        [values[0], values[1], values[2]],
        [values[3], values[4], values[5]],
    ))
}

/// Encode one record as an ASCII line (without terminator).
///
/// `uchar` colors are written as rounded integers clamped to 0..=255,
/// `float` colors as exact scaled values.
pub fn encode_ascii_record(record: &PointRecord, color: ColorType) -> String {
    let [x, y, z] = record.position;
    match color {
        ColorType::Uchar => {
            let [r, g, b] = record.color.map(color_to_uchar);
            format!("{} {} {} {} {} {}", x, y, z, r, g, b)
        }
        ColorType::Float => {
            let [r, g, b] = record.color.map(|c| c * COLOR_SCALE);
            format!("{} {} {} {} {} {}", x, y, z, r, g, b)
        }
    }
}

fn color_to_uchar(c: f32) -> u8 {
    (c * COLOR_SCALE).round().clamp(0.0, 255.0) as u8
}

fn read_f32(bytes: &[u8], endianness: Endianness) -> f32 {
    let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
    match endianness {
        Endianness::Little => f32::from_le_bytes(raw),
        Endianness::Big => f32::from_be_bytes(raw),
    }
}

fn write_f32(out: &mut Vec<u8>, value: f32, endianness: Endianness) {
    match endianness {
        Endianness::Little => out.extend_from_slice(&value.to_le_bytes()),
        Endianness::Big => out.extend_from_slice(&value.to_be_bytes()),
    }
}

/// Decode one binary record; `bytes` must be exactly `layout.record_size()` long.
pub(crate) fn decode_binary_record(bytes: &[u8], layout: BinaryLayout) -> PointRecord {
    let e = layout.endianness;
    let position = [
        read_f32(&bytes[0..4], e),
        read_f32(&bytes[4..8], e),
        read_f32(&bytes[8..12], e),
    ];
    let rgb = match layout.color {
        ColorType::Uchar => [bytes[12] as f32, bytes[13] as f32, bytes[14] as f32],
        ColorType::Float => [
            read_f32(&bytes[12..16], e),
            read_f32(&bytes[16..20], e),
            read_f32(&bytes[20..24], e),
        ],
    };
    PointRecord::from_raw(position, rgb)
}

/// Append one record in the binary layout.
///
/// `uchar` colors are rounded and clamped to 0..=255.
pub fn encode_binary_record(record: &PointRecord, layout: BinaryLayout, out: &mut Vec<u8>) {
    let e = layout.endianness;
    for v in record.position {
        write_f32(out, v, e);
    }
    for c in record.color {
        match layout.color {
            ColorType::Uchar => out.push(color_to_uchar(c)),
            ColorType::Float => write_f32(out, c * COLOR_SCALE, e),
        }
    }
}

/// Decodes the records of one frame.
#[derive(Debug, Clone)]
pub struct RecordDecoder {
    parallel: bool,
    parallel_threshold: usize,
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::new(&DecoderConfig::default())
    }
}

impl RecordDecoder {
    pub fn new(config: &DecoderConfig) -> Self {
        Self {
            parallel: config.parallel,
            parallel_threshold: config.parallel_threshold.max(1),
        }
    }

    /// Sequential decoder.
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            parallel_threshold: usize::MAX,
        }
    }

    fn use_parallel(&self, count: usize) -> bool {
        cfg!(not(target_arch = "wasm32")) && self.parallel && count >= self.parallel_threshold
    }

    /// Decode ASCII record lines, preserving order.
    pub fn decode_ascii(&self, lines: &[RecordLine]) -> Result<Vec<PointRecord>> {
        let malformed = |i: usize, message: String| SequenceError::MalformedRecord {
            record: i,
            location: Location::Line(lines[i].line),
            message,
        };

        if self.use_parallel(lines.len()) {
            let decoded = decode_lines_parallel(lines);
            let mut records = Vec::with_capacity(decoded.len());
            for (i, result) in decoded.into_iter().enumerate() {
                records.push(result.map_err(|message| malformed(i, message))?);
            }
            return Ok(records);
        }

        lines
            .iter()
            .enumerate()
            .map(|(i, line)| decode_ascii_record(&line.text).map_err(|m| malformed(i, m)))
            .collect()
    }

    /// Decode `count` binary records from `bytes`.
    ///
    /// `base_offset` is the stream offset of `bytes[0]`, used in errors.
    pub fn decode_binary(
        &self,
        bytes: &[u8],
        count: usize,
        layout: BinaryLayout,
        base_offset: u64,
    ) -> Result<Vec<PointRecord>> {
        let size = layout.record_size();
        if count.checked_mul(size) != Some(bytes.len()) {
            let complete = bytes.len() / size;
            return Err(SequenceError::MalformedRecord {
                record: complete,
                location: Location::Offset(base_offset + (complete * size) as u64),
                message: format!(
                    "expected {} records of {} bytes, found {} bytes",
                    count,
                    size,
                    bytes.len()
                ),
            });
        }

        if self.use_parallel(count) {
            return Ok(decode_chunks_parallel(bytes, layout));
        }

        Ok(bytes
            .chunks_exact(size)
            .map(|chunk| decode_binary_record(chunk, layout))
            .collect())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn decode_lines_parallel(lines: &[RecordLine]) -> Vec<std::result::Result<PointRecord, String>> {
    lines
        .par_iter()
        .map(|line| decode_ascii_record(&line.text))
        .collect()
}

#[cfg(target_arch = "wasm32")]
fn decode_lines_parallel(lines: &[RecordLine]) -> Vec<std::result::Result<PointRecord, String>> {
    lines
        .iter()
        .map(|line| decode_ascii_record(&line.text))
        .collect()
}

#[cfg(not(target_arch = "wasm32"))]
fn decode_chunks_parallel(bytes: &[u8], layout: BinaryLayout) -> Vec<PointRecord> {
    bytes
        .par_chunks_exact(layout.record_size())
        .map(|chunk| decode_binary_record(chunk, layout))
        .collect()
}

#[cfg(target_arch = "wasm32")]
fn decode_chunks_parallel(bytes: &[u8], layout: BinaryLayout) -> Vec<PointRecord> {
    bytes
        .chunks_exact(layout.record_size())
        .map(|chunk| decode_binary_record(chunk, layout))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lines(texts: &[&str]) -> Vec<RecordLine> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| RecordLine {
                line: i as u64 + 10,
                text: text.to_string(),
            })
            .collect()
    }

    fn parallel_decoder() -> RecordDecoder {
        RecordDecoder::new(&DecoderConfig {
            parallel: true,
            parallel_threshold: 1,
            ..Default::default()
        })
    }

    const LE_UCHAR: BinaryLayout = BinaryLayout {
        endianness: Endianness::Little,
        color: ColorType::Uchar,
    };

    #[test]
    fn test_decode_ascii_record() {
        let record = decode_ascii_record("1.5 -2 3e2 255 0 51").unwrap();
        assert_eq!(record.position, [1.5, -2.0, 300.0]);
        assert_eq!(record.color, [1.0, 0.0, 0.2]);
    }

    #[test]
    fn test_decode_ascii_extra_whitespace() {
        let record = decode_ascii_record("  0\t0  0 255 255   255 ").unwrap();
        assert_eq!(record.color, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_decode_ascii_wrong_token_count() {
        let err = decode_ascii_record("0 0 0 255 0").unwrap_err();
        assert!(err.contains("found 5"));
        let err = decode_ascii_record("0 0 0 255 0 0 255").unwrap_err();
        assert!(err.contains("found 7"));
        assert!(decode_ascii_record("").is_err());
    }

    #[test]
    fn test_decode_ascii_bad_number() {
        let err = decode_ascii_record("0 0 zero 255 0 0").unwrap_err();
        assert!(err.contains("zero"));
    }

    #[test]
    fn test_decode_ascii_preserves_order() {
        let input = lines(&["0 0 0 255 0 0", "1 1 1 0 255 0", "2 2 2 0 0 255"]);
        let records = RecordDecoder::sequential().decode_ascii(&input).unwrap();
        assert_eq!(records.len(), 3);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.position, [i as f32; 3]);
        }
        assert_eq!(records[2].color, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_malformed_reports_first_record() {
        let input = lines(&["0 0 0 0 0 0", "1 1 1", "2 2 2 0 0 0", "bad"]);
        for decoder in [RecordDecoder::sequential(), parallel_decoder()] {
            let err = decoder.decode_ascii(&input).unwrap_err();
            match err {
                SequenceError::MalformedRecord {
                    record, location, ..
                } => {
                    assert_eq!(record, 1);
                    assert_eq!(location, Location::Line(11));
                }
                other => panic!("unexpected error: {}", other),
            }
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let texts: Vec<String> = (0..500)
            .map(|i| format!("{} {} {} {} {} {}", i, i * 2, -i, i % 256, 255 - i % 256, 7))
            .collect();
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let input = lines(&refs);

        let sequential = RecordDecoder::sequential().decode_ascii(&input).unwrap();
        let parallel = parallel_decoder().decode_ascii(&input).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_binary_little_endian() {
        let mut bytes = Vec::new();
        for v in [1.0f32, 2.0, 3.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&[255, 0, 51]);

        let records = RecordDecoder::sequential()
            .decode_binary(&bytes, 1, LE_UCHAR, 0)
            .unwrap();
        assert_eq!(records[0].position, [1.0, 2.0, 3.0]);
        assert_eq!(records[0].color, [1.0, 0.0, 0.2]);
    }

    #[test]
    fn test_binary_big_endian_float_colors() {
        let layout = BinaryLayout {
            endianness: Endianness::Big,
            color: ColorType::Float,
        };
        let mut bytes = Vec::new();
        for v in [-1.0f32, 0.5, 8.0, 255.0, 127.5, 0.0] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }

        let records = RecordDecoder::sequential()
            .decode_binary(&bytes, 1, layout, 0)
            .unwrap();
        assert_eq!(records[0].position, [-1.0, 0.5, 8.0]);
        assert_eq!(records[0].color, [1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_binary_length_mismatch() {
        let bytes = vec![0u8; 20];
        let err = RecordDecoder::sequential()
            .decode_binary(&bytes, 2, LE_UCHAR, 100)
            .unwrap_err();
        assert!(matches!(
            err,
            SequenceError::MalformedRecord {
                record: 1,
                location: Location::Offset(115),
                ..
            }
        ));
    }

    #[test]
    fn test_encode_binary_clamps_uchar() {
        let record = PointRecord::new([0.0; 3], [2.0, -1.0, 0.5]);
        let mut out = Vec::new();
        encode_binary_record(&record, LE_UCHAR, &mut out);
        assert_eq!(out.len(), LE_UCHAR.record_size());
        assert_eq!(&out[12..], &[255, 0, 128]);
    }

    #[test]
    fn test_encode_ascii_uchar() {
        let record = PointRecord::new([1.5, -2.0, 0.0], [1.0, 0.5, 3.0]);
        assert_eq!(
            encode_ascii_record(&record, ColorType::Uchar),
            "1.5 -2 0 255 128 255"
        );
        assert_eq!(
            encode_ascii_record(&record, ColorType::Float),
            "1.5 -2 0 255 127.5 765"
        );
    }

    proptest! {
        #[test]
        fn prop_ascii_roundtrip(
            position in prop::array::uniform3(-1.0e6f32..1.0e6),
            color in prop::array::uniform3(0.0f32..=1.0),
        ) {
            let record = PointRecord::new(position, color);
            let decoded =
                decode_ascii_record(&encode_ascii_record(&record, ColorType::Float)).unwrap();
            prop_assert_eq!(decoded.position, position);
            for (a, b) in decoded.color.iter().zip(color.iter()) {
                prop_assert!((a - b).abs() < 1e-6);
            }
        }

        #[test]
        fn prop_binary_float_roundtrip(
            position in prop::array::uniform3(-1.0e6f32..1.0e6),
            color in prop::array::uniform3(0.0f32..=1.0),
            big in any::<bool>(),
        ) {
            let layout = BinaryLayout {
                endianness: if big { Endianness::Big } else { Endianness::Little },
                color: ColorType::Float,
            };
            let record = PointRecord::new(position, color);
            let mut bytes = Vec::new();
            encode_binary_record(&record, layout, &mut bytes);
            let decoded = decode_binary_record(&bytes, layout);
            prop_assert_eq!(decoded.position, position);
            for (a, b) in decoded.color.iter().zip(color.iter()) {
                prop_assert!((a - b).abs() < 1e-6);
            }
        }
    }
}
