//! Sequence writer for building PLYS files.
//!
//! Frames can be written from decoded [`Frame`] values in any record format,
//! or existing `.ply` files can be appended verbatim. Every frame is followed
//! by a CRLF terminator.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::error::{Result, SequenceError};
use super::format::{
    BinaryLayout, ColorType, FRAME_HEADER_END, FRAME_MAGIC, FRAME_TERMINATOR, RecordFormat,
    SEQUENCE_HEADER_END, SEQUENCE_MAGIC,
};
use super::frame::Frame;
use super::header::{FORMAT_KEY, FRAMERATE_KEY, VERTEX_COUNT_KEY};
use super::record::{encode_ascii_record, encode_binary_record};

/// File extension of single-frame inputs.
pub const PLY_EXTENSION: &str = "ply";

/// Whole-file compression for generated sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    /// Gzip (requires the `gzip` feature).
    Gzip,
}

/// Writes a sequence header followed by frames.
///
/// Usage:
/// ```ignore
/// let file = BufWriter::new(File::create("out.plys")?);
/// let mut writer = SequenceWriter::new(file, 30.0)?;
/// for frame in &frames {
///     writer.write_frame(frame, RecordFormat::Ascii, ColorType::Uchar)?;
/// }
/// let (_, stats) = writer.finish()?;
/// ```
pub struct SequenceWriter<W: Write> {
    writer: W,
    frames_written: u64,
    bytes_written: u64,
    /// Reused buffer for frame encoding.
    encode_buffer: Vec<u8>,
}

impl<W: Write> SequenceWriter<W> {
    /// Write the sequence header.
    pub fn new(writer: W, framerate: f32) -> Result<Self> {
        if !framerate.is_finite() || framerate <= 0.0 {
            return Err(SequenceError::format(
                0,
                format!("framerate must be a positive number, got {}", framerate),
            ));
        }

        let mut this = Self {
            writer,
            frames_written: 0,
            bytes_written: 0,
            encode_buffer: Vec::new(),
        };
        let header = format!(
            "{}\n{} {}\n{}\n",
            SEQUENCE_MAGIC, FRAMERATE_KEY, framerate, SEQUENCE_HEADER_END
        );
        this.write_bytes(header.as_bytes())?;
        Ok(this)
    }

    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Encode and write one frame.
    ///
    /// `color` selects how color channels are stored: `uchar` rounds to
    /// whole 0..=255 values, `float` keeps them exact.
    pub fn write_frame(
        &mut self,
        frame: &Frame,
        format: RecordFormat,
        color: ColorType,
    ) -> Result<()> {
        let mut buffer = std::mem::take(&mut self.encode_buffer);
        buffer.clear();

        let header = frame_header_text(frame.len(), format, color);
        buffer.extend_from_slice(header.as_bytes());

        match format.endianness() {
            None => {
                for record in frame.records() {
                    buffer.extend_from_slice(encode_ascii_record(&record, color).as_bytes());
                    buffer.push(b'\n');
                }
            }
            Some(endianness) => {
                let layout = BinaryLayout { endianness, color };
                for record in frame.records() {
                    encode_binary_record(&record, layout, &mut buffer);
                }
            }
        }
        buffer.extend_from_slice(FRAME_TERMINATOR);

        let result = self.write_bytes(&buffer);
        self.encode_buffer = buffer;
        result?;

        self.frames_written += 1;
        debug!(
            "Wrote frame {} ({} points, {})",
            self.frames_written - 1,
            frame.len(),
            format
        );
        Ok(())
    }

    /// Append an existing PLY file's bytes verbatim as the next frame.
    pub fn append_ply(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_bytes(bytes)?;
        self.write_bytes(FRAME_TERMINATOR)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Append a PLY file from disk as the next frame.
    pub fn append_ply_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let bytes = fs::read(path.as_ref())?;
        debug!(
            "Appending {} ({} bytes)",
            path.as_ref().display(),
            bytes.len()
        );
        self.append_ply(&bytes)
    }

    /// Number of frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Flush and return the inner writer with statistics.
    pub fn finish(mut self) -> Result<(W, WriterStats)> {
        self.writer.flush()?;
        let stats = WriterStats {
            frame_count: self.frames_written,
            total_bytes: self.bytes_written,
        };
        Ok((self.writer, stats))
    }
}

fn frame_header_text(vertex_count: usize, format: RecordFormat, color: ColorType) -> String {
    let color_type = color.name();
    format!(
        "{magic}\n{fkey} {format}\n{vkey} {vertex_count}\n\
         property float x\nproperty float y\nproperty float z\n\
         property {color_type} red\nproperty {color_type} green\nproperty {color_type} blue\n\
         {end}\n",
        magic = FRAME_MAGIC,
        fkey = FORMAT_KEY,
        vkey = VERTEX_COUNT_KEY,
        end = FRAME_HEADER_END,
    )
}

/// Statistics from a writing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterStats {
    /// Total frames written.
    pub frame_count: u64,
    /// Uncompressed bytes written.
    pub total_bytes: u64,
}

impl std::fmt::Display for WriterStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} frames, {} bytes", self.frame_count, self.total_bytes)
    }
}

/// List the `.ply` files of a directory, sorted by file name.
pub fn ply_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_ply = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(PLY_EXTENSION));
        if is_ply && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Build a sequence from every `.ply` file in `dir`, in file name order.
pub fn generate_from_dir(
    dir: &Path,
    output: &Path,
    framerate: f32,
    compression: Compression,
) -> Result<WriterStats> {
    let files = ply_files_in(dir)?;
    if files.is_empty() {
        return Err(SequenceError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no .{} files in {}", PLY_EXTENSION, dir.display()),
        )));
    }
    info!(
        "Generating {} from {} files at {} fps ({:?} compression)",
        output.display(),
        files.len(),
        framerate,
        compression
    );

    let file = BufWriter::new(File::create(output)?);
    let stats = match compression {
        Compression::None => append_all(file, framerate, &files)?.1,
        Compression::Gzip => write_gzip(file, framerate, &files)?,
    };

    info!("Generated {}: {}", output.display(), stats);
    Ok(stats)
}

fn append_all<W: Write>(writer: W, framerate: f32, files: &[PathBuf]) -> Result<(W, WriterStats)> {
    let mut writer = SequenceWriter::new(writer, framerate)?;
    for path in files {
        writer.append_ply_file(path)?;
    }
    writer.finish()
}

#[cfg(feature = "gzip")]
fn write_gzip(file: BufWriter<File>, framerate: f32, files: &[PathBuf]) -> Result<WriterStats> {
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let (encoder, stats) = append_all(encoder, framerate, files)?;
    encoder.finish()?.flush()?;
    Ok(stats)
}

#[cfg(not(feature = "gzip"))]
fn write_gzip(_file: BufWriter<File>, _framerate: f32, _files: &[PathBuf]) -> Result<WriterStats> {
    Err(SequenceError::UnsupportedFormat(
        "gzip output (build with the `gzip` feature)".to_string(),
    ))
}
