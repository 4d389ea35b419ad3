//! Frame source: reads a sequence one frame at a time.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, info};

use super::cursor::LineCursor;
use super::error::{Result, SequenceError};
use super::frame::Frame;
use super::header::{FrameHeader, SequenceHeader};
use super::record::{RecordDecoder, RecordLine};
use crate::schema::{DecoderConfig, TrailingLinePolicy};

/// First two bytes of a gzip stream.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Upper bound on records reserved before any of them are read.
const MAX_PREALLOCATED_RECORDS: usize = 1 << 20;

/// Boxed reader used for file-backed sources.
pub type DynReader = Box<dyn BufRead + Send>;

/// Reads a sequence header once, then decodes frames on demand.
///
/// The source exclusively owns its stream; dropping the source closes it.
///
/// Usage:
/// ```ignore
/// let mut source = FrameSource::from_path("capture.plys", DecoderConfig::default())?;
/// println!("Playing at {} fps", source.framerate().unwrap_or_default());
///
/// loop {
///     match source.next_frame() {
///         Ok(frame) => println!("{} points", frame.len()),
///         Err(e) if e.is_end_of_sequence() => break,
///         Err(e) => return Err(e),
///     }
/// }
/// ```
pub struct FrameSource<R> {
    cursor: LineCursor<R>,
    config: DecoderConfig,
    decoder: RecordDecoder,
    header: Option<SequenceHeader>,
    frames_read: u64,
    finished: bool,
    failed: bool,
}

impl FrameSource<DynReader> {
    /// Open a sequence file and read its header.
    ///
    /// Gzip-compressed files are detected by their magic bytes and
    /// decompressed when the `gzip` feature is enabled.
    pub fn from_path<P: AsRef<Path>>(path: P, config: DecoderConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let gzipped = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
        debug!("Opening sequence {} (gzip: {})", path.display(), gzipped);

        let reader: DynReader = if gzipped {
            open_gzip(reader)?
        } else {
            Box::new(reader)
        };
        Self::open_reader(reader, config)
    }
}

#[cfg(feature = "gzip")]
fn open_gzip(reader: BufReader<File>) -> Result<DynReader> {
    Ok(Box::new(BufReader::new(flate2::bufread::GzDecoder::new(
        reader,
    ))))
}

#[cfg(not(feature = "gzip"))]
fn open_gzip(_reader: BufReader<File>) -> Result<DynReader> {
    Err(SequenceError::UnsupportedFormat(
        "gzip-compressed sequence (build with the `gzip` feature)".to_string(),
    ))
}

impl<R: BufRead> FrameSource<R> {
    /// Wrap a reader without reading anything yet.
    pub fn new(reader: R, config: DecoderConfig) -> Self {
        Self {
            cursor: LineCursor::new(reader),
            decoder: RecordDecoder::new(&config),
            config,
            header: None,
            frames_read: 0,
            finished: false,
            failed: false,
        }
    }

    /// Wrap a reader and read the sequence header.
    pub fn open_reader(reader: R, config: DecoderConfig) -> Result<Self> {
        let mut source = Self::new(reader, config);
        source.open()?;
        Ok(source)
    }

    /// Read the sequence header. May only succeed once.
    pub fn open(&mut self) -> Result<&SequenceHeader> {
        if self.header.is_some() {
            return Err(SequenceError::format(
                self.cursor.line(),
                "sequence header already read",
            ));
        }

        let header = SequenceHeader::read(&mut self.cursor, self.config.duplicates)?;
        info!(
            "Sequence opened: {} fps, {} declarations",
            header.framerate,
            header.declarations.len()
        );
        Ok(&*self.header.insert(header))
    }

    /// Sequence header, once read.
    pub fn sequence_header(&self) -> Option<&SequenceHeader> {
        self.header.as_ref()
    }

    /// Declared framerate, once the header is read.
    pub fn framerate(&self) -> Option<f32> {
        self.header.as_ref().map(|h| h.framerate)
    }

    /// Number of frames decoded so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// True once the end of the sequence has been reached.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decode the next frame.
    ///
    /// Fails with [`SequenceError::EndOfSequence`] once the stream is
    /// exhausted, and keeps doing so on later calls.
    pub fn next_frame(&mut self) -> Result<Frame> {
        if self.header.is_none() {
            return Err(SequenceError::SequenceHeaderMissing);
        }
        if self.finished {
            return Err(SequenceError::EndOfSequence);
        }

        let skip_blank = self.config.trailing_lines == TrailingLinePolicy::Optional;
        let Some(header) = FrameHeader::read(&mut self.cursor, self.config.duplicates, skip_blank)?
        else {
            self.finished = true;
            info!("End of sequence after {} frames", self.frames_read);
            return Err(SequenceError::EndOfSequence);
        };

        let records = match header.binary_layout() {
            None => {
                let lines = self.read_record_lines(header.vertex_count)?;
                self.decoder.decode_ascii(&lines)?
            }
            Some(layout) => {
                let len = header
                    .vertex_count
                    .checked_mul(layout.record_size())
                    .ok_or_else(|| {
                        SequenceError::format(self.cursor.line(), "vertex count too large")
                    })?;
                let base = self.cursor.offset();
                let bytes = self.cursor.read_exact(len)?;
                self.decoder
                    .decode_binary(&bytes, header.vertex_count, layout, base)?
            }
        };

        if self.config.trailing_lines == TrailingLinePolicy::Required {
            self.read_terminator()?;
        }

        self.frames_read += 1;
        debug!(
            "Frame {}: {} points ({})",
            self.frames_read - 1,
            records.len(),
            header.format
        );
        Ok(Frame::from_records(&records))
    }

    fn read_record_lines(&mut self, count: usize) -> Result<Vec<RecordLine>> {
        let mut lines = Vec::with_capacity(count.min(MAX_PREALLOCATED_RECORDS));
        for _ in 0..count {
            let text = self
                .cursor
                .read_line()?
                .ok_or_else(|| SequenceError::truncated("frame body"))?;
            lines.push(RecordLine {
                line: self.cursor.line(),
                text,
            });
        }
        Ok(lines)
    }

    fn read_terminator(&mut self) -> Result<()> {
        match self.cursor.read_line()? {
            Some(line) if line.trim().is_empty() => Ok(()),
            Some(line) => Err(SequenceError::format(
                self.cursor.line(),
                format!("expected blank line after frame body, found `{}`", line),
            )),
            None => Err(SequenceError::format(
                self.cursor.line(),
                "missing blank line after last frame body",
            )),
        }
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.cursor.into_inner()
    }
}

impl<R: BufRead> Iterator for FrameSource<R> {
    type Item = Result<Frame>;

    /// Yields frames until the end of the sequence or the first error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_frame() {
            Ok(frame) => Some(Ok(frame)),
            Err(SequenceError::EndOfSequence) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for FrameSource<R> {}
