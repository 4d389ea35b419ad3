//! Error type shared by the sequence parser, decoder and writer.

use std::io;

use crate::schema::ConfigError;

/// Errors produced while reading or writing a point cloud sequence.
///
/// `EndOfSequence` is the normal termination signal and is not a failure;
/// use [`SequenceError::is_end_of_sequence`] to tell it apart from the rest.
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error("Format error at line {line}: {message}")]
    Format { line: u64, message: String },
    #[error("Missing closing marker `{marker}` before end of stream")]
    MissingMarker { marker: &'static str },
    #[error("Missing required declaration `{key}` in block ending at line {line}")]
    MissingDeclaration { key: &'static str, line: u64 },
    #[error("Conflicting duplicate declaration `{key}` at line {line}")]
    DuplicateDeclaration { key: &'static str, line: u64 },
    #[error("Malformed record {record} at {location}: {message}")]
    MalformedRecord {
        record: usize,
        location: Location,
        message: String,
    },
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("End of sequence")]
    EndOfSequence,
    #[error("Sequence header has not been read")]
    SequenceHeaderMissing,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SequenceError {
    /// True for the normal end-of-stream signal.
    pub fn is_end_of_sequence(&self) -> bool {
        matches!(self, SequenceError::EndOfSequence)
    }

    pub(crate) fn format(line: u64, message: impl Into<String>) -> Self {
        SequenceError::Format {
            line,
            message: message.into(),
        }
    }

    pub(crate) fn truncated(what: &str) -> Self {
        SequenceError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("Stream ended inside {}", what),
        ))
    }
}

/// Position of a record inside the input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// 1-based line number (text records).
    Line(u64),
    /// Byte offset from the start of the stream (binary records).
    Offset(u64),
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Line(line) => write!(f, "line {}", line),
            Location::Offset(offset) => write!(f, "byte offset {}", offset),
        }
    }
}

/// Result alias for sequence operations.
pub type Result<T> = std::result::Result<T, SequenceError>;
