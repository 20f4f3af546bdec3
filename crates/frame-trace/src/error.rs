use std::error::Error as StdError;
use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TraceError>;

/// Boxed error produced by a [`crate::TraceCodec`].
pub type CodecError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("out of memory allocating {len} bytes")]
    OutOfMemory { len: usize },

    #[error("invalid trace magic {0:#018x}")]
    InvalidMagic(u64),

    #[error("unsupported trace version {0}")]
    UnsupportedVersion(u64),

    #[error("the table of contents is malformed: {0}")]
    MalformedToc(&'static str),

    #[error("read zero-length frame at offset {offset}")]
    ZeroLengthFrame { offset: u64 },

    #[error("frame {frame} encoded to zero bytes")]
    EmptyFrame { frame: u64 },

    #[error("corrupt trace: {0}")]
    Corrupt(&'static str),

    #[error("frame {frame} is out of range (trace has {frame_count} frames)")]
    FrameOutOfRange { frame: u64, frame_count: u64 },

    #[error("no frame to read: already at end of trace")]
    EndOfTrace,

    #[error("invalid frames-per-TOC-entry value {0} (must be non-zero)")]
    InvalidStride(u64),

    #[error("unable to serialize record: {0}")]
    Encode(#[source] CodecError),

    #[error("unable to parse record: {0}")]
    Decode(#[source] CodecError),
}

impl TraceError {
    /// True for errors caused by addressing a frame past the end of the trace.
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, TraceError::FrameOutOfRange { .. } | TraceError::EndOfTrace)
    }
}
