//! Seekable container for long, append-only sequences of trace frames.
//!
//! A trace is a fixed 56-byte header, one metadata record, a stream of length-prefixed frames
//! and, when the writer's sink was seekable, a sparse table of contents (TOC) holding the byte
//! offset of every `frames_per_toc_entry`-th frame. All integers are little-endian `u64`.
//!
//! ```text
//! 0   magic
//! 8   format version
//! 16  architecture
//! 24  machine
//! 32  frame count          (patched by `TraceWriter::finish`)
//! 40  TOC offset           (patched by `TraceWriter::finish`)
//! 48  metadata size
//! 56  metadata bytes
//!     frame 0: len, bytes
//!     ...
//!     frames_per_toc_entry, TOC entries 1..=(frame_count - 1) / frames_per_toc_entry
//! ```
//!
//! Frame and metadata payloads are opaque to the container; a [`TraceCodec`] turns them into
//! bytes and back.

mod codec;
mod error;
mod format;
mod io;
mod reader;
mod writer;

pub use crate::codec::{JsonCodec, RawCodec, TraceCodec};
pub use crate::error::{CodecError, Result, TraceError};
pub use crate::format::{
    is_supported_version, toc_entry_count, FrameArch, FrameMachine, TraceHeader, ARCH_OFFSET,
    DEFAULT_FRAMES_PER_TOC_ENTRY, FRAME_COUNT_OFFSET, MACHINE_OFFSET, MAGIC_OFFSET, META_OFFSET,
    META_SIZE_OFFSET, TOC_OFFSET_OFFSET, TRACE_HEADER_SIZE, TRACE_MAGIC, TRACE_VERSION,
    TRACE_VERSION_MIN, VERSION_OFFSET,
};
pub use crate::reader::{Frames, TraceReader};
pub use crate::writer::{StreamSink, TraceWriter, WriterOptions};
