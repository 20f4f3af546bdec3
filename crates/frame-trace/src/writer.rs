use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::codec::TraceCodec;
use crate::error::{Result, TraceError};
use crate::format::{
    toc_entry_count, FrameArch, FrameMachine, TraceHeader, DEFAULT_FRAMES_PER_TOC_ENTRY,
    FRAME_COUNT_OFFSET, TOC_OFFSET_OFFSET,
};
use crate::io::WriteLeExt;

#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    pub arch: FrameArch,
    pub machine: FrameMachine,
    /// A TOC entry is recorded every `frames_per_toc_entry` frames. Larger values shrink the TOC
    /// at the cost of longer linear scans on seek.
    pub frames_per_toc_entry: u64,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            arch: FrameArch::I386,
            machine: FrameMachine::I386_I386,
            frames_per_toc_entry: DEFAULT_FRAMES_PER_TOC_ENTRY,
        }
    }
}

/// Streaming trace writer.
///
/// Frames are appended one at a time; only the TOC offsets are kept in memory. [`finish`]
/// appends the TOC and patches the header when the sink can report and restore its position.
/// Otherwise (pipes, [`StreamSink`]) the file keeps its placeholder header: readers will see
/// `frame_count == 0` and no TOC even though the frame bytes are present.
///
/// [`finish`]: TraceWriter::finish
pub struct TraceWriter<W: Write + Seek, C: TraceCodec> {
    sink: W,
    codec: C,
    toc: Vec<u64>,
    frame_count: u64,
    frames_per_toc_entry: u64,
    seekable: bool,
}

impl<C: TraceCodec> TraceWriter<BufWriter<File>, C> {
    /// Create (or truncate) the file at `path` and write the trace prologue to it.
    pub fn create(
        path: impl AsRef<Path>,
        meta: &C::Meta,
        codec: C,
        options: WriterOptions,
    ) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Self::new(BufWriter::new(file), meta, codec, options)
    }

    /// [`finish`](TraceWriter::finish) the trace, then flush and sync the file. The file is
    /// closed on return; unlike a plain drop, write-back failures are reported.
    pub fn close(self) -> Result<()> {
        let file = self.finish()?.into_inner().map_err(|err| err.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}

impl<W: Write + Seek, C: TraceCodec> TraceWriter<W, C> {
    /// Write the placeholder header and the metadata record to `sink`.
    pub fn new(mut sink: W, meta: &C::Meta, codec: C, options: WriterOptions) -> Result<Self> {
        if options.frames_per_toc_entry == 0 {
            return Err(TraceError::InvalidStride(options.frames_per_toc_entry));
        }

        let meta_bytes = codec.encode_meta(meta).map_err(TraceError::Encode)?;
        let meta_size = meta_bytes.len() as u64;
        let header = TraceHeader::placeholder(options.arch, options.machine, meta_size);
        header.encode(&mut sink)?;
        sink.write_all(&meta_bytes)?;

        debug!(
            arch = options.arch.0,
            machine = options.machine.0,
            meta_size = header.meta_size,
            frames_per_toc_entry = options.frames_per_toc_entry,
            "trace writer started"
        );

        Ok(Self {
            sink,
            codec,
            toc: Vec::new(),
            frame_count: 0,
            frames_per_toc_entry: options.frames_per_toc_entry,
            seekable: true,
        })
    }

    /// Append `frame` to the trace.
    pub fn add(&mut self, frame: &C::Frame) -> Result<()> {
        let bytes = self.codec.encode_frame(frame).map_err(TraceError::Encode)?;
        if bytes.is_empty() {
            // A zero length prefix marks corruption for readers.
            return Err(TraceError::EmptyFrame {
                frame: self.frame_count,
            });
        }

        // Entry i must point at the start of frame i * frames_per_toc_entry, so it is taken
        // before that frame is written.
        if self.frame_count > 0 && self.frame_count % self.frames_per_toc_entry == 0 {
            self.record_toc_entry()?;
        }

        self.sink.write_len_prefixed_bytes_u64(&bytes)?;
        self.frame_count += 1;
        Ok(())
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn frames_per_toc_entry(&self) -> u64 {
        self.frames_per_toc_entry
    }

    /// TOC offsets recorded so far. Empty once the sink turned out to be non-seekable.
    pub fn toc_entries(&self) -> &[u64] {
        &self.toc
    }

    fn record_toc_entry(&mut self) -> Result<()> {
        if !self.seekable {
            return Ok(());
        }
        match self.position()? {
            Some(pos) => self.toc.push(pos),
            None => {
                debug!(
                    frame = self.frame_count,
                    "sink cannot report its position; not recording a TOC"
                );
                self.seekable = false;
                self.toc.clear();
            }
        }
        Ok(())
    }

    fn end_offset(&mut self) -> Result<Option<u64>> {
        if !self.seekable {
            return Ok(None);
        }
        self.position()
    }

    /// Current sink offset, or `None` when the sink cannot seek at all. Any other failure to
    /// query the position is an I/O error.
    fn position(&mut self) -> Result<Option<u64>> {
        match self.sink.stream_position() {
            Ok(0) => Ok(None),
            Ok(pos) => Ok(Some(pos)),
            Err(err) if is_unseekable(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Finalize the trace and hand the sink back.
    ///
    /// On a seekable sink this writes `frames_per_toc_entry` and the TOC entries after the last
    /// frame, then patches `frame_count` and `toc_offset` in the header. On a non-seekable sink
    /// both steps are skipped.
    ///
    /// The sink is flushed and returned, and closing it is left to the caller. Writers made with
    /// [`create`](TraceWriter::create) should use [`close`](TraceWriter::close) instead.
    pub fn finish(mut self) -> Result<W> {
        match self.end_offset()? {
            Some(toc_offset) => {
                let expected = toc_entry_count(self.frame_count, self.frames_per_toc_entry);
                if self.toc.len() as u64 != expected {
                    return Err(TraceError::MalformedToc(
                        "recorded TOC entries disagree with the frame count",
                    ));
                }

                self.sink.write_u64_le(self.frames_per_toc_entry)?;
                for &offset in &self.toc {
                    self.sink.write_u64_le(offset)?;
                }

                self.sink.seek(SeekFrom::Start(FRAME_COUNT_OFFSET))?;
                self.sink.write_u64_le(self.frame_count)?;
                self.sink.seek(SeekFrom::Start(TOC_OFFSET_OFFSET))?;
                self.sink.write_u64_le(toc_offset)?;
                self.sink.seek(SeekFrom::End(0))?;

                debug!(
                    frame_count = self.frame_count,
                    toc_offset,
                    toc_entries = self.toc.len(),
                    "trace finished"
                );
            }
            None => {
                warn!(
                    frame_count = self.frame_count,
                    "trace sink is not seekable; header keeps frame_count=0 and no TOC is written"
                );
            }
        }

        self.sink.flush()?;
        Ok(self.sink)
    }
}

fn is_unseekable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotSeekable | io::ErrorKind::Unsupported
    )
}

/// Adapter for sinks that can only be appended to, such as stdout or a pipe.
///
/// Every seek fails, so a [`TraceWriter`] over it always takes the non-seekable path in
/// [`TraceWriter::finish`].
#[derive(Debug)]
pub struct StreamSink<W> {
    inner: W,
}

impl<W: Write> StreamSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for StreamSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W> Seek for StreamSink<W> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stream sink is not seekable",
        ))
    }
}
