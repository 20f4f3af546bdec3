use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, trace};

use crate::codec::TraceCodec;
use crate::error::{Result, TraceError};
use crate::format::{toc_entry_count, FrameArch, FrameMachine, TraceHeader, U64_SIZE};
use crate::io::ReadLeExt;

/// Random-access trace reader.
///
/// Opening a trace loads the header, the metadata record and the whole TOC; frames are read on
/// demand. [`seek`](TraceReader::seek) jumps to the closest TOC checkpoint at or before the
/// requested frame and then skips forward over at most `frames_per_toc_entry - 1` frames.
///
/// If a read fails the frame cursor is unspecified; call [`seek`](TraceReader::seek) before
/// reading again.
pub struct TraceReader<R, C: TraceCodec> {
    reader: R,
    codec: C,
    header: TraceHeader,
    meta: C::Meta,
    frames_per_toc_entry: Option<u64>,
    toc: Vec<u64>,
    first_frame_offset: u64,
    /// Exclusive end of the frame stream: the TOC offset, or the file length when there is no TOC.
    frames_end: u64,
    current_frame: u64,
    /// Byte offset of `current_frame`.
    cursor: u64,
}

impl<C: TraceCodec> TraceReader<BufReader<File>, C> {
    pub fn open_path(path: impl AsRef<Path>, codec: C) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::open(BufReader::new(file), codec)
    }
}

impl<R: Read + Seek, C: TraceCodec> TraceReader<R, C> {
    pub fn open(mut reader: R, codec: C) -> Result<Self> {
        // Untrusted lengths from the header are validated against the real file size before they
        // are used for allocation.
        let file_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let header = TraceHeader::decode(&mut reader)?;

        let first_frame_offset = header.first_frame_offset()?;
        if first_frame_offset > file_len {
            return Err(TraceError::Corrupt("metadata extends past the end of the file"));
        }
        let meta_len = usize::try_from(header.meta_size)
            .map_err(|_| TraceError::Corrupt("metadata size does not fit in memory"))?;
        let meta_bytes = reader.read_exact_vec(meta_len)?;
        let meta = codec.decode_meta(&meta_bytes).map_err(TraceError::Decode)?;

        let (frames_per_toc_entry, toc, frames_end) = if header.has_toc() {
            let (stride, toc) = read_toc(&mut reader, &header, first_frame_offset, file_len)?;
            (Some(stride), toc, header.toc_offset)
        } else {
            // Traces finished on a non-seekable sink keep the placeholder header. Frame bytes may
            // follow the metadata, but without a patched frame_count none of them are addressable.
            if header.frame_count != 0 {
                return Err(TraceError::MalformedToc(
                    "trace records frames but has no table of contents",
                ));
            }
            (None, Vec::new(), file_len)
        };

        debug!(
            version = header.version,
            arch = header.arch.0,
            machine = header.machine.0,
            frame_count = header.frame_count,
            toc_entries = toc.len(),
            "opened trace"
        );

        reader.seek(SeekFrom::Start(first_frame_offset))?;
        Ok(Self {
            reader,
            codec,
            header,
            meta,
            frames_per_toc_entry,
            toc,
            first_frame_offset,
            frames_end,
            current_frame: 0,
            cursor: first_frame_offset,
        })
    }

    /// Position the frame cursor at `frame` (0-based).
    pub fn seek(&mut self, frame: u64) -> Result<()> {
        let frame_count = self.header.frame_count;
        if frame >= frame_count {
            return Err(TraceError::FrameOutOfRange { frame, frame_count });
        }
        let stride = self
            .frames_per_toc_entry
            .ok_or(TraceError::MalformedToc("no table of contents"))?;

        // There is no TOC entry for frames [0, stride), so entry i - 1 holds frame i * stride.
        let toc_index = frame / stride;
        let (start_frame, start_offset) = if toc_index == 0 {
            (0, self.first_frame_offset)
        } else {
            let offset = usize::try_from(toc_index - 1)
                .ok()
                .and_then(|i| self.toc.get(i).copied())
                .ok_or(TraceError::MalformedToc("missing TOC entry"))?;
            (toc_index * stride, offset)
        };

        self.reader.seek(SeekFrom::Start(start_offset))?;
        self.current_frame = start_frame;
        self.cursor = start_offset;

        // Skip with relative seeks only: `BufReader` drops its buffer on every absolute seek.
        while self.current_frame != frame {
            let len = self.read_frame_len()?;
            let next = self.frame_end(len)?;
            let skip = i64::try_from(len)
                .map_err(|_| TraceError::Corrupt("frame length does not fit in a seek offset"))?;
            self.reader.seek_relative(skip)?;
            self.cursor = next;
            self.current_frame += 1;
        }

        trace!(frame, scanned = frame - start_frame, "seek");
        Ok(())
    }

    /// Read the frame under the cursor and advance past it.
    pub fn get_frame(&mut self) -> Result<C::Frame> {
        if self.end_of_trace() {
            return Err(TraceError::EndOfTrace);
        }

        let len = self.read_frame_len()?;
        let next = self.frame_end(len)?;
        let len = usize::try_from(len)
            .map_err(|_| TraceError::Corrupt("frame length does not fit in memory"))?;
        let bytes = self.reader.read_exact_vec(len)?;
        self.cursor = next;
        self.current_frame += 1;

        self.codec.decode_frame(&bytes).map_err(TraceError::Decode)
    }

    /// Read up to `n` frames from the cursor. Returns fewer (possibly none) when the end of the
    /// trace is reached first.
    pub fn get_frames(&mut self, n: u64) -> Result<Vec<C::Frame>> {
        let available = self.header.frame_count.saturating_sub(self.current_frame);
        let n = n.min(available);
        let mut frames = Vec::with_capacity(usize::try_from(n).unwrap_or(0).min(1024));
        for _ in 0..n {
            frames.push(self.get_frame()?);
        }
        Ok(frames)
    }

    /// Iterate over the remaining frames. The iterator stops after the first error.
    pub fn frames(&mut self) -> Frames<'_, R, C> {
        Frames {
            reader: self,
            failed: false,
        }
    }

    pub fn end_of_trace(&self) -> bool {
        self.current_frame >= self.header.frame_count
    }

    /// Index of the frame the next [`get_frame`](TraceReader::get_frame) returns.
    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn frame_count(&self) -> u64 {
        self.header.frame_count
    }

    /// `None` when the trace has no TOC (written to a non-seekable sink).
    pub fn frames_per_toc_entry(&self) -> Option<u64> {
        self.frames_per_toc_entry
    }

    pub fn arch(&self) -> FrameArch {
        self.header.arch
    }

    pub fn machine(&self) -> FrameMachine {
        self.header.machine
    }

    pub fn version(&self) -> u64 {
        self.header.version
    }

    pub fn meta(&self) -> &C::Meta {
        &self.meta
    }

    pub fn header(&self) -> &TraceHeader {
        &self.header
    }

    pub fn toc_entries(&self) -> &[u64] {
        &self.toc
    }

    pub fn first_frame_offset(&self) -> u64 {
        self.first_frame_offset
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn read_frame_len(&mut self) -> Result<u64> {
        let len = self.reader.read_u64_le()?;
        if len == 0 {
            return Err(TraceError::ZeroLengthFrame {
                offset: self.cursor,
            });
        }
        Ok(len)
    }

    /// Offset just past a frame of `len` payload bytes starting at the cursor.
    fn frame_end(&self, len: u64) -> Result<u64> {
        self.cursor
            .checked_add(U64_SIZE)
            .and_then(|start| start.checked_add(len))
            .filter(|&end| end <= self.frames_end)
            .ok_or(TraceError::Corrupt("frame extends past the end of the frame stream"))
    }
}

pub struct Frames<'a, R, C: TraceCodec> {
    reader: &'a mut TraceReader<R, C>,
    failed: bool,
}

impl<R: Read + Seek, C: TraceCodec> Iterator for Frames<'_, R, C> {
    type Item = Result<C::Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.end_of_trace() {
            return None;
        }
        let frame = self.reader.get_frame();
        self.failed = frame.is_err();
        Some(frame)
    }
}

fn read_toc<R: Read + Seek>(
    reader: &mut R,
    header: &TraceHeader,
    first_frame_offset: u64,
    file_len: u64,
) -> Result<(u64, Vec<u64>)> {
    let toc_offset = header.toc_offset;
    if toc_offset < first_frame_offset {
        return Err(TraceError::MalformedToc(
            "TOC offset points into the header or metadata",
        ));
    }
    let entries_start = toc_offset
        .checked_add(U64_SIZE)
        .ok_or(TraceError::MalformedToc("TOC offset overflows"))?;
    if entries_start > file_len {
        return Err(TraceError::MalformedToc("TOC offset is past the end of the file"));
    }

    reader.seek(SeekFrom::Start(toc_offset))?;
    let stride = reader.read_u64_le()?;
    if stride == 0 {
        return Err(TraceError::MalformedToc("zero frames per TOC entry"));
    }

    let count = toc_entry_count(header.frame_count, stride);
    let expected_end = count
        .checked_mul(U64_SIZE)
        .and_then(|len| entries_start.checked_add(len))
        .ok_or(TraceError::MalformedToc("TOC length overflows"))?;
    if expected_end != file_len {
        return Err(TraceError::MalformedToc(
            "TOC entry count disagrees with the file length",
        ));
    }

    let count = usize::try_from(count).map_err(|_| TraceError::MalformedToc("TOC too large"))?;
    let mut toc = Vec::new();
    toc.try_reserve_exact(count)
        .map_err(|_| TraceError::OutOfMemory {
            len: count.saturating_mul(U64_SIZE as usize),
        })?;

    let mut prev = first_frame_offset;
    for _ in 0..count {
        let offset = reader.read_u64_le()?;
        if offset <= prev || offset >= toc_offset {
            return Err(TraceError::MalformedToc(
                "TOC entries must increase and point into the frame stream",
            ));
        }
        toc.push(offset);
        prev = offset;
    }

    // We should be exactly at the end of the file now.
    if reader.stream_position()? != file_len {
        return Err(TraceError::MalformedToc("trailing bytes after the TOC"));
    }

    Ok((stride, toc))
}
