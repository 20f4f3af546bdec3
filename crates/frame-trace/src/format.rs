use std::io::{Read, Write};

use crate::error::{Result, TraceError};
use crate::io::{ReadLeExt, WriteLeExt};

/// Identity value stored in the first 8 bytes of every trace.
pub const TRACE_MAGIC: u64 = 7_456_879_624_156_307_493;

/// Oldest container layout this crate can read.
pub const TRACE_VERSION_MIN: u64 = 2;
/// Layout emitted by [`crate::TraceWriter`]; also the newest layout this crate can read.
pub const TRACE_VERSION: u64 = 3;

pub const DEFAULT_FRAMES_PER_TOC_ENTRY: u64 = 10_000;

pub const MAGIC_OFFSET: u64 = 0;
pub const VERSION_OFFSET: u64 = 8;
pub const ARCH_OFFSET: u64 = 16;
pub const MACHINE_OFFSET: u64 = 24;
pub const FRAME_COUNT_OFFSET: u64 = 32;
pub const TOC_OFFSET_OFFSET: u64 = 40;
pub const META_SIZE_OFFSET: u64 = 48;
/// The metadata blob starts right after the fixed header.
pub const META_OFFSET: u64 = 56;

pub const TRACE_HEADER_SIZE: u64 = META_OFFSET;

/// Size of a frame length prefix, the TOC stride field and each TOC entry.
pub(crate) const U64_SIZE: u64 = 8;

/// CPU architecture code stored in the trace header.
///
/// The core never interprets this value; any `u64` round-trips unchanged. The named constants
/// cover the handful of architectures trace producers commonly emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameArch(pub u64);

impl FrameArch {
    pub const UNKNOWN: FrameArch = FrameArch(0);
    pub const OBSCURE: FrameArch = FrameArch(1);
    pub const SPARC: FrameArch = FrameArch(6);
    pub const MIPS: FrameArch = FrameArch(8);
    pub const I386: FrameArch = FrameArch(9);
    pub const POWERPC: FrameArch = FrameArch(23);
    pub const ARM: FrameArch = FrameArch(35);

    pub fn name(self) -> Option<&'static str> {
        match self {
            FrameArch::UNKNOWN => Some("unknown"),
            FrameArch::OBSCURE => Some("obscure"),
            FrameArch::SPARC => Some("sparc"),
            FrameArch::MIPS => Some("mips"),
            FrameArch::I386 => Some("i386"),
            FrameArch::POWERPC => Some("powerpc"),
            FrameArch::ARM => Some("arm"),
            _ => None,
        }
    }
}

/// Machine (sub-architecture) code stored in the trace header. `0` means unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameMachine(pub u64);

impl FrameMachine {
    pub const UNSPECIFIED: FrameMachine = FrameMachine(0);
    /// `i386:i386` (32-bit x86).
    pub const I386_I386: FrameMachine = FrameMachine(1);
    /// `i386:x86-64`.
    pub const X86_64: FrameMachine = FrameMachine(64);
}

/// Fixed-size header at the start of every trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceHeader {
    pub version: u64,
    pub arch: FrameArch,
    pub machine: FrameMachine,
    /// Placeholder `0` until a writer on a seekable sink patches it.
    pub frame_count: u64,
    /// `0` means the trace carries no TOC.
    pub toc_offset: u64,
    pub meta_size: u64,
}

impl TraceHeader {
    /// Header as first written by a writer: no frames and no TOC yet.
    pub fn placeholder(arch: FrameArch, machine: FrameMachine, meta_size: u64) -> Self {
        Self {
            version: TRACE_VERSION,
            arch,
            machine,
            frame_count: 0,
            toc_offset: 0,
            meta_size,
        }
    }

    pub fn has_toc(&self) -> bool {
        self.toc_offset != 0
    }

    /// Byte offset of frame 0.
    pub fn first_frame_offset(&self) -> Result<u64> {
        META_OFFSET
            .checked_add(self.meta_size)
            .ok_or(TraceError::Corrupt("metadata size overflows the file offset range"))
    }

    pub fn encode<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        w.write_u64_le(TRACE_MAGIC)?;
        w.write_u64_le(self.version)?;
        w.write_u64_le(self.arch.0)?;
        w.write_u64_le(self.machine.0)?;
        w.write_u64_le(self.frame_count)?;
        w.write_u64_le(self.toc_offset)?;
        w.write_u64_le(self.meta_size)?;
        Ok(())
    }

    /// Decode and validate a header. Magic and version are checked before any other field is
    /// interpreted.
    pub fn decode<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        let magic = r.read_u64_le()?;
        if magic != TRACE_MAGIC {
            return Err(TraceError::InvalidMagic(magic));
        }
        let version = r.read_u64_le()?;
        if !is_supported_version(version) {
            return Err(TraceError::UnsupportedVersion(version));
        }
        let arch = FrameArch(r.read_u64_le()?);
        let machine = FrameMachine(r.read_u64_le()?);
        let frame_count = r.read_u64_le()?;
        let toc_offset = r.read_u64_le()?;
        let meta_size = r.read_u64_le()?;
        Ok(Self {
            version,
            arch,
            machine,
            frame_count,
            toc_offset,
            meta_size,
        })
    }
}

pub fn is_supported_version(v: u64) -> bool {
    (TRACE_VERSION_MIN..=TRACE_VERSION).contains(&v)
}

/// Number of TOC entries a trace with `frame_count` frames carries. There is no entry for
/// frame 0, so a trace with zero or one frame has an empty TOC.
pub fn toc_entry_count(frame_count: u64, frames_per_toc_entry: u64) -> u64 {
    if frame_count == 0 || frames_per_toc_entry == 0 {
        return 0;
    }
    (frame_count - 1) / frames_per_toc_entry
}
