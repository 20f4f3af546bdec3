#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use frame_trace::{
    toc_entry_count, FrameArch, FrameMachine, RawCodec, StreamSink, TraceReader, TraceWriter,
    WriterOptions, DEFAULT_FRAMES_PER_TOC_ENTRY,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "frame-trace-inspect",
    about = "Inspect, verify and build frame-trace containers (frames are treated as raw bytes)."
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the header fields and a summary of the table of contents
    Info {
        /// Trace file
        trace: PathBuf,
    },

    /// Print frame sizes and a hex preview of their payloads
    Dump {
        /// Trace file
        trace: PathBuf,

        /// First frame to print (0-based)
        #[arg(long, default_value_t = 0)]
        start: u64,

        /// Maximum number of frames to print
        #[arg(long, default_value_t = 10)]
        count: u64,

        /// Payload bytes shown per frame
        #[arg(long, value_name = "BYTES", default_value_t = 16)]
        preview_bytes: usize,
    },

    /// Read every frame and check that seeking to each TOC checkpoint lands on the same frame
    Verify {
        /// Trace file
        trace: PathBuf,
    },

    /// Build a trace with one frame per non-empty input line
    Pack {
        /// Input text file ("-" for stdin)
        #[arg(long, default_value = "-")]
        input: PathBuf,

        /// Output trace path ("-" for stdout; no TOC is written in that case)
        output: PathBuf,

        /// Metadata record stored after the header
        #[arg(long, default_value = "")]
        meta: String,

        /// Frames per TOC entry
        #[arg(long, default_value_t = DEFAULT_FRAMES_PER_TOC_ENTRY)]
        stride: u64,

        /// Architecture code written to the header
        #[arg(long, default_value_t = FrameArch::I386.0)]
        arch: u64,

        /// Machine code written to the header
        #[arg(long, default_value_t = FrameMachine::I386_I386.0)]
        machine: u64,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Info { trace } => info(&trace, &mut io::stdout().lock()),
        Command::Dump {
            trace,
            start,
            count,
            preview_bytes,
        } => dump(&trace, start, count, preview_bytes, &mut io::stdout().lock()),
        Command::Verify { trace } => verify(&trace, &mut io::stdout().lock()),
        Command::Pack {
            input,
            output,
            meta,
            stride,
            arch,
            machine,
        } => {
            let options = WriterOptions {
                arch: FrameArch(arch),
                machine: FrameMachine(machine),
                frames_per_toc_entry: stride,
            };
            pack(&input, &output, meta.into_bytes(), options)
        }
    }
}

fn open(path: &Path) -> anyhow::Result<TraceReader<BufReader<File>, RawCodec>> {
    TraceReader::open_path(path, RawCodec)
        .with_context(|| format!("open trace {}", path.display()))
}

fn info(path: &Path, out: &mut impl Write) -> anyhow::Result<()> {
    let r = open(path)?;
    let header = r.header();

    writeln!(out, "version:          {}", header.version)?;
    match header.arch.name() {
        Some(name) => writeln!(out, "architecture:     {} ({name})", header.arch.0)?,
        None => writeln!(out, "architecture:     {}", header.arch.0)?,
    }
    writeln!(out, "machine:          {}", header.machine.0)?;
    writeln!(out, "frames:           {}", header.frame_count)?;
    writeln!(out, "metadata bytes:   {}", header.meta_size)?;
    writeln!(out, "first frame at:   {}", r.first_frame_offset())?;
    match r.frames_per_toc_entry() {
        Some(stride) => {
            writeln!(out, "toc offset:       {}", header.toc_offset)?;
            writeln!(out, "frames per entry: {stride}")?;
            writeln!(out, "toc entries:      {}", r.toc_entries().len())?;
        }
        None => writeln!(out, "toc:              none (written to a non-seekable sink)")?,
    }
    Ok(())
}

fn dump(
    path: &Path,
    start: u64,
    count: u64,
    preview_bytes: usize,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let mut r = open(path)?;
    if r.frame_count() == 0 {
        return Ok(());
    }
    r.seek(start).with_context(|| format!("seek to frame {start}"))?;

    for (i, frame) in (start..).zip(r.get_frames(count)?) {
        let preview: String = frame
            .iter()
            .take(preview_bytes)
            .map(|b| format!("{b:02x}"))
            .collect();
        let ellipsis = if frame.len() > preview_bytes { ".." } else { "" };
        writeln!(out, "frame {i}: {} bytes {preview}{ellipsis}", frame.len())?;
    }
    Ok(())
}

fn verify(path: &Path, out: &mut impl Write) -> anyhow::Result<()> {
    let mut r = open(path)?;
    let frame_count = r.frame_count();
    let Some(stride) = r.frames_per_toc_entry() else {
        writeln!(out, "ok: 0 frames, no toc")?;
        return Ok(());
    };

    let expected_entries = toc_entry_count(frame_count, stride);
    if r.toc_entries().len() as u64 != expected_entries {
        bail!(
            "toc has {} entries, expected {expected_entries}",
            r.toc_entries().len()
        );
    }

    // Keep the frames that sit on TOC checkpoints so seeks can be compared against them.
    let mut checkpoints = Vec::new();
    let mut read = 0u64;
    for frame in r.frames() {
        let frame = frame.with_context(|| format!("read frame {read}"))?;
        if read % stride == 0 {
            checkpoints.push(frame);
        }
        read += 1;
    }
    if read != frame_count {
        bail!("read {read} frames, header says {frame_count}");
    }

    for (k, expected) in checkpoints.iter().enumerate() {
        let index = k as u64 * stride;
        r.seek(index).with_context(|| format!("seek to frame {index}"))?;
        let frame = r
            .get_frame()
            .with_context(|| format!("read frame {index} after seek"))?;
        if &frame != expected {
            bail!("frame {index} differs between sequential read and seek");
        }
    }

    writeln!(
        out,
        "ok: {frame_count} frames, {} toc entries, {stride} frames per entry",
        r.toc_entries().len()
    )?;
    Ok(())
}

fn pack(
    input: &Path,
    output: &Path,
    meta: Vec<u8>,
    options: WriterOptions,
) -> anyhow::Result<()> {
    let lines: Box<dyn BufRead> = if input == Path::new("-") {
        Box::new(io::stdin().lock())
    } else {
        let file = File::open(input).with_context(|| format!("open input {}", input.display()))?;
        Box::new(BufReader::new(file))
    };

    let frame_count = if output == Path::new("-") {
        let sink = StreamSink::new(io::stdout().lock());
        let mut w = TraceWriter::new(sink, &meta, RawCodec, options)?;
        add_lines(&mut w, lines)?;
        let frame_count = w.frame_count();
        w.finish().context("finish trace")?;
        frame_count
    } else {
        let mut w = TraceWriter::create(output, &meta, RawCodec, options)
            .with_context(|| format!("create {}", output.display()))?;
        add_lines(&mut w, lines)?;
        let frame_count = w.frame_count();
        w.close().with_context(|| format!("close {}", output.display()))?;
        frame_count
    };

    tracing::info!(frame_count, "packed trace");
    Ok(())
}

fn add_lines<W: Write + Seek>(
    w: &mut TraceWriter<W, RawCodec>,
    lines: Box<dyn BufRead>,
) -> anyhow::Result<()> {
    for line in lines.lines() {
        let line = line.context("read input line")?;
        if line.is_empty() {
            continue;
        }
        w.add(&line.into_bytes())?;
    }
    Ok(())
}
