use std::io::Cursor;

use frame_trace::{
    RawCodec, TraceError, TraceReader, TraceWriter, WriterOptions, FRAME_COUNT_OFFSET,
    META_SIZE_OFFSET, TOC_OFFSET_OFFSET, TRACE_HEADER_SIZE, TRACE_VERSION, TRACE_VERSION_MIN,
    VERSION_OFFSET,
};

const META: &[u8] = b"metadata";
const FRAME_LEN: u64 = 5;

/// Ten 5-byte frames, a TOC entry every four frames.
fn valid_trace() -> Vec<u8> {
    let options = WriterOptions {
        frames_per_toc_entry: 4,
        ..WriterOptions::default()
    };
    let mut w = TraceWriter::new(Cursor::new(Vec::new()), &META.to_vec(), RawCodec, options)
        .unwrap();
    for i in 0..10u8 {
        w.add(&vec![i; FRAME_LEN as usize]).unwrap();
    }
    w.finish().unwrap().into_inner()
}

fn frame_offset(i: u64) -> usize {
    (TRACE_HEADER_SIZE + META.len() as u64 + i * (8 + FRAME_LEN)) as usize
}

fn put_u64(buf: &mut [u8], off: u64, v: u64) {
    let off = off as usize;
    buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
}

fn get_u64(buf: &[u8], off: u64) -> u64 {
    let off = off as usize;
    u64::from_le_bytes(buf[off..off + 8].try_into().unwrap())
}

fn open(buf: Vec<u8>) -> Result<TraceReader<Cursor<Vec<u8>>, RawCodec>, TraceError> {
    TraceReader::open(Cursor::new(buf), RawCodec)
}

#[test]
fn valid_trace_opens() {
    let r = open(valid_trace()).unwrap();
    assert_eq!(r.frame_count(), 10);
    assert_eq!(r.toc_entries().len(), 2);
}

#[test]
fn flipped_magic_is_rejected() {
    let mut buf = valid_trace();
    buf[0] ^= 0x01;
    let err = open(buf).err().unwrap();
    assert!(matches!(err, TraceError::InvalidMagic(_)), "{err:?}");
}

#[test]
fn out_of_range_version_is_rejected() {
    for version in [TRACE_VERSION_MIN - 1, TRACE_VERSION + 1] {
        let mut buf = valid_trace();
        put_u64(&mut buf, VERSION_OFFSET, version);
        let err = open(buf).err().unwrap();
        assert!(
            matches!(err, TraceError::UnsupportedVersion(v) if v == version),
            "{err:?}"
        );
    }
}

#[test]
fn older_supported_version_still_opens() {
    let mut buf = valid_trace();
    put_u64(&mut buf, VERSION_OFFSET, TRACE_VERSION_MIN);
    let r = open(buf).unwrap();
    assert_eq!(r.version(), TRACE_VERSION_MIN);
}

#[test]
fn truncation_before_toc_is_a_malformed_toc() {
    let buf = valid_trace();
    let toc_offset = get_u64(&buf, TOC_OFFSET_OFFSET);

    for len in [toc_offset - 3, toc_offset, toc_offset + 8, buf.len() as u64 - 1] {
        let truncated = buf[..len as usize].to_vec();
        let err = open(truncated).err().unwrap();
        assert!(matches!(err, TraceError::MalformedToc(_)), "len {len}: {err:?}");
    }
}

#[test]
fn trailing_bytes_after_toc_are_a_malformed_toc() {
    let mut buf = valid_trace();
    buf.extend_from_slice(&[0u8; 8]);
    let err = open(buf).err().unwrap();
    assert!(matches!(err, TraceError::MalformedToc(_)), "{err:?}");
}

#[test]
fn frame_count_disagreeing_with_toc_is_a_malformed_toc() {
    let mut buf = valid_trace();
    // 10 frames need 2 entries at stride 4; 13 frames would need 3.
    put_u64(&mut buf, FRAME_COUNT_OFFSET, 13);
    let err = open(buf).err().unwrap();
    assert!(matches!(err, TraceError::MalformedToc(_)), "{err:?}");
}

#[test]
fn frames_without_toc_are_a_malformed_toc() {
    let mut buf = valid_trace();
    put_u64(&mut buf, TOC_OFFSET_OFFSET, 0);
    let err = open(buf).err().unwrap();
    assert!(matches!(err, TraceError::MalformedToc(_)), "{err:?}");
}

#[test]
fn oversized_meta_size_is_rejected_before_allocating() {
    let mut buf = valid_trace();
    put_u64(&mut buf, META_SIZE_OFFSET, u64::MAX - 8);
    let err = open(buf).err().unwrap();
    assert!(matches!(err, TraceError::Corrupt(_)), "{err:?}");
}

#[test]
fn zero_length_prefix_is_detected_on_read() {
    let mut buf = valid_trace();
    let off = frame_offset(2);
    put_u64(&mut buf, off as u64, 0);

    let mut r = open(buf).unwrap();
    assert_eq!(r.get_frame().unwrap(), vec![0u8; 5]);
    assert_eq!(r.get_frame().unwrap(), vec![1u8; 5]);
    let err = r.get_frame().unwrap_err();
    assert!(
        matches!(err, TraceError::ZeroLengthFrame { offset } if offset == off as u64),
        "{err:?}"
    );

    // Frames reachable through the TOC are still readable after the failure.
    r.seek(4).unwrap();
    assert_eq!(r.get_frame().unwrap(), vec![4u8; 5]);
}

#[test]
fn zero_length_prefix_is_detected_while_seeking() {
    let mut buf = valid_trace();
    put_u64(&mut buf, frame_offset(5) as u64, 0);

    let mut r = open(buf).unwrap();
    let err = r.seek(7).unwrap_err();
    assert!(matches!(err, TraceError::ZeroLengthFrame { .. }), "{err:?}");
}

#[test]
fn corruption_kinds_map_to_distinct_errors() {
    let mut bad_magic = valid_trace();
    bad_magic[7] ^= 0x80;

    let mut bad_version = valid_trace();
    put_u64(&mut bad_version, VERSION_OFFSET, 99);

    let full = valid_trace();
    let toc_offset = get_u64(&full, TOC_OFFSET_OFFSET);
    let truncated = full[..toc_offset as usize - 1].to_vec();

    let mut zero_len = valid_trace();
    put_u64(&mut zero_len, frame_offset(0) as u64, 0);

    let kinds = [
        open(bad_magic).err().unwrap(),
        open(bad_version).err().unwrap(),
        open(truncated).err().unwrap(),
        open(zero_len).unwrap().get_frame().unwrap_err(),
    ]
    .map(|err| std::mem::discriminant(&err));

    for i in 0..kinds.len() {
        for j in i + 1..kinds.len() {
            assert_ne!(kinds[i], kinds[j], "errors {i} and {j} share a kind");
        }
    }
}
