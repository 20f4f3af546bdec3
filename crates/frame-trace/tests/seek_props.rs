use std::io::Cursor;

use frame_trace::{toc_entry_count, RawCodec, TraceReader, TraceWriter, WriterOptions};
use proptest::prelude::*;

const MAX_FRAMES: usize = 200;
const MAX_FRAME_LEN: usize = 48;

fn frames_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(
        prop::collection::vec(any::<u8>(), 1..=MAX_FRAME_LEN),
        0..=MAX_FRAMES,
    )
}

fn stride_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![
        Just(1u64),
        2u64..16,
        Just(MAX_FRAMES as u64 + 1),
    ]
}

fn write_trace(meta: &[u8], frames: &[Vec<u8>], stride: u64) -> Vec<u8> {
    let options = WriterOptions {
        frames_per_toc_entry: stride,
        ..WriterOptions::default()
    };
    let mut w =
        TraceWriter::new(Cursor::new(Vec::new()), &meta.to_vec(), RawCodec, options).unwrap();
    for frame in frames {
        w.add(frame).unwrap();
    }
    w.finish().unwrap().into_inner()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn roundtrip_any_frames_any_stride(
        meta in prop::collection::vec(any::<u8>(), 0..64),
        frames in frames_strategy(),
        stride in stride_strategy(),
    ) {
        let buf = write_trace(&meta, &frames, stride);
        let mut r = TraceReader::open(Cursor::new(buf), RawCodec).unwrap();

        prop_assert_eq!(r.frame_count(), frames.len() as u64);
        prop_assert_eq!(r.meta(), &meta);
        prop_assert_eq!(
            r.toc_entries().len() as u64,
            toc_entry_count(frames.len() as u64, stride)
        );

        let read = r.get_frames(frames.len() as u64 + 1).unwrap();
        prop_assert_eq!(&read, &frames);
        prop_assert!(r.end_of_trace());
    }

    #[test]
    fn seek_then_read_matches_sequential(
        frames in frames_strategy().prop_filter("need frames", |f| !f.is_empty()),
        stride in stride_strategy(),
        targets in prop::collection::vec(any::<prop::sample::Index>(), 1..32),
    ) {
        let buf = write_trace(b"", &frames, stride);
        let mut r = TraceReader::open(Cursor::new(buf), RawCodec).unwrap();

        for target in targets {
            let i = target.index(frames.len());
            r.seek(i as u64).unwrap();
            prop_assert_eq!(r.current_frame(), i as u64);
            prop_assert_eq!(&r.get_frame().unwrap(), &frames[i]);
            prop_assert_eq!(r.end_of_trace(), i + 1 == frames.len());
        }

        let err = r.seek(frames.len() as u64).unwrap_err();
        prop_assert!(err.is_out_of_range());
    }
}
