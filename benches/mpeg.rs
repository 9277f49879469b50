use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use mpeg1_trickplay::mpeg1::frame::{Frame, FrameBufferPair};
use mpeg1_trickplay::mpeg1::{Mpeg1Decoder, PictureType, PresentMode, Timecode};
use mpeg1_trickplay::queue::MemoryFeed;
use mpeg1_trickplay::synth::{packetize, Macroblock, PesOptions, StreamBuilder};
use mpeg1_trickplay::ts::{DemuxSource, DiscardAudio};
use mpeg1_trickplay::DecoderConfig;

const GOPS: usize = 10;
const GOP_LENGTH: usize = 15;

/// Ten GOPs of one textured I picture followed by predicted pictures with
/// motion and residuals, packetized at 25 pictures per second.
fn synthetic_transport_stream(config: &DecoderConfig) -> Vec<u8> {
    let (mb_width, mb_height) = (config.frame_width / 16, config.frame_height / 16);
    let intra: Vec<Macroblock> = (0..mb_width)
        .map(|x| Macroblock::intra_with_ac(60 + x as u8, 110, 140, &[(1, 12), (8, -7), (9, 3)]))
        .collect();
    let mut predicted = vec![Macroblock::forward_with_residual(0, 0, 4); mb_width];
    predicted[0] = Macroblock::forward_with_residual(3, -2, 4);

    let mut ts = Vec::new();
    for gop in 0..GOPS {
        for picture in 0..GOP_LENGTH {
            let mut builder = StreamBuilder::new();
            if picture == 0 {
                builder
                    .sequence_header(config.frame_width as u16, config.frame_height as u16)
                    .gop(&Timecode::default(), true, false)
                    .picture(0, PictureType::Intra);
                for row in 1..=mb_height {
                    builder.slice(row as u8, 6, &intra).unwrap();
                }
            } else {
                builder.picture(picture as u16, PictureType::Predictive);
                for row in 1..=mb_height {
                    builder.slice(row as u8, 8, &predicted).unwrap();
                }
            }
            let pts = ((gop * GOP_LENGTH + picture) * 3600) as i64;
            let es = builder.finish();
            ts.extend(packetize(config.video_pid, &es, PesOptions::video(pts)));
        }
    }
    let end = StreamBuilder::new().sequence_end().finish();
    ts.extend(packetize(config.video_pid, &end, PesOptions::video(0).without_pts()));
    ts
}

fn mpeg1_decode_benchmark(c: &mut Criterion) {
    let config = DecoderConfig::default();
    let ts = synthetic_transport_stream(&config);
    c.bench_function("mpeg1 decode", |b| {
        b.iter_batched_ref(
            || {
                let source = DemuxSource::new(
                    MemoryFeed::new(ts.clone(), config.chunk_size()),
                    DiscardAudio,
                    &config,
                );
                let frames = FrameBufferPair::new(config.frame_width, config.frame_height).unwrap();
                Mpeg1Decoder::new(source, frames)
            },
            |decoder| {
                let mut presented = 0usize;
                let mut sink = |_: &Frame, _: usize, _: Option<i64>, _: PresentMode| presented += 1;
                decoder.decode_until_end(&mut sink);
                assert_eq!(presented, GOPS * GOP_LENGTH);
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = mpeg1_decode_benchmark
}
criterion_main!(benches);
