//! Benchmarks for the per-frame transform kernels
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vimc_rs::pipeline::entities::{debayer_frame, upscale};
use vimc_rs::pipeline::pixfmt::{self, code};
use vimc_rs::pipeline::{MbusFormat, PatternSource, TestPattern};

const SIZES: [(usize, usize); 3] = [(64, 48), (320, 240), (640, 480)];

fn raw_frame(width: usize, height: usize, code: u32) -> Vec<u8> {
    let format = MbusFormat::new(width as u32, height as u32, code);
    let mut frame = vec![0u8; format.frame_size().unwrap_or(0)];
    TestPattern::ColorBars.fill(&format, 0, &mut frame);
    frame
}

fn bench_debayer(c: &mut Criterion) {
    let mut group = c.benchmark_group("debayer");
    let order = pixfmt::bayer_order(code::SRGGB8_1X8).expect("RGGB is a bayer code");

    for (width, height) in SIZES {
        let src = raw_frame(width, height, code::SRGGB8_1X8);
        let mut dst = vec![0u8; width * height * 3];
        group.throughput(Throughput::Elements((width * height) as u64));
        group.bench_with_input(
            BenchmarkId::new("window_3", format!("{}x{}", width, height)),
            &src,
            |b, src| b.iter(|| debayer_frame(order, width, height, 3, black_box(src), &mut dst)),
        );
    }

    // Window size dominates the cost per pixel
    let (width, height) = SIZES[1];
    let src = raw_frame(width, height, code::SRGGB8_1X8);
    let mut dst = vec![0u8; width * height * 3];
    for window in [1, 3, 5, 7] {
        group.bench_with_input(BenchmarkId::new("window", window), &window, |b, &window| {
            b.iter(|| debayer_frame(order, width, height, window, black_box(&src), &mut dst))
        });
    }

    // 12-bit samples take the two-byte path
    let order12 = pixfmt::bayer_order(code::SRGGB12_1X12).expect("RGGB12 is a bayer code");
    let src = raw_frame(width, height, code::SRGGB12_1X12);
    group.bench_function("window_3_12bit", |b| {
        b.iter(|| debayer_frame(order12, width, height, 3, black_box(&src), &mut dst))
    });

    group.finish();
}

fn bench_upscale(c: &mut Criterion) {
    let mut group = c.benchmark_group("upscale");

    for (width, height) in SIZES {
        let src = vec![0x5au8; width * height * 3];
        for multiplier in [2, 3] {
            let mut dst = vec![0u8; src.len() * multiplier * multiplier];
            group.throughput(Throughput::Bytes(dst.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(format!("x{}", multiplier), format!("{}x{}", width, height)),
                &src,
                |b, src| b.iter(|| upscale(black_box(src), width, height, 3, multiplier, &mut dst)),
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_debayer, bench_upscale);
criterion_main!(benches);
