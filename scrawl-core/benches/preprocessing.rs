use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use image::{DynamicImage, Rgb, RgbImage};
use scrawl_core::{
    CpuPreprocessor, ElementType, InputLayout, PreprocessConfig, Preprocessor, decode_scores,
};
use scrawl_utils::config::ResizeQuality;

const RESOLUTIONS: [u32; 3] = [224, 320, 640];

/// Phone-camera sized page with ruled lines, roughly what the app feeds the model.
fn synthetic_page() -> DynamicImage {
    let image = RgbImage::from_fn(1080, 1440, |x, y| {
        if y % 48 == 0 {
            Rgb([90, 120, 200])
        } else if (x / 7 + y / 11) % 13 == 0 {
            Rgb([30, 30, 40])
        } else {
            Rgb([245, 242, 230])
        }
    });
    DynamicImage::ImageRgb8(image)
}

fn layout(side: u32, element: ElementType) -> InputLayout {
    InputLayout {
        batch: 1,
        height: side,
        width: side,
        channels: 3,
        element,
    }
}

fn benchmark_packing(c: &mut Criterion) {
    let image = synthetic_page();
    let preprocessor = CpuPreprocessor;

    for element in [ElementType::Float32, ElementType::UInt8] {
        let mut group = c.benchmark_group(format!("pack_input_{element:?}").to_lowercase());
        for side in RESOLUTIONS {
            for quality in [ResizeQuality::Quality, ResizeQuality::Speed] {
                let config = PreprocessConfig::from(quality);
                let target = layout(side, element);
                group.bench_with_input(
                    BenchmarkId::new(quality.to_string(), side),
                    &target,
                    |b, target| {
                        b.iter(|| {
                            preprocessor
                                .preprocess(black_box(&image), target, &config)
                                .expect("packing should succeed")
                        });
                    },
                );
            }
        }
        group.finish();
    }
}

fn benchmark_decoding(c: &mut Criterion) {
    let bytes: Vec<u8> = [0.2f32, 0.8]
        .iter()
        .cycle()
        .take(1000)
        .flat_map(|v| v.to_ne_bytes())
        .collect();
    c.bench_function("decode_scores_1000", |b| {
        b.iter(|| {
            decode_scores(black_box(&bytes))
                .expect("whole f32 buffer")
                .interpret()
        });
    });
}

criterion_group!(benches, benchmark_packing, benchmark_decoding);
criterion_main!(benches);
