use coco_seg_dataset::{
    combine_instance,
    geometry::{resize_image, resize_mask},
    ResizeConfig,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array2, Array3};
use rand::{rngs::StdRng, SeedableRng};

/// Square instance masks tiled over a `size x size` image
fn instance_masks(size: usize, count: usize) -> Vec<Array2<u8>> {
    let side = size / 4;
    (0..count)
        .map(|i| {
            let top = (i * 37) % (size - side);
            let left = (i * 53) % (size - side);
            Array2::from_shape_fn((size, size), |(y, x)| {
                u8::from((top..top + side).contains(&y) && (left..left + side).contains(&x))
            })
        })
        .collect()
}

fn bench_combine(c: &mut Criterion) {
    let mut group = c.benchmark_group("label_map_combine");
    group.sample_size(20);

    for &count in &[1_usize, 8, 32] {
        let masks = instance_masks(512, count);
        group.bench_with_input(BenchmarkId::new("instances", count), &masks, |b, masks| {
            b.iter(|| {
                let mut labels = Array2::<u32>::zeros((512, 512));
                for (i, mask) in masks.iter().enumerate() {
                    combine_instance(&mut labels, mask.view(), (i % 3 + 1) as u32).unwrap();
                }
                black_box(labels)
            });
        });
    }

    group.finish();
}

fn bench_resize(c: &mut Criterion) {
    let mut group = c.benchmark_group("resize");
    group.sample_size(10);

    let image = Array3::from_shape_fn((600, 800, 3), |(y, x, c)| ((y + x + c) % 256) as u8);
    let labels = Array2::from_shape_fn((600, 800), |(y, x)| ((y / 64 + x / 64) % 4) as u32);

    for config in [ResizeConfig::square(1024, 1024), ResizeConfig::pad64(512), ResizeConfig::crop(512)] {
        group.bench_function(config.mode.to_string(), |b| {
            let mut rng = StdRng::seed_from_u64(1);
            b.iter(|| {
                let (resized, geometry) = resize_image(image.view(), &config, &mut rng).unwrap();
                let mask = resize_mask(labels.view(), &geometry).unwrap();
                black_box((resized, mask))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_combine, bench_resize);
criterion_main!(benches);
