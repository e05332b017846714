use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use ntag_render::KeyCanvas;
use ntag_render::tile::grating_pixmap;
use tiny_skia::{Color, Pixmap};

fn solid_tile(size: u32) -> Pixmap {
    let mut pm = Pixmap::new(size, size).unwrap();
    pm.fill(Color::from_rgba8(255, 255, 255, 255));
    pm
}

// A 30-key frame: clear plus one opaque blit per key, the per-frame work
// of the flash loop.
pub fn bench_full_frame(c: &mut Criterion) {
    let mut g = c.benchmark_group("compose");
    g.sample_size(60);

    let tile = solid_tile(128);
    let grating = grating_pixmap(128, 10.0);

    let centers: Vec<(f32, f32)> = (0..30)
        .map(|i| {
            let col = (i % 6) as f32;
            let row = (i / 6) as f32;
            (120.0 + col * 160.0, 160.0 + row * 120.0)
        })
        .collect();

    g.bench_function("solid_grid_30", |b| {
        b.iter_batched(
            || KeyCanvas::new(1280, 720, Color::BLACK).unwrap(),
            |mut canvas| {
                canvas.clear();
                for &center in &centers {
                    canvas.blit(black_box(&tile), center);
                }
            },
            BatchSize::SmallInput,
        )
    });

    g.bench_function("grating_grid_30", |b| {
        b.iter_batched(
            || KeyCanvas::new(1280, 720, Color::BLACK).unwrap(),
            |mut canvas| {
                canvas.clear();
                for &center in &centers {
                    canvas.blit(black_box(&grating), center);
                }
            },
            BatchSize::SmallInput,
        )
    });

    g.finish();
}

criterion_group!(benches, bench_full_frame);
criterion_main!(benches);
