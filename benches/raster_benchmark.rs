//! Raster fill benchmark: CPU ray marching into the sample raster.
//!
//! Target: 160×48 (an 80×24 terminal) well inside a 60 fps frame.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::{UVec2, Vec2, Vec3};
use termarch::accel::{fill_cpu, Frame};
use termarch::scene::shade_sample;
use termarch::{PlayerMode, Raster, SceneDescription};

fn frame(player: PlayerMode) -> Frame {
    Frame {
        scene: SceneDescription::new(Vec3::new(0.3, -0.2, 1.0), Vec2::new(0.2, 0.1), Vec2::ZERO, player),
        char_height: 2.0,
    }
}

fn fill_terminal_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill_cpu");
    for (columns, rows) in [(80, 24), (120, 40), (200, 50)] {
        let mut raster = Raster::new(columns * 2, rows * 2);
        let frame = frame(PlayerMode::PlayerOne);
        group.bench_with_input(
            BenchmarkId::new("cells", format!("{columns}x{rows}")),
            &(columns, rows),
            |b, _| b.iter(|| fill_cpu(black_box(&mut raster), black_box(&frame))),
        );
    }
    group.finish();
}

fn fill_split_screen(c: &mut Criterion) {
    let mut raster = Raster::new(160, 48);
    let frame = frame(PlayerMode::SplitScreen);

    c.bench_function("fill_cpu_160x48_split", |b| {
        b.iter(|| fill_cpu(black_box(&mut raster), black_box(&frame)))
    });
}

fn single_sample(c: &mut Criterion) {
    let frame = frame(PlayerMode::PlayerOne);
    let resolution = UVec2::new(160, 48);

    c.bench_function("shade_sample_centre", |b| {
        b.iter(|| shade_sample(black_box(80), black_box(24), resolution, frame.char_height, &frame.scene))
    });
}

criterion_group!(benches, fill_terminal_sizes, fill_split_screen, single_sample);
criterion_main!(benches);
