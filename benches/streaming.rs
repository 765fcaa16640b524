use criterion::{criterion_group, criterion_main, Criterion, black_box};

use voxterra::config::{MapConfig, NoiseParams, SurfaceParams, TerrainConfig, ViewerConfig};
use voxterra::density::DensityKernel;
use voxterra::math::{Direction, GridPos, ShellOffsets};
use voxterra::streaming::StreamingController;
use voxterra::surface::SurfaceExtractor;

use glam::Vec3;

fn bench_shell_offsets(c: &mut Criterion) {
    c.bench_function("shell_offsets_d8", |b| {
        b.iter(|| ShellOffsets::new(black_box(8)));
    });

    let shells = ShellOffsets::new(8);
    c.bench_function("shell_incoming_d8", |b| {
        b.iter(|| {
            shells
                .incoming(black_box(Direction::Right), GridPos::new(3, 0, -2))
                .count()
        });
    });
}

fn bench_density_generate(c: &mut Criterion) {
    let map = MapConfig::default();
    let kernel = DensityKernel::new(NoiseParams::default());
    for lod in [0, 3] {
        let points = map.points_per_axis(lod).unwrap();
        let step = map.sample_step(lod).unwrap();
        c.bench_function(&format!("density_generate_{}", points), |b| {
            b.iter(|| kernel.generate(black_box(GridPos::new(1, 0, -1)), points, step));
        });
    }
}

fn bench_marching_cubes(c: &mut Criterion) {
    let map = MapConfig::default();
    let kernel = DensityKernel::new(NoiseParams::default());
    let extractor = SurfaceExtractor::new(&SurfaceParams::default());
    for lod in [0, 3] {
        let points = map.points_per_axis(lod).unwrap();
        let step = map.sample_step(lod).unwrap();
        let field = kernel.generate(GridPos::ZERO, points, step);
        c.bench_function(&format!("marching_cubes_{}", points), |b| {
            b.iter(|| extractor.extract(black_box(&field), step, Vec3::ZERO));
        });
    }
}

/// Settled controller, one viewer at d=2; measures a one-cell move including
/// the loads served from cache.
fn bench_controller_move(c: &mut Criterion) {
    let config = TerrainConfig {
        viewers: vec![ViewerConfig {
            view_distance: 2,
            lod: 0,
            start: Vec3::splat(16.0),
        }],
        ..Default::default()
    };
    let mut controller = StreamingController::cpu(&config).unwrap();
    let settle = |controller: &mut StreamingController| {
        while !controller.is_settled() {
            controller.tick().unwrap();
            std::thread::yield_now();
        }
    };
    settle(&mut controller);

    let mut x = 16.0;
    c.bench_function("controller_step_d2", |b| {
        b.iter(|| {
            // Oscillate between two cells so every load is a cache hit after warmup
            x = if x < 32.0 { 48.0 } else { 16.0 };
            controller.set_viewer_position(0, Vec3::new(x, 16.0, 16.0)).unwrap();
            let stats = controller.tick().unwrap();
            settle(&mut controller);
            black_box(stats)
        });
    });
}

criterion_group!(
    benches,
    bench_shell_offsets,
    bench_density_generate,
    bench_marching_cubes,
    bench_controller_move,
);
criterion_main!(benches);
