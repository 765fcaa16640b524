//! Headless streaming demo - flies viewers across the terrain and reports
//! what the streaming controller did.
//!
//! Usage: cargo run --release -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>      JSON terrain config (default: built-in, one viewer)
//!   --gpu                Run both compute stages on the GPU
//!   --ticks <N>          Ticks to simulate (default: 600)
//!   --speed <UNITS>      Viewer speed in world units per tick (default: 4.0)
//!   --stats-json <PATH>  Write the final summary as JSON

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use glam::Vec3;
use serde::Serialize;

use voxterra::compute::GpuContext;
use voxterra::config::{TerrainConfig, ViewerConfig};
use voxterra::core::logging;
use voxterra::core::time::{TickTimer, TickWindow};
use voxterra::pipeline::ComputePipeline;
use voxterra::streaming::{RecordingRenderable, StreamingController, StreamingStats};
use voxterra::surface::TerraformEdit;

#[derive(Serialize)]
struct Summary {
    backend: &'static str,
    ticks: usize,
    totals: StreamingStats,
    tick_timing: TickWindow,
    visible_slots: usize,
    meshed_slots: usize,
    triangles_shown: usize,
}

fn main() {
    logging::init();
    if let Err(e) = run() {
        log::error!("Demo failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> voxterra::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = match parse_str_arg(&args, "--config") {
        Some(path) => TerrainConfig::load(path)?,
        None => TerrainConfig::default(),
    };
    if config.viewers.is_empty() {
        config.viewers.push(ViewerConfig::default());
    }
    let ticks = parse_usize_arg(&args, "--ticks").unwrap_or(600);
    let speed = parse_f32_arg(&args, "--speed").unwrap_or(4.0);
    let use_gpu = args.iter().any(|a| a == "--gpu");

    let (pipeline, backend) = if use_gpu {
        let gpu = Arc::new(GpuContext::headless()?);
        (ComputePipeline::gpu(&config, gpu)?, "gpu")
    } else {
        (ComputePipeline::cpu(&config), "cpu")
    };

    println!("=== Voxterra Streaming Demo ===");
    println!("Backend: {}", backend);
    println!("Chunk:   {} units, LOD points {:?}", config.map.chunk_axis_size, config.map.lod_points);
    println!("Viewers: {}", config.viewers.len());
    println!("Ticks:   {} at {} units/tick", ticks, speed);
    println!();

    let renderables: Arc<Mutex<Vec<RecordingRenderable>>> = Arc::default();
    let sink = Arc::clone(&renderables);
    let mut controller = StreamingController::new(config.map.clone(), pipeline)?.with_renderables(move |_, _| {
        let recorder = RecordingRenderable::new();
        if let Ok(mut all) = sink.lock() {
            all.push(recorder.clone());
        }
        Box::new(recorder)
    });
    let ids = config
        .viewers
        .iter()
        .map(|viewer| controller.add_viewer(viewer))
        .collect::<voxterra::Result<Vec<_>>>()?;

    let mut timer = TickTimer::default();
    let wobble = config.map.chunk_axis_size * 2.0;
    for tick in 0..ticks {
        let t = tick as f32;
        for (i, (&id, viewer)) in ids.iter().zip(&config.viewers).enumerate() {
            // Fly along +x, weaving in z
            let offset = Vec3::new(t * speed, 0.0, (t * 0.02 + i as f32).sin() * wobble);
            controller.set_viewer_position(id, viewer.start + offset)?;
        }

        if tick == ticks / 2 {
            if let Some(viewer) = controller.viewers().first() {
                let edit = TerraformEdit::excavate(viewer.position(), config.map.chunk_axis_size * 0.4, 3.0);
                let changed = controller.terraform(&edit)?;
                log::info!("Excavated around {:?}: {} chunks changed", edit.hit, changed);
            }
        }

        timer.begin();
        let stats = controller.tick()?;
        timer.end();

        if tick % 60 == 0 {
            log::info!(
                "tick {}: +{} -{} cells, {} hits, {} completed, backlog {}, in flight {}/{}, {} cached",
                tick,
                stats.loads,
                stats.unloads,
                stats.cache_hits,
                stats.completed,
                stats.backlog,
                stats.density_in_flight,
                stats.surface_in_flight,
                stats.cached_chunks
            );
        }
    }

    let deadline = Instant::now() + Duration::from_secs(60);
    while !controller.is_settled() && Instant::now() < deadline {
        controller.tick()?;
        std::thread::sleep(Duration::from_millis(1));
    }
    if !controller.is_settled() {
        log::warn!("Pipeline still busy after drain timeout");
    }

    let (visible_slots, meshed_slots, triangles_shown) = {
        let all = renderables
            .lock()
            .map_err(|_| voxterra::Error::Compute("renderable registry poisoned".into()))?;
        let states: Vec<_> = all.iter().map(RecordingRenderable::snapshot).filter(|s| s.visible).collect();
        let meshed = states.iter().filter(|s| s.mesh.is_some()).count();
        let triangles = states
            .iter()
            .filter_map(|s| s.mesh.as_ref())
            .map(|m| m.triangle_count())
            .sum();
        (states.len(), meshed, triangles)
    };

    let summary = Summary {
        backend,
        ticks,
        totals: controller.totals(),
        tick_timing: timer.stats(),
        visible_slots,
        meshed_slots,
        triangles_shown,
    };

    println!();
    println!("=== Summary ===");
    println!("Loads/unloads:  {} / {}", summary.totals.loads, summary.totals.unloads);
    println!("Cache hits:     {} ({} misses)", summary.totals.cache_hits, summary.totals.cache_misses);
    println!("Completed:      {} ({} failed, {} discarded)", summary.totals.completed, summary.totals.failed, summary.totals.discarded);
    println!("Relocations:    {}", summary.totals.relocations);
    println!("Cached chunks:  {}", summary.totals.cached_chunks);
    println!("Slots:          {} visible, {} meshed, {} triangles", visible_slots, meshed_slots, triangles_shown);
    println!(
        "Tick time:      avg {:.2}ms, min {:.2}ms, max {:.2}ms (mean {:?} over {} ticks)",
        summary.tick_timing.avg_ms,
        summary.tick_timing.min_ms,
        summary.tick_timing.max_ms,
        timer.mean(),
        timer.tick_count()
    );

    if let Some(path) = parse_str_arg(&args, "--stats-json") {
        std::fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
        println!("Summary written to {}", path);
    }

    Ok(())
}

fn parse_f32_arg(args: &[String], flag: &str) -> Option<f32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
