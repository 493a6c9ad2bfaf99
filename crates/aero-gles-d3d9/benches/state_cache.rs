#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
use std::sync::Arc;
#[cfg(not(target_arch = "wasm32"))]
use std::time::Duration;

#[cfg(not(target_arch = "wasm32"))]
use aero_gles_d3d9::native::recording::RecordingDevice;
#[cfg(not(target_arch = "wasm32"))]
use aero_gles_d3d9::native::BehaviorFlags;
#[cfg(not(target_arch = "wasm32"))]
use aero_gles_d3d9::state::{
    BlendFactor, BlendState, Color, CompareFunc, DepthStencilState, FrontFace, RasterizerState,
    Rectangle, RenderTargetInfo, StateCache,
};
#[cfg(not(target_arch = "wasm32"))]
use aero_gles_d3d9::BackendStats;
#[cfg(not(target_arch = "wasm32"))]
use criterion::{black_box, criterion_group, criterion_main, Criterion};

#[cfg(not(target_arch = "wasm32"))]
fn criterion_config() -> Criterion {
    match std::env::var("AERO_BENCH_PROFILE").as_deref() {
        Ok("ci") => Criterion::default()
            // Keep PR runtime low.
            .warm_up_time(Duration::from_millis(150))
            .measurement_time(Duration::from_millis(400))
            .sample_size(10)
            .noise_threshold(0.05),
        _ => Criterion::default()
            .warm_up_time(Duration::from_secs(1))
            .measurement_time(Duration::from_secs(2))
            .sample_size(50)
            .noise_threshold(0.03),
    }
}

#[cfg(not(target_arch = "wasm32"))]
struct Groups {
    rasterizer: RasterizerState,
    blend: BlendState,
    depth_stencil: DepthStencilState,
    scissor: Rectangle,
    viewport: Rectangle,
}

#[cfg(not(target_arch = "wasm32"))]
fn groups(variant: bool) -> Groups {
    let mut blend = BlendState::default();
    blend.blend = variant;
    blend.source_rgb = BlendFactor::SrcAlpha;
    blend.dest_rgb = BlendFactor::OneMinusSrcAlpha;
    let mut depth_stencil = DepthStencilState::default();
    depth_stencil.depth_test = true;
    depth_stencil.depth_func = if variant {
        CompareFunc::Less
    } else {
        CompareFunc::LessEqual
    };
    Groups {
        rasterizer: RasterizerState {
            cull_face: variant,
            ..RasterizerState::default()
        },
        blend,
        depth_stencil,
        scissor: Rectangle::new(0, 0, 640, 480),
        viewport: Rectangle::new(0, 0, if variant { 640 } else { 320 }, 480),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn apply(cache: &mut StateCache, device: &mut RecordingDevice, groups: &Groups) {
    cache.apply_rasterizer(device, &groups.rasterizer);
    cache.apply_blend(device, &groups.blend, Color::default(), u32::MAX);
    cache
        .apply_depth_stencil(device, &groups.depth_stencil, 0, 0, FrontFace::Ccw)
        .expect("valid depth-stencil state");
    cache.apply_scissor(device, groups.scissor, true);
    black_box(
        cache
            .apply_viewport(device, groups.viewport, 0.0, 1.0)
            .expect("non-degenerate viewport"),
    );
}

#[cfg(not(target_arch = "wasm32"))]
fn setup() -> (StateCache, RecordingDevice) {
    let mut cache = StateCache::new(Arc::new(BackendStats::new()));
    cache.set_render_target_info(RenderTargetInfo {
        width: 640,
        height: 480,
        depth_size: 24,
        stencil_size: 8,
    });
    (
        cache,
        RecordingDevice::new(true, BehaviorFlags::HARDWARE_VERTEX_PROCESSING),
    )
}

#[cfg(not(target_arch = "wasm32"))]
fn bench_state_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_cache");

    let unchanged = groups(false);
    group.bench_function("redundant_apply", |b| {
        let (mut cache, mut device) = setup();
        apply(&mut cache, &mut device, &unchanged);
        b.iter(|| apply(&mut cache, &mut device, black_box(&unchanged)));
    });

    let alternating = [groups(false), groups(true)];
    group.bench_function("alternating_apply", |b| {
        let (mut cache, mut device) = setup();
        let mut i = 0usize;
        b.iter(|| {
            apply(&mut cache, &mut device, black_box(&alternating[i & 1]));
            i += 1;
            // Keep the recorded call log from growing without bound.
            if i % 1024 == 0 {
                device.clear_calls();
            }
        });
    });

    group.finish();
}

#[cfg(not(target_arch = "wasm32"))]
criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_state_cache
}

#[cfg(not(target_arch = "wasm32"))]
criterion_main!(benches);
