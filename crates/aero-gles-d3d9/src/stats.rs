use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the translation core (state filtering, caches, device recovery).
///
/// Cheap to update on the device thread; readable from another thread for telemetry.
#[derive(Debug, Default)]
pub struct BackendStats {
    state_groups_applied: AtomicU64,
    state_groups_skipped: AtomicU64,
    render_state_calls: AtomicU64,

    vertex_format_hits: AtomicU64,
    vertex_format_misses: AtomicU64,
    vertex_format_evictions: AtomicU64,

    shader_hits: AtomicU64,
    shader_misses: AtomicU64,

    queries_created: AtomicU64,
    queries_reused: AtomicU64,

    device_losses: AtomicU64,
    resets_attempted: AtomicU64,
    resets_succeeded: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStatsSnapshot {
    pub state_groups_applied: u64,
    pub state_groups_skipped: u64,
    pub render_state_calls: u64,
    pub vertex_format_hits: u64,
    pub vertex_format_misses: u64,
    pub vertex_format_evictions: u64,
    pub shader_hits: u64,
    pub shader_misses: u64,
    pub queries_created: u64,
    pub queries_reused: u64,
    pub device_losses: u64,
    pub resets_attempted: u64,
    pub resets_succeeded: u64,
}

impl BackendStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_state_groups_applied(&self) {
        self.state_groups_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_state_groups_skipped(&self) {
        self.state_groups_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_render_state_calls(&self, calls: u64) {
        self.render_state_calls.fetch_add(calls, Ordering::Relaxed);
    }

    pub fn inc_vertex_format_hits(&self) {
        self.vertex_format_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_vertex_format_misses(&self) {
        self.vertex_format_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_vertex_format_evictions(&self) {
        self.vertex_format_evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_shader_hits(&self) {
        self.shader_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_shader_misses(&self) {
        self.shader_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_queries_created(&self) {
        self.queries_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_queries_reused(&self) {
        self.queries_reused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_device_losses(&self) {
        self.device_losses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resets_attempted(&self) {
        self.resets_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_resets_succeeded(&self) {
        self.resets_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BackendStatsSnapshot {
        BackendStatsSnapshot {
            state_groups_applied: self.state_groups_applied.load(Ordering::Relaxed),
            state_groups_skipped: self.state_groups_skipped.load(Ordering::Relaxed),
            render_state_calls: self.render_state_calls.load(Ordering::Relaxed),
            vertex_format_hits: self.vertex_format_hits.load(Ordering::Relaxed),
            vertex_format_misses: self.vertex_format_misses.load(Ordering::Relaxed),
            vertex_format_evictions: self.vertex_format_evictions.load(Ordering::Relaxed),
            shader_hits: self.shader_hits.load(Ordering::Relaxed),
            shader_misses: self.shader_misses.load(Ordering::Relaxed),
            queries_created: self.queries_created.load(Ordering::Relaxed),
            queries_reused: self.queries_reused.load(Ordering::Relaxed),
            device_losses: self.device_losses.load(Ordering::Relaxed),
            resets_attempted: self.resets_attempted.load(Ordering::Relaxed),
            resets_succeeded: self.resets_succeeded.load(Ordering::Relaxed),
        }
    }
}
