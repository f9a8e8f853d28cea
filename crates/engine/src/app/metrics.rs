use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::warn;

use crate::render::DrawStats;

static METRICS_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_metrics_lock_poison_once(operation: &'static str) {
    if METRICS_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "metrics lock poisoned; recovered inner value");
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub fps: f32,
    pub tps: f32,
    pub frame_time_ms: f32,
    /// Tiles in the visible-tile cache at the end of the interval.
    pub visible_tiles: usize,
    /// Average tiles handed to the renderer per frame.
    pub drawn_tiles_per_frame: f32,
    /// Share of frames that repainted the tile layer.
    pub tile_redraw_ratio: f32,
}

#[derive(Clone, Debug)]
pub struct MetricsHandle {
    snapshot: Arc<RwLock<LoopMetricsSnapshot>>,
}

impl Default for MetricsHandle {
    fn default() -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(LoopMetricsSnapshot::default())),
        }
    }
}

impl MetricsHandle {
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        match self.snapshot.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("read");
                *poisoned.into_inner()
            }
        }
    }

    pub(crate) fn publish(&self, snapshot: LoopMetricsSnapshot) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("write");
                let mut guard = poisoned.into_inner();
                *guard = snapshot;
            }
        }
    }
}

/// Aggregates loop counters over one interval of loop time. Timestamps are
/// offsets from the start of the loop.
#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Duration,
    interval: Duration,
    frames: u32,
    ticks: u32,
    frame_time_sum: Duration,
    drawn_tiles: u64,
    tile_redraws: u32,
    visible_tiles: usize,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval_start: Duration::ZERO,
            interval,
            frames: 0,
            ticks: 0,
            frame_time_sum: Duration::ZERO,
            drawn_tiles: 0,
            tile_redraws: 0,
            visible_tiles: 0,
        }
    }

    pub(crate) fn record_frame(
        &mut self,
        frame_dt: Duration,
        stats: &DrawStats,
        visible_tiles: usize,
    ) {
        self.frames = self.frames.saturating_add(1);
        self.frame_time_sum = self.frame_time_sum.saturating_add(frame_dt);
        self.drawn_tiles = self.drawn_tiles.saturating_add(u64::from(stats.tiles));
        if stats.redrew_tiles {
            self.tile_redraws = self.tile_redraws.saturating_add(1);
        }
        self.visible_tiles = visible_tiles;
    }

    pub(crate) fn record_tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Duration) -> Option<LoopMetricsSnapshot> {
        let elapsed = now.saturating_sub(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let (frame_time_ms, drawn_tiles_per_frame, tile_redraw_ratio) = if self.frames == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let frames = self.frames as f32;
            (
                (self.frame_time_sum.as_secs_f32() / frames) * 1000.0,
                self.drawn_tiles as f32 / frames,
                self.tile_redraws as f32 / frames,
            )
        };

        let snapshot = LoopMetricsSnapshot {
            fps: self.frames as f32 / elapsed_seconds,
            tps: self.ticks as f32 / elapsed_seconds,
            frame_time_ms,
            visible_tiles: self.visible_tiles,
            drawn_tiles_per_frame,
            tile_redraw_ratio,
        };

        self.interval_start = now;
        self.frames = 0;
        self.ticks = 0;
        self.frame_time_sum = Duration::ZERO;
        self.drawn_tiles = 0;
        self.tile_redraws = 0;

        Some(snapshot)
    }
}
