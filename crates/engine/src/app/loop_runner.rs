use std::env;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, ViewConfig};
use crate::world::World;

use super::metrics::MetricsAccumulator;
use super::{MetricsHandle, Session, SessionCommand, SessionError};

/// Overrides [`LoopConfig::frame_time`] with a frame length in milliseconds.
pub const FRAME_MS_ENV_VAR: &str = "TILEVIEW_FRAME_MS";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    /// Simulated length of one frame.
    pub frame_time: Duration,
    /// Frames to run; `None` runs until the session quits.
    pub max_frames: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 50,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            frame_time: Duration::from_millis(16),
            max_frames: Some(600),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("session failed to load: {0}")]
    Session(#[from] SessionError),
}

/// Totals for one headless run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub frames: u64,
    pub ticks: u64,
    pub dropped_backlog: Duration,
    pub quit_requested: bool,
    pub clock_ms: u64,
}

pub fn run_headless(
    config: LoopConfig,
    view_config: &ViewConfig,
    session: &mut dyn Session,
) -> Result<LoopSummary, AppError> {
    let metrics_handle = MetricsHandle::default();
    run_headless_with_metrics(config, view_config, session, metrics_handle)
}

/// Runs `session` over a fresh [`World`] on simulated time: fixed ticks of
/// `1 / target_tps` fed from frames of `frame_time`, with the per-frame
/// tick count capped and any backlog past the cap dropped.
pub fn run_headless_with_metrics(
    config: LoopConfig,
    view_config: &ViewConfig,
    session: &mut dyn Session,
    metrics_handle: MetricsHandle,
) -> Result<LoopSummary, AppError> {
    let mut world = World::new(view_config)?;

    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let frame_time = resolve_frame_time(config.frame_time);

    session.load(&mut world)?;
    info!(
        session = session.name(),
        tiles = world.map().tile_count(),
        "session_loaded"
    );
    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        frame_time_ms = frame_time.as_millis() as u64,
        max_frames = ?config.max_frames,
        "loop_config"
    );

    let mut summary = LoopSummary::default();
    let mut accumulator = Duration::ZERO;
    let mut loop_time = Duration::ZERO;
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);

    while config.max_frames.map_or(true, |max| summary.frames < max) {
        loop_time = loop_time.saturating_add(frame_time);
        let clamped_frame_dt = clamp_frame_delta(frame_time, max_frame_delta);
        accumulator = accumulator.saturating_add(clamped_frame_dt);

        let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
        for _ in 0..step_plan.ticks_to_run {
            let command = session.update(fixed_dt, &mut world);
            world.advance(fixed_dt.as_millis() as u64);
            summary.ticks += 1;
            metrics_accumulator.record_tick();
            if command == SessionCommand::Quit {
                summary.quit_requested = true;
                break;
            }
        }
        accumulator = step_plan.remaining_accumulator;

        if step_plan.dropped_backlog > Duration::ZERO {
            summary.dropped_backlog = summary
                .dropped_backlog
                .saturating_add(step_plan.dropped_backlog);
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame, "sim_clamp_triggered"
            );
        }

        let stats = session.render(&mut world);
        summary.frames += 1;
        metrics_accumulator.record_frame(frame_time, &stats, world.view().visible_tile_count());

        if let Some(snapshot) = metrics_accumulator.maybe_snapshot(loop_time) {
            metrics_handle.publish(snapshot);
            info!(
                fps = snapshot.fps,
                tps = snapshot.tps,
                frame_time_ms = snapshot.frame_time_ms,
                visible_tiles = snapshot.visible_tiles,
                drawn_tiles_per_frame = snapshot.drawn_tiles_per_frame,
                tile_redraw_ratio = snapshot.tile_redraw_ratio,
                "loop_metrics"
            );
        }

        if summary.quit_requested {
            info!(reason = "session_quit", "shutdown_requested");
            break;
        }
    }

    session.unload(&mut world);
    summary.clock_ms = world.clock_ms();
    info!(
        frames = summary.frames,
        ticks = summary.ticks,
        clock_ms = summary.clock_ms,
        "shutdown"
    );
    Ok(summary)
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn resolve_frame_time(config_frame_time: Duration) -> Duration {
    let fallback = normalize_non_zero_duration(config_frame_time, Duration::from_millis(16));
    match env::var(FRAME_MS_ENV_VAR) {
        Ok(value) => match value.parse::<u64>() {
            Ok(ms) if ms > 0 => Duration::from_millis(ms),
            _ => {
                warn!(
                    env_var = FRAME_MS_ENV_VAR,
                    value = value.as_str(),
                    "invalid frame time env var value; falling back to config"
                );
                fallback
            }
        },
        Err(env::VarError::NotPresent) => fallback,
        Err(err) => {
            warn!(
                env_var = FRAME_MS_ENV_VAR,
                error = %err,
                "unable to read frame time env var; falling back to config"
            );
            fallback
        }
    }
}
