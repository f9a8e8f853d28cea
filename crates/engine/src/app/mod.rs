mod loop_runner;
mod metrics;
mod session;

pub use loop_runner::{
    run_headless, run_headless_with_metrics, AppError, LoopConfig, LoopSummary, FRAME_MS_ENV_VAR,
};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use session::{Session, SessionCommand, SessionError};
