mod app;

use tracing::{error, info};

fn main() {
    let app::AppWiring {
        config,
        view_config,
        mut session,
    } = match app::build_app() {
        Ok(wiring) => wiring,
        Err(err) => {
            error!(error = %err, "startup_failed");
            std::process::exit(1);
        }
    };

    match engine::run_headless(config, &view_config, &mut session) {
        Ok(summary) => info!(
            frames = summary.frames,
            ticks = summary.ticks,
            clock_ms = summary.clock_ms,
            quit_requested = summary.quit_requested,
            "run_finished"
        ),
        Err(err) => {
            error!(error = %err, "run_failed");
            std::process::exit(1);
        }
    }
}
