use std::path::PathBuf;

use engine::{ConfigError, LoopConfig, ViewConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::demo::DemoSession;

const CONFIG_ENV_VAR: &str = "TILEVIEW_CONFIG";

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) view_config: ViewConfig,
    pub(crate) session: DemoSession,
}

pub(crate) fn build_app() -> Result<AppWiring, ConfigError> {
    init_tracing();
    info!("=== Tileview Startup ===");

    let view_config = load_view_config(config_path_from_env())?;
    Ok(AppWiring {
        config: LoopConfig::default(),
        view_config,
        session: DemoSession::new(),
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV_VAR)
        .filter(|raw| !raw.is_empty())
        .map(PathBuf::from)
}

fn load_view_config(path: Option<PathBuf>) -> Result<ViewConfig, ConfigError> {
    match path {
        Some(path) => ViewConfig::load(&path),
        None => {
            info!(env_var = CONFIG_ENV_VAR, "view_config_default");
            Ok(ViewConfig::default())
        }
    }
}
