use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::frame_cache::{FrameCache, DYNAMIC_TEXT_REFRESH_MS};
use crate::geometry::Size;
use crate::light::FloorShadowing;
use crate::map::Map;
use crate::map_view::{GeometryError, MapView, DEFAULT_MAX_TEXTURE_SIZE, DEFAULT_VISIBLE_DIMENSION};

/// Protocol version assumed when the config does not name one.
pub const DEFAULT_CLIENT_VERSION: u16 = 1098;

/// View and map settings read at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewConfig {
    pub client_version: u16,
    pub visible_dimension: Size,
    /// Zoom in percent of the tile size; 100 draws 32 pixel tiles.
    pub render_scale: u8,
    pub max_texture_size: i32,
    pub auto_view_mode: bool,
    pub draw_lights: bool,
    pub minimum_ambient_light: f32,
    pub floor_shadowing: FloorShadowing,
    pub draw_highlight_target: bool,
    pub draw_texts: bool,
    pub draw_names: bool,
    pub static_text_interval_ms: u64,
    pub dynamic_text_interval_ms: u64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            client_version: DEFAULT_CLIENT_VERSION,
            visible_dimension: DEFAULT_VISIBLE_DIMENSION,
            render_scale: 100,
            max_texture_size: DEFAULT_MAX_TEXTURE_SIZE,
            auto_view_mode: true,
            draw_lights: false,
            minimum_ambient_light: 0.0,
            floor_shadowing: FloorShadowing::empty(),
            draw_highlight_target: true,
            draw_texts: true,
            draw_names: true,
            static_text_interval_ms: 0,
            dynamic_text_interval_ms: DYNAMIC_TEXT_REFRESH_MS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("config describes an invalid view: {0}")]
    Geometry(#[from] GeometryError),
}

impl ViewConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let deserializer = &mut serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize(deserializer).map_err(|error| {
            let path = error.path().to_string();
            ConfigError::Parse {
                path,
                source: error.into_inner(),
            }
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&raw)?;
        info!(path = %path.display(), "view_config_loaded");
        Ok(config)
    }

    /// Pushes the settings into `view` and `map`. Stops at the first rejected
    /// geometry setting, which leaves the view's geometry as it was.
    pub fn apply(&self, view: &mut MapView, map: &mut Map) -> Result<(), ConfigError> {
        map.set_client_version(self.client_version);

        view.set_max_texture_size(self.max_texture_size);
        view.set_auto_view_mode(self.auto_view_mode)?;
        view.set_render_scale(self.render_scale)?;
        view.set_visible_dimension(self.visible_dimension)?;

        view.set_floor_shadowing(self.floor_shadowing);
        view.set_draw_highlight_target(self.draw_highlight_target);
        view.set_draw_texts(self.draw_texts);
        view.set_draw_names(self.draw_names);
        view.set_minimum_ambient_light(map, self.minimum_ambient_light);
        view.set_draw_lights(map, self.draw_lights);

        let cache = view.frame_cache_mut();
        *cache = FrameCache::new(self.static_text_interval_ms, self.dynamic_text_interval_ms);
        cache.update_all();
        Ok(())
    }
}
