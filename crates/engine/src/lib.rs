pub mod app;
pub mod config;
pub mod frame_cache;
pub mod geometry;
pub mod light;
pub mod map;
pub mod map_view;
pub mod render;
pub mod scheduler;
pub mod thing;
pub mod thing_type;
pub mod tile;
pub mod world;

pub use app::{
    run_headless, run_headless_with_metrics, AppError, LoopConfig, LoopMetricsSnapshot,
    LoopSummary, MetricsHandle, Session, SessionCommand, SessionError, FRAME_MS_ENV_VAR,
};
pub use config::{ConfigError, ViewConfig, DEFAULT_CLIENT_VERSION};
pub use frame_cache::{FrameCache, FrameLayer};
pub use geometry::{AwareRange, Direction, Point, Position, Rect, Size};
pub use light::{Color, FloorShadowing, Light};
pub use map::{Map, MapText, TileUpdate};
pub use map_view::{GeometryError, HoverChange, MapView, ViewEvent, ViewMode};
pub use render::{
    draw_map_view, paint_tile, CreatureInformation, DrawLayer, DrawStats, MapRenderer, TextDraw,
    ThingDraw, TileDraw,
};
pub use scheduler::{Scheduler, TimerHandle};
pub use thing::{Creature, Effect, Thing, ThingId, ThingIdAllocator, ThingKind, WalkState};
pub use thing_type::{
    ThingCategory, ThingFlags, ThingType, ThingTypeCatalog, ThingTypeDef, ThingTypeError,
};
pub use tile::{StackPos, Tile, TileStateFlags};
pub use world::{World, WorldTimer, WALK_RETRY_MS};
