mod floors;
mod geometry;

use tracing::{debug, trace};

use crate::frame_cache::{FrameCache, FrameLayer};
use crate::geometry::{AwareRange, Point, Position, Size, FLOOR_COUNT, TILE_PIXELS};
use crate::light::{ambient_light, floor_shadow_color, Color, FloorShadowing, Light};
use crate::map::{Map, DEFAULT_AWARE_RANGE};
use crate::thing::ThingId;

pub use geometry::{
    GeometryError, ViewMode, DRAW_MARGIN, FAR_VIEW_AREA, MID_VIEW_AREA, MIN_VISIBLE_DIMENSION,
    NEAR_VIEW_AREA,
};

pub const DEFAULT_VISIBLE_DIMENSION: Size = Size::new(15, 11);
pub const DEFAULT_MAX_TEXTURE_SIZE: i32 = 4096;

/// Camera notifications for the host, drained once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEvent {
    PositionChanged {
        position: Position,
        previous: Option<Position>,
    },
    FloorChanged {
        floor: u8,
        previous: Option<u8>,
    },
}

/// Tile whose highlight must be switched off and tile to highlight next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HoverChange {
    pub previous: Option<Position>,
    pub next: Option<Position>,
}

/// Visibility cache and camera over a [`Map`].
///
/// The view stores positions, not tiles: every query takes the map it is
/// looking at, so the map stays the single owner of tile state.
#[derive(Debug)]
pub struct MapView {
    following: Option<ThingId>,
    custom_camera: Option<Position>,
    last_camera_position: Option<Position>,
    move_offset: Point,

    visible_dimension: Size,
    draw_dimension: Size,
    tile_size: i32,
    scale_factor: f32,
    render_scale: u8,
    max_texture_size: i32,
    virtual_center_offset: Point,
    visible_center_offset: Point,
    view_mode: ViewMode,
    auto_view_mode: bool,
    multifloor: bool,

    base_aware_range: AwareRange,
    aware_range: AwareRange,
    viewport: AwareRange,
    viewport_direction: [AwareRange; 9],

    locked_first_visible_floor: Option<u8>,
    cached_first_visible_floor: u8,
    cached_last_visible_floor: u8,
    cached_visible_tiles: [Vec<Position>; FLOOR_COUNT],
    floor_min: u8,
    floor_max: u8,
    must_update_visible_tiles: bool,
    must_update_visible_creatures: bool,
    visible_creatures: Vec<ThingId>,

    mouse_position: Option<Position>,
    highlighted_tile: Option<Position>,
    hover_change: Option<HoverChange>,

    frame_cache: FrameCache,
    draw_lights: bool,
    minimum_ambient_light: f32,
    global_light: Light,
    floor_shadowing: FloorShadowing,
    last_floor_shadow_color: Color,
    draw_highlight_target: bool,
    draw_texts: bool,
    draw_names: bool,

    events: Vec<ViewEvent>,
}

impl Default for MapView {
    fn default() -> Self {
        Self::new(DEFAULT_AWARE_RANGE)
    }
}

impl MapView {
    pub fn new(map_aware_range: AwareRange) -> Self {
        let mut view = Self {
            following: None,
            custom_camera: None,
            last_camera_position: None,
            move_offset: Point::default(),
            visible_dimension: Size::default(),
            draw_dimension: Size::default(),
            tile_size: TILE_PIXELS,
            scale_factor: 1.0,
            render_scale: 100,
            max_texture_size: DEFAULT_MAX_TEXTURE_SIZE,
            virtual_center_offset: Point::default(),
            visible_center_offset: Point::default(),
            view_mode: ViewMode::Near,
            auto_view_mode: true,
            multifloor: true,
            base_aware_range: map_aware_range,
            aware_range: map_aware_range,
            viewport: map_aware_range,
            viewport_direction: [map_aware_range; 9],
            locked_first_visible_floor: None,
            cached_first_visible_floor: 0,
            cached_last_visible_floor: 0,
            cached_visible_tiles: std::array::from_fn(|_| Vec::new()),
            floor_min: 0,
            floor_max: 0,
            must_update_visible_tiles: true,
            must_update_visible_creatures: true,
            visible_creatures: Vec::new(),
            mouse_position: None,
            highlighted_tile: None,
            hover_change: None,
            frame_cache: FrameCache::default(),
            draw_lights: false,
            minimum_ambient_light: 0.0,
            global_light: Light::default(),
            floor_shadowing: FloorShadowing::empty(),
            last_floor_shadow_color: Color::WHITE,
            draw_highlight_target: true,
            draw_texts: true,
            draw_names: true,
            events: Vec::new(),
        };
        // 15x11 at 100% always fits the default texture size.
        let _ = view.update_geometry(DEFAULT_VISIBLE_DIMENSION);
        view
    }

    pub fn set_map_aware_range(&mut self, range: AwareRange) -> Result<(), GeometryError> {
        self.base_aware_range = range;
        self.update_geometry(self.visible_dimension)
    }

    /// Current camera: the followed creature's logical position, or the
    /// fixed position. `None` until something is known.
    pub fn camera_position(&self, map: &Map) -> Option<Position> {
        match self.following {
            Some(id) => map.creature_position(id),
            None => self.custom_camera,
        }
        .filter(|position| position.is_valid())
    }

    pub fn set_camera_position(&mut self, position: Position) {
        self.following = None;
        self.custom_camera = Some(position);
        self.request_visible_tiles_cache_update();
    }

    pub fn follow_creature(&mut self, id: ThingId) {
        self.following = Some(id);
        self.last_camera_position = None;
        self.request_visible_tiles_cache_update();
    }

    pub fn followed_creature(&self) -> Option<ThingId> {
        self.following
    }

    pub fn is_following_creature(&self) -> bool {
        self.followed_creature().is_some()
    }

    pub(crate) fn following_walk_offset(&self, map: &Map) -> Option<Point> {
        let id = self.followed_creature()?;
        let walk = map.creature(id)?.as_creature()?.walk?;
        Some(walk.offset_from(walk.to))
    }

    /// Pans the fixed camera by pixels; whole tiles move the camera position.
    pub fn move_by(&mut self, map: &Map, dx: i32, dy: i32) {
        self.move_offset.x += dx;
        self.move_offset.y += dy;

        let mut moved = false;
        let tiles_x = self.move_offset.x / TILE_PIXELS;
        let tiles_y = self.move_offset.y / TILE_PIXELS;
        if let Some(custom) = self.custom_camera.as_mut() {
            if tiles_x != 0 {
                custom.x += tiles_x;
                moved = true;
            }
            if tiles_y != 0 {
                custom.y += tiles_y;
                moved = true;
            }
        }
        self.move_offset.x %= TILE_PIXELS;
        self.move_offset.y %= TILE_PIXELS;

        if moved {
            self.request_visible_tiles_cache_update();
            self.on_camera_move(map);
        }
    }

    pub fn move_offset(&self) -> Point {
        self.move_offset
    }

    /// Invalidates the layers a camera move affects and picks the culling
    /// viewport for the followed creature's motion.
    pub fn on_camera_move(&mut self, map: &Map) {
        for layer in [FrameLayer::Tile, FrameLayer::StaticText, FrameLayer::DynamicText] {
            self.frame_cache.update(layer);
        }
        if self.draw_lights {
            self.frame_cache.update(FrameLayer::Light);
        }

        let Some(id) = self.followed_creature() else {
            return;
        };
        let walking = map
            .creature(id)
            .and_then(|thing| thing.as_creature())
            .and_then(|creature| creature.walk.map(|walk| walk.direction));
        match walking {
            Some(direction) => self.select_viewport(Some(direction)),
            None => {
                self.select_viewport(None);
                self.must_update_visible_creatures = true;
            }
        }
    }

    pub fn request_visible_tiles_cache_update(&mut self) {
        self.must_update_visible_tiles = true;
        self.frame_cache.update(FrameLayer::Tile);
    }

    pub fn request_visible_creatures_update(&mut self) {
        self.must_update_visible_creatures = true;
    }

    pub fn needs_visible_tiles_update(&self) -> bool {
        self.must_update_visible_tiles
    }

    /// `creature` is set when a creature entered, left or crossed the tile.
    pub fn on_tile_update(&mut self, pos: Position, creature: bool) {
        trace!(position = %pos, creature, "view_tile_updated");
        self.request_visible_tiles_cache_update();
        if creature {
            self.request_visible_creatures_update();
        }
        if self.draw_lights {
            self.frame_cache.update(FrameLayer::Light);
        }
    }

    pub fn on_map_center_change(&mut self) {
        self.request_visible_tiles_cache_update();
    }

    pub fn take_events(&mut self) -> Vec<ViewEvent> {
        std::mem::take(&mut self.events)
    }

    /// Moves the hover to `position` (or clears it) and records which tile
    /// highlights must change. The caller applies the change to the map.
    pub fn on_mouse_move(&mut self, position: Option<Position>) {
        self.mouse_position = position;
        let previous = self.highlighted_tile.take();
        let next = if self.draw_highlight_target {
            position
        } else {
            None
        };
        self.highlighted_tile = next;

        let pending = self.hover_change.get_or_insert(HoverChange {
            previous,
            next: None,
        });
        pending.next = next;
        self.frame_cache.update(FrameLayer::Tile);
    }

    pub fn mouse_position(&self) -> Option<Position> {
        self.mouse_position
    }

    pub fn highlighted_tile(&self) -> Option<Position> {
        self.highlighted_tile
    }

    pub fn take_hover_change(&mut self) -> Option<HoverChange> {
        self.hover_change.take()
    }

    fn reanchor_mouse(&mut self, camera: Position, last: Position) {
        let Some(mouse) = self.mouse_position else {
            return;
        };
        let moved = if camera.z == last.z {
            mouse.translated(camera.x - last.x, camera.y - last.y)
        } else {
            let z = i32::from(mouse.z) + i32::from(camera.z) - i32::from(last.z);
            match u8::try_from(z) {
                Ok(z) => Position::new(mouse.x, mouse.y, z),
                Err(_) => mouse,
            }
        };
        let moved = moved.is_valid().then_some(moved);
        trace!(?moved, "mouse_reanchored");
        self.on_mouse_move(moved);
    }

    pub fn lock_first_visible_floor(&mut self, floor: u8) {
        self.locked_first_visible_floor = Some(floor);
        self.request_visible_tiles_cache_update();
    }

    pub fn unlock_first_visible_floor(&mut self) {
        self.locked_first_visible_floor = None;
        self.request_visible_tiles_cache_update();
    }

    pub fn locked_first_visible_floor(&self) -> Option<u8> {
        self.locked_first_visible_floor
    }

    pub fn cached_first_visible_floor(&self) -> u8 {
        self.cached_first_visible_floor
    }

    pub fn cached_last_visible_floor(&self) -> u8 {
        self.cached_last_visible_floor
    }

    pub fn floor_range(&self) -> (u8, u8) {
        (self.floor_min, self.floor_max)
    }

    pub fn visible_tiles(&self, floor: u8) -> &[Position] {
        self.cached_visible_tiles
            .get(usize::from(floor))
            .map_or(&[], Vec::as_slice)
    }

    pub fn visible_tile_count(&self) -> usize {
        self.cached_visible_tiles.iter().map(Vec::len).sum()
    }

    pub fn visible_creatures(&self) -> &[ThingId] {
        &self.visible_creatures
    }

    pub fn add_visible_creature(&mut self, map: &Map, id: ThingId) {
        let Some(thing) = map.creature(id) else {
            return;
        };
        let Some(camera) = self.camera_position(map) else {
            return;
        };
        let in_range = thing
            .position()
            .is_some_and(|pos| self.is_in_range(camera, pos, false));
        if thing.is_local_player() || !in_range || self.visible_creatures.contains(&id) {
            return;
        }
        self.visible_creatures.push(id);
        self.frame_cache.update(FrameLayer::CreatureInformation);
    }

    pub fn remove_visible_creature(&mut self, id: ThingId) {
        if let Some(index) = self.visible_creatures.iter().position(|other| *other == id) {
            self.visible_creatures.remove(index);
            self.frame_cache.update(FrameLayer::CreatureInformation);
        }
    }

    /// Creatures within the culling range around `center`.
    pub fn sight_spectators(&self, map: &Map, center: Position, multi_floor: bool) -> Vec<ThingId> {
        let aware = self.aware_range;
        map.spectators_in_range(
            center,
            multi_floor,
            aware.left - 1,
            aware.right - 2,
            aware.top - 1,
            aware.bottom - 2,
        )
    }

    /// Creatures within the full aware range around `center`.
    pub fn spectators(&self, map: &Map, center: Position, multi_floor: bool) -> Vec<ThingId> {
        let aware = self.aware_range;
        map.spectators_in_range(
            center,
            multi_floor,
            aware.left,
            aware.right,
            aware.top,
            aware.bottom,
        )
    }

    pub fn frame_cache(&self) -> &FrameCache {
        &self.frame_cache
    }

    pub fn frame_cache_mut(&mut self) -> &mut FrameCache {
        &mut self.frame_cache
    }

    pub fn draw_lights(&self) -> bool {
        self.draw_lights
    }

    pub fn set_draw_lights(&mut self, map: &Map, enable: bool) {
        if enable == self.draw_lights {
            return;
        }
        self.draw_lights = enable;
        self.update_light(map);
    }

    pub fn set_minimum_ambient_light(&mut self, map: &Map, level: f32) {
        self.minimum_ambient_light = level.clamp(0.0, 1.0);
        self.update_light(map);
    }

    pub fn minimum_ambient_light(&self) -> f32 {
        self.minimum_ambient_light
    }

    /// Ambient light of the light layer, or `None` while lights are off.
    pub fn global_light(&self) -> Option<Light> {
        self.draw_lights.then_some(self.global_light)
    }

    pub fn update_light(&mut self, map: &Map) {
        if !self.draw_lights {
            return;
        }
        let Some(camera) = self.camera_position(map) else {
            return;
        };
        self.global_light = ambient_light(map.light(), camera.z, self.minimum_ambient_light);
        self.frame_cache.update(FrameLayer::Light);
        debug!(
            intensity = self.global_light.intensity,
            color = self.global_light.color,
            floor = camera.z,
            "view_light_updated"
        );
    }

    pub fn on_global_light_change(&mut self, map: &Map) {
        self.update_light(map);
    }

    pub fn floor_shadowing(&self) -> FloorShadowing {
        self.floor_shadowing
    }

    pub fn set_floor_shadowing(&mut self, shadowing: FloorShadowing) {
        self.floor_shadowing = shadowing;
        self.frame_cache.update(FrameLayer::Tile);
    }

    /// Tint for `floor` at the start of its draw pass.
    pub fn on_floor_drawing_start(&mut self, floor: u8, camera: Position) -> Color {
        if self.floor_shadowing.is_empty() {
            return Color::WHITE;
        }
        let color = floor_shadow_color(floor, camera.z, self.floor_shadowing, self.global_light());
        self.last_floor_shadow_color = color;
        color
    }

    pub fn last_floor_shadow_color(&self) -> Color {
        self.last_floor_shadow_color
    }

    pub fn draw_highlight_target(&self) -> bool {
        self.draw_highlight_target
    }

    pub fn set_draw_highlight_target(&mut self, enable: bool) {
        self.draw_highlight_target = enable;
        if !enable && self.highlighted_tile.is_some() {
            self.on_mouse_move(self.mouse_position);
        }
    }

    pub fn draw_texts(&self) -> bool {
        self.draw_texts
    }

    pub fn set_draw_texts(&mut self, enable: bool) {
        self.draw_texts = enable;
    }

    pub fn draw_names(&self) -> bool {
        self.draw_names
    }

    pub fn set_draw_names(&mut self, enable: bool) {
        self.draw_names = enable;
        self.frame_cache.update(FrameLayer::CreatureInformation);
    }
}

#[cfg(test)]
mod tests;
