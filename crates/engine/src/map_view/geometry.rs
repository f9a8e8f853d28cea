use thiserror::Error;
use tracing::{debug, error};

use crate::geometry::{AwareRange, Direction, Point, Position, Rect, Size, TILE_PIXELS};
use crate::map::Map;
use crate::tile::Tile;

use super::MapView;

pub const NEAR_VIEW_AREA: i32 = 32 * 32;
pub const MID_VIEW_AREA: i32 = 64 * 64;
pub const FAR_VIEW_AREA: i32 = 128 * 128;
pub const MIN_VISIBLE_DIMENSION: i32 = 3;
/// Tiles drawn beyond the visible dimension: one leading, two trailing.
pub const DRAW_MARGIN: i32 = 3;

/// Slot of the "not walking" viewport in the direction cache.
const IDLE_VIEWPORT: usize = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("visible dimension must be odd, got {width}x{height}")]
    EvenDimension { width: i32, height: i32 },
    #[error("visible dimension {width}x{height} is below the 3x3 minimum")]
    DimensionTooSmall { width: i32, height: i32 },
    #[error("buffer of {width}x{height} px exceeds the max texture size {max}")]
    ExceedsMaxTextureSize { width: i32, height: i32, max: i32 },
}

/// Zoom tier, from closest to farthest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ViewMode {
    #[default]
    Near,
    Mid,
    Far,
    Huge,
}

impl ViewMode {
    pub fn for_geometry(tile_size: i32, visible: Size) -> Self {
        let area = visible.area();
        if tile_size >= TILE_PIXELS && area <= NEAR_VIEW_AREA {
            ViewMode::Near
        } else if tile_size >= 16 && area <= MID_VIEW_AREA {
            ViewMode::Mid
        } else if tile_size >= 8 && area <= FAR_VIEW_AREA {
            ViewMode::Far
        } else {
            ViewMode::Huge
        }
    }
}

fn viewport_slot(direction: Option<Direction>) -> usize {
    match direction {
        Some(Direction::North) => 0,
        Some(Direction::East) => 1,
        Some(Direction::South) => 2,
        Some(Direction::West) => 3,
        Some(Direction::NorthEast) => 4,
        Some(Direction::SouthEast) => 5,
        Some(Direction::SouthWest) => 6,
        Some(Direction::NorthWest) => 7,
        None => IDLE_VIEWPORT,
    }
}

/// Culling window for a camera moving in `direction`, or standing still.
pub(super) fn viewport_for(aware: AwareRange, direction: Option<Direction>) -> AwareRange {
    let mut vp = AwareRange::new(aware.right, aware.top, aware.right, aware.top);
    match direction {
        Some(Direction::North | Direction::South) => {
            vp.top += 1;
            vp.bottom += 1;
        }
        Some(Direction::East | Direction::West) => {
            vp.left += 1;
            vp.right += 1;
        }
        Some(_) => {
            vp.left += 1;
            vp.right += 1;
            vp.top += 1;
            vp.bottom += 1;
        }
        None => {
            vp.left -= 1;
            vp.right -= 1;
        }
    }
    vp
}

impl MapView {
    /// Changes how many tiles are shown. Even or too small dimensions are
    /// rejected and the current geometry stays in place.
    pub fn set_visible_dimension(&mut self, visible: Size) -> Result<(), GeometryError> {
        if visible == self.visible_dimension {
            return Ok(());
        }

        if visible.width % 2 != 1 || visible.height % 2 != 1 {
            let err = GeometryError::EvenDimension {
                width: visible.width,
                height: visible.height,
            };
            error!(error = %err, "visible_dimension_rejected");
            return Err(err);
        }

        if visible.width < MIN_VISIBLE_DIMENSION || visible.height < MIN_VISIBLE_DIMENSION {
            let err = GeometryError::DimensionTooSmall {
                width: visible.width,
                height: visible.height,
            };
            error!(error = %err, "visible_dimension_rejected");
            return Err(err);
        }

        self.update_geometry(visible)
    }

    pub fn set_render_scale(&mut self, percent: u8) -> Result<(), GeometryError> {
        let previous = self.render_scale;
        self.render_scale = percent.max(1);
        let result = self.update_geometry(self.visible_dimension);
        if result.is_err() {
            self.render_scale = previous;
        }
        result
    }

    pub fn set_auto_view_mode(&mut self, enable: bool) -> Result<(), GeometryError> {
        self.auto_view_mode = enable;
        if enable {
            return self.update_geometry(self.visible_dimension);
        }
        Ok(())
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode = mode;
        self.request_visible_tiles_cache_update();
    }

    pub fn set_max_texture_size(&mut self, max: i32) {
        self.max_texture_size = max;
    }

    /// Recomputes tile size, draw dimension, view tier and aware range.
    pub fn update_geometry(&mut self, visible: Size) -> Result<(), GeometryError> {
        let tile_size = (TILE_PIXELS as f32 * f32::from(self.render_scale) / 100.0) as i32;
        let draw = Size::new(visible.width + DRAW_MARGIN, visible.height + DRAW_MARGIN);
        let buffer = draw.scaled(tile_size);

        if buffer.width > self.max_texture_size || buffer.height > self.max_texture_size {
            let err = GeometryError::ExceedsMaxTextureSize {
                width: buffer.width,
                height: buffer.height,
                max: self.max_texture_size,
            };
            error!(error = %err, "geometry_rejected");
            return Err(err);
        }

        let center = Point::new(draw.width / 2 - 1, draw.height / 2 - 1);
        if self.auto_view_mode {
            self.view_mode = ViewMode::for_geometry(tile_size, visible);
            self.multifloor = self.view_mode < ViewMode::Far;
        }

        self.visible_dimension = visible;
        self.draw_dimension = draw;
        self.tile_size = tile_size.max(1);
        self.virtual_center_offset = center;
        self.visible_center_offset = center;
        self.scale_factor = self.tile_size as f32 / TILE_PIXELS as f32;

        let base = self.base_aware_range;
        let left = base.left.min(draw.width / 2 - 1);
        let top = base.top.min(draw.height / 2 - 1);
        self.aware_range = AwareRange::new(left, top, left + 1, top + 1);

        self.update_viewport_direction_cache();
        self.request_visible_tiles_cache_update();
        self.frame_cache.update_all();

        debug!(
            visible = ?visible,
            draw = ?draw,
            tile_size = self.tile_size,
            view_mode = ?self.view_mode,
            multifloor = self.multifloor,
            "view_geometry_updated"
        );
        Ok(())
    }

    fn update_viewport_direction_cache(&mut self) {
        let aware = self.aware_range;
        for direction in Direction::ALL {
            self.viewport_direction[viewport_slot(Some(direction))] =
                viewport_for(aware, Some(direction));
        }
        self.viewport_direction[IDLE_VIEWPORT] = viewport_for(aware, None);
        self.viewport = self.viewport_direction[IDLE_VIEWPORT];
    }

    pub(super) fn select_viewport(&mut self, direction: Option<Direction>) {
        self.viewport = self.viewport_direction[viewport_slot(direction)];
    }

    /// Top-left pixel of `position` in the offscreen tile buffer, as seen
    /// from `relative`.
    pub fn transform_position_to_2d(&self, position: Position, relative: Position) -> Point {
        let dz = i32::from(relative.z) - i32::from(position.z);
        Point::new(
            (self.virtual_center_offset.x + (position.x - relative.x) - dz) * self.tile_size,
            (self.virtual_center_offset.y + (position.y - relative.y) - dz) * self.tile_size,
        )
    }

    /// Region of the tile buffer shown in a widget of `dest` pixels,
    /// following walk or pan offsets.
    pub fn calc_framebuffer_source(&self, dest: Size, map: &Map) -> Rect {
        let margin = Size::new(
            self.draw_dimension.width - self.visible_dimension.width - 1,
            self.draw_dimension.height - self.visible_dimension.height - 1,
        );
        let mut offset = Point::new(
            (margin.width / 2) * self.tile_size,
            (margin.height / 2) * self.tile_size,
        );
        if let Some(walk) = self.following_walk_offset(map) {
            offset = offset + walk.scaled(self.scale_factor);
        } else if self.move_offset != Point::default() {
            offset = offset + self.move_offset.scaled(self.scale_factor);
        }

        let visible_px = self.visible_dimension.scaled(self.tile_size);
        let src = if dest.width <= 0 || dest.height <= 0 {
            visible_px
        } else {
            let factor = (visible_px.width as f32 / dest.width as f32)
                .min(visible_px.height as f32 / dest.height as f32);
            Size::new(
                (dest.width as f32 * factor) as i32,
                (dest.height as f32 * factor) as i32,
            )
        };
        offset.x += (visible_px.width - src.width) / 2;
        offset.y += (visible_px.height - src.height) / 2;
        Rect::new(offset, src)
    }

    /// Map position under widget pixel `point`, on the camera floor.
    pub fn position_at_point(&self, point: Point, map_size: Size, map: &Map) -> Option<Position> {
        let camera = self.camera_position(map)?;
        if map_size.width <= 0 || map_size.height <= 0 {
            return None;
        }

        let src = self.calc_framebuffer_source(map_size, map);
        let sh = src.size.width as f32 / map_size.width as f32;
        let sv = src.size.height as f32 / map_size.height as f32;
        let buffer = Point::new((point.x as f32 * sh) as i32, (point.y as f32 * sv) as i32);
        let in_buffer = buffer + src.origin;
        let cell = Point::new(
            in_buffer.x.div_euclid(self.tile_size),
            in_buffer.y.div_euclid(self.tile_size),
        );

        let tile = Point::new(
            self.visible_center_offset.x - self.draw_dimension.width + cell.x + 2,
            self.visible_center_offset.y - self.draw_dimension.height + cell.y + 2,
        );
        let position = camera.translated(tile.x, tile.y);
        position.is_valid().then_some(position)
    }

    /// Whether a cached tile still has to be painted with the current
    /// viewport. Covered tiles only pass while their light is drawn.
    pub fn can_render_tile(&self, tile: &Tile, camera: Position, drawing_light: bool) -> bool {
        let vp = self.viewport;
        let pos = tile.position();
        let dz = i32::from(pos.z) - i32::from(camera.z);
        let check = pos.translated(dz, dz);
        let dx = check.x - camera.x;
        let dy = check.y - camera.y;

        if -dx >= vp.left
            || (dx == vp.right && !tile.has_wide_things() && !tile.has_displacement())
        {
            return false;
        }
        if -dy >= vp.top
            || (dy == vp.bottom && !tile.has_tall_things() && !tile.has_displacement())
        {
            return false;
        }
        if (dx > vp.right && !(tile.has_wide_things() && tile.has_displacement()))
            || dy > vp.bottom
        {
            return false;
        }

        !tile.is_completely_covered() || (drawing_light && tile.has_light())
    }

    pub fn is_in_range(&self, camera: Position, pos: Position, ignore_z: bool) -> bool {
        let aware = self.aware_range;
        camera.is_in_range(
            pos,
            aware.left - 1,
            aware.right - 2,
            aware.top - 1,
            aware.bottom - 2,
            ignore_z,
        )
    }

    pub fn visible_dimension(&self) -> Size {
        self.visible_dimension
    }

    pub fn draw_dimension(&self) -> Size {
        self.draw_dimension
    }

    pub fn tile_size(&self) -> i32 {
        self.tile_size
    }

    pub fn scale_factor(&self) -> f32 {
        self.scale_factor
    }

    pub fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub fn is_multifloor(&self) -> bool {
        self.multifloor
    }

    pub fn set_multifloor(&mut self, enable: bool) {
        self.multifloor = enable;
        self.request_visible_tiles_cache_update();
    }

    pub fn aware_range(&self) -> AwareRange {
        self.aware_range
    }

    pub fn viewport(&self) -> AwareRange {
        self.viewport
    }

    pub fn virtual_center_offset(&self) -> Point {
        self.virtual_center_offset
    }
}
