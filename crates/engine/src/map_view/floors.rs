use tracing::debug;

use crate::geometry::{Position, AWARE_UNDERGROUND_FLOOR_RANGE, MAX_Z, SEA_FLOOR, UNDERGROUND_FLOOR};
use crate::light::FloorShadowing;
use crate::map::Map;
use crate::thing::Thing;

use super::{MapView, ViewEvent};

impl MapView {
    /// Rebuilds the per-floor lists of tiles to draw, if anything requested
    /// it. Returns false when there is no camera yet.
    pub fn update_visible_tiles_cache_if_needed(&mut self, map: &mut Map) -> bool {
        if !self.must_update_visible_tiles {
            return true;
        }
        self.update_visible_tiles_cache(map)
    }

    /// Rebuilds the per-floor lists of tiles to draw.
    ///
    /// Floors are scanned from the deepest visible to the highest, each in
    /// anti-diagonal order starting at the top-left cell of the draw area.
    /// That order is the paint order, so tiles to the south-east always land
    /// after the tiles they overlap.
    pub fn update_visible_tiles_cache(&mut self, map: &mut Map) -> bool {
        let Some(camera) = self.camera_position(map) else {
            return false;
        };

        if self.last_camera_position != Some(camera) {
            self.on_camera_position_change(map, camera);
        }

        let first = self.calc_first_visible_floor(map);
        let last = self.calc_last_visible_floor(map).max(first);

        self.last_camera_position = Some(camera);
        self.cached_first_visible_floor = first;
        self.cached_last_visible_floor = last;

        for floor in self.floor_min..=self.floor_max {
            self.cached_visible_tiles[usize::from(floor)].clear();
        }
        self.floor_min = camera.z;
        self.floor_max = camera.z;

        let collect_creatures = self.must_update_visible_creatures;
        if collect_creatures {
            self.visible_creatures.clear();
        }
        let upside = self.floor_shadowing.contains(FloorShadowing::UPSIDE);

        let draw = self.draw_dimension;
        let center = self.virtual_center_offset;
        let diagonals = draw.width + draw.height - 1;

        for z in (first..=last).rev() {
            let mut tiles = Vec::new();

            for diagonal in 0..diagonals {
                let advance = (diagonal - (draw.height - 1)).max(0);
                let mut ix = advance;
                let mut iy = diagonal - advance;
                while iy >= 0 && ix < draw.width {
                    let on_camera_floor = camera.translated(ix - center.x, iy - center.y);
                    iy -= 1;
                    ix += 1;

                    let Some(pos) = peel_to_floor(on_camera_floor, camera.z, z) else {
                        continue;
                    };
                    let Some(tile) = map.tile(pos) else {
                        continue;
                    };
                    if !tile.is_drawable() {
                        continue;
                    }

                    if collect_creatures && self.is_in_range(camera, pos, false) {
                        let creatures = tile.creatures().rev().map(Thing::id);
                        self.visible_creatures.extend(creatures);
                    }
                    let has_light = tile.has_light();

                    if map.refresh_cover(pos, first) && !has_light {
                        continue;
                    }

                    tiles.push(pos);
                    map.on_add_visible_tile(pos, camera.z, upside);
                }
            }

            if !tiles.is_empty() {
                self.floor_min = self.floor_min.min(z);
                self.floor_max = self.floor_max.max(z);
            }
            self.cached_visible_tiles[usize::from(z)] = tiles;
        }

        self.must_update_visible_tiles = false;
        self.must_update_visible_creatures = false;

        debug!(
            camera = %camera,
            first_floor = first,
            last_floor = last,
            tiles = self.visible_tile_count(),
            creatures = self.visible_creatures.len(),
            "visible_tiles_rebuilt"
        );
        true
    }

    fn on_camera_position_change(&mut self, map: &Map, camera: Position) {
        let previous = self.last_camera_position;
        if let Some(last) = previous {
            self.reanchor_mouse(camera, last);
        }

        self.events.push(ViewEvent::PositionChanged {
            position: camera,
            previous,
        });

        let previous_floor = previous.map(|last| last.z);
        if previous_floor != Some(camera.z) {
            self.events.push(ViewEvent::FloorChanged {
                floor: camera.z,
                previous: previous_floor,
            });
            self.update_light(map);
        }
    }

    /// Highest floor to draw.
    ///
    /// Looks up from the camera and from the four orthogonal neighbors that
    /// can be seen through for the lowest floor that blocks the view, both
    /// straight above and along the isometric peel.
    pub fn calc_first_visible_floor(&self, map: &Map) -> u8 {
        let z = if let Some(locked) = self.locked_first_visible_floor {
            locked
        } else if let Some(camera) = self.camera_position(map) {
            if self.multifloor {
                first_unblocked_floor(map, camera)
            } else {
                camera.z
            }
        } else {
            SEA_FLOOR
        };
        z.min(MAX_Z)
    }

    /// Lowest floor to draw.
    pub fn calc_last_visible_floor(&self, map: &Map) -> u8 {
        if !self.multifloor {
            return self.calc_first_visible_floor(map);
        }

        let mut z = match self.camera_position(map) {
            Some(camera) if camera.z > SEA_FLOOR => camera.z + AWARE_UNDERGROUND_FLOOR_RANGE,
            _ => SEA_FLOOR,
        };
        if let Some(locked) = self.locked_first_visible_floor {
            z = z.max(locked);
        }
        z.min(MAX_Z)
    }
}

fn first_unblocked_floor(map: &Map, camera: Position) -> u8 {
    let mut first = if camera.z > SEA_FLOOR {
        camera
            .z
            .saturating_sub(AWARE_UNDERGROUND_FLOOR_RANGE)
            .max(UNDERGROUND_FLOOR)
    } else {
        0
    };

    for ix in -1..=1_i32 {
        for iy in -1..=1_i32 {
            if first >= camera.z {
                return first;
            }

            let pos = camera.translated(ix, iy);
            let look_possible = map.is_look_possible(pos);
            let center = ix == 0 && iy == 0;
            if !center && (ix.abs() == iy.abs() || !look_possible) {
                continue;
            }

            let mut upper = pos;
            let mut covered = pos;
            loop {
                let (Some(next_covered), Some(next_upper)) = (covered.covered_up(1), upper.up())
                else {
                    break;
                };
                covered = next_covered;
                upper = next_upper;
                if upper.z < first {
                    break;
                }

                if map
                    .tile(upper)
                    .is_some_and(|tile| tile.limits_floors_view(!look_possible))
                {
                    first = upper.z + 1;
                    break;
                }
                if map
                    .tile(covered)
                    .is_some_and(|tile| tile.limits_floors_view(look_possible))
                {
                    first = covered.z + 1;
                    break;
                }
            }
        }
    }
    first
}

/// Position on `floor` drawn at the same screen cell as `pos` on the camera
/// floor.
fn peel_to_floor(pos: Position, camera_z: u8, floor: u8) -> Option<Position> {
    if floor <= camera_z {
        pos.covered_up(camera_z - floor)
    } else {
        pos.covered_down(floor - camera_z)
    }
}
