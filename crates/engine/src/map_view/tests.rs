use std::sync::Arc;

use super::*;
use crate::frame_cache::FrameLayer;
use crate::geometry::SEA_FLOOR;
use crate::light::Light;
use crate::thing::{Creature, Thing, ThingId, ThingIdAllocator};
use crate::thing_type::{ThingCategory, ThingFlags, ThingType};
use crate::tile::StackPos;

const CAMERA: Position = Position::new(100, 100, 7);

struct Fixture {
    map: Map,
    view: MapView,
    ids: ThingIdAllocator,
}

impl Fixture {
    fn new() -> Self {
        let mut view = MapView::default();
        view.set_camera_position(CAMERA);
        Self {
            map: Map::new(860),
            view,
            ids: ThingIdAllocator::new(),
        }
    }

    fn put(&mut self, pos: Position, flags: ThingFlags) -> ThingId {
        let id = self.ids.allocate();
        let ty = Arc::new(ThingType::new(100, ThingCategory::Item).with_flags(flags));
        self.map.add_thing(pos, Thing::item(id, ty), StackPos::Auto, 0);
        id
    }

    fn put_lit(&mut self, pos: Position) -> ThingId {
        let id = self.ids.allocate();
        let ty = ThingType::new(101, ThingCategory::Item).with_light(Light::new(4, 206));
        self.map.add_thing(pos, Thing::item(id, Arc::new(ty)), StackPos::Auto, 0);
        id
    }

    fn ground(&mut self, pos: Position) -> ThingId {
        self.put(pos, ThingFlags::GROUND)
    }

    fn opaque_ground(&mut self, pos: Position) -> ThingId {
        self.put(pos, ThingFlags::GROUND | ThingFlags::FULL_GROUND | ThingFlags::OPAQUE)
    }

    fn creature(&mut self, pos: Position, creature: Creature) -> ThingId {
        let id = self.ids.allocate();
        let ty = Arc::new(ThingType::new(1, ThingCategory::Creature));
        self.map.add_thing(pos, Thing::creature(id, ty, creature), StackPos::Auto, 0);
        id
    }

    fn rebuild(&mut self) {
        assert!(self.view.update_visible_tiles_cache(&mut self.map));
    }
}

#[test]
fn even_dimension_is_rejected_and_geometry_kept() {
    let mut view = MapView::default();
    let before = (view.visible_dimension(), view.draw_dimension(), view.aware_range());

    let err = view.set_visible_dimension(Size::new(10, 10));

    assert_eq!(err, Err(GeometryError::EvenDimension { width: 10, height: 10 }));
    assert_eq!(
        (view.visible_dimension(), view.draw_dimension(), view.aware_range()),
        before
    );
}

#[test]
fn too_small_and_oversized_dimensions_are_rejected() {
    let mut view = MapView::default();
    assert!(matches!(
        view.set_visible_dimension(Size::new(1, 1)),
        Err(GeometryError::DimensionTooSmall { .. })
    ));

    view.set_max_texture_size(256);
    assert!(matches!(
        view.set_visible_dimension(Size::new(17, 13)),
        Err(GeometryError::ExceedsMaxTextureSize { max: 256, .. })
    ));
    assert_eq!(view.visible_dimension(), DEFAULT_VISIBLE_DIMENSION);
}

#[test]
fn geometry_derives_draw_area_and_aware_range() {
    let mut view = MapView::default();
    assert_eq!(view.draw_dimension(), Size::new(18, 14));
    assert_eq!(view.virtual_center_offset(), Point::new(8, 6));
    assert_eq!(view.aware_range(), AwareRange::new(8, 6, 9, 7));

    view.set_visible_dimension(Size::new(5, 5)).expect("odd dimension");
    assert_eq!(view.draw_dimension(), Size::new(8, 8));
    assert_eq!(view.aware_range(), AwareRange::new(3, 3, 4, 4));
}

#[test]
fn zooming_far_out_turns_off_multifloor() {
    let mut view = MapView::default();
    view.set_max_texture_size(16_384);
    view.set_render_scale(25).expect("fits");
    view.set_visible_dimension(Size::new(101, 101)).expect("fits");

    assert_eq!(view.view_mode(), ViewMode::Far);
    assert!(!view.is_multifloor());
}

#[test]
fn ground_above_camera_culls_higher_floors() {
    let mut fx = Fixture::new();
    let camera = Position::new(100, 100, 2);
    fx.view.set_camera_position(camera);
    fx.ground(camera);
    fx.opaque_ground(Position::new(100, 100, 1));
    fx.ground(Position::new(100, 100, 0));

    assert_eq!(fx.view.calc_first_visible_floor(&fx.map), 2);
    fx.rebuild();
    assert_eq!(fx.view.cached_first_visible_floor(), 2);
    assert!(fx.view.visible_tiles(1).is_empty());
    assert!(fx.view.cached_last_visible_floor() >= fx.view.cached_first_visible_floor());
}

#[test]
fn open_sky_shows_every_floor_down_to_sea_level() {
    let mut fx = Fixture::new();
    fx.ground(CAMERA);

    assert_eq!(fx.view.calc_first_visible_floor(&fx.map), 0);
    assert_eq!(fx.view.calc_last_visible_floor(&fx.map), SEA_FLOOR);
}

#[test]
fn underground_camera_sees_a_few_floors_each_way() {
    let mut fx = Fixture::new();
    fx.view.set_camera_position(Position::new(100, 100, 11));

    assert_eq!(fx.view.calc_first_visible_floor(&fx.map), 9);
    assert_eq!(fx.view.calc_last_visible_floor(&fx.map), 13);
}

#[test]
fn locked_floor_wins_and_last_floor_never_precedes_it() {
    let mut fx = Fixture::new();
    fx.view.lock_first_visible_floor(10);

    assert_eq!(fx.view.calc_first_visible_floor(&fx.map), 10);
    assert_eq!(fx.view.calc_last_visible_floor(&fx.map), 10);

    fx.view.unlock_first_visible_floor();
    assert_eq!(fx.view.locked_first_visible_floor(), None);
}

#[test]
fn wall_seen_through_window_only_limits_when_it_blocks_sight() {
    let mut fx = Fixture::new();
    fx.ground(CAMERA);
    let east = CAMERA.translated(1, 0);
    fx.ground(east);
    // Window frame one floor up along the peel from the east neighbor.
    let peel = east.covered_up(1).expect("floor 6");
    fx.put(peel, ThingFlags::ON_BOTTOM);

    assert_eq!(fx.view.calc_first_visible_floor(&fx.map), 0);

    fx.map.clean_tile(peel);
    fx.put(peel, ThingFlags::ON_BOTTOM | ThingFlags::BLOCK_PROJECTILE);
    assert_eq!(fx.view.calc_first_visible_floor(&fx.map), 7);
}

#[test]
fn tiles_are_cached_in_diagonal_order() {
    let mut fx = Fixture::new();
    fx.ground(CAMERA);
    fx.ground(CAMERA.translated(0, -1));
    fx.ground(CAMERA.translated(-1, 0));

    fx.rebuild();

    let order: Vec<Position> = fx.view.visible_tiles(7).to_vec();
    assert_eq!(
        order,
        vec![CAMERA.translated(-1, 0), CAMERA.translated(0, -1), CAMERA]
    );
}

#[test]
fn every_draw_cell_is_visited_once() {
    let mut fx = Fixture::new();
    let draw = fx.view.draw_dimension();
    let center = fx.view.virtual_center_offset();
    for ix in 0..draw.width {
        for iy in 0..draw.height {
            fx.ground(CAMERA.translated(ix - center.x, iy - center.y));
        }
    }

    fx.rebuild();

    let tiles = fx.view.visible_tiles(7);
    let mut unique = tiles.to_vec();
    unique.sort();
    unique.dedup();
    assert_eq!(tiles.len(), draw.area() as usize);
    assert_eq!(unique.len(), tiles.len());
    assert_eq!(fx.view.floor_range(), (7, 7));
}

#[test]
fn completely_covered_tile_is_skipped_unless_lit() {
    let mut fx = Fixture::new();
    fx.ground(CAMERA);
    let hidden = Position::new(105, 105, 7);
    fx.ground(hidden);
    for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
        fx.opaque_ground(Position::new(105 + dx, 105 + dy, 6));
    }

    fx.rebuild();
    assert!(!fx.view.visible_tiles(7).contains(&hidden));
    assert!(fx.map.tile(hidden).is_some_and(|tile| tile.is_completely_covered()));

    fx.put_lit(hidden);
    fx.view.request_visible_tiles_cache_update();
    fx.rebuild();
    assert!(fx.view.visible_tiles(7).contains(&hidden));
}

#[test]
fn rebuild_clears_floors_that_went_out_of_range() {
    let mut fx = Fixture::new();
    fx.ground(CAMERA);
    let below = Position::new(99, 99, 8);
    fx.ground(below);
    fx.view.set_camera_position(Position::new(100, 100, 9));
    fx.ground(Position::new(100, 100, 9));
    fx.rebuild();
    assert_eq!(fx.view.visible_tiles(8), &[below]);

    fx.view.set_camera_position(CAMERA);
    fx.rebuild();
    assert!(fx.view.visible_tiles(8).is_empty());
    assert!(fx.view.visible_tiles(9).is_empty());
}

#[test]
fn no_camera_means_nothing_to_rebuild() {
    let mut map = Map::new(860);
    let mut view = MapView::default();
    assert!(!view.update_visible_tiles_cache(&mut map));
    assert!(view.needs_visible_tiles_update());
}

#[test]
fn camera_move_emits_events_and_reanchors_hover() {
    let mut fx = Fixture::new();
    fx.ground(CAMERA);
    fx.rebuild();
    assert_eq!(
        fx.view.take_events(),
        vec![
            ViewEvent::PositionChanged {
                position: CAMERA,
                previous: None
            },
            ViewEvent::FloorChanged {
                floor: 7,
                previous: None
            },
        ]
    );

    let hovered = CAMERA.translated(2, 1);
    fx.view.on_mouse_move(Some(hovered));
    assert_eq!(
        fx.view.take_hover_change(),
        Some(HoverChange {
            previous: None,
            next: Some(hovered)
        })
    );

    let moved = CAMERA.translated(1, 0);
    fx.view.set_camera_position(moved);
    fx.rebuild();

    assert_eq!(
        fx.view.take_events(),
        vec![ViewEvent::PositionChanged {
            position: moved,
            previous: Some(CAMERA)
        }]
    );
    assert_eq!(fx.view.mouse_position(), Some(hovered.translated(1, 0)));
    assert_eq!(
        fx.view.take_hover_change(),
        Some(HoverChange {
            previous: Some(hovered),
            next: Some(hovered.translated(1, 0))
        })
    );
}

#[test]
fn visible_creatures_are_collected_in_range() {
    let mut fx = Fixture::new();
    fx.ground(CAMERA);
    let near = fx.creature(CAMERA.translated(2, 2), Creature::new("rat"));
    let far = fx.creature(CAMERA.translated(8, 0), Creature::new("wolf"));

    fx.rebuild();

    assert_eq!(fx.view.visible_creatures(), &[near]);
    fx.view.remove_visible_creature(near);
    assert!(fx.view.visible_creatures().is_empty());
    fx.view.add_visible_creature(&fx.map, far);
    assert!(fx.view.visible_creatures().is_empty());
    fx.view.add_visible_creature(&fx.map, near);
    assert_eq!(fx.view.visible_creatures(), &[near]);
}

#[test]
fn following_camera_tracks_creature_and_walk_viewport() {
    let mut fx = Fixture::new();
    let start = Position::new(50, 50, 7);
    fx.ground(start);
    fx.ground(start.translated(1, 0));
    let player = fx.creature(start, Creature::new("me").local_player());
    fx.view.follow_creature(player);
    assert_eq!(fx.view.camera_position(&fx.map), Some(start));

    fx.map.begin_walk(player, start.translated(1, 0), 300, 0);
    fx.view.on_camera_move(&fx.map);
    assert_eq!(fx.view.camera_position(&fx.map), Some(start.translated(1, 0)));
    assert_eq!(fx.view.viewport(), AwareRange::new(10, 6, 10, 6));

    let src = fx.view.calc_framebuffer_source(Size::new(480, 352), &fx.map);
    assert_eq!(src.origin, Point::new(0, 32));

    fx.map.advance_walks(300);
    fx.view.on_camera_move(&fx.map);
    assert_eq!(fx.view.viewport(), AwareRange::new(8, 6, 8, 6));
}

#[test]
fn can_render_tile_culls_the_trailing_column() {
    let mut fx = Fixture::new();
    let inside = CAMERA.translated(7, 0);
    let edge = CAMERA.translated(8, 0);
    let behind = CAMERA.translated(-8, 0);
    for pos in [inside, edge, behind] {
        fx.ground(pos);
    }

    let render = |pos: Position| {
        let tile = fx.map.tile(pos).expect("tile");
        fx.view.can_render_tile(tile, CAMERA, false)
    };
    assert!(render(inside));
    assert!(!render(edge));
    assert!(!render(behind));
}

#[test]
fn screen_mapping_round_trips_through_camera_center() {
    let fx = Fixture::new();
    assert_eq!(
        fx.view.transform_position_to_2d(CAMERA, CAMERA),
        Point::new(8 * 32, 6 * 32)
    );
    assert_eq!(
        fx.view.transform_position_to_2d(Position::new(100, 100, 6), CAMERA),
        Point::new(7 * 32, 5 * 32)
    );

    let size = Size::new(15 * 32, 11 * 32);
    assert_eq!(
        fx.view.position_at_point(Point::new(240, 176), size, &fx.map),
        Some(CAMERA)
    );
    assert_eq!(
        fx.view.position_at_point(Point::new(0, 0), size, &fx.map),
        Some(CAMERA.translated(-7, -5))
    );
}

#[test]
fn panning_carries_whole_tiles_into_the_camera() {
    let mut fx = Fixture::new();
    fx.rebuild();
    fx.view.frame_cache_mut().mark_drawn(FrameLayer::Tile, 0);

    fx.view.move_by(&fx.map, 40, -10);

    assert_eq!(fx.view.camera_position(&fx.map), Some(CAMERA.translated(1, 0)));
    assert_eq!(fx.view.move_offset(), Point::new(8, -10));
    assert!(fx.view.needs_visible_tiles_update());
    assert!(fx.view.frame_cache().is_forced(FrameLayer::Tile));
}

#[test]
fn ambient_light_follows_camera_floor() {
    let mut fx = Fixture::new();
    fx.map.set_light(Light::new(200, 215));
    fx.view.set_draw_lights(&fx.map, true);
    assert_eq!(fx.view.global_light(), Some(Light::new(200, 215)));

    fx.view.set_camera_position(Position::new(100, 100, 9));
    fx.view.set_minimum_ambient_light(&fx.map, 0.5);
    assert_eq!(fx.view.global_light().map(|light| light.intensity), Some(127));
}

#[test]
fn floor_shadow_tint_is_white_without_shadowing() {
    let mut view = MapView::default();
    assert_eq!(view.on_floor_drawing_start(6, CAMERA), Color::WHITE);

    view.set_floor_shadowing(FloorShadowing::BOTTOM);
    let tint = view.on_floor_drawing_start(6, Position::new(100, 100, 5));
    assert_ne!(tint, Color::WHITE);
    assert_eq!(view.last_floor_shadow_color(), tint);
}
