use tracing::trace;

use crate::frame_cache::{FrameFlags, FrameLayer};
use crate::geometry::{Point, Position, MAX_ELEVATION, TILE_PIXELS};
use crate::light::{Color, Light};
use crate::map::Map;
use crate::map_view::MapView;
use crate::thing::{Thing, ThingId};
use crate::tile::{HighlightDescriptor, Tile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawLayer {
    Ground,
    Bottom,
    Common,
    Creature,
    Walking,
    Effect,
    Top,
}

/// One sprite draw, in paint order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThingDraw {
    pub id: ThingId,
    pub type_id: u16,
    pub layer: DrawLayer,
    /// Top-left pixel in the tile buffer, elevation and walk offsets applied.
    pub dest: Point,
    pub light: Option<Light>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileDraw {
    pub position: Position,
    pub dest: Point,
    pub things: Vec<ThingDraw>,
    pub highlight: Option<HighlightDescriptor>,
    pub border_shadow: Option<Color>,
    /// Hidden by floors above; only its light is of interest.
    pub covered: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatureInformation {
    pub id: ThingId,
    pub name: String,
    pub dest: Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextDraw {
    pub position: Position,
    pub text: String,
    pub animated: bool,
    pub dest: Point,
}

/// Drawing backend fed by [`draw_map_view`].
pub trait MapRenderer {
    fn begin_floor(&mut self, floor: u8, shadow: Color);
    fn draw_tile(&mut self, tile: &TileDraw);
    fn end_floor(&mut self, floor: u8);

    fn draw_creature_information(&mut self, _info: &CreatureInformation) {}

    fn draw_text(&mut self, _text: &TextDraw) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawStats {
    pub floors: u32,
    pub tiles: u32,
    pub things: u32,
    pub redrew_tiles: bool,
    pub redrew_lights: bool,
}

/// Draws one frame of `view` into `renderer`.
///
/// Rebuilds the visible-tile cache when requested, then walks the cached
/// floors from the deepest to the highest. Layers that do not need a redraw
/// are skipped.
pub fn draw_map_view<R: MapRenderer>(
    view: &mut MapView,
    map: &mut Map,
    renderer: &mut R,
    now_ms: u64,
) -> DrawStats {
    let mut stats = DrawStats::default();
    view.update_visible_tiles_cache_if_needed(map);
    let Some(camera) = view.camera_position(map) else {
        return stats;
    };

    let redraw_thing = view.frame_cache().can_update(FrameLayer::Tile, now_ms);
    let redraw_light =
        view.draw_lights() && view.frame_cache().can_update(FrameLayer::Light, now_ms);

    if redraw_thing || redraw_light {
        let mut flags = FrameFlags::empty();
        flags.set(FrameFlags::UPDATE_THING, redraw_thing);
        flags.set(FrameFlags::UPDATE_LIGHT, redraw_light);
        view.frame_cache_mut().set_flags(flags);

        let (floor_min, floor_max) = view.floor_range();
        for z in (floor_min..=floor_max).rev() {
            let shadow = view.on_floor_drawing_start(z, camera);
            renderer.begin_floor(z, shadow);
            stats.floors += 1;

            for pos in view.visible_tiles(z) {
                let Some(tile) = map.tile(*pos) else {
                    continue;
                };
                let has_light = redraw_light && tile.has_light();
                if (!redraw_thing && !has_light)
                    || !view.can_render_tile(tile, camera, redraw_light)
                {
                    continue;
                }

                let dest = view.transform_position_to_2d(*pos, camera);
                let draw = paint_tile(map, tile, dest, view.scale_factor(), now_ms);
                stats.tiles += 1;
                stats.things += draw.things.len() as u32;
                renderer.draw_tile(&draw);
            }

            renderer.end_floor(z);
        }

        let cache = view.frame_cache_mut();
        if redraw_thing {
            cache.mark_drawn(FrameLayer::Tile, now_ms);
        }
        if redraw_light {
            cache.mark_drawn(FrameLayer::Light, now_ms);
        }
        stats.redrew_tiles = redraw_thing;
        stats.redrew_lights = redraw_light;
    }

    draw_creature_information(view, map, renderer, camera, now_ms);
    draw_texts(view, map, renderer, camera, now_ms);
    view.frame_cache_mut().clear_flags();

    trace!(
        floors = stats.floors,
        tiles = stats.tiles,
        things = stats.things,
        "map_view_drawn"
    );
    stats
}

fn draw_creature_information<R: MapRenderer>(
    view: &mut MapView,
    map: &Map,
    renderer: &mut R,
    camera: Position,
    now_ms: u64,
) {
    let layer = FrameLayer::CreatureInformation;
    if !view.draw_names() || !view.frame_cache().can_update(layer, now_ms) {
        return;
    }

    for id in view.visible_creatures() {
        let Some(thing) = map.creature(*id) else {
            continue;
        };
        let (Some(pos), Some(creature)) = (thing.position(), thing.as_creature()) else {
            continue;
        };
        let walk = creature
            .walk
            .map(|walk| walk.offset_from(pos).scaled(view.scale_factor()))
            .unwrap_or_default();
        renderer.draw_creature_information(&CreatureInformation {
            id: *id,
            name: creature.name.clone(),
            dest: view.transform_position_to_2d(pos, camera) + walk,
        });
    }
    view.frame_cache_mut().mark_drawn(layer, now_ms);
}

fn draw_texts<R: MapRenderer>(
    view: &mut MapView,
    map: &Map,
    renderer: &mut R,
    camera: Position,
    now_ms: u64,
) {
    if !view.draw_texts() {
        return;
    }

    for (layer, animated) in [(FrameLayer::StaticText, false), (FrameLayer::DynamicText, true)] {
        if !view.frame_cache().can_update(layer, now_ms) {
            continue;
        }
        let texts = map
            .texts()
            .iter()
            .filter(|text| text.animated == animated && text.position.z == camera.z);
        for text in texts {
            renderer.draw_text(&TextDraw {
                position: text.position,
                text: text.text.clone(),
                animated,
                dest: view.transform_position_to_2d(text.position, camera),
            });
        }
        view.frame_cache_mut().mark_drawn(layer, now_ms);
    }
}

/// Sprite list for one tile in paint order: ground and borders, walls,
/// common items with the newest last, creatures, effects, then top items.
pub fn paint_tile(map: &Map, tile: &Tile, dest: Point, scale: f32, now_ms: u64) -> TileDraw {
    let mut painter = TilePainter {
        scale,
        things: Vec::new(),
    };
    let mut elevation = 0;

    for thing in tile.ground_things() {
        painter.draw(thing, DrawLayer::Ground, dest, &mut elevation);
    }
    for thing in tile.bottom_things() {
        painter.draw(thing, DrawLayer::Bottom, dest, &mut elevation);
    }

    let mut redraw_width = 0;
    let mut redraw_height = 0;
    for thing in tile.common_things() {
        painter.draw(thing, DrawLayer::Common, dest, &mut elevation);
        if thing.is_lying_corpse() {
            redraw_width = redraw_width.max(i32::from(thing.width()));
            redraw_height = redraw_height.max(i32::from(thing.height()));
        }
    }

    // Large corpses paint over the creatures and top items of the tiles
    // they spread onto, so those are drawn again.
    if redraw_width > 0 || redraw_height > 0 {
        for x in -redraw_width..=0 {
            for y in -redraw_height..=0 {
                if x == 0 && y == 0 {
                    continue;
                }
                let Some(other) = map.tile(tile.position().translated(x, y)) else {
                    continue;
                };
                let other_dest = dest + Point::new(x * TILE_PIXELS, y * TILE_PIXELS).scaled(scale);
                let mut other_elevation = other.draw_elevation();
                painter.draw_creatures(map, other, other_dest, &mut other_elevation);
                painter.draw_tops(other, other_dest);
            }
        }
    }

    painter.draw_creatures(map, tile, dest, &mut elevation);

    for effect in tile.effects() {
        let drawing = effect
            .as_effect()
            .is_some_and(|state| state.is_drawing(now_ms));
        if drawing {
            painter.draw(effect, DrawLayer::Effect, dest, &mut elevation);
        }
    }
    painter.draw_tops(tile, dest);

    TileDraw {
        position: tile.position(),
        dest,
        things: painter.things,
        highlight: tile.highlight_descriptor(),
        border_shadow: tile.border_shadow_color(),
        covered: tile.is_completely_covered(),
    }
}

struct TilePainter {
    scale: f32,
    things: Vec<ThingDraw>,
}

impl TilePainter {
    fn lifted(&self, dest: Point, elevation: i32) -> Point {
        dest - Point::new(elevation, elevation).scaled(self.scale)
    }

    fn push(&mut self, thing: &Thing, layer: DrawLayer, dest: Point) {
        self.things.push(ThingDraw {
            id: thing.id(),
            type_id: thing.type_id(),
            layer,
            dest,
            light: thing.has_light().then(|| thing.light()),
        });
    }

    fn draw(&mut self, thing: &Thing, layer: DrawLayer, dest: Point, elevation: &mut i32) {
        let lifted = self.lifted(dest, *elevation);
        self.push(thing, layer, lifted);
        if !thing.is_effect() {
            *elevation = (*elevation + thing.elevation()).min(MAX_ELEVATION);
        }
    }

    fn draw_creatures(&mut self, map: &Map, tile: &Tile, dest: Point, elevation: &mut i32) {
        for thing in tile.creatures().filter(|thing| !thing.is_walking()) {
            self.draw(thing, DrawLayer::Creature, dest, elevation);
        }

        for walking in tile.walking_creatures() {
            let Some(thing) = map.creature(walking.id) else {
                continue;
            };
            let offset = Point::new(walking.offset.x - *elevation, walking.offset.y - *elevation);
            self.push(thing, DrawLayer::Walking, dest + offset.scaled(self.scale));
        }
    }

    fn draw_tops(&mut self, tile: &Tile, dest: Point) {
        for thing in tile.top_things() {
            self.push(thing, DrawLayer::Top, dest);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::thing::Creature;
    use crate::thing_type::{ThingCategory, ThingFlags, ThingType};
    use crate::tile::StackPos;

    #[derive(Default)]
    struct Recorder {
        floors: Vec<(u8, Color)>,
        tiles: Vec<TileDraw>,
        names: Vec<String>,
        texts: Vec<String>,
    }

    impl MapRenderer for Recorder {
        fn begin_floor(&mut self, floor: u8, shadow: Color) {
            self.floors.push((floor, shadow));
        }

        fn draw_tile(&mut self, tile: &TileDraw) {
            self.tiles.push(tile.clone());
        }

        fn end_floor(&mut self, _floor: u8) {}

        fn draw_creature_information(&mut self, info: &CreatureInformation) {
            self.names.push(info.name.clone());
        }

        fn draw_text(&mut self, text: &TextDraw) {
            self.texts.push(text.text.clone());
        }
    }

    fn item(id: u64, type_id: u16, flags: ThingFlags, elevation: u16) -> Thing {
        let ty = ThingType::new(type_id, ThingCategory::Item)
            .with_flags(flags)
            .with_elevation(elevation);
        Thing::item(ThingId(id), Arc::new(ty))
    }

    #[test]
    fn tile_paints_in_layer_order_with_elevation() {
        let mut map = Map::new(860);
        let pos = Position::new(10, 10, 7);
        let layers = [
            item(1, 100, ThingFlags::GROUND, 0),
            item(2, 200, ThingFlags::ON_TOP, 0),
            item(3, 300, ThingFlags::empty(), 8),
            item(4, 301, ThingFlags::empty(), 0),
            item(5, 400, ThingFlags::ON_BOTTOM, 4),
        ];
        for thing in layers {
            map.add_thing(pos, thing, StackPos::Auto, 0);
        }
        let creature = Thing::creature(
            ThingId(6),
            Arc::new(ThingType::new(1, ThingCategory::Creature)),
            Creature::new("rat"),
        );
        map.add_thing(pos, creature, StackPos::Auto, 0);

        let tile = map.tile(pos).expect("tile");
        let draw = paint_tile(&map, tile, Point::new(64, 64), 1.0, 0);

        let order: Vec<(u64, DrawLayer, Point)> = draw
            .things
            .iter()
            .map(|thing| (thing.id.0, thing.layer, thing.dest))
            .collect();
        assert_eq!(
            order,
            vec![
                (1, DrawLayer::Ground, Point::new(64, 64)),
                (5, DrawLayer::Bottom, Point::new(64, 64)),
                (3, DrawLayer::Common, Point::new(60, 60)),
                (4, DrawLayer::Common, Point::new(52, 52)),
                (6, DrawLayer::Creature, Point::new(52, 52)),
                (2, DrawLayer::Top, Point::new(64, 64)),
            ]
        );
    }

    #[test]
    fn draw_pass_walks_floors_back_to_front_and_skips_clean_frames() {
        let mut map = Map::new(860);
        let mut view = MapView::default();
        let camera = Position::new(100, 100, 7);
        view.set_camera_position(camera);
        map.add_thing(camera, item(1, 100, ThingFlags::GROUND, 0), StackPos::Auto, 0);
        map.add_thing(
            Position::new(104, 104, 6),
            item(2, 100, ThingFlags::GROUND, 0),
            StackPos::Auto,
            0,
        );

        let mut recorder = Recorder::default();
        let stats = draw_map_view(&mut view, &mut map, &mut recorder, 0);

        assert_eq!(stats.tiles, 2);
        let floors: Vec<u8> = recorder.floors.iter().map(|(floor, _)| *floor).collect();
        assert_eq!(floors, vec![7, 6]);
        assert_eq!(recorder.tiles[0].position, camera);

        let mut second = Recorder::default();
        let stats = draw_map_view(&mut view, &mut map, &mut second, 16);
        assert!(!stats.redrew_tiles);
        assert!(second.tiles.is_empty());
    }

    #[test]
    fn names_and_texts_follow_their_layers() {
        let mut map = Map::new(860);
        let mut view = MapView::default();
        let camera = Position::new(100, 100, 7);
        view.set_camera_position(camera);
        map.add_thing(camera, item(1, 100, ThingFlags::GROUND, 0), StackPos::Auto, 0);
        let orc = Thing::creature(
            ThingId(2),
            Arc::new(ThingType::new(1, ThingCategory::Creature)),
            Creature::new("orc"),
        );
        map.add_thing(camera.translated(1, 0), orc, StackPos::Auto, 0);
        map.add_text(crate::map::MapText {
            position: camera,
            text: "hello".into(),
            animated: false,
            expires_at_ms: 1_000,
        });

        let mut recorder = Recorder::default();
        draw_map_view(&mut view, &mut map, &mut recorder, 0);
        assert_eq!(recorder.names, vec!["orc".to_string()]);
        assert_eq!(recorder.texts, vec!["hello".to_string()]);

        let mut again = Recorder::default();
        draw_map_view(&mut view, &mut map, &mut again, 10);
        assert!(again.names.is_empty());
        assert!(again.texts.is_empty());
    }
}
