use std::sync::Arc;

use super::*;
use crate::light::Light;
use crate::scheduler::Scheduler;
use crate::thing::{Creature, ThingIdAllocator};
use crate::thing_type::{ThingCategory, ThingFlags, ThingType};

const OLD_PROTOCOL: TileContext = TileContext {
    client_version: 760,
    now_ms: 0,
};
const NEW_PROTOCOL: TileContext = TileContext {
    client_version: 1098,
    now_ms: 0,
};

struct Things {
    ids: ThingIdAllocator,
}

impl Things {
    fn new() -> Self {
        Self {
            ids: ThingIdAllocator::new(),
        }
    }

    fn item(&mut self, type_id: u16, flags: ThingFlags) -> Thing {
        let ty = ThingType::new(type_id, ThingCategory::Item).with_flags(flags);
        Thing::item(self.ids.allocate(), Arc::new(ty))
    }

    fn ground(&mut self) -> Thing {
        self.item(100, ThingFlags::GROUND)
    }

    fn creature(&mut self, name: &str) -> Thing {
        let ty = ThingType::new(1, ThingCategory::Creature);
        Thing::creature(self.ids.allocate(), Arc::new(ty), Creature::new(name))
    }

    fn effect(&mut self, type_id: u16, duration_ms: u32, flags: ThingFlags) -> Thing {
        let ty = ThingType::new(type_id, ThingCategory::Effect)
            .with_flags(flags)
            .with_animation_ms(duration_ms);
        Thing::effect(self.ids.allocate(), Arc::new(ty))
    }
}

fn tile() -> Tile {
    Tile::new(Position::new(100, 100, 7))
}

fn priorities(tile: &Tile) -> Vec<u8> {
    tile.things().iter().map(Thing::stack_priority).collect()
}

fn ids(tile: &Tile) -> Vec<ThingId> {
    tile.things().iter().map(Thing::id).collect()
}

#[test]
fn auto_placement_sorts_by_stack_class() {
    let mut things = Things::new();
    let mut tile = tile();

    tile.add_thing(things.item(5, ThingFlags::empty()), StackPos::Auto, &OLD_PROTOCOL);
    tile.add_thing(things.creature("rat"), StackPos::Auto, &OLD_PROTOCOL);
    tile.add_thing(things.item(3, ThingFlags::ON_TOP), StackPos::Auto, &OLD_PROTOCOL);
    tile.add_thing(things.item(2, ThingFlags::ON_BOTTOM), StackPos::Auto, &OLD_PROTOCOL);
    tile.add_thing(things.item(4, ThingFlags::GROUND_BORDER), StackPos::Auto, &OLD_PROTOCOL);
    tile.add_thing(things.ground(), StackPos::Auto, &OLD_PROTOCOL);

    assert_eq!(priorities(&tile), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn newest_common_item_goes_on_top_of_items() {
    let mut things = Things::new();
    let mut tile = tile();
    let first = things.item(5, ThingFlags::empty());
    let second = things.item(6, ThingFlags::empty());
    let (first_id, second_id) = (first.id(), second.id());

    tile.add_thing(first, StackPos::Auto, &OLD_PROTOCOL);
    tile.add_thing(second, StackPos::Auto, &OLD_PROTOCOL);

    assert_eq!(ids(&tile), vec![second_id, first_id]);
}

#[test]
fn creature_order_flips_at_protocol_threshold() {
    let mut things = Things::new();
    let a = things.creature("a");
    let b = things.creature("b");
    let (a_id, b_id) = (a.id(), b.id());

    let mut old = tile();
    old.add_thing(a.clone(), StackPos::Auto, &OLD_PROTOCOL);
    old.add_thing(b.clone(), StackPos::Auto, &OLD_PROTOCOL);

    let mut new = tile();
    new.add_thing(a, StackPos::Auto, &NEW_PROTOCOL);
    new.add_thing(b, StackPos::Auto, &NEW_PROTOCOL);

    assert_eq!(ids(&old), vec![b_id, a_id]);
    assert_eq!(ids(&new), vec![a_id, b_id]);
}

#[test]
fn append_places_after_same_class() {
    let mut things = Things::new();
    let mut tile = tile();
    let first = things.item(5, ThingFlags::empty());
    let appended = things.item(6, ThingFlags::empty());
    let appended_id = appended.id();

    tile.add_thing(things.ground(), StackPos::Auto, &OLD_PROTOCOL);
    tile.add_thing(first, StackPos::Auto, &OLD_PROTOCOL);
    tile.add_thing(appended, StackPos::Append, &OLD_PROTOCOL);

    assert_eq!(tile.thing_stack_pos(appended_id), Some(2));
}

#[test]
fn explicit_index_past_end_is_clamped() {
    let mut things = Things::new();
    let mut tile = tile();
    tile.add_thing(things.ground(), StackPos::Auto, &OLD_PROTOCOL);
    let wall = things.item(2, ThingFlags::ON_BOTTOM);
    let wall_id = wall.id();

    let evicted = tile.add_thing(wall, StackPos::Index(40), &OLD_PROTOCOL);

    assert!(evicted.is_none());
    assert_eq!(tile.thing_stack_pos(wall_id), Some(1));
    assert_eq!(tile.thing(1).and_then(Thing::position), Some(tile.position()));
}

#[test]
fn overflow_evicts_the_thing_at_max_depth() {
    let mut things = Things::new();
    let mut tile = tile();
    tile.add_thing(things.ground(), StackPos::Auto, &OLD_PROTOCOL);
    for type_id in 0..MAX_THINGS as u16 - 1 {
        tile.add_thing(
            things.item(200 + type_id, ThingFlags::empty()),
            StackPos::Auto,
            &OLD_PROTOCOL,
        );
    }
    assert_eq!(tile.things().len(), MAX_THINGS);
    let bottom_most = tile.things()[MAX_THINGS - 1].id();

    let newest = things.item(300, ThingFlags::empty());
    let newest_id = newest.id();
    let evicted = tile
        .add_thing(newest, StackPos::Auto, &OLD_PROTOCOL)
        .expect("stack overflowed");

    assert_eq!(evicted.id(), bottom_most);
    assert_eq!(evicted.position(), None);
    assert!(tile.has_thing(newest_id));
    assert_eq!(tile.things().len(), MAX_THINGS);
    assert_eq!(*tile.count_flags(), CountFlags::recount(tile.things()));
}

#[test]
fn add_then_remove_restores_counters_and_highlight() {
    let mut things = Things::new();
    let mut tile = tile();
    tile.add_thing(things.ground(), StackPos::Auto, &OLD_PROTOCOL);
    tile.add_thing(things.item(9, ThingFlags::NOT_MOVEABLE), StackPos::Auto, &OLD_PROTOCOL);
    let counters = *tile.count_flags();
    let target = tile.highlight().target();

    let door = things.item(
        2,
        ThingFlags::ON_BOTTOM | ThingFlags::USABLE | ThingFlags::BLOCK_PROJECTILE,
    );
    let door_id = door.id();
    tile.add_thing(door, StackPos::Auto, &OLD_PROTOCOL);
    assert_eq!(tile.highlight().target(), Some(door_id));
    assert!(!tile.is_look_possible());

    let removed = tile.remove_thing(door_id).expect("door present");
    assert_eq!(removed.id(), door_id);
    assert_eq!(*tile.count_flags(), counters);
    assert_eq!(tile.highlight().target(), target);
    assert!(tile.remove_thing(door_id).is_none());
}

#[test]
fn chained_effect_waits_for_prior_burst() {
    let mut things = Things::new();
    let mut tile = tile();
    let first = things.effect(7, 1_000, ThingFlags::empty());
    tile.add_thing(first, StackPos::Auto, &TileContext { client_version: 860, now_ms: 0 });

    let second = things.effect(7, 1_000, ThingFlags::empty());
    tile.add_thing(second, StackPos::Auto, &TileContext { client_version: 860, now_ms: 250 });

    let delay = tile.effects()[1].as_effect().map(|effect| effect.start_delay_ms);
    assert_eq!(delay, Some(350));
    assert!(tile.things().is_empty());
    assert_eq!(tile.count_flags(), &CountFlags::default());
}

#[test]
fn late_chained_effect_gets_negative_delay() {
    let mut things = Things::new();
    let mut tile = tile();
    tile.add_thing(things.effect(7, 500, ThingFlags::empty()), StackPos::Auto, &OLD_PROTOCOL);

    let late = things.effect(7, 500, ThingFlags::empty());
    tile.add_thing(late, StackPos::Auto, &TileContext { client_version: 760, now_ms: 400 });

    let effect = tile.effects()[1].as_effect().copied().expect("effect state");
    assert_eq!(effect.start_delay_ms, -100);
    assert!(effect.is_drawing(400));
}

#[test]
fn top_effects_go_to_the_front() {
    let mut things = Things::new();
    let mut tile = tile();
    tile.add_thing(things.effect(1, 100, ThingFlags::empty()), StackPos::Auto, &OLD_PROTOCOL);
    let top = things.effect(2, 100, ThingFlags::TOP_EFFECT);
    let top_id = top.id();
    tile.add_thing(top, StackPos::Auto, &OLD_PROTOCOL);

    assert_eq!(tile.effects()[0].id(), top_id);
}

#[test]
fn highlight_falls_back_to_creature() {
    let mut things = Things::new();
    let mut tile = tile();
    tile.add_thing(things.ground(), StackPos::Auto, &OLD_PROTOCOL);
    let creature = things.creature("orc");
    let creature_id = creature.id();
    tile.add_thing(creature, StackPos::Auto, &OLD_PROTOCOL);

    tile.check_for_detachable_thing();

    assert_eq!(tile.highlight().target(), Some(creature_id));
}

#[test]
fn movable_common_item_beats_creature_for_highlight() {
    let mut things = Things::new();
    let mut tile = tile();
    tile.add_thing(things.ground(), StackPos::Auto, &OLD_PROTOCOL);
    tile.add_thing(things.creature("orc"), StackPos::Auto, &OLD_PROTOCOL);
    let sword = things.item(50, ThingFlags::empty());
    let sword_id = sword.id();
    tile.add_thing(sword, StackPos::Auto, &OLD_PROTOCOL);

    assert_eq!(tile.highlight().target(), Some(sword_id));
}

#[test]
fn select_requires_a_target_and_unselect_cancels_pulse() {
    let mut scheduler: Scheduler<u8> = Scheduler::new();
    let mut things = Things::new();
    let mut empty = tile();
    let pulse = scheduler.schedule_cycle(0, HIGHLIGHT_PULSE_MS, 0);
    assert!(!empty.select(pulse.clone()));
    assert!(pulse.is_cancelled());

    let mut tile = tile();
    tile.add_thing(things.creature("orc"), StackPos::Auto, &OLD_PROTOCOL);
    let pulse = scheduler.schedule_cycle(0, HIGHLIGHT_PULSE_MS, 1);
    assert!(tile.select(pulse.clone()));
    tile.step_highlight();
    let descriptor = tile.highlight_descriptor().expect("highlighted");
    assert_eq!(descriptor.color.a, HIGHLIGHT_FADE_STEP as u8);

    tile.unselect();
    assert!(pulse.is_cancelled());
    assert!(tile.highlight_descriptor().is_none());
}

#[test]
fn walkability_considers_ground_blockers_and_creatures() {
    let mut things = Things::new();
    let mut tile = tile();
    assert!(!tile.is_walkable(true));

    tile.add_thing(things.ground(), StackPos::Auto, &OLD_PROTOCOL);
    assert!(tile.is_walkable(false));

    let ghost = Thing::creature(
        ThingId(900),
        Arc::new(ThingType::new(1, ThingCategory::Creature)),
        Creature::new("ghost").visible(false),
    );
    tile.add_thing(ghost, StackPos::Auto, &OLD_PROTOCOL);
    assert!(tile.is_walkable(false));

    tile.add_thing(things.creature("orc"), StackPos::Auto, &OLD_PROTOCOL);
    assert!(!tile.is_walkable(false));
    assert!(tile.is_walkable(true));

    tile.add_thing(things.item(8, ThingFlags::NOT_WALKABLE), StackPos::Auto, &OLD_PROTOCOL);
    assert!(!tile.is_walkable(true));
}

#[test]
fn top_move_thing_skips_fixed_item() {
    let mut things = Things::new();
    let mut tile = tile();
    let ground = things.ground();
    let ground_id = ground.id();
    tile.add_thing(ground, StackPos::Auto, &OLD_PROTOCOL);
    tile.add_thing(things.item(9, ThingFlags::NOT_MOVEABLE), StackPos::Auto, &OLD_PROTOCOL);

    assert_eq!(tile.top_move_thing().map(Thing::id), Some(ground_id));
}

#[test]
fn multi_use_prefers_creature_then_splash_lookback() {
    let mut things = Things::new();
    let mut tile = tile();
    let ground = things.ground();
    let ground_id = ground.id();
    tile.add_thing(ground, StackPos::Auto, &OLD_PROTOCOL);
    tile.add_thing(things.item(40, ThingFlags::SPLASH), StackPos::Auto, &OLD_PROTOCOL);
    assert_eq!(tile.top_multi_use_thing(), Some(ground_id));

    let creature = things.creature("orc");
    let creature_id = creature.id();
    tile.add_thing(creature, StackPos::Auto, &OLD_PROTOCOL);
    assert_eq!(tile.top_multi_use_thing(), Some(creature_id));
}

#[test]
fn top_creature_prefers_others_over_local_player() {
    let mut things = Things::new();
    let mut tile = tile();
    let player = Thing::creature(
        ThingId(500),
        Arc::new(ThingType::new(1, ThingCategory::Creature)),
        Creature::new("me").local_player(),
    );
    tile.add_thing(player, StackPos::Auto, &OLD_PROTOCOL);
    assert_eq!(tile.top_creature(), Some(ThingId(500)));

    let other = things.creature("orc");
    let other_id = other.id();
    tile.add_thing(other, StackPos::Auto, &OLD_PROTOCOL);
    assert_eq!(tile.top_creature(), Some(other_id));
}

#[test]
fn walking_record_is_a_creature_fallback() {
    let mut tile = tile();
    tile.add_walking_creature(WalkingCreature {
        id: ThingId(77),
        light: Light::new(3, 215),
        offset: Point::new(8, 0),
    });

    assert_eq!(tile.top_creature(), Some(ThingId(77)));
    assert!(tile.has_light());
    assert!(!tile.is_single_dimension());
    assert!(tile.is_drawable());
    assert!(!tile.can_erase());

    assert!(tile.remove_walking_creature(ThingId(77)).is_some());
    assert!(tile.can_erase());
}

#[test]
fn minimap_color_scans_fixtures_top_down() {
    let mut things = Things::new();
    let mut tile = tile();
    assert_eq!(tile.minimap_color_byte(), 255);

    let ground = Thing::item(
        ThingId(600),
        Arc::new(
            ThingType::new(100, ThingCategory::Item)
                .with_flags(ThingFlags::GROUND)
                .with_minimap_color(24),
        ),
    );
    tile.add_thing(ground, StackPos::Auto, &OLD_PROTOCOL);
    tile.add_thing(things.item(5, ThingFlags::empty()), StackPos::Auto, &OLD_PROTOCOL);
    assert_eq!(tile.minimap_color_byte(), 24);

    tile.set_minimap_color(180);
    assert_eq!(tile.minimap_color_byte(), 180);
}

#[test]
fn floor_view_limits_depend_on_free_view() {
    let mut things = Things::new();
    let mut window = tile();
    window.add_thing(things.item(2, ThingFlags::ON_BOTTOM), StackPos::Auto, &OLD_PROTOCOL);
    assert!(window.limits_floors_view(false));
    assert!(!window.limits_floors_view(true));

    let mut wall = tile();
    wall.add_thing(
        things.item(3, ThingFlags::ON_BOTTOM | ThingFlags::BLOCK_PROJECTILE),
        StackPos::Auto,
        &OLD_PROTOCOL,
    );
    assert!(wall.limits_floors_view(true));

    let mut ground = tile();
    ground.add_thing(things.ground(), StackPos::Auto, &OLD_PROTOCOL);
    assert!(ground.limits_floors_view(true));
}

#[test]
fn draw_elevation_is_capped() {
    let mut tile = tile();
    for type_id in 0..4 {
        let ty = ThingType::new(20 + type_id, ThingCategory::Item).with_elevation(8);
        tile.add_thing(
            Thing::item(ThingId(700 + u64::from(type_id)), Arc::new(ty)),
            StackPos::Auto,
            &OLD_PROTOCOL,
        );
    }

    assert_eq!(tile.count_flags().total_elevation, 32);
    assert_eq!(tile.draw_elevation(), crate::geometry::MAX_ELEVATION);
    assert!(tile.has_elevation(4));
}
