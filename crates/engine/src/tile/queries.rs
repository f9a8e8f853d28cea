use crate::geometry::MAX_ELEVATION;
use crate::thing::{Thing, ThingId};

use super::Tile;

/// Ground speed of a tile without ground.
pub const DEFAULT_GROUND_SPEED: u16 = 100;
const NO_MINIMAP_COLOR: u8 = 255;

impl Tile {
    pub fn is_empty(&self) -> bool {
        self.things.is_empty()
    }

    pub fn is_drawable(&self) -> bool {
        !self.things.is_empty() || !self.walking.is_empty() || !self.effects.is_empty()
    }

    pub fn can_erase(&self) -> bool {
        self.walking.is_empty()
            && self.effects.is_empty()
            && self.things.is_empty()
            && self.flags.is_empty()
            && self.minimap_color == 0
    }

    pub fn ground(&self) -> Option<&Thing> {
        self.things.first().filter(|thing| thing.is_ground())
    }

    pub fn ground_speed(&self) -> u16 {
        self.ground()
            .map_or(DEFAULT_GROUND_SPEED, Thing::ground_speed)
    }

    pub fn effect(&self, type_id: u16) -> Option<&Thing> {
        self.effects.iter().find(|effect| effect.type_id() == type_id)
    }

    pub fn creatures(&self) -> impl DoubleEndedIterator<Item = &Thing> + '_ {
        self.things.iter().filter(|thing| thing.is_creature())
    }

    pub fn items(&self) -> impl Iterator<Item = &Thing> + '_ {
        self.things.iter().filter(|thing| thing.is_item())
    }

    pub fn ground_things(&self) -> impl Iterator<Item = &Thing> + '_ {
        self.things
            .iter()
            .take_while(|thing| thing.is_ground_or_border())
    }

    pub fn bottom_things(&self) -> impl Iterator<Item = &Thing> + '_ {
        self.things.iter().filter(|thing| thing.is_on_bottom())
    }

    /// Common items in draw order, which is the reverse of stack order.
    pub fn common_things(&self) -> impl Iterator<Item = &Thing> + '_ {
        self.things.iter().rev().filter(|thing| thing.is_common())
    }

    pub fn top_things(&self) -> impl Iterator<Item = &Thing> + '_ {
        self.things.iter().filter(|thing| thing.is_on_top())
    }

    pub fn has_creature(&self) -> bool {
        self.count_flags.has_creature > 0
    }

    pub fn has_local_player(&self) -> bool {
        self.has_creature() && self.creatures().any(Thing::is_local_player)
    }

    pub fn is_walkable(&self, ignore_creatures: bool) -> bool {
        if self.count_flags.not_walkable > 0 || self.ground().is_none() {
            return false;
        }

        if !ignore_creatures && self.has_creature() {
            let blocked = self.creatures().any(|thing| {
                thing
                    .as_creature()
                    .is_some_and(|creature| !creature.passable && creature.visible)
            });
            if blocked {
                return false;
            }
        }

        true
    }

    pub fn is_pathable(&self) -> bool {
        self.count_flags.not_pathable == 0
    }

    pub fn is_full_ground(&self) -> bool {
        self.count_flags.full_ground > 0
    }

    pub fn is_fully_opaque(&self) -> bool {
        self.is_full_ground() || self.count_flags.opaque > 0
    }

    pub fn is_single_dimension(&self) -> bool {
        self.count_flags.not_single_dimension == 0 && self.walking.is_empty()
    }

    pub fn has_tall_things(&self) -> bool {
        self.count_flags.has_tall_things > 0
    }

    pub fn has_wide_things(&self) -> bool {
        self.count_flags.has_wide_things > 0
    }

    pub fn has_displacement(&self) -> bool {
        self.count_flags.has_displacement > 0
    }

    pub fn is_look_possible(&self) -> bool {
        self.count_flags.block_projectile == 0
    }

    pub fn must_hook_east(&self) -> bool {
        self.count_flags.has_hook_east > 0
    }

    pub fn must_hook_south(&self) -> bool {
        self.count_flags.has_hook_south > 0
    }

    pub fn has_top_ground(&self) -> bool {
        self.count_flags.has_top_ground > 0
    }

    pub fn has_no_walkable_edge(&self) -> bool {
        self.count_flags.has_no_walkable_edge > 0
    }

    /// Number of stack things with a non-zero elevation.
    pub fn elevation(&self) -> i32 {
        self.count_flags.elevation
    }

    pub fn has_elevation(&self, elevation: i32) -> bool {
        self.count_flags.elevation >= elevation
    }

    /// Pixel lift applied to things drawn on top, capped at [`MAX_ELEVATION`].
    pub fn draw_elevation(&self) -> i32 {
        self.count_flags.total_elevation.clamp(0, MAX_ELEVATION)
    }

    /// Light from the stack, the effects or a creature passing through.
    pub fn has_light(&self) -> bool {
        self.count_flags.has_light > 0
            || self.effects.iter().any(Thing::has_light)
            || self.walking.iter().any(|walking| walking.light.is_lit())
    }

    /// Whether this tile hides the floors above it.
    ///
    /// Ground always does. A wall only does when `is_free_view` is false or
    /// when it also blocks line of sight.
    pub fn limits_floors_view(&self, is_free_view: bool) -> bool {
        let Some(first) = self.things.first() else {
            return false;
        };
        first.is_ground()
            || if is_free_view {
                first.is_on_bottom() && first.blocks_projectile()
            } else {
                first.is_on_bottom()
            }
    }

    pub fn is_clickable(&self) -> bool {
        let mut has_ground = false;
        let mut has_on_bottom = false;
        let mut has_ignore_look = false;
        for thing in &self.things {
            if thing.is_ground() {
                has_ground = true;
            } else if thing.is_on_bottom() {
                has_on_bottom = true;
            }
            has_ignore_look |= thing.is_ignore_look();

            if (has_ground || has_on_bottom) && !has_ignore_look {
                return true;
            }
        }
        false
    }

    pub fn minimap_color_byte(&self) -> u8 {
        if self.minimap_color != 0 {
            return self.minimap_color;
        }

        self.things
            .iter()
            .rev()
            .filter(|thing| !thing.is_creature() && !thing.is_common())
            .map(Thing::minimap_color)
            .find(|color| *color != 0)
            .unwrap_or(NO_MINIMAP_COLOR)
    }

    /// First common item, else the last thing in the stack.
    pub fn top_thing(&self) -> Option<&Thing> {
        self.things
            .iter()
            .find(|thing| thing.is_common())
            .or_else(|| self.things.last())
    }

    pub fn top_look_thing(&self) -> Option<&Thing> {
        self.things
            .iter()
            .find(|thing| !thing.is_ignore_look() && !is_fixture(thing))
            .or_else(|| self.things.first())
    }

    pub fn top_use_thing(&self) -> Option<&Thing> {
        self.things
            .iter()
            .find(|thing| {
                thing.is_force_use()
                    || (!is_fixture(thing) && !thing.is_creature() && !thing.is_splash())
            })
            .or_else(|| {
                self.things.iter().find(|thing| {
                    !thing.is_ground_or_border() && !thing.is_creature() && !thing.is_splash()
                })
            })
            .or_else(|| self.things.first())
    }

    /// First common item, or the thing under it when the item is fixed in
    /// place, else the first creature.
    pub fn top_move_thing(&self) -> Option<&Thing> {
        let common = self
            .things
            .iter()
            .enumerate()
            .find(|(_, thing)| thing.is_common());
        if let Some((index, thing)) = common {
            if index > 0 && thing.is_not_moveable() {
                return self.things.get(index - 1);
            }
            return Some(thing);
        }

        self.things
            .iter()
            .find(|thing| thing.is_creature())
            .or_else(|| self.things.first())
    }

    pub fn top_multi_use_thing(&self) -> Option<ThingId> {
        if self.things.is_empty() {
            return None;
        }

        if let Some(creature) = self.top_creature() {
            return Some(creature);
        }

        if let Some(thing) = self.things.iter().find(|thing| thing.is_force_use()) {
            return Some(thing.id());
        }

        let loose = self
            .things
            .iter()
            .enumerate()
            .find(|(_, thing)| !is_fixture(thing));
        if let Some((index, thing)) = loose {
            if index > 0 && thing.is_splash() {
                return Some(self.things[index - 1].id());
            }
            return Some(thing.id());
        }

        self.things
            .iter()
            .find(|thing| !thing.is_ground() && !thing.is_on_top())
            .or_else(|| self.things.first())
            .map(Thing::id)
    }

    /// Creature to target on this tile alone: any creature other than the
    /// local player, then the local player, then a creature passing through.
    pub fn top_creature(&self) -> Option<ThingId> {
        let mut local_player = None;
        for thing in self.creatures() {
            if thing.is_local_player() {
                local_player = Some(thing.id());
            } else {
                return Some(thing.id());
            }
        }

        local_player.or_else(|| self.walking.last().map(|walking| walking.id))
    }
}

/// Ground, border, wall or top decoration.
fn is_fixture(thing: &Thing) -> bool {
    thing.is_ground() || thing.is_ground_border() || thing.is_on_bottom() || thing.is_on_top()
}
