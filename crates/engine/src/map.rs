use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::geometry::{
    AwareRange, Position, AWARE_UNDERGROUND_FLOOR_RANGE, MAX_Z, SEA_FLOOR,
};
use crate::light::{tile_shadowing_color, Light};
use crate::thing::{Thing, ThingId, WalkState};
use crate::tile::{StackPos, Tile, TileContext, TileStateFlags, WalkingCreature};

/// Walk progress past which a creature no longer counts as standing on the
/// tile it left.
pub const CHECK_AROUND_PROGRESS: f32 = 0.75;

pub const DEFAULT_AWARE_RANGE: AwareRange = AwareRange::new(8, 6, 9, 7);

/// Floating text anchored to a map position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapText {
    pub position: Position,
    pub text: String,
    /// Animated texts rise and fade; static ones stay until they expire.
    pub animated: bool,
    pub expires_at_ms: u64,
}

/// A tile whose rendering state changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileUpdate {
    pub position: Position,
    /// A creature was added, removed or moved across the tile.
    pub creature: bool,
}

/// All known tiles, keyed by position, plus a creature index.
#[derive(Debug)]
pub struct Map {
    tiles: HashMap<Position, Tile>,
    creatures: HashMap<ThingId, Position>,
    walking: Vec<ThingId>,
    tile_updates: Vec<TileUpdate>,
    texts: Vec<MapText>,
    client_version: u16,
    light: Light,
    aware_range: AwareRange,
}

impl Map {
    pub fn new(client_version: u16) -> Self {
        Self {
            tiles: HashMap::new(),
            creatures: HashMap::new(),
            walking: Vec::new(),
            tile_updates: Vec::new(),
            texts: Vec::new(),
            client_version,
            light: Light::default(),
            aware_range: DEFAULT_AWARE_RANGE,
        }
    }

    pub fn client_version(&self) -> u16 {
        self.client_version
    }

    pub fn set_client_version(&mut self, version: u16) {
        self.client_version = version;
    }

    pub fn light(&self) -> Light {
        self.light
    }

    pub fn set_light(&mut self, light: Light) {
        self.light = light;
    }

    pub fn aware_range(&self) -> AwareRange {
        self.aware_range
    }

    pub fn set_aware_range(&mut self, range: AwareRange) {
        self.aware_range = range;
    }

    pub fn tile(&self, pos: Position) -> Option<&Tile> {
        self.tiles.get(&pos)
    }

    pub fn tile_mut(&mut self, pos: Position) -> Option<&mut Tile> {
        self.tiles.get_mut(&pos)
    }

    /// `None` only for positions outside the world.
    pub fn get_or_create_tile(&mut self, pos: Position) -> Option<&mut Tile> {
        if !pos.is_valid() {
            return None;
        }
        Some(self.tiles.entry(pos).or_insert_with(|| Tile::new(pos)))
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> + '_ {
        self.tiles.values()
    }

    /// Places `thing` on the tile at `pos`.
    ///
    /// Returns the thing that did not stay on the map: the one evicted by the
    /// depth limit, or `thing` itself when `pos` is outside the world.
    pub fn add_thing(
        &mut self,
        pos: Position,
        thing: Thing,
        stack_pos: StackPos,
        now_ms: u64,
    ) -> Option<Thing> {
        let ctx = TileContext {
            client_version: self.client_version,
            now_ms,
        };
        let id = thing.id();
        let is_creature = thing.is_creature();
        let translucent = thing.is_translucent();

        let Some(tile) = self.get_or_create_tile(pos) else {
            warn!(position = %pos, thing = %id, "add_thing_invalid_position");
            return Some(thing);
        };
        let evicted = tile.add_thing(thing, stack_pos, &ctx);

        if is_creature {
            self.creatures.insert(id, pos);
        }
        if let Some(evicted) = &evicted {
            debug!(position = %pos, thing = %evicted.id(), "stack_overflow_evicted");
            self.forget_creature(evicted.id(), pos);
        }
        if translucent || evicted.as_ref().is_some_and(Thing::is_translucent) {
            self.check_translucent_light(pos);
        }
        let creature = is_creature || evicted.as_ref().is_some_and(Thing::is_creature);
        self.notify_tile_update(pos, creature);
        evicted
    }

    /// Removes the thing with `id` from the tile at `pos`. Empty tiles are
    /// dropped once nothing else keeps them alive.
    pub fn remove_thing(&mut self, pos: Position, id: ThingId) -> Option<Thing> {
        if self.walking.contains(&id) && self.creature_position(id) == Some(pos) {
            self.finish_walk(id);
        }
        let tile = self.tiles.get_mut(&pos)?;
        let removed = tile.remove_thing(id)?;
        let erase = tile.can_erase();

        self.forget_creature(id, pos);
        if removed.is_translucent() {
            self.check_translucent_light(pos);
        }
        self.notify_tile_update(pos, removed.is_creature());
        if erase {
            self.erase_tile(pos);
        }
        Some(removed)
    }

    /// Remove-then-add. Returns false when nothing with `id` is at `from`.
    pub fn move_thing(
        &mut self,
        from: Position,
        id: ThingId,
        to: Position,
        stack_pos: StackPos,
        now_ms: u64,
    ) -> bool {
        let Some(thing) = self.remove_thing(from, id) else {
            return false;
        };
        if let Some(lost) = self.add_thing(to, thing, stack_pos, now_ms) {
            debug!(thing = %lost.id(), from = %from, to = %to, "move_thing_dropped");
        }
        true
    }

    /// Empties the stack at `pos` and returns what was on it.
    pub fn clean_tile(&mut self, pos: Position) -> Vec<Thing> {
        let Some(tile) = self.tiles.get_mut(&pos) else {
            return Vec::new();
        };
        let removed = tile.clean();
        for thing in &removed {
            self.forget_creature(thing.id(), pos);
        }
        self.check_translucent_light(pos);
        self.notify_tile_update(pos, removed.iter().any(Thing::is_creature));
        removed
    }

    pub fn creature_position(&self, id: ThingId) -> Option<Position> {
        self.creatures.get(&id).copied()
    }

    pub fn creature(&self, id: ThingId) -> Option<&Thing> {
        let pos = self.creature_position(id)?;
        self.tile(pos)?.thing_by_id(id)
    }

    pub(crate) fn creature_mut(&mut self, id: ThingId) -> Option<&mut Thing> {
        let pos = self.creature_position(id)?;
        self.tiles.get_mut(&pos)?.thing_by_id_mut(id)
    }

    pub fn creature_ids(&self) -> impl Iterator<Item = ThingId> + '_ {
        self.creatures.keys().copied()
    }

    fn forget_creature(&mut self, id: ThingId, pos: Position) {
        if self.creatures.get(&id) == Some(&pos) {
            self.creatures.remove(&id);
        }
    }

    pub fn notify_tile_update(&mut self, pos: Position, creature: bool) {
        self.tile_updates.push(TileUpdate {
            position: pos,
            creature,
        });
    }

    /// Tiles whose rendering state changed since the last call.
    pub fn take_tile_updates(&mut self) -> Vec<TileUpdate> {
        std::mem::take(&mut self.tile_updates)
    }

    /// Marks the tile under a sea-floor tile when light passes through.
    pub fn check_translucent_light(&mut self, pos: Position) {
        if pos.z != SEA_FLOOR {
            return;
        }
        let Some(down) = pos.down() else {
            return;
        };
        let passes = self.tile(pos).is_some_and(Tile::passes_light_below);
        if !passes && self.tile(down).is_none() {
            return;
        }
        if let Some(below) = self.get_or_create_tile(down) {
            below.set_flag(TileStateFlags::TRANSLUCENT_LIGHT, passes);
            trace!(position = %down, passes, "translucent_light_checked");
        }
    }

    /// True when some floor between `pos` and `first_floor` hides `pos`
    /// behind a fully opaque 2x2 block along the isometric peel. A tile
    /// whose things all fit in one cell only needs the peel tile itself.
    pub fn is_completely_covered(&self, pos: Position, first_floor: u8) -> bool {
        let single = self.tile(pos).map_or(true, Tile::is_single_dimension);
        let mut tile_pos = pos;
        while let Some(next) = tile_pos.covered_up(1) {
            tile_pos = next;
            if tile_pos.z < first_floor {
                break;
            }
            if self.blocks_view_2x2(tile_pos, single) {
                return true;
            }
        }
        false
    }

    fn blocks_view_2x2(&self, anchor: Position, single: bool) -> bool {
        for (dx, dy) in [(0, 0), (-1, 0), (0, -1), (-1, -1)] {
            let Some(tile) = self.tile(anchor.translated(dx, dy)) else {
                return false;
            };
            if !tile.is_fully_opaque() {
                return false;
            }
            if dx == 0 && dy == 0 {
                if tile.has_local_player() {
                    return false;
                }
                if single {
                    return true;
                }
            }
        }
        true
    }

    /// True when a full-ground tile sits somewhere on the peel path above.
    pub fn is_covered(&self, pos: Position, first_floor: u8) -> bool {
        let mut tile_pos = pos;
        while let Some(next) = tile_pos.covered_up(1) {
            tile_pos = next;
            if tile_pos.z < first_floor {
                break;
            }
            if self.tile(tile_pos).is_some_and(Tile::is_full_ground) {
                return true;
            }
        }
        false
    }

    /// Line of sight through `pos`; missing tiles block it.
    pub fn is_look_possible(&self, pos: Position) -> bool {
        self.tile(pos).is_some_and(Tile::is_look_possible)
    }

    /// Recomputes and caches the cover verdicts of the tile at `pos`.
    pub fn refresh_cover(&mut self, pos: Position, first_floor: u8) -> bool {
        if !self.tiles.contains_key(&pos) {
            return false;
        }
        let completely = self.is_completely_covered(pos, first_floor);
        let covered = completely || self.is_covered(pos, first_floor);
        if let Some(tile) = self.tiles.get_mut(&pos) {
            tile.set_cover(completely, covered);
        }
        completely
    }

    /// Border and shadow precomputation for a tile entering the visible set.
    pub fn on_add_visible_tile(&mut self, pos: Position, camera_z: u8, upside_shadowing: bool) {
        let Some(tile) = self.tile(pos) else {
            return;
        };
        let shade = upside_shadowing
            && tile.is_walkable(true)
            && i32::from(pos.z) == i32::from(camera_z) - 1;
        let is_border = tile.positions_around().iter().any(|around| {
            self.tile(*around)
                .map_or(true, |other| !other.is_fully_opaque() && other.is_walkable(true))
        });
        let shadow = (is_border && shade).then(tile_shadowing_color);
        if let Some(tile) = self.tiles.get_mut(&pos) {
            tile.set_border(is_border, shadow);
        }
    }

    /// Top creature at `pos`, optionally looking at neighbors for a creature
    /// that just left `pos` and is still early in its step.
    pub fn top_creature(&self, pos: Position, check_around: bool) -> Option<ThingId> {
        let tile = self.tile(pos);
        if let Some(id) = tile.and_then(Tile::top_creature) {
            return Some(id);
        }
        if !check_around {
            return None;
        }

        for around in pos.neighbors() {
            let Some(neighbor) = self.tile(around) else {
                continue;
            };
            let leaving = neighbor.creatures().find(|thing| {
                thing
                    .as_creature()
                    .and_then(|creature| creature.walk.as_ref())
                    .is_some_and(|walk| {
                        walk.from == pos && walk.progress() < CHECK_AROUND_PROGRESS
                    })
            });
            if let Some(thing) = leaving {
                return Some(thing.id());
            }
        }
        None
    }

    /// Creatures around `center` within the given extents. Multi-floor
    /// queries cover the surface floors from above ground, or a few floors
    /// around the center when underground.
    pub fn spectators_in_range(
        &self,
        center: Position,
        multi_floor: bool,
        min_x: i32,
        max_x: i32,
        min_y: i32,
        max_y: i32,
    ) -> Vec<ThingId> {
        let (min_z, max_z) = if !multi_floor {
            (center.z, center.z)
        } else if center.z > SEA_FLOOR {
            (
                center.z.saturating_sub(AWARE_UNDERGROUND_FLOOR_RANGE),
                (center.z + AWARE_UNDERGROUND_FLOOR_RANGE).min(MAX_Z),
            )
        } else {
            (0, SEA_FLOOR)
        };

        let mut found: Vec<ThingId> = self
            .creatures
            .iter()
            .filter(|(_, pos)| {
                (min_z..=max_z).contains(&pos.z)
                    && center.is_in_range(**pos, min_x, max_x, min_y, max_y, true)
            })
            .map(|(id, _)| *id)
            .collect();
        found.sort();
        found
    }

    /// Starts moving creature `id` one step to `to`.
    ///
    /// The creature moves to `to` in the stack immediately and leaves a
    /// transit record on the tile it is drawn on until the step completes.
    pub fn begin_walk(&mut self, id: ThingId, to: Position, duration_ms: u32, now_ms: u64) -> bool {
        let Some(from) = self.creature_position(id) else {
            return false;
        };
        let Some(direction) = from.direction_to(to) else {
            return false;
        };
        if !to.is_valid() {
            return false;
        }
        self.finish_walk(id);

        let Some(mut creature) = self.remove_thing(from, id) else {
            return false;
        };
        let walk = WalkState {
            from,
            to,
            direction,
            elapsed_ms: 0,
            duration_ms,
        };
        if let Some(state) = creature.as_creature_mut() {
            state.direction = direction;
            state.walk = Some(walk);
        }
        let light = creature.light();
        if let Some(lost) = self.add_thing(to, creature, StackPos::Auto, now_ms) {
            warn!(thing = %lost.id(), position = %to, "walk_destination_overflow");
        }

        if let Some(tile) = self.get_or_create_tile(from) {
            tile.add_walking_creature(WalkingCreature {
                id,
                light,
                offset: walk.offset_from(from),
            });
        }
        self.walking.push(id);
        self.notify_tile_update(from, true);
        trace!(thing = %id, from = %from, to = %to, duration_ms, "walk_started");
        true
    }

    /// Advances every step in progress. Returns creatures whose step ended.
    pub fn advance_walks(&mut self, elapsed_ms: u32) -> Vec<ThingId> {
        let mut finished = Vec::new();
        for id in self.walking.clone() {
            let Some(walk) = self.step_walk(id, elapsed_ms) else {
                finished.push(id);
                continue;
            };
            if walk.progress() >= 1.0 {
                self.finish_walk(id);
                finished.push(id);
            }
        }
        self.walking.retain(|id| !finished.contains(id));
        finished
    }

    fn step_walk(&mut self, id: ThingId, elapsed_ms: u32) -> Option<WalkState> {
        let creature = self.creature_mut(id)?.as_creature_mut()?;
        let walk = creature.walk.as_mut()?;
        let before = walk.visual_position();
        walk.elapsed_ms = walk.elapsed_ms.saturating_add(elapsed_ms).min(walk.duration_ms);
        let walk = *walk;
        let after = walk.visual_position();
        let light = creature.light;

        if before != after {
            let record = self
                .tile_mut(before)
                .and_then(|tile| tile.remove_walking_creature(id));
            let light = record.map_or(light, |record| record.light);
            if let Some(tile) = self.get_or_create_tile(after) {
                tile.add_walking_creature(WalkingCreature {
                    id,
                    light,
                    offset: walk.offset_from(after),
                });
            }
            self.erase_if_empty(before);
            self.notify_tile_update(before, true);
        } else if let Some(tile) = self.tile_mut(after) {
            tile.update_walking_offset(id, walk.offset_from(after));
        }
        self.notify_tile_update(after, before != after);
        Some(walk)
    }

    /// Ends the step of `id` at once. Returns false when it was not walking.
    pub fn finish_walk(&mut self, id: ThingId) -> bool {
        let Some(walk) = self
            .creature_mut(id)
            .and_then(Thing::as_creature_mut)
            .and_then(|creature| creature.walk.take())
        else {
            return false;
        };

        for pos in [walk.from, walk.to] {
            if let Some(tile) = self.tile_mut(pos) {
                if tile.remove_walking_creature(id).is_some() {
                    self.erase_if_empty(pos);
                    self.notify_tile_update(pos, true);
                }
            }
        }
        self.walking.retain(|walking| *walking != id);
        trace!(thing = %id, position = %walk.to, "walk_finished");
        true
    }

    pub fn is_walking(&self, id: ThingId) -> bool {
        self.walking.contains(&id)
    }

    fn erase_if_empty(&mut self, pos: Position) {
        if self.tile(pos).is_some_and(Tile::can_erase) {
            self.erase_tile(pos);
        }
    }

    /// Drops the tile at `pos`, cancelling its highlight pulse first.
    fn erase_tile(&mut self, pos: Position) {
        if let Some(mut tile) = self.tiles.remove(&pos) {
            tile.unselect();
            trace!(position = %pos, "tile_erased");
        }
    }

    pub fn add_text(&mut self, text: MapText) {
        self.texts.push(text);
    }

    pub fn texts(&self) -> &[MapText] {
        &self.texts
    }

    /// Drops texts that expired at or before `now_ms`. Returns how many went.
    pub fn expire_texts(&mut self, now_ms: u64) -> usize {
        let before = self.texts.len();
        self.texts.retain(|text| text.expires_at_ms > now_ms);
        before - self.texts.len()
    }

    pub fn clean(&mut self) {
        for tile in self.tiles.values_mut() {
            tile.unselect();
        }
        self.tiles.clear();
        self.creatures.clear();
        self.walking.clear();
        self.texts.clear();
        self.tile_updates.clear();
    }
}
