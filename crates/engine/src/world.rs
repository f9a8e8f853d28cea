use std::collections::{HashMap, VecDeque};

use tracing::{debug, trace, warn};

use crate::config::{ConfigError, ViewConfig};
use crate::frame_cache::FrameLayer;
use crate::geometry::{Direction, Position};
use crate::map::{Map, MapText};
use crate::map_view::{HoverChange, MapView};
use crate::render::{draw_map_view, DrawStats, MapRenderer};
use crate::scheduler::{Scheduler, TimerHandle};
use crate::thing::{Thing, ThingId, ThingIdAllocator};
use crate::tile::{StackPos, Tile, DEFAULT_GROUND_SPEED, HIGHLIGHT_PULSE_MS};

/// Delay before a blocked walk tries its next step again.
pub const WALK_RETRY_MS: u64 = 1000;

/// Deferred work owned by the world's timer queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldTimer {
    RemoveEffect { position: Position, id: ThingId },
    HighlightPulse(Position),
    ContinueWalk(ThingId),
    ExpireTexts,
}

#[derive(Debug)]
struct WalkQueue {
    steps: VecDeque<Direction>,
    step_ms: u32,
    retried: bool,
    pending: Option<TimerHandle>,
}

/// The map, its view and the timers that animate them, advanced by a
/// millisecond clock.
#[derive(Debug)]
pub struct World {
    map: Map,
    view: MapView,
    scheduler: Scheduler<WorldTimer>,
    clock_ms: u64,
    ids: ThingIdAllocator,
    walks: HashMap<ThingId, WalkQueue>,
}

impl World {
    pub fn new(config: &ViewConfig) -> Result<Self, ConfigError> {
        let mut map = Map::new(config.client_version);
        let mut view = MapView::new(map.aware_range());
        config.apply(&mut view, &mut map)?;
        Ok(Self {
            map,
            view,
            scheduler: Scheduler::new(),
            clock_ms: 0,
            ids: ThingIdAllocator::new(),
            walks: HashMap::new(),
        })
    }

    pub fn map(&self) -> &Map {
        &self.map
    }

    pub fn view(&self) -> &MapView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut MapView {
        &mut self.view
    }

    /// Both halves at once, for view calls that read the map.
    pub fn parts_mut(&mut self) -> (&mut Map, &mut MapView) {
        (&mut self.map, &mut self.view)
    }

    pub fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn allocate_id(&mut self) -> ThingId {
        self.ids.allocate()
    }

    /// Places `thing` at `pos`. Effects get their removal timer, creatures
    /// join the view's creature list when in range.
    pub fn add_thing(&mut self, pos: Position, thing: Thing, stack_pos: StackPos) -> Option<Thing> {
        let id = thing.id();
        let is_creature = thing.is_creature();
        let lost = self.map.add_thing(pos, thing, stack_pos, self.clock_ms);
        if lost.as_ref().is_some_and(|lost| lost.id() == id) {
            return lost;
        }

        let lifetime = self
            .map
            .tile(pos)
            .and_then(|tile| tile.thing_by_id(id))
            .and_then(Thing::as_effect)
            .map(|effect| effect.lifetime_ms());
        if let Some(lifetime) = lifetime {
            self.scheduler.schedule(
                self.clock_ms,
                lifetime,
                WorldTimer::RemoveEffect { position: pos, id },
            );
        }
        if is_creature {
            self.view.add_visible_creature(&self.map, id);
        }
        if let Some(evicted) = &lost {
            self.forget(evicted.id());
        }
        self.sync_tile_updates();
        lost
    }

    pub fn remove_thing(&mut self, pos: Position, id: ThingId) -> Option<Thing> {
        let removed = self.map.remove_thing(pos, id)?;
        self.forget(id);
        self.sync_tile_updates();
        Some(removed)
    }

    pub fn move_thing(
        &mut self,
        from: Position,
        id: ThingId,
        to: Position,
        stack_pos: StackPos,
    ) -> bool {
        let moved = self.map.move_thing(from, id, to, stack_pos, self.clock_ms);
        if moved && self.view.followed_creature() == Some(id) {
            self.view.on_camera_move(&self.map);
        }
        self.sync_tile_updates();
        moved
    }

    pub fn add_text(
        &mut self,
        position: Position,
        text: impl Into<String>,
        animated: bool,
        duration_ms: u64,
    ) {
        self.map.add_text(MapText {
            position,
            text: text.into(),
            animated,
            expires_at_ms: self.clock_ms.saturating_add(duration_ms),
        });
        self.scheduler.schedule(self.clock_ms, duration_ms, WorldTimer::ExpireTexts);
        let layer = if animated {
            FrameLayer::DynamicText
        } else {
            FrameLayer::StaticText
        };
        self.view.frame_cache_mut().update(layer);
    }

    /// Queues `steps` for creature `id`, replacing any queued path. The
    /// first step starts at once unless a step is still animating.
    pub fn queue_walk(
        &mut self,
        id: ThingId,
        steps: impl IntoIterator<Item = Direction>,
        step_ms: u32,
    ) -> bool {
        if self.map.creature_position(id).is_none() {
            return false;
        }
        if let Some(previous) = self.walks.remove(&id) {
            if let Some(pending) = previous.pending {
                pending.cancel();
            }
        }
        self.walks.insert(
            id,
            WalkQueue {
                steps: steps.into_iter().collect(),
                step_ms,
                retried: false,
                pending: None,
            },
        );
        if !self.map.is_walking(id) {
            self.continue_walk(id);
        }
        true
    }

    /// Drops the queued path of `id`. The step in progress completes.
    pub fn stop_walk(&mut self, id: ThingId) {
        if let Some(queue) = self.walks.remove(&id) {
            if let Some(pending) = queue.pending {
                pending.cancel();
            }
        }
    }

    pub fn queued_steps(&self, id: ThingId) -> usize {
        self.walks.get(&id).map_or(0, |queue| queue.steps.len())
    }

    /// Starts one step of `id` toward `direction`. The step takes
    /// `step_ms` scaled by the ground speed of the departure tile.
    pub fn walk(&mut self, id: ThingId, direction: Direction, step_ms: u32) -> bool {
        let Some(from) = self.map.creature_position(id) else {
            return false;
        };
        let to = from.translated_to_direction(direction);
        if !self
            .map
            .tile(to)
            .is_some_and(|tile| tile.is_walkable(false))
        {
            trace!(thing = %id, position = %to, "walk_blocked");
            return false;
        }

        let ground_speed = match self.map.tile(from).map(Tile::ground_speed) {
            Some(speed) if speed > 0 => speed,
            _ => DEFAULT_GROUND_SPEED,
        };
        let duration = u64::from(step_ms) * u64::from(ground_speed) / 100;
        let duration = u32::try_from(duration).unwrap_or(u32::MAX);
        if !self.map.begin_walk(id, to, duration, self.clock_ms) {
            return false;
        }
        if self.view.followed_creature() == Some(id) {
            self.view.on_camera_move(&self.map);
        }
        self.sync_tile_updates();
        true
    }

    /// Moves the clock forward, animates walks and runs due timers.
    /// Returns how many timers fired.
    pub fn advance(&mut self, elapsed_ms: u64) -> usize {
        self.clock_ms = self.clock_ms.saturating_add(elapsed_ms);
        let elapsed = u32::try_from(elapsed_ms).unwrap_or(u32::MAX);

        let followed = self.view.followed_creature();
        let followed_walking = followed.is_some_and(|id| self.map.is_walking(id));
        let finished = self.map.advance_walks(elapsed);
        if followed_walking {
            self.view.on_camera_move(&self.map);
        }
        for id in finished {
            if self.walks.contains_key(&id) {
                let handle = self
                    .scheduler
                    .schedule(self.clock_ms, 0, WorldTimer::ContinueWalk(id));
                if let Some(queue) = self.walks.get_mut(&id) {
                    queue.pending = Some(handle);
                }
            }
        }

        let mut fired = 0;
        while let Some(timer) = self.scheduler.pop_due(self.clock_ms) {
            self.fire(timer);
            fired += 1;
        }

        self.sync_tile_updates();
        self.apply_hover_change();
        fired
    }

    /// Hovers `position`, or nothing, and switches the highlight pulse.
    pub fn on_mouse_move(&mut self, position: Option<Position>) {
        self.view.on_mouse_move(position);
        self.apply_hover_change();
    }

    pub fn draw<R: MapRenderer>(&mut self, renderer: &mut R) -> DrawStats {
        self.sync_tile_updates();
        let stats = draw_map_view(&mut self.view, &mut self.map, renderer, self.clock_ms);
        // a rebuild can re-anchor the hover
        self.apply_hover_change();
        stats
    }

    fn fire(&mut self, timer: WorldTimer) {
        trace!(?timer, now_ms = self.clock_ms, "world_timer_fired");
        match timer {
            WorldTimer::RemoveEffect { position, id } => {
                if self.map.remove_thing(position, id).is_none() {
                    debug!(thing = %id, position = %position, "effect_already_removed");
                }
            }
            WorldTimer::HighlightPulse(position) => {
                if let Some(tile) = self.map.tile_mut(position) {
                    tile.step_highlight();
                    self.view.frame_cache_mut().update(FrameLayer::Tile);
                }
            }
            WorldTimer::ContinueWalk(id) => self.continue_walk(id),
            WorldTimer::ExpireTexts => {
                if self.map.expire_texts(self.clock_ms) > 0 {
                    let cache = self.view.frame_cache_mut();
                    cache.update(FrameLayer::StaticText);
                    cache.update(FrameLayer::DynamicText);
                }
            }
        }
    }

    fn continue_walk(&mut self, id: ThingId) {
        let Some(queue) = self.walks.get_mut(&id) else {
            return;
        };
        queue.pending = None;
        let Some(direction) = queue.steps.front().copied() else {
            self.walks.remove(&id);
            return;
        };
        let step_ms = queue.step_ms;

        if self.walk(id, direction, step_ms) {
            if let Some(queue) = self.walks.get_mut(&id) {
                queue.steps.pop_front();
                queue.retried = false;
            }
            return;
        }

        let Some(queue) = self.walks.get_mut(&id) else {
            return;
        };
        if queue.retried || self.map.creature_position(id).is_none() {
            warn!(thing = %id, remaining = queue.steps.len(), "walk_abandoned");
            self.walks.remove(&id);
            return;
        }
        queue.retried = true;
        queue.pending = Some(self.scheduler.schedule(
            self.clock_ms,
            WALK_RETRY_MS,
            WorldTimer::ContinueWalk(id),
        ));
        debug!(thing = %id, retry_in_ms = WALK_RETRY_MS, "walk_retry_scheduled");
    }

    fn forget(&mut self, id: ThingId) {
        self.view.remove_visible_creature(id);
        self.stop_walk(id);
        if self.view.followed_creature() == Some(id) && self.map.creature_position(id).is_none() {
            warn!(thing = %id, "followed_creature_removed");
        }
    }

    fn sync_tile_updates(&mut self) {
        for update in self.map.take_tile_updates() {
            self.view.on_tile_update(update.position, update.creature);
        }
    }

    fn apply_hover_change(&mut self) {
        let Some(HoverChange { previous, next }) = self.view.take_hover_change() else {
            return;
        };
        if let Some(tile) = previous.and_then(|pos| self.map.tile_mut(pos)) {
            tile.unselect();
        }
        let Some(next) = next else {
            return;
        };
        let Some(tile) = self.map.tile_mut(next) else {
            return;
        };
        let pulse = self.scheduler.schedule_cycle(
            self.clock_ms,
            HIGHLIGHT_PULSE_MS,
            WorldTimer::HighlightPulse(next),
        );
        if tile.select(pulse) {
            trace!(position = %next, "tile_highlighted");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::render::TileDraw;
    use crate::thing::Creature;
    use crate::thing_type::{ThingCategory, ThingFlags, ThingType};

    const ORIGIN: Position = Position::new(100, 100, 7);

    fn world() -> World {
        let mut world = World::new(&ViewConfig::default()).expect("default config");
        world.view_mut().set_camera_position(ORIGIN);
        world
    }

    fn ground(world: &mut World, pos: Position) -> ThingId {
        let id = world.allocate_id();
        let ty = ThingType::new(100, ThingCategory::Item).with_flags(ThingFlags::GROUND);
        world.add_thing(pos, Thing::item(id, Arc::new(ty)), StackPos::Auto);
        id
    }

    fn usable(world: &mut World, pos: Position) -> ThingId {
        let id = world.allocate_id();
        let ty = ThingType::new(200, ThingCategory::Item).with_flags(ThingFlags::USABLE);
        world.add_thing(pos, Thing::item(id, Arc::new(ty)), StackPos::Auto);
        id
    }

    fn creature(world: &mut World, pos: Position) -> ThingId {
        let id = world.allocate_id();
        let ty = Arc::new(ThingType::new(1, ThingCategory::Creature));
        world.add_thing(pos, Thing::creature(id, ty, Creature::new("rat")), StackPos::Auto);
        id
    }

    fn effect(world: &mut World, pos: Position, duration_ms: u32) -> ThingId {
        let id = world.allocate_id();
        let ty = ThingType::new(7, ThingCategory::Effect).with_animation_ms(duration_ms);
        world.add_thing(pos, Thing::effect(id, Arc::new(ty)), StackPos::Auto);
        id
    }

    #[derive(Default)]
    struct Tiles(Vec<Position>);

    impl MapRenderer for Tiles {
        fn begin_floor(&mut self, _floor: u8, _shadow: crate::light::Color) {}

        fn draw_tile(&mut self, tile: &TileDraw) {
            self.0.push(tile.position);
        }

        fn end_floor(&mut self, _floor: u8) {}
    }

    #[test]
    fn effect_is_removed_after_its_animation() {
        let mut world = world();
        ground(&mut world, ORIGIN);
        let id = effect(&mut world, ORIGIN, 400);

        world.advance(399);
        assert!(world.map().tile(ORIGIN).expect("tile").thing_by_id(id).is_some());

        world.advance(1);
        assert!(world.map().tile(ORIGIN).expect("tile").effects().is_empty());
    }

    #[test]
    fn chained_effect_outlives_its_predecessor() {
        let mut world = world();
        ground(&mut world, ORIGIN);
        let first = effect(&mut world, ORIGIN, 1000);
        world.advance(100);
        let second = effect(&mut world, ORIGIN, 1000);

        // waits 600 - 100 = 500 ms, then animates for 1000 ms
        world.advance(900);
        let tile = world.map().tile(ORIGIN).expect("tile");
        assert!(tile.thing_by_id(first).is_none());
        assert!(tile.thing_by_id(second).is_some());

        world.advance(600);
        assert!(world.map().tile(ORIGIN).expect("tile").effects().is_empty());
    }

    #[test]
    fn queued_walk_runs_step_by_step() {
        let mut world = world();
        for dx in 0..3 {
            ground(&mut world, ORIGIN.translated(dx, 0));
        }
        let rat = creature(&mut world, ORIGIN);

        assert!(world.queue_walk(rat, [Direction::East, Direction::East], 200));
        assert_eq!(world.map().creature_position(rat), Some(ORIGIN.translated(1, 0)));
        assert_eq!(world.queued_steps(rat), 1);

        world.advance(200);
        assert_eq!(world.map().creature_position(rat), Some(ORIGIN.translated(2, 0)));
        assert!(world.map().is_walking(rat));

        world.advance(200);
        assert!(!world.map().is_walking(rat));
        assert_eq!(world.queued_steps(rat), 0);
    }

    #[test]
    fn blocked_step_is_retried_later() {
        let mut world = world();
        ground(&mut world, ORIGIN);
        let rat = creature(&mut world, ORIGIN);

        assert!(world.queue_walk(rat, [Direction::North], 200));
        assert_eq!(world.queued_steps(rat), 1);
        assert_eq!(world.pending_timers(), 1);

        ground(&mut world, ORIGIN.translated(0, -1));
        world.advance(WALK_RETRY_MS);
        assert_eq!(world.map().creature_position(rat), Some(ORIGIN.translated(0, -1)));
    }

    #[test]
    fn blocked_step_is_abandoned_after_retry() {
        let mut world = world();
        ground(&mut world, ORIGIN);
        let rat = creature(&mut world, ORIGIN);

        world.queue_walk(rat, [Direction::West], 200);
        world.advance(WALK_RETRY_MS);

        assert_eq!(world.queued_steps(rat), 0);
        assert_eq!(world.map().creature_position(rat), Some(ORIGIN));
    }

    #[test]
    fn hover_pulses_highlight_until_mouse_leaves() {
        let mut world = world();
        ground(&mut world, ORIGIN);
        let target = usable(&mut world, ORIGIN);

        world.on_mouse_move(Some(ORIGIN));
        world.advance(HIGHLIGHT_PULSE_MS * 3);
        let highlight = world.map().tile(ORIGIN).expect("tile").highlight();
        assert!(highlight.is_enabled());
        assert_eq!(highlight.target(), Some(target));
        assert_eq!(highlight.fade_level(), 30);

        world.on_mouse_move(None);
        assert!(!world.map().tile(ORIGIN).expect("tile").highlight().is_enabled());
        assert_eq!(world.pending_timers(), 0);
    }

    #[test]
    fn tile_updates_reach_the_view() {
        let mut world = world();
        ground(&mut world, ORIGIN);
        let mut renderer = Tiles::default();
        world.draw(&mut renderer);
        assert!(!world.view().needs_visible_tiles_update());

        ground(&mut world, ORIGIN.translated(1, 0));
        assert!(world.view().needs_visible_tiles_update());

        let mut renderer = Tiles::default();
        world.draw(&mut renderer);
        assert_eq!(renderer.0, vec![ORIGIN, ORIGIN.translated(1, 0)]);
    }

    #[test]
    fn creatures_walking_across_the_aware_edge_join_and_leave_the_view() {
        let mut world = world();
        let edge = (1..)
            .find(|dx| !world.view().is_in_range(ORIGIN, ORIGIN.translated(*dx, 0), false))
            .expect("aware range is bounded");
        for dx in 0..=edge {
            ground(&mut world, ORIGIN.translated(dx, 0));
        }
        let rat = creature(&mut world, ORIGIN.translated(edge, 0));
        world.draw(&mut Tiles::default());
        assert!(!world.view().visible_creatures().contains(&rat));

        assert!(world.walk(rat, Direction::West, 200));
        world.advance(1000);
        world.draw(&mut Tiles::default());
        assert!(world.view().visible_creatures().contains(&rat));

        assert!(world.walk(rat, Direction::East, 200));
        world.advance(1000);
        world.draw(&mut Tiles::default());
        assert!(!world.view().visible_creatures().contains(&rat));
    }

    #[test]
    fn texts_expire_on_schedule() {
        let mut world = world();
        world.add_text(ORIGIN, "You see a rat.", false, 500);
        world.advance(499);
        assert_eq!(world.map().texts().len(), 1);
        world.advance(1);
        assert!(world.map().texts().is_empty());
    }

    #[test]
    fn removing_a_creature_drops_its_walk() {
        let mut world = world();
        ground(&mut world, ORIGIN);
        ground(&mut world, ORIGIN.translated(1, 0));
        let rat = creature(&mut world, ORIGIN);
        world.queue_walk(rat, [Direction::East, Direction::East], 200);

        let pos = world.map().creature_position(rat).expect("position");
        assert!(world.remove_thing(pos, rat).is_some());
        assert_eq!(world.queued_steps(rat), 0);
        assert!(!world.view().visible_creatures().contains(&rat));
    }
}
