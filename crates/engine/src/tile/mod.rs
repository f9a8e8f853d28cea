mod count_flags;
mod highlight;
mod queries;

use bitflags::bitflags;
use tracing::trace;

use crate::geometry::{Point, Position, SEA_FLOOR};
use crate::light::{Color, Light};
use crate::scheduler::TimerHandle;
use crate::thing::{Thing, ThingId};

pub use count_flags::CountFlags;
pub use highlight::{
    Highlight, HighlightDescriptor, HIGHLIGHT_FADE_CEILING, HIGHLIGHT_FADE_STEP,
    HIGHLIGHT_PULSE_MS,
};
pub use queries::DEFAULT_GROUND_SPEED;

/// Maximum number of things kept in a tile stack.
pub const MAX_THINGS: usize = 10;
/// Protocol version from which creatures are stored oldest-first.
pub const CREATURE_ORDER_PROTOCOL: u16 = 854;
/// Share of a prior effect's duration a chained effect waits for.
pub const EFFECT_CHAIN_FACTOR: f64 = 0.6;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TileStateFlags: u32 {
        const PROTECTION_ZONE = 1 << 0;
        const NO_PVP = 1 << 1;
        const NO_LOGOUT = 1 << 2;
        const HARDCORE_ZONE = 1 << 3;
        const REFRESH = 1 << 4;
        const HOUSE = 1 << 5;
        const TRANSLUCENT_LIGHT = 1 << 6;
    }
}

/// Where to put a thing in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPos {
    /// Find the slot from the thing's stack class.
    Auto,
    /// After every thing of the same or lower class.
    Append,
    /// Exact slot; indexes past the end append.
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileContext {
    pub client_version: u16,
    pub now_ms: u64,
}

/// Transit record for a creature drawn on this tile while its logical tile is
/// elsewhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkingCreature {
    pub id: ThingId,
    pub light: Light,
    /// Pixel offset from this tile's origin, unscaled.
    pub offset: Point,
}

#[derive(Debug)]
pub struct Tile {
    position: Position,
    things: Vec<Thing>,
    effects: Vec<Thing>,
    walking: Vec<WalkingCreature>,
    count_flags: CountFlags,
    highlight: Highlight,
    positions_around: [Position; 8],
    completely_covered: bool,
    covered: bool,
    is_border: bool,
    border_shadow_color: Option<Color>,
    flags: TileStateFlags,
    minimap_color: u8,
    house_id: u32,
}

impl Tile {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            things: Vec::new(),
            effects: Vec::new(),
            walking: Vec::new(),
            count_flags: CountFlags::default(),
            highlight: Highlight::default(),
            positions_around: position.neighbors(),
            completely_covered: false,
            covered: false,
            is_border: false,
            border_shadow_color: None,
            flags: TileStateFlags::empty(),
            minimap_color: 0,
            house_id: 0,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn things(&self) -> &[Thing] {
        &self.things
    }

    pub fn effects(&self) -> &[Thing] {
        &self.effects
    }

    pub fn walking_creatures(&self) -> &[WalkingCreature] {
        &self.walking
    }

    pub fn count_flags(&self) -> &CountFlags {
        &self.count_flags
    }

    pub fn highlight(&self) -> &Highlight {
        &self.highlight
    }

    pub fn positions_around(&self) -> &[Position; 8] {
        &self.positions_around
    }

    /// Inserts `thing` and returns whatever the depth limit pushed out.
    ///
    /// Effects go to the separate effect list. Stack things are placed by
    /// `stack_pos`, counters and the highlight target are refreshed, and the
    /// thing at index [`MAX_THINGS`] is evicted when the stack overflows.
    pub fn add_thing(
        &mut self,
        mut thing: Thing,
        stack_pos: StackPos,
        ctx: &TileContext,
    ) -> Option<Thing> {
        thing.set_position(Some(self.position));

        if thing.is_effect() {
            self.add_effect(thing, ctx.now_ms);
            return None;
        }

        let index = self.insertion_index(&thing, stack_pos, ctx.client_version);
        trace!(
            position = %self.position,
            thing = %thing.id(),
            index,
            "tile_thing_added"
        );
        self.count_flags.add(&thing);
        self.things.insert(index, thing);
        self.check_for_detachable_thing();

        if self.things.len() > MAX_THINGS {
            let evicted_id = self.things[MAX_THINGS].id();
            return self.remove_thing(evicted_id);
        }
        None
    }

    fn add_effect(&mut self, mut effect: Thing, now_ms: u64) {
        let type_id = effect.type_id();
        let chained_delay = self
            .effects
            .iter()
            .rev()
            .filter(|prior| prior.type_id() == type_id)
            .find_map(|prior| prior.as_effect())
            .map(|prior| {
                let wait = f64::from(prior.duration_ms) * EFFECT_CHAIN_FACTOR;
                wait as i64 - prior.elapsed_ms(now_ms) as i64
            });

        let top = match effect.as_effect_mut() {
            Some(state) => {
                if let Some(delay) = chained_delay {
                    state.start_delay_ms = delay;
                }
                state.started_at_ms = Some(now_ms);
                state.top
            }
            None => false,
        };

        if top {
            self.effects.insert(0, effect);
        } else {
            self.effects.push(effect);
        }
    }

    fn insertion_index(&self, thing: &Thing, stack_pos: StackPos, client_version: u16) -> usize {
        let size = self.things.len();
        let append = match stack_pos {
            StackPos::Index(index) => return index.min(size),
            StackPos::Append => true,
            StackPos::Auto => {
                let priority = thing.stack_priority();
                let append = priority <= 3;
                if client_version >= CREATURE_ORDER_PROTOCOL && priority == 4 {
                    !append
                } else {
                    append
                }
            }
        };

        let priority = thing.stack_priority();
        self.things
            .iter()
            .position(|other| {
                let other = other.stack_priority();
                (append && other > priority) || (!append && other >= priority)
            })
            .unwrap_or(size)
    }

    /// Removes the thing with `id` from the stack or the effect list.
    pub fn remove_thing(&mut self, id: ThingId) -> Option<Thing> {
        if let Some(index) = self.effects.iter().position(|effect| effect.id() == id) {
            let mut effect = self.effects.remove(index);
            effect.set_position(None);
            return Some(effect);
        }

        let index = self.things.iter().position(|thing| thing.id() == id)?;
        let mut thing = self.things.remove(index);
        self.count_flags.remove(&thing);
        self.check_for_detachable_thing();
        thing.set_position(None);
        trace!(position = %self.position, thing = %id, "tile_thing_removed");
        Some(thing)
    }

    pub fn thing(&self, stack_pos: usize) -> Option<&Thing> {
        self.things.get(stack_pos)
    }

    pub fn thing_by_id(&self, id: ThingId) -> Option<&Thing> {
        self.things
            .iter()
            .chain(self.effects.iter())
            .find(|thing| thing.id() == id)
    }

    pub(crate) fn thing_by_id_mut(&mut self, id: ThingId) -> Option<&mut Thing> {
        self.things
            .iter_mut()
            .chain(self.effects.iter_mut())
            .find(|thing| thing.id() == id)
    }

    pub fn thing_stack_pos(&self, id: ThingId) -> Option<usize> {
        self.things.iter().position(|thing| thing.id() == id)
    }

    pub fn has_thing(&self, id: ThingId) -> bool {
        self.thing_stack_pos(id).is_some()
    }

    pub fn clean(&mut self) -> Vec<Thing> {
        let removed: Vec<Thing> = self
            .things
            .drain(..)
            .map(|mut thing| {
                thing.set_position(None);
                thing
            })
            .collect();
        self.count_flags = CountFlags::default();
        self.check_for_detachable_thing();
        removed
    }

    pub fn add_walking_creature(&mut self, walking: WalkingCreature) {
        if let Some(existing) = self.walking.iter_mut().find(|w| w.id == walking.id) {
            *existing = walking;
            return;
        }
        self.walking.push(walking);
    }

    pub fn remove_walking_creature(&mut self, id: ThingId) -> Option<WalkingCreature> {
        let index = self.walking.iter().position(|walking| walking.id == id)?;
        Some(self.walking.remove(index))
    }

    pub(crate) fn update_walking_offset(&mut self, id: ThingId, offset: Point) {
        if let Some(walking) = self.walking.iter_mut().find(|walking| walking.id == id) {
            walking.offset = offset;
        }
    }

    /// Re-picks the highlight target: the first interactive common item,
    /// then bottom items, ground and borders, lens-help top items, and
    /// finally the top creature. Stops the pulse when nothing qualifies.
    pub fn check_for_detachable_thing(&mut self) {
        self.highlight.target = self.detachable_thing();
        if self.highlight.target.is_none() {
            self.highlight.stop();
        }
    }

    fn detachable_thing(&self) -> Option<ThingId> {
        let interactive = |thing: &Thing| {
            thing.has_action()
                || thing.has_lens_help()
                || thing.is_usable()
                || thing.is_force_use()
                || thing.is_container()
        };

        if self.count_flags.has_common_item > 0 {
            let found = self.things.iter().find(|thing| {
                thing.is_common()
                    && thing.can_draw()
                    && (interactive(thing) || !thing.is_not_moveable())
            });
            if let Some(thing) = found {
                return Some(thing.id());
            }
        }

        if self.count_flags.has_bottom_item > 0 {
            let found = self
                .things
                .iter()
                .rev()
                .find(|thing| thing.is_on_bottom() && thing.can_draw() && interactive(thing));
            if let Some(thing) = found {
                return Some(thing.id());
            }
        }

        if self.count_flags.has_ground_or_border > 0 {
            let found = self.things.iter().rev().find(|thing| {
                thing.is_ground_or_border()
                    && thing.can_draw()
                    && (interactive(thing) || thing.is_translucent())
            });
            if let Some(thing) = found {
                return Some(thing.id());
            }
        }

        if self.count_flags.has_top_item > 0 {
            let found = self
                .things
                .iter()
                .rev()
                .take_while(|thing| thing.is_on_top())
                .find(|thing| thing.can_draw() && thing.has_lens_help());
            if let Some(thing) = found {
                return Some(thing.id());
            }
        }

        self.top_creature()
    }

    /// Starts the highlight pulse when there is something to highlight.
    /// Returns false, dropping `pulse`, when the tile has no target.
    pub fn select(&mut self, pulse: TimerHandle) -> bool {
        if self.highlight.target.is_none() {
            pulse.cancel();
            return false;
        }
        self.highlight.start(pulse);
        true
    }

    pub fn unselect(&mut self) {
        self.highlight.stop();
    }

    pub(crate) fn step_highlight(&mut self) {
        self.highlight.step();
    }

    pub fn highlight_descriptor(&self) -> Option<HighlightDescriptor> {
        self.highlight.descriptor()
    }

    pub fn is_completely_covered(&self) -> bool {
        self.completely_covered
    }

    pub fn is_covered(&self) -> bool {
        self.covered
    }

    pub(crate) fn set_cover(&mut self, completely_covered: bool, covered: bool) {
        self.completely_covered = completely_covered;
        self.covered = completely_covered || covered;
    }

    pub fn is_border(&self) -> bool {
        self.is_border
    }

    pub fn border_shadow_color(&self) -> Option<Color> {
        self.border_shadow_color
    }

    pub(crate) fn set_border(&mut self, is_border: bool, shadow: Option<Color>) {
        self.is_border = is_border;
        self.border_shadow_color = shadow;
    }

    pub fn flags(&self) -> TileStateFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: TileStateFlags) {
        self.flags = flags;
    }

    pub fn set_flag(&mut self, flag: TileStateFlags, enabled: bool) {
        self.flags.set(flag, enabled);
    }

    pub fn minimap_color(&self) -> u8 {
        self.minimap_color
    }

    pub fn set_minimap_color(&mut self, color: u8) {
        self.minimap_color = color;
    }

    pub fn house_id(&self) -> u32 {
        self.house_id
    }

    pub fn set_house_id(&mut self, house_id: u32) {
        self.house_id = house_id;
        self.flags.set(TileStateFlags::HOUSE, house_id != 0);
    }

    /// True when something on this tile lets light through to the floor
    /// below. Only meaningful at the sea floor.
    pub fn passes_light_below(&self) -> bool {
        self.position.z == SEA_FLOOR
            && self
                .things
                .iter()
                .any(|thing| thing.is_translucent() || thing.has_lens_help())
    }
}

#[cfg(test)]
mod tests;
