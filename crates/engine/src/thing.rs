use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::geometry::{Direction, Point, Position};
use crate::light::Light;
use crate::thing_type::{ThingCategory, ThingFlags, ThingType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThingId(pub u64);

impl std::fmt::Display for ThingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct ThingIdAllocator {
    next: u64,
}

impl ThingIdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> ThingId {
        let id = ThingId(self.next.max(1));
        self.next = id.0.saturating_add(1);
        id
    }
}

/// Ordering tier inside a tile stack. Lower tiers sit closer to the ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StackClass {
    Ground = 0,
    GroundBorder = 1,
    OnBottom = 2,
    OnTop = 3,
    Creature = 4,
    Common = 5,
}

impl StackClass {
    pub fn priority(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemState {
    pub action_id: u16,
    pub count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkState {
    pub from: Position,
    pub to: Position,
    pub direction: Direction,
    pub elapsed_ms: u32,
    pub duration_ms: u32,
}

impl WalkState {
    pub fn progress(&self) -> f32 {
        if self.duration_ms == 0 {
            return 1.0;
        }
        (self.elapsed_ms as f32 / self.duration_ms as f32).min(1.0)
    }

    /// Tile the creature is drawn on: the departure tile for the first half.
    pub fn visual_position(&self) -> Position {
        if self.progress() < 0.5 {
            self.from
        } else {
            self.to
        }
    }

    /// Pixel offset of the creature relative to `tile`, unscaled.
    pub fn offset_from(&self, tile: Position) -> Point {
        let progress = self.progress();
        let x = self.from.x as f32 + (self.to.x - self.from.x) as f32 * progress;
        let y = self.from.y as f32 + (self.to.y - self.from.y) as f32 * progress;
        Point::new(
            ((x - tile.x as f32) * crate::geometry::TILE_PIXELS as f32).round() as i32,
            ((y - tile.y as f32) * crate::geometry::TILE_PIXELS as f32).round() as i32,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Creature {
    pub name: String,
    pub local_player: bool,
    pub passable: bool,
    pub visible: bool,
    pub light: Light,
    pub direction: Direction,
    pub walk: Option<WalkState>,
}

impl Creature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local_player: false,
            passable: false,
            visible: true,
            light: Light::default(),
            direction: Direction::South,
            walk: None,
        }
    }

    pub fn local_player(mut self) -> Self {
        self.local_player = true;
        self
    }

    pub fn with_light(mut self, light: Light) -> Self {
        self.light = light;
        self
    }

    pub fn passable(mut self, passable: bool) -> Self {
        self.passable = passable;
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Effect {
    pub top: bool,
    pub duration_ms: u32,
    /// Milliseconds after appearing before the effect is drawn. Negative
    /// when a chained effect already overlaps its predecessor.
    pub start_delay_ms: i64,
    pub started_at_ms: Option<u64>,
}

impl Effect {
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        self.started_at_ms
            .map(|started| now_ms.saturating_sub(started))
            .unwrap_or(0)
    }

    pub fn is_drawing(&self, now_ms: u64) -> bool {
        self.started_at_ms.is_some() && self.elapsed_ms(now_ms) as i64 >= self.start_delay_ms
    }

    /// Lifetime on the tile: the delay (when positive) plus one animation run.
    pub fn lifetime_ms(&self) -> u64 {
        self.start_delay_ms.max(0) as u64 + u64::from(self.duration_ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThingKind {
    Item(ItemState),
    Creature(Creature),
    Effect(Effect),
}

/// Anything that can sit on a tile. Owned by exactly one tile at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct Thing {
    id: ThingId,
    ty: Arc<ThingType>,
    kind: ThingKind,
    position: Option<Position>,
}

impl Thing {
    pub fn item(id: ThingId, ty: Arc<ThingType>) -> Self {
        Self {
            id,
            ty,
            kind: ThingKind::Item(ItemState::default()),
            position: None,
        }
    }

    pub fn creature(id: ThingId, ty: Arc<ThingType>, creature: Creature) -> Self {
        Self {
            id,
            ty,
            kind: ThingKind::Creature(creature),
            position: None,
        }
    }

    pub fn effect(id: ThingId, ty: Arc<ThingType>) -> Self {
        let effect = Effect {
            top: ty.has(ThingFlags::TOP_EFFECT),
            duration_ms: ty.animation_ms,
            start_delay_ms: 0,
            started_at_ms: None,
        };
        Self {
            id,
            ty,
            kind: ThingKind::Effect(effect),
            position: None,
        }
    }

    pub fn with_action_id(mut self, action_id: u16) -> Self {
        if let ThingKind::Item(state) = &mut self.kind {
            state.action_id = action_id;
        }
        self
    }

    pub fn id(&self) -> ThingId {
        self.id
    }

    pub fn thing_type(&self) -> &ThingType {
        &self.ty
    }

    /// Appearance id shared with other things of the same type.
    pub fn type_id(&self) -> u16 {
        self.ty.id
    }

    pub fn kind(&self) -> &ThingKind {
        &self.kind
    }

    pub fn position(&self) -> Option<Position> {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: Option<Position>) {
        self.position = position;
    }

    pub fn as_creature(&self) -> Option<&Creature> {
        match &self.kind {
            ThingKind::Creature(creature) => Some(creature),
            _ => None,
        }
    }

    pub fn as_creature_mut(&mut self) -> Option<&mut Creature> {
        match &mut self.kind {
            ThingKind::Creature(creature) => Some(creature),
            _ => None,
        }
    }

    pub fn as_effect(&self) -> Option<&Effect> {
        match &self.kind {
            ThingKind::Effect(effect) => Some(effect),
            _ => None,
        }
    }

    pub(crate) fn as_effect_mut(&mut self) -> Option<&mut Effect> {
        match &mut self.kind {
            ThingKind::Effect(effect) => Some(effect),
            _ => None,
        }
    }

    /// Effects never enter the stack; they report the common tier.
    pub fn stack_class(&self) -> StackClass {
        match &self.kind {
            ThingKind::Creature(_) => StackClass::Creature,
            ThingKind::Effect(_) => StackClass::Common,
            ThingKind::Item(_) => {
                if self.ty.has(ThingFlags::GROUND) {
                    StackClass::Ground
                } else if self.ty.has(ThingFlags::GROUND_BORDER) {
                    StackClass::GroundBorder
                } else if self.ty.has(ThingFlags::ON_BOTTOM) {
                    StackClass::OnBottom
                } else if self.ty.has(ThingFlags::ON_TOP) {
                    StackClass::OnTop
                } else {
                    StackClass::Common
                }
            }
        }
    }

    pub fn stack_priority(&self) -> u8 {
        self.stack_class().priority()
    }

    pub fn is_item(&self) -> bool {
        matches!(self.kind, ThingKind::Item(_))
    }

    pub fn is_creature(&self) -> bool {
        matches!(self.kind, ThingKind::Creature(_))
    }

    pub fn is_effect(&self) -> bool {
        matches!(self.kind, ThingKind::Effect(_))
    }

    pub fn is_local_player(&self) -> bool {
        self.as_creature().is_some_and(|creature| creature.local_player)
    }

    pub fn is_walking(&self) -> bool {
        self.as_creature().is_some_and(|creature| creature.walk.is_some())
    }

    fn item_has(&self, flag: ThingFlags) -> bool {
        self.is_item() && self.ty.has(flag)
    }

    pub fn is_ground(&self) -> bool {
        self.item_has(ThingFlags::GROUND)
    }

    pub fn is_ground_border(&self) -> bool {
        self.item_has(ThingFlags::GROUND_BORDER)
    }

    pub fn is_on_bottom(&self) -> bool {
        self.item_has(ThingFlags::ON_BOTTOM)
    }

    pub fn is_on_top(&self) -> bool {
        self.item_has(ThingFlags::ON_TOP)
    }

    pub fn is_common(&self) -> bool {
        self.is_item() && self.stack_class() == StackClass::Common
    }

    pub fn is_ground_or_border(&self) -> bool {
        self.is_ground() || self.is_ground_border()
    }

    pub fn is_not_walkable(&self) -> bool {
        self.item_has(ThingFlags::NOT_WALKABLE)
    }

    pub fn is_not_pathable(&self) -> bool {
        self.item_has(ThingFlags::NOT_PATHABLE)
    }

    pub fn is_not_moveable(&self) -> bool {
        self.item_has(ThingFlags::NOT_MOVEABLE)
    }

    pub fn blocks_projectile(&self) -> bool {
        self.item_has(ThingFlags::BLOCK_PROJECTILE)
    }

    pub fn is_full_ground(&self) -> bool {
        self.item_has(ThingFlags::FULL_GROUND)
    }

    pub fn is_opaque(&self) -> bool {
        self.item_has(ThingFlags::OPAQUE)
    }

    pub fn is_top_ground(&self) -> bool {
        self.item_has(ThingFlags::TOP_GROUND)
    }

    pub fn has_no_walkable_edge(&self) -> bool {
        self.item_has(ThingFlags::NO_WALKABLE_EDGE)
    }

    pub fn is_hook_south(&self) -> bool {
        self.item_has(ThingFlags::HOOK_SOUTH)
    }

    pub fn is_hook_east(&self) -> bool {
        self.item_has(ThingFlags::HOOK_EAST)
    }

    pub fn is_translucent(&self) -> bool {
        self.item_has(ThingFlags::TRANSLUCENT)
    }

    pub fn has_lens_help(&self) -> bool {
        self.item_has(ThingFlags::LENS_HELP)
    }

    pub fn is_ignore_look(&self) -> bool {
        self.ty.has(ThingFlags::IGNORE_LOOK)
    }

    pub fn is_force_use(&self) -> bool {
        self.item_has(ThingFlags::FORCE_USE)
    }

    pub fn is_usable(&self) -> bool {
        self.item_has(ThingFlags::USABLE)
    }

    pub fn is_container(&self) -> bool {
        self.item_has(ThingFlags::CONTAINER)
    }

    pub fn is_splash(&self) -> bool {
        self.item_has(ThingFlags::SPLASH)
    }

    pub fn is_lying_corpse(&self) -> bool {
        self.item_has(ThingFlags::LYING_CORPSE)
    }

    pub fn action_id(&self) -> u16 {
        match &self.kind {
            ThingKind::Item(state) => state.action_id,
            _ => 0,
        }
    }

    pub fn has_action(&self) -> bool {
        self.action_id() > 0
    }

    pub fn can_draw(&self) -> bool {
        self.ty.sprite_count > 0
            && self
                .as_creature()
                .map_or(true, |creature| creature.visible)
    }

    pub fn light(&self) -> Light {
        match &self.kind {
            ThingKind::Creature(creature) if creature.light.is_lit() => creature.light,
            _ => self.ty.light,
        }
    }

    pub fn has_light(&self) -> bool {
        self.light().is_lit()
    }

    pub fn has_displacement(&self) -> bool {
        self.ty.displacement != Point::default()
    }

    pub fn displacement(&self) -> Point {
        self.ty.displacement
    }

    pub fn has_elevation(&self) -> bool {
        self.is_item() && self.ty.elevation > 0
    }

    pub fn elevation(&self) -> i32 {
        if self.is_item() {
            i32::from(self.ty.elevation)
        } else {
            0
        }
    }

    pub fn width(&self) -> u8 {
        self.ty.width
    }

    pub fn height(&self) -> u8 {
        self.ty.height
    }

    pub fn is_single_dimension(&self) -> bool {
        self.ty.is_single_dimension()
    }

    pub fn minimap_color(&self) -> u8 {
        self.ty.minimap_color
    }

    pub fn ground_speed(&self) -> u16 {
        self.ty.ground_speed
    }

    pub fn category(&self) -> ThingCategory {
        self.ty.category
    }
}
