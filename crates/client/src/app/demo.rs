use std::sync::Arc;
use std::time::Duration;

use engine::{
    Creature, Direction, DrawStats, Position, Session, SessionCommand, SessionError, StackPos,
    Thing, ThingId, ThingType, ThingTypeCatalog, World,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::text_renderer::TextRenderer;

const DEMO_THING_TYPES: &str = r#"[
    { "id": 100, "category": "item", "attrs": ["ground"], "ground_speed": 150 },
    { "id": 101, "category": "item", "attrs": ["ground", "full_ground", "opaque"] },
    { "id": 102, "category": "item",
      "attrs": ["on_bottom", "not_walkable", "block_projectile", "not_moveable"] },
    { "id": 103, "category": "item", "light": { "intensity": 6, "color": 206 } },
    { "id": 104, "category": "item", "attrs": ["not_walkable"], "elevation": 8 },
    { "id": 1, "category": "creature" },
    { "id": 7, "category": "effect", "attrs": ["top_effect"], "animation_ms": 600 }
]"#;

const DEMO_LAYOUT: &str = r#"{
    "player": { "name": "Knight", "type_id": 1, "position": { "x": 100, "y": 100, "z": 7 },
                "patrol": ["East", "East", "North", "North", "West", "West", "South", "South"] },
    "creatures": [
        { "name": "Rat", "type_id": 1, "position": { "x": 97, "y": 97, "z": 7 },
          "patrol": ["East", "South", "West", "North"] }
    ],
    "grounds": [
        { "type_id": 100, "x": 95, "y": 95, "z": 7, "width": 11, "height": 11 },
        { "type_id": 101, "x": 101, "y": 97, "z": 6, "width": 4, "height": 4 }
    ],
    "items": [
        { "type_id": 102, "position": { "x": 101, "y": 96, "z": 7 } },
        { "type_id": 102, "position": { "x": 102, "y": 96, "z": 7 } },
        { "type_id": 102, "position": { "x": 103, "y": 96, "z": 7 } },
        { "type_id": 102, "position": { "x": 104, "y": 96, "z": 7 } },
        { "type_id": 103, "position": { "x": 102, "y": 98, "z": 7 } },
        { "type_id": 104, "position": { "x": 98, "y": 101, "z": 7 } }
    ],
    "step_ms": 300,
    "effect_type": 7,
    "effect_interval_ms": 1200,
    "laps": 2
}"#;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DemoLayout {
    pub(crate) player: PlacedCreature,
    #[serde(default)]
    pub(crate) creatures: Vec<PlacedCreature>,
    #[serde(default)]
    pub(crate) grounds: Vec<GroundArea>,
    #[serde(default)]
    pub(crate) items: Vec<PlacedItem>,
    pub(crate) step_ms: u32,
    pub(crate) effect_type: u16,
    pub(crate) effect_interval_ms: u64,
    /// Patrol rounds of the player before the session quits.
    pub(crate) laps: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PlacedCreature {
    pub(crate) name: String,
    pub(crate) type_id: u16,
    pub(crate) position: Position,
    #[serde(default)]
    pub(crate) patrol: Vec<Direction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct GroundArea {
    pub(crate) type_id: u16,
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) z: u8,
    pub(crate) width: i32,
    pub(crate) height: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PlacedItem {
    pub(crate) type_id: u16,
    pub(crate) position: Position,
}

pub(crate) fn parse_layout(raw: &str) -> Result<DemoLayout, SessionError> {
    let deserializer = &mut serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize(deserializer).map_err(|error| {
        let path = error.path().to_string();
        SessionError::Setup(format!(
            "invalid demo layout at {path}: {}",
            error.into_inner()
        ))
    })
}

#[derive(Debug, Clone, Copy)]
struct Patroller {
    id: ThingId,
    patrol_index: usize,
}

/// Scripted walk through a small village: the followed player patrols in
/// and out of a roofed house while a rat wanders nearby, effects pop at the
/// player's feet and the hovered tile follows the player.
pub(crate) struct DemoSession {
    types_raw: &'static str,
    layout_raw: &'static str,
    catalog: ThingTypeCatalog,
    layout: Option<DemoLayout>,
    player: Option<Patroller>,
    walkers: Vec<Patroller>,
    laps_done: u32,
    next_effect_ms: u64,
    renderer: TextRenderer,
    frames: u64,
}

impl DemoSession {
    pub(crate) fn new() -> Self {
        Self::with_sources(DEMO_THING_TYPES, DEMO_LAYOUT)
    }

    pub(crate) fn with_sources(types_raw: &'static str, layout_raw: &'static str) -> Self {
        Self {
            types_raw,
            layout_raw,
            catalog: ThingTypeCatalog::new(),
            layout: None,
            player: None,
            walkers: Vec::new(),
            laps_done: 0,
            next_effect_ms: 0,
            renderer: TextRenderer::new(None),
            frames: 0,
        }
    }

    pub(crate) fn laps_done(&self) -> u32 {
        self.laps_done
    }

    pub(crate) fn player(&self) -> Option<ThingId> {
        self.player.map(|player| player.id)
    }

    pub(crate) fn screen(&self) -> String {
        self.renderer.render()
    }

    fn item_type(&self, id: u16) -> Result<Arc<ThingType>, SessionError> {
        self.catalog
            .item(id)
            .ok_or_else(|| SessionError::Setup(format!("unknown item type {id}")))
    }

    fn place_grounds(&self, layout: &DemoLayout, world: &mut World) -> Result<(), SessionError> {
        for area in &layout.grounds {
            let ty = self.item_type(area.type_id)?;
            for dy in 0..area.height {
                for dx in 0..area.width {
                    let position = Position::new(area.x + dx, area.y + dy, area.z);
                    let thing = Thing::item(world.allocate_id(), Arc::clone(&ty));
                    place(world, position, thing);
                }
            }
        }
        Ok(())
    }

    fn place_items(&self, layout: &DemoLayout, world: &mut World) -> Result<(), SessionError> {
        for placed in &layout.items {
            let ty = self.item_type(placed.type_id)?;
            let thing = Thing::item(world.allocate_id(), ty);
            place(world, placed.position, thing);
        }
        Ok(())
    }

    fn place_creature(
        &self,
        placed: &PlacedCreature,
        local_player: bool,
        world: &mut World,
    ) -> Result<ThingId, SessionError> {
        let ty = self.catalog.creature(placed.type_id).ok_or_else(|| {
            SessionError::Setup(format!("unknown creature type {}", placed.type_id))
        })?;
        let mut creature = Creature::new(placed.name.clone());
        if local_player {
            creature = creature.local_player();
        }
        let id = world.allocate_id();
        place(world, placed.position, Thing::creature(id, ty, creature));
        if world.map().creature_position(id).is_none() {
            return Err(SessionError::Setup(format!(
                "creature {} could not be placed at {}",
                placed.name, placed.position
            )));
        }
        Ok(id)
    }

    fn restart_patrol(&self, walker: Patroller, world: &mut World) {
        let Some(layout) = &self.layout else {
            return;
        };
        let placed = match walker.patrol_index.checked_sub(1) {
            None => Some(&layout.player),
            Some(index) => layout.creatures.get(index),
        };
        let Some(steps) = placed.map(|placed| &placed.patrol) else {
            return;
        };
        if !steps.is_empty() {
            world.queue_walk(walker.id, steps.iter().copied(), layout.step_ms);
        }
    }

    fn is_idle(world: &World, id: ThingId) -> bool {
        world.queued_steps(id) == 0 && !world.map().is_walking(id)
    }

    fn spawn_effect(&mut self, world: &mut World) {
        let (Some(layout), Some(player)) = (&self.layout, self.player) else {
            return;
        };
        let Some(position) = world.map().creature_position(player.id) else {
            return;
        };
        let Some(ty) = self.catalog.effect(layout.effect_type) else {
            warn!(effect = layout.effect_type, "demo_effect_type_missing");
            return;
        };
        let effect = Thing::effect(world.allocate_id(), ty);
        place(world, position, effect);
        world.on_mouse_move(Some(position));
        self.next_effect_ms = world.clock_ms() + layout.effect_interval_ms.max(1);
    }
}

fn place(world: &mut World, position: Position, thing: Thing) {
    if let Some(lost) = world.add_thing(position, thing, StackPos::Auto) {
        debug!(thing = %lost.id(), position = %position, "demo_thing_dropped");
    }
}

impl Session for DemoSession {
    fn load(&mut self, world: &mut World) -> Result<(), SessionError> {
        self.catalog = ThingTypeCatalog::from_json_str(self.types_raw)?;
        let layout = parse_layout(self.layout_raw)?;

        self.place_grounds(&layout, world)?;
        self.place_items(&layout, world)?;

        let player_id = self.place_creature(&layout.player, true, world)?;
        let player = Patroller {
            id: player_id,
            patrol_index: 0,
        };
        world.view_mut().follow_creature(player_id);
        self.renderer.set_marked(Some(player_id));

        let mut walkers = Vec::with_capacity(layout.creatures.len());
        for (index, placed) in layout.creatures.iter().enumerate() {
            let id = self.place_creature(placed, false, world)?;
            walkers.push(Patroller {
                id,
                patrol_index: index + 1,
            });
        }

        info!(
            types = self.catalog.len(),
            tiles = world.map().tile_count(),
            creatures = walkers.len() + 1,
            laps = layout.laps,
            "demo_loaded"
        );

        self.next_effect_ms = layout.effect_interval_ms;
        self.layout = Some(layout);
        self.player = Some(player);
        self.walkers = walkers;

        self.restart_patrol(player, world);
        for walker in &self.walkers {
            self.restart_patrol(*walker, world);
        }
        Ok(())
    }

    fn update(&mut self, _fixed_dt: Duration, world: &mut World) -> SessionCommand {
        let laps = self.layout.as_ref().map(|layout| layout.laps);
        let (Some(player), Some(laps)) = (self.player, laps) else {
            return SessionCommand::Quit;
        };

        if Self::is_idle(world, player.id) {
            self.laps_done += 1;
            let position = world.map().creature_position(player.id);
            info!(lap = self.laps_done, position = ?position, "demo_lap_completed");
            if self.laps_done >= laps {
                return SessionCommand::Quit;
            }
            if let Some(position) = position {
                world.add_text(position, format!("lap {}", self.laps_done), true, 1000);
            }
            self.restart_patrol(player, world);
        }

        for walker in &self.walkers {
            if Self::is_idle(world, walker.id) {
                self.restart_patrol(*walker, world);
            }
        }

        if world.clock_ms() >= self.next_effect_ms {
            self.spawn_effect(world);
        }
        SessionCommand::Continue
    }

    fn render(&mut self, world: &mut World) -> DrawStats {
        let view = world.view();
        self.renderer.begin_frame(view.draw_dimension(), view.tile_size());
        let stats = world.draw(&mut self.renderer);
        self.frames += 1;
        if stats.redrew_tiles {
            debug!(
                frame = self.frames,
                floors = ?self.renderer.floors(),
                tiles = stats.tiles,
                texts = self.renderer.texts().len(),
                "demo_frame_drawn"
            );
        }
        stats
    }

    fn unload(&mut self, world: &mut World) {
        info!(
            frames = self.frames,
            laps = self.laps_done(),
            player = ?self.player(),
            clock_ms = world.clock_ms(),
            "demo_unloaded"
        );
        println!("{}", self.screen());
    }

    fn name(&self) -> &str {
        "demo"
    }
}
