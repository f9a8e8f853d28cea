use std::time::Duration;

use thiserror::Error;

use crate::render::DrawStats;
use crate::thing_type::ThingTypeError;
use crate::world::World;

/// What the loop should do after a session tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionCommand {
    #[default]
    Continue,
    Quit,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to load thing types: {0}")]
    ThingTypes(#[from] ThingTypeError),
    #[error("session setup failed: {0}")]
    Setup(String),
}

/// Game-state driver for the headless loop. `update` applies deltas to the
/// world once per fixed tick, `render` draws once per frame.
pub trait Session {
    fn load(&mut self, world: &mut World) -> Result<(), SessionError>;
    fn update(&mut self, fixed_dt: Duration, world: &mut World) -> SessionCommand;
    fn render(&mut self, world: &mut World) -> DrawStats;
    fn unload(&mut self, _world: &mut World) {}
    fn name(&self) -> &str {
        "session"
    }
}
