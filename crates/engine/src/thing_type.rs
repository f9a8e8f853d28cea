use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::geometry::Point;
use crate::light::Light;

/// Sprite budget for a single thing type across every frame group.
pub const MAX_SPRITES_PER_TYPE: u32 = 4096;
const MAX_CELL_SPAN: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThingCategory {
    Item,
    Creature,
    Effect,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ThingFlags: u32 {
        const GROUND = 1 << 0;
        const GROUND_BORDER = 1 << 1;
        const ON_BOTTOM = 1 << 2;
        const ON_TOP = 1 << 3;
        const CONTAINER = 1 << 4;
        const STACKABLE = 1 << 5;
        const FORCE_USE = 1 << 6;
        const MULTI_USE = 1 << 7;
        const SPLASH = 1 << 8;
        const FLUID_CONTAINER = 1 << 9;
        const NOT_WALKABLE = 1 << 10;
        const NOT_MOVEABLE = 1 << 11;
        const BLOCK_PROJECTILE = 1 << 12;
        const NOT_PATHABLE = 1 << 13;
        const HOOK_SOUTH = 1 << 14;
        const HOOK_EAST = 1 << 15;
        const TRANSLUCENT = 1 << 16;
        const LYING_CORPSE = 1 << 17;
        const FULL_GROUND = 1 << 18;
        const IGNORE_LOOK = 1 << 19;
        const LENS_HELP = 1 << 20;
        const USABLE = 1 << 21;
        const TOP_GROUND = 1 << 22;
        const OPAQUE = 1 << 23;
        const NO_WALKABLE_EDGE = 1 << 24;
        const ANIMATE_ALWAYS = 1 << 25;
        const TOP_EFFECT = 1 << 26;
    }
}

/// Attribute names accepted in JSON type definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThingAttr {
    Ground,
    GroundBorder,
    OnBottom,
    OnTop,
    Container,
    Stackable,
    ForceUse,
    MultiUse,
    Splash,
    FluidContainer,
    NotWalkable,
    NotMoveable,
    BlockProjectile,
    NotPathable,
    HookSouth,
    HookEast,
    Translucent,
    LyingCorpse,
    FullGround,
    IgnoreLook,
    LensHelp,
    Usable,
    TopGround,
    Opaque,
    NoWalkableEdge,
    AnimateAlways,
    TopEffect,
}

impl ThingAttr {
    pub fn flag(self) -> ThingFlags {
        match self {
            ThingAttr::Ground => ThingFlags::GROUND,
            ThingAttr::GroundBorder => ThingFlags::GROUND_BORDER,
            ThingAttr::OnBottom => ThingFlags::ON_BOTTOM,
            ThingAttr::OnTop => ThingFlags::ON_TOP,
            ThingAttr::Container => ThingFlags::CONTAINER,
            ThingAttr::Stackable => ThingFlags::STACKABLE,
            ThingAttr::ForceUse => ThingFlags::FORCE_USE,
            ThingAttr::MultiUse => ThingFlags::MULTI_USE,
            ThingAttr::Splash => ThingFlags::SPLASH,
            ThingAttr::FluidContainer => ThingFlags::FLUID_CONTAINER,
            ThingAttr::NotWalkable => ThingFlags::NOT_WALKABLE,
            ThingAttr::NotMoveable => ThingFlags::NOT_MOVEABLE,
            ThingAttr::BlockProjectile => ThingFlags::BLOCK_PROJECTILE,
            ThingAttr::NotPathable => ThingFlags::NOT_PATHABLE,
            ThingAttr::HookSouth => ThingFlags::HOOK_SOUTH,
            ThingAttr::HookEast => ThingFlags::HOOK_EAST,
            ThingAttr::Translucent => ThingFlags::TRANSLUCENT,
            ThingAttr::LyingCorpse => ThingFlags::LYING_CORPSE,
            ThingAttr::FullGround => ThingFlags::FULL_GROUND,
            ThingAttr::IgnoreLook => ThingFlags::IGNORE_LOOK,
            ThingAttr::LensHelp => ThingFlags::LENS_HELP,
            ThingAttr::Usable => ThingFlags::USABLE,
            ThingAttr::TopGround => ThingFlags::TOP_GROUND,
            ThingAttr::Opaque => ThingFlags::OPAQUE,
            ThingAttr::NoWalkableEdge => ThingFlags::NO_WALKABLE_EDGE,
            ThingAttr::AnimateAlways => ThingFlags::ANIMATE_ALWAYS,
            ThingAttr::TopEffect => ThingFlags::TOP_EFFECT,
        }
    }
}

/// Static appearance data shared by every thing of the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct ThingType {
    pub id: u16,
    pub category: ThingCategory,
    pub flags: ThingFlags,
    pub width: u8,
    pub height: u8,
    pub elevation: u16,
    pub light: Light,
    pub displacement: Point,
    pub minimap_color: u8,
    pub ground_speed: u16,
    pub animation_ms: u32,
    pub sprite_count: u32,
}

impl ThingType {
    pub fn new(id: u16, category: ThingCategory) -> Self {
        Self {
            id,
            category,
            flags: ThingFlags::empty(),
            width: 1,
            height: 1,
            elevation: 0,
            light: Light::default(),
            displacement: Point::default(),
            minimap_color: 0,
            ground_speed: 0,
            animation_ms: 0,
            sprite_count: 1,
        }
    }

    pub fn with_flags(mut self, flags: ThingFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn with_size(mut self, width: u8, height: u8) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_elevation(mut self, elevation: u16) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn with_light(mut self, light: Light) -> Self {
        self.light = light;
        self
    }

    pub fn with_displacement(mut self, displacement: Point) -> Self {
        self.displacement = displacement;
        self
    }

    pub fn with_minimap_color(mut self, color: u8) -> Self {
        self.minimap_color = color;
        self
    }

    pub fn with_ground_speed(mut self, speed: u16) -> Self {
        self.ground_speed = speed;
        self
    }

    pub fn with_animation_ms(mut self, duration: u32) -> Self {
        self.animation_ms = duration;
        self
    }

    pub fn has(&self, flag: ThingFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn is_single_dimension(&self) -> bool {
        self.width == 1 && self.height == 1
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThingTypeDef {
    pub id: u16,
    pub category: ThingCategory,
    #[serde(default)]
    pub attrs: Vec<ThingAttr>,
    #[serde(default = "one")]
    pub width: u8,
    #[serde(default = "one")]
    pub height: u8,
    #[serde(default = "one")]
    pub layers: u8,
    #[serde(default = "one")]
    pub patterns: u8,
    #[serde(default = "one")]
    pub animation_phases: u8,
    #[serde(default)]
    pub elevation: u16,
    #[serde(default)]
    pub light: Option<Light>,
    #[serde(default)]
    pub displacement: Option<Point>,
    #[serde(default)]
    pub minimap_color: u8,
    #[serde(default)]
    pub ground_speed: u16,
    #[serde(default)]
    pub animation_ms: u32,
}

fn one() -> u8 {
    1
}

#[derive(Debug, Error)]
pub enum ThingTypeError {
    #[error("failed to parse thing types at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{category:?} type id 0 is reserved")]
    ReservedId { category: ThingCategory },
    #[error("{category:?} type {id} has invalid size {width}x{height}")]
    InvalidSize {
        category: ThingCategory,
        id: u16,
        width: u8,
        height: u8,
    },
    #[error("{category:?} type {id} has {count} sprites, more than 4096")]
    TooManySprites {
        category: ThingCategory,
        id: u16,
        count: u32,
    },
    #[error("{category:?} type {id} is defined twice")]
    DuplicateId { category: ThingCategory, id: u16 },
}

impl TryFrom<ThingTypeDef> for ThingType {
    type Error = ThingTypeError;

    fn try_from(def: ThingTypeDef) -> Result<Self, Self::Error> {
        let category = def.category;
        if def.id == 0 {
            return Err(ThingTypeError::ReservedId { category });
        }
        let span = 1..=MAX_CELL_SPAN;
        if !span.contains(&def.width) || !span.contains(&def.height) {
            return Err(ThingTypeError::InvalidSize {
                category,
                id: def.id,
                width: def.width,
                height: def.height,
            });
        }

        let sprite_count = [
            def.width,
            def.height,
            def.layers,
            def.patterns,
            def.animation_phases,
        ]
        .into_iter()
        .map(u32::from)
        .product::<u32>();
        if sprite_count > MAX_SPRITES_PER_TYPE {
            return Err(ThingTypeError::TooManySprites {
                category,
                id: def.id,
                count: sprite_count,
            });
        }

        let flags = def
            .attrs
            .iter()
            .fold(ThingFlags::empty(), |flags, attr| flags | attr.flag());

        Ok(ThingType {
            id: def.id,
            category,
            flags,
            width: def.width,
            height: def.height,
            elevation: def.elevation,
            light: def.light.unwrap_or_default(),
            displacement: def.displacement.unwrap_or_default(),
            minimap_color: def.minimap_color,
            ground_speed: def.ground_speed,
            animation_ms: def.animation_ms,
            sprite_count,
        })
    }
}

/// Validated thing types keyed by category and id.
#[derive(Debug, Default, Clone)]
pub struct ThingTypeCatalog {
    types: HashMap<(ThingCategory, u16), Arc<ThingType>>,
}

impl ThingTypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ThingTypeError> {
        let deserializer = &mut serde_json::Deserializer::from_str(raw);
        let defs: Vec<ThingTypeDef> =
            serde_path_to_error::deserialize(deserializer).map_err(|error| {
                let path = error.path().to_string();
                ThingTypeError::Parse {
                    path,
                    source: error.into_inner(),
                }
            })?;
        Self::from_definitions(defs)
    }

    pub fn from_definitions(defs: Vec<ThingTypeDef>) -> Result<Self, ThingTypeError> {
        let mut catalog = Self::new();
        for def in defs {
            let thing_type = ThingType::try_from(def).inspect_err(|error| {
                error!(error = %error, "thing_type_rejected");
            })?;
            catalog.insert(thing_type)?;
        }
        debug!(count = catalog.len(), "thing_types_loaded");
        Ok(catalog)
    }

    pub fn insert(&mut self, thing_type: ThingType) -> Result<Arc<ThingType>, ThingTypeError> {
        let key = (thing_type.category, thing_type.id);
        if self.types.contains_key(&key) {
            return Err(ThingTypeError::DuplicateId {
                category: key.0,
                id: key.1,
            });
        }
        let thing_type = Arc::new(thing_type);
        self.types.insert(key, Arc::clone(&thing_type));
        Ok(thing_type)
    }

    pub fn get(&self, category: ThingCategory, id: u16) -> Option<Arc<ThingType>> {
        self.types.get(&(category, id)).cloned()
    }

    pub fn item(&self, id: u16) -> Option<Arc<ThingType>> {
        self.get(ThingCategory::Item, id)
    }

    pub fn creature(&self, id: u16) -> Option<Arc<ThingType>> {
        self.get(ThingCategory::Creature, id)
    }

    pub fn effect(&self, id: u16) -> Option<Arc<ThingType>> {
        self.get(ThingCategory::Effect, id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
