use crate::thing::Thing;

/// Running totals over the things in a tile stack.
///
/// Each field counts the stack members satisfying one predicate, except
/// `total_elevation` which sums item elevations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountFlags {
    pub has_light: i32,
    pub has_displacement: i32,
    pub not_walkable: i32,
    pub not_pathable: i32,
    pub not_single_dimension: i32,
    pub block_projectile: i32,
    pub total_elevation: i32,
    pub has_tall_things: i32,
    pub has_wide_things: i32,
    pub has_no_walkable_edge: i32,
    pub full_ground: i32,
    pub opaque: i32,
    pub elevation: i32,
    pub has_bottom_item: i32,
    pub has_common_item: i32,
    pub has_top_item: i32,
    pub has_creature: i32,
    pub has_ground_or_border: i32,
    pub has_top_ground: i32,
    pub has_hook_east: i32,
    pub has_hook_south: i32,
}

impl CountFlags {
    pub fn add(&mut self, thing: &Thing) {
        self.apply(thing, 1);
    }

    pub fn remove(&mut self, thing: &Thing) {
        self.apply(thing, -1);
    }

    /// Naive recount, used to cross-check the incremental path.
    pub fn recount<'a>(things: impl IntoIterator<Item = &'a Thing>) -> Self {
        let mut flags = Self::default();
        for thing in things {
            flags.add(thing);
        }
        flags
    }

    fn apply(&mut self, thing: &Thing, value: i32) {
        let bump = |counter: &mut i32, hit: bool| {
            if hit {
                *counter += value;
            }
        };

        bump(&mut self.has_light, thing.has_light());
        bump(&mut self.has_displacement, thing.has_displacement());

        if thing.is_effect() {
            return;
        }

        bump(&mut self.has_common_item, thing.is_common());
        bump(&mut self.has_top_item, thing.is_on_top());
        bump(&mut self.has_creature, thing.is_creature());
        bump(&mut self.has_ground_or_border, thing.is_ground_or_border());

        if thing.is_on_bottom() {
            self.has_bottom_item += value;
            bump(&mut self.has_hook_south, thing.is_hook_south());
            bump(&mut self.has_hook_east, thing.is_hook_east());
        }

        bump(&mut self.not_single_dimension, !thing.is_single_dimension());
        bump(&mut self.has_tall_things, thing.height() > 1);
        bump(&mut self.has_wide_things, thing.width() > 1);

        if !thing.is_item() {
            return;
        }

        bump(&mut self.not_walkable, thing.is_not_walkable());
        bump(&mut self.not_pathable, thing.is_not_pathable());
        bump(&mut self.block_projectile, thing.blocks_projectile());
        self.total_elevation += thing.elevation() * value;
        bump(&mut self.full_ground, thing.is_full_ground());
        bump(&mut self.elevation, thing.has_elevation());
        bump(&mut self.opaque, thing.is_opaque());
        bump(&mut self.has_top_ground, thing.is_top_ground());
        bump(
            &mut self.has_no_walkable_edge,
            thing.is_ground_border() && thing.is_not_walkable(),
        );
    }
}
