use engine::{Color, DrawLayer, MapRenderer, Size, TextDraw, ThingDraw, ThingId, TileDraw};
use tracing::trace;

const EMPTY_CELL: char = ' ';

/// Composites drawn floors into a character grid, one cell per tile.
///
/// Floors arrive bottom-up, so a cell ends up showing the topmost floor
/// that drew into it.
pub(crate) struct TextRenderer {
    marked: Option<ThingId>,
    size: Size,
    tile_size: i32,
    cells: Vec<char>,
    floors: Vec<u8>,
    texts: Vec<String>,
    clear_pending: bool,
}

impl TextRenderer {
    /// `marked` is drawn as `@`, usually the local player.
    pub(crate) fn new(marked: Option<ThingId>) -> Self {
        Self {
            marked,
            size: Size::default(),
            tile_size: 1,
            cells: Vec::new(),
            floors: Vec::new(),
            texts: Vec::new(),
            clear_pending: true,
        }
    }

    pub(crate) fn set_marked(&mut self, marked: Option<ThingId>) {
        self.marked = marked;
    }

    /// Prepares for a frame drawn into a buffer of `size` tiles. The grid
    /// keeps its previous contents until a floor is actually drawn.
    pub(crate) fn begin_frame(&mut self, size: Size, tile_size: i32) {
        self.tile_size = tile_size.max(1);
        if size != self.size {
            self.size = size;
            self.cells = vec![EMPTY_CELL; cell_count(size)];
        }
        self.clear_pending = true;
        self.texts.clear();
    }

    /// Floors drawn in the last redrawn frame, bottom first.
    pub(crate) fn floors(&self) -> &[u8] {
        &self.floors
    }

    pub(crate) fn texts(&self) -> &[String] {
        &self.texts
    }

    #[cfg(test)]
    pub(crate) fn cell(&self, column: i32, row: i32) -> Option<char> {
        self.index(column, row).map(|index| self.cells[index])
    }

    pub(crate) fn render(&self) -> String {
        let width = usize::try_from(self.size.width).unwrap_or(0);
        if width == 0 {
            return String::new();
        }
        self.cells
            .chunks(width)
            .map(|row| row.iter().collect::<String>().trim_end().to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn index(&self, column: i32, row: i32) -> Option<usize> {
        if !(0..self.size.width).contains(&column) || !(0..self.size.height).contains(&row) {
            return None;
        }
        usize::try_from(row * self.size.width + column).ok()
    }

    fn glyph(&self, tile: &TileDraw) -> Option<char> {
        if tile.highlight.is_some() {
            return Some('+');
        }
        tile.things.last().map(|thing| self.thing_glyph(thing))
    }

    fn thing_glyph(&self, thing: &ThingDraw) -> char {
        match thing.layer {
            DrawLayer::Ground => '.',
            DrawLayer::Bottom => '#',
            DrawLayer::Common if thing.light.is_some_and(|light| light.is_lit()) => '!',
            DrawLayer::Common => 'o',
            DrawLayer::Creature | DrawLayer::Walking if Some(thing.id) == self.marked => '@',
            DrawLayer::Creature | DrawLayer::Walking => 'c',
            DrawLayer::Effect => '*',
            DrawLayer::Top => '^',
        }
    }
}

impl MapRenderer for TextRenderer {
    fn begin_floor(&mut self, floor: u8, _shadow: Color) {
        if self.clear_pending {
            self.cells.fill(EMPTY_CELL);
            self.floors.clear();
            self.clear_pending = false;
        }
        self.floors.push(floor);
    }

    fn draw_tile(&mut self, tile: &TileDraw) {
        if tile.covered {
            return;
        }
        let column = tile.dest.x.div_euclid(self.tile_size);
        let row = tile.dest.y.div_euclid(self.tile_size);
        let (Some(index), Some(glyph)) = (self.index(column, row), self.glyph(tile)) else {
            return;
        };
        self.cells[index] = glyph;
    }

    fn end_floor(&mut self, floor: u8) {
        trace!(floor, "text_floor_drawn");
    }

    fn draw_text(&mut self, text: &TextDraw) {
        self.texts.push(text.text.clone());
    }
}

fn cell_count(size: Size) -> usize {
    let width = usize::try_from(size.width).unwrap_or(0);
    let height = usize::try_from(size.height).unwrap_or(0);
    width * height
}

#[cfg(test)]
mod tests {
    use engine::{Light, Point, Position};

    use super::*;

    fn thing(id: u64, layer: DrawLayer) -> ThingDraw {
        ThingDraw {
            id: ThingId(id),
            type_id: 1,
            layer,
            dest: Point::default(),
            light: None,
        }
    }

    fn tile(column: i32, row: i32, things: Vec<ThingDraw>) -> TileDraw {
        TileDraw {
            position: Position::new(100 + column, 100 + row, 7),
            dest: Point::new(column * 32, row * 32),
            things,
            highlight: None,
            border_shadow: None,
            covered: false,
        }
    }

    #[test]
    fn topmost_thing_picks_the_glyph() {
        let mut renderer = TextRenderer::new(Some(ThingId(9)));
        renderer.begin_frame(Size::new(4, 3), 32);
        renderer.begin_floor(7, Color::WHITE);
        renderer.draw_tile(&tile(0, 0, vec![thing(1, DrawLayer::Ground)]));
        renderer.draw_tile(&tile(
            1,
            0,
            vec![thing(1, DrawLayer::Ground), thing(2, DrawLayer::Bottom)],
        ));
        renderer.draw_tile(&tile(
            2,
            1,
            vec![thing(1, DrawLayer::Ground), thing(9, DrawLayer::Walking)],
        ));
        renderer.draw_tile(&tile(3, 2, vec![thing(5, DrawLayer::Creature)]));
        renderer.end_floor(7);

        assert_eq!(renderer.cell(0, 0), Some('.'));
        assert_eq!(renderer.cell(1, 0), Some('#'));
        assert_eq!(renderer.cell(2, 1), Some('@'));
        assert_eq!(renderer.cell(3, 2), Some('c'));
        assert_eq!(renderer.render(), ".#\n  @\n   c");
    }

    #[test]
    fn lit_items_and_highlights_stand_out() {
        let mut renderer = TextRenderer::new(None);
        renderer.begin_frame(Size::new(2, 1), 32);
        renderer.begin_floor(7, Color::WHITE);

        let mut torch = thing(3, DrawLayer::Common);
        torch.light = Some(Light::new(6, 206));
        renderer.draw_tile(&tile(0, 0, vec![torch]));

        let mut hovered = tile(1, 0, vec![thing(4, DrawLayer::Common)]);
        hovered.highlight = Some(engine::tile::HighlightDescriptor {
            target: ThingId(4),
            color: Color::YELLOW,
        });
        renderer.draw_tile(&hovered);

        assert_eq!(renderer.render(), "!+");
    }

    #[test]
    fn upper_floor_overwrites_lower_and_covered_tiles_are_skipped() {
        let mut renderer = TextRenderer::new(None);
        renderer.begin_frame(Size::new(2, 1), 32);

        renderer.begin_floor(7, Color::WHITE);
        renderer.draw_tile(&tile(0, 0, vec![thing(1, DrawLayer::Ground)]));
        let mut covered = tile(1, 0, vec![thing(2, DrawLayer::Ground)]);
        covered.covered = true;
        renderer.draw_tile(&covered);
        renderer.end_floor(7);

        renderer.begin_floor(6, Color::WHITE);
        renderer.draw_tile(&tile(0, 0, vec![thing(3, DrawLayer::Top)]));
        renderer.end_floor(6);

        assert_eq!(renderer.render(), "^");
        assert_eq!(renderer.floors(), &[7, 6]);
    }

    #[test]
    fn frame_without_floors_keeps_previous_grid() {
        let mut renderer = TextRenderer::new(None);
        renderer.begin_frame(Size::new(1, 1), 32);
        renderer.begin_floor(7, Color::WHITE);
        renderer.draw_tile(&tile(0, 0, vec![thing(1, DrawLayer::Ground)]));

        renderer.begin_frame(Size::new(1, 1), 32);
        assert_eq!(renderer.render(), ".");

        renderer.begin_floor(7, Color::WHITE);
        assert_eq!(renderer.render(), "");
    }

    #[test]
    fn off_grid_tiles_are_ignored() {
        let mut renderer = TextRenderer::new(None);
        renderer.begin_frame(Size::new(2, 2), 32);
        renderer.begin_floor(7, Color::WHITE);
        renderer.draw_tile(&tile(-1, 0, vec![thing(1, DrawLayer::Ground)]));
        renderer.draw_tile(&tile(2, 5, vec![thing(1, DrawLayer::Ground)]));

        assert_eq!(renderer.cell(-1, 0), None);
        assert_eq!(renderer.render(), "\n");
    }
}
