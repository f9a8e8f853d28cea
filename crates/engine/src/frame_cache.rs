use bitflags::bitflags;
use tracing::trace;

pub const DYNAMIC_TEXT_REFRESH_MS: u64 = 50;

bitflags! {
    /// What the current draw pass is refreshing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FrameFlags: u8 {
        const UPDATE_THING = 1 << 0;
        const UPDATE_LIGHT = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameLayer {
    Tile,
    Light,
    CreatureInformation,
    StaticText,
    DynamicText,
}

impl FrameLayer {
    pub const ALL: [FrameLayer; 5] = [
        FrameLayer::Tile,
        FrameLayer::Light,
        FrameLayer::CreatureInformation,
        FrameLayer::StaticText,
        FrameLayer::DynamicText,
    ];

    fn slot(self) -> usize {
        match self {
            FrameLayer::Tile => 0,
            FrameLayer::Light => 1,
            FrameLayer::CreatureInformation => 2,
            FrameLayer::StaticText => 3,
            FrameLayer::DynamicText => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LayerState {
    force: bool,
    /// Zero means the layer only redraws when forced.
    min_interval_ms: u64,
    last_drawn_ms: Option<u64>,
}

impl LayerState {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            force: true,
            min_interval_ms,
            last_drawn_ms: None,
        }
    }

    fn can_update(&self, now_ms: u64) -> bool {
        if self.force {
            return true;
        }
        self.min_interval_ms > 0
            && self
                .last_drawn_ms
                .map_or(true, |last| now_ms.saturating_sub(last) >= self.min_interval_ms)
    }
}

/// Redraw bookkeeping for the offscreen layers of a map view.
#[derive(Debug, Clone)]
pub struct FrameCache {
    layers: [LayerState; 5],
    flags: FrameFlags,
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::new(0, DYNAMIC_TEXT_REFRESH_MS)
    }
}

impl FrameCache {
    pub fn new(static_text_interval_ms: u64, dynamic_text_interval_ms: u64) -> Self {
        Self {
            layers: [
                LayerState::new(0),
                LayerState::new(0),
                LayerState::new(0),
                LayerState::new(static_text_interval_ms),
                LayerState::new(dynamic_text_interval_ms),
            ],
            flags: FrameFlags::empty(),
        }
    }

    pub fn can_update(&self, layer: FrameLayer, now_ms: u64) -> bool {
        self.layers[layer.slot()].can_update(now_ms)
    }

    pub fn is_forced(&self, layer: FrameLayer) -> bool {
        self.layers[layer.slot()].force
    }

    /// Requests a redraw of `layer` on the next frame.
    pub fn update(&mut self, layer: FrameLayer) {
        self.layers[layer.slot()].force = true;
    }

    pub fn update_all(&mut self) {
        for layer in &mut self.layers {
            layer.force = true;
        }
    }

    pub fn mark_drawn(&mut self, layer: FrameLayer, now_ms: u64) {
        let state = &mut self.layers[layer.slot()];
        state.force = false;
        state.last_drawn_ms = Some(now_ms);
        trace!(?layer, now_ms, "frame_layer_drawn");
    }

    pub fn flags(&self) -> FrameFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: FrameFlags) {
        self.flags = flags;
    }

    pub fn clear_flags(&mut self) {
        self.flags = FrameFlags::empty();
    }
}
