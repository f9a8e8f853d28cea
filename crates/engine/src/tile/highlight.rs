use crate::light::Color;
use crate::scheduler::TimerHandle;
use crate::thing::ThingId;

pub const HIGHLIGHT_PULSE_MS: u64 = 30;
pub const HIGHLIGHT_FADE_STEP: i32 = 10;
pub const HIGHLIGHT_FADE_CEILING: i32 = 120;

/// Selection state of a tile: the cached target plus the pulsing fade.
#[derive(Debug, Default)]
pub struct Highlight {
    pub(crate) target: Option<ThingId>,
    enabled: bool,
    rising: bool,
    fade_level: i32,
    pulse: Option<TimerHandle>,
}

/// What the renderer needs to draw a highlighted thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightDescriptor {
    pub target: ThingId,
    pub color: Color,
}

impl Highlight {
    pub fn target(&self) -> Option<ThingId> {
        self.target
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn fade_level(&self) -> i32 {
        self.fade_level
    }

    pub(crate) fn start(&mut self, pulse: TimerHandle) {
        if let Some(previous) = self.pulse.replace(pulse) {
            previous.cancel();
        }
        self.enabled = true;
        self.rising = true;
        self.fade_level = 0;
    }

    pub(crate) fn stop(&mut self) {
        let Some(pulse) = self.pulse.take() else {
            return;
        };
        pulse.cancel();
        self.enabled = false;
    }

    /// Advances the fade one step, reversing direction at either bound.
    pub(crate) fn step(&mut self) {
        if !self.enabled {
            return;
        }
        if self.rising {
            self.fade_level += HIGHLIGHT_FADE_STEP;
            if self.fade_level >= HIGHLIGHT_FADE_CEILING {
                self.fade_level = HIGHLIGHT_FADE_CEILING;
                self.rising = false;
            }
        } else {
            self.fade_level -= HIGHLIGHT_FADE_STEP;
            if self.fade_level <= 0 {
                self.fade_level = 0;
                self.rising = true;
            }
        }
    }

    pub fn descriptor(&self) -> Option<HighlightDescriptor> {
        if !self.enabled {
            return None;
        }
        let target = self.target?;
        let alpha = self.fade_level.clamp(0, 255) as u8;
        Some(HighlightDescriptor {
            target,
            color: Color::YELLOW.with_alpha(alpha),
        })
    }
}
