use crate::config::schema::TriggerMode;
use crate::event::{ButtonId, PAD_COUNT};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Where a pad is in its press cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PadPhase {
    #[default]
    Idle,
    Pressed,
    HoldFired,
}

/// Mutable per-pad state owned by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonRuntimeState {
    pub phase: PadPhase,
    /// Instant of the last accepted press.
    pub last_down: Option<Instant>,
    pub held_fired: bool,
    /// On/off state of `toggle_process` actions, per trigger mode.
    toggles: [bool; 3],
}

impl ButtonRuntimeState {
    /// Apply a press. Returns `false` when the press is ignored: the pad is
    /// already down, or the press falls inside the debounce window of the
    /// previous accepted one.
    pub fn press(&mut self, at: Instant, debounce: Duration) -> bool {
        if self.phase != PadPhase::Idle {
            trace!("press ignored, pad not idle ({:?})", self.phase);
            return false;
        }
        if let Some(last) = self.last_down {
            if at.saturating_duration_since(last) < debounce {
                trace!("press ignored, inside debounce window");
                return false;
            }
        }
        self.phase = PadPhase::Pressed;
        self.last_down = Some(at);
        self.held_fired = false;
        true
    }

    /// Apply a release; returns the trigger to fire, if any.
    pub fn release(&mut self) -> Option<TriggerMode> {
        let fired = match self.phase {
            PadPhase::Idle => return None,
            PadPhase::Pressed => TriggerMode::Tap,
            PadPhase::HoldFired => TriggerMode::Release,
        };
        self.phase = PadPhase::Idle;
        Some(fired)
    }

    /// Apply a hold-threshold expiry; fires only from `Pressed`.
    pub fn hold(&mut self) -> Option<TriggerMode> {
        if self.phase != PadPhase::Pressed {
            return None;
        }
        self.phase = PadPhase::HoldFired;
        self.held_fired = true;
        Some(TriggerMode::LongPress)
    }

    /// Flip the toggle flag for `trigger`, returning the new desired state.
    pub fn flip_toggle(&mut self, trigger: TriggerMode) -> bool {
        let flag = &mut self.toggles[trigger.index()];
        *flag = !*flag;
        *flag
    }

    pub fn toggle(&self, trigger: TriggerMode) -> bool {
        self.toggles[trigger.index()]
    }
}

/// Runtime state of all twelve pads.
#[derive(Debug, Clone, Default)]
pub struct ButtonTable {
    pads: [ButtonRuntimeState; PAD_COUNT],
}

impl ButtonTable {
    pub fn get(&self, pad: ButtonId) -> &ButtonRuntimeState {
        &self.pads[pad.index()]
    }

    pub fn get_mut(&mut self, pad: ButtonId) -> &mut ButtonRuntimeState {
        &mut self.pads[pad.index()]
    }

    pub fn reset(&mut self) {
        self.pads = Default::default();
    }
}
