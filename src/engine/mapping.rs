use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::state::GamepadState;

// Xbox 360 button word bits as exposed by XInput.
pub const XBOX_DPAD_UP: u16 = 0x0001;
pub const XBOX_DPAD_DOWN: u16 = 0x0002;
pub const XBOX_DPAD_LEFT: u16 = 0x0004;
pub const XBOX_DPAD_RIGHT: u16 = 0x0008;
pub const XBOX_START: u16 = 0x0010;
pub const XBOX_BACK: u16 = 0x0020;
pub const XBOX_LEFT_THUMB: u16 = 0x0040;
pub const XBOX_RIGHT_THUMB: u16 = 0x0080;
pub const XBOX_LB: u16 = 0x0100;
pub const XBOX_RB: u16 = 0x0200;
pub const XBOX_GUIDE: u16 = 0x0400;
pub const XBOX_A: u16 = 0x1000;
pub const XBOX_B: u16 = 0x2000;
pub const XBOX_X: u16 = 0x4000;
pub const XBOX_Y: u16 = 0x8000;

/// Touchpad x coordinate where the left half ends and the right half begins.
const TOUCHPAD_SPLIT_X: u16 = 960;

/// Touch deltas larger than this are finger lift/replace jumps, not motion.
const TOUCH_JUMP_LIMIT: i32 = 500;

/// Scales raw touchpad pixels into the same sensitivity range the sticks use.
const TOUCH_SENS_FACTOR: f32 = 0.02;

/// The mapping reference frame is one 250 Hz USB input interval. Mouse speeds
/// are tuned against it and rescaled by the observed frame delta.
const REFERENCE_FRAME_SECS: f32 = 0.004;

/// Exponential-moving-average weight applied to stick axes and touchpad
/// deltas each frame. Removes the high-frequency jitter Bluetooth links put
/// on the analog inputs.
const SMOOTHING_ALPHA: f32 = 0.25;

/// A physical input on the controller that mappings can attach to. The
/// touchpad halves are synthetic buttons derived from the touch point while
/// the pad is clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSource {
    Cross,
    Circle,
    Square,
    Triangle,
    L1,
    R1,
    L3,
    R3,
    Share,
    Options,
    Ps,
    Mute,
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    L2,
    R2,
    LeftStick,
    RightStick,
    Touchpad,
    TouchpadLeft,
    TouchpadRight,
}

impl MappingSource {
    /// Every source the engine recognizes. A well-formed mapping set carries
    /// exactly one entry per element.
    pub const ALL: [MappingSource; 23] = [
        MappingSource::Cross,
        MappingSource::Circle,
        MappingSource::Square,
        MappingSource::Triangle,
        MappingSource::L1,
        MappingSource::R1,
        MappingSource::L3,
        MappingSource::R3,
        MappingSource::Share,
        MappingSource::Options,
        MappingSource::Ps,
        MappingSource::Mute,
        MappingSource::DpadUp,
        MappingSource::DpadDown,
        MappingSource::DpadLeft,
        MappingSource::DpadRight,
        MappingSource::L2,
        MappingSource::R2,
        MappingSource::LeftStick,
        MappingSource::RightStick,
        MappingSource::Touchpad,
        MappingSource::TouchpadLeft,
        MappingSource::TouchpadRight,
    ];

    /// Returns true for sources that evaluate to a stick or touch vector.
    pub fn is_vector(&self) -> bool {
        matches!(
            self,
            MappingSource::LeftStick | MappingSource::RightStick | MappingSource::Touchpad
        )
    }

    /// Returns true for sources that evaluate to a 0.0-1.0 scalar.
    pub fn is_scalar(&self) -> bool {
        matches!(self, MappingSource::L2 | MappingSource::R2)
    }

    /// Evaluate the source as a button against the given frame.
    pub fn pressed(&self, state: &GamepadState) -> bool {
        match self {
            MappingSource::Cross => state.cross,
            MappingSource::Circle => state.circle,
            MappingSource::Square => state.square,
            MappingSource::Triangle => state.triangle,
            MappingSource::L1 => state.l1,
            MappingSource::R1 => state.r1,
            MappingSource::L3 => state.l3,
            MappingSource::R3 => state.r3,
            MappingSource::Share => state.share,
            MappingSource::Options => state.options,
            MappingSource::Ps => state.ps,
            MappingSource::Mute => state.mute,
            MappingSource::DpadUp => state.dpad_up,
            MappingSource::DpadDown => state.dpad_down,
            MappingSource::DpadLeft => state.dpad_left,
            MappingSource::DpadRight => state.dpad_right,
            MappingSource::Touchpad => state.touchpad,
            MappingSource::TouchpadLeft => {
                state.touchpad && state.touch_active && state.touch_x < TOUCHPAD_SPLIT_X
            }
            MappingSource::TouchpadRight => {
                state.touchpad && state.touch_active && state.touch_x >= TOUCHPAD_SPLIT_X
            }
            // Analog sources never evaluate as buttons.
            MappingSource::L2
            | MappingSource::R2
            | MappingSource::LeftStick
            | MappingSource::RightStick => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSide {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickSide {
    Left,
    Right,
}

/// What a mapping entry produces. A closed set so dispatch in the engine is
/// exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingTarget {
    /// OR the bit into the Xbox button word while pressed.
    XboxButton(u16),
    XboxTrigger(TriggerSide),
    XboxStick(StickSide),
    /// Linux evdev key code.
    Keyboard(u16),
    /// 0 = left, 1 = middle, 2 = right.
    Mouse(u8),
    MouseMove { x_speed: f32, y_speed: f32 },
    MouseScroll { speed: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonMapping {
    pub source: MappingSource,
    pub targets: Vec<MappingTarget>,
}

/// The state submitted to the virtual Xbox 360 pad. Axes follow the evdev
/// convention (positive y is down).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XboxPadState {
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
}

/// A press or release of a synthetic key or mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticEdge {
    KeyDown(u16),
    KeyUp(u16),
    MouseDown(u8),
    MouseUp(u8),
}

/// Integer pointer motion popped from the engine accumulators this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerDelta {
    pub dx: i32,
    pub dy: i32,
    pub wheel: i32,
}

/// Everything a single frame of mapping evaluation produced.
#[derive(Debug, Clone, Default)]
pub struct FrameOutput {
    pub pad: XboxPadState,
    pub edges: Vec<SyntheticEdge>,
    pub pointer: PointerDelta,
}

/// Applies the active mapping set to decoded frames. Holds the fractional
/// pointer accumulators and the held key/button sets used for edge
/// detection; everything else is recomputed per frame.
#[derive(Debug)]
pub struct MappingEngine {
    mappings: Vec<ButtonMapping>,
    held_keys: HashSet<u16>,
    held_buttons: HashSet<u8>,
    move_acc: (f32, f32),
    scroll_acc: f32,
    /// Smoothed LX, LY, RX, RY.
    smoothed_axes: [f32; 4],
    smoothed_touch: (f32, f32),
    last_touch: (u16, u16),
    last_touch_active: bool,
}

/// Per-frame analog parameters taken from the engine config snapshot.
#[derive(Debug, Clone, Copy)]
pub struct AnalogParams {
    pub mouse_sens_left: f32,
    pub mouse_sens_right: f32,
    pub mouse_sens_touchpad: f32,
}

impl MappingEngine {
    pub fn new(mappings: Vec<ButtonMapping>) -> Self {
        Self {
            mappings,
            held_keys: HashSet::new(),
            held_buttons: HashSet::new(),
            move_acc: (0.0, 0.0),
            scroll_acc: 0.0,
            smoothed_axes: [0.0; 4],
            smoothed_touch: (0.0, 0.0),
            last_touch: (0, 0),
            last_touch_active: false,
        }
    }

    /// Replace the mapping set. Held keys survive the swap so a key whose
    /// mapping disappeared mid-hold still gets its release edge on the next
    /// frame.
    pub fn set_mappings(&mut self, mappings: Vec<ButtonMapping>) {
        self.mappings = mappings;
    }

    /// Evaluate one frame. `dt` is the time since the previous evaluation in
    /// seconds and only affects pointer integration.
    pub fn evaluate(
        &mut self,
        state: &GamepadState,
        params: &AnalogParams,
        dt: f32,
    ) -> FrameOutput {
        let mut out = FrameOutput::default();
        let mut keys = HashSet::new();
        let mut buttons = HashSet::new();
        let mut move_x = 0.0f32;
        let mut move_y = 0.0f32;
        let mut scroll = 0.0f32;
        let mut lt = 0.0f32;
        let mut rt = 0.0f32;

        let time_scale = dt / REFERENCE_FRAME_SECS;

        // Smooth the deadzone'd axes before anything dispatches on them.
        self.smoothed_axes[0] += SMOOTHING_ALPHA * (state.left_x - self.smoothed_axes[0]);
        self.smoothed_axes[1] += SMOOTHING_ALPHA * (state.left_y - self.smoothed_axes[1]);
        self.smoothed_axes[2] += SMOOTHING_ALPHA * (state.right_x - self.smoothed_axes[2]);
        self.smoothed_axes[3] += SMOOTHING_ALPHA * (state.right_y - self.smoothed_axes[3]);
        let (touch_dx, touch_dy) = self.touch_delta(state, params.mouse_sens_touchpad);

        for mapping in &self.mappings {
            if mapping.source.is_vector() {
                let (x, y) = match mapping.source {
                    MappingSource::LeftStick => (self.smoothed_axes[0], self.smoothed_axes[1]),
                    MappingSource::RightStick => (self.smoothed_axes[2], self.smoothed_axes[3]),
                    // The touchpad has no absolute vector; motion targets use
                    // the delta computed above.
                    MappingSource::Touchpad => (0.0, 0.0),
                    _ => (0.0, 0.0),
                };
                for target in &mapping.targets {
                    match target {
                        MappingTarget::XboxStick(StickSide::Left) => {
                            out.pad.thumb_lx = scale_thumb(x);
                            out.pad.thumb_ly = scale_thumb(y);
                        }
                        MappingTarget::XboxStick(StickSide::Right) => {
                            out.pad.thumb_rx = scale_thumb(x);
                            out.pad.thumb_ry = scale_thumb(y);
                        }
                        MappingTarget::XboxTrigger(TriggerSide::Left) => lt = lt.max(x.abs()),
                        MappingTarget::XboxTrigger(TriggerSide::Right) => rt = rt.max(x.abs()),
                        MappingTarget::MouseMove { x_speed, y_speed } => {
                            if mapping.source == MappingSource::Touchpad {
                                move_x += touch_dx;
                                move_y += touch_dy;
                            } else {
                                move_x += x * x_speed * time_scale;
                                move_y += y * y_speed * time_scale;
                            }
                        }
                        MappingTarget::MouseScroll { speed } => {
                            let value = if mapping.source == MappingSource::Touchpad {
                                touch_dy * 0.05
                            } else {
                                y
                            };
                            scroll -= value * speed * time_scale;
                        }
                        _ => (),
                    }
                }
            } else if mapping.source.is_scalar() {
                let value = match mapping.source {
                    MappingSource::L2 => state.l2,
                    MappingSource::R2 => state.r2,
                    _ => 0.0,
                };
                // Analog sources feed analog targets only.
                for target in &mapping.targets {
                    match target {
                        MappingTarget::XboxTrigger(TriggerSide::Left) => lt = lt.max(value),
                        MappingTarget::XboxTrigger(TriggerSide::Right) => rt = rt.max(value),
                        _ => (),
                    }
                }
            } else if mapping.source.pressed(state) {
                for target in &mapping.targets {
                    match target {
                        MappingTarget::XboxButton(bit) => out.pad.buttons |= bit,
                        MappingTarget::XboxTrigger(TriggerSide::Left) => lt = 1.0,
                        MappingTarget::XboxTrigger(TriggerSide::Right) => rt = 1.0,
                        MappingTarget::Keyboard(code) => {
                            keys.insert(*code);
                        }
                        MappingTarget::Mouse(button) => {
                            buttons.insert(*button);
                        }
                        _ => (),
                    }
                }
            }
        }

        out.pad.left_trigger = (lt.clamp(0.0, 1.0) * 255.0) as u8;
        out.pad.right_trigger = (rt.clamp(0.0, 1.0) * 255.0) as u8;

        self.diff_held(keys, buttons, &mut out.edges);
        out.pointer = self.integrate_pointer(move_x, move_y, scroll);

        out
    }

    /// Release every held synthetic key and mouse button. Used on transport
    /// loss and engine shutdown so nothing stays stuck down.
    pub fn release_all(&mut self) -> Vec<SyntheticEdge> {
        let mut edges = Vec::new();
        for code in self.held_keys.drain() {
            edges.push(SyntheticEdge::KeyUp(code));
        }
        for button in self.held_buttons.drain() {
            edges.push(SyntheticEdge::MouseUp(button));
        }
        self.move_acc = (0.0, 0.0);
        self.scroll_acc = 0.0;
        self.smoothed_axes = [0.0; 4];
        self.smoothed_touch = (0.0, 0.0);
        self.last_touch_active = false;
        edges
    }

    /// Touchpad pointer delta for this frame, filtered for finger jumps and
    /// smoothed with the same filter as the sticks.
    fn touch_delta(&mut self, state: &GamepadState, sens: f32) -> (f32, f32) {
        let mut target = (0.0, 0.0);
        if state.touch_active && self.last_touch_active {
            let dx = state.touch_x as i32 - self.last_touch.0 as i32;
            let dy = state.touch_y as i32 - self.last_touch.1 as i32;
            if dx.abs() < TOUCH_JUMP_LIMIT && dy.abs() < TOUCH_JUMP_LIMIT {
                target = (
                    dx as f32 * sens * TOUCH_SENS_FACTOR,
                    dy as f32 * sens * TOUCH_SENS_FACTOR,
                );
            }
        } else if !state.touch_active {
            // Drop the smoothing momentum the moment the finger lifts.
            self.smoothed_touch = (0.0, 0.0);
        }
        self.last_touch = (state.touch_x, state.touch_y);
        self.last_touch_active = state.touch_active;

        self.smoothed_touch.0 += SMOOTHING_ALPHA * (target.0 - self.smoothed_touch.0);
        self.smoothed_touch.1 += SMOOTHING_ALPHA * (target.1 - self.smoothed_touch.1);
        self.smoothed_touch
    }

    /// Compare the currently-wanted key/button sets against what is held and
    /// emit press/release edges.
    fn diff_held(
        &mut self,
        keys: HashSet<u16>,
        buttons: HashSet<u8>,
        edges: &mut Vec<SyntheticEdge>,
    ) {
        for code in &keys {
            if !self.held_keys.contains(code) {
                edges.push(SyntheticEdge::KeyDown(*code));
            }
        }
        for code in &self.held_keys {
            if !keys.contains(code) {
                edges.push(SyntheticEdge::KeyUp(*code));
            }
        }
        self.held_keys = keys;

        for button in &buttons {
            if !self.held_buttons.contains(button) {
                edges.push(SyntheticEdge::MouseDown(*button));
            }
        }
        for button in &self.held_buttons {
            if !buttons.contains(button) {
                edges.push(SyntheticEdge::MouseUp(*button));
            }
        }
        self.held_buttons = buttons;
    }

    /// Add this frame's fractional motion into the accumulators and pop the
    /// integer part, carrying the remainder.
    fn integrate_pointer(&mut self, move_x: f32, move_y: f32, scroll: f32) -> PointerDelta {
        let mut delta = PointerDelta::default();

        self.move_acc.0 += move_x;
        self.move_acc.1 += move_y;
        delta.dx = self.move_acc.0.trunc() as i32;
        delta.dy = self.move_acc.1.trunc() as i32;
        self.move_acc.0 -= delta.dx as f32;
        self.move_acc.1 -= delta.dy as f32;

        self.scroll_acc += scroll;
        if self.scroll_acc.abs() >= 1.0 {
            delta.wheel = self.scroll_acc.trunc() as i32;
            self.scroll_acc -= delta.wheel as f32;
        }

        delta
    }
}

fn scale_thumb(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * 32767.0) as i16
}
