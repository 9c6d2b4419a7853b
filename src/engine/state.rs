use serde::{Deserialize, Serialize};

/// The physical link to the controller. The transport decides which input
/// report layout to expect, how long outbound reports are and whether they
/// carry a CRC trailer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    Usb,
    BluetoothSimple,
    BluetoothEnhanced,
    Disconnected,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Usb => write!(f, "USB"),
            Transport::BluetoothSimple => write!(f, "Bluetooth (simple)"),
            Transport::BluetoothEnhanced => write!(f, "Bluetooth (enhanced)"),
            Transport::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Which kind of Sony controller is on the other end of the link. The
/// DualShock 4 is input-only; lightbar/LED/trigger output reports are only
/// assembled for the DualSense.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Model {
    DualSense,
    DualShock4,
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Model::DualSense => write!(f, "DualSense"),
            Model::DualShock4 => write!(f, "DualShock 4"),
        }
    }
}

/// One normalized controller frame. The decoder rewrites this in place every
/// cycle; the worker keeps the previous frame around for edge detection.
///
/// Stick axes are centered and deadzone-filtered to [-1.0, 1.0], triggers are
/// [0.0, 1.0]. Touch coordinates are the native touchpad resolution
/// (1920x1080).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GamepadState {
    pub left_x: f32,
    pub left_y: f32,
    pub right_x: f32,
    pub right_y: f32,
    pub l2: f32,
    pub r2: f32,
    pub cross: bool,
    pub circle: bool,
    pub square: bool,
    pub triangle: bool,
    pub l1: bool,
    pub r1: bool,
    pub l3: bool,
    pub r3: bool,
    pub share: bool,
    pub options: bool,
    pub ps: bool,
    pub mute: bool,
    pub touchpad: bool,
    pub dpad_up: bool,
    pub dpad_down: bool,
    pub dpad_left: bool,
    pub dpad_right: bool,
    pub touch_x: u16,
    pub touch_y: u16,
    pub touch_active: bool,
    /// 0-100
    pub battery: u8,
    pub is_charging: bool,
}

impl Default for GamepadState {
    fn default() -> Self {
        Self {
            left_x: 0.0,
            left_y: 0.0,
            right_x: 0.0,
            right_y: 0.0,
            l2: 0.0,
            r2: 0.0,
            cross: false,
            circle: false,
            square: false,
            triangle: false,
            l1: false,
            r1: false,
            l3: false,
            r3: false,
            share: false,
            options: false,
            ps: false,
            mute: false,
            touchpad: false,
            dpad_up: false,
            dpad_down: false,
            dpad_left: false,
            dpad_right: false,
            touch_x: 0,
            touch_y: 0,
            touch_active: false,
            battery: 0,
            is_charging: false,
        }
    }
}

/// Upper bound for the raw report bytes retained for diagnostics.
pub const RAW_REPORT_MAX: usize = 80;
