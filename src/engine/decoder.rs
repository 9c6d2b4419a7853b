//! Turns raw input report bytes into the normalized [GamepadState] frame.
//!
//! Decoding writes into a worker-owned slot and never allocates; the packed
//! report structs live on the stack.

use packed_struct::{PackedStruct, PackedStructSlice};

use crate::drivers::dualsense::driver::{
    ProtocolError, INPUT_REPORT_BT, INPUT_REPORT_BT_SIZE, INPUT_REPORT_DS4_BT,
    INPUT_REPORT_SIMPLE, INPUT_REPORT_SIMPLE_SIZE, INPUT_REPORT_USB, INPUT_REPORT_USB_SIZE,
    TOUCHPAD_HEIGHT, TOUCHPAD_WIDTH,
};
use crate::drivers::dualsense::hid_report::{
    BluetoothPackedInputDataReport, Ds4InputState, InputState, SimplePackedInputDataReport,
    UsbPackedInputDataReport,
};

use super::state::{GamepadState, Model, Transport};

const DS4_STATE_SIZE: usize = 12;
const DS4_USB_MIN_SIZE: usize = 10;
const DS4_BT_MIN_SIZE: usize = 15;
const DS4_BT_OFFSET: usize = 3;

/// Decode one raw input report into `slot`. The transport decides which
/// layout to expect; a report the link should not be producing is a protocol
/// error and the frame is skipped by the caller.
pub fn decode_frame(
    raw: &[u8],
    model: Model,
    transport: Transport,
    deadzone_left: f32,
    deadzone_right: f32,
    slot: &mut GamepadState,
) -> Result<(), ProtocolError> {
    if raw.is_empty() {
        return Err(ProtocolError::TruncatedReport(0));
    }
    let report_id = raw[0];

    match model {
        Model::DualSense => match (report_id, transport) {
            (INPUT_REPORT_USB, Transport::Usb) => {
                if raw.len() < INPUT_REPORT_USB_SIZE {
                    return Err(ProtocolError::TruncatedReport(raw.len()));
                }
                let report =
                    UsbPackedInputDataReport::unpack_from_slice(&raw[..INPUT_REPORT_USB_SIZE])
                        .map_err(|_| ProtocolError::TruncatedReport(raw.len()))?;
                fill_from_state(&report.state, deadzone_left, deadzone_right, slot);
                Ok(())
            }
            (INPUT_REPORT_BT, _) => {
                if raw.len() < INPUT_REPORT_BT_SIZE {
                    return Err(ProtocolError::TruncatedReport(raw.len()));
                }
                let report = BluetoothPackedInputDataReport::unpack_from_slice(
                    &raw[..INPUT_REPORT_BT_SIZE],
                )
                .map_err(|_| ProtocolError::TruncatedReport(raw.len()))?;
                fill_from_state(&report.state, deadzone_left, deadzone_right, slot);
                Ok(())
            }
            (INPUT_REPORT_SIMPLE, Transport::BluetoothSimple) => {
                if raw.len() < INPUT_REPORT_SIMPLE_SIZE {
                    return Err(ProtocolError::TruncatedReport(raw.len()));
                }
                let report = SimplePackedInputDataReport::unpack_from_slice(
                    &raw[..INPUT_REPORT_SIMPLE_SIZE],
                )
                .map_err(|_| ProtocolError::TruncatedReport(raw.len()))?;
                fill_from_simple(&report, deadzone_left, deadzone_right, slot);
                Ok(())
            }
            (id, _) => Err(ProtocolError::UnknownReportId(id)),
        },
        Model::DualShock4 => match report_id {
            // Reports shorter than the full block (the Bluetooth default
            // dialect) decode with the missing tail zeroed.
            INPUT_REPORT_USB => {
                if raw.len() < DS4_USB_MIN_SIZE {
                    return Err(ProtocolError::TruncatedReport(raw.len()));
                }
                let mut block = [0u8; DS4_STATE_SIZE];
                let len = (raw.len() - 1).min(DS4_STATE_SIZE);
                block[..len].copy_from_slice(&raw[1..1 + len]);
                let state = Ds4InputState::unpack(&block)
                    .map_err(|_| ProtocolError::TruncatedReport(raw.len()))?;
                fill_from_ds4(&state, deadzone_left, deadzone_right, slot);
                Ok(())
            }
            INPUT_REPORT_DS4_BT => {
                if raw.len() < DS4_BT_MIN_SIZE {
                    return Err(ProtocolError::TruncatedReport(raw.len()));
                }
                let state =
                    Ds4InputState::unpack_from_slice(&raw[DS4_BT_OFFSET..DS4_BT_OFFSET + DS4_STATE_SIZE])
                        .map_err(|_| ProtocolError::TruncatedReport(raw.len()))?;
                fill_from_ds4(&state, deadzone_left, deadzone_right, slot);
                Ok(())
            }
            id => Err(ProtocolError::UnknownReportId(id)),
        },
    }
}

/// Center a stick byte to -1.0..1.0 around the 128 rest point.
pub fn normalize_axis(value: u8) -> f32 {
    (value as f32 - 128.0) / 128.0
}

/// Scale a trigger byte to 0.0..1.0.
pub fn normalize_trigger(value: u8) -> f32 {
    value as f32 / 255.0
}

/// Radial deadzone. Below the deadzone radius both components are zero;
/// above it the magnitude is remapped so the deadzone boundary is 0 and the
/// unit circle is 1. Output magnitude never exceeds 1.0.
pub fn apply_deadzone(x: f32, y: f32, deadzone: f32) -> (f32, f32) {
    if deadzone >= 1.0 {
        return (0.0, 0.0);
    }
    let magnitude = (x * x + y * y).sqrt();
    let (x, y) = if deadzone <= 0.0 {
        (x, y)
    } else if magnitude < deadzone {
        return (0.0, 0.0);
    } else {
        let rescaled = (magnitude - deadzone) / (1.0 - deadzone);
        let ratio = rescaled / magnitude;
        (x * ratio, y * ratio)
    };

    let magnitude = (x * x + y * y).sqrt();
    if magnitude > 1.0 {
        (x / magnitude, y / magnitude)
    } else {
        (x, y)
    }
}

fn fill_from_state(state: &InputState, deadzone_left: f32, deadzone_right: f32, slot: &mut GamepadState) {
    let (lx, ly) = apply_deadzone(
        normalize_axis(state.joystick_l_x),
        normalize_axis(state.joystick_l_y),
        deadzone_left,
    );
    let (rx, ry) = apply_deadzone(
        normalize_axis(state.joystick_r_x),
        normalize_axis(state.joystick_r_y),
        deadzone_right,
    );
    slot.left_x = lx;
    slot.left_y = ly;
    slot.right_x = rx;
    slot.right_y = ry;
    slot.l2 = normalize_trigger(state.l2_trigger);
    slot.r2 = normalize_trigger(state.r2_trigger);

    slot.cross = state.cross;
    slot.circle = state.circle;
    slot.square = state.square;
    slot.triangle = state.triangle;
    slot.l1 = state.l1;
    slot.r1 = state.r1;
    slot.l3 = state.l3;
    slot.r3 = state.r3;
    slot.share = state.create;
    slot.options = state.options;
    slot.ps = state.ps;
    slot.mute = state.mute;
    slot.touchpad = state.touchpad;
    let (up, down, left, right) = state.dpad.to_dpad();
    slot.dpad_up = up;
    slot.dpad_down = down;
    slot.dpad_left = left;
    slot.dpad_right = right;

    let finger = &state.touch_data.touch_finger_data[0];
    slot.touch_active = finger.is_touching();
    if slot.touch_active {
        slot.touch_x = finger.get_x().min(TOUCHPAD_WIDTH - 1);
        slot.touch_y = finger.get_y().min(TOUCHPAD_HEIGHT - 1);
    }

    slot.battery = state.battery_percent();
    slot.is_charging = state.is_charging();
}

fn fill_from_simple(
    report: &SimplePackedInputDataReport,
    deadzone_left: f32,
    deadzone_right: f32,
    slot: &mut GamepadState,
) {
    let (lx, ly) = apply_deadzone(
        normalize_axis(report.joystick_l_x),
        normalize_axis(report.joystick_l_y),
        deadzone_left,
    );
    let (rx, ry) = apply_deadzone(
        normalize_axis(report.joystick_r_x),
        normalize_axis(report.joystick_r_y),
        deadzone_right,
    );
    slot.left_x = lx;
    slot.left_y = ly;
    slot.right_x = rx;
    slot.right_y = ry;
    // Simple mode carries no analog trigger values.
    slot.l2 = if report.l2 { 1.0 } else { 0.0 };
    slot.r2 = if report.r2 { 1.0 } else { 0.0 };

    slot.cross = report.cross;
    slot.circle = report.circle;
    slot.square = report.square;
    slot.triangle = report.triangle;
    slot.l1 = report.l1;
    slot.r1 = report.r1;
    slot.l3 = report.l3;
    slot.r3 = report.r3;
    slot.share = report.share;
    slot.options = report.options;
    slot.ps = report.ps;
    slot.mute = report.mute;
    slot.touchpad = report.touchpad;
    let (up, down, left, right) = report.dpad.to_dpad();
    slot.dpad_up = up;
    slot.dpad_down = down;
    slot.dpad_left = left;
    slot.dpad_right = right;

    slot.touch_active = false;
    slot.touch_x = 0;
    slot.touch_y = 0;
    slot.battery = 0;
    slot.is_charging = false;
}

fn fill_from_ds4(
    state: &Ds4InputState,
    deadzone_left: f32,
    deadzone_right: f32,
    slot: &mut GamepadState,
) {
    let (lx, ly) = apply_deadzone(
        normalize_axis(state.joystick_l_x),
        normalize_axis(state.joystick_l_y),
        deadzone_left,
    );
    let (rx, ry) = apply_deadzone(
        normalize_axis(state.joystick_r_x),
        normalize_axis(state.joystick_r_y),
        deadzone_right,
    );
    slot.left_x = lx;
    slot.left_y = ly;
    slot.right_x = rx;
    slot.right_y = ry;
    slot.l2 = normalize_trigger(state.l2_trigger);
    slot.r2 = normalize_trigger(state.r2_trigger);

    slot.cross = state.cross;
    slot.circle = state.circle;
    slot.square = state.square;
    slot.triangle = state.triangle;
    slot.l1 = state.l1;
    slot.r1 = state.r1;
    slot.l3 = state.l3;
    slot.r3 = state.r3;
    slot.share = state.share;
    slot.options = state.options;
    slot.ps = state.ps;
    slot.mute = false;
    slot.touchpad = state.touchpad;
    let (up, down, left, right) = state.dpad.to_dpad();
    slot.dpad_up = up;
    slot.dpad_down = down;
    slot.dpad_left = left;
    slot.dpad_right = right;

    slot.touch_active = false;
    slot.touch_x = 0;
    slot.touch_y = 0;
    slot.battery = state.battery_percent();
    slot.is_charging = state.cable_connected;
}
