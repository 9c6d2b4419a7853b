use crate::drivers::dualsense::driver::ProtocolError;
use crate::engine::decoder::{apply_deadzone, decode_frame, normalize_axis, normalize_trigger};
use crate::engine::state::{GamepadState, Model, Transport};

/// Minimal USB input report with centered sticks and a released hat.
fn usb_report() -> [u8; 64] {
    let mut raw = [0u8; 64];
    raw[0] = 0x01;
    raw[1] = 128;
    raw[2] = 128;
    raw[3] = 128;
    raw[4] = 128;
    raw[8] = 0x08;
    raw
}

#[test]
fn test_stick_center_is_zero() {
    let raw = usb_report();
    let mut state = GamepadState::default();
    decode_frame(&raw, Model::DualSense, Transport::Usb, 0.0, 0.0, &mut state).unwrap();
    assert_eq!(state.left_x, 0.0);
    assert_eq!(state.left_y, 0.0);
    assert_eq!(state.right_x, 0.0);
    assert_eq!(state.right_y, 0.0);
}

#[test]
fn test_trigger_boundaries() {
    let mut raw = usb_report();
    raw[5] = 255;
    raw[6] = 0;
    let mut state = GamepadState::default();
    decode_frame(&raw, Model::DualSense, Transport::Usb, 0.0, 0.0, &mut state).unwrap();
    assert_eq!(state.l2, 1.0);
    assert_eq!(state.r2, 0.0);
}

#[test]
fn test_normalize_helpers() {
    assert_eq!(normalize_axis(128), 0.0);
    assert_eq!(normalize_axis(0), -1.0);
    assert!(normalize_axis(255) > 0.99);
    assert_eq!(normalize_trigger(0), 0.0);
    assert_eq!(normalize_trigger(255), 1.0);
}

#[test]
fn test_deadzone_zero_is_identity() {
    let (x, y) = apply_deadzone(0.3, -0.4, 0.0);
    assert_eq!((x, y), (0.3, -0.4));
}

#[test]
fn test_deadzone_one_forces_zero() {
    assert_eq!(apply_deadzone(1.0, 0.0, 1.0), (0.0, 0.0));
    assert_eq!(apply_deadzone(-0.5, 0.9, 1.0), (0.0, 0.0));
}

#[test]
fn test_deadzone_is_radial() {
    // Inside the radius both components collapse to zero.
    assert_eq!(apply_deadzone(0.05, 0.05, 0.1), (0.0, 0.0));

    // Just past the boundary the output is small, not clipped per-axis.
    let (x, y) = apply_deadzone(0.2, 0.0, 0.1);
    assert!(x > 0.0 && x < 0.2);
    assert_eq!(y, 0.0);

    // The boundary itself maps to zero magnitude.
    let (x, y) = apply_deadzone(0.1, 0.0, 0.1);
    assert!(x.abs() < 1e-6);
    assert_eq!(y, 0.0);
}

#[test]
fn test_stick_magnitude_never_exceeds_one() {
    for deadzone in [0.0f32, 0.1, 0.5] {
        for (bx, by) in [(0u8, 0u8), (255, 0), (0, 255), (255, 255), (37, 201)] {
            let (x, y) = apply_deadzone(normalize_axis(bx), normalize_axis(by), deadzone);
            let magnitude = (x * x + y * y).sqrt();
            assert!(
                magnitude <= 1.0 + 1e-6,
                "magnitude {magnitude} for bytes ({bx}, {by}) deadzone {deadzone}"
            );
        }
    }
}

#[test]
fn test_usb_button_decode() {
    let mut raw = usb_report();
    // Cross plus hat released.
    raw[8] = 0x28;
    let mut state = GamepadState::default();
    decode_frame(&raw, Model::DualSense, Transport::Usb, 0.0, 0.0, &mut state).unwrap();
    assert!(state.cross);
    assert!(!state.square);
    assert!(!state.dpad_up);
}

#[test]
fn test_bt_enhanced_touch_decode() {
    let mut raw = [0u8; 78];
    raw[0] = 0x31;
    raw[2] = 128;
    raw[3] = 128;
    raw[4] = 128;
    raw[5] = 128;
    raw[9] = 0x08;
    // Finger 0 record starts at byte 34: context (active), x lo, shared
    // nibble byte, y hi.
    raw[34] = 0x01;
    raw[35] = 0x7F;
    raw[36] = 0xC7;
    raw[37] = 0x42;

    let mut state = GamepadState::default();
    decode_frame(
        &raw,
        Model::DualSense,
        Transport::BluetoothEnhanced,
        0.0,
        0.0,
        &mut state,
    )
    .unwrap();
    assert!(state.touch_active);
    assert_eq!(state.touch_x, 1919);
    assert_eq!(state.touch_y, 1068);
}

#[test]
fn test_bt_simple_decode() {
    // Cross held, digital L2, touchpad clicked.
    let raw = [0x01u8, 128, 128, 128, 128, 0x28, 0x04, 0x02, 0, 0];
    let mut state = GamepadState::default();
    state.battery = 55;
    decode_frame(
        &raw,
        Model::DualSense,
        Transport::BluetoothSimple,
        0.0,
        0.0,
        &mut state,
    )
    .unwrap();
    assert!(state.cross);
    assert_eq!(state.l2, 1.0);
    assert!(state.touchpad);
    assert!(!state.touch_active);
    // Battery is unavailable in simple mode.
    assert_eq!(state.battery, 0);
}

#[test]
fn test_ds4_usb_decode() {
    let mut raw = [0u8; 64];
    raw[0] = 0x01;
    raw[1] = 128;
    raw[2] = 128;
    raw[3] = 128;
    raw[4] = 128;
    // Triangle plus hat released.
    raw[5] = 0x88;
    // Share
    raw[6] = 0x10;
    raw[8] = 200;
    // Charging at level 7.
    raw[12] = 0x17;

    let mut state = GamepadState::default();
    decode_frame(&raw, Model::DualShock4, Transport::Usb, 0.0, 0.0, &mut state).unwrap();
    assert!(state.triangle);
    assert!(state.share);
    assert_eq!(state.l2, 200.0 / 255.0);
    assert_eq!(state.battery, 70);
    assert!(state.is_charging);
}

#[test]
fn test_unknown_report_id() {
    let raw = [0x77u8; 64];
    let mut state = GamepadState::default();
    let result = decode_frame(&raw, Model::DualSense, Transport::Usb, 0.0, 0.0, &mut state);
    assert_eq!(result, Err(ProtocolError::UnknownReportId(0x77)));
}

#[test]
fn test_truncated_report() {
    let raw = [0x01u8, 0, 0];
    let mut state = GamepadState::default();
    let result = decode_frame(&raw, Model::DualSense, Transport::Usb, 0.0, 0.0, &mut state);
    assert_eq!(result, Err(ProtocolError::TruncatedReport(3)));
}
