use std::error::Error;

use packed_struct::{PackedStruct, PackedStructSlice};

use super::crc;
use super::driver::{
    OUTPUT_REPORT_BT, OUTPUT_REPORT_BT_SIZE, OUTPUT_REPORT_USB, OUTPUT_REPORT_USB_SIZE,
    VALID_FLAG0_BT, VALID_FLAG1_LED,
};
use super::hid_report::{
    BluetoothPackedOutputReport, Direction, InputState, SetStatePayload,
    SimplePackedInputDataReport, UsbPackedInputDataReport, UsbPackedOutputReport,
};

#[test]
fn test_touch_finger_packing() -> Result<(), Box<dyn Error>> {
    let mut state = InputState::default();
    state.touch_data.touch_finger_data[0].set_y(1068);
    state.touch_data.touch_finger_data[0].set_x(1919);
    assert_eq!(state.touch_data.touch_finger_data[0].get_y(), 1068);
    assert_eq!(state.touch_data.touch_finger_data[0].get_x(), 1919);

    assert_eq!(
        state.touch_data.touch_finger_data[0].pack_to_vec()?,
        vec![0x80, 0x7F, 0xC7, 0x42]
    );

    // Context bit 7 set means the finger is up.
    assert!(!state.touch_data.touch_finger_data[0].is_touching());
    state.touch_data.touch_finger_data[0].context = 0x05;
    assert!(state.touch_data.touch_finger_data[0].is_touching());

    Ok(())
}

#[test]
fn test_input_report_sizes() -> Result<(), Box<dyn Error>> {
    assert_eq!(UsbPackedInputDataReport::default().pack()?.len(), 64);
    assert_eq!(SimplePackedInputDataReport::default().pack()?.len(), 10);
    Ok(())
}

#[test]
fn test_usb_input_button_bytes() -> Result<(), Box<dyn Error>> {
    let mut raw = [0u8; 64];
    raw[0] = 0x01;
    raw[1] = 128;
    raw[2] = 128;
    raw[3] = 128;
    raw[4] = 128;
    // Face nibble high, hat nibble low: cross + hat released.
    raw[8] = 0x28;
    // L1 | R3
    raw[9] = 0x81;
    // Touchpad click
    raw[10] = 0x02;

    let report = UsbPackedInputDataReport::unpack(&raw)?;
    assert!(report.state.cross);
    assert!(!report.state.square);
    assert_eq!(report.state.dpad, Direction::None);
    assert!(report.state.l1);
    assert!(report.state.r3);
    assert!(!report.state.l3);
    assert!(report.state.touchpad);
    assert!(!report.state.ps);

    // Hat 1 = up+right.
    raw[8] = 0x01;
    let report = UsbPackedInputDataReport::unpack(&raw)?;
    assert_eq!(report.state.dpad, Direction::NorthEast);
    assert_eq!(report.state.dpad.to_dpad(), (true, false, false, true));

    Ok(())
}

#[test]
fn test_usb_input_battery_byte() -> Result<(), Box<dyn Error>> {
    let mut raw = [0u8; 64];
    raw[0] = 0x01;
    // Charging at level 8.
    raw[53] = 0x18;
    let report = UsbPackedInputDataReport::unpack(&raw)?;
    assert_eq!(report.state.battery_percent(), 80);
    assert!(report.state.is_charging());

    // Level 11 clamps to 100%.
    raw[53] = 0x0B;
    let report = UsbPackedInputDataReport::unpack(&raw)?;
    assert_eq!(report.state.battery_percent(), 100);
    assert!(!report.state.is_charging());

    Ok(())
}

#[test]
fn test_simple_input_report() -> Result<(), Box<dyn Error>> {
    let raw = [0x01u8, 128, 128, 200, 55, 0x28, 0x01, 0x02, 0, 0];
    let report = SimplePackedInputDataReport::unpack_from_slice(&raw)?;
    assert!(report.cross);
    assert_eq!(report.dpad, Direction::None);
    assert!(report.l1);
    assert!(!report.r1);
    assert!(report.touchpad);
    assert!(!report.ps);
    assert_eq!(report.joystick_r_x, 200);
    assert_eq!(report.joystick_r_y, 55);
    Ok(())
}

#[test]
fn test_usb_output_report_layout() -> Result<(), Box<dyn Error>> {
    let mut state = SetStatePayload::new();
    state.valid_flag0 = VALID_FLAG0_BT;
    state.valid_flag1 = VALID_FLAG1_LED;
    state.player_leds = 0x04 | 0x20;
    state.pled_brightness = 1;
    state.red = 10;
    state.green = 20;
    state.blue = 30;
    state.right_trigger = [0x01, 128, 200, 0, 0, 0, 0, 0, 0, 0, 0];

    let buf = UsbPackedOutputReport::new(state).pack()?;
    assert_eq!(buf.len(), OUTPUT_REPORT_USB_SIZE);
    assert_eq!(buf[0], OUTPUT_REPORT_USB);
    // Right trigger descriptor sits at bytes 11..22 of the USB report.
    assert_eq!(buf[11], 0x01);
    assert_eq!(buf[12], 128);
    assert_eq!(buf[13], 200);
    // Brightness, mask and color at the tail of the block.
    assert_eq!(buf[43], 1);
    assert_eq!(buf[44], 0x24);
    assert_eq!(&buf[45..48], &[10, 20, 30]);
    Ok(())
}

#[test]
fn test_bt_output_report_crc_trailer() -> Result<(), Box<dyn Error>> {
    let mut state = SetStatePayload::new();
    state.valid_flag0 = VALID_FLAG0_BT;
    state.valid_flag1 = VALID_FLAG1_LED;
    state.red = 255;

    let report = BluetoothPackedOutputReport::new(3, state);
    let buf = report.pack_with_crc()?;
    assert_eq!(buf.len(), OUTPUT_REPORT_BT_SIZE);
    assert_eq!(buf[0], OUTPUT_REPORT_BT);
    // Sequence in the high nibble, HID data flag in the low nibble.
    assert_eq!(buf[1], 0x32);
    // Block shifted by the Bluetooth header: flags at 2..4, color at 46..49.
    assert_eq!(buf[2], VALID_FLAG0_BT);
    assert_eq!(buf[3], VALID_FLAG1_LED);
    assert_eq!(buf[46], 255);

    let expected = crc::crc32_output(&buf[..OUTPUT_REPORT_BT_SIZE - 4]);
    assert_eq!(&buf[74..78], &expected.to_le_bytes());

    // A different payload yields a different trailer.
    let mut other = state;
    other.red = 0;
    let other_buf = BluetoothPackedOutputReport::new(3, other).pack_with_crc()?;
    assert_ne!(&buf[74..78], &other_buf[74..78]);

    Ok(())
}

#[test]
fn test_bt_input_report_state_offsets() -> Result<(), Box<dyn Error>> {
    let mut raw = [0u8; 78];
    raw[0] = 0x31;
    raw[1] = 0x01;
    // Sticks at 2..6, triggers at 6..8 of the Bluetooth report.
    raw[2] = 0;
    raw[3] = 255;
    raw[6] = 255;
    // Square + cross with the hat released.
    raw[9] = 0x38;

    let report = super::hid_report::BluetoothPackedInputDataReport::unpack(&raw)?;
    assert_eq!(report.state.joystick_l_x, 0);
    assert_eq!(report.state.joystick_l_y, 255);
    assert_eq!(report.state.l2_trigger, 255);
    assert!(report.state.cross);
    assert!(report.state.square);
    assert!(!report.state.triangle);
    Ok(())
}
