//! Assembles the set-state block sent to the controller from the engine
//! configuration, battery level, and current rumble.

use crate::config::{AdaptiveTriggerMode, EngineConfig, TriggerConfig};
use crate::drivers::dualsense::driver::{
    LIGHTBAR_SETUP_LIGHT_OUT, PLAYER_LED_NO_FADE, PLED_CONTROL_BRIGHTNESS, VALID_FLAG0_BT,
    VALID_FLAG0_USB, VALID_FLAG1_LED, VALID_FLAG_ALL,
};
use crate::drivers::dualsense::hid_report::SetStatePayload;

use super::state::Transport;

// Adaptive trigger mode opcodes understood by the trigger motor firmware.
const TRIGGER_OP_OFF: u8 = 0x00;
const TRIGGER_OP_RIGID: u8 = 0x01;
const TRIGGER_OP_SECTION: u8 = 0x02;
const TRIGGER_OP_PULSE: u8 = 0x06;

/// Vibration frequency used for pulse-mode descriptors.
const PULSE_FREQUENCY: u8 = 25;

/// Fixed center LED shown when the battery indicator is off.
const PLAYER_LED_CENTER: u8 = 0x04;

/// Battery percentage rendered as the five player LEDs filling left to
/// right.
pub fn battery_led_mask(battery: u8) -> u8 {
    if battery >= 90 {
        0x1F
    } else if battery >= 70 {
        0x0F
    } else if battery >= 50 {
        0x07
    } else if battery >= 30 {
        0x03
    } else if battery >= 10 {
        0x01
    } else {
        0x00
    }
}

/// Encode one adaptive trigger descriptor. Byte 0 is the mode opcode, the
/// parameter positions are mode-specific. Off is all zeroes.
pub fn trigger_descriptor(config: &TriggerConfig) -> [u8; 11] {
    let mut bytes = [0u8; 11];
    match config.mode {
        AdaptiveTriggerMode::Off => {
            bytes[0] = TRIGGER_OP_OFF;
        }
        AdaptiveTriggerMode::Rigid => {
            bytes[0] = TRIGGER_OP_RIGID;
            bytes[1] = config.start;
            bytes[2] = config.force;
        }
        AdaptiveTriggerMode::Section => {
            bytes[0] = TRIGGER_OP_SECTION;
            bytes[1] = config.start;
            // The section runs from the start position to a full pull.
            bytes[2] = 0xFF;
            bytes[3] = config.force;
        }
        AdaptiveTriggerMode::Pulse => {
            bytes[0] = TRIGGER_OP_PULSE;
            bytes[1] = config.start;
            bytes[2] = config.force;
            bytes[3] = PULSE_FREQUENCY;
        }
    }
    bytes
}

/// Build the regular set-state block for the given transport.
pub fn build_set_state(
    config: &EngineConfig,
    battery: u8,
    rumble: (u8, u8),
    transport: Transport,
) -> SetStatePayload {
    let mut state = SetStatePayload::new();
    state.valid_flag0 = match transport {
        Transport::BluetoothEnhanced => VALID_FLAG0_BT,
        _ => VALID_FLAG0_USB,
    };
    state.valid_flag1 = VALID_FLAG1_LED;

    state.rumble_left = rumble.0;
    state.rumble_right = rumble.1;

    state.right_trigger = trigger_descriptor(&config.trigger_r2);
    state.left_trigger = trigger_descriptor(&config.trigger_l2);

    let mask = if config.show_battery_led {
        battery_led_mask(battery)
    } else {
        PLAYER_LED_CENTER
    };
    state.pled_control = PLED_CONTROL_BRIGHTNESS;
    state.lightbar_setup = LIGHTBAR_SETUP_LIGHT_OUT;
    state.pled_brightness = config.player_led_brightness.to_wire();
    state.player_leds = mask | PLAYER_LED_NO_FADE;

    let (red, green, blue) = config.rgb.scaled();
    state.red = red;
    state.green = green;
    state.blue = blue;

    state
}

/// The wake-up block the firmware wants to see once after a reconnect before
/// it honors lightbar writes: every valid flag raised.
pub fn build_wakeup_state(config: &EngineConfig, battery: u8) -> SetStatePayload {
    let mut state = build_set_state(config, battery, (0, 0), Transport::Usb);
    state.valid_flag0 = VALID_FLAG_ALL;
    state.valid_flag1 = VALID_FLAG_ALL;
    state
}

/// The block sent on engine shutdown: stock blue lightbar, center LED,
/// triggers released.
pub fn build_reset_state(config: &EngineConfig, transport: Transport) -> SetStatePayload {
    let mut state = SetStatePayload::new();
    state.valid_flag0 = match transport {
        Transport::BluetoothEnhanced => VALID_FLAG0_BT,
        _ => VALID_FLAG0_USB,
    };
    state.valid_flag1 = VALID_FLAG1_LED;
    state.pled_control = PLED_CONTROL_BRIGHTNESS;
    state.lightbar_setup = LIGHTBAR_SETUP_LIGHT_OUT;
    state.pled_brightness = config.player_led_brightness.to_wire();
    state.player_leds = PLAYER_LED_CENTER | PLAYER_LED_NO_FADE;
    state.blue = 255;
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlayerLedBrightness, RgbConfig};

    #[test]
    fn test_battery_led_thresholds() {
        let cases = [
            (9u8, 0x00u8),
            (10, 0x01),
            (29, 0x01),
            (30, 0x03),
            (49, 0x03),
            (50, 0x07),
            (69, 0x07),
            (70, 0x0F),
            (89, 0x0F),
            (90, 0x1F),
            (100, 0x1F),
        ];
        for (battery, mask) in cases {
            assert_eq!(battery_led_mask(battery), mask, "battery {battery}");
        }
    }

    #[test]
    fn test_trigger_descriptor_modes() {
        let rigid = trigger_descriptor(&TriggerConfig {
            mode: AdaptiveTriggerMode::Rigid,
            start: 128,
            force: 200,
        });
        assert_eq!(rigid[0], TRIGGER_OP_RIGID);
        assert_eq!(rigid[1], 128);
        assert_eq!(rigid[2], 200);

        let pulse = trigger_descriptor(&TriggerConfig {
            mode: AdaptiveTriggerMode::Pulse,
            start: 128,
            force: 200,
        });
        assert_ne!(pulse[0], rigid[0]);
        assert_ne!(pulse[..], rigid[..]);
        assert_eq!(pulse[1], 128);
        assert_eq!(pulse[2], 200);
        assert_eq!(pulse[3], PULSE_FREQUENCY);

        let off = trigger_descriptor(&TriggerConfig::default());
        assert_eq!(off, [0u8; 11]);

        let section = trigger_descriptor(&TriggerConfig {
            mode: AdaptiveTriggerMode::Section,
            start: 64,
            force: 100,
        });
        assert_eq!(section[0], TRIGGER_OP_SECTION);
        assert_eq!(section[1], 64);
        assert_eq!(section[2], 0xFF);
        assert_eq!(section[3], 100);
    }

    #[test]
    fn test_rgb_scaling_no_gamma() {
        let mut config = EngineConfig::default();
        config.rgb = RgbConfig {
            red: 200,
            green: 100,
            blue: 50,
            brightness: 255,
        };
        let state = build_set_state(&config, 0, (0, 0), Transport::Usb);
        // Full brightness passes the configured bytes through untouched.
        assert_eq!((state.red, state.green, state.blue), (200, 100, 50));

        config.rgb.brightness = 128;
        let state = build_set_state(&config, 0, (0, 0), Transport::Usb);
        assert_eq!((state.red, state.green, state.blue), (100, 50, 25));
    }

    #[test]
    fn test_player_led_selection() {
        let mut config = EngineConfig::default();
        config.show_battery_led = false;
        config.player_led_brightness = PlayerLedBrightness::Low;
        let state = build_set_state(&config, 95, (0, 0), Transport::Usb);
        assert_eq!(state.player_leds, PLAYER_LED_CENTER | PLAYER_LED_NO_FADE);
        assert_eq!(state.pled_brightness, 2);

        config.show_battery_led = true;
        let state = build_set_state(&config, 95, (0, 0), Transport::Usb);
        assert_eq!(state.player_leds, 0x1F | PLAYER_LED_NO_FADE);
    }

    #[test]
    fn test_rumble_bytes() {
        let config = EngineConfig::default();
        let state = build_set_state(&config, 0, (40, 200), Transport::Usb);
        assert_eq!(state.rumble_left, 40);
        assert_eq!(state.rumble_right, 200);
    }
}
