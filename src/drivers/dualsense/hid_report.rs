use packed_struct::{prelude::*, types::SizedInteger};

use super::crc;
use super::driver::*;

/// D-pad hat nibble values.
#[derive(PrimitiveEnum_u8, Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Direction {
    North = 0,
    NorthEast = 1,
    East = 2,
    SouthEast = 3,
    South = 4,
    SouthWest = 5,
    West = 6,
    NorthWest = 7,
    #[default]
    None = 8,
}

impl Direction {
    /// Decompose the hat value into (up, down, left, right).
    pub fn to_dpad(self) -> (bool, bool, bool, bool) {
        match self {
            Direction::North => (true, false, false, false),
            Direction::NorthEast => (true, false, false, true),
            Direction::East => (false, false, false, true),
            Direction::SouthEast => (false, true, false, true),
            Direction::South => (false, true, false, false),
            Direction::SouthWest => (false, true, true, false),
            Direction::West => (false, false, true, false),
            Direction::NorthWest => (true, false, true, false),
            Direction::None => (false, false, false, false),
        }
    }
}

/// One touch point record. The x and y coordinates are packed 12-bit values
/// sharing the middle byte; bit 7 of the context byte is clear while the
/// finger is down.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "4")]
pub struct TouchFingerData {
    #[packed_field(bytes = "0")]
    pub context: u8,
    #[packed_field(bytes = "1")]
    pub x_lo: u8,
    #[packed_field(bits = "16..=19")]
    pub y_lo: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bits = "20..=23")]
    pub x_hi: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bytes = "3")]
    pub y_hi: u8,
}

impl TouchFingerData {
    pub fn new() -> Self {
        Self {
            // Bit 7 set means no finger present.
            context: 0x80,
            x_lo: 0,
            y_lo: 0.into(),
            x_hi: 0.into(),
            y_hi: 0,
        }
    }

    pub fn get_x(&self) -> u16 {
        ((self.x_hi.to_primitive() as u16) << 8) | self.x_lo as u16
    }

    pub fn get_y(&self) -> u16 {
        ((self.y_hi as u16) << 4) | self.y_lo.to_primitive() as u16
    }

    pub fn set_x(&mut self, x: u16) {
        self.x_lo = (x & 0x00FF) as u8;
        self.x_hi = (((x >> 8) & 0x000F) as u8).into();
    }

    pub fn set_y(&mut self, y: u16) {
        self.y_lo = ((y & 0x000F) as u8).into();
        self.y_hi = ((y >> 4) & 0x00FF) as u8;
    }

    pub fn is_touching(&self) -> bool {
        self.context & 0x80 == 0
    }
}

impl Default for TouchFingerData {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "9")]
pub struct TouchData {
    #[packed_field(bytes = "0..=7", element_size_bytes = "4")]
    pub touch_finger_data: [TouchFingerData; 2],
    #[packed_field(bytes = "8")]
    pub timestamp: u8,
}

impl TouchData {
    pub fn new() -> Self {
        Self {
            touch_finger_data: [TouchFingerData::new(), TouchFingerData::new()],
            timestamp: 0,
        }
    }
}

impl Default for TouchData {
    fn default() -> Self {
        Self::new()
    }
}

/// The 63-byte input state block shared by the USB (0x01) and Bluetooth
/// enhanced (0x31) input reports. Offsets are relative to the start of the
/// block; the wrapping reports place it after their headers.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "63")]
pub struct InputState {
    #[packed_field(bytes = "0")]
    pub joystick_l_x: u8,
    #[packed_field(bytes = "1")]
    pub joystick_l_y: u8,
    #[packed_field(bytes = "2")]
    pub joystick_r_x: u8,
    #[packed_field(bytes = "3")]
    pub joystick_r_y: u8,
    #[packed_field(bytes = "4")]
    pub l2_trigger: u8,
    #[packed_field(bytes = "5")]
    pub r2_trigger: u8,
    #[packed_field(bytes = "6")]
    pub seq_number: u8,

    #[packed_field(bits = "56")]
    pub triangle: bool,
    #[packed_field(bits = "57")]
    pub circle: bool,
    #[packed_field(bits = "58")]
    pub cross: bool,
    #[packed_field(bits = "59")]
    pub square: bool,
    #[packed_field(bits = "60..=63", ty = "enum")]
    pub dpad: Direction,

    #[packed_field(bits = "64")]
    pub r3: bool,
    #[packed_field(bits = "65")]
    pub l3: bool,
    #[packed_field(bits = "66")]
    pub options: bool,
    #[packed_field(bits = "67")]
    pub create: bool,
    #[packed_field(bits = "68")]
    pub r2: bool,
    #[packed_field(bits = "69")]
    pub l2: bool,
    #[packed_field(bits = "70")]
    pub r1: bool,
    #[packed_field(bits = "71")]
    pub l1: bool,

    #[packed_field(bits = "72..=76")]
    pub reserved_buttons: Integer<u8, packed_bits::Bits<5>>,
    #[packed_field(bits = "77")]
    pub mute: bool,
    #[packed_field(bits = "78")]
    pub touchpad: bool,
    #[packed_field(bits = "79")]
    pub ps: bool,

    /// Counter, motion sensor, and sensor timestamp bytes; not decoded.
    #[packed_field(bytes = "10..=31")]
    pub reserved_motion: [u8; 22],

    #[packed_field(bytes = "32..=40")]
    pub touch_data: TouchData,

    #[packed_field(bytes = "41..=51")]
    pub reserved_status: [u8; 11],

    #[packed_field(bits = "416..=419")]
    pub battery_status: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bits = "420..=423")]
    pub battery_capacity: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bits = "424..=427")]
    pub reserved_power: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bits = "428..=431")]
    pub power_status: Integer<u8, packed_bits::Bits<4>>,

    #[packed_field(bytes = "54..=62")]
    pub reserved_trailer: [u8; 9],
}

impl InputState {
    pub fn new() -> Self {
        Self {
            joystick_l_x: 128,
            joystick_l_y: 128,
            joystick_r_x: 128,
            joystick_r_y: 128,
            l2_trigger: 0,
            r2_trigger: 0,
            seq_number: 0,
            triangle: false,
            circle: false,
            cross: false,
            square: false,
            dpad: Direction::None,
            r3: false,
            l3: false,
            options: false,
            create: false,
            r2: false,
            l2: false,
            r1: false,
            l1: false,
            reserved_buttons: 0.into(),
            mute: false,
            touchpad: false,
            ps: false,
            reserved_motion: [0; 22],
            touch_data: TouchData::new(),
            reserved_status: [0; 11],
            battery_status: 0.into(),
            battery_capacity: 0.into(),
            reserved_power: 0.into(),
            power_status: 0.into(),
            reserved_trailer: [0; 9],
        }
    }

    /// Battery charge as a percentage.
    pub fn battery_percent(&self) -> u8 {
        (self.battery_capacity.to_primitive() * 10).min(100)
    }

    /// True while the controller reports it is charging or charged.
    pub fn is_charging(&self) -> bool {
        let status = self.battery_status.to_primitive();
        let power = self.power_status.to_primitive();
        status == 0x01 || status == 0x02 || power == 0x01 || power == 0x02
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

/// USB input report (id 0x01, 64 bytes).
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "64")]
pub struct UsbPackedInputDataReport {
    #[packed_field(bytes = "0")]
    pub report_id: u8,
    #[packed_field(bytes = "1..=63")]
    pub state: InputState,
}

impl UsbPackedInputDataReport {
    pub fn new() -> Self {
        Self {
            report_id: INPUT_REPORT_USB,
            state: InputState::new(),
        }
    }
}

impl Default for UsbPackedInputDataReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Bluetooth enhanced input report (id 0x31, 78 bytes). The same state block
/// as USB shifted behind a sequence byte, with a CRC-32 trailer.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "78")]
pub struct BluetoothPackedInputDataReport {
    #[packed_field(bytes = "0")]
    pub report_id: u8,
    #[packed_field(bytes = "1")]
    pub seq_number: u8,
    #[packed_field(bytes = "2..=64")]
    pub state: InputState,
    #[packed_field(bytes = "65..=73")]
    pub reserved: [u8; 9],
    #[packed_field(bytes = "74..=77", endian = "lsb")]
    pub crc: u32,
}

/// Bluetooth simple-mode input report (id 0x01, 10 bytes). The degraded
/// format the controller speaks before the enhanced-mode handshake: digital
/// triggers, no touch coordinates, no battery.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "10")]
pub struct SimplePackedInputDataReport {
    #[packed_field(bytes = "0")]
    pub report_id: u8,
    #[packed_field(bytes = "1")]
    pub joystick_l_x: u8,
    #[packed_field(bytes = "2")]
    pub joystick_l_y: u8,
    #[packed_field(bytes = "3")]
    pub joystick_r_x: u8,
    #[packed_field(bytes = "4")]
    pub joystick_r_y: u8,

    #[packed_field(bits = "40")]
    pub triangle: bool,
    #[packed_field(bits = "41")]
    pub circle: bool,
    #[packed_field(bits = "42")]
    pub cross: bool,
    #[packed_field(bits = "43")]
    pub square: bool,
    #[packed_field(bits = "44..=47", ty = "enum")]
    pub dpad: Direction,

    #[packed_field(bits = "48")]
    pub r3: bool,
    #[packed_field(bits = "49")]
    pub l3: bool,
    #[packed_field(bits = "50")]
    pub options: bool,
    #[packed_field(bits = "51")]
    pub share: bool,
    #[packed_field(bits = "52")]
    pub r2: bool,
    #[packed_field(bits = "53")]
    pub l2: bool,
    #[packed_field(bits = "54")]
    pub r1: bool,
    #[packed_field(bits = "55")]
    pub l1: bool,

    #[packed_field(bits = "56..=60")]
    pub counter: Integer<u8, packed_bits::Bits<5>>,
    #[packed_field(bits = "61")]
    pub mute: bool,
    #[packed_field(bits = "62")]
    pub touchpad: bool,
    #[packed_field(bits = "63")]
    pub ps: bool,

    #[packed_field(bytes = "8..=9")]
    pub reserved: [u8; 2],
}

impl SimplePackedInputDataReport {
    pub fn new() -> Self {
        Self {
            report_id: INPUT_REPORT_SIMPLE,
            joystick_l_x: 128,
            joystick_l_y: 128,
            joystick_r_x: 128,
            joystick_r_y: 128,
            triangle: false,
            circle: false,
            cross: false,
            square: false,
            dpad: Direction::None,
            r3: false,
            l3: false,
            options: false,
            share: false,
            r2: false,
            l2: false,
            r1: false,
            l1: false,
            counter: 0.into(),
            mute: false,
            touchpad: false,
            ps: false,
            reserved: [0; 2],
        }
    }
}

impl Default for SimplePackedInputDataReport {
    fn default() -> Self {
        Self::new()
    }
}

/// The 12-byte DualShock 4 input block shared by its USB (0x01, offset 1)
/// and Bluetooth (0x11, offset 3) input reports. Touch coordinates are not
/// decoded for this controller.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "12")]
pub struct Ds4InputState {
    #[packed_field(bytes = "0")]
    pub joystick_l_x: u8,
    #[packed_field(bytes = "1")]
    pub joystick_l_y: u8,
    #[packed_field(bytes = "2")]
    pub joystick_r_x: u8,
    #[packed_field(bytes = "3")]
    pub joystick_r_y: u8,

    #[packed_field(bits = "32")]
    pub triangle: bool,
    #[packed_field(bits = "33")]
    pub circle: bool,
    #[packed_field(bits = "34")]
    pub cross: bool,
    #[packed_field(bits = "35")]
    pub square: bool,
    #[packed_field(bits = "36..=39", ty = "enum")]
    pub dpad: Direction,

    #[packed_field(bits = "40")]
    pub r3: bool,
    #[packed_field(bits = "41")]
    pub l3: bool,
    #[packed_field(bits = "42")]
    pub options: bool,
    #[packed_field(bits = "43")]
    pub share: bool,
    #[packed_field(bits = "44")]
    pub r2: bool,
    #[packed_field(bits = "45")]
    pub l2: bool,
    #[packed_field(bits = "46")]
    pub r1: bool,
    #[packed_field(bits = "47")]
    pub l1: bool,

    #[packed_field(bits = "48..=53")]
    pub counter: Integer<u8, packed_bits::Bits<6>>,
    #[packed_field(bits = "54")]
    pub touchpad: bool,
    #[packed_field(bits = "55")]
    pub ps: bool,

    #[packed_field(bytes = "7")]
    pub l2_trigger: u8,
    #[packed_field(bytes = "8")]
    pub r2_trigger: u8,

    #[packed_field(bytes = "9..=10")]
    pub timestamp: [u8; 2],

    #[packed_field(bits = "88..=90")]
    pub reserved_battery: Integer<u8, packed_bits::Bits<3>>,
    #[packed_field(bits = "91")]
    pub cable_connected: bool,
    #[packed_field(bits = "92..=95")]
    pub battery_level: Integer<u8, packed_bits::Bits<4>>,
}

impl Ds4InputState {
    pub fn battery_percent(&self) -> u8 {
        (self.battery_level.to_primitive() * 10).min(100)
    }
}

/// The 47-byte "set state" block shared by the USB (0x02) and Bluetooth
/// (0x31) output reports: rumble, adaptive-trigger descriptors, player LEDs,
/// and lightbar color.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "47")]
pub struct SetStatePayload {
    #[packed_field(bytes = "0")]
    pub valid_flag0: u8,
    #[packed_field(bytes = "1")]
    pub valid_flag1: u8,
    #[packed_field(bytes = "2")]
    pub rumble_right: u8,
    #[packed_field(bytes = "3")]
    pub rumble_left: u8,
    #[packed_field(bytes = "4..=9")]
    pub reserved_audio: [u8; 6],
    #[packed_field(bytes = "10..=20")]
    pub right_trigger: [u8; 11],
    #[packed_field(bytes = "21..=31")]
    pub left_trigger: [u8; 11],
    #[packed_field(bytes = "32..=37")]
    pub reserved: [u8; 6],
    #[packed_field(bytes = "38")]
    pub pled_control: u8,
    #[packed_field(bytes = "39..=40")]
    pub reserved_led: [u8; 2],
    #[packed_field(bytes = "41")]
    pub lightbar_setup: u8,
    #[packed_field(bytes = "42")]
    pub pled_brightness: u8,
    #[packed_field(bytes = "43")]
    pub player_leds: u8,
    #[packed_field(bytes = "44")]
    pub red: u8,
    #[packed_field(bytes = "45")]
    pub green: u8,
    #[packed_field(bytes = "46")]
    pub blue: u8,
}

impl SetStatePayload {
    pub fn new() -> Self {
        Self {
            valid_flag0: 0,
            valid_flag1: 0,
            rumble_right: 0,
            rumble_left: 0,
            reserved_audio: [0; 6],
            right_trigger: [0; 11],
            left_trigger: [0; 11],
            reserved: [0; 6],
            pled_control: 0,
            reserved_led: [0; 2],
            lightbar_setup: 0,
            pled_brightness: 0,
            player_leds: 0,
            red: 0,
            green: 0,
            blue: 0,
        }
    }
}

impl Default for SetStatePayload {
    fn default() -> Self {
        Self::new()
    }
}

/// USB output report (id 0x02, 48 bytes).
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "48")]
pub struct UsbPackedOutputReport {
    #[packed_field(bytes = "0")]
    pub report_id: u8,
    #[packed_field(bytes = "1..=47")]
    pub state: SetStatePayload,
}

impl UsbPackedOutputReport {
    pub fn new(state: SetStatePayload) -> Self {
        Self {
            report_id: OUTPUT_REPORT_USB,
            state,
        }
    }
}

/// Bluetooth output report (id 0x31, 78 bytes). Carries the hardware-control
/// byte (sequence in the high nibble, HID data flag in the low nibble) and
/// ends in the CRC-32 trailer over the 0xA2 direction seed.
#[derive(PackedStruct, Debug, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "78")]
pub struct BluetoothPackedOutputReport {
    #[packed_field(bytes = "0")]
    pub report_id: u8,
    #[packed_field(bytes = "1")]
    pub hw_control: u8,
    #[packed_field(bytes = "2..=48")]
    pub state: SetStatePayload,
    #[packed_field(bytes = "49..=73")]
    pub reserved: [u8; 25],
    #[packed_field(bytes = "74..=77", endian = "lsb")]
    pub crc: u32,
}

impl BluetoothPackedOutputReport {
    pub fn new(seq: u8, state: SetStatePayload) -> Self {
        Self {
            report_id: OUTPUT_REPORT_BT,
            hw_control: ((seq & 0x0F) << 4) | HW_CONTROL_DATA,
            state,
            reserved: [0; 25],
            crc: 0,
        }
    }

    /// Request that the controller drop the Bluetooth link.
    pub fn with_disconnect(mut self) -> Self {
        self.hw_control |= HW_CONTROL_DISCONNECT;
        self
    }

    /// Pack the report and fill in the CRC trailer over everything before it.
    pub fn pack_with_crc(&self) -> Result<[u8; OUTPUT_REPORT_BT_SIZE], PackingError> {
        let mut buf = self.pack()?;
        let crc = crc::crc32_output(&buf[..OUTPUT_REPORT_BT_SIZE - 4]);
        buf[OUTPUT_REPORT_BT_SIZE - 4..].copy_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }
}
