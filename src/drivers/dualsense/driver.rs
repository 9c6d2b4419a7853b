use std::time::{Duration, Instant};

use hidapi::{BusType, DeviceInfo, HidApi, HidDevice};
use packed_struct::PackedStruct;
use thiserror::Error;

use crate::engine::state::{Model, Transport};

use super::crc;
use super::hid_report::{BluetoothPackedOutputReport, SetStatePayload, UsbPackedOutputReport};

pub const VID_SONY: u16 = 0x054C;
pub const PID_DUALSENSE: u16 = 0x0CE6;
pub const PID_DS4_V1: u16 = 0x05C4;
pub const PID_DS4_V2: u16 = 0x09CC;

pub const INPUT_REPORT_USB: u8 = 0x01;
pub const INPUT_REPORT_USB_SIZE: usize = 64;
pub const INPUT_REPORT_BT: u8 = 0x31;
pub const INPUT_REPORT_BT_SIZE: usize = 78;
pub const INPUT_REPORT_SIMPLE: u8 = 0x01;
pub const INPUT_REPORT_SIMPLE_SIZE: usize = 10;
pub const INPUT_REPORT_DS4_BT: u8 = 0x11;

pub const OUTPUT_REPORT_USB: u8 = 0x02;
pub const OUTPUT_REPORT_USB_SIZE: usize = 48;
pub const OUTPUT_REPORT_BT: u8 = 0x31;
pub const OUTPUT_REPORT_BT_SIZE: usize = 78;

/// Reading the calibration feature report flips the DualSense firmware into
/// the enhanced (0x31) Bluetooth input format.
pub const FEATURE_REPORT_CALIBRATION: u8 = 0x05;
/// DualShock 4 equivalent of the calibration read.
pub const FEATURE_REPORT_DS4_CALIBRATION: u8 = 0x02;

// Hardware-control byte of Bluetooth output reports.
pub const HW_CONTROL_DATA: u8 = 0x02;
pub const HW_CONTROL_DISCONNECT: u8 = 0x40;

// Valid-flag bytes of the set-state block.
pub const VALID_FLAG0_USB: u8 = 0xF7;
pub const VALID_FLAG0_BT: u8 = 0xFF;
pub const VALID_FLAG1_LED: u8 = 0x15;
pub const VALID_FLAG_ALL: u8 = 0xFF;

pub const PLED_CONTROL_BRIGHTNESS: u8 = 0x01;
pub const LIGHTBAR_SETUP_LIGHT_OUT: u8 = 0x02;
/// Latch the player LED mask without the firmware fade-in animation.
pub const PLAYER_LED_NO_FADE: u8 = 0x20;

pub const TOUCHPAD_WIDTH: u16 = 1920;
pub const TOUCHPAD_HEIGHT: u16 = 1080;

const READ_TIMEOUT_MS: i32 = 4;
const READ_FAILURE_LIMIT: u8 = 3;
const READ_FAILURE_WINDOW: Duration = Duration::from_millis(200);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(500);
const HANDSHAKE_ATTEMPTS: u8 = 2;
const DISCONNECT_BURST: usize = 10;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no supported controller found")]
    NotFound,
    #[error("could not open controller: {0}")]
    OpenDenied(String),
    #[error("read timed out")]
    ReadTimeout,
    #[error("read failed: {0}")]
    ReadFailed(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown input report id 0x{0:02X}")]
    UnknownReportId(u8),
    #[error("input report truncated to {0} bytes")]
    TruncatedReport(usize),
    #[error("feature report failed CRC validation during handshake")]
    HandshakeCrcMismatch,
}

/// Result of one read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(usize),
    Timeout,
}

/// What the per-cycle handshake bookkeeping did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeEvent {
    Idle,
    Requested,
    GaveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Opened,
    Active,
}

/// Pick the best controller interface currently attached. Prefers the
/// interface advertising the Generic Desktop / Gamepad usage; an interface
/// with no usage information is kept as a fallback.
pub fn find_controller(api: &HidApi) -> Option<DeviceInfo> {
    let mut fallback: Option<&DeviceInfo> = None;
    for info in api.device_list() {
        if info.vendor_id() != VID_SONY {
            continue;
        }
        let pid = info.product_id();
        if ![PID_DUALSENSE, PID_DS4_V1, PID_DS4_V2].contains(&pid) {
            continue;
        }
        if info.usage_page() == 0x01 && info.usage() == 0x05 {
            return Some(info.clone());
        }
        if fallback.is_none() && info.usage_page() == 0 {
            fallback = Some(info);
        }
    }
    fallback.cloned()
}

/// An open HID link to a controller. Owns transport classification, the
/// Bluetooth enhanced-mode handshake, read failure tracking, and the
/// outbound write path.
pub struct Driver {
    device: HidDevice,
    model: Model,
    transport: Transport,
    link: LinkState,
    name: String,
    path: String,
    handshake_attempts: u8,
    handshake_deadline: Option<Instant>,
    /// Set once the handshake has been abandoned; the link stays in simple
    /// mode and the UI shows a warning.
    simple_mode_locked: bool,
    seq: u8,
    read_failures: u8,
    first_failure: Option<Instant>,
}

impl Driver {
    pub fn open(api: &HidApi, info: &DeviceInfo) -> Result<Self, TransportError> {
        let device = info
            .open_device(api)
            .map_err(|e| TransportError::OpenDenied(e.to_string()))?;

        let model = match info.product_id() {
            PID_DUALSENSE => Model::DualSense,
            _ => Model::DualShock4,
        };
        // hidraw exposes the underlying bus; Bluetooth links also surface as
        // interface -1.
        let bluetooth =
            matches!(info.bus_type(), BusType::Bluetooth) || info.interface_number() == -1;
        let transport = if bluetooth {
            Transport::BluetoothSimple
        } else {
            Transport::Usb
        };

        log::info!(
            "Opened {model} over {transport} (pid 0x{:04X})",
            info.product_id()
        );

        Ok(Self {
            device,
            model,
            transport,
            link: LinkState::Opened,
            name: info.product_string().unwrap_or("Unknown").to_string(),
            path: info.path().to_string_lossy().to_string(),
            handshake_attempts: 0,
            handshake_deadline: None,
            simple_mode_locked: false,
            seq: 0,
            read_failures: 0,
            first_failure: None,
        })
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_active(&self) -> bool {
        self.link == LinkState::Active
    }

    /// Whether the enhanced-mode handshake has been abandoned.
    pub fn simple_mode_locked(&self) -> bool {
        self.simple_mode_locked
    }

    /// Mark the link active after the first successfully decoded frame.
    pub fn mark_active(&mut self) {
        if self.link != LinkState::Active {
            self.link = LinkState::Active;
            log::info!("Controller link active over {}", self.transport);
        }
    }

    /// Read one input report. Timeouts are not failures; read errors are
    /// classified as a disconnect once three of them land inside a 200 ms
    /// window.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome, TransportError> {
        match self.device.read_timeout(buf, READ_TIMEOUT_MS) {
            Ok(0) => Ok(ReadOutcome::Timeout),
            Ok(len) => {
                self.read_failures = 0;
                self.first_failure = None;
                self.note_report_id(buf[0]);
                Ok(ReadOutcome::Data(len))
            }
            Err(e) => {
                let now = Instant::now();
                match self.first_failure {
                    Some(first) if now.duration_since(first) <= READ_FAILURE_WINDOW => {
                        self.read_failures += 1;
                    }
                    _ => {
                        self.first_failure = Some(now);
                        self.read_failures = 1;
                    }
                }
                if self.read_failures >= READ_FAILURE_LIMIT {
                    return Err(TransportError::ReadFailed(e.to_string()));
                }
                log::debug!("Transient read failure ({}): {e}", self.read_failures);
                Ok(ReadOutcome::Timeout)
            }
        }
    }

    /// Promote the transport when the firmware starts speaking the enhanced
    /// dialect.
    fn note_report_id(&mut self, id: u8) {
        if self.transport != Transport::BluetoothSimple {
            return;
        }
        let enhanced = match self.model {
            Model::DualSense => INPUT_REPORT_BT,
            Model::DualShock4 => INPUT_REPORT_DS4_BT,
        };
        if id == enhanced {
            self.transport = Transport::BluetoothEnhanced;
            self.handshake_deadline = None;
            self.simple_mode_locked = false;
            log::info!("Bluetooth link promoted to enhanced mode (report 0x{id:02X})");
        }
    }

    /// Drive the enhanced-mode handshake. Called every worker cycle; sends
    /// the feature-report request when due and gives up after two attempts.
    pub fn tick_handshake(&mut self) -> Result<HandshakeEvent, ProtocolError> {
        if self.transport != Transport::BluetoothSimple || self.simple_mode_locked {
            return Ok(HandshakeEvent::Idle);
        }
        match self.handshake_deadline {
            None => self.request_enhanced_mode(),
            Some(deadline) if Instant::now() >= deadline => {
                if self.handshake_attempts >= HANDSHAKE_ATTEMPTS {
                    self.simple_mode_locked = true;
                    log::warn!(
                        "Controller is stuck in Bluetooth simple mode; triggers, touch and \
                         battery are unavailable"
                    );
                    return Ok(HandshakeEvent::GaveUp);
                }
                self.request_enhanced_mode()
            }
            Some(_) => Ok(HandshakeEvent::Idle),
        }
    }

    fn request_enhanced_mode(&mut self) -> Result<HandshakeEvent, ProtocolError> {
        self.handshake_attempts += 1;
        self.handshake_deadline = Some(Instant::now() + HANDSHAKE_TIMEOUT);

        let report_id = match self.model {
            Model::DualSense => FEATURE_REPORT_CALIBRATION,
            Model::DualShock4 => FEATURE_REPORT_DS4_CALIBRATION,
        };
        let mut buf = [0u8; 64];
        buf[0] = report_id;
        match self.device.get_feature_report(&mut buf) {
            Ok(len) => {
                log::debug!(
                    "Requested enhanced mode via feature report 0x{report_id:02X} ({len} bytes, \
                     attempt {})",
                    self.handshake_attempts
                );
                // Bluetooth feature replies carry the 0xA3-seeded CRC trailer.
                if len >= 8 {
                    let mut trailer = [0u8; 4];
                    trailer.copy_from_slice(&buf[len - 4..len]);
                    let expected = u32::from_le_bytes(trailer);
                    if crc::crc32_feature(&buf[..len - 4]) != expected {
                        return Err(ProtocolError::HandshakeCrcMismatch);
                    }
                }
                Ok(HandshakeEvent::Requested)
            }
            Err(e) => {
                log::warn!(
                    "Enhanced-mode feature request failed (attempt {}): {e}",
                    self.handshake_attempts
                );
                Ok(HandshakeEvent::Requested)
            }
        }
    }

    /// Send one set-state report over the current transport. No reports are
    /// sent in simple mode; fighting the firmware there glitches the
    /// lightbar.
    pub fn write_state(&mut self, state: &SetStatePayload) -> Result<(), TransportError> {
        if self.model != Model::DualSense {
            return Ok(());
        }
        match self.transport {
            Transport::Usb => {
                let report = UsbPackedOutputReport::new(*state);
                let buf = report
                    .pack()
                    .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
                self.device
                    .write(&buf)
                    .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
                Ok(())
            }
            Transport::BluetoothEnhanced => {
                let report = BluetoothPackedOutputReport::new(self.next_seq(), *state);
                let buf = report
                    .pack_with_crc()
                    .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
                self.device
                    .write(&buf)
                    .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
                Ok(())
            }
            Transport::BluetoothSimple | Transport::Disconnected => Ok(()),
        }
    }

    /// Ask a Bluetooth controller to drop the link. The firmware wants a
    /// short burst before it lets go.
    pub fn send_disconnect(&mut self) {
        if self.model != Model::DualSense || self.transport != Transport::BluetoothEnhanced {
            return;
        }
        let mut state = SetStatePayload::new();
        state.valid_flag0 = VALID_FLAG0_USB;
        state.valid_flag1 = VALID_FLAG1_LED;
        for _ in 0..DISCONNECT_BURST {
            let report =
                BluetoothPackedOutputReport::new(self.next_seq(), state).with_disconnect();
            match report.pack_with_crc() {
                Ok(buf) => {
                    if let Err(e) = self.device.write(&buf) {
                        log::debug!("Disconnect request write failed: {e}");
                        return;
                    }
                }
                Err(e) => {
                    log::debug!("Disconnect request packing failed: {e}");
                    return;
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn next_seq(&mut self) -> u8 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("model", &self.model)
            .field("transport", &self.transport)
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}
