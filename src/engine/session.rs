//! The per-connection worker. Runs on a blocking thread and owns the HID
//! link, the mapping engine, and the virtual output devices for the lifetime
//! of one physical connection.
//!
//! The loop is single-threaded and cooperative: drain commands, one blocking
//! read (4 ms timeout), decode, dispatch, then the outbound send check. A
//! frame is fully dispatched before the next read begins.

use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::config::EngineConfig;
use crate::drivers::dualsense::driver::{Driver, HandshakeEvent, ReadOutcome};
use crate::target::keyboard::VirtualKeyboard;
use crate::target::mouse::VirtualMouse;
use crate::target::xb360::{self, VirtualXbox360};

use super::decoder;
use super::mapping::{AnalogParams, ButtonMapping, MappingEngine, PointerDelta, SyntheticEdge};
use super::output;
use super::state::{GamepadState, Model, Transport, RAW_REPORT_MAX};

const MAX_COMMANDS_PER_CYCLE: u8 = 16;
/// Regular outbound report cadence.
const OUTPUT_PERIOD: Duration = Duration::from_millis(50);
/// Floor between two outbound writes, even for config-triggered sends.
const OUTPUT_MIN_GAP: Duration = Duration::from_millis(5);
/// UI state-update throttle (~60 Hz).
const STATUS_PERIOD: Duration = Duration::from_millis(16);
/// Unchanged frames are still published this often as a keep-alive.
const STATUS_KEEPALIVE: Duration = Duration::from_secs(1);
/// Upper bound on the frame delta fed to pointer integration.
const MAX_FRAME_DELTA: f32 = 0.05;

/// Commands applied at frame boundaries on the worker.
#[derive(Debug)]
pub enum SessionCommand {
    UpdateMappings(Vec<ButtonMapping>),
    UpdateConfig(EngineConfig),
    Disconnect,
    Stop,
}

/// Connection-level facts the supervisor mirrors into the UI status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub transport: Transport,
    pub pad_plugged: bool,
    pub uinput_available: bool,
    pub simple_mode_warning: bool,
}

/// Messages from the worker back to the supervisor.
#[derive(Debug)]
pub enum SessionEvent {
    Status(SessionStatus),
    Frame { state: GamepadState, raw: Vec<u8> },
    Ended,
}

enum LoopExit {
    Stop,
    Disconnect,
}

pub struct Session {
    driver: Driver,
    rx: mpsc::Receiver<SessionCommand>,
    events: mpsc::Sender<SessionEvent>,
    config: EngineConfig,
    mapper: MappingEngine,
    pad: Option<VirtualXbox360>,
    keyboard: Option<VirtualKeyboard>,
    mouse: Option<VirtualMouse>,
    uinput_available: bool,
    pad_plug_failed: bool,
    synthetic_failed: bool,
    state: GamepadState,
    raw: [u8; RAW_REPORT_MAX],
    raw_len: usize,
    rumble: (u8, u8),
    output_dirty: bool,
    pending_wakeup: bool,
    last_output: Instant,
    last_dispatch: Instant,
    last_status: Instant,
    last_emitted: GamepadState,
    last_transport: Transport,
}

impl Session {
    pub fn new(
        driver: Driver,
        config: EngineConfig,
        mappings: Vec<ButtonMapping>,
        rx: mpsc::Receiver<SessionCommand>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let now = Instant::now();
        let transport = driver.transport();
        Self {
            driver,
            rx,
            events,
            config,
            mapper: MappingEngine::new(mappings),
            pad: None,
            keyboard: None,
            mouse: None,
            uinput_available: xb360::uinput_available(),
            pad_plug_failed: false,
            synthetic_failed: false,
            state: GamepadState::default(),
            raw: [0; RAW_REPORT_MAX],
            raw_len: 0,
            rumble: (0, 0),
            output_dirty: false,
            pending_wakeup: false,
            last_output: now,
            last_dispatch: now,
            last_status: now,
            last_emitted: GamepadState::default(),
            last_transport: transport,
        }
    }

    /// Run the worker loop until the transport is lost or the supervisor
    /// asks for a stop.
    pub fn run(mut self) {
        let mut buf = [0u8; 256];
        self.emit_status();

        loop {
            match self.drain_commands() {
                Some(LoopExit::Stop) => {
                    self.shutdown(true);
                    return;
                }
                Some(LoopExit::Disconnect) => {
                    log::info!("Disconnect requested, releasing controller");
                    self.driver.send_disconnect();
                    self.shutdown(false);
                    return;
                }
                None => (),
            }

            match self.driver.tick_handshake() {
                Ok(HandshakeEvent::GaveUp) => self.emit_status(),
                Ok(_) => (),
                Err(e) => log::warn!("Enhanced-mode handshake: {e}"),
            }

            match self.driver.read(&mut buf) {
                Ok(ReadOutcome::Data(len)) => {
                    if self.driver.transport() != self.last_transport {
                        self.last_transport = self.driver.transport();
                        self.output_dirty = true;
                        self.emit_status();
                    }
                    let raw = &buf[..len];
                    let decoded = decoder::decode_frame(
                        raw,
                        self.driver.model(),
                        self.driver.transport(),
                        self.config.deadzone_left,
                        self.config.deadzone_right,
                        &mut self.state,
                    );
                    match decoded {
                        Ok(()) => {
                            self.raw_len = len.min(RAW_REPORT_MAX);
                            self.raw[..self.raw_len].copy_from_slice(&raw[..self.raw_len]);
                            if !self.driver.is_active() {
                                self.driver.mark_active();
                                if self.driver.model() == Model::DualSense {
                                    self.pending_wakeup = true;
                                }
                                self.emit_status();
                            }
                            self.dispatch_frame();
                        }
                        Err(e) => log::debug!("Skipping frame: {e}"),
                    }
                }
                Ok(ReadOutcome::Timeout) => {
                    // Keep pointer motion smooth while the controller idles
                    // with a stick held.
                    if self.driver.is_active() {
                        self.dispatch_frame();
                    }
                }
                Err(e) => {
                    log::warn!("Controller read failed, closing link: {e}");
                    self.shutdown(false);
                    return;
                }
            }

            self.poll_rumble();
            self.maybe_send_output();
            self.maybe_emit_frame();
        }
    }

    fn drain_commands(&mut self) -> Option<LoopExit> {
        for _ in 0..MAX_COMMANDS_PER_CYCLE {
            match self.rx.try_recv() {
                Ok(SessionCommand::UpdateMappings(mappings)) => {
                    self.mapper.set_mappings(mappings);
                }
                Ok(SessionCommand::UpdateConfig(config)) => {
                    if config != self.config {
                        self.config = config;
                        self.output_dirty = true;
                    }
                }
                Ok(SessionCommand::Disconnect) => return Some(LoopExit::Disconnect),
                Ok(SessionCommand::Stop) => return Some(LoopExit::Stop),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => return Some(LoopExit::Stop),
            }
        }
        None
    }

    /// Evaluate the mapping set against the current frame and feed every
    /// sink.
    fn dispatch_frame(&mut self) {
        let now = Instant::now();
        let dt = (now - self.last_dispatch).as_secs_f32().min(MAX_FRAME_DELTA);
        self.last_dispatch = now;

        let params = AnalogParams {
            mouse_sens_left: self.config.mouse_sens_left,
            mouse_sens_right: self.config.mouse_sens_right,
            mouse_sens_touchpad: self.config.mouse_sens_touchpad,
        };
        let out = self.mapper.evaluate(&self.state, &params, dt);

        self.plug_pad_if_needed();
        if let Some(pad) = self.pad.as_mut() {
            if let Err(e) = pad.submit(&out.pad) {
                log::warn!("Virtual pad submit failed: {e:?}");
            }
        }

        self.apply_edges(&out.edges);
        self.apply_pointer(out.pointer);
    }

    /// Plug the virtual pad lazily on the first dispatched frame after a
    /// disconnect gap.
    fn plug_pad_if_needed(&mut self) {
        if self.pad.is_some() || self.pad_plug_failed {
            return;
        }
        if !self.uinput_available {
            return;
        }
        match VirtualXbox360::new() {
            Ok(pad) => {
                log::info!("Virtual Xbox 360 pad plugged");
                self.pad = Some(pad);
                self.emit_status();
            }
            Err(e) => {
                log::warn!("Could not plug virtual pad, continuing without: {e:?}");
                self.pad_plug_failed = true;
                self.uinput_available = false;
                self.emit_status();
            }
        }
    }

    fn apply_edges(&mut self, edges: &[SyntheticEdge]) {
        for edge in edges {
            let result = match edge {
                SyntheticEdge::KeyDown(code) => self.with_keyboard(|kb| kb.key(*code, true)),
                SyntheticEdge::KeyUp(code) => self.with_keyboard(|kb| kb.key(*code, false)),
                SyntheticEdge::MouseDown(button) => self.with_mouse(|m| m.button(*button, true)),
                SyntheticEdge::MouseUp(button) => self.with_mouse(|m| m.button(*button, false)),
            };
            if let Err(e) = result {
                log::warn!("Synthetic input failed: {e:?}");
            }
        }
    }

    fn apply_pointer(&mut self, delta: PointerDelta) {
        if delta.dx != 0 || delta.dy != 0 {
            if let Err(e) = self.with_mouse(|m| m.motion(delta.dx, delta.dy)) {
                log::warn!("Pointer motion failed: {e:?}");
            }
        }
        if delta.wheel != 0 {
            if let Err(e) = self.with_mouse(|m| m.wheel(delta.wheel)) {
                log::warn!("Wheel motion failed: {e:?}");
            }
        }
    }

    fn with_keyboard<F>(&mut self, f: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: FnOnce(&mut VirtualKeyboard) -> Result<(), Box<dyn std::error::Error + Send + Sync>>,
    {
        if self.keyboard.is_none() && !self.synthetic_failed {
            match VirtualKeyboard::new() {
                Ok(keyboard) => self.keyboard = Some(keyboard),
                Err(e) => {
                    self.synthetic_failed = true;
                    return Err(e);
                }
            }
        }
        match self.keyboard.as_mut() {
            Some(keyboard) => f(keyboard),
            None => Ok(()),
        }
    }

    fn with_mouse<F>(&mut self, f: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: FnOnce(&mut VirtualMouse) -> Result<(), Box<dyn std::error::Error + Send + Sync>>,
    {
        if self.mouse.is_none() && !self.synthetic_failed {
            match VirtualMouse::new() {
                Ok(mouse) => self.mouse = Some(mouse),
                Err(e) => {
                    self.synthetic_failed = true;
                    return Err(e);
                }
            }
        }
        match self.mouse.as_mut() {
            Some(mouse) => f(mouse),
            None => Ok(()),
        }
    }

    fn poll_rumble(&mut self) {
        let Some(pad) = self.pad.as_mut() else {
            return;
        };
        let rumble = pad.poll_rumble();
        if rumble != self.rumble {
            self.rumble = rumble;
            self.output_dirty = true;
        }
    }

    /// Outbound cadence: a 50 ms periodic send, with config mutations
    /// coalesced into an immediate send no closer than 5 ms to the previous
    /// write. Nothing is sent while the link is in simple mode.
    fn maybe_send_output(&mut self) {
        if self.driver.model() != Model::DualSense || !self.driver.is_active() {
            return;
        }
        if !matches!(
            self.driver.transport(),
            Transport::Usb | Transport::BluetoothEnhanced
        ) {
            return;
        }

        let elapsed = self.last_output.elapsed();
        if self.pending_wakeup {
            if elapsed >= OUTPUT_MIN_GAP {
                let state = output::build_wakeup_state(&self.config, self.state.battery);
                if let Err(e) = self.driver.write_state(&state) {
                    log::warn!("Wake-up report failed: {e}");
                }
                self.pending_wakeup = false;
                self.output_dirty = true;
                self.last_output = Instant::now();
            }
            return;
        }

        if (self.output_dirty && elapsed >= OUTPUT_MIN_GAP) || elapsed >= OUTPUT_PERIOD {
            let state = output::build_set_state(
                &self.config,
                self.state.battery,
                self.rumble,
                self.driver.transport(),
            );
            match self.driver.write_state(&state) {
                Ok(()) => self.output_dirty = false,
                Err(e) => log::warn!("Output report failed: {e}"),
            }
            self.last_output = Instant::now();
        }
    }

    fn maybe_emit_frame(&mut self) {
        if self.last_status.elapsed() < STATUS_PERIOD {
            return;
        }
        let changed = self.state != self.last_emitted;
        if !changed && self.last_status.elapsed() < STATUS_KEEPALIVE {
            return;
        }
        let event = SessionEvent::Frame {
            state: self.state,
            raw: self.raw[..self.raw_len].to_vec(),
        };
        // Dropping a frame is fine; the next one supersedes it.
        let _ = self.events.try_send(event);
        self.last_emitted = self.state;
        self.last_status = Instant::now();
    }

    fn emit_status(&mut self) {
        let status = SessionStatus {
            transport: self.driver.transport(),
            pad_plugged: self.pad.is_some(),
            uinput_available: self.uinput_available,
            simple_mode_warning: self.driver.simple_mode_locked(),
        };
        let _ = self.events.blocking_send(SessionEvent::Status(status));
    }

    /// Common teardown: release held synthetic input, optionally restore the
    /// controller LEDs, unplug everything, and tell the supervisor.
    fn shutdown(&mut self, reset_leds: bool) {
        let edges = self.mapper.release_all();
        self.apply_edges(&edges);

        if reset_leds && self.driver.is_active() {
            let state = output::build_reset_state(&self.config, self.driver.transport());
            if let Err(e) = self.driver.write_state(&state) {
                log::debug!("LED reset on shutdown failed: {e}");
            }
        }

        // Dropping the devices unplugs them; their Drop impls also release
        // anything still held if the edge pass above was incomplete.
        self.pad = None;
        self.keyboard = None;
        self.mouse = None;

        let _ = self.events.blocking_send(SessionEvent::Ended);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("driver", &self.driver)
            .field("transport", &self.last_transport)
            .finish()
    }
}
