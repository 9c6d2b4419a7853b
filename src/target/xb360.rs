//! Virtual Xbox 360 pad backed by uinput.

use std::collections::HashMap;
use std::error::Error;
use std::os::fd::AsRawFd;
use std::path::Path;

use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AbsInfo, AbsoluteAxisCode, AttributeSet, EventSummary, EventType, FFEffectCode, FFEffectData,
    FFEffectKind, InputEvent, InputId, KeyCode, SynchronizationCode, SynchronizationEvent,
    UInputCode, UinputAbsSetup,
};
use nix::fcntl::{FcntlArg, OFlag};

use crate::engine::mapping::{
    XboxPadState, XBOX_A, XBOX_B, XBOX_BACK, XBOX_DPAD_DOWN, XBOX_DPAD_LEFT, XBOX_DPAD_RIGHT,
    XBOX_DPAD_UP, XBOX_GUIDE, XBOX_LB, XBOX_LEFT_THUMB, XBOX_RB, XBOX_RIGHT_THUMB, XBOX_START,
    XBOX_X, XBOX_Y,
};

const UINPUT_NODE: &str = "/dev/uinput";
const MAX_FF_EFFECTS: u32 = 16;

/// Identify to the kernel as a wired Microsoft Xbox 360 pad.
const XBOX_VENDOR: u16 = 0x045E;
const XBOX_PRODUCT: u16 = 0x028E;
const XBOX_VERSION: u16 = 0x0001;

const BUTTON_KEYS: [(u16, KeyCode); 11] = [
    (XBOX_A, KeyCode::BTN_SOUTH),
    (XBOX_B, KeyCode::BTN_EAST),
    (XBOX_X, KeyCode::BTN_NORTH),
    (XBOX_Y, KeyCode::BTN_WEST),
    (XBOX_LB, KeyCode::BTN_TL),
    (XBOX_RB, KeyCode::BTN_TR),
    (XBOX_BACK, KeyCode::BTN_SELECT),
    (XBOX_START, KeyCode::BTN_START),
    (XBOX_GUIDE, KeyCode::BTN_MODE),
    (XBOX_LEFT_THUMB, KeyCode::BTN_THUMBL),
    (XBOX_RIGHT_THUMB, KeyCode::BTN_THUMBR),
];

/// Whether the kernel's virtual-input bus is usable by this process.
pub fn uinput_available() -> bool {
    Path::new(UINPUT_NODE).exists()
        && std::fs::OpenOptions::new()
            .write(true)
            .open(UINPUT_NODE)
            .is_ok()
}

/// One plugged virtual Xbox 360 pad. Dropping it unplugs the device. The pad
/// also owns the force-feedback queue: rumble effects uploaded by games are
/// recorded here and polled by the worker for the outbound report.
pub struct VirtualXbox360 {
    device: VirtualDevice,
    last: XboxPadState,
    effects: HashMap<i16, FFEffectData>,
    rumble: (u8, u8),
}

impl VirtualXbox360 {
    pub fn new() -> Result<Self, Box<dyn Error + Send + Sync>> {
        let device = Self::create_virtual_device()?;
        Ok(Self {
            device,
            last: XboxPadState::default(),
            effects: HashMap::new(),
            rumble: (0, 0),
        })
    }

    fn create_virtual_device() -> Result<VirtualDevice, Box<dyn Error + Send + Sync>> {
        let mut keys = AttributeSet::<KeyCode>::new();
        for (_, key) in BUTTON_KEYS {
            keys.insert(key);
        }

        let joystick_setup = AbsInfo::new(0, -32768, 32767, 16, 128, 1);
        let abs_x = UinputAbsSetup::new(AbsoluteAxisCode::ABS_X, joystick_setup);
        let abs_y = UinputAbsSetup::new(AbsoluteAxisCode::ABS_Y, joystick_setup);
        let abs_rx = UinputAbsSetup::new(AbsoluteAxisCode::ABS_RX, joystick_setup);
        let abs_ry = UinputAbsSetup::new(AbsoluteAxisCode::ABS_RY, joystick_setup);
        let triggers_setup = AbsInfo::new(0, 0, 255, 0, 0, 1);
        let abs_z = UinputAbsSetup::new(AbsoluteAxisCode::ABS_Z, triggers_setup);
        let abs_rz = UinputAbsSetup::new(AbsoluteAxisCode::ABS_RZ, triggers_setup);
        let dpad_setup = AbsInfo::new(0, -1, 1, 0, 0, 1);
        let abs_hat0x = UinputAbsSetup::new(AbsoluteAxisCode::ABS_HAT0X, dpad_setup);
        let abs_hat0y = UinputAbsSetup::new(AbsoluteAxisCode::ABS_HAT0Y, dpad_setup);

        let mut ff = AttributeSet::<FFEffectCode>::new();
        ff.insert(FFEffectCode::FF_RUMBLE);
        ff.insert(FFEffectCode::FF_PERIODIC);
        ff.insert(FFEffectCode::FF_SQUARE);
        ff.insert(FFEffectCode::FF_TRIANGLE);
        ff.insert(FFEffectCode::FF_SINE);
        ff.insert(FFEffectCode::FF_GAIN);

        let id = InputId::new(evdev::BusType(3), XBOX_VENDOR, XBOX_PRODUCT, XBOX_VERSION);

        let device = VirtualDeviceBuilder::new()?
            .name("Microsoft X-Box 360 pad")
            .input_id(id)
            .with_keys(&keys)?
            .with_absolute_axis(&abs_x)?
            .with_absolute_axis(&abs_y)?
            .with_absolute_axis(&abs_rx)?
            .with_absolute_axis(&abs_ry)?
            .with_absolute_axis(&abs_z)?
            .with_absolute_axis(&abs_rz)?
            .with_absolute_axis(&abs_hat0x)?
            .with_absolute_axis(&abs_hat0y)?
            .with_ff(&ff)?
            .with_ff_effects_max(MAX_FF_EFFECTS)
            .build()?;

        // Non-blocking reads so the worker can poll force-feedback events
        // between input frames.
        let raw_fd = device.as_raw_fd();
        nix::fcntl::fcntl(raw_fd, FcntlArg::F_SETFL(OFlag::O_NONBLOCK))?;

        Ok(device)
    }

    /// Submit a pad state, emitting only the events that changed.
    pub fn submit(&mut self, state: &XboxPadState) -> Result<(), Box<dyn Error + Send + Sync>> {
        if *state == self.last {
            return Ok(());
        }
        let mut events = Vec::new();

        for (bit, key) in BUTTON_KEYS {
            let now = state.buttons & bit != 0;
            let was = self.last.buttons & bit != 0;
            if now != was {
                events.push(InputEvent::new(EventType::KEY.0, key.0, now as i32));
            }
        }

        let hat_x = |buttons: u16| -> i32 {
            if buttons & XBOX_DPAD_LEFT != 0 {
                -1
            } else if buttons & XBOX_DPAD_RIGHT != 0 {
                1
            } else {
                0
            }
        };
        let hat_y = |buttons: u16| -> i32 {
            if buttons & XBOX_DPAD_UP != 0 {
                -1
            } else if buttons & XBOX_DPAD_DOWN != 0 {
                1
            } else {
                0
            }
        };
        if hat_x(state.buttons) != hat_x(self.last.buttons) {
            events.push(InputEvent::new(
                EventType::ABSOLUTE.0,
                AbsoluteAxisCode::ABS_HAT0X.0,
                hat_x(state.buttons),
            ));
        }
        if hat_y(state.buttons) != hat_y(self.last.buttons) {
            events.push(InputEvent::new(
                EventType::ABSOLUTE.0,
                AbsoluteAxisCode::ABS_HAT0Y.0,
                hat_y(state.buttons),
            ));
        }

        let axes = [
            (AbsoluteAxisCode::ABS_X, state.thumb_lx as i32, self.last.thumb_lx as i32),
            (AbsoluteAxisCode::ABS_Y, state.thumb_ly as i32, self.last.thumb_ly as i32),
            (AbsoluteAxisCode::ABS_RX, state.thumb_rx as i32, self.last.thumb_rx as i32),
            (AbsoluteAxisCode::ABS_RY, state.thumb_ry as i32, self.last.thumb_ry as i32),
            (
                AbsoluteAxisCode::ABS_Z,
                state.left_trigger as i32,
                self.last.left_trigger as i32,
            ),
            (
                AbsoluteAxisCode::ABS_RZ,
                state.right_trigger as i32,
                self.last.right_trigger as i32,
            ),
        ];
        for (axis, now, was) in axes {
            if now != was {
                events.push(InputEvent::new(EventType::ABSOLUTE.0, axis.0, now));
            }
        }

        if !events.is_empty() {
            self.device.emit(events.as_slice())?;
            self.device.emit(&[
                SynchronizationEvent::new(SynchronizationCode::SYN_REPORT, 0).into()
            ])?;
        }
        self.last = *state;
        Ok(())
    }

    /// Drain pending force-feedback events and return the current rumble
    /// magnitudes scaled to the controller's 0-255 motors.
    pub fn poll_rumble(&mut self) -> (u8, u8) {
        if let Err(e) = self.process_ff() {
            log::debug!("Error processing force-feedback events: {e:?}");
        }
        self.rumble
    }

    fn process_ff(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let events: Vec<InputEvent> = match self.device.fetch_events() {
            Ok(events) => events.collect(),
            Err(err) => match err.kind() {
                std::io::ErrorKind::WouldBlock => return Ok(()),
                _ => return Err(err.into()),
            },
        };

        const STOPPED: i32 = evdev::FFStatusCode::FF_STATUS_STOPPED.0 as i32;
        const PLAYING: i32 = evdev::FFStatusCode::FF_STATUS_PLAYING.0 as i32;

        for event in events {
            match event.destructure() {
                EventSummary::UInput(event, UInputCode::UI_FF_UPLOAD, ..) => {
                    let mut upload = self.device.process_ff_upload(event)?;
                    let id = if upload.effect_id() >= 0 {
                        upload.effect_id()
                    } else {
                        next_effect_id(&self.effects)
                    };
                    self.effects.insert(id, upload.effect());
                    upload.set_effect_id(id);
                    upload.set_retval(0);
                    log::debug!("Stored force-feedback effect {id}");
                }
                EventSummary::UInput(event, UInputCode::UI_FF_ERASE, ..) => {
                    let erase = self.device.process_ff_erase(event)?;
                    self.effects.remove(&(erase.effect_id() as i16));
                    log::debug!("Erased force-feedback effect {}", erase.effect_id());
                }
                EventSummary::ForceFeedback(_, code, STOPPED) => {
                    log::trace!("Stopped effect {}", code.0);
                    self.rumble = (0, 0);
                }
                EventSummary::ForceFeedback(_, code, PLAYING) => {
                    let Some(effect) = self.effects.get(&(code.0 as i16)) else {
                        log::debug!("Unknown force-feedback effect {}", code.0);
                        continue;
                    };
                    if let FFEffectKind::Rumble {
                        strong_magnitude,
                        weak_magnitude,
                    } = effect.kind
                    {
                        self.rumble = (
                            scale_magnitude(strong_magnitude),
                            scale_magnitude(weak_magnitude),
                        );
                    }
                }
                _ => (),
            }
        }

        Ok(())
    }

}

fn next_effect_id(effects: &HashMap<i16, FFEffectData>) -> i16 {
    let mut id = 0;
    while effects.contains_key(&id) && id < MAX_FF_EFFECTS as i16 {
        id += 1;
    }
    id
}

fn scale_magnitude(value: u16) -> u8 {
    ((value as f64 / u16::MAX as f64) * u8::MAX as f64).round() as u8
}

impl std::fmt::Debug for VirtualXbox360 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualXbox360")
            .field("last", &self.last)
            .field("rumble", &self.rumble)
            .finish()
    }
}
