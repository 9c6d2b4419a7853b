//! Virtual mouse backed by uinput for synthetic pointer events.

use std::collections::HashSet;
use std::error::Error;

use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AttributeSet, EventType, InputEvent, KeyCode, RelativeAxisCode, SynchronizationCode,
    SynchronizationEvent,
};

/// One virtual mouse emitting unaccelerated relative deltas. Held buttons
/// are released on drop.
pub struct VirtualMouse {
    device: VirtualDevice,
    held: HashSet<u8>,
}

impl VirtualMouse {
    pub fn new() -> Result<Self, Box<dyn Error + Send + Sync>> {
        let mut keys = AttributeSet::<KeyCode>::new();
        keys.insert(KeyCode::BTN_LEFT);
        keys.insert(KeyCode::BTN_MIDDLE);
        keys.insert(KeyCode::BTN_RIGHT);

        let device = VirtualDeviceBuilder::new()?
            .name("padbridge mouse")
            .with_keys(&keys)?
            .with_relative_axes(&AttributeSet::from_iter([
                RelativeAxisCode::REL_X,
                RelativeAxisCode::REL_Y,
                RelativeAxisCode::REL_WHEEL,
            ]))?
            .build()?;

        Ok(Self {
            device,
            held: HashSet::new(),
        })
    }

    /// 0 = left, 1 = middle, 2 = right.
    pub fn button(&mut self, button: u8, pressed: bool) -> Result<(), Box<dyn Error + Send + Sync>> {
        let Some(key) = button_key(button) else {
            log::debug!("Ignoring unknown mouse button {button}");
            return Ok(());
        };
        self.device.emit(&[
            InputEvent::new(EventType::KEY.0, key.0, pressed as i32),
            SynchronizationEvent::new(SynchronizationCode::SYN_REPORT, 0).into(),
        ])?;
        if pressed {
            self.held.insert(button);
        } else {
            self.held.remove(&button);
        }
        Ok(())
    }

    pub fn motion(&mut self, dx: i32, dy: i32) -> Result<(), Box<dyn Error + Send + Sync>> {
        if dx == 0 && dy == 0 {
            return Ok(());
        }
        self.device.emit(&[
            InputEvent::new(EventType::RELATIVE.0, RelativeAxisCode::REL_X.0, dx),
            InputEvent::new(EventType::RELATIVE.0, RelativeAxisCode::REL_Y.0, dy),
            SynchronizationEvent::new(SynchronizationCode::SYN_REPORT, 0).into(),
        ])?;
        Ok(())
    }

    pub fn wheel(&mut self, ticks: i32) -> Result<(), Box<dyn Error + Send + Sync>> {
        if ticks == 0 {
            return Ok(());
        }
        self.device.emit(&[
            InputEvent::new(EventType::RELATIVE.0, RelativeAxisCode::REL_WHEEL.0, ticks),
            SynchronizationEvent::new(SynchronizationCode::SYN_REPORT, 0).into(),
        ])?;
        Ok(())
    }

    /// Release everything currently held.
    pub fn release_all(&mut self) {
        let held: Vec<u8> = self.held.iter().copied().collect();
        for button in held {
            if let Err(e) = self.button(button, false) {
                log::debug!("Failed to release mouse button {button}: {e:?}");
            }
        }
    }
}

fn button_key(button: u8) -> Option<KeyCode> {
    match button {
        0 => Some(KeyCode::BTN_LEFT),
        1 => Some(KeyCode::BTN_MIDDLE),
        2 => Some(KeyCode::BTN_RIGHT),
        _ => None,
    }
}

impl Drop for VirtualMouse {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl std::fmt::Debug for VirtualMouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualMouse").field("held", &self.held).finish()
    }
}
