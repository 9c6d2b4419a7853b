//! Virtual keyboard backed by uinput for synthetic key events.

use std::collections::HashSet;
use std::error::Error;

use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AttributeSet, EventType, InputEvent, KeyCode, SynchronizationCode, SynchronizationEvent,
};

/// Highest evdev key code registered on the virtual keyboard; covers the
/// whole KEY_* keyboard range.
const MAX_KEY_CODE: u16 = 248;

/// One virtual keyboard. Tracks what it pressed so every held key is
/// released when the device goes away, whatever the exit path.
pub struct VirtualKeyboard {
    device: VirtualDevice,
    held: HashSet<u16>,
}

impl VirtualKeyboard {
    pub fn new() -> Result<Self, Box<dyn Error + Send + Sync>> {
        let mut keys = AttributeSet::<KeyCode>::new();
        for code in 1..=MAX_KEY_CODE {
            keys.insert(KeyCode::new(code));
        }

        let device = VirtualDeviceBuilder::new()?
            .name("padbridge keyboard")
            .with_keys(&keys)?
            .build()?;

        Ok(Self {
            device,
            held: HashSet::new(),
        })
    }

    pub fn key(&mut self, code: u16, pressed: bool) -> Result<(), Box<dyn Error + Send + Sync>> {
        if code == 0 || code > MAX_KEY_CODE {
            log::debug!("Ignoring out-of-range key code {code}");
            return Ok(());
        }
        self.device.emit(&[
            InputEvent::new(EventType::KEY.0, code, pressed as i32),
            SynchronizationEvent::new(SynchronizationCode::SYN_REPORT, 0).into(),
        ])?;
        if pressed {
            self.held.insert(code);
        } else {
            self.held.remove(&code);
        }
        Ok(())
    }

    /// Release everything currently held.
    pub fn release_all(&mut self) {
        let held: Vec<u16> = self.held.iter().copied().collect();
        for code in held {
            if let Err(e) = self.key(code, false) {
                log::debug!("Failed to release key {code}: {e:?}");
            }
        }
    }
}

impl Drop for VirtualKeyboard {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl std::fmt::Debug for VirtualKeyboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualKeyboard").field("held", &self.held).finish()
    }
}
