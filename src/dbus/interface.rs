//! The D-Bus interface the configuration UI talks to. Methods translate
//! 1:1 into [EngineCommand] messages on the engine channel; the engine
//! answers queries through small reply channels and pushes `StateUpdate`
//! signals back.

use std::time::Duration;

use tokio::sync::mpsc;
use zbus::{fdo, object_server::SignalEmitter};
use zbus_macros::interface;

use crate::config::{AdaptiveTriggerMode, PlayerLedBrightness, TriggerConfig};
use crate::engine::command::EngineCommand;
use crate::engine::mapping::ButtonMapping;

const SEND_TIMEOUT: Duration = Duration::from_millis(500);

pub struct BridgeInterface {
    tx: mpsc::Sender<EngineCommand>,
}

impl BridgeInterface {
    pub fn new(tx: mpsc::Sender<EngineCommand>) -> Self {
        Self { tx }
    }

    async fn send(&self, command: EngineCommand) -> fdo::Result<()> {
        self.tx
            .send_timeout(command, SEND_TIMEOUT)
            .await
            .map_err(|err| fdo::Error::Failed(err.to_string()))
    }
}

#[interface(name = "org.padbridge.Bridge1")]
impl BridgeInterface {
    #[zbus(property)]
    async fn version(&self) -> fdo::Result<String> {
        const VERSION: &str = env!("CARGO_PKG_VERSION");
        Ok(VERSION.to_string())
    }

    /// JSON snapshot of the full engine state: config, mappings, current
    /// profile, driver availability, and the last decoded frame.
    async fn get_initial_state(&self) -> fdo::Result<String> {
        let (sender, mut receiver) = mpsc::channel(1);
        self.send(EngineCommand::GetInitialState { sender }).await?;
        let Some(response) = receiver.recv().await else {
            return Err(fdo::Error::Failed("No response from engine".to_string()));
        };
        Ok(response)
    }

    /// Replace the live mapping set. Takes the mappings as a JSON array.
    async fn update_mappings(&self, mappings: String) -> fdo::Result<()> {
        let mappings: Vec<ButtonMapping> = serde_json::from_str(&mappings)
            .map_err(|err| fdo::Error::InvalidArgs(err.to_string()))?;
        self.send(EngineCommand::UpdateMappings(mappings)).await
    }

    async fn set_rgb(&self, red: u8, green: u8, blue: u8, brightness: u8) -> fdo::Result<()> {
        self.send(EngineCommand::SetRgb {
            red,
            green,
            blue,
            brightness,
        })
        .await
    }

    /// level is one of "low", "medium", "high".
    async fn set_player_led_brightness(&self, level: String) -> fdo::Result<()> {
        let level = PlayerLedBrightness::from_name(&level)
            .ok_or_else(|| fdo::Error::InvalidArgs(format!("unknown brightness '{level}'")))?;
        self.send(EngineCommand::SetPlayerLedBrightness(level)).await
    }

    async fn set_show_battery_led(&self, flag: bool) -> fdo::Result<()> {
        self.send(EngineCommand::SetShowBatteryLed(flag)).await
    }

    async fn set_deadzones(&self, left: f64, right: f64) -> fdo::Result<()> {
        self.send(EngineCommand::SetDeadzones {
            left: left as f32,
            right: right as f32,
        })
        .await
    }

    async fn set_mouse_sens(&self, left: f64, right: f64) -> fdo::Result<()> {
        self.send(EngineCommand::SetMouseSens {
            left: left as f32,
            right: right as f32,
        })
        .await
    }

    async fn set_touchpad_sens(&self, sens: f64) -> fdo::Result<()> {
        self.send(EngineCommand::SetTouchpadSens(sens as f32)).await
    }

    /// mode is one of "off", "rigid", "pulse", "section".
    async fn set_trigger_l2(&self, mode: String, start: u8, force: u8) -> fdo::Result<()> {
        let trigger = parse_trigger(&mode, start, force)?;
        self.send(EngineCommand::SetTriggerL2(trigger)).await
    }

    async fn set_trigger_r2(&self, mode: String, start: u8, force: u8) -> fdo::Result<()> {
        let trigger = parse_trigger(&mode, start, force)?;
        self.send(EngineCommand::SetTriggerR2(trigger)).await
    }

    async fn set_hide_controller(&self, flag: bool) -> fdo::Result<()> {
        self.send(EngineCommand::SetHideController(flag)).await
    }

    async fn set_start_minimized(&self, flag: bool) -> fdo::Result<()> {
        self.send(EngineCommand::SetStartMinimized(flag)).await
    }

    async fn save_profile(&self, name: String) -> fdo::Result<()> {
        let (sender, mut receiver) = mpsc::channel(1);
        self.send(EngineCommand::SaveProfile { name, sender }).await?;
        profile_reply(receiver.recv().await)
    }

    async fn load_profile(&self, name: String) -> fdo::Result<()> {
        let (sender, mut receiver) = mpsc::channel(1);
        self.send(EngineCommand::LoadProfile { name, sender }).await?;
        profile_reply(receiver.recv().await)
    }

    async fn delete_profile(&self, name: String) -> fdo::Result<()> {
        let (sender, mut receiver) = mpsc::channel(1);
        self.send(EngineCommand::DeleteProfile { name, sender })
            .await?;
        profile_reply(receiver.recv().await)
    }

    async fn get_profiles(&self) -> fdo::Result<Vec<String>> {
        let (sender, mut receiver) = mpsc::channel(1);
        self.send(EngineCommand::GetProfiles { sender }).await?;
        let Some(profiles) = receiver.recv().await else {
            return Err(fdo::Error::Failed("No response from engine".to_string()));
        };
        Ok(profiles)
    }

    /// Force-close the transport; the reconnect loop picks the controller
    /// back up.
    async fn disconnect_controller(&self) -> fdo::Result<()> {
        self.send(EngineCommand::DisconnectController).await
    }

    /// Reprobe uinput and the udev rules directory.
    async fn trigger_driver_refresh(&self) -> fdo::Result<()> {
        self.send(EngineCommand::TriggerDriverRefresh).await
    }

    /// Engine state pushed to the UI, at most at 60 Hz. JSON payload with
    /// the latest frame, connection mode, and driver flags.
    #[zbus(signal)]
    pub async fn state_update(
        signal_emitter: &SignalEmitter<'_>,
        payload: String,
    ) -> zbus::Result<()>;
}

fn parse_trigger(mode: &str, start: u8, force: u8) -> fdo::Result<TriggerConfig> {
    let mode = AdaptiveTriggerMode::from_name(mode)
        .ok_or_else(|| fdo::Error::InvalidArgs(format!("unknown trigger mode '{mode}'")))?;
    Ok(TriggerConfig { mode, start, force })
}

fn profile_reply(response: Option<Result<(), crate::config::ProfileError>>) -> fdo::Result<()> {
    match response {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(fdo::Error::Failed(e.to_string())),
        None => Err(fdo::Error::Failed("No response from engine".to_string())),
    }
}
