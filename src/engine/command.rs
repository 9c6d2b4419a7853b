use tokio::sync::mpsc;

use crate::config::{PlayerLedBrightness, ProfileError, TriggerConfig};

use super::mapping::ButtonMapping;

/// Everything the UI can ask the engine to do, delivered over the command
/// channel and applied by the supervisor.
#[derive(Debug)]
pub enum EngineCommand {
    GetInitialState {
        sender: mpsc::Sender<String>,
    },
    UpdateMappings(Vec<ButtonMapping>),
    SetRgb {
        red: u8,
        green: u8,
        blue: u8,
        brightness: u8,
    },
    SetPlayerLedBrightness(PlayerLedBrightness),
    SetShowBatteryLed(bool),
    SetDeadzones {
        left: f32,
        right: f32,
    },
    SetMouseSens {
        left: f32,
        right: f32,
    },
    SetTouchpadSens(f32),
    SetTriggerL2(TriggerConfig),
    SetTriggerR2(TriggerConfig),
    SetHideController(bool),
    SetStartMinimized(bool),
    SaveProfile {
        name: String,
        sender: mpsc::Sender<Result<(), ProfileError>>,
    },
    LoadProfile {
        name: String,
        sender: mpsc::Sender<Result<(), ProfileError>>,
    },
    DeleteProfile {
        name: String,
        sender: mpsc::Sender<Result<(), ProfileError>>,
    },
    GetProfiles {
        sender: mpsc::Sender<Vec<String>>,
    },
    DisconnectController,
    TriggerDriverRefresh,
    Shutdown,
}
