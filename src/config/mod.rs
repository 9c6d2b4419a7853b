#[cfg(test)]
pub mod config_test;

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::mapping::{
    ButtonMapping, MappingSource, MappingTarget, StickSide, TriggerSide, XBOX_A, XBOX_B,
    XBOX_BACK, XBOX_DPAD_DOWN, XBOX_DPAD_LEFT, XBOX_DPAD_RIGHT, XBOX_DPAD_UP, XBOX_GUIDE, XBOX_LB,
    XBOX_LEFT_THUMB, XBOX_RB, XBOX_RIGHT_THUMB, XBOX_START, XBOX_X, XBOX_Y,
};

/// Version of the persisted configuration document. Documents with any other
/// version load as defaults and raise a migration notice.
pub const CONFIG_VERSION: u32 = 1;

/// Name of the built-in immutable profile.
pub const DEFAULT_PROFILE: &str = "Default";

const CONFIG_DIR: &str = "padbridge";
const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("no profile named '{0}'")]
    NotFound(String),
    #[error("invalid profile name '{0}'")]
    NameInvalid(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("could not read configuration: {0}")]
    Io(#[from] io::Error),
    #[error("could not serialize configuration: {0}")]
    Serialize(#[from] serde_yaml::Error),
}

/// Lightbar color and brightness. The wire receives each channel scaled by
/// brightness/255; no gamma is applied anywhere near the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbConfig {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub brightness: u8,
}

impl RgbConfig {
    /// The channel bytes as they go on the wire.
    pub fn scaled(&self) -> (u8, u8, u8) {
        let factor = self.brightness as f32 / 255.0;
        (
            (self.red as f32 * factor) as u8,
            (self.green as f32 * factor) as u8,
            (self.blue as f32 * factor) as u8,
        )
    }
}

impl Default for RgbConfig {
    fn default() -> Self {
        Self {
            red: 0,
            green: 0,
            blue: 255,
            brightness: 255,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerLedBrightness {
    #[default]
    High,
    Medium,
    Low,
}

impl PlayerLedBrightness {
    /// Firmware encoding: 0 is brightest.
    pub fn to_wire(self) -> u8 {
        match self {
            PlayerLedBrightness::High => 0,
            PlayerLedBrightness::Medium => 1,
            PlayerLedBrightness::Low => 2,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "high" => Some(PlayerLedBrightness::High),
            "medium" => Some(PlayerLedBrightness::Medium),
            "low" => Some(PlayerLedBrightness::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptiveTriggerMode {
    #[default]
    Off,
    Rigid,
    Pulse,
    Section,
}

impl AdaptiveTriggerMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "off" => Some(AdaptiveTriggerMode::Off),
            "rigid" => Some(AdaptiveTriggerMode::Rigid),
            "pulse" => Some(AdaptiveTriggerMode::Pulse),
            "section" => Some(AdaptiveTriggerMode::Section),
            _ => None,
        }
    }
}

/// Adaptive trigger parameters for one trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub mode: AdaptiveTriggerMode,
    pub start: u8,
    pub force: u8,
}

/// Engine-owned settings. Snapshot-replaced on the worker when the UI mutates
/// any of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub hide_controller: bool,
    pub start_minimized: bool,
    pub deadzone_left: f32,
    pub deadzone_right: f32,
    pub mouse_sens_left: f32,
    pub mouse_sens_right: f32,
    pub mouse_sens_touchpad: f32,
    pub rgb: RgbConfig,
    pub show_battery_led: bool,
    pub player_led_brightness: PlayerLedBrightness,
    pub trigger_l2: TriggerConfig,
    pub trigger_r2: TriggerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hide_controller: true,
            start_minimized: false,
            deadzone_left: 0.1,
            deadzone_right: 0.1,
            mouse_sens_left: 25.0,
            mouse_sens_right: 25.0,
            mouse_sens_touchpad: 25.0,
            rgb: RgbConfig::default(),
            show_battery_led: false,
            player_led_brightness: PlayerLedBrightness::default(),
            trigger_l2: TriggerConfig::default(),
            trigger_r2: TriggerConfig::default(),
        }
    }
}

/// A named pair of mapping set and engine configuration. Loading one replaces
/// both atomically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub mappings: Vec<ButtonMapping>,
    pub config: EngineConfig,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            mappings: default_mappings(),
            config: EngineConfig::default(),
        }
    }
}

/// The persisted configuration document. The live mapping set and config are
/// stored alongside the saved profiles so unsaved tweaks survive restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: u32,
    pub current_profile: String,
    pub mappings: Vec<ButtonMapping>,
    pub config: EngineConfig,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            current_profile: DEFAULT_PROFILE.to_string(),
            mappings: default_mappings(),
            config: EngineConfig::default(),
            profiles: BTreeMap::new(),
        }
    }
}

/// Owns the configuration document on disk.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    pub file: ConfigFile,
    /// Set when an on-disk document had a foreign schema version and the
    /// store fell back to defaults.
    pub migration_notice: bool,
}

impl ConfigStore {
    /// Load the document at `path`, falling back to defaults on a missing
    /// file, a parse error, or a foreign schema version.
    pub fn load(path: PathBuf) -> Self {
        let (file, migration_notice) = match fs::read_to_string(&path) {
            Ok(content) => match serde_yaml::from_str::<ConfigFile>(&content) {
                Ok(file) if file.version == CONFIG_VERSION => (file, false),
                Ok(file) => {
                    log::warn!(
                        "Configuration version {} is not understood, starting from defaults",
                        file.version
                    );
                    (ConfigFile::default(), true)
                }
                Err(e) => {
                    log::warn!("Could not parse configuration: {e}");
                    (ConfigFile::default(), true)
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => (ConfigFile::default(), false),
            Err(e) => {
                log::warn!("Could not read configuration: {e}");
                (ConfigFile::default(), false)
            }
        };

        Self {
            path,
            file,
            migration_notice,
        }
    }

    pub fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(&self.file)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All profile names, the built-in default first.
    pub fn list_profiles(&self) -> Vec<String> {
        let mut names = vec![DEFAULT_PROFILE.to_string()];
        names.extend(self.file.profiles.keys().cloned());
        names
    }

    /// Save the live mapping set and config under `name` and make it current.
    pub fn save_profile(&mut self, name: &str) -> Result<(), ProfileError> {
        validate_profile_name(name)?;
        let profile = Profile {
            mappings: self.file.mappings.clone(),
            config: self.file.config.clone(),
        };
        self.file.profiles.insert(name.to_string(), profile);
        self.file.current_profile = name.to_string();
        Ok(())
    }

    /// Replace the live mapping set and config with the named profile.
    pub fn load_profile(&mut self, name: &str) -> Result<Profile, ProfileError> {
        let profile = if name == DEFAULT_PROFILE {
            Profile::default()
        } else {
            self.file
                .profiles
                .get(name)
                .cloned()
                .ok_or_else(|| ProfileError::NotFound(name.to_string()))?
        };
        self.file.mappings = profile.mappings.clone();
        self.file.config = profile.config.clone();
        self.file.current_profile = name.to_string();
        Ok(profile)
    }

    pub fn delete_profile(&mut self, name: &str) -> Result<(), ProfileError> {
        if name == DEFAULT_PROFILE {
            return Err(ProfileError::NameInvalid(name.to_string()));
        }
        if self.file.profiles.remove(name).is_none() {
            return Err(ProfileError::NotFound(name.to_string()));
        }
        if self.file.current_profile == name {
            self.file.current_profile = DEFAULT_PROFILE.to_string();
        }
        Ok(())
    }
}

fn validate_profile_name(name: &str) -> Result<(), ProfileError> {
    let valid = !name.is_empty()
        && name != DEFAULT_PROFILE
        && name.len() <= 64
        && !name.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(ProfileError::NameInvalid(name.to_string()))
    }
}

/// Default location of the configuration document.
pub fn default_config_path() -> PathBuf {
    let base = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(|| {
            env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .ok()
        })
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// The built-in mapping set: face, shoulder, and meta buttons one-to-one onto
/// their Xbox equivalents; sticks and triggers passed through; the mute
/// button and touchpad left unmapped. Every recognized source appears exactly
/// once.
pub fn default_mappings() -> Vec<ButtonMapping> {
    use MappingSource::*;

    let entry = |source: MappingSource, targets: Vec<MappingTarget>| ButtonMapping {
        source,
        targets,
    };

    vec![
        entry(Cross, vec![MappingTarget::XboxButton(XBOX_A)]),
        entry(Circle, vec![MappingTarget::XboxButton(XBOX_B)]),
        entry(Square, vec![MappingTarget::XboxButton(XBOX_X)]),
        entry(Triangle, vec![MappingTarget::XboxButton(XBOX_Y)]),
        entry(L1, vec![MappingTarget::XboxButton(XBOX_LB)]),
        entry(R1, vec![MappingTarget::XboxButton(XBOX_RB)]),
        entry(L3, vec![MappingTarget::XboxButton(XBOX_LEFT_THUMB)]),
        entry(R3, vec![MappingTarget::XboxButton(XBOX_RIGHT_THUMB)]),
        entry(Share, vec![MappingTarget::XboxButton(XBOX_BACK)]),
        entry(Options, vec![MappingTarget::XboxButton(XBOX_START)]),
        entry(Ps, vec![MappingTarget::XboxButton(XBOX_GUIDE)]),
        entry(Mute, vec![]),
        entry(DpadUp, vec![MappingTarget::XboxButton(XBOX_DPAD_UP)]),
        entry(DpadDown, vec![MappingTarget::XboxButton(XBOX_DPAD_DOWN)]),
        entry(DpadLeft, vec![MappingTarget::XboxButton(XBOX_DPAD_LEFT)]),
        entry(DpadRight, vec![MappingTarget::XboxButton(XBOX_DPAD_RIGHT)]),
        entry(L2, vec![MappingTarget::XboxTrigger(TriggerSide::Left)]),
        entry(R2, vec![MappingTarget::XboxTrigger(TriggerSide::Right)]),
        entry(LeftStick, vec![MappingTarget::XboxStick(StickSide::Left)]),
        entry(RightStick, vec![MappingTarget::XboxStick(StickSide::Right)]),
        entry(Touchpad, vec![]),
        entry(TouchpadLeft, vec![]),
        entry(TouchpadRight, vec![]),
    ]
}
