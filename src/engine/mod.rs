//! The bridge engine: supervisor loop, worker session, decoding, mapping,
//! and outbound report assembly.

pub mod command;
pub mod decoder;
pub mod mapping;
pub mod output;
pub mod session;
pub mod state;

#[cfg(test)]
pub mod decoder_test;
#[cfg(test)]
pub mod mapping_test;

use std::error::Error;
use std::time::Duration;

use hidapi::HidApi;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use zbus::Connection;

use crate::config::{ConfigStore, EngineConfig};
use crate::constants::BRIDGE_PATH;
use crate::dbus::interface::BridgeInterface;
use crate::drivers::dualsense::driver::{self, Driver, TransportError};
use crate::target::xb360;
use crate::udev;

use self::command::EngineCommand;
use self::mapping::ButtonMapping;
use self::session::{Session, SessionCommand, SessionEvent};
use self::state::{GamepadState, Model, Transport};

/// Depth of the UI command channel.
pub const COMMAND_BUFFER: usize = 64;
const SESSION_COMMAND_BUFFER: usize = 64;
const SESSION_EVENT_BUFFER: usize = 256;
const RECONNECT_PERIOD: Duration = Duration::from_secs(1);

/// Full engine snapshot returned by GetInitialState.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub config: EngineConfig,
    pub mappings: Vec<ButtonMapping>,
    pub current_profile: String,
    pub profiles: Vec<String>,
    pub transport: Transport,
    pub connection_mode: String,
    pub model: Option<Model>,
    pub device_name: String,
    pub virtual_pad_active: bool,
    pub uinput_available: bool,
    pub hider_available: bool,
    pub controller_hidden: bool,
    pub simple_mode_warning: bool,
    pub migration_notice: bool,
    pub gamepad: GamepadState,
    pub raw_report: Vec<u8>,
}

/// Payload of the StateUpdate signal.
#[derive(Debug, Clone, Serialize)]
pub struct StateUpdate {
    pub transport: Transport,
    pub connection_mode: String,
    pub virtual_pad_active: bool,
    pub uinput_available: bool,
    pub hider_available: bool,
    pub simple_mode_warning: bool,
    pub gamepad: GamepadState,
    pub raw_report: Vec<u8>,
}

struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    task: JoinHandle<()>,
}

/// Owns the configuration store, the connection lifecycle, and the UI
/// channel. Everything else happens on the worker session.
pub struct Engine {
    conn: Connection,
    rx: mpsc::Receiver<EngineCommand>,
    store: ConfigStore,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
    session: Option<SessionHandle>,
    transport: Transport,
    model: Option<Model>,
    device_name: String,
    device_path: String,
    hidden: bool,
    virtual_pad_active: bool,
    uinput_available: bool,
    hider_available: bool,
    simple_mode_warning: bool,
    gamepad: GamepadState,
    raw_report: Vec<u8>,
}

impl Engine {
    pub fn new(conn: Connection, rx: mpsc::Receiver<EngineCommand>, store: ConfigStore) -> Self {
        let (events_tx, events_rx) = mpsc::channel(SESSION_EVENT_BUFFER);
        Self {
            conn,
            rx,
            store,
            events_tx,
            events_rx,
            session: None,
            transport: Transport::Disconnected,
            model: None,
            device_name: String::new(),
            device_path: String::new(),
            hidden: false,
            virtual_pad_active: false,
            uinput_available: false,
            hider_available: false,
            simple_mode_warning: false,
            gamepad: GamepadState::default(),
            raw_report: Vec::new(),
        }
    }

    /// Run until the UI channel closes or a Shutdown command arrives.
    pub async fn run(&mut self) -> Result<(), Box<dyn Error>> {
        self.uinput_available = xb360::uinput_available();
        self.hider_available = udev::hider_available();
        if !self.uinput_available {
            log::warn!("uinput is not available; the virtual pad will be disabled");
        }
        if !self.hider_available {
            log::warn!("udev rules directory is not writable; controller hiding is disabled");
        }

        let mut reconnect = tokio::time::interval(RECONNECT_PERIOD);
        reconnect.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.rx.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    if self.handle_command(command).await {
                        break;
                    }
                }
                Some(event) = self.events_rx.recv() => {
                    self.handle_session_event(event).await;
                }
                _ = reconnect.tick() => {
                    if self.session.is_none() {
                        self.try_connect().await;
                    }
                }
            }
        }

        self.stop_session().await;
        if self.hider_available {
            if let Err(e) = udev::unhide_all().await {
                log::warn!("Could not remove hiding rules on shutdown: {e:?}");
            }
        }
        Ok(())
    }

    /// Attempt one enumerate-and-open pass; called every second while
    /// disconnected.
    async fn try_connect(&mut self) {
        let result = tokio::task::spawn_blocking(|| -> Result<Driver, TransportError> {
            let api =
                HidApi::new().map_err(|e| TransportError::OpenDenied(e.to_string()))?;
            let info = driver::find_controller(&api).ok_or(TransportError::NotFound)?;
            Driver::open(&api, &info)
        })
        .await;

        match result {
            Ok(Ok(driver)) => self.start_session(driver).await,
            Ok(Err(TransportError::NotFound)) => {
                log::debug!("No controller attached");
            }
            Ok(Err(e)) => log::warn!("Could not open controller: {e}"),
            Err(e) => log::error!("Connect task failed: {e}"),
        }
    }

    async fn start_session(&mut self, driver: Driver) {
        self.transport = driver.transport();
        self.model = Some(driver.model());
        self.device_name = driver.name().to_string();
        self.device_path = driver.path().to_string();
        self.simple_mode_warning = false;

        if self.store.file.config.hide_controller && self.hider_available {
            match udev::hide_device(&self.device_path).await {
                Ok(()) => {
                    self.hidden = true;
                    log::info!("Hid {} from other processes", self.device_path);
                }
                Err(e) => log::warn!("Could not hide controller: {e:?}"),
            }
        }

        let (tx, rx) = mpsc::channel(SESSION_COMMAND_BUFFER);
        let session = Session::new(
            driver,
            self.store.file.config.clone(),
            self.store.file.mappings.clone(),
            rx,
            self.events_tx.clone(),
        );
        let task = tokio::task::spawn_blocking(move || session.run());
        self.session = Some(SessionHandle { tx, task });
        self.publish_state().await;
    }

    async fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Status(status) => {
                self.transport = status.transport;
                self.virtual_pad_active = status.pad_plugged;
                self.uinput_available = status.uinput_available;
                self.simple_mode_warning = status.simple_mode_warning;
                self.publish_state().await;
            }
            SessionEvent::Frame { state, raw } => {
                self.gamepad = state;
                self.raw_report = raw;
                self.publish_state().await;
            }
            SessionEvent::Ended => {
                self.session = None;
                if self.hidden {
                    if let Err(e) = udev::unhide_device(&self.device_path).await {
                        log::warn!("Could not unhide controller: {e:?}");
                    }
                    self.hidden = false;
                }
                self.transport = Transport::Disconnected;
                self.model = None;
                self.virtual_pad_active = false;
                self.simple_mode_warning = false;
                self.gamepad = GamepadState::default();
                self.raw_report.clear();
                log::info!("Controller session ended; reconnect loop armed");
                self.publish_state().await;
            }
        }
    }

    /// Apply one UI command. Returns true when the engine should shut down.
    async fn handle_command(&mut self, command: EngineCommand) -> bool {
        match command {
            EngineCommand::GetInitialState { sender } => {
                let _ = sender.send(self.snapshot_json()).await;
            }
            EngineCommand::UpdateMappings(mappings) => {
                self.store.file.mappings = mappings.clone();
                self.persist();
                self.forward(SessionCommand::UpdateMappings(mappings)).await;
            }
            EngineCommand::SetRgb {
                red,
                green,
                blue,
                brightness,
            } => {
                let rgb = &mut self.store.file.config.rgb;
                rgb.red = red;
                rgb.green = green;
                rgb.blue = blue;
                rgb.brightness = brightness;
                self.apply_config().await;
            }
            EngineCommand::SetPlayerLedBrightness(level) => {
                self.store.file.config.player_led_brightness = level;
                self.apply_config().await;
            }
            EngineCommand::SetShowBatteryLed(flag) => {
                self.store.file.config.show_battery_led = flag;
                self.apply_config().await;
            }
            EngineCommand::SetDeadzones { left, right } => {
                self.store.file.config.deadzone_left = left.clamp(0.0, 1.0);
                self.store.file.config.deadzone_right = right.clamp(0.0, 1.0);
                self.apply_config().await;
            }
            EngineCommand::SetMouseSens { left, right } => {
                self.store.file.config.mouse_sens_left = left;
                self.store.file.config.mouse_sens_right = right;
                self.apply_config().await;
            }
            EngineCommand::SetTouchpadSens(sens) => {
                self.store.file.config.mouse_sens_touchpad = sens;
                self.apply_config().await;
            }
            EngineCommand::SetTriggerL2(trigger) => {
                self.store.file.config.trigger_l2 = trigger;
                self.apply_config().await;
            }
            EngineCommand::SetTriggerR2(trigger) => {
                self.store.file.config.trigger_r2 = trigger;
                self.apply_config().await;
            }
            EngineCommand::SetHideController(flag) => {
                self.store.file.config.hide_controller = flag;
                self.persist();
                self.apply_hiding(flag).await;
                self.forward_config().await;
            }
            EngineCommand::SetStartMinimized(flag) => {
                self.store.file.config.start_minimized = flag;
                self.persist();
            }
            EngineCommand::SaveProfile { name, sender } => {
                let result = self.store.save_profile(&name);
                if result.is_ok() {
                    self.persist();
                }
                let _ = sender.send(result).await;
                self.publish_state().await;
            }
            EngineCommand::LoadProfile { name, sender } => {
                let result = self.store.load_profile(&name).map(|_| ());
                if result.is_ok() {
                    self.persist();
                    let hide = self.store.file.config.hide_controller;
                    self.apply_hiding(hide).await;
                    self.forward(SessionCommand::UpdateMappings(
                        self.store.file.mappings.clone(),
                    ))
                    .await;
                    self.forward_config().await;
                }
                let _ = sender.send(result).await;
                self.publish_state().await;
            }
            EngineCommand::DeleteProfile { name, sender } => {
                let result = self.store.delete_profile(&name);
                if result.is_ok() {
                    self.persist();
                }
                let _ = sender.send(result).await;
                self.publish_state().await;
            }
            EngineCommand::GetProfiles { sender } => {
                let _ = sender.send(self.store.list_profiles()).await;
            }
            EngineCommand::DisconnectController => {
                self.forward(SessionCommand::Disconnect).await;
            }
            EngineCommand::TriggerDriverRefresh => {
                if self.session.is_none() {
                    self.uinput_available = xb360::uinput_available();
                }
                self.hider_available = udev::hider_available();
                log::info!(
                    "Driver probe: uinput {}, hider {}",
                    self.uinput_available,
                    self.hider_available
                );
                self.publish_state().await;
            }
            EngineCommand::Shutdown => return true,
        }
        false
    }

    /// Persist and forward the config after a mutation.
    async fn apply_config(&mut self) {
        self.persist();
        self.forward_config().await;
    }

    async fn forward_config(&mut self) {
        self.forward(SessionCommand::UpdateConfig(self.store.file.config.clone()))
            .await;
    }

    async fn forward(&mut self, command: SessionCommand) {
        if let Some(handle) = &self.session {
            if let Err(e) = handle.tx.try_send(command) {
                log::warn!("Could not forward command to worker: {e}");
            }
        }
    }

    async fn apply_hiding(&mut self, hide: bool) {
        if self.session.is_none() || !self.hider_available {
            return;
        }
        if hide && !self.hidden {
            match udev::hide_device(&self.device_path).await {
                Ok(()) => self.hidden = true,
                Err(e) => log::warn!("Could not hide controller: {e:?}"),
            }
        } else if !hide && self.hidden {
            match udev::unhide_device(&self.device_path).await {
                Ok(()) => self.hidden = false,
                Err(e) => log::warn!("Could not unhide controller: {e:?}"),
            }
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save() {
            log::warn!("Could not persist configuration: {e}");
        }
    }

    fn connection_mode(&self) -> String {
        match (self.transport, self.model) {
            (Transport::Disconnected, _) => "Disconnected".to_string(),
            (transport, Some(model)) => format!("{model} ({transport})"),
            (transport, None) => transport.to_string(),
        }
    }

    fn snapshot_json(&self) -> String {
        let snapshot = StateSnapshot {
            config: self.store.file.config.clone(),
            mappings: self.store.file.mappings.clone(),
            current_profile: self.store.file.current_profile.clone(),
            profiles: self.store.list_profiles(),
            transport: self.transport,
            connection_mode: self.connection_mode(),
            model: self.model,
            device_name: self.device_name.clone(),
            virtual_pad_active: self.virtual_pad_active,
            uinput_available: self.uinput_available,
            hider_available: self.hider_available,
            controller_hidden: self.hidden,
            simple_mode_warning: self.simple_mode_warning,
            migration_notice: self.store.migration_notice,
            gamepad: self.gamepad,
            raw_report: self.raw_report.clone(),
        };
        serde_json::to_string(&snapshot).unwrap_or_else(|e| {
            log::error!("Could not serialize state snapshot: {e}");
            "{}".to_string()
        })
    }

    /// Emit the StateUpdate signal. The worker already throttles frames to
    /// 60 Hz; status changes pass through directly.
    async fn publish_state(&mut self) {
        let update = StateUpdate {
            transport: self.transport,
            connection_mode: self.connection_mode(),
            virtual_pad_active: self.virtual_pad_active,
            uinput_available: self.uinput_available,
            hider_available: self.hider_available,
            simple_mode_warning: self.simple_mode_warning,
            gamepad: self.gamepad,
            raw_report: self.raw_report.clone(),
        };
        let payload = match serde_json::to_string(&update) {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("Could not serialize state update: {e}");
                return;
            }
        };

        let object_server = self.conn.object_server();
        let iface_ref = match object_server
            .interface::<_, BridgeInterface>(BRIDGE_PATH)
            .await
        {
            Ok(iface_ref) => iface_ref,
            Err(e) => {
                log::debug!("Bridge interface not registered yet: {e}");
                return;
            }
        };
        if let Err(e) = BridgeInterface::state_update(iface_ref.signal_emitter(), payload).await {
            log::debug!("Could not emit state update: {e}");
        }
    }

    async fn stop_session(&mut self) {
        let Some(mut handle) = self.session.take() else {
            return;
        };
        let _ = handle.tx.try_send(SessionCommand::Stop);
        // Keep draining worker events while waiting so its final sends never
        // block against a full channel.
        loop {
            tokio::select! {
                result = &mut handle.task => {
                    if let Err(e) = result {
                        log::warn!("Worker task did not stop cleanly: {e}");
                    }
                    break;
                }
                Some(_) = self.events_rx.recv() => (),
            }
        }
        if self.hidden {
            if let Err(e) = udev::unhide_device(&self.device_path).await {
                log::warn!("Could not unhide controller: {e:?}");
            }
            self.hidden = false;
        }
    }
}
