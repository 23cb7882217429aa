//! Climate entity for the dehumidifier: power, preset (operating mode), fan mode and target humidity.

use std::ops::{BitOr, BitOrAssign};

use log::warn;
use serde::{Deserialize, Serialize};

use super::{EntityState, EntityStateMessage, Platform};
use crate::dehumidifier::{DeviceStatus, FanSpeed, OperationMode};
use crate::device::{DehumidifierClient, DeviceHandle};
use crate::humidity::{translate_humidity, HUMIDITY_STEPS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Dry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacAction {
    Off,
    Drying,
}

/// Climate feature flags, numbered as the host platform numbers them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClimateEntityFeature(u32);

impl ClimateEntityFeature {
    pub const TARGET_HUMIDITY: ClimateEntityFeature = ClimateEntityFeature(4);
    pub const FAN_MODE: ClimateEntityFeature = ClimateEntityFeature(8);
    pub const PRESET_MODE: ClimateEntityFeature = ClimateEntityFeature(16);

    pub const fn empty() -> Self {
        ClimateEntityFeature(0)
    }

    pub fn contains(&self, other: ClimateEntityFeature) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ClimateEntityFeature {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        ClimateEntityFeature(self.0 | rhs.0)
    }
}

impl BitOrAssign for ClimateEntityFeature {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// What the climate entity offers, independent of device state.
#[derive(Debug)]
pub struct ClimateCapabilities {
    pub hvac_modes: &'static [HvacMode],
    pub preset_modes: &'static [OperationMode],
    pub fan_modes: &'static [FanSpeed],
    pub min_humidity: u8,
    pub max_humidity: u8,
    pub humidity_steps: u8,
    /// Preset in which the target humidity can be set.
    pub humidity_preset: OperationMode,
    /// Preset in which the fan speed is fixed by the device.
    pub no_fan_preset: OperationMode,
}

pub static DEHUMIDIFIER_CAPABILITIES: ClimateCapabilities = ClimateCapabilities {
    hvac_modes: &[HvacMode::Off, HvacMode::Dry],
    preset_modes: &OperationMode::ALL,
    fan_modes: &[FanSpeed::Low, FanSpeed::Medium, FanSpeed::High],
    min_humidity: 40,
    max_humidity: 60,
    humidity_steps: HUMIDITY_STEPS,
    humidity_preset: OperationMode::Auto,
    no_fan_preset: OperationMode::DryCloth,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClimateState {
    pub is_on: bool,
    pub hvac_mode: HvacMode,
    pub hvac_action: HvacAction,
    pub preset_mode: OperationMode,
    pub fan_mode: Option<FanSpeed>,
    pub target_humidity: i64,
    pub current_humidity: i64,
    pub current_temperature: i64,
}

impl ClimateState {
    pub fn project(status: &DeviceStatus, capabilities: &ClimateCapabilities) -> ClimateState {
        ClimateState {
            is_on: status.is_on,
            hvac_mode: if status.is_on { HvacMode::Dry } else { HvacMode::Off },
            hvac_action: if status.compressor_status {
                HvacAction::Drying
            } else {
                HvacAction::Off
            },
            preset_mode: status.mode,
            fan_mode: (status.mode != capabilities.no_fan_preset).then_some(status.fan_st),
            target_humidity: status.target_humidity,
            current_humidity: status.humidity,
            current_temperature: status.temperature,
        }
    }

    pub fn supported_features(&self, capabilities: &ClimateCapabilities) -> ClimateEntityFeature {
        let mut features = ClimateEntityFeature::empty();
        if self.is_on {
            features |= ClimateEntityFeature::PRESET_MODE;
            if self.preset_mode == capabilities.humidity_preset {
                features |= ClimateEntityFeature::TARGET_HUMIDITY;
            }
            if self.preset_mode != capabilities.no_fan_preset {
                features |= ClimateEntityFeature::FAN_MODE;
            }
        }
        features
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClimateAttributes {
    #[serde(flatten)]
    pub state: ClimateState,
    pub supported_features: ClimateEntityFeature,
    pub hvac_modes: &'static [HvacMode],
    pub preset_modes: &'static [OperationMode],
    pub fan_modes: &'static [FanSpeed],
    pub min_humidity: u8,
    pub max_humidity: u8,
    pub temperature_unit: &'static str,
}

pub struct ClimateEntity<D> {
    device: DeviceHandle<D>,
    unique_id: String,
    capabilities: &'static ClimateCapabilities,
    pub(super) state: ClimateState,
    pub(super) available: bool,
}

impl<D: DehumidifierClient> ClimateEntity<D> {
    pub fn new(device: DeviceHandle<D>, unique_id: String, status: &DeviceStatus) -> Self {
        ClimateEntity {
            device,
            unique_id,
            capabilities: &DEHUMIDIFIER_CAPABILITIES,
            state: ClimateState::project(status, &DEHUMIDIFIER_CAPABILITIES),
            available: true,
        }
    }

    pub fn state(&self) -> &ClimateState {
        &self.state
    }

    pub fn is_on(&self) -> bool {
        self.state.is_on
    }

    pub fn supported_features(&self) -> ClimateEntityFeature {
        self.state.supported_features(self.capabilities)
    }

    pub fn handle_coordinator_update(&mut self, status: &DeviceStatus, available: bool) {
        self.state = ClimateState::project(status, self.capabilities);
        self.available = available;
    }

    pub fn state_message(&self) -> EntityStateMessage {
        EntityStateMessage {
            unique_id: self.unique_id.clone(),
            name: None,
            platform: Platform::Climate,
            icon: None,
            entity_category: None,
            device_class: None,
            available: self.available,
            state: EntityState::Climate(ClimateAttributes {
                state: self.state.clone(),
                supported_features: self.supported_features(),
                hvac_modes: self.capabilities.hvac_modes,
                preset_modes: self.capabilities.preset_modes,
                fan_modes: self.capabilities.fan_modes,
                min_humidity: self.capabilities.min_humidity,
                max_humidity: self.capabilities.max_humidity,
                temperature_unit: "°C",
            }),
        }
    }

    // Commands. Each returns true when the device accepted a change and a refresh should follow.

    pub async fn turn_on(&mut self) -> bool {
        let done = self
            .device
            .try_command("Turning the miio device on failed.", self.available, |d| d.on())
            .await;
        if done {
            self.set_power_state(true);
        }
        done
    }

    pub async fn turn_off(&mut self) -> bool {
        let done = self
            .device
            .try_command("Turning the miio device off failed.", self.available, |d| d.off())
            .await;
        if done {
            self.set_power_state(false);
        }
        done
    }

    fn set_power_state(&mut self, on: bool) {
        self.state.is_on = on;
        self.state.hvac_mode = if on { HvacMode::Dry } else { HvacMode::Off };
    }

    pub async fn set_hvac_mode(&mut self, hvac_mode: HvacMode) -> bool {
        match hvac_mode {
            HvacMode::Dry => self.turn_on().await,
            HvacMode::Off => self.turn_off().await,
        }
    }

    pub async fn set_preset_mode(&mut self, preset_mode: OperationMode) -> bool {
        if !self.capabilities.preset_modes.contains(&preset_mode) {
            warn!("Preset mode {} is not supported", preset_mode);
            return false;
        }

        let done = self
            .device
            .try_command("Setting the preset mode of the miio device failed.", self.available, move |d| {
                d.set_mode(preset_mode)
            })
            .await;
        if done {
            self.state.preset_mode = preset_mode;
        }
        done
    }

    /// Set the target humidity, switching to the humidity preset first when needed.
    pub async fn set_humidity(&mut self, humidity: u8) -> bool {
        let mut changed = false;
        if self.state.preset_mode != self.capabilities.humidity_preset {
            changed = self.set_preset_mode(self.capabilities.humidity_preset).await;
        }

        let Some(target_humidity) = translate_humidity(f64::from(humidity), self.capabilities.humidity_steps) else {
            warn!("Ignoring target humidity {}%", humidity);
            return changed;
        };

        let done = self
            .device
            .try_command("Setting the humidity of the miio device failed.", self.available, move |d| {
                d.set_target_humidity(target_humidity)
            })
            .await;
        if done {
            self.state.target_humidity = i64::from(humidity);
        }
        changed || done
    }

    pub async fn set_fan_mode(&mut self, fan_mode: FanSpeed) -> bool {
        if self.state.preset_mode == self.capabilities.no_fan_preset {
            return false;
        }
        if !self.capabilities.fan_modes.contains(&fan_mode) {
            warn!("Fan mode {} is not supported", fan_mode);
            return false;
        }

        let done = self
            .device
            .try_command("Setting the fan mode of the miio device failed.", self.available, move |d| {
                d.set_fan_speed(fan_mode)
            })
            .await;
        if done {
            self.state.fan_mode = Some(fan_mode);
        }
        done
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ClimateEntity, ClimateEntityFeature, ClimateState, HvacAction, HvacMode, DEHUMIDIFIER_CAPABILITIES};
    use crate::dehumidifier::{tests::sample_properties, DeviceStatus, FanSpeed, OperationMode};
    use crate::device::DeviceHandle;
    use crate::error::DeviceError;
    use crate::simulator::SimulatedDehumidifier;

    fn status() -> DeviceStatus {
        DeviceStatus::from_properties(&sample_properties()).unwrap()
    }

    fn entity() -> (ClimateEntity<SimulatedDehumidifier>, DeviceHandle<SimulatedDehumidifier>) {
        let handle = DeviceHandle::new(SimulatedDehumidifier::new());
        let status = handle.device().snapshot().unwrap();
        (ClimateEntity::new(handle.clone(), "40:31:3c:37:4d:27".to_string(), &status), handle)
    }

    #[test]
    fn test_hvac_action_follows_compressor() {
        for is_on in [true, false] {
            for mode in OperationMode::ALL {
                let mut status = status();
                status.is_on = is_on;
                status.mode = mode;

                status.compressor_status = true;
                assert_eq!(ClimateState::project(&status, &DEHUMIDIFIER_CAPABILITIES).hvac_action, HvacAction::Drying);
                status.compressor_status = false;
                assert_eq!(ClimateState::project(&status, &DEHUMIDIFIER_CAPABILITIES).hvac_action, HvacAction::Off);
            }
        }
    }

    #[test]
    fn test_dry_cloth_has_no_fan_mode() {
        for fan_st in FanSpeed::ALL {
            let mut status = status();
            status.mode = OperationMode::DryCloth;
            status.fan_st = fan_st;
            assert_eq!(ClimateState::project(&status, &DEHUMIDIFIER_CAPABILITIES).fan_mode, None);

            status.mode = OperationMode::On;
            assert_eq!(ClimateState::project(&status, &DEHUMIDIFIER_CAPABILITIES).fan_mode, Some(fan_st));
        }
    }

    #[test]
    fn test_projection() {
        let state = ClimateState::project(&status(), &DEHUMIDIFIER_CAPABILITIES);
        assert!(state.is_on);
        assert_eq!(state.hvac_mode, HvacMode::Dry);
        assert_eq!(state.preset_mode, OperationMode::Auto);
        assert_eq!(state.fan_mode, Some(FanSpeed::Medium));
        assert_eq!(state.target_humidity, 40);
        assert_eq!(state.current_humidity, 37);
        assert_eq!(state.current_temperature, 28);

        let mut off = status();
        off.is_on = false;
        assert_eq!(ClimateState::project(&off, &DEHUMIDIFIER_CAPABILITIES).hvac_mode, HvacMode::Off);
    }

    #[test]
    fn test_supported_features() {
        let mut status = status();
        let features = |status: &DeviceStatus| {
            ClimateState::project(status, &DEHUMIDIFIER_CAPABILITIES).supported_features(&DEHUMIDIFIER_CAPABILITIES)
        };

        status.mode = OperationMode::Auto;
        assert_eq!(
            features(&status),
            ClimateEntityFeature::PRESET_MODE | ClimateEntityFeature::TARGET_HUMIDITY | ClimateEntityFeature::FAN_MODE
        );

        status.mode = OperationMode::On;
        assert_eq!(features(&status), ClimateEntityFeature::PRESET_MODE | ClimateEntityFeature::FAN_MODE);

        status.mode = OperationMode::DryCloth;
        assert_eq!(features(&status), ClimateEntityFeature::PRESET_MODE);

        status.is_on = false;
        status.mode = OperationMode::Auto;
        assert_eq!(features(&status), ClimateEntityFeature::empty());
        assert!(!features(&status).contains(ClimateEntityFeature::PRESET_MODE));
    }

    #[tokio::test]
    async fn test_turn_off_and_on() {
        let (mut climate, handle) = entity();

        assert!(climate.set_hvac_mode(HvacMode::Off).await);
        assert!(!climate.is_on());
        assert_eq!(climate.state().hvac_mode, HvacMode::Off);
        assert!(!handle.device().snapshot().unwrap().is_on);

        assert!(climate.set_hvac_mode(HvacMode::Dry).await);
        assert!(climate.is_on());
        assert!(handle.device().snapshot().unwrap().is_on);
    }

    #[tokio::test]
    async fn test_failed_command_keeps_local_state() {
        let (mut climate, handle) = entity();
        handle.device().fail_commands(Some(DeviceError::with_code(-9999, "timeout")));

        assert!(!climate.turn_off().await);
        assert!(climate.is_on());
        assert!(!climate.set_preset_mode(OperationMode::DryCloth).await);
        assert_eq!(climate.state().preset_mode, OperationMode::Auto);
    }

    #[tokio::test]
    async fn test_set_humidity_switches_to_auto_first() {
        let (mut climate, handle) = entity();
        assert!(climate.set_preset_mode(OperationMode::On).await);

        assert!(climate.set_humidity(45).await);
        assert_eq!(climate.state().preset_mode, OperationMode::Auto);
        assert_eq!(climate.state().target_humidity, 45);

        let device_status = handle.device().snapshot().unwrap();
        assert_eq!(device_status.mode, OperationMode::Auto);
        assert_eq!(device_status.target_humidity, 50);
    }

    #[tokio::test]
    async fn test_set_humidity_out_of_range_sends_nothing() {
        let (mut climate, handle) = entity();
        handle.device().set_property("auto", json!(60));
        climate.handle_coordinator_update(&handle.device().snapshot().unwrap(), true);

        assert!(!climate.set_humidity(0).await);
        assert!(!climate.set_humidity(101).await);
        assert_eq!(handle.device().snapshot().unwrap().target_humidity, 60);
        assert_eq!(climate.state().target_humidity, 60);
    }

    #[tokio::test]
    async fn test_set_fan_mode() {
        let (mut climate, handle) = entity();

        assert!(climate.set_fan_mode(FanSpeed::High).await);
        assert_eq!(climate.state().fan_mode, Some(FanSpeed::High));
        assert_eq!(handle.device().snapshot().unwrap().fan_speed, FanSpeed::High);

        assert!(!climate.set_fan_mode(FanSpeed::Strong).await);

        assert!(climate.set_preset_mode(OperationMode::DryCloth).await);
        assert!(!climate.set_fan_mode(FanSpeed::Low).await);
        assert_eq!(handle.device().snapshot().unwrap().fan_speed, FanSpeed::High);
    }

    #[test]
    fn test_state_message_document() {
        let (climate, _) = entity();
        let document = serde_json::to_value(climate.state_message()).unwrap();
        assert_eq!(document["platform"], "climate");
        assert_eq!(document["state"]["hvac_mode"], "dry");
        assert_eq!(document["state"]["preset_mode"], "Auto");
        assert_eq!(document["state"]["supported_features"], 28);
        assert_eq!(document["state"]["fan_modes"], json!(["Low", "Medium", "High"]));
    }
}
