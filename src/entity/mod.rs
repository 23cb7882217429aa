pub mod binary_sensor;
pub mod climate;
pub mod switch;

use error_stack::{Report, Result};
use log::info;
use serde::Serialize;

use crate::config::{ConfigEntry, FlowType};
use crate::coordinator::Coordinator;
use crate::dehumidifier::DeviceStatus;
use crate::device::DehumidifierClient;
use crate::error::SetupError;

use binary_sensor::{BinarySensorDeviceClass, BinarySensorEntity};
use climate::{ClimateAttributes, ClimateEntity};
use switch::{SwitchEntity, SwitchKey, DEHUMIDIFIER_FEATURES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Climate,
    Switch,
    BinarySensor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Config,
    Diagnostic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntityState {
    Climate(ClimateAttributes),
    Switch { is_on: bool },
    BinarySensor { is_on: bool },
}

/// State document published for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityStateMessage {
    pub unique_id: String,
    pub name: Option<String>,
    pub platform: Platform,
    pub icon: Option<&'static str>,
    pub entity_category: Option<EntityCategory>,
    pub device_class: Option<BinarySensorDeviceClass>,
    pub available: bool,
    pub state: EntityState,
}

/// All entities set up for one config entry.
pub struct Entities<D> {
    pub climate: Option<ClimateEntity<D>>,
    pub switches: Vec<SwitchEntity<D>>,
    pub binary_sensors: Vec<BinarySensorEntity>,
}

impl<D: DehumidifierClient> Entities<D> {
    pub fn setup_entry(entry: &ConfigEntry, coordinator: &Coordinator<D>) -> Result<Entities<D>, SetupError> {
        let status = coordinator.data().ok_or_else(|| {
            Report::new(SetupError::ConfigEntryNotReady).attach_printable("No device status before entity setup")
        })?;
        let device = coordinator.device();

        let climate = match entry.data.flow_type {
            FlowType::Device => Some(ClimateEntity::new(device.clone(), entry.unique_id.clone(), status)),
            FlowType::Gateway => None,
        };
        let switches = switch::setup_entry(device, &entry.unique_id, status, DEHUMIDIFIER_FEATURES);
        let binary_sensors = binary_sensor::setup_entry(&entry.unique_id, status);

        info!(
            "Set up {} climate, {} switch and {} binary sensor entities for {}",
            climate.iter().count(),
            switches.len(),
            binary_sensors.len(),
            entry.title
        );

        Ok(Entities {
            climate,
            switches,
            binary_sensors,
        })
    }

    /// Rebuild every entity from the coordinator's latest status.
    pub fn handle_coordinator_update(&mut self, coordinator: &Coordinator<D>) {
        let available = coordinator.last_update_success();
        let Some(status) = coordinator.data() else {
            self.set_available(available);
            return;
        };

        self.update_from_status(status, available);
    }

    fn update_from_status(&mut self, status: &DeviceStatus, available: bool) {
        if let Some(climate) = self.climate.as_mut() {
            climate.handle_coordinator_update(status, available);
        }
        for switch in self.switches.iter_mut() {
            switch.handle_coordinator_update(status, available);
        }
        for sensor in self.binary_sensors.iter_mut() {
            sensor.handle_coordinator_update(status, available);
        }
    }

    fn set_available(&mut self, available: bool) {
        if let Some(climate) = self.climate.as_mut() {
            climate.available = available;
        }
        for switch in self.switches.iter_mut() {
            switch.available = available;
        }
        for sensor in self.binary_sensors.iter_mut() {
            sensor.available = available;
        }
    }

    pub fn switch_mut(&mut self, key: SwitchKey) -> Option<&mut SwitchEntity<D>> {
        self.switches.iter_mut().find(|s| s.description.key == key)
    }

    pub fn state_messages(&self) -> Vec<EntityStateMessage> {
        self.climate
            .iter()
            .map(|c| c.state_message())
            .chain(self.switches.iter().map(|s| s.state_message()))
            .chain(self.binary_sensors.iter().map(|s| s.state_message()))
            .collect()
    }
}
