use serde::Serialize;

use super::{EntityCategory, EntityState, EntityStateMessage, Platform};
use crate::dehumidifier::DeviceStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinarySensorDeviceClass {
    Problem,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinarySensorKey {
    TankFull,
    DefrostStatus,
}

impl BinarySensorKey {
    pub fn key(&self) -> &'static str {
        match self {
            BinarySensorKey::TankFull => "tank_full",
            BinarySensorKey::DefrostStatus => "defrost_status",
        }
    }

    fn is_on(&self, status: &DeviceStatus) -> bool {
        match self {
            BinarySensorKey::TankFull => status.tank_full,
            BinarySensorKey::DefrostStatus => status.defrost_status,
        }
    }
}

#[derive(Debug)]
pub struct BinarySensorDescription {
    pub key: BinarySensorKey,
    pub name: &'static str,
    pub icon: &'static str,
    pub device_class: BinarySensorDeviceClass,
    pub entity_category: EntityCategory,
}

pub static BINARY_SENSOR_TYPES: [BinarySensorDescription; 2] = [
    BinarySensorDescription {
        key: BinarySensorKey::TankFull,
        name: "Water tank full",
        icon: "mdi:water-alert",
        device_class: BinarySensorDeviceClass::Problem,
        entity_category: EntityCategory::Diagnostic,
    },
    BinarySensorDescription {
        key: BinarySensorKey::DefrostStatus,
        name: "Defrost status",
        icon: "mdi:snowflake-melt",
        device_class: BinarySensorDeviceClass::Running,
        entity_category: EntityCategory::Diagnostic,
    },
];

pub struct BinarySensorEntity {
    description: &'static BinarySensorDescription,
    unique_id: String,
    is_on: bool,
    pub(super) available: bool,
}

pub fn setup_entry(unique_id: &str, status: &DeviceStatus) -> Vec<BinarySensorEntity> {
    BINARY_SENSOR_TYPES
        .iter()
        .map(|description| BinarySensorEntity {
            description,
            unique_id: format!("{}_{}", description.key.key(), unique_id),
            is_on: description.key.is_on(status),
            available: true,
        })
        .collect()
}

impl BinarySensorEntity {
    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn handle_coordinator_update(&mut self, status: &DeviceStatus, available: bool) {
        self.is_on = self.description.key.is_on(status);
        self.available = available;
    }

    pub fn state_message(&self) -> EntityStateMessage {
        EntityStateMessage {
            unique_id: self.unique_id.clone(),
            name: Some(self.description.name.to_string()),
            platform: Platform::BinarySensor,
            icon: Some(self.description.icon),
            entity_category: Some(self.description.entity_category),
            device_class: Some(self.description.device_class),
            available: self.available,
            state: EntityState::BinarySensor { is_on: self.is_on },
        }
    }
}
