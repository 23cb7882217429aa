use serde::{Deserialize, Serialize};

use super::{EntityCategory, EntityState, EntityStateMessage, Platform};
use crate::dehumidifier::DeviceStatus;
use crate::device::{DehumidifierClient, DeviceHandle};
use crate::error::DeviceError;

pub const FEATURE_SET_BUZZER: u32 = 1;
pub const FEATURE_SET_LED: u32 = 2;
pub const FEATURE_SET_CHILD_LOCK: u32 = 4;

pub const DEHUMIDIFIER_FEATURES: u32 = FEATURE_SET_BUZZER | FEATURE_SET_CHILD_LOCK | FEATURE_SET_LED;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchKey {
    Buzzer,
    ChildLock,
    Led,
}

impl SwitchKey {
    pub fn key(&self) -> &'static str {
        match self {
            SwitchKey::Buzzer => "buzzer",
            SwitchKey::ChildLock => "child_lock",
            SwitchKey::Led => "led",
        }
    }

    fn is_on(&self, status: &DeviceStatus) -> bool {
        match self {
            SwitchKey::Buzzer => status.buzzer,
            SwitchKey::ChildLock => status.child_lock,
            SwitchKey::Led => status.led,
        }
    }

    fn set<D: DehumidifierClient>(&self, device: &D, on: bool) -> Result<Vec<String>, DeviceError> {
        match self {
            SwitchKey::Buzzer => device.set_buzzer(on),
            SwitchKey::ChildLock => device.set_child_lock(on),
            SwitchKey::Led => device.set_led(on),
        }
    }
}

#[derive(Debug)]
pub struct SwitchDescription {
    pub key: SwitchKey,
    pub name: &'static str,
    pub icon: &'static str,
    pub entity_category: EntityCategory,
    pub feature: u32,
}

pub static SWITCH_TYPES: [SwitchDescription; 3] = [
    SwitchDescription {
        key: SwitchKey::Buzzer,
        name: "Buzzer",
        icon: "mdi:volume-high",
        entity_category: EntityCategory::Config,
        feature: FEATURE_SET_BUZZER,
    },
    SwitchDescription {
        key: SwitchKey::ChildLock,
        name: "Child lock",
        icon: "mdi:lock",
        entity_category: EntityCategory::Config,
        feature: FEATURE_SET_CHILD_LOCK,
    },
    SwitchDescription {
        key: SwitchKey::Led,
        name: "Led",
        icon: "mdi:led-outline",
        entity_category: EntityCategory::Config,
        feature: FEATURE_SET_LED,
    },
];

pub struct SwitchEntity<D> {
    device: DeviceHandle<D>,
    pub(super) description: &'static SwitchDescription,
    unique_id: String,
    is_on: bool,
    pub(super) available: bool,
}

pub fn setup_entry<D: DehumidifierClient>(
    device: &DeviceHandle<D>,
    unique_id: &str,
    status: &DeviceStatus,
    device_features: u32,
) -> Vec<SwitchEntity<D>> {
    SWITCH_TYPES
        .iter()
        .filter(|description| description.feature & device_features != 0)
        .map(|description| SwitchEntity {
            device: device.clone(),
            description,
            unique_id: format!("{}_{}", description.key.key(), unique_id),
            is_on: description.key.is_on(status),
            available: true,
        })
        .collect()
}

impl<D: DehumidifierClient> SwitchEntity<D> {
    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn handle_coordinator_update(&mut self, status: &DeviceStatus, available: bool) {
        self.is_on = self.description.key.is_on(status);
        self.available = available;
    }

    pub async fn turn_on(&mut self) -> bool {
        self.set_state(true).await
    }

    pub async fn turn_off(&mut self) -> bool {
        self.set_state(false).await
    }

    async fn set_state(&mut self, on: bool) -> bool {
        let key = self.description.key;
        let mask_error = format!(
            "Turning the {} of the miio device {} failed.",
            self.description.name.to_lowercase(),
            if on { "on" } else { "off" }
        );
        let done = self
            .device
            .try_command(&mask_error, self.available, move |d| key.set(d, on))
            .await;
        if done {
            self.is_on = on;
        }
        done
    }

    pub fn state_message(&self) -> EntityStateMessage {
        EntityStateMessage {
            unique_id: self.unique_id.clone(),
            name: Some(self.description.name.to_string()),
            platform: Platform::Switch,
            icon: Some(self.description.icon),
            entity_category: Some(self.description.entity_category),
            device_class: None,
            available: self.available,
            state: EntityState::Switch { is_on: self.is_on },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{setup_entry, SwitchKey, FEATURE_SET_BUZZER, FEATURE_SET_LED};
    use crate::device::DeviceHandle;
    use crate::error::DeviceError;
    use crate::simulator::SimulatedDehumidifier;

    #[test]
    fn test_setup_filters_by_feature() {
        let handle = DeviceHandle::new(SimulatedDehumidifier::new());
        let status = handle.device().snapshot().unwrap();

        let switches = setup_entry(&handle, "aa:bb", &status, FEATURE_SET_BUZZER | FEATURE_SET_LED);
        let keys: Vec<_> = switches.iter().map(|s| s.description.key).collect();
        assert_eq!(keys, vec![SwitchKey::Buzzer, SwitchKey::Led]);
        assert_eq!(switches[0].state_message().unique_id, "buzzer_aa:bb");
        assert!(switches[0].is_on());
    }

    #[tokio::test]
    async fn test_switch_commands() {
        let handle = DeviceHandle::new(SimulatedDehumidifier::new());
        let status = handle.device().snapshot().unwrap();
        let mut switches = setup_entry(&handle, "aa:bb", &status, super::DEHUMIDIFIER_FEATURES);
        let child_lock = switches.iter_mut().find(|s| s.description.key == SwitchKey::ChildLock).unwrap();

        assert!(!child_lock.is_on());
        assert!(child_lock.turn_on().await);
        assert!(child_lock.is_on());
        assert!(handle.device().snapshot().unwrap().child_lock);

        handle.device().fail_commands(Some(DeviceError::new("no reply")));
        assert!(!child_lock.turn_off().await);
        assert!(child_lock.is_on());
    }
}
