use core::fmt::{Display, Formatter};
use error_stack::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DehumidifierError;

/// Properties requested from the device on every status fetch.
pub const PROPERTIES: [&str; 14] = [
    "on_off",
    "mode",
    "fan_st",
    "buzzer",
    "led",
    "child_lock",
    "humidity",
    "temp",
    "compressor_status",
    "fan_speed",
    "tank_full",
    "defrost_status",
    "alarm",
    "auto",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationMode {
    On,
    Auto,
    DryCloth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FanSpeed {
    Sleep,
    Low,
    Medium,
    High,
    Strong,
}

// (mode, device value)
const OPERATION_MODES: [(OperationMode, &str); 3] = [
    (OperationMode::On, "on"),
    (OperationMode::Auto, "auto"),
    (OperationMode::DryCloth, "dry_cloth"),
];

// (speed, device value)
const FAN_SPEEDS: [(FanSpeed, u8); 5] = [
    (FanSpeed::Sleep, 0),
    (FanSpeed::Low, 1),
    (FanSpeed::Medium, 2),
    (FanSpeed::High, 3),
    (FanSpeed::Strong, 4),
];

impl OperationMode {
    pub const ALL: [OperationMode; 3] = [OperationMode::On, OperationMode::Auto, OperationMode::DryCloth];

    pub fn name(&self) -> &'static str {
        match self {
            OperationMode::On => "On",
            OperationMode::Auto => "Auto",
            OperationMode::DryCloth => "DryCloth",
        }
    }

    pub fn value(&self) -> &'static str {
        OPERATION_MODES
            .iter()
            .find(|(mode, _)| mode == self)
            .map(|(_, value)| *value)
            .unwrap_or_default()
    }

    pub fn from_value(s: &str) -> Result<OperationMode, DehumidifierError> {
        OPERATION_MODES
            .iter()
            .find(|(_, value)| *value == s)
            .map(|(mode, _)| *mode)
            .ok_or_else(|| DehumidifierError::InvalidDeviceState("mode", String::from(s)).into())
    }
}

impl FanSpeed {
    pub const ALL: [FanSpeed; 5] = [FanSpeed::Sleep, FanSpeed::Low, FanSpeed::Medium, FanSpeed::High, FanSpeed::Strong];

    pub fn name(&self) -> &'static str {
        match self {
            FanSpeed::Sleep => "Sleep",
            FanSpeed::Low => "Low",
            FanSpeed::Medium => "Medium",
            FanSpeed::High => "High",
            FanSpeed::Strong => "Strong",
        }
    }

    pub fn value(&self) -> u8 {
        FAN_SPEEDS
            .iter()
            .find(|(speed, _)| speed == self)
            .map(|(_, value)| *value)
            .unwrap_or_default()
    }

    pub fn from_value(v: u64) -> Result<FanSpeed, DehumidifierError> {
        FAN_SPEEDS
            .iter()
            .find(|(_, value)| u64::from(*value) == v)
            .map(|(speed, _)| *speed)
            .ok_or_else(|| DehumidifierError::InvalidDeviceState("fan speed", v.to_string()).into())
    }
}

impl Display for OperationMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Display for FanSpeed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One status reading of the dehumidifier. Replaced as a whole by the next fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub is_on: bool,
    pub mode: OperationMode,
    pub temperature: i64,
    pub humidity: i64,
    pub target_humidity: i64,
    /// Fan step the device is currently running at.
    pub fan_st: FanSpeed,
    /// Fan speed setting.
    pub fan_speed: FanSpeed,
    pub tank_full: bool,
    pub compressor_status: bool,
    pub defrost_status: bool,
    pub alarm: String,
    pub buzzer: bool,
    pub child_lock: bool,
    pub led: bool,
}

impl DeviceStatus {
    /// Decode the raw property map returned by the device.
    pub fn from_properties(properties: &Map<String, Value>) -> Result<DeviceStatus, DehumidifierError> {
        Ok(DeviceStatus {
            is_on: Self::parse_on_off(properties, "on_off")?,
            mode: OperationMode::from_value(Self::parse_string(properties, "mode")?)?,
            temperature: Self::parse_integer(properties, "temp")?,
            humidity: Self::parse_integer(properties, "humidity")?,
            target_humidity: Self::parse_integer(properties, "auto")?,
            fan_st: Self::parse_fan_speed(properties, "fan_st")?,
            fan_speed: Self::parse_fan_speed(properties, "fan_speed")?,
            tank_full: Self::parse_on_off(properties, "tank_full")?,
            compressor_status: Self::parse_on_off(properties, "compressor_status")?,
            defrost_status: Self::parse_on_off(properties, "defrost_status")?,
            alarm: Self::parse_string(properties, "alarm")?.to_string(),
            buzzer: Self::parse_on_off(properties, "buzzer")?,
            child_lock: Self::parse_on_off(properties, "child_lock")?,
            led: Self::parse_on_off(properties, "led")?,
        })
    }

    fn property<'a>(properties: &'a Map<String, Value>, key: &'static str) -> Result<&'a Value, DehumidifierError> {
        properties
            .get(key)
            .ok_or_else(|| DehumidifierError::MissingProperty(key).into())
    }

    fn parse_string<'a>(properties: &'a Map<String, Value>, key: &'static str) -> Result<&'a str, DehumidifierError> {
        let value = Self::property(properties, key)?;
        value
            .as_str()
            .ok_or_else(|| DehumidifierError::InvalidDeviceState(key, value.to_string()).into())
    }

    fn parse_on_off(properties: &Map<String, Value>, key: &'static str) -> Result<bool, DehumidifierError> {
        match Self::parse_string(properties, key)? {
            "on" => Ok(true),
            "off" => Ok(false),
            other => Err(DehumidifierError::InvalidDeviceState(key, String::from(other)).into()),
        }
    }

    fn parse_integer(properties: &Map<String, Value>, key: &'static str) -> Result<i64, DehumidifierError> {
        let value = Self::property(properties, key)?;
        value
            .as_i64()
            .ok_or_else(|| DehumidifierError::InvalidDeviceState(key, value.to_string()).into())
    }

    fn parse_fan_speed(properties: &Map<String, Value>, key: &'static str) -> Result<FanSpeed, DehumidifierError> {
        let value = Self::property(properties, key)?;
        let step = value
            .as_u64()
            .ok_or_else(|| DehumidifierError::InvalidDeviceState(key, value.to_string()))?;
        FanSpeed::from_value(step)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::{json, Map, Value};

    use super::{DeviceStatus, FanSpeed, OperationMode};
    use crate::error::DehumidifierError;

    pub(crate) fn sample_properties() -> Map<String, Value> {
        let value = json!({
            "on_off": "on",
            "mode": "auto",
            "fan_st": 2,
            "buzzer": "on",
            "led": "on",
            "child_lock": "off",
            "humidity": 37,
            "temp": 28,
            "compressor_status": "on",
            "fan_speed": 2,
            "tank_full": "off",
            "defrost_status": "off",
            "alarm": "ok",
            "auto": 40
        });
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_parse_status() {
        let status = DeviceStatus::from_properties(&sample_properties()).unwrap();
        assert!(status.is_on);
        assert_eq!(status.mode, OperationMode::Auto);
        assert_eq!(status.temperature, 28);
        assert_eq!(status.humidity, 37);
        assert_eq!(status.target_humidity, 40);
        assert_eq!(status.fan_st, FanSpeed::Medium);
        assert!(status.compressor_status);
        assert!(!status.tank_full);
        assert!(status.buzzer);
        assert!(!status.child_lock);
        assert_eq!(status.alarm, "ok");
    }

    #[test]
    fn test_parse_status_rejects_bad_values() {
        let mut properties = sample_properties();
        properties.insert("mode".to_string(), json!("turbo"));
        let error = DeviceStatus::from_properties(&properties).unwrap_err();
        assert_eq!(error.current_context().to_string(), "Invalid device state mode: turbo");

        let mut properties = sample_properties();
        properties.insert("tank_full".to_string(), json!("maybe"));
        let error = DeviceStatus::from_properties(&properties).unwrap_err();
        assert_eq!(error.current_context().to_string(), "Invalid device state tank_full: maybe");

        let mut properties = sample_properties();
        properties.remove("auto");
        let error = DeviceStatus::from_properties(&properties).unwrap_err();
        assert!(matches!(error.current_context(), DehumidifierError::MissingProperty("auto")));
    }

    #[test]
    fn test_mode_table() {
        for mode in OperationMode::ALL {
            assert_eq!(OperationMode::from_value(mode.value()).unwrap(), mode);
        }
        assert_eq!(OperationMode::DryCloth.value(), "dry_cloth");
        assert_eq!(OperationMode::DryCloth.name(), "DryCloth");
    }

    #[test]
    fn test_fan_speed_table() {
        assert_eq!(FanSpeed::from_value(0).unwrap(), FanSpeed::Sleep);
        assert_eq!(FanSpeed::from_value(4).unwrap(), FanSpeed::Strong);
        assert!(FanSpeed::from_value(5).is_err());
        assert_eq!(FanSpeed::High.value(), 3);
        assert_eq!(FanSpeed::Medium.name(), "Medium");
    }
}
