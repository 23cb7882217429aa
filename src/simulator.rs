use std::collections::VecDeque;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use log::debug;
use serde_json::{json, Map, Value};

use crate::dehumidifier::{DeviceStatus, FanSpeed, OperationMode, PROPERTIES};
use crate::device::DehumidifierClient;
use crate::error::DeviceError;

const TARGET_HUMIDITY_VALUES: [u8; 3] = [40, 50, 60];

/// In-memory dehumidifier keeping the raw miio property table.
pub struct SimulatedDehumidifier {
    properties: Mutex<Map<String, Value>>,
    status_failures: Mutex<VecDeque<DeviceError>>,
    command_failure: Mutex<Option<DeviceError>>,
    #[cfg(test)]
    status_calls: AtomicUsize,
}

impl SimulatedDehumidifier {
    pub fn new() -> Self {
        let mut properties = Map::new();
        for (key, value) in PROPERTIES.iter().zip([
            json!("on"),
            json!("auto"),
            json!(2),
            json!("on"),
            json!("on"),
            json!("off"),
            json!(55),
            json!(24),
            json!("on"),
            json!(2),
            json!("off"),
            json!("off"),
            json!("ok"),
            json!(50),
        ]) {
            properties.insert(key.to_string(), value);
        }

        SimulatedDehumidifier {
            properties: Mutex::new(properties),
            status_failures: Mutex::new(VecDeque::new()),
            command_failure: Mutex::new(None),
            #[cfg(test)]
            status_calls: AtomicUsize::new(0),
        }
    }

    /// Current status without counting a fetch or consuming injected failures.
    pub fn snapshot(&self) -> Result<DeviceStatus, DeviceError> {
        let properties = self.lock_properties()?;
        DeviceStatus::from_properties(&properties).map_err(|e| DeviceError::new(format!("{e:?}")))
    }

    fn lock_properties(&self) -> Result<std::sync::MutexGuard<'_, Map<String, Value>>, DeviceError> {
        self.properties
            .lock()
            .map_err(|_| DeviceError::new("Simulated device state poisoned"))
    }

    fn send(&self, method: &str, updates: &[(&str, Value)]) -> Result<Vec<String>, DeviceError> {
        if let Some(error) = self
            .command_failure
            .lock()
            .map_err(|_| DeviceError::new("Simulated device state poisoned"))?
            .clone()
        {
            return Err(error);
        }

        debug!("Simulated device {} {:?}", method, updates);
        let mut properties = self.lock_properties()?;
        for (key, value) in updates {
            properties.insert(key.to_string(), value.clone());
        }
        Ok(vec!["ok".to_string()])
    }

    fn on_off(on: bool) -> Value {
        Value::from(if on { "on" } else { "off" })
    }
}

// Failure injection, only reachable from tests
#[cfg(test)]
impl SimulatedDehumidifier {
    /// Queue an error returned by one of the next status fetches.
    pub fn fail_next_status(&self, error: DeviceError) {
        if let Ok(mut failures) = self.status_failures.lock() {
            failures.push_back(error);
        }
    }

    /// Make every command fail with `error` until cleared with `None`.
    pub fn fail_commands(&self, error: Option<DeviceError>) {
        if let Ok(mut failure) = self.command_failure.lock() {
            *failure = error;
        }
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn set_property(&self, key: &str, value: Value) {
        if let Ok(mut properties) = self.properties.lock() {
            properties.insert(key.to_string(), value);
        }
    }
}

impl Default for SimulatedDehumidifier {
    fn default() -> Self {
        Self::new()
    }
}

impl DehumidifierClient for SimulatedDehumidifier {
    fn status(&self) -> Result<DeviceStatus, DeviceError> {
        #[cfg(test)]
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let failure = self
            .status_failures
            .lock()
            .map_err(|_| DeviceError::new("Simulated device state poisoned"))?
            .pop_front();
        match failure {
            Some(error) => Err(error),
            None => self.snapshot(),
        }
    }

    fn on(&self) -> Result<Vec<String>, DeviceError> {
        self.send("set_power", &[("on_off", Self::on_off(true)), ("compressor_status", Self::on_off(true))])
    }

    fn off(&self) -> Result<Vec<String>, DeviceError> {
        self.send("set_power", &[("on_off", Self::on_off(false)), ("compressor_status", Self::on_off(false))])
    }

    fn set_mode(&self, mode: OperationMode) -> Result<Vec<String>, DeviceError> {
        // The device powers on when a mode is selected while it is off.
        self.send("set_mode", &[("mode", Value::from(mode.value())), ("on_off", Self::on_off(true))])
    }

    fn set_fan_speed(&self, fan_speed: FanSpeed) -> Result<Vec<String>, DeviceError> {
        let value = Value::from(fan_speed.value());
        self.send("set_fan_level", &[("fan_speed", value.clone()), ("fan_st", value)])
    }

    fn set_target_humidity(&self, humidity: u8) -> Result<Vec<String>, DeviceError> {
        if !TARGET_HUMIDITY_VALUES.contains(&humidity) {
            return Err(DeviceError::new(format!("Invalid target humidity: {humidity}")));
        }
        self.send("set_auto", &[("auto", Value::from(humidity))])
    }

    fn set_buzzer(&self, buzzer: bool) -> Result<Vec<String>, DeviceError> {
        self.send("set_buzzer", &[("buzzer", Self::on_off(buzzer))])
    }

    fn set_child_lock(&self, lock: bool) -> Result<Vec<String>, DeviceError> {
        self.send("set_child_lock", &[("child_lock", Self::on_off(lock))])
    }

    fn set_led(&self, led: bool) -> Result<Vec<String>, DeviceError> {
        self.send("set_led", &[("led", Self::on_off(led))])
    }
}
