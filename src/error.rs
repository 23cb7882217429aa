use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Device error (code {code:?}): {message}")]
pub struct DeviceError {
    pub code: Option<i32>,
    pub message: String,
}

impl DeviceError {
    pub fn new(message: impl Into<String>) -> Self {
        DeviceError {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        DeviceError {
            code: Some(code),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DehumidifierError {
    #[error("Invalid device state {0}: {1}")]
    InvalidDeviceState(&'static str, String),

    #[error("Missing device property {0}")]
    MissingProperty(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateFailed {
    #[error("Update failed: {0}")]
    Device(DeviceError),

    #[error("Timeout fetching device status after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Config entry not ready")]
    ConfigEntryNotReady,
}

#[derive(Debug, Error)]
pub enum DeviceWorkerError {
    #[error("No climate entity is set up")]
    NoClimateEntity,

    #[error("No {0} switch is set up")]
    NoSwitch(&'static str),

    #[error("Command was not applied by the device")]
    CommandNotApplied,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Host is required")]
    MissingHost,

    #[error("Invalid token, expected 32 hexadecimal characters")]
    InvalidToken,

    #[error("Unsupported device model {0}")]
    UnsupportedModel(String),

    #[error("Invalid MAC address {0}")]
    InvalidMac(String),

    #[error("Config entry file error")]
    Io(#[from] std::io::Error),

    #[error("Invalid config entry")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("{0}")]
    Context(String),

    #[error("MQTT API error: {0} ({1})")]
    ApiError(String, String),
}
