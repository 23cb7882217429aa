use std::{fmt::Debug, sync::Arc};

use log::{debug, error};

use crate::dehumidifier::{DeviceStatus, FanSpeed, OperationMode};
use crate::error::DeviceError;

/// Blocking client for one dehumidifier on the local network.
pub trait DehumidifierClient: Send + Sync + 'static {
    fn status(&self) -> Result<DeviceStatus, DeviceError>;
    fn on(&self) -> Result<Vec<String>, DeviceError>;
    fn off(&self) -> Result<Vec<String>, DeviceError>;
    fn set_mode(&self, mode: OperationMode) -> Result<Vec<String>, DeviceError>;
    fn set_fan_speed(&self, fan_speed: FanSpeed) -> Result<Vec<String>, DeviceError>;
    fn set_target_humidity(&self, humidity: u8) -> Result<Vec<String>, DeviceError>;
    fn set_buzzer(&self, buzzer: bool) -> Result<Vec<String>, DeviceError>;
    fn set_child_lock(&self, lock: bool) -> Result<Vec<String>, DeviceError>;
    fn set_led(&self, led: bool) -> Result<Vec<String>, DeviceError>;
}

/// Shared handle that runs blocking client calls on the blocking thread pool.
pub struct DeviceHandle<D> {
    device: Arc<D>,
}

impl<D> Clone for DeviceHandle<D> {
    fn clone(&self) -> Self {
        DeviceHandle {
            device: self.device.clone(),
        }
    }
}

impl<D: DehumidifierClient> DeviceHandle<D> {
    pub fn new(device: D) -> Self {
        DeviceHandle {
            device: Arc::new(device),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub async fn execute<T, F>(&self, call: F) -> Result<T, DeviceError>
    where
        T: Send + 'static,
        F: FnOnce(&D) -> Result<T, DeviceError> + Send + 'static,
    {
        let device = self.device.clone();
        tokio::task::spawn_blocking(move || call(&device))
            .await
            .map_err(|e| DeviceError::new(format!("Device call did not complete: {e}")))?
    }

    pub async fn status(&self) -> Result<DeviceStatus, DeviceError> {
        let status = self.execute(|device| device.status()).await?;
        debug!("Got new state: {:?}", status);
        Ok(status)
    }

    /// Run a device command, logging failures instead of returning them.
    ///
    /// Returns true when the call did not fail. `report_errors` is false while the
    /// entity is unavailable, to avoid repeating the failure the coordinator already logged.
    pub async fn try_command<T, F>(&self, mask_error: &str, report_errors: bool, call: F) -> bool
    where
        T: Debug + Send + 'static,
        F: FnOnce(&D) -> Result<T, DeviceError> + Send + 'static,
    {
        match self.execute(call).await {
            Ok(result) => {
                debug!("Response received from miio device: {:?}", result);
                true
            }
            Err(e) => {
                if report_errors {
                    error!("{}: {}", mask_error, e);
                }
                false
            }
        }
    }
}
