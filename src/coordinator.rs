use std::future::Future;

use error_stack::{Report, Result};
use log::{debug, error, info};
use tokio::time::Duration;

use crate::dehumidifier::DeviceStatus;
use crate::device::{DehumidifierClient, DeviceHandle};
use crate::error::{DeviceError, SetupError, UpdateFailed};

pub const POLLING_TIMEOUT: Duration = Duration::from_secs(10);
pub const UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Error code the device reports for a glitch that goes away on the next request.
pub const TRANSIENT_ERROR_CODE: i32 = -9999;

pub fn is_transient(error: &DeviceError) -> bool {
    error.code == Some(TRANSIENT_ERROR_CODE)
}

async fn fetch_with_timeout<T, Fut>(timeout: Duration, fetch: Fut) -> std::result::Result<T, UpdateFailed>
where
    Fut: Future<Output = std::result::Result<T, DeviceError>>,
{
    match tokio::time::timeout(timeout, fetch).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(UpdateFailed::Device(e)),
        Err(_) => Err(UpdateFailed::Timeout(timeout)),
    }
}

/// Fetch once, and once more if the first attempt failed with an error `should_retry` accepts.
///
/// Each attempt runs under its own `timeout`. Timeouts are never retried.
pub async fn poll_with_retry<T, F, Fut, P>(timeout: Duration, should_retry: P, mut fetch: F) -> Result<T, UpdateFailed>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, DeviceError>>,
    P: Fn(&DeviceError) -> bool,
{
    let first_error = match fetch_with_timeout(timeout, fetch()).await {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if !matches!(&first_error, UpdateFailed::Device(e) if should_retry(e)) {
        return Err(Report::new(first_error));
    }

    info!("Got exception while fetching the state, trying again: {}", first_error);
    fetch_with_timeout(timeout, fetch())
        .await
        .map_err(|e| Report::new(e).attach_printable(format!("Retried after: {first_error}")))
}

/// Polls one device and keeps the last good status for the entities.
pub struct Coordinator<D> {
    name: String,
    device: DeviceHandle<D>,
    update_interval: Duration,
    polling_timeout: Duration,
    data: Option<DeviceStatus>,
    last_update_success: bool,
    last_error: Option<UpdateFailed>,
}

impl<D: DehumidifierClient> Coordinator<D> {
    pub fn new(name: impl Into<String>, device: DeviceHandle<D>, update_interval: Duration) -> Self {
        Coordinator {
            name: name.into(),
            device,
            update_interval,
            polling_timeout: POLLING_TIMEOUT,
            data: None,
            last_update_success: true,
            last_error: None,
        }
    }

    pub fn with_polling_timeout(mut self, polling_timeout: Duration) -> Self {
        self.polling_timeout = polling_timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> &DeviceHandle<D> {
        &self.device
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    pub fn data(&self) -> Option<&DeviceStatus> {
        self.data.as_ref()
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success
    }

    pub fn last_error(&self) -> Option<&UpdateFailed> {
        self.last_error.as_ref()
    }

    /// Fetch a new status. On failure the previous status is kept and the coordinator is marked unsuccessful.
    pub async fn refresh(&mut self) -> bool {
        let device = self.device.clone();
        let result = poll_with_retry(self.polling_timeout, is_transient, || {
            let device = device.clone();
            async move { device.status().await }
        })
        .await;

        match result {
            Ok(status) => {
                if !self.last_update_success {
                    info!("Fetching {} data recovered", self.name);
                }
                self.data = Some(status);
                self.last_update_success = true;
                self.last_error = None;
            }
            Err(report) => {
                if self.last_update_success {
                    error!("Error fetching {} data: {:?}", self.name, report);
                } else {
                    debug!("Error fetching {} data: {:?}", self.name, report);
                }
                self.last_update_success = false;
                self.last_error = Some(report.current_context().clone());
            }
        }

        self.last_update_success
    }

    /// First fetch during setup. Setup cannot continue without a status.
    pub async fn first_refresh(&mut self) -> Result<(), SetupError> {
        if self.refresh().await {
            return Ok(());
        }

        let mut report = Report::new(SetupError::ConfigEntryNotReady);
        if let Some(e) = &self.last_error {
            report = report.attach_printable(e.to_string());
        }
        Err(report)
    }
}
