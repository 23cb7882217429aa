use async_channel::{Receiver, Sender};
use error_stack::{Report, Result};
use tokio::time::Duration;

use log::{debug, error, info};

use crate::config::ConfigEntry;
use crate::coordinator::Coordinator;
use crate::device::DehumidifierClient;
use crate::entity::climate::ClimateEntity;
use crate::entity::{Entities, EntityStateMessage};
use crate::error::{DeviceWorkerError, SetupError};
use crate::messages::{ToDeviceMessage, ToMqttPublisherMessage};

const SETUP_RETRY_PERIOD: Duration = Duration::from_secs(5);

pub struct DeviceWorker<D> {
    coordinator: Coordinator<D>,
    entities: Entities<D>,
}

impl<D: DehumidifierClient> DeviceWorker<D> {
    pub async fn device_worker(
        entry: ConfigEntry,
        mut coordinator: Coordinator<D>,
        to_device_channel: Receiver<ToDeviceMessage>,
        to_mqtt_publisher_channel: Sender<ToMqttPublisherMessage>,
    ) {
        let entities = loop {
            // Setup loop
            match Self::setup(&entry, &mut coordinator).await {
                Ok(entities) => break entities,
                Err(e) => {
                    info!("Setting up {} failed, retrying: {:?}", entry.title, e);
                    // No publisher may be draining the queue yet; setup must keep retrying regardless.
                    for message in [
                        ToMqttPublisherMessage::DeviceAvailable(false),
                        ToMqttPublisherMessage::Error(format!("{e}")),
                    ] {
                        if let Err(send_error) = to_mqtt_publisher_channel.try_send(message) {
                            debug!("Setup failure not published: {}", send_error);
                        }
                    }
                    tokio::time::sleep(SETUP_RETRY_PERIOD).await;
                }
            }
        };

        let mut worker = DeviceWorker { coordinator, entities };
        worker.publish_entities_state(&to_mqtt_publisher_channel).await;

        loop {
            let message = match to_device_channel.recv().await {
                Ok(message) => message,
                Err(_) => {
                    info!("Device worker channel closed");
                    return;
                }
            };

            if let Err(e) = worker.handle_message(&message, &to_mqtt_publisher_channel).await {
                error!("Device worker failed to handle message: {:?} - error {:?}", message, e);
                let _ = to_mqtt_publisher_channel
                    .send(ToMqttPublisherMessage::Error(format!("Failed to handle {:?} - {}", message, e)))
                    .await;
            }
        }
    }

    async fn setup(entry: &ConfigEntry, coordinator: &mut Coordinator<D>) -> Result<Entities<D>, SetupError> {
        coordinator.first_refresh().await?;
        info!(
            "Coordinator {} set up, polling every {:?}",
            coordinator.name(),
            coordinator.update_interval()
        );
        Entities::setup_entry(entry, coordinator)
    }

    pub fn new(coordinator: Coordinator<D>, entities: Entities<D>) -> Self {
        DeviceWorker { coordinator, entities }
    }

    pub async fn handle_message(
        &mut self,
        message: &ToDeviceMessage,
        to_mqtt_publisher_channel: &Sender<ToMqttPublisherMessage>,
    ) -> Result<(), DeviceWorkerError> {
        let state = match message {
            ToDeviceMessage::PublishEntitiesState => {
                self.refresh().await;
                self.publish_entities_state(to_mqtt_publisher_channel).await;
                return Ok(());
            }

            ToDeviceMessage::TurnOn => {
                let climate = self.climate()?;
                Self::applied(climate.turn_on().await)?;
                climate.state_message()
            }
            ToDeviceMessage::TurnOff => {
                let climate = self.climate()?;
                Self::applied(climate.turn_off().await)?;
                climate.state_message()
            }
            ToDeviceMessage::SetHvacMode(hvac_mode) => {
                let climate = self.climate()?;
                Self::applied(climate.set_hvac_mode(*hvac_mode).await)?;
                climate.state_message()
            }
            ToDeviceMessage::SetPresetMode(preset_mode) => {
                let climate = self.climate()?;
                Self::applied(climate.set_preset_mode(*preset_mode).await)?;
                climate.state_message()
            }
            ToDeviceMessage::SetFanMode(fan_mode) => {
                let climate = self.climate()?;
                Self::applied(climate.set_fan_mode(*fan_mode).await)?;
                climate.state_message()
            }
            ToDeviceMessage::SetHumidity(humidity) => {
                let climate = self.climate()?;
                Self::applied(climate.set_humidity(*humidity).await)?;
                climate.state_message()
            }
            ToDeviceMessage::SetSwitch(key, on) => {
                let switch = self
                    .entities
                    .switch_mut(*key)
                    .ok_or_else(|| Report::new(DeviceWorkerError::NoSwitch(key.key())))?;
                let done = if *on { switch.turn_on().await } else { switch.turn_off().await };
                Self::applied(done)?;
                switch.state_message()
            }
        };

        let _ = to_mqtt_publisher_channel
            .send(ToMqttPublisherMessage::EntityState(state))
            .await;
        Ok(())
    }

    fn climate(&mut self) -> Result<&mut ClimateEntity<D>, DeviceWorkerError> {
        self.entities
            .climate
            .as_mut()
            .ok_or_else(|| Report::new(DeviceWorkerError::NoClimateEntity))
    }

    fn applied(done: bool) -> Result<(), DeviceWorkerError> {
        if done {
            Ok(())
        } else {
            Err(Report::new(DeviceWorkerError::CommandNotApplied))
        }
    }

    async fn refresh(&mut self) {
        debug!("Refreshing {}", self.coordinator.name());
        self.coordinator.refresh().await;
        self.entities.handle_coordinator_update(&self.coordinator);
    }

    pub fn entity_states(&self) -> Vec<EntityStateMessage> {
        self.entities.state_messages()
    }

    async fn publish_entities_state(&self, to_mqtt_publisher_channel: &Sender<ToMqttPublisherMessage>) {
        let _ = to_mqtt_publisher_channel
            .send(ToMqttPublisherMessage::DeviceAvailable(self.coordinator.last_update_success()))
            .await;
        let _ = to_mqtt_publisher_channel
            .send(ToMqttPublisherMessage::EntitiesState(self.entity_states()))
            .await;
    }
}
