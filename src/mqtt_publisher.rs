use async_channel::Receiver;
use error_stack::{Result, ResultExt};
use serde::Serialize;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use log::{debug, info};

use crate::entity::EntityStateMessage;
use crate::error::MqttError;
use crate::messages::ToMqttPublisherMessage;

pub struct MqttPublisher {
    controller_name: String,
    entity_states: HashMap<String, EntityStateMessage>,
    mqtt_client: rumqttc::AsyncClient,
    to_mqtt_publisher_channel: Receiver<ToMqttPublisherMessage>,
}

impl MqttPublisher {
    pub async fn mqtt_publisher_session(
        controller_name: String,
        mqtt_client: rumqttc::AsyncClient,
        to_mqtt_publisher_channel: Receiver<ToMqttPublisherMessage>,
        cancel_token: CancellationToken,
    ) -> Result<(), MqttError> {
        let mut mqtt_publisher =
            MqttPublisher::new(controller_name, mqtt_client, to_mqtt_publisher_channel);

        tokio::select! {
            result = mqtt_publisher.run_session() => result,
            _ = cancel_token.cancelled() => {
                info!("MQTT publisher session cancelled");
                Ok(())
            }
        }
    }

    fn new(
        controller_name: String,
        mqtt_client: rumqttc::AsyncClient,
        to_mqtt_publisher_channel: Receiver<ToMqttPublisherMessage>,
    ) -> Self {
        MqttPublisher {
            controller_name,
            entity_states: HashMap::new(),
            mqtt_client,
            to_mqtt_publisher_channel,
        }
    }

    async fn run_session(&mut self) -> Result<(), MqttError> {
        let into_context = || MqttError::Context("MQTT Publisher session".to_string());

        loop {
            let message = self
                .to_mqtt_publisher_channel
                .recv()
                .await
                .change_context_lazy(into_context)?;

            match message {
                ToMqttPublisherMessage::EntityState(entity_state) => {
                    self.publish_if_modified(entity_state).await.change_context_lazy(into_context)?
                }

                ToMqttPublisherMessage::EntitiesState(entity_states) => {
                    for entity_state in entity_states {
                        self.publish_if_modified(entity_state).await.change_context_lazy(into_context)?;
                    }
                }

                ToMqttPublisherMessage::Error(error_message) => {
                    let topic = error_topic(&self.controller_name);
                    debug!(
                        "Publishing to topic {} error_message: {}",
                        topic, error_message
                    );
                    self.publish(topic, &error_message).await?;
                }

                ToMqttPublisherMessage::DeviceAvailable(available) => {
                    let topic = available_topic(&self.controller_name);
                    debug!("Publishing to topic {} available: {}", &topic, available);
                    self.publish(topic, &available).await?;
                }
            }
        }
    }

    async fn publish_if_modified(&mut self, entity_state: EntityStateMessage) -> Result<(), MqttError> {
        if self.entity_states.get(&entity_state.unique_id) != Some(&entity_state) {
            let topic = state_topic(&self.controller_name, &entity_state.unique_id);
            debug!("Publishing to topic {} entity_state: {:#?}", topic, entity_state);
            self.publish(topic, &entity_state).await?;
            self.entity_states.insert(entity_state.unique_id.clone(), entity_state);
        }

        Ok(())
    }

    async fn publish<T: Serialize>(&self, topic: String, payload: &T) -> Result<(), MqttError> {
        let payload = serde_json::to_vec(payload)
            .map_err(|e| MqttError::ApiError(e.to_string(), format!("Serialize payload for {topic}")))?;
        self.mqtt_client
            .publish(&topic, rumqttc::QoS::AtLeastOnce, true, payload)
            .await
            .map_err(|e| MqttError::ApiError(e.to_string(), format!("Publish {topic}")).into())
    }
}

pub fn state_topic(controller_name: &str, unique_id: &str) -> String {
    format!("Dehumidifier/State/{controller_name}/{unique_id}")
}

pub fn error_topic(controller_name: &str) -> String {
    format!("Dehumidifier/Error/{controller_name}")
}

pub fn available_topic(controller_name: &str) -> String {
    format!("Dehumidifier/Available/{controller_name}")
}

#[cfg(test)]
mod tests {
    use rumqttc::{AsyncClient, MqttOptions};
    use tokio::time::Duration;

    use super::{available_topic, error_topic, state_topic, MqttPublisher};
    use crate::entity::{EntityState, EntityStateMessage, Platform};

    fn switch_state(is_on: bool) -> EntityStateMessage {
        EntityStateMessage {
            unique_id: "led_aa:bb".to_string(),
            name: Some("Led".to_string()),
            platform: Platform::Switch,
            icon: Some("mdi:led-outline"),
            entity_category: None,
            device_class: None,
            available: true,
            state: EntityState::Switch { is_on },
        }
    }

    #[tokio::test]
    async fn test_publish_only_when_modified() {
        // Room for two queued requests; a third publish would wait for the event loop.
        let (client, _event_loop) = AsyncClient::new(MqttOptions::new("test", "localhost", 1883), 2);
        let (_tx, rx) = async_channel::bounded(1);
        let mut publisher = MqttPublisher::new("basement".to_string(), client, rx);

        publisher.publish_if_modified(switch_state(true)).await.unwrap();
        publisher.publish_if_modified(switch_state(true)).await.unwrap();
        publisher.publish_if_modified(switch_state(false)).await.unwrap();
        assert_eq!(
            publisher.entity_states.get("led_aa:bb").map(|s| s.state.clone()),
            Some(EntityState::Switch { is_on: false })
        );

        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            publisher.publish_if_modified(switch_state(true)),
        )
        .await;
        assert!(blocked.is_err());
    }

    #[test]
    fn test_topics() {
        assert_eq!(state_topic("basement", "led_aa:bb"), "Dehumidifier/State/basement/led_aa:bb");
        assert_eq!(error_topic("basement"), "Dehumidifier/Error/basement");
        assert_eq!(available_topic("basement"), "Dehumidifier/Available/basement");
    }
}
