use async_channel::Sender;
use error_stack::{Result, ResultExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use log::{debug, error, info};

use rumqttc::{self, Packet};
use crate::{
    dehumidifier::{FanSpeed, OperationMode},
    entity::{climate::HvacMode, switch::SwitchKey},
    error::MqttError,
    messages::{ToDeviceMessage, ToMqttPublisherMessage},
};

#[derive(Debug, Deserialize)]
#[serde(tag = "command")]
enum Action {
    TurnOn,
    TurnOff,
    SetHvacMode { hvac_mode: HvacMode },
    SetPresetMode { preset_mode: OperationMode },
    SetFanMode { fan_mode: FanSpeed },
    SetHumidity { humidity: u8 },
    SetSwitch { switch: SwitchKey, on: bool },
    Refresh,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Operation {
    Action(Action),
    ActionList(Vec<Action>),
}

pub async fn mqtt_subscriber_session(
    mut mqtt_event_loop: rumqttc::EventLoop,
    to_device_channel: Sender<ToDeviceMessage>,
    to_mqtt_publish_channel: Sender<ToMqttPublisherMessage>,
    cancel_token: CancellationToken,
) -> Result<(), MqttError> {
    let into_context = || MqttError::Context("MQTT subscriber session".to_string());

    loop {
        let notification = tokio::select! {
            notification = mqtt_event_loop.poll() => notification,
            _ = cancel_token.cancelled() => {
                info!("MQTT subscriber session cancelled");
                return Ok(());
            }
        };

        match notification {
            Ok(rumqttc::Event::Incoming(Packet::Publish(publish_packet))) => {
                debug!("Received MQTT message: {:?}", publish_packet);
                match messages_from_payload(&publish_packet.payload) {
                    Ok(messages) => {
                        for message in messages {
                            to_device_channel.send(message).await.change_context_lazy(into_context)?;
                        }
                    }
                    Err(e) => {
                        error!("Error parsing MQTT command message: {:?}", e);
                        to_mqtt_publish_channel
                            .send(ToMqttPublisherMessage::Error(format!("Error parsing MQTT command message: {:?}", e)))
                            .await
                            .change_context_lazy(into_context)?;
                    }
                }
            }

            Ok(_) => {}

            Err(error) => {
                error!("MQTT notification error: {:?}", error);
                return Err(error).change_context_lazy(into_context);
            }
        }
    }
}

/// Decode a command payload into device messages, ending with a refresh so the result gets published.
fn messages_from_payload(payload: &[u8]) -> std::result::Result<Vec<ToDeviceMessage>, serde_json::Error> {
    let actions = match serde_json::from_slice::<Operation>(payload)? {
        Operation::Action(action) => vec![action],
        Operation::ActionList(actions) => actions,
    };

    let mut messages: Vec<ToDeviceMessage> = actions
        .iter()
        .filter_map(get_device_message_from_action)
        .collect();
    messages.push(ToDeviceMessage::PublishEntitiesState);
    Ok(messages)
}

fn get_device_message_from_action(action: &Action) -> Option<ToDeviceMessage> {
    match action {
        Action::TurnOn => Some(ToDeviceMessage::TurnOn),
        Action::TurnOff => Some(ToDeviceMessage::TurnOff),
        Action::SetHvacMode { hvac_mode } => Some(ToDeviceMessage::SetHvacMode(*hvac_mode)),
        Action::SetPresetMode { preset_mode } => Some(ToDeviceMessage::SetPresetMode(*preset_mode)),
        Action::SetFanMode { fan_mode } => Some(ToDeviceMessage::SetFanMode(*fan_mode)),
        Action::SetHumidity { humidity } => Some(ToDeviceMessage::SetHumidity(*humidity)),
        Action::SetSwitch { switch, on } => Some(ToDeviceMessage::SetSwitch(*switch, *on)),
        Action::Refresh => None,
    }
}

#[cfg(test)]
mod tests {
    use super::messages_from_payload;
    use crate::dehumidifier::{FanSpeed, OperationMode};
    use crate::entity::{climate::HvacMode, switch::SwitchKey};
    use crate::messages::ToDeviceMessage;

    #[test]
    fn test_single_action() {
        let messages = messages_from_payload(br#"{"command":"SetHumidity","humidity":45}"#).unwrap();
        assert_eq!(messages, vec![ToDeviceMessage::SetHumidity(45), ToDeviceMessage::PublishEntitiesState]);
    }

    #[test]
    fn test_action_list() {
        let messages = messages_from_payload(
            br#"[
                {"command":"SetHvacMode","hvac_mode":"dry"},
                {"command":"SetPresetMode","preset_mode":"DryCloth"},
                {"command":"SetFanMode","fan_mode":"High"},
                {"command":"SetSwitch","switch":"child_lock","on":true}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            messages,
            vec![
                ToDeviceMessage::SetHvacMode(HvacMode::Dry),
                ToDeviceMessage::SetPresetMode(OperationMode::DryCloth),
                ToDeviceMessage::SetFanMode(FanSpeed::High),
                ToDeviceMessage::SetSwitch(SwitchKey::ChildLock, true),
                ToDeviceMessage::PublishEntitiesState,
            ]
        );
    }

    #[test]
    fn test_refresh_only() {
        let messages = messages_from_payload(br#"{"command":"Refresh"}"#).unwrap();
        assert_eq!(messages, vec![ToDeviceMessage::PublishEntitiesState]);
    }

    #[test]
    fn test_invalid_commands() {
        assert!(messages_from_payload(br#"{"command":"SetPresetMode","preset_mode":"Turbo"}"#).is_err());
        assert!(messages_from_payload(br#"{"command":"SetHumidity","humidity":300}"#).is_err());
        assert!(messages_from_payload(b"not json").is_err());
    }
}
