use crate::dehumidifier::{FanSpeed, OperationMode};
use crate::entity::climate::HvacMode;
use crate::entity::switch::SwitchKey;
use crate::entity::EntityStateMessage;

#[derive(Debug, Clone, PartialEq)]
pub enum ToDeviceMessage {
    PublishEntitiesState,
    TurnOn,
    TurnOff,
    SetHvacMode(HvacMode),
    SetPresetMode(OperationMode),
    SetFanMode(FanSpeed),
    SetHumidity(u8),
    SetSwitch(SwitchKey, bool),
}

#[derive(Debug)]
pub enum ToMqttPublisherMessage {
    EntityState(EntityStateMessage),
    EntitiesState(Vec<EntityStateMessage>),
    DeviceAvailable(bool),
    Error(String),
}
