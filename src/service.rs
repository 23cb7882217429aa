use async_channel::{Receiver, Sender};
use error_stack::{Result, ResultExt};
use log::{debug, info};
use rumqttc::{AsyncClient, EventLoop, LastWill, MqttOptions, QoS};
use std::marker::PhantomData;
use tokio::{task::JoinSet, time::Duration};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ConfigEntry,
    coordinator::Coordinator,
    device::{DehumidifierClient, DeviceHandle},
    device_worker::DeviceWorker,
    error::MqttError,
    messages::{ToDeviceMessage, ToMqttPublisherMessage},
    mqtt_publisher::MqttPublisher,
    mqtt_subscriber, polling, get_version,
};

const DEFAULT_MQTT_PORT: u16 = 1883;
const MQTT_RECONNECT_PERIOD: Duration = Duration::from_secs(10);

pub struct Started {}
pub struct Stopped {}

pub struct ServiceConfig {
    pub mqtt_broker_address: String,
    pub controller_name: String,
    pub entry: ConfigEntry,
    pub polling_period: Duration,
    pub polling_timeout: Duration,
}

pub struct Service<D, Status = Stopped> {
    config: ServiceConfig,
    device: DeviceHandle<D>,

    workers: JoinSet<()>,
    _status: PhantomData<Status>,
}

pub fn active_topic(controller_name: &str) -> String {
    format!("Dehumidifier/Active/{controller_name}")
}

pub fn version_topic(controller_name: &str) -> String {
    format!("Dehumidifier/Version/{controller_name}")
}

pub fn command_topic(controller_name: &str) -> String {
    format!("Dehumidifier/Command/{controller_name}")
}

/// Split `host[:port]`, using the standard MQTT port when none is given.
pub fn broker_host_and_port(mqtt_broker: &str) -> (String, u16) {
    match mqtt_broker.rsplit_once(':') {
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (mqtt_broker.to_string(), DEFAULT_MQTT_PORT),
        },
        None => (mqtt_broker.to_string(), DEFAULT_MQTT_PORT),
    }
}

impl<D: DehumidifierClient> Service<D> {
    pub fn new(config: ServiceConfig, device: D) -> Service<D, Stopped> {
        Service {
            config,
            device: DeviceHandle::new(device),
            workers: JoinSet::new(),
            _status: PhantomData,
        }
    }

    fn coordinator(&self) -> Coordinator<D> {
        Coordinator::new(
            self.config.entry.title.clone(),
            self.device.clone(),
            self.config.polling_period,
        )
        .with_polling_timeout(self.config.polling_timeout)
    }

    async fn connect_to_mqtt_broker(
        mqtt_broker: &str,
        controller_name: &str,
    ) -> Result<(AsyncClient, EventLoop), MqttError> {
        let into_context =
            || MqttError::Context(format!("Connecting to MQTT broker '{}'", mqtt_broker));
        let client_id = format!("Dehumidifier-{}", controller_name);
        let (host, port) = broker_host_and_port(mqtt_broker);
        let mut mqtt_options = MqttOptions::new(client_id, host, port);
        let last_will_topic = active_topic(controller_name);
        let last_will = LastWill::new(&last_will_topic, "false".as_bytes(), QoS::AtLeastOnce, true);
        mqtt_options
            .set_keep_alive(Duration::from_secs(5))
            .set_last_will(last_will);

        let (mqtt_client, event_loop) = AsyncClient::new(mqtt_options, 10);

        // Publish active state
        mqtt_client
            .publish(&last_will_topic, QoS::AtLeastOnce, true, "true".as_bytes())
            .await
            .change_context_lazy(into_context)?;

        mqtt_client
            .publish(
                version_topic(controller_name),
                QoS::AtLeastOnce,
                true,
                get_version().as_bytes(),
            )
            .await
            .change_context_lazy(into_context)?;

        // Subscribe to commands
        mqtt_client
            .subscribe(command_topic(controller_name), QoS::AtLeastOnce)
            .await
            .change_context_lazy(into_context)?;
        Ok((mqtt_client, event_loop))
    }

    async fn mqtt_session(
        mqtt_broker: &str,
        controller_name: impl Into<String>,
        to_mqtt_publisher_rx: Receiver<ToMqttPublisherMessage>,
        to_mqtt_publisher_tx: Sender<ToMqttPublisherMessage>,
        to_device_tx: Sender<ToDeviceMessage>,
    ) {
        let controller_name = controller_name.into();
        let publisher_cancel_token = CancellationToken::new();
        let subscriber_cancel_token = publisher_cancel_token.clone();

        let (mqtt_client, event_loop) =
            match Self::connect_to_mqtt_broker(mqtt_broker, &controller_name).await {
                Ok((mqtt_client, event_loop)) => (mqtt_client, event_loop),
                Err(e) => {
                    info!("Error connecting to MQTT broker: {:?}", e);
                    return;
                }
            };

        let publish_handle = tokio::spawn(async move {
            match MqttPublisher::mqtt_publisher_session(
                controller_name,
                mqtt_client,
                to_mqtt_publisher_rx,
                publisher_cancel_token.clone(),
            )
            .await
            {
                Ok(_) => info!("MQTT publisher session finished"),
                Err(e) => info!("MQTT publisher session finished with error: {:?}", e),
            }

            publisher_cancel_token.cancel();
        });

        let refresh_tx = to_device_tx.clone();
        let subscriber_handle = tokio::spawn(async move {
            match mqtt_subscriber::mqtt_subscriber_session(
                event_loop,
                to_device_tx,
                to_mqtt_publisher_tx,
                subscriber_cancel_token.clone(),
            )
            .await
            {
                Ok(_) => info!("MQTT subscriber session finished"),
                Err(e) => info!("MQTT subscriber session finished with error: {:?}", e),
            }

            subscriber_cancel_token.cancel();
        });

        // Publish every entity again on the new connection. A full queue already holds a pending refresh.
        if let Err(e) = refresh_tx.try_send(ToDeviceMessage::PublishEntitiesState) {
            debug!("Entities refresh not queued: {}", e);
        }

        if let Err(e) = publish_handle.await {
            info!("MQTT publisher task failed: {:?}", e);
        }
        if let Err(e) = subscriber_handle.await {
            info!("MQTT subscriber task failed: {:?}", e);
        }
    }

    async fn mqtt_worker(
        mqtt_broker: &str,
        controller_name: &str,
        to_device_tx: Sender<ToDeviceMessage>,
        to_mqtt_publisher_rx: Receiver<ToMqttPublisherMessage>,
        to_mqtt_publisher_tx: Sender<ToMqttPublisherMessage>,
    ) {
        loop {
            info!("Starting MQTT session");
            Self::mqtt_session(
                mqtt_broker,
                controller_name,
                to_mqtt_publisher_rx.clone(),
                to_mqtt_publisher_tx.clone(),
                to_device_tx.clone(),
            )
            .await;

            info!("MQTT terminated, waiting {:?} before restarting", MQTT_RECONNECT_PERIOD);
            tokio::time::sleep(MQTT_RECONNECT_PERIOD).await;
        }
    }
}

impl<D: DehumidifierClient> Service<D, Stopped> {
    pub async fn start(mut self) -> Service<D, Started> {
        // Create the channels for the workers
        let (to_device_tx, to_device_rx) = async_channel::bounded(10);
        let (to_mqtt_publisher_tx, to_mqtt_publisher_rx) = async_channel::bounded(10);

        // Create device worker
        let coordinator = self.coordinator();
        let polling_period = coordinator.update_interval();
        let entry = self.config.entry.clone();
        let to_mqtt_publisher_tx_instance = to_mqtt_publisher_tx.clone();
        self.workers.spawn(async move {
            DeviceWorker::device_worker(entry, coordinator, to_device_rx, to_mqtt_publisher_tx_instance)
                .await;
        });

        // Create mqtt worker
        let controller_name = self.config.controller_name.clone();
        let to_device_tx_instance = to_device_tx.clone();
        let mqtt_broker = self.config.mqtt_broker_address.clone();

        self.workers.spawn(async move {
            Self::mqtt_worker(
                &mqtt_broker,
                &controller_name,
                to_device_tx_instance,
                to_mqtt_publisher_rx,
                to_mqtt_publisher_tx,
            )
            .await
        });

        // Create polling worker
        self.workers.spawn(async move {
            polling::polling_worker(polling_period, to_device_tx).await;
        });

        info!("Service started");
        Service {
            config: self.config,
            device: self.device,
            workers: self.workers,
            _status: PhantomData,
        }
    }
}

impl<D: DehumidifierClient> Service<D, Started> {
    pub async fn stop(mut self) -> Service<D, Stopped> {
        self.workers.shutdown().await;
        info!("Service stopped");

        Service {
            config: self.config,
            device: self.device,
            workers: self.workers,
            _status: PhantomData,
        }
    }
}
