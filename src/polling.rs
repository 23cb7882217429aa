use async_channel::Sender;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_stream::{wrappers::IntervalStream, StreamExt};

use crate::messages::ToDeviceMessage;

use log::{debug, info};

pub async fn polling_worker(poll_period: Duration, to_device_channel: Sender<ToDeviceMessage>) {
    // The device worker already fetched once during setup
    let mut interval = interval_at(Instant::now() + poll_period, poll_period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = IntervalStream::new(interval);

    while ticks.next().await.is_some() {
        debug!("Polling dehumidifier");
        if to_device_channel.send(ToDeviceMessage::PublishEntitiesState).await.is_err() {
            info!("Device channel closed, polling stopped");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Duration;

    use crate::messages::ToDeviceMessage;

    #[tokio::test(start_paused = true)]
    async fn test_polling_sends_refresh_each_period() {
        let (tx, rx) = async_channel::bounded(10);
        let handle = tokio::spawn(super::polling_worker(Duration::from_secs(60), tx));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(rx.is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rx.recv().await.unwrap(), ToDeviceMessage::PublishEntitiesState);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(rx.recv().await.unwrap(), ToDeviceMessage::PublishEntitiesState);

        drop(rx);
        tokio::time::sleep(Duration::from_secs(60)).await;
        handle.await.unwrap();
    }
}
