#[cfg(test)]
mod fake;

use std::time::Duration;

use anyhow::{bail, ensure, Context as _, Result};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeReasonCode};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::{spawn, JoinHandle},
    time::sleep,
};
use tracing::instrument;

use crate::config::Config;

const KEEP_ALIVE: Duration = Duration::from_secs(5);
/// Wait before polling the event loop again after a connection error, which reconnects
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Capacity of the request queue between [`AsyncClient`] and [`EventLoop`]
const REQUEST_CAPACITY: usize = 10;
/// Control messages waiting for the player; newer ones are dropped while it is full
pub const CONTROL_QUEUE_CAPACITY: usize = 16;

/// Client identifier unique to this process
#[must_use]
pub fn client_id() -> String {
    format!("{}_{:x}", env!("CARGO_PKG_NAME"), std::process::id())
}

/// Connect to the broker and subscribe to the control topic
///
/// Returns the receiving end of the message payloads and the handle of the task
/// delivering them. The task only forwards payloads, so it never waits on the player;
/// messages arriving while [`CONTROL_QUEUE_CAPACITY`] are already queued are dropped.
/// The task resolves with an error when the subscription is rejected.
///
/// # Errors
///
/// Returns an error if the broker cannot be reached.
#[instrument(skip_all, fields(server = %config.mqtt_server, topic = %config.mqtt_topic))]
pub async fn subscribe(
    config: &Config,
) -> Result<(mpsc::Receiver<Vec<u8>>, JoinHandle<Result<()>>)> {
    let (host, port) = config.mqtt_host_port()?;
    let client_id = client_id();
    tracing::info!(%client_id, "Connecting to MQTT broker");

    let mut options = MqttOptions::new(client_id, host, port);
    options
        .set_keep_alive(KEEP_ALIVE)
        .set_clean_session(true);
    let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

    loop {
        let event = eventloop
            .poll()
            .await
            .with_context(|| format!("Failed to connect to MQTT broker {}", config.mqtt_server))?;
        if let Event::Incoming(Packet::ConnAck(ack)) = event {
            tracing::info!(?ack, "Connected to MQTT broker");
            break;
        }
    }

    let topic = config.mqtt_topic.clone();
    client
        .try_subscribe(topic.clone(), QoS::AtMostOnce)
        .with_context(|| format!("Failed to subscribe to {topic}"))?;

    let (payload_sender, payload_receiver) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
    let listener = spawn(listen(client, eventloop, topic, payload_sender));

    Ok((payload_receiver, listener))
}

/// Drive the MQTT event loop, forwarding every publish and resubscribing after reconnects
async fn listen(
    client: AsyncClient,
    mut eventloop: EventLoop,
    topic: String,
    payload_sender: mpsc::Sender<Vec<u8>>,
) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::debug!(topic = %publish.topic, payload_len = publish.payload.len(), "Control message received");
                forward(&payload_sender, publish.payload.to_vec())?;
            }
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                // The session is clean, so the subscription is gone after a reconnect
                tracing::info!(?ack, "Reconnected to MQTT broker");
                client
                    .try_subscribe(topic.clone(), QoS::AtMostOnce)
                    .with_context(|| format!("Failed to subscribe to {topic}"))?;
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                ensure!(
                    !ack.return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure)),
                    "Broker rejected subscription to {topic}"
                );
                tracing::info!(%topic, "Subscribed");
            }
            Ok(event) => tracing::trace!(?event, "MQTT event"),
            Err(e) => {
                tracing::warn!(?e, "MQTT connection error, reconnecting");
                sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Queue a payload for the player without waiting
///
/// # Errors
///
/// Returns an error if the receiving end is gone.
fn forward(payload_sender: &mpsc::Sender<Vec<u8>>, payload: Vec<u8>) -> Result<()> {
    match payload_sender.try_send(payload) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(payload)) => {
            tracing::warn!(
                payload = %String::from_utf8_lossy(&payload),
                "Control message queue full, dropping message"
            );
            Ok(())
        }
        Err(TrySendError::Closed(_)) => bail!("Control message receiver closed"),
    }
}
