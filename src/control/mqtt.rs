use super::command::ControlCommand;
use crate::config::MqttConfig;
use crate::publish::ConnectAnnouncement;
use crate::service::ServiceContext;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const REQUEST_CAPACITY: usize = 64;

/// Client options for the configured broker
pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let client_id = config
        .client_id
        .clone()
        .unwrap_or_else(|| format!("hps3d-service-{}", Uuid::new_v4().simple()));

    let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    options.set_clean_session(true);
    options
}

/// Drives the rumqttc event loop: tracks broker connectivity and turns
/// control-topic messages into flag changes
pub struct MqttControl {
    context: Arc<ServiceContext>,
    client: AsyncClient,
    eventloop: EventLoop,
}

impl MqttControl {
    /// Returns the control task plus a client handle for publishing
    pub fn new(context: Arc<ServiceContext>) -> (Self, AsyncClient) {
        let options = mqtt_options(&context.config.mqtt);
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let control = Self {
            context,
            client: client.clone(),
            eventloop,
        };
        (control, client)
    }

    pub async fn run(mut self) {
        let config = &self.context.config.mqtt;
        info!(
            "MQTT control connecting to {}:{} (control topic '{}')",
            config.host, config.port, config.control_topic
        );
        let retry_delay = Duration::from_secs(config.reconnect_delay_secs.max(1));

        loop {
            let event = tokio::select! {
                _ = self.context.shutdown.cancelled() => break,
                event = self.eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(packet)) => handle_packet(&self.context, &self.client, packet),
                Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    if self.context.flags.broker_connected() {
                        warn!("MQTT connection lost: {}", e);
                    } else {
                        debug!("MQTT connection attempt failed: {}", e);
                    }
                    self.context.flags.set_broker_connected(false);

                    tokio::select! {
                        _ = self.context.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(retry_delay) => {}
                    }
                }
            }
        }

        self.context.flags.set_broker_connected(false);
        if let Err(e) = self.client.try_disconnect() {
            debug!("MQTT disconnect request not queued: {}", e);
        }
        info!("MQTT control stopped");
    }
}

/// React to one incoming packet
pub(crate) fn handle_packet(context: &ServiceContext, client: &AsyncClient, packet: Packet) {
    let config = &context.config.mqtt;

    match packet {
        Packet::ConnAck(ack) => {
            if ack.code != ConnectReturnCode::Success {
                error!("MQTT broker refused connection: {:?}", ack.code);
                return;
            }
            info!("MQTT broker connected");
            context.flags.set_broker_connected(true);

            if let Err(e) = client.try_subscribe(config.control_topic.as_str(), QoS::AtMostOnce) {
                warn!("Failed to subscribe to {}: {}", config.control_topic, e);
            }

            match serde_json::to_vec(&ConnectAnnouncement::new(context.flags.snapshot())) {
                Ok(payload) => {
                    if let Err(e) =
                        client.try_publish(config.status_topic(), QoS::AtMostOnce, false, payload)
                    {
                        warn!("Failed to publish connect status: {}", e);
                    }
                }
                Err(e) => warn!("Failed to render connect status: {}", e),
            }
        }
        Packet::Publish(publish) if publish.topic == config.control_topic => {
            match ControlCommand::from_payload(&publish.payload) {
                Some(command) => command.apply(&context.flags, "MQTT"),
                None => debug!(
                    "Ignoring unknown control payload: {}",
                    String::from_utf8_lossy(&publish.payload)
                ),
            }
        }
        Packet::Disconnect => {
            warn!("MQTT broker sent disconnect");
            context.flags.set_broker_connected(false);
        }
        _ => {}
    }
}
