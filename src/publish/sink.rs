use crate::error::PublishError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Logical output stream a payload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Measurements,
    PointCloud,
}

/// Destination for rendered JSON payloads
#[async_trait]
pub trait OutputSink: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, channel: Channel, payload: &str) -> Result<(), PublishError>;
}

/// Measurement lines on stdout; point clouds are not printed
#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait]
impl OutputSink for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn publish(&self, channel: Channel, payload: &str) -> Result<(), PublishError> {
        if channel != Channel::Measurements {
            return Ok(());
        }
        let mut stdout = tokio::io::stdout();
        stdout.write_all(payload.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
        Ok(())
    }
}

/// Keeps every payload in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    payloads: Arc<Mutex<Vec<(Channel, String)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payloads(&self, channel: Channel) -> Vec<String> {
        self.payloads
            .lock()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.payloads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.lock().is_empty()
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn publish(&self, channel: Channel, payload: &str) -> Result<(), PublishError> {
        self.payloads.lock().push((channel, payload.to_string()));
        Ok(())
    }
}

#[cfg(feature = "mqtt")]
pub use mqtt_sink::MqttSink;

#[cfg(feature = "mqtt")]
mod mqtt_sink {
    use super::{Channel, OutputSink};
    use crate::config::MqttConfig;
    use crate::error::PublishError;
    use crate::flags::ControlFlags;
    use crate::service::ServiceContext;
    use async_trait::async_trait;
    use rumqttc::{AsyncClient, QoS};
    use std::sync::Arc;

    /// Publishes to the measurement and point-cloud topics
    pub struct MqttSink {
        client: AsyncClient,
        context: Arc<ServiceContext>,
    }

    impl MqttSink {
        pub fn new(client: AsyncClient, context: Arc<ServiceContext>) -> Self {
            Self { client, context }
        }

        fn config(&self) -> &MqttConfig {
            &self.context.config.mqtt
        }

        fn flags(&self) -> &ControlFlags {
            &self.context.flags
        }
    }

    #[async_trait]
    impl OutputSink for MqttSink {
        fn name(&self) -> &str {
            "mqtt"
        }

        async fn publish(&self, channel: Channel, payload: &str) -> Result<(), PublishError> {
            if !self.flags().broker_connected() {
                return Err(PublishError::BrokerUnavailable);
            }

            let topic = match channel {
                Channel::Measurements => &self.config().measurement_topic,
                Channel::PointCloud => &self.config().pointcloud_topic,
            };

            // Never waits on the event loop; a full request queue is a failed publish.
            self.client
                .try_publish(topic.as_str(), QoS::AtMostOnce, false, payload.as_bytes().to_vec())
                .map_err(|e| PublishError::Rejected {
                    topic: topic.clone(),
                    details: e.to_string(),
                })
        }
    }
}
