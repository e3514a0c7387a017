use super::types::ServiceTask;
use super::HpsService;
use crate::acquisition::{capture_channel, AcquisitionLoop};
use crate::error::{Result, ServiceError};
use crate::publish::{PublishLoop, StdoutSink};
use crate::sensor::SensorLinkBuilder;
use std::sync::Arc;
use tracing::info;

const CAPTURE_REQUEST_CAPACITY: usize = 4;

impl HpsService {
    /// Spawn every configured loop
    pub async fn start(&mut self) -> Result<()> {
        if !self.tasks.is_empty() {
            return Err(ServiceError::system("Service already started"));
        }

        let context = Arc::clone(&self.context);
        info!(
            "Starting HPS3D service with {} sample points ({})",
            context.points.len(),
            if context.config.acquisition.start_active {
                "active"
            } else {
                "waiting for start command"
            }
        );

        let mut builder = SensorLinkBuilder::new().config(context.config.sensor.clone());
        if let Some(sensor) = self.sensor.take() {
            builder = builder.sensor(sensor);
        }
        let link = builder.build()?;

        let (requester, requests) = capture_channel(CAPTURE_REQUEST_CAPACITY);
        let acquisition = AcquisitionLoop::new(Arc::clone(&context), link, requests);
        self.spawn(ServiceTask::Acquisition, acquisition.run());

        let mut publisher = PublishLoop::new(Arc::clone(&context), requester);
        if context.config.output.stdout {
            publisher.add_sink(Arc::new(StdoutSink));
        }
        for sink in self.extra_sinks.drain(..) {
            publisher.add_sink(sink);
        }

        #[cfg(feature = "mqtt")]
        if context.config.mqtt.enabled {
            let (control, client) = crate::control::MqttControl::new(Arc::clone(&context));
            publisher.add_sink(Arc::new(crate::publish::MqttSink::new(
                client,
                Arc::clone(&context),
            )));
            self.spawn(ServiceTask::MqttControl, control.run());
        }

        self.spawn(ServiceTask::Publish, publisher.run());

        #[cfg(feature = "http")]
        if context.config.http.enabled {
            self.start_http().await;
        }

        info!("HPS3D service started ({} tasks)", self.tasks.len());
        Ok(())
    }

    #[cfg(feature = "http")]
    async fn start_http(&mut self) {
        use crate::control::ControlServer;
        use tracing::error;

        match ControlServer::new(Arc::clone(&self.context)).bind().await {
            Ok(server) => {
                self.http_addr = Some(server.local_addr());
                let shutdown = self.context.shutdown.clone();
                self.spawn(ServiceTask::HttpControl, async move {
                    if let Err(e) = server.serve(shutdown).await {
                        error!("HTTP control server error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("HTTP control unavailable, continuing without it: {}", e);
            }
        }
    }

    fn spawn<F>(&mut self, task: ServiceTask, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        info!("Spawning {} task", task.name());
        self.tasks.push((task, tokio::spawn(future)));
    }
}
