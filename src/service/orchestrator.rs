use super::types::{ServiceTask, ShutdownReason};
use super::ServiceContext;
use crate::config::ServiceConfig;
use crate::publish::OutputSink;
use crate::sampler::SamplePoint;
use crate::sensor::DepthSensor;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Owns the shared context and every spawned loop
pub struct HpsService {
    pub(super) context: Arc<ServiceContext>,
    pub(super) sensor: Option<Box<dyn DepthSensor>>,
    pub(super) extra_sinks: Vec<Arc<dyn OutputSink>>,
    pub(super) tasks: Vec<(ServiceTask, JoinHandle<()>)>,
    pub(super) http_addr: Option<SocketAddr>,
    pub(super) shutdown_sender: mpsc::Sender<ShutdownReason>,
    pub(super) shutdown_receiver: Option<mpsc::Receiver<ShutdownReason>>,
}

/// Cloneable trigger for a graceful shutdown
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: mpsc::Sender<ShutdownReason>,
}

impl ShutdownHandle {
    /// Ask the service to stop; only the first request counts
    pub fn request(&self, reason: ShutdownReason) {
        if let Err(e) = self.sender.try_send(reason) {
            debug!("Shutdown already requested: {}", e);
        }
    }
}

impl HpsService {
    pub fn new(config: ServiceConfig, points: Vec<SamplePoint>) -> Self {
        let (shutdown_sender, shutdown_receiver) = mpsc::channel(1);

        Self {
            context: ServiceContext::new(config, points),
            sensor: None,
            extra_sinks: Vec::new(),
            tasks: Vec::new(),
            http_addr: None,
            shutdown_sender,
            shutdown_receiver: Some(shutdown_receiver),
        }
    }

    /// Drive a specific sensor backend instead of the simulated device
    pub fn with_sensor(mut self, sensor: Box<dyn DepthSensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    /// Publish to an additional sink alongside the configured ones
    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.extra_sinks.push(sink);
        self
    }

    pub fn context(&self) -> Arc<ServiceContext> {
        Arc::clone(&self.context)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: self.shutdown_sender.clone(),
        }
    }

    /// Address of the HTTP control listener, once bound
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    pub fn running_tasks(&self) -> Vec<ServiceTask> {
        self.tasks
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(task, _)| *task)
            .collect()
    }
}
